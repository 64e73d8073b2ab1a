//! Workspaces: detector spectra sharing one x-axis, plus run metadata.
//!
//! A workspace stores its axis once and one [`Spectrum`] per detector
//! channel. The axis is either point data (`x.len() == nbins`) or histogram
//! bin edges (`x.len() == nbins + 1`). All arithmetic returns new workspaces
//! or mutates in place; nothing here knows about runs or names.
#![allow(clippy::cast_precision_loss, clippy::missing_errors_doc)]

use crate::error::{Error, Result};
use crate::metadata::RunMetadata;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unit of the x-axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisUnit {
    /// Raw Doppler time channel index.
    #[default]
    TimeChannel,
    /// Energy transfer.
    DeltaE,
}

impl AxisUnit {
    /// Identifier used when persisting the unit.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::TimeChannel => "TimeChannel",
            Self::DeltaE => "DeltaE",
        }
    }

    /// Human readable caption.
    #[must_use]
    pub fn caption(self) -> &'static str {
        match self {
            Self::TimeChannel => "Time channel",
            Self::DeltaE => "Energy transfer",
        }
    }

    /// Parses a persisted unit identifier.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "TimeChannel" => Some(Self::TimeChannel),
            "DeltaE" => Some(Self::DeltaE),
            _ => None,
        }
    }
}

/// One detector channel: counts, uncertainties and bin mask.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spectrum {
    /// Spectrum number (1-based, as referenced by grouping files).
    pub spectrum_no: u32,
    /// Physical detectors contributing to this spectrum.
    pub detector_ids: Vec<u32>,
    /// Counts per bin.
    pub y: Vec<f64>,
    /// Statistical uncertainty per bin.
    pub e: Vec<f64>,
    /// Masked bins are kept but excluded from further processing.
    pub mask: Vec<bool>,
}

impl Spectrum {
    /// Creates a spectrum from raw counts, with `e = sqrt(y)`.
    #[must_use]
    pub fn counts(spectrum_no: u32, y: Vec<f64>) -> Self {
        let e = y.iter().map(|&v| v.max(0.0).sqrt()).collect();
        Self::with_errors(spectrum_no, y, e)
    }

    /// Creates a spectrum with explicit uncertainties.
    #[must_use]
    pub fn with_errors(spectrum_no: u32, y: Vec<f64>, e: Vec<f64>) -> Self {
        let mask = vec![false; y.len()];
        Self {
            spectrum_no,
            detector_ids: vec![spectrum_no],
            y,
            e,
            mask,
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns true if the spectrum has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of masked bins.
    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    fn slice_bins(&self, start: usize, end: usize) -> Self {
        Self {
            spectrum_no: self.spectrum_no,
            detector_ids: self.detector_ids.clone(),
            y: self.y[start..end].to_vec(),
            e: self.e[start..end].to_vec(),
            mask: self.mask[start..end].to_vec(),
        }
    }

    fn truncate(&mut self, n: usize) {
        self.y.truncate(n);
        self.e.truncate(n);
        self.mask.truncate(n);
    }
}

/// A named-by-context collection of spectra sharing one x-axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    x: Vec<f64>,
    spectra: Vec<Spectrum>,
    unit: AxisUnit,
    /// Run number, instrument and logs.
    pub metadata: RunMetadata,
}

impl Workspace {
    /// Creates a workspace, validating the shared-axis invariant.
    ///
    /// The axis must be non-decreasing (a zero-width energy axis is a legal
    /// degenerate result) and every spectrum must have the same bin count,
    /// equal to `x.len()` (points) or `x.len() - 1` (histogram).
    pub fn new(
        x: Vec<f64>,
        spectra: Vec<Spectrum>,
        unit: AxisUnit,
        metadata: RunMetadata,
    ) -> Result<Self> {
        if x.is_empty() {
            return Err(Error::Data("workspace axis is empty".to_string()));
        }
        if spectra.is_empty() {
            return Err(Error::Data("workspace has no spectra".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) || x.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Data(
                "workspace axis must be finite and non-decreasing".to_string(),
            ));
        }
        let nbins = spectra[0].len();
        if x.len() != nbins && x.len() != nbins + 1 {
            return Err(Error::ShapeMismatch {
                operation: "create workspace",
                detail: format!("axis length {} for {} bins", x.len(), nbins),
            });
        }
        for spectrum in &spectra {
            if spectrum.y.len() != nbins || spectrum.e.len() != nbins || spectrum.mask.len() != nbins
            {
                return Err(Error::ShapeMismatch {
                    operation: "create workspace",
                    detail: format!(
                        "spectrum {} does not have {} bins",
                        spectrum.spectrum_no, nbins
                    ),
                });
            }
        }
        Ok(Self {
            x,
            spectra,
            unit,
            metadata,
        })
    }

    /// Shared x-axis.
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// All spectra.
    #[must_use]
    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    /// Spectrum by workspace index.
    pub fn spectrum(&self, index: usize) -> Result<&Spectrum> {
        self.spectra.get(index).ok_or_else(|| {
            Error::Data(format!(
                "workspace index {index} out of range ({} spectra)",
                self.spectra.len()
            ))
        })
    }

    /// Number of spectra.
    #[must_use]
    pub fn num_spectra(&self) -> usize {
        self.spectra.len()
    }

    /// Number of bins per spectrum.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.spectra[0].len()
    }

    /// Returns true if the axis holds bin edges.
    #[must_use]
    pub fn is_histogram(&self) -> bool {
        self.x.len() == self.num_bins() + 1
    }

    /// Unit of the x-axis.
    #[must_use]
    pub fn unit(&self) -> AxisUnit {
        self.unit
    }

    /// Bin centres (histogram) or the points themselves.
    #[must_use]
    pub fn bin_centres(&self) -> Vec<f64> {
        if self.is_histogram() {
            self.x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
        } else {
            self.x.clone()
        }
    }

    /// Keeps the bins inside `[xmin, xmax)` (points) or whose edges lie in
    /// `[xmin, xmax]` (histogram).
    pub fn crop(&self, xmin: f64, xmax: f64) -> Result<Self> {
        let start = self.x.partition_point(|&v| v < xmin);
        let (bin_end, x_end) = if self.is_histogram() {
            let last_edge = self.x.partition_point(|&v| v <= xmax);
            let last_edge = last_edge.saturating_sub(1);
            (last_edge, last_edge + 1)
        } else {
            let end = self.x.partition_point(|&v| v < xmax);
            (end, end)
        };
        if bin_end <= start {
            return Err(Error::Data(format!(
                "crop range [{xmin}, {xmax}] contains no bins"
            )));
        }
        Ok(Self {
            x: self.x[start..x_end].to_vec(),
            spectra: self
                .spectra
                .iter()
                .map(|s| s.slice_bins(start, bin_end))
                .collect(),
            unit: self.unit,
            metadata: self.metadata.clone(),
        })
    }

    /// Adds `offset` to every x value.
    pub fn shift_x(&mut self, offset: f64) {
        for v in &mut self.x {
            *v += offset;
        }
    }

    /// Maps the x-axis through `f` and tags the result with `unit`.
    ///
    /// The mapping must be monotonic non-decreasing; a constant mapping is
    /// accepted and yields a zero-width axis.
    #[must_use]
    pub fn convert_axis<F: Fn(f64) -> f64>(&self, f: F, unit: AxisUnit) -> Self {
        Self {
            x: self.x.iter().map(|&v| f(v)).collect(),
            spectra: self.spectra.clone(),
            unit,
            metadata: self.metadata.clone(),
        }
    }

    /// Replaces the unit tag.
    pub fn set_unit(&mut self, unit: AxisUnit) {
        self.unit = unit;
    }

    /// Divides by `rhs`, broadcasting a single spectrum and/or a single bin.
    pub fn divide(&self, rhs: &Self) -> Result<Self> {
        let nspec_ok = rhs.num_spectra() == 1 || rhs.num_spectra() == self.num_spectra();
        let nbins_ok = rhs.num_bins() == 1 || rhs.num_bins() == self.num_bins();
        if !nspec_ok || !nbins_ok {
            return Err(Error::ShapeMismatch {
                operation: "divide",
                detail: format!(
                    "{}x{} by {}x{}",
                    self.num_spectra(),
                    self.num_bins(),
                    rhs.num_spectra(),
                    rhs.num_bins()
                ),
            });
        }

        let spectra = self
            .spectra
            .iter()
            .enumerate()
            .map(|(i, lhs)| {
                let den = &rhs.spectra[if rhs.num_spectra() == 1 { 0 } else { i }];
                let mut out = lhs.clone();
                for j in 0..lhs.len() {
                    let k = if den.len() == 1 { 0 } else { j };
                    let (a, sa) = (lhs.y[j], lhs.e[j]);
                    let (b, sb) = (den.y[k], den.e[k]);
                    out.y[j] = a / b;
                    out.e[j] = ((sa / b).powi(2) + (a * sb / (b * b)).powi(2)).sqrt();
                    out.mask[j] = lhs.mask[j] || den.mask[k];
                }
                out
            })
            .collect();

        Ok(self.with_spectra(spectra))
    }

    /// Divides every spectrum bin-wise by the single monitor spectrum.
    pub fn normalise_to_monitor(&self, monitor: &Self) -> Result<Self> {
        if monitor.num_spectra() != 1 || monitor.num_bins() != self.num_bins() {
            return Err(Error::ShapeMismatch {
                operation: "normalise to monitor",
                detail: format!(
                    "monitor has {} spectra of {} bins, workspace has {} bins",
                    monitor.num_spectra(),
                    monitor.num_bins(),
                    self.num_bins()
                ),
            });
        }
        self.divide(monitor)
    }

    /// Bin-wise sum with another workspace of identical shape.
    pub fn plus(&self, rhs: &Self) -> Result<Self> {
        self.check_same_shape(rhs, "plus")?;
        let spectra = self
            .spectra
            .iter()
            .zip(&rhs.spectra)
            .map(|(a, b)| {
                let mut out = a.clone();
                for j in 0..a.len() {
                    out.y[j] = a.y[j] + b.y[j];
                    out.e[j] = a.e[j].hypot(b.e[j]);
                    out.mask[j] = a.mask[j] || b.mask[j];
                }
                out
            })
            .collect();
        Ok(self.with_spectra(spectra))
    }

    /// Multiplies counts and uncertainties by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for spectrum in &mut out.spectra {
            for v in &mut spectrum.y {
                *v *= factor;
            }
            for v in &mut spectrum.e {
                *v *= factor.abs();
            }
        }
        out
    }

    /// Drops trailing bins so that `n` remain.
    pub fn truncate_bins(&mut self, n: usize) {
        if n == 0 || n >= self.num_bins() {
            return;
        }
        let axis_len = if self.is_histogram() { n + 1 } else { n };
        self.x.truncate(axis_len);
        for spectrum in &mut self.spectra {
            spectrum.truncate(n);
        }
    }

    /// Replaces NaN counts and uncertainties, returning the number of bins touched.
    pub fn replace_nan(&mut self, value: f64) -> usize {
        let mut replaced = 0;
        for spectrum in &mut self.spectra {
            for (y, e) in spectrum.y.iter_mut().zip(spectrum.e.iter_mut()) {
                if y.is_nan() || e.is_nan() {
                    replaced += 1;
                }
                if y.is_nan() {
                    *y = value;
                }
                if e.is_nan() {
                    *e = value;
                }
            }
        }
        replaced
    }

    /// Masks every bin lying below `xmin` or above `xmax`.
    ///
    /// Returns the number of bins per spectrum that are masked by this call.
    pub fn mask_outside(&mut self, xmin: f64, xmax: f64) -> usize {
        let outside: Vec<bool> = if self.is_histogram() {
            self.x
                .windows(2)
                .map(|w| w[1] <= xmin || w[0] >= xmax)
                .collect()
        } else {
            self.x.iter().map(|&v| v < xmin || v > xmax).collect()
        };
        for spectrum in &mut self.spectra {
            for (m, &o) in spectrum.mask.iter_mut().zip(&outside) {
                *m |= o;
            }
        }
        outside.iter().filter(|&&o| o).count()
    }

    /// Copies one spectrum into a new single-spectrum workspace.
    pub fn extract_spectrum(&self, index: usize) -> Result<Self> {
        let spectrum = self.spectrum(index)?.clone();
        Ok(self.with_spectra(vec![spectrum]))
    }

    /// Appends the spectra of `other`, which must share this axis.
    pub fn append_spectra(&mut self, other: &Self) -> Result<()> {
        if other.x != self.x {
            return Err(Error::ShapeMismatch {
                operation: "append spectra",
                detail: "axes differ".to_string(),
            });
        }
        self.spectra.extend(other.spectra.iter().cloned());
        Ok(())
    }

    /// Sums all spectra into one.
    #[must_use]
    pub fn sum_spectra(&self) -> Self {
        let nbins = self.num_bins();
        let mut total = Spectrum::with_errors(1, vec![0.0; nbins], vec![0.0; nbins]);
        total.detector_ids.clear();
        for spectrum in &self.spectra {
            total.detector_ids.extend_from_slice(&spectrum.detector_ids);
            for j in 0..nbins {
                total.y[j] += spectrum.y[j];
                total.e[j] = total.e[j].hypot(spectrum.e[j]);
                total.mask[j] |= spectrum.mask[j];
            }
        }
        self.with_spectra(vec![total])
    }

    /// Builds a workspace sharing this axis, unit and metadata.
    #[must_use]
    pub fn with_spectra(&self, spectra: Vec<Spectrum>) -> Self {
        Self {
            x: self.x.clone(),
            spectra,
            unit: self.unit,
            metadata: self.metadata.clone(),
        }
    }

    fn check_same_shape(&self, rhs: &Self, operation: &'static str) -> Result<()> {
        if self.num_spectra() != rhs.num_spectra() || self.num_bins() != rhs.num_bins() {
            return Err(Error::ShapeMismatch {
                operation,
                detail: format!(
                    "{}x{} and {}x{}",
                    self.num_spectra(),
                    self.num_bins(),
                    rhs.num_spectra(),
                    rhs.num_bins()
                ),
            });
        }
        Ok(())
    }
}
