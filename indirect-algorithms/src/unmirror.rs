//! Recombination of the two halves of a mirrored acquisition.

use indirect_core::{Error, Result, UnmirrorOption, Workspace};

use crate::shifter::shift_spectra;
use crate::splitter::{ExtractedHalf, MirrorSplitter};

/// Workspaces produced for one run.
#[derive(Debug, Clone)]
pub struct UnmirrorOutput {
    /// Final spectra.
    pub reduced: Workspace,
    /// Monitor matching `reduced`.
    pub monitor: Workspace,
    /// Grouped detectors matching `reduced`.
    pub det_grouped: Workspace,
    /// Monitor-normalised detectors.
    pub mnorm: Workspace,
    /// Calibrated workspace; option 0 never produces one.
    pub vnorm: Option<Workspace>,
}

impl From<ExtractedHalf> for UnmirrorOutput {
    fn from(half: ExtractedHalf) -> Self {
        Self {
            reduced: half.reduced,
            monitor: half.monitor,
            det_grouped: half.det_grouped,
            mnorm: half.mnorm,
            vnorm: Some(half.vnorm),
        }
    }
}

/// Applies an unmirror option to a grouped run and its monitor.
#[derive(Debug, Clone, Copy)]
pub struct UnmirrorEngine<'a> {
    option: UnmirrorOption,
    splitter: MirrorSplitter<'a>,
}

impl<'a> UnmirrorEngine<'a> {
    /// Engine for `option`, dividing by `calibration` if given.
    #[must_use]
    pub fn new(option: UnmirrorOption, calibration: Option<&'a Workspace>) -> Self {
        Self {
            option,
            splitter: MirrorSplitter::new(calibration),
        }
    }

    /// Option applied by this engine.
    #[must_use]
    pub fn option(&self) -> UnmirrorOption {
        self.option
    }

    /// Reduces `det_grouped` using the single-spectrum `monitor`.
    ///
    /// # Errors
    /// Returns [`Error::Unsupported`] for options 5 to 7 and propagates
    /// errors of the extraction steps.
    pub fn run(&self, det_grouped: &Workspace, monitor: &Workspace) -> Result<UnmirrorOutput> {
        log::info!("unmirror option {}", self.option);
        match self.option {
            UnmirrorOption::NormaliseOnly => {
                let mnorm = det_grouped.normalise_to_monitor(monitor)?;
                Ok(UnmirrorOutput {
                    reduced: mnorm.clone(),
                    monitor: monitor.clone(),
                    det_grouped: det_grouped.clone(),
                    mnorm,
                    vnorm: None,
                })
            }
            UnmirrorOption::Left => {
                let (start, mid) = split_points(det_grouped);
                Ok(self.splitter.extract(det_grouped, monitor, start, mid)?.into())
            }
            UnmirrorOption::Right => {
                let (_, mid) = split_points(det_grouped);
                Ok(self
                    .splitter
                    .extract(det_grouped, monitor, mid, f64::INFINITY)?
                    .into())
            }
            UnmirrorOption::Sum | UnmirrorOption::ShiftSum => {
                let (start, mid) = split_points(det_grouped);
                let left = self.splitter.extract(det_grouped, monitor, start, mid)?;
                let right = self
                    .splitter
                    .extract(det_grouped, monitor, mid, f64::INFINITY)?;
                let right_reduced = if self.option == UnmirrorOption::ShiftSum {
                    shift_spectra(&right.reduced, &left.reduced)?
                } else {
                    right.reduced
                };
                Ok(UnmirrorOutput {
                    reduced: average(&left.reduced, &right_reduced, "reduced")?,
                    monitor: average(&left.monitor, &right.monitor, "monitor")?,
                    det_grouped: average(&left.det_grouped, &right.det_grouped, "grouped")?,
                    mnorm: average(&left.mnorm, &right.mnorm, "normalised")?,
                    vnorm: Some(right.vnorm),
                })
            }
            option => Err(Error::Unsupported(format!(
                "unmirror option {option} has no reduction path"
            ))),
        }
    }
}

/// First axis value and the value at the midpoint index `(len - 1) / 2`.
fn split_points(workspace: &Workspace) -> (f64, f64) {
    let x = workspace.x();
    (x[0], x[(x.len() - 1) / 2])
}

/// Bin-wise mean of two halves over their common bin count.
fn average(left: &Workspace, right: &Workspace, what: &str) -> Result<Workspace> {
    let nbins = left.num_bins().min(right.num_bins());
    if left.num_bins() != right.num_bins() {
        log::warn!(
            "{what} halves differ in length ({} and {} bins), averaging the first {nbins}",
            left.num_bins(),
            right.num_bins()
        );
    }
    let mut left = left.clone();
    let mut right = right.clone();
    left.truncate_bins(nbins);
    right.truncate_bins(nbins);
    Ok(left.plus(&right)?.scale(0.5))
}
