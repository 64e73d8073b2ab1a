//! Detector grouping: summing physical channels into logical spectra.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::workspace::{Spectrum, Workspace};

/// One output spectrum and the input spectrum numbers summed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorGroup {
    /// Spectrum number of the grouped output.
    pub spectrum_no: u32,
    /// Input spectrum numbers summed into this group.
    pub members: Vec<u32>,
}

/// A detector grouping map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorGrouping {
    groups: Vec<DetectorGroup>,
}

impl DetectorGrouping {
    /// Creates a grouping; every group must list at least one member.
    pub fn new(groups: Vec<DetectorGroup>) -> Result<Self> {
        if let Some(empty) = groups.iter().find(|g| g.members.is_empty()) {
            return Err(Error::Data(format!(
                "detector group {} has no members",
                empty.spectrum_no
            )));
        }
        Ok(Self { groups })
    }

    /// The groups in output order.
    #[must_use]
    pub fn groups(&self) -> &[DetectorGroup] {
        &self.groups
    }

    /// Number of output spectra.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if the grouping has no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sums member spectra of `raw` into one spectrum per group.
    ///
    /// # Errors
    /// Returns an error if the grouping is empty or references a spectrum
    /// number that `raw` does not contain.
    pub fn apply(&self, raw: &Workspace) -> Result<Workspace> {
        if self.groups.is_empty() {
            return Err(Error::Data("detector grouping is empty".to_string()));
        }
        let index: HashMap<u32, usize> = raw
            .spectra()
            .iter()
            .enumerate()
            .map(|(i, s)| (s.spectrum_no, i))
            .collect();

        let nbins = raw.num_bins();
        let mut grouped = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut out = Spectrum::with_errors(group.spectrum_no, vec![0.0; nbins], vec![0.0; nbins]);
            out.detector_ids.clear();
            for member in &group.members {
                let &i = index.get(member).ok_or_else(|| {
                    Error::Data(format!(
                        "group {} references missing spectrum {member}",
                        group.spectrum_no
                    ))
                })?;
                let source = &raw.spectra()[i];
                out.detector_ids.extend_from_slice(&source.detector_ids);
                for j in 0..nbins {
                    out.y[j] += source.y[j];
                    out.e[j] = out.e[j].hypot(source.e[j]);
                    out.mask[j] |= source.mask[j];
                }
            }
            grouped.push(out);
        }

        log::debug!(
            "grouped {} spectra into {} groups",
            raw.num_spectra(),
            grouped.len()
        );
        Ok(raw.with_spectra(grouped))
    }
}
