//! Reduction and facility configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::store::Phase;
use crate::workspace::Workspace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Policy combining the two halves of a mirrored acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum UnmirrorOption {
    /// Monitor normalisation only; the time-channel axis is kept.
    NormaliseOnly = 0,
    /// Left half only.
    Left = 1,
    /// Right half only.
    Right = 2,
    /// Average of both halves.
    #[default]
    Sum = 3,
    /// Shift the right half onto the left half's peaks, then average.
    ShiftSum = 4,
    /// Like [`Self::ShiftSum`] and centre all spectra.
    ShiftSumCentred = 5,
    /// Like [`Self::ShiftSum`] with peaks taken from a vanadium run.
    VanadiumShiftSum = 6,
    /// Like [`Self::ShiftSumCentred`] with peaks taken from a vanadium run.
    VanadiumShiftSumCentred = 7,
}

impl UnmirrorOption {
    /// Numeric option value.
    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Options 6 and 7 need a calibration (vanadium) reference.
    #[must_use]
    pub fn requires_calibration(self) -> bool {
        matches!(self, Self::VanadiumShiftSum | Self::VanadiumShiftSumCentred)
    }

    /// Options with an executable reduction path.
    #[must_use]
    pub fn is_supported(self) -> bool {
        self <= Self::ShiftSum
    }
}

impl TryFrom<u8> for UnmirrorOption {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::NormaliseOnly,
            1 => Self::Left,
            2 => Self::Right,
            3 => Self::Sum,
            4 => Self::ShiftSum,
            5 => Self::ShiftSumCentred,
            6 => Self::VanadiumShiftSum,
            7 => Self::VanadiumShiftSumCentred,
            _ => {
                return Err(Error::configuration(
                    "UnmirrorOption",
                    format!("{value} is outside the range 0 to 7"),
                ))
            }
        })
    }
}

impl fmt::Display for UnmirrorOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Analyser crystal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Analyser {
    #[default]
    Silicon,
}

impl fmt::Display for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silicon => f.write_str("silicon"),
        }
    }
}

impl FromStr for Analyser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "silicon" => Ok(Self::Silicon),
            other => Err(Error::configuration(
                "Analyser",
                format!("unknown analyser '{other}'"),
            )),
        }
    }
}

/// Analyser reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reflection {
    #[default]
    R111,
}

impl fmt::Display for Reflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R111 => f.write_str("111"),
        }
    }
}

impl FromStr for Reflection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "111" => Ok(Self::R111),
            other => Err(Error::configuration(
                "Reflection",
                format!("unknown reflection '{other}'"),
            )),
        }
    }
}

/// Names of the output workspaces, one per phase.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OutputNames {
    pub reduced: String,
    pub raw: String,
    pub det_grouped: String,
    pub monitor: String,
    pub mnorm: String,
    pub vnorm: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            reduced: "red".to_string(),
            raw: "raw".to_string(),
            det_grouped: "detectors_grouped".to_string(),
            monitor: "monitor".to_string(),
            mnorm: "mnorm".to_string(),
            vnorm: "vnorm".to_string(),
        }
    }
}

impl OutputNames {
    /// Output name of a phase.
    #[must_use]
    pub fn name(&self, phase: Phase) -> &str {
        match phase {
            Phase::Raw => &self.raw,
            Phase::DetectorsGrouped => &self.det_grouped,
            Phase::Monitor => &self.monitor,
            Phase::MonitorNormalised => &self.mnorm,
            Phase::VanadiumNormalised => &self.vnorm,
            Phase::Reduced => &self.reduced,
        }
    }
}

/// All inputs of one reduction batch.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReductionConfig {
    /// Raw data files, one per run.
    pub runs: Vec<PathBuf>,
    pub analyser: Analyser,
    pub reflection: Reflection,
    /// Explicit detector grouping map; derived from instrument parameters if absent.
    pub map_file: Option<PathBuf>,
    /// Per-detector intensity factors dividing the normalised data.
    pub calibration: Option<Workspace>,
    /// Expose intermediate workspaces instead of deleting them.
    pub control_mode: bool,
    /// Merge all runs into one load.
    pub sum_runs: bool,
    /// Input has two mirrored halves.
    pub mirror_sense: bool,
    pub unmirror_option: UnmirrorOption,
    pub save: bool,
    pub plot: bool,
    pub output_names: OutputNames,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            analyser: Analyser::default(),
            reflection: Reflection::default(),
            map_file: None,
            calibration: None,
            control_mode: false,
            sum_runs: false,
            mirror_sense: true,
            unmirror_option: UnmirrorOption::default(),
            save: false,
            plot: false,
            output_names: OutputNames::default(),
        }
    }
}

impl ReductionConfig {
    /// Configuration reducing the given files with default options.
    #[must_use]
    pub fn new<I, P>(runs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            runs: runs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the unmirror option.
    #[must_use]
    pub fn with_unmirror_option(mut self, option: UnmirrorOption) -> Self {
        self.unmirror_option = option;
        self
    }

    /// Set the detector grouping map file.
    #[must_use]
    pub fn with_map_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.map_file = Some(path.into());
        self
    }

    /// Set the calibration workspace.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Workspace) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Set control (debug) mode.
    #[must_use]
    pub fn with_control_mode(mut self, enabled: bool) -> Self {
        self.control_mode = enabled;
        self
    }

    /// Set run summation.
    #[must_use]
    pub fn with_sum_runs(mut self, enabled: bool) -> Self {
        self.sum_runs = enabled;
        self
    }

    /// Set mirror sense.
    #[must_use]
    pub fn with_mirror_sense(mut self, enabled: bool) -> Self {
        self.mirror_sense = enabled;
        self
    }

    /// Set saving of the reduced workspaces.
    #[must_use]
    pub fn with_save(mut self, enabled: bool) -> Self {
        self.save = enabled;
        self
    }

    /// Set plotting of the reduced workspace.
    #[must_use]
    pub fn with_plot(mut self, enabled: bool) -> Self {
        self.plot = enabled;
        self
    }

    /// Set the output workspace names.
    #[must_use]
    pub fn with_output_names(mut self, names: OutputNames) -> Self {
        self.output_names = names;
        self
    }

    /// Checks the inputs before anything is loaded.
    ///
    /// # Errors
    /// Returns a configuration error for an empty run list or for options 6
    /// and 7 without a calibration workspace, and an unsupported-operation
    /// error for the reserved options 5 to 7.
    pub fn validate(&self) -> Result<()> {
        if self.runs.is_empty() {
            return Err(Error::configuration("Run", "no input runs given"));
        }
        if !self.mirror_sense {
            return Ok(());
        }
        let option = self.unmirror_option;
        if option.requires_calibration() && self.calibration.is_none() {
            return Err(Error::configuration(
                "UnmirrorOption",
                format!("Unmirror option {option} requires calibration workspace to be set"),
            ));
        }
        if !option.is_supported() {
            return Err(Error::Unsupported(format!(
                "unmirror option {option} is reserved and has no reduction path"
            )));
        }
        Ok(())
    }

    /// Option actually applied: without mirror sense only option 0 makes sense.
    #[must_use]
    pub fn effective_option(&self) -> UnmirrorOption {
        if self.mirror_sense {
            self.unmirror_option
        } else {
            UnmirrorOption::NormaliseOnly
        }
    }
}

/// Facility-wide directories and instrument parameter defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FacilityConfig {
    /// Directory holding instrument definition and parameter files.
    pub instrument_dir: PathBuf,
    /// Directory holding detector grouping files.
    pub grouping_dir: PathBuf,
    /// Instrument parameters keyed by instrument name, used when a run does
    /// not carry them itself.
    pub instrument_parameters: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        let mut in16b = BTreeMap::new();
        in16b.insert(
            crate::metadata::PARAM_GROUPING_FILE.to_string(),
            "IN16B_Grouping.map".to_string(),
        );
        let mut instrument_parameters = BTreeMap::new();
        instrument_parameters.insert("IN16B".to_string(), in16b);
        Self {
            instrument_dir: PathBuf::from("instrument"),
            grouping_dir: PathBuf::from("instrument/Grouping"),
            instrument_parameters,
        }
    }
}

impl FacilityConfig {
    /// Path of `<instrument>_<analyser>_<reflection>_Parameters.xml`.
    #[must_use]
    pub fn parameter_file(
        &self,
        instrument: &str,
        analyser: Analyser,
        reflection: Reflection,
    ) -> PathBuf {
        self.instrument_dir
            .join(format!("{instrument}_{analyser}_{reflection}_Parameters.xml"))
    }

    /// Facility default for an instrument parameter.
    #[must_use]
    pub fn instrument_parameter(&self, instrument: &str, name: &str) -> Option<&str> {
        self.instrument_parameters
            .get(instrument)
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    /// Resolves a grouping file name against the grouping directory.
    #[must_use]
    pub fn grouping_file(&self, file_name: &str) -> PathBuf {
        let path = Path::new(file_name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.grouping_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_range() {
        assert_eq!(UnmirrorOption::try_from(4).unwrap(), UnmirrorOption::ShiftSum);
        let err = UnmirrorOption::try_from(8).unwrap_err();
        assert_eq!(err.parameter(), Some("UnmirrorOption"));
    }

    #[test]
    fn test_option_six_requires_calibration() {
        let config = ReductionConfig::new(["136558.nxs"])
            .with_unmirror_option(UnmirrorOption::VanadiumShiftSum);
        let err = config.validate().unwrap_err();
        assert_eq!(err.parameter(), Some("UnmirrorOption"));
        assert!(err.to_string().contains("calibration"));
    }

    #[test]
    fn test_reserved_option_is_unsupported() {
        let config = ReductionConfig::new(["136558.nxs"])
            .with_unmirror_option(UnmirrorOption::ShiftSumCentred);
        assert!(matches!(config.validate(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_mirror_sense_off_falls_back_to_zero() {
        let config = ReductionConfig::new(["136558.nxs"])
            .with_mirror_sense(false)
            .with_unmirror_option(UnmirrorOption::VanadiumShiftSumCentred);
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_option(), UnmirrorOption::NormaliseOnly);
    }

    #[test]
    fn test_empty_run_list_rejected() {
        let err = ReductionConfig::default().validate().unwrap_err();
        assert_eq!(err.parameter(), Some("Run"));
    }

    #[test]
    fn test_parameter_file_naming() {
        let facility = FacilityConfig::default();
        let path = facility.parameter_file("IN16B", Analyser::Silicon, Reflection::R111);
        assert!(path.ends_with("IN16B_silicon_111_Parameters.xml"));
        assert_eq!(
            facility.instrument_parameter("IN16B", crate::metadata::PARAM_GROUPING_FILE),
            Some("IN16B_Grouping.map")
        );
    }
}
