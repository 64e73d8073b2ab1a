//! Run metadata: run number, instrument and sample logs.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sample log holding the Doppler maximum energy transfer (sinusoidal profile).
pub const LOG_MAXIMUM_DELTA_ENERGY: &str = "Doppler.maximum_delta_energy";
/// Sample log holding the Doppler velocity profile (0 = sinusoidal).
pub const LOG_VELOCITY_PROFILE: &str = "Doppler.velocity_profile";
/// Sample log holding the Doppler delta energy (non-sinusoidal operation).
pub const LOG_DELTA_ENERGY: &str = "Doppler.delta_energy";
/// Instrument parameter naming the default detector grouping file.
pub const PARAM_GROUPING_FILE: &str = "Workflow.GroupingFile";

/// Run number of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunNumber(pub u32);

impl RunNumber {
    /// Returns the raw run number.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RunNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Value of a sample log entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum LogValue {
    Number(f64),
    Text(String),
}

impl LogValue {
    /// Numeric value, if this entry is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Metadata bag attached to every workspace.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunMetadata {
    /// Run number of the acquisition.
    pub run_number: RunNumber,
    /// Instrument name (e.g. `IN16B`).
    pub instrument: String,
    /// Sample logs keyed by name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub logs: BTreeMap<String, LogValue>,
    /// Instrument parameters keyed by name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub parameters: BTreeMap<String, String>,
}

impl RunMetadata {
    /// Creates metadata for a run of the given instrument.
    pub fn new(run_number: impl Into<RunNumber>, instrument: impl Into<String>) -> Self {
        Self {
            run_number: run_number.into(),
            instrument: instrument.into(),
            logs: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a numeric sample log.
    #[must_use]
    pub fn with_log(mut self, name: &str, value: f64) -> Self {
        self.set_log(name, LogValue::Number(value));
        self
    }

    /// Adds an instrument parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }

    /// Inserts or replaces a sample log.
    pub fn set_log(&mut self, name: &str, value: LogValue) {
        self.logs.insert(name.to_string(), value);
    }

    /// Returns true if the named sample log exists.
    #[must_use]
    pub fn has_log(&self, name: &str) -> bool {
        self.logs.contains_key(name)
    }

    /// Numeric value of a sample log.
    #[must_use]
    pub fn log_f64(&self, name: &str) -> Option<f64> {
        self.logs.get(name).and_then(LogValue::as_f64)
    }

    /// Instrument parameter value.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}
