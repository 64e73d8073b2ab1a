//! JSON workspace codec.
//!
//! Used for small fixtures, calibration workspaces and builds without HDF5
//! support. JSON numbers cannot hold NaN or infinity, so those values are
//! written as the strings `"NaN"`, `"inf"` and `"-inf"`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use indirect_core::{AxisUnit, RunMetadata, Spectrum, Workspace};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Non-finite float, stored as a JSON string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialFloat {
    #[serde(rename = "NaN")]
    NaN,
    #[serde(rename = "inf")]
    Infinity,
    #[serde(rename = "-inf")]
    NegInfinity,
}

/// A float as stored in JSON: a plain number when finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonFloat {
    Number(f64),
    Special(SpecialFloat),
}

impl From<f64> for JsonFloat {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self::Special(SpecialFloat::NaN)
        } else if value.is_infinite() {
            Self::Special(if value > 0.0 {
                SpecialFloat::Infinity
            } else {
                SpecialFloat::NegInfinity
            })
        } else {
            Self::Number(value)
        }
    }
}

impl From<JsonFloat> for f64 {
    fn from(value: JsonFloat) -> Self {
        match value {
            JsonFloat::Number(v) => v,
            JsonFloat::Special(SpecialFloat::NaN) => f64::NAN,
            JsonFloat::Special(SpecialFloat::Infinity) => f64::INFINITY,
            JsonFloat::Special(SpecialFloat::NegInfinity) => f64::NEG_INFINITY,
        }
    }
}

fn encode(values: &[f64]) -> Vec<JsonFloat> {
    values.iter().copied().map(JsonFloat::from).collect()
}

fn decode(values: Vec<JsonFloat>) -> Vec<f64> {
    values.into_iter().map(f64::from).collect()
}

/// Serialised form of a [`Spectrum`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub spectrum_no: u32,
    #[serde(default)]
    pub detector_ids: Vec<u32>,
    pub y: Vec<JsonFloat>,
    pub e: Vec<JsonFloat>,
    pub mask: Vec<bool>,
}

impl From<&Spectrum> for SpectrumRecord {
    fn from(spectrum: &Spectrum) -> Self {
        Self {
            spectrum_no: spectrum.spectrum_no,
            detector_ids: spectrum.detector_ids.clone(),
            y: encode(&spectrum.y),
            e: encode(&spectrum.e),
            mask: spectrum.mask.clone(),
        }
    }
}

impl From<SpectrumRecord> for Spectrum {
    fn from(record: SpectrumRecord) -> Self {
        Self {
            spectrum_no: record.spectrum_no,
            detector_ids: record.detector_ids,
            y: decode(record.y),
            e: decode(record.e),
            mask: record.mask,
        }
    }
}

/// Serialised form of a [`Workspace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    /// Shared axis (points or bin edges).
    pub x: Vec<JsonFloat>,
    /// Axis unit.
    #[serde(default)]
    pub unit: AxisUnit,
    /// Spectra.
    pub spectra: Vec<SpectrumRecord>,
    /// Run metadata.
    #[serde(default)]
    pub metadata: RunMetadata,
}

impl From<&Workspace> for WorkspaceRecord {
    fn from(ws: &Workspace) -> Self {
        Self {
            x: encode(ws.x()),
            unit: ws.unit(),
            spectra: ws.spectra().iter().map(SpectrumRecord::from).collect(),
            metadata: ws.metadata.clone(),
        }
    }
}

impl TryFrom<WorkspaceRecord> for Workspace {
    type Error = Error;

    fn try_from(record: WorkspaceRecord) -> Result<Self> {
        Ok(Workspace::new(
            decode(record.x),
            record.spectra.into_iter().map(Spectrum::from).collect(),
            record.unit,
            record.metadata,
        )?)
    }
}

/// Writes a workspace as pretty-printed JSON.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_workspace_json<P: AsRef<Path>>(path: P, ws: &Workspace) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &WorkspaceRecord::from(ws))?;
    writer.flush()?;
    Ok(())
}

/// Reads a workspace from JSON.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or does
/// not describe a consistent workspace.
pub fn read_workspace_json<P: AsRef<Path>>(path: P) -> Result<Workspace> {
    let reader = BufReader::new(File::open(path)?);
    let record: WorkspaceRecord = serde_json::from_reader(reader)?;
    Workspace::try_from(record)
}
