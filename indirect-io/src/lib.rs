//! indirect-io: File-backed loading and saving for indirect reduction.
//!
//! This crate implements the collaborator traits of `indirect-core` on top
//! of the file system:
//! - **Grouping maps** - ASCII detector grouping files
//! - **JSON** - workspace records for fixtures and calibration data
//! - **NeXus** - IN16B raw runs and processed workspaces (`hdf5` feature)
//! - **CSV** - plot data of summed spectra
//!

mod error;
pub mod files;
pub mod grouping;
pub mod json;
#[cfg(feature = "hdf5")]
pub mod nexus;
mod writer;

pub use error::{Error, Result};
pub use files::{read_saved_workspace, read_workspace, FileResultSink, FileRunSource, SaveFormat};
pub use grouping::{parse_grouping, read_grouping_file};
pub use json::{
    read_workspace_json, write_workspace_json, JsonFloat, SpecialFloat, SpectrumRecord,
    WorkspaceRecord,
};
#[cfg(feature = "hdf5")]
pub use nexus::{read_processed, read_raw_run, write_processed, write_raw_run, NexusWriteOptions};
pub use writer::SpectrumCsvWriter;
