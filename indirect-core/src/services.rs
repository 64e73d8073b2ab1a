//! Collaborators the reduction calls into for loading and persisting data.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::grouping::DetectorGrouping;
use crate::metadata::LogValue;
use crate::workspace::Workspace;

/// Sample log listing the runs merged into a summed load.
pub const LOG_MERGED_RUNS: &str = "merged_runs";

/// How the input files of a batch are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadRequest {
    /// One workspace per file.
    Each(Vec<PathBuf>),
    /// All files added into a single workspace.
    Summed(Vec<PathBuf>),
}

impl LoadRequest {
    /// Files named by the request.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::Each(paths) | Self::Summed(paths) => paths,
        }
    }
}

/// Source of raw runs and grouping maps.
pub trait RunSource {
    /// Loads one raw data file: the monitor at workspace index 0 followed by
    /// the detector spectra.
    fn load_run(&self, path: &Path) -> Result<Workspace>;

    /// Loads a detector grouping map.
    fn load_grouping(&self, path: &Path) -> Result<DetectorGrouping>;

    /// Loads every file of a request.
    ///
    /// A summed request adds all runs bin-wise, keeps the first run's
    /// metadata and records the merged run numbers.
    fn load(&self, request: &LoadRequest) -> Result<Vec<Workspace>> {
        match request {
            LoadRequest::Each(paths) => paths.iter().map(|p| self.load_run(p)).collect(),
            LoadRequest::Summed(paths) => {
                let (first, rest) = paths
                    .split_first()
                    .ok_or_else(|| Error::configuration("Run", "no input runs given"))?;
                let mut total = self.load_run(first)?;
                let mut merged = vec![total.metadata.run_number.to_string()];
                for path in rest {
                    let next = self.load_run(path)?;
                    merged.push(next.metadata.run_number.to_string());
                    total = total.plus(&next)?;
                }
                total
                    .metadata
                    .set_log(LOG_MERGED_RUNS, LogValue::Text(merged.join("+")));
                log::info!("summed runs {}", merged.join("+"));
                Ok(vec![total])
            }
        }
    }
}

/// Destination of reduced results.
pub trait ResultSink {
    /// Persists a workspace as `<name>.nxs`, returning the written path.
    fn save(&self, name: &str, workspace: &Workspace) -> Result<PathBuf>;

    /// Displays a (single-spectrum) workspace.
    fn plot(&self, name: &str, workspace: &Workspace) -> Result<()>;
}
