//! File-backed implementations of the reduction collaborators.

use std::fs;
use std::path::{Path, PathBuf};

use indirect_core::{DetectorGrouping, ResultSink, RunSource, Workspace};

use crate::grouping::read_grouping_file;
use crate::json::{read_workspace_json, write_workspace_json};
use crate::writer::SpectrumCsvWriter;
use crate::Result;

/// File format of persisted workspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// `<name>.nxs` processed NeXus file (requires the `hdf5` feature).
    Nexus,
    /// `<name>.json` workspace record.
    Json,
}

impl SaveFormat {
    /// File extension written by this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Nexus => "nxs",
            Self::Json => "json",
        }
    }
}

impl Default for SaveFormat {
    fn default() -> Self {
        if cfg!(feature = "hdf5") {
            Self::Nexus
        } else {
            Self::Json
        }
    }
}

/// Reads a workspace, picking the codec from the file extension.
///
/// `.json` files hold workspace records; anything else is treated as an
/// IN16B raw NeXus file.
///
/// # Errors
/// Returns an error if the file cannot be decoded, or for NeXus files when
/// built without the `hdf5` feature.
pub fn read_workspace(path: &Path) -> Result<Workspace> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return read_workspace_json(path);
    }
    read_nexus_run(path)
}

/// Reads a workspace written by [`FileResultSink`]: a `.json` record or a
/// processed NeXus file.
///
/// # Errors
/// Returns an error if the file cannot be decoded, or for NeXus files when
/// built without the `hdf5` feature.
pub fn read_saved_workspace(path: &Path) -> Result<Workspace> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return read_workspace_json(path);
    }
    read_nexus_processed(path)
}

#[cfg(feature = "hdf5")]
fn read_nexus_run(path: &Path) -> Result<Workspace> {
    crate::nexus::read_raw_run(path)
}

#[cfg(feature = "hdf5")]
fn read_nexus_processed(path: &Path) -> Result<Workspace> {
    crate::nexus::read_processed(path)
}

#[cfg(not(feature = "hdf5"))]
fn read_nexus_run(path: &Path) -> Result<Workspace> {
    Err(crate::Error::InvalidFormat(format!(
        "cannot read {}: built without HDF5 support",
        path.display()
    )))
}

#[cfg(not(feature = "hdf5"))]
fn read_nexus_processed(path: &Path) -> Result<Workspace> {
    read_nexus_run(path)
}

/// Loads raw runs and grouping maps from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRunSource;

impl FileRunSource {
    /// Creates a file-backed run source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RunSource for FileRunSource {
    fn load_run(&self, path: &Path) -> indirect_core::Result<Workspace> {
        Ok(read_workspace(path)?)
    }

    fn load_grouping(&self, path: &Path) -> indirect_core::Result<DetectorGrouping> {
        Ok(read_grouping_file(path)?)
    }
}

/// Writes reduced workspaces and plot data into an output directory.
#[derive(Debug, Clone)]
pub struct FileResultSink {
    output_dir: PathBuf,
    format: SaveFormat,
}

impl FileResultSink {
    /// Creates a sink writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: SaveFormat::default(),
        }
    }

    /// Set the save format.
    #[must_use]
    pub fn with_format(mut self, format: SaveFormat) -> Self {
        self.format = format;
        self
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn prepare(&self, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(file_name))
    }

    fn write(&self, name: &str, workspace: &Workspace) -> Result<PathBuf> {
        let path = self.prepare(&format!("{name}.{}", self.format.extension()))?;
        match self.format {
            SaveFormat::Json => write_workspace_json(&path, workspace)?,
            SaveFormat::Nexus => write_nexus(&path, name, workspace)?,
        }
        log::info!("saved {name} to {}", path.display());
        Ok(path)
    }

    fn write_plot(&self, name: &str, workspace: &Workspace) -> Result<()> {
        let path = self.prepare(&format!("{name}.csv"))?;
        let mut writer = SpectrumCsvWriter::create(&path)?;
        writer.write_workspace(workspace)?;
        log::info!("plot data for {name} written to {}", path.display());
        Ok(())
    }
}

#[cfg(feature = "hdf5")]
fn write_nexus(path: &Path, name: &str, workspace: &Workspace) -> Result<()> {
    crate::nexus::write_processed(
        path,
        name,
        workspace,
        &crate::nexus::NexusWriteOptions::default(),
    )
}

#[cfg(not(feature = "hdf5"))]
fn write_nexus(path: &Path, _name: &str, _workspace: &Workspace) -> Result<()> {
    Err(crate::Error::InvalidFormat(format!(
        "cannot write {}: built without HDF5 support",
        path.display()
    )))
}

impl ResultSink for FileResultSink {
    fn save(&self, name: &str, workspace: &Workspace) -> indirect_core::Result<PathBuf> {
        Ok(self.write(name, workspace)?)
    }

    fn plot(&self, name: &str, workspace: &Workspace) -> indirect_core::Result<()> {
        Ok(self.write_plot(name, workspace)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indirect_core::{AxisUnit, RunMetadata, Spectrum};
    use tempfile::tempdir;

    fn workspace() -> Workspace {
        Workspace::new(
            vec![-1.0, 0.0, 1.0],
            vec![Spectrum::counts(1, vec![4.0, 9.0])],
            AxisUnit::DeltaE,
            RunMetadata::new(7, "IN16B"),
        )
        .unwrap()
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = tempdir().unwrap();
        let sink = FileResultSink::new(dir.path().join("out")).with_format(SaveFormat::Json);
        let path = sink.save("7_red", &workspace()).unwrap();
        assert_eq!(path, dir.path().join("out").join("7_red.json"));

        let loaded = FileRunSource::new().load_run(&path).unwrap();
        assert_eq!(loaded, workspace());
        assert_eq!(read_saved_workspace(&path).unwrap(), workspace());
    }

    #[test]
    fn test_json_save_after_zero_monitor_bin() {
        let raw = Workspace::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![Spectrum::counts(1, vec![1.0, 2.0, 3.0, 4.0])],
            AxisUnit::TimeChannel,
            RunMetadata::new(7, "IN16B"),
        )
        .unwrap();
        let monitor = raw.with_spectra(vec![Spectrum::counts(0, vec![1.0, 0.0, 1.0, 1.0])]);
        let mut normalised = raw.normalise_to_monitor(&monitor).unwrap();
        assert_eq!(normalised.replace_nan(0.0), 1);
        assert!(normalised.spectra()[0].y[1].is_infinite());

        let dir = tempdir().unwrap();
        let sink = FileResultSink::new(dir.path()).with_format(SaveFormat::Json);
        let path = sink.save("7_mnorm", &normalised).unwrap();

        let back = read_saved_workspace(&path).unwrap();
        assert_eq!(back.spectra()[0].y, vec![1.0, f64::INFINITY, 3.0, 4.0]);
        assert_eq!(back, normalised);
    }

    #[test]
    fn test_plot_writes_csv() {
        let dir = tempdir().unwrap();
        let sink = FileResultSink::new(dir.path());
        sink.plot("7_red_toplot", &workspace()).unwrap();
        let csv = fs::read_to_string(dir.path().join("7_red_toplot.csv")).unwrap();
        assert!(csv.starts_with("DeltaE,y1,e1"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_missing_grouping_is_io_error() {
        let dir = tempdir().unwrap();
        let err = FileRunSource::new()
            .load_grouping(&dir.path().join("none.map"))
            .unwrap_err();
        assert!(matches!(err, indirect_core::Error::Io(_)));
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_nexus_without_hdf5_is_backend_error() {
        let err = FileRunSource::new()
            .load_run(Path::new("136558.nxs"))
            .unwrap_err();
        assert!(matches!(err, indirect_core::Error::Backend(_)));
    }

    #[cfg(feature = "hdf5")]
    #[test]
    fn test_nexus_save_roundtrip() {
        let dir = tempdir().unwrap();
        let sink = FileResultSink::new(dir.path());
        let path = sink.save("7_red", &workspace()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("nxs"));
        let back = read_saved_workspace(&path).unwrap();
        assert_eq!(back, workspace());
    }
}
