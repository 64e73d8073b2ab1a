//! Batch reduction: loading, per-run reduction and output selection.
//!
//! A batch validates its configuration before touching any file, loads
//! every run (or their sum), reduces each run into its own context of a
//! [`SpectrumStore`], then either exposes the intermediate workspaces
//! (control mode) or deletes them (production mode).

use std::fmt;
use std::path::PathBuf;

use indirect_core::metadata::PARAM_GROUPING_FILE;
use indirect_core::{
    Error, FacilityConfig, LoadRequest, Phase, ReductionConfig, Result, ResultSink, RunMetadata,
    RunNumber, RunSource, SpectrumStore, UnmirrorOption, WorkspaceId,
};

use crate::reducer::RunReducer;

/// Suffix of the summed workspace handed to the plot sink.
pub const PLOT_SUFFIX: &str = "_toplot";

/// An output workspace: one run's workspace or a group of them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum OutputEntry {
    Single { name: String, id: WorkspaceId },
    Group { name: String, members: Vec<WorkspaceId> },
}

impl OutputEntry {
    /// Configured output name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Single { name, .. } | Self::Group { name, .. } => name,
        }
    }

    /// Identifiers of the workspaces behind this entry.
    #[must_use]
    pub fn ids(&self) -> &[WorkspaceId] {
        match self {
            Self::Single { id, .. } => std::slice::from_ref(id),
            Self::Group { members, .. } => members,
        }
    }
}

impl fmt::Display for OutputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single { id, .. } => write!(f, "{id}"),
            Self::Group { name, members } => write!(f, "{name} ({} workspaces)", members.len()),
        }
    }
}

/// Result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionOutput {
    /// Reduced runs in load order.
    pub runs: Vec<RunNumber>,
    /// Reduced workspace, or the group of them for several runs.
    pub reduced: OutputEntry,
    /// Raw data; this and the following intermediates are set in control
    /// mode only.
    pub raw: Option<OutputEntry>,
    /// Monitor.
    pub monitor: Option<OutputEntry>,
    /// Grouped detectors.
    pub det_grouped: Option<OutputEntry>,
    /// Monitor-normalised detectors.
    pub mnorm: Option<OutputEntry>,
    /// Calibrated detectors.
    pub vnorm: Option<OutputEntry>,
    /// Files written by the result sink.
    pub saved: Vec<PathBuf>,
    /// Name of the plotted summed workspace.
    pub plotted: Option<String>,
}

/// Drives a reduction batch against a run source and a result sink.
pub struct BatchController<'a> {
    source: &'a dyn RunSource,
    sink: &'a dyn ResultSink,
    facility: FacilityConfig,
}

impl<'a> BatchController<'a> {
    /// Controller loading from `source` and writing to `sink`.
    #[must_use]
    pub fn new(source: &'a dyn RunSource, sink: &'a dyn ResultSink, facility: FacilityConfig) -> Self {
        Self {
            source,
            sink,
            facility,
        }
    }

    /// Facility configuration in use.
    #[must_use]
    pub fn facility(&self) -> &FacilityConfig {
        &self.facility
    }

    /// Grouping map for a batch: the explicit file, else the instrument's
    /// `Workflow.GroupingFile` under the facility grouping directory.
    ///
    /// # Errors
    /// Returns a `MapFile` configuration error if neither is available.
    pub fn resolve_map_file(
        &self,
        config: &ReductionConfig,
        metadata: &RunMetadata,
    ) -> Result<PathBuf> {
        if let Some(path) = &config.map_file {
            return Ok(path.clone());
        }
        metadata
            .parameter(PARAM_GROUPING_FILE)
            .or_else(|| {
                self.facility
                    .instrument_parameter(&metadata.instrument, PARAM_GROUPING_FILE)
            })
            .map(|name| self.facility.grouping_file(name))
            .ok_or_else(|| {
                Error::configuration(
                    "MapFile",
                    "Failed to find default detector grouping file. Please specify manually.",
                )
            })
    }

    /// Runs a complete batch into `store`.
    ///
    /// On failure every run context created by this batch is removed again.
    ///
    /// # Errors
    /// Returns configuration errors before anything is loaded, and any
    /// loading, reduction or sink error afterwards.
    pub fn run(&self, config: &ReductionConfig, store: &mut SpectrumStore) -> Result<ReductionOutput> {
        config.validate()?;
        if !config.mirror_sense {
            log::warn!("MirrorSense is OFF, UnmirrorOption will fall back to 0 (i.e. no unmirroring)");
        }
        let option = config.effective_option();

        let request = if config.sum_runs {
            LoadRequest::Summed(config.runs.clone())
        } else {
            LoadRequest::Each(config.runs.clone())
        };
        let workspaces = self.source.load(&request)?;
        let first = workspaces
            .first()
            .ok_or_else(|| Error::Data("no runs were loaded".to_string()))?;
        log::info!("loaded {} workspace(s)", workspaces.len());

        let parameter_file = self.facility.parameter_file(
            &first.metadata.instrument,
            config.analyser,
            config.reflection,
        );
        log::info!("parameter file: {}", parameter_file.display());
        let map_file = self.resolve_map_file(config, &first.metadata)?;
        log::info!("map file: {}", map_file.display());
        let grouping = self.source.load_grouping(&map_file)?;

        let reducer = RunReducer::new(
            &grouping,
            option,
            config.calibration.as_ref(),
            config.sum_runs,
        );
        let groups = store.group_snapshot();
        let mut opened = Vec::with_capacity(workspaces.len());
        let result = workspaces
            .into_iter()
            .try_for_each(|raw| {
                let run = raw.metadata.run_number;
                let context = store.open_run(run)?;
                opened.push(run);
                reducer.reduce(raw, context)
            })
            .and_then(|()| self.select_outputs(config, option, &opened, store));

        if result.is_err() {
            for run in &opened {
                store.close_run(*run);
            }
            store.restore_groups(groups);
        }
        result
    }

    fn select_outputs(
        &self,
        config: &ReductionConfig,
        option: UnmirrorOption,
        runs: &[RunNumber],
        store: &mut SpectrumStore,
    ) -> Result<ReductionOutput> {
        let names = &config.output_names;
        let mut output = match runs {
            [run] => self.single_run_outputs(config, *run, store)?,
            _ => self.multi_run_outputs(config, runs, store)?,
        };

        if !config.control_mode {
            for &run in runs {
                for phase in [
                    Phase::Raw,
                    Phase::MonitorNormalised,
                    Phase::DetectorsGrouped,
                    Phase::Monitor,
                ] {
                    store.delete(&WorkspaceId::new(run, phase));
                }
                if option > UnmirrorOption::NormaliseOnly {
                    store.delete(&WorkspaceId::new(run, Phase::VanadiumNormalised));
                }
            }
            return Ok(output);
        }

        for phase in Phase::INTERMEDIATE {
            let members: Vec<WorkspaceId> = runs
                .iter()
                .map(|&run| WorkspaceId::new(run, phase))
                .filter(|id| store.contains(id))
                .collect();
            let entry = match members.as_slice() {
                [] => None,
                [id] if runs.len() == 1 => Some(OutputEntry::Single {
                    name: names.name(phase).to_string(),
                    id: *id,
                }),
                _ => {
                    store.group(names.name(phase), members.clone())?;
                    Some(OutputEntry::Group {
                        name: names.name(phase).to_string(),
                        members,
                    })
                }
            };
            match phase {
                Phase::Raw => output.raw = entry,
                Phase::Monitor => output.monitor = entry,
                Phase::DetectorsGrouped => output.det_grouped = entry,
                Phase::MonitorNormalised => output.mnorm = entry,
                Phase::VanadiumNormalised => output.vnorm = entry,
                Phase::Reduced => {}
            }
        }
        Ok(output)
    }

    fn single_run_outputs(
        &self,
        config: &ReductionConfig,
        run: RunNumber,
        store: &SpectrumStore,
    ) -> Result<ReductionOutput> {
        let id = WorkspaceId::new(run, Phase::Reduced);
        let name = id.qualified_name(&config.output_names);
        let reduced = store.get(&id)?;

        let mut saved = Vec::new();
        if config.save {
            saved.push(self.sink.save(&name, reduced)?);
        }
        let mut plotted = None;
        if config.plot {
            let plot_name = format!("{name}{PLOT_SUFFIX}");
            log::info!("plot (all spectra summed) {plot_name}");
            self.sink.plot(&plot_name, &reduced.sum_spectra())?;
            plotted = Some(plot_name);
        }

        Ok(ReductionOutput {
            runs: vec![run],
            reduced: OutputEntry::Single {
                name: config.output_names.reduced.clone(),
                id,
            },
            raw: None,
            monitor: None,
            det_grouped: None,
            mnorm: None,
            vnorm: None,
            saved,
            plotted,
        })
    }

    fn multi_run_outputs(
        &self,
        config: &ReductionConfig,
        runs: &[RunNumber],
        store: &mut SpectrumStore,
    ) -> Result<ReductionOutput> {
        let names = &config.output_names;
        let members: Vec<WorkspaceId> = runs
            .iter()
            .map(|&run| WorkspaceId::new(run, Phase::Reduced))
            .collect();
        store.group(names.reduced.as_str(), members.clone())?;

        let mut saved = Vec::new();
        if config.save {
            for id in &members {
                saved.push(self.sink.save(&id.qualified_name(names), store.get(id)?)?);
            }
        }
        if config.plot {
            log::warn!("Automatic plotting for multiple files is disabled.");
        }

        Ok(ReductionOutput {
            runs: runs.to_vec(),
            reduced: OutputEntry::Group {
                name: names.reduced.clone(),
                members,
            },
            raw: None,
            monitor: None,
            det_grouped: None,
            mnorm: None,
            vnorm: None,
            saved,
            plotted: None,
        })
    }
}
