#![allow(clippy::cast_precision_loss)]
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indirect_algorithms::reducer::{LOG_SUM_RUNS, LOG_UNMIRROR_OPTION};
use indirect_algorithms::{BatchController, OutputEntry};
use indirect_core::metadata::{LOG_MAXIMUM_DELTA_ENERGY, LOG_VELOCITY_PROFILE};
use indirect_core::services::LOG_MERGED_RUNS;
use indirect_core::{
    AxisUnit, DetectorGroup, DetectorGrouping, Error, FacilityConfig, LogValue, Phase,
    ReductionConfig, Result, ResultSink, RunMetadata, RunNumber, RunSource, Spectrum,
    SpectrumStore, UnmirrorOption, Workspace, WorkspaceId,
};

const NBINS: usize = 128;

fn raw_run(run: u32, instrument: &str) -> Workspace {
    let meta = RunMetadata::new(run, instrument)
        .with_log(LOG_MAXIMUM_DELTA_ENERGY, 30.0)
        .with_log(LOG_VELOCITY_PROFILE, 0.0);
    let half = NBINS / 2;
    let monitor = (0..NBINS)
        .map(|i| {
            let pos = (i % half) as f64;
            let d1 = pos - 4.0;
            let d2 = pos - (half - 5) as f64;
            60.0 + 900.0 * ((-0.5 * d1 * d1).exp() + (-0.5 * d2 * d2).exp())
        })
        .collect();
    let detector = |n: u32| -> Vec<f64> {
        (0..NBINS)
            .map(|i| {
                let d = (i % half) as f64 - 30.5;
                f64::from(n) * (400.0 * (-0.5 * d * d / 9.0).exp() + 4.0)
            })
            .collect()
    };
    let spectra = std::iter::once(Spectrum::counts(0, monitor))
        .chain((1..=4).map(|n| Spectrum::counts(n, detector(n))))
        .collect();
    Workspace::new(
        (0..=NBINS).map(|i| i as f64).collect(),
        spectra,
        AxisUnit::TimeChannel,
        meta,
    )
    .unwrap()
}

struct MemorySource {
    runs: HashMap<PathBuf, Workspace>,
    loaded: RefCell<Vec<PathBuf>>,
    grouping_files: RefCell<Vec<PathBuf>>,
}

impl MemorySource {
    fn new(runs: &[(&str, Workspace)]) -> Self {
        Self {
            runs: runs
                .iter()
                .map(|(path, ws)| (PathBuf::from(path), ws.clone()))
                .collect(),
            loaded: RefCell::new(Vec::new()),
            grouping_files: RefCell::new(Vec::new()),
        }
    }
}

impl RunSource for MemorySource {
    fn load_run(&self, path: &Path) -> Result<Workspace> {
        self.loaded.borrow_mut().push(path.to_path_buf());
        self.runs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("no such run {}", path.display())))
    }

    fn load_grouping(&self, path: &Path) -> Result<DetectorGrouping> {
        self.grouping_files.borrow_mut().push(path.to_path_buf());
        DetectorGrouping::new(vec![
            DetectorGroup {
                spectrum_no: 1,
                members: vec![1, 2],
            },
            DetectorGroup {
                spectrum_no: 2,
                members: vec![3, 4],
            },
        ])
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: RefCell<Vec<String>>,
    plotted: RefCell<Vec<(String, usize)>>,
}

impl ResultSink for RecordingSink {
    fn save(&self, name: &str, _workspace: &Workspace) -> Result<PathBuf> {
        self.saved.borrow_mut().push(name.to_string());
        Ok(PathBuf::from(format!("{name}.nxs")))
    }

    fn plot(&self, name: &str, workspace: &Workspace) -> Result<()> {
        self.plotted
            .borrow_mut()
            .push((name.to_string(), workspace.num_spectra()));
        Ok(())
    }
}

struct FullDiskSink;

impl ResultSink for FullDiskSink {
    fn save(&self, name: &str, _workspace: &Workspace) -> Result<PathBuf> {
        Err(Error::Backend(format!("no space left for {name}")))
    }

    fn plot(&self, _name: &str, _workspace: &Workspace) -> Result<()> {
        Ok(())
    }
}

fn run_id(run: u32, phase: Phase) -> WorkspaceId {
    WorkspaceId::new(RunNumber(run), phase)
}

#[test]
fn test_single_run_production_mode() {
    let source = MemorySource::new(&[("136558.nxs", raw_run(136_558, "IN16B"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["136558.nxs"])
        .with_save(true)
        .with_plot(true);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    assert_eq!(output.runs, vec![RunNumber(136_558)]);
    assert_eq!(
        output.reduced,
        OutputEntry::Single {
            name: "red".to_string(),
            id: run_id(136_558, Phase::Reduced),
        }
    );
    assert!(output.raw.is_none() && output.vnorm.is_none());
    assert_eq!(output.saved, vec![PathBuf::from("136558_red.nxs")]);
    assert_eq!(output.plotted.as_deref(), Some("136558_red_toplot"));
    assert_eq!(
        *sink.plotted.borrow(),
        vec![("136558_red_toplot".to_string(), 1)]
    );

    let context = store.run(RunNumber(136_558)).unwrap();
    assert_eq!(context.phases().collect::<Vec<_>>(), vec![Phase::Reduced]);
    let reduced = context.get(Phase::Reduced).unwrap();
    assert_eq!(reduced.unit(), AxisUnit::DeltaE);
    assert_eq!(reduced.num_spectra(), 2);
    assert_eq!(reduced.num_bins(), NBINS / 2);
    assert_eq!(
        reduced.metadata.logs.get(LOG_UNMIRROR_OPTION),
        Some(&LogValue::Text("3".to_string()))
    );
    assert_eq!(
        *source.grouping_files.borrow(),
        vec![Path::new("instrument/Grouping").join("IN16B_Grouping.map")]
    );
}

#[test]
fn test_single_run_control_mode_exposes_intermediates() {
    let source = MemorySource::new(&[("1.nxs", raw_run(1, "IN16B"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["1.nxs"])
        .with_control_mode(true)
        .with_unmirror_option(UnmirrorOption::ShiftSum);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    for (entry, phase) in [
        (&output.raw, Phase::Raw),
        (&output.monitor, Phase::Monitor),
        (&output.det_grouped, Phase::DetectorsGrouped),
        (&output.mnorm, Phase::MonitorNormalised),
        (&output.vnorm, Phase::VanadiumNormalised),
    ] {
        let entry = entry.as_ref().unwrap();
        assert_eq!(entry.ids(), &[run_id(1, phase)]);
        assert!(store.contains(&run_id(1, phase)));
    }
    assert_eq!(output.mnorm.unwrap().name(), "mnorm");
    assert!(sink.saved.borrow().is_empty());
}

#[test]
fn test_multiple_runs_are_grouped() {
    let source = MemorySource::new(&[
        ("1.nxs", raw_run(1, "IN16B")),
        ("2.nxs", raw_run(2, "IN16B")),
    ]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["1.nxs", "2.nxs"])
        .with_save(true)
        .with_plot(true);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    let members = vec![run_id(1, Phase::Reduced), run_id(2, Phase::Reduced)];
    assert_eq!(
        output.reduced,
        OutputEntry::Group {
            name: "red".to_string(),
            members: members.clone(),
        }
    );
    assert_eq!(store.group_members("red"), Some(members.as_slice()));
    assert_eq!(*sink.saved.borrow(), vec!["1_red", "2_red"]);
    assert!(sink.plotted.borrow().is_empty());
    assert!(output.plotted.is_none());
    assert!(!store.contains(&run_id(1, Phase::VanadiumNormalised)));
    assert!(!store.contains(&run_id(2, Phase::Raw)));
}

#[test]
fn test_multiple_runs_control_mode_groups_intermediates() {
    let source = MemorySource::new(&[
        ("1.nxs", raw_run(1, "IN16B")),
        ("2.nxs", raw_run(2, "IN16B")),
    ]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["1.nxs", "2.nxs"]).with_control_mode(true);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    assert!(matches!(output.raw, Some(OutputEntry::Group { .. })));
    assert_eq!(store.group_members("detectors_grouped").unwrap().len(), 2);
    assert_eq!(store.group_members("vnorm").unwrap().len(), 2);
}

#[test]
fn test_sum_runs_loads_one_workspace() {
    let source = MemorySource::new(&[
        ("1.nxs", raw_run(1, "IN16B")),
        ("2.nxs", raw_run(2, "IN16B")),
    ]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["1.nxs", "2.nxs"]).with_sum_runs(true);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    assert_eq!(output.runs, vec![RunNumber(1)]);
    assert!(matches!(output.reduced, OutputEntry::Single { .. }));
    let reduced = store.get(&run_id(1, Phase::Reduced)).unwrap();
    assert_eq!(
        reduced.metadata.logs.get(LOG_MERGED_RUNS),
        Some(&LogValue::Text("1+2".to_string()))
    );
    assert_eq!(
        reduced.metadata.logs.get(LOG_SUM_RUNS),
        Some(&LogValue::Text("true".to_string()))
    );
}

#[test]
fn test_calibration_option_fails_before_loading() {
    let source = MemorySource::new(&[("1.nxs", raw_run(1, "IN16B"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config =
        ReductionConfig::new(["1.nxs"]).with_unmirror_option(UnmirrorOption::VanadiumShiftSum);
    let mut store = SpectrumStore::new();

    let err = controller.run(&config, &mut store).unwrap_err();

    assert_eq!(err.parameter(), Some("UnmirrorOption"));
    assert!(source.loaded.borrow().is_empty());
    assert_eq!(store.runs().count(), 0);
}

#[test]
fn test_reserved_option_is_unsupported() {
    let source = MemorySource::new(&[("1.nxs", raw_run(1, "IN16B"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config =
        ReductionConfig::new(["1.nxs"]).with_unmirror_option(UnmirrorOption::ShiftSumCentred);
    let mut store = SpectrumStore::new();

    let err = controller.run(&config, &mut store).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert!(source.loaded.borrow().is_empty());
}

#[test]
fn test_mirror_sense_off_uses_option_zero() {
    let source = MemorySource::new(&[("1.nxs", raw_run(1, "IN16B"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["1.nxs"])
        .with_mirror_sense(false)
        .with_unmirror_option(UnmirrorOption::ShiftSum)
        .with_control_mode(true);
    let mut store = SpectrumStore::new();

    let output = controller.run(&config, &mut store).unwrap();

    let reduced = store.get(&run_id(1, Phase::Reduced)).unwrap();
    assert_eq!(reduced.unit(), AxisUnit::TimeChannel);
    assert_eq!(reduced.num_bins(), NBINS);
    assert!(output.vnorm.is_none());
}

#[test]
fn test_duplicate_run_cleans_up_batch() {
    let source = MemorySource::new(&[
        ("a.nxs", raw_run(7, "IN16B")),
        ("b.nxs", raw_run(7, "IN16B")),
    ]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let config = ReductionConfig::new(["a.nxs", "b.nxs"]);
    let mut store = SpectrumStore::new();

    let err = controller.run(&config, &mut store).unwrap_err();

    assert!(matches!(err, Error::DuplicateRun(_)));
    assert_eq!(store.runs().count(), 0);
}

#[test]
fn test_failed_batch_keeps_earlier_group() {
    let source = MemorySource::new(&[
        ("1.nxs", raw_run(1, "IN16B")),
        ("2.nxs", raw_run(2, "IN16B")),
        ("3.nxs", raw_run(3, "IN16B")),
        ("4.nxs", raw_run(4, "IN16B")),
    ]);
    let mut store = SpectrumStore::new();

    let sink = RecordingSink::default();
    BatchController::new(&source, &sink, FacilityConfig::default())
        .run(&ReductionConfig::new(["1.nxs", "2.nxs"]), &mut store)
        .unwrap();
    let earlier = vec![run_id(1, Phase::Reduced), run_id(2, Phase::Reduced)];

    let err = BatchController::new(&source, &FullDiskSink, FacilityConfig::default())
        .run(
            &ReductionConfig::new(["3.nxs", "4.nxs"]).with_save(true),
            &mut store,
        )
        .unwrap_err();

    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(store.group_members("red"), Some(earlier.as_slice()));
    assert_eq!(
        store.runs().collect::<Vec<_>>(),
        vec![RunNumber(1), RunNumber(2)]
    );
}

#[test]
fn test_unknown_instrument_needs_map_file() {
    let source = MemorySource::new(&[("1.nxs", raw_run(1, "IN5"))]);
    let sink = RecordingSink::default();
    let controller = BatchController::new(&source, &sink, FacilityConfig::default());
    let mut store = SpectrumStore::new();

    let err = controller
        .run(&ReductionConfig::new(["1.nxs"]), &mut store)
        .unwrap_err();
    assert_eq!(err.parameter(), Some("MapFile"));

    let config = ReductionConfig::new(["1.nxs"]).with_map_file("IN5.map");
    controller.run(&config, &mut store).unwrap();
    assert_eq!(
        source.grouping_files.borrow().last(),
        Some(&PathBuf::from("IN5.map"))
    );
}
