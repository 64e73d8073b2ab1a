//! Reduction of a single run into its run context.

use indirect_core::{
    DetectorGrouping, LogValue, Phase, Result, RunContext, UnmirrorOption, Workspace,
};

use crate::unmirror::UnmirrorEngine;

/// Sample log recording the unmirror option on the reduced workspace.
pub const LOG_UNMIRROR_OPTION: &str = "unmirror_option";
/// Sample log recording whether runs were summed.
pub const LOG_SUM_RUNS: &str = "sum_runs";

/// Groups detectors, extracts the monitor and unmirrors one raw run.
#[derive(Debug, Clone, Copy)]
pub struct RunReducer<'a> {
    grouping: &'a DetectorGrouping,
    engine: UnmirrorEngine<'a>,
    sum_runs: bool,
}

impl<'a> RunReducer<'a> {
    /// Reducer applying `grouping` and `option` to every run.
    #[must_use]
    pub fn new(
        grouping: &'a DetectorGrouping,
        option: UnmirrorOption,
        calibration: Option<&'a Workspace>,
        sum_runs: bool,
    ) -> Self {
        Self {
            grouping,
            engine: UnmirrorEngine::new(option, calibration),
            sum_runs,
        }
    }

    /// Reduces `raw` (monitor at workspace index 0) into `context`.
    ///
    /// Nothing is written to the context unless every step succeeds.
    ///
    /// # Errors
    /// Propagates grouping, extraction and unmirror errors.
    pub fn reduce(&self, raw: Workspace, context: &mut RunContext) -> Result<()> {
        log::info!("reducing run {}", context.run());
        let det_grouped = self.grouping.apply(&raw)?;
        let monitor = raw.extract_spectrum(0)?;
        let mut output = self.engine.run(&det_grouped, &monitor)?;

        let metadata = &mut output.reduced.metadata;
        metadata.set_log(
            LOG_UNMIRROR_OPTION,
            LogValue::Text(self.engine.option().to_string()),
        );
        metadata.set_log(LOG_SUM_RUNS, LogValue::Text(self.sum_runs.to_string()));

        context.insert(Phase::Raw, raw);
        context.insert(Phase::Monitor, output.monitor);
        context.insert(Phase::DetectorsGrouped, output.det_grouped);
        context.insert(Phase::MonitorNormalised, output.mnorm);
        if let Some(vnorm) = output.vnorm {
            context.insert(Phase::VanadiumNormalised, vnorm);
        }
        context.insert(Phase::Reduced, output.reduced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::cast_precision_loss)]
    use super::*;
    use indirect_core::{AxisUnit, DetectorGroup, RunMetadata, RunNumber, Spectrum};

    fn raw(nbins: usize) -> Workspace {
        let x = (0..=nbins).map(|i| i as f64).collect();
        let monitor = Spectrum::counts(
            0,
            (0..nbins)
                .map(|i| if i % (nbins / 2) == 2 { 900.0 } else { 30.0 })
                .collect(),
        );
        let detectors = (1..=4).map(|n| Spectrum::counts(n, vec![f64::from(n); nbins]));
        Workspace::new(
            x,
            std::iter::once(monitor).chain(detectors).collect(),
            AxisUnit::TimeChannel,
            RunMetadata::new(42, "IN16B"),
        )
        .unwrap()
    }

    fn grouping() -> DetectorGrouping {
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
        .unwrap()
    }

    #[test]
    fn test_reduce_fills_context() {
        let grouping = grouping();
        let reducer = RunReducer::new(&grouping, UnmirrorOption::Sum, None, false);
        let mut context = RunContext::new(RunNumber(42));
        reducer.reduce(raw(16), &mut context).unwrap();

        for phase in Phase::ALL {
            assert!(context.contains(phase), "missing {phase}");
        }
        let grouped = context.get(Phase::DetectorsGrouped).unwrap();
        assert_eq!(grouped.num_spectra(), 2);
        let reduced = context.get(Phase::Reduced).unwrap();
        assert_eq!(
            reduced.metadata.logs.get(LOG_UNMIRROR_OPTION),
            Some(&LogValue::Text("3".to_string()))
        );
        assert_eq!(
            reduced.metadata.logs.get(LOG_SUM_RUNS),
            Some(&LogValue::Text("false".to_string()))
        );
    }

    #[test]
    fn test_option_zero_has_no_vnorm() {
        let grouping = grouping();
        let reducer = RunReducer::new(&grouping, UnmirrorOption::NormaliseOnly, None, true);
        let mut context = RunContext::new(RunNumber(42));
        reducer.reduce(raw(16), &mut context).unwrap();
        assert!(!context.contains(Phase::VanadiumNormalised));
        assert_eq!(context.get(Phase::Reduced).unwrap().num_bins(), 16);
    }

    #[test]
    fn test_failure_leaves_context_empty() {
        let grouping = DetectorGrouping::new(vec![DetectorGroup {
            spectrum_no: 1,
            members: vec![99],
        }])
        .unwrap();
        let reducer = RunReducer::new(&grouping, UnmirrorOption::Sum, None, false);
        let mut context = RunContext::new(RunNumber(42));
        assert!(reducer.reduce(raw(16), &mut context).is_err());
        assert_eq!(context.phases().count(), 0);
    }
}
