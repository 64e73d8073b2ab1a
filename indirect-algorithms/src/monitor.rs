//! Valid x-range of a mirrored monitor trace.
//!
//! A mirrored monitor shows one dominant peak per half. The plateau between
//! them holds usable counts; everything outside is masked after
//! normalisation.

use indirect_core::{Error, Result, Workspace};

use crate::epp::argmax;

/// Bracketing indices and x-values of the monitor plateau.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorRange {
    /// Index of the lower bound.
    pub imin: usize,
    /// Index of the upper bound.
    pub imax: usize,
    /// Lower bound on the x-axis.
    pub xmin: f64,
    /// Upper bound on the x-axis.
    pub xmax: f64,
}

/// Locates the monitor plateau of the first spectrum of `monitor`.
///
/// The lower bound is one channel before the first-half maximum, the upper
/// bound two channels after the maximum of the trailing half-length slice.
/// Both indices are clamped to the axis.
///
/// # Errors
/// Returns a data error if either half is empty or holds only NaN.
pub fn monitor_range(monitor: &Workspace) -> Result<MonitorRange> {
    let x = monitor.x();
    let y = &monitor.spectrum(0)?.y;
    let mid = x.len() / 2;
    let nch = y.len();
    if mid == 0 || mid > nch {
        return Err(Error::Data(format!(
            "monitor with {nch} channels is too short to locate its peaks"
        )));
    }

    let first = argmax(&y[..mid])
        .ok_or_else(|| Error::Data("no finite counts in first monitor half".to_string()))?;
    let start = nch - mid;
    let second = argmax(&y[start..])
        .ok_or_else(|| Error::Data("no finite counts in second monitor half".to_string()))?;

    let imin = first.saturating_sub(1);
    let imax = (start + second + 2).min(x.len() - 1);
    let range = MonitorRange {
        imin,
        imax,
        xmin: x[imin],
        xmax: x[imax],
    };
    log::info!("monitor range {} to {}", range.xmin, range.xmax);
    Ok(range)
}
