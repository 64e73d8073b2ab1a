//! Extraction of one half of a mirrored acquisition.

use indirect_core::{Result, Workspace};

use crate::energy::{convert_to_energy_transfer, EnergyTransfer};
use crate::monitor::{monitor_range, MonitorRange};

/// Every workspace produced while extracting one half.
#[derive(Debug, Clone)]
pub struct ExtractedHalf {
    /// Energy-transfer spectra.
    pub reduced: Workspace,
    /// Cropped monitor, axis starting at 0.
    pub monitor: Workspace,
    /// Cropped grouped detectors, axis starting at 0.
    pub det_grouped: Workspace,
    /// Monitor-normalised detectors with the out-of-range bins masked.
    pub mnorm: Workspace,
    /// `mnorm` divided by the calibration.
    pub vnorm: Workspace,
    /// Axis mapping applied to `vnorm`.
    pub transfer: EnergyTransfer,
    /// Monitor plateau used for masking.
    pub monitor_range: MonitorRange,
}

/// Crops, normalises, masks and converts one half of the time-channel axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorSplitter<'a> {
    calibration: Option<&'a Workspace>,
}

impl<'a> MirrorSplitter<'a> {
    /// Splitter dividing by `calibration`, if given.
    #[must_use]
    pub fn new(calibration: Option<&'a Workspace>) -> Self {
        Self { calibration }
    }

    /// Extracts the part of `det_grouped` and `monitor` inside `[x_start, x_end)`.
    ///
    /// The cropped axes are shifted to start at 0 so that both halves of a
    /// run share the same channel range before energy conversion.
    ///
    /// # Errors
    /// Propagates crop, shape and monitor-range errors.
    pub fn extract(
        &self,
        det_grouped: &Workspace,
        monitor: &Workspace,
        x_start: f64,
        x_end: f64,
    ) -> Result<ExtractedHalf> {
        let mut det_grouped = det_grouped.crop(x_start, x_end)?;
        let mut monitor = monitor.crop(x_start, x_end)?;

        let offset = -det_grouped.x()[0];
        det_grouped.shift_x(offset);
        monitor.shift_x(offset);

        let mut mnorm = det_grouped.normalise_to_monitor(&monitor)?;
        let replaced = mnorm.replace_nan(0.0);
        if replaced > 0 {
            log::debug!("replaced {replaced} NaN bins after monitor normalisation");
        }

        let monitor_range = monitor_range(&monitor)?;
        let masked = mnorm.mask_outside(monitor_range.xmin, monitor_range.xmax);
        log::debug!("masked {masked} bins outside the monitor range");

        let vnorm = match self.calibration {
            Some(calibration) => mnorm.divide(calibration)?,
            None => mnorm.clone(),
        };
        let (reduced, transfer) = convert_to_energy_transfer(&vnorm)?;

        Ok(ExtractedHalf {
            reduced,
            monitor,
            det_grouped,
            mnorm,
            vnorm,
            transfer,
            monitor_range,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::cast_precision_loss)]
    use super::*;
    use indirect_core::metadata::{LOG_MAXIMUM_DELTA_ENERGY, LOG_VELOCITY_PROFILE};
    use indirect_core::{AxisUnit, RunMetadata, Spectrum};

    fn mirrored(nbins: usize) -> (Workspace, Workspace) {
        let meta = RunMetadata::new(5, "IN16B")
            .with_log(LOG_MAXIMUM_DELTA_ENERGY, 10.0)
            .with_log(LOG_VELOCITY_PROFILE, 0.0);
        let x: Vec<f64> = (0..=nbins).map(|i| i as f64).collect();
        let monitor_y: Vec<f64> = (0..nbins)
            .map(|i| {
                let pos = (i % (nbins / 2)) as f64;
                let d1 = pos - 4.0;
                let d2 = pos - (nbins / 2 - 5) as f64;
                100.0 + 1000.0 * ((-d1 * d1).exp() + (-d2 * d2).exp())
            })
            .collect();
        let monitor = Workspace::new(
            x.clone(),
            vec![Spectrum::counts(0, monitor_y)],
            AxisUnit::TimeChannel,
            meta.clone(),
        )
        .unwrap();
        let detectors = Workspace::new(
            x,
            vec![
                Spectrum::counts(1, vec![50.0; nbins]),
                Spectrum::counts(2, vec![20.0; nbins]),
            ],
            AxisUnit::TimeChannel,
            meta,
        )
        .unwrap();
        (detectors, monitor)
    }

    #[test]
    fn test_right_half_starts_at_zero() {
        let (det, mon) = mirrored(32);
        let half = MirrorSplitter::default()
            .extract(&det, &mon, 16.0, f64::INFINITY)
            .unwrap();
        assert_eq!(half.det_grouped.x()[0], 0.0);
        assert_eq!(half.monitor.x()[0], 0.0);
        assert_eq!(half.det_grouped.num_bins(), 16);
        assert_eq!(half.reduced.unit(), AxisUnit::DeltaE);
    }

    #[test]
    fn test_out_of_range_bins_masked() {
        let (det, mon) = mirrored(32);
        let half = MirrorSplitter::default()
            .extract(&det, &mon, 0.0, 16.0)
            .unwrap();
        // peaks at channels 4 and 11 of each half
        assert_eq!(half.monitor_range.imin, 3);
        assert_eq!(half.monitor_range.imax, 13);
        let mask = &half.mnorm.spectrum(0).unwrap().mask;
        assert!(mask[..3].iter().all(|&m| m));
        assert!(mask[3..13].iter().all(|&m| !m));
        assert!(mask[13..].iter().all(|&m| m));
        assert_eq!(half.reduced.spectrum(1).unwrap().mask, *mask);
    }

    #[test]
    fn test_calibration_divides_vnorm() {
        let (det, mon) = mirrored(32);
        let calibration = Workspace::new(
            vec![0.0],
            vec![
                Spectrum::with_errors(1, vec![2.0], vec![0.0]),
                Spectrum::with_errors(2, vec![4.0], vec![0.0]),
            ],
            AxisUnit::TimeChannel,
            RunMetadata::default(),
        )
        .unwrap();
        let half = MirrorSplitter::new(Some(&calibration))
            .extract(&det, &mon, 0.0, 16.0)
            .unwrap();
        let mnorm = &half.mnorm.spectrum(1).unwrap().y;
        let vnorm = &half.vnorm.spectrum(1).unwrap().y;
        for (m, v) in mnorm.iter().zip(vnorm) {
            assert!((m / 4.0 - v).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_monitor_counts_become_zero() {
        let (det, mut mon) = mirrored(32);
        let mut spectrum = mon.spectrum(0).unwrap().clone();
        spectrum.y[20] = 0.0;
        mon = mon.with_spectra(vec![spectrum]);
        let mut det_spectra = det.spectra().to_vec();
        det_spectra[0].y[20] = 0.0;
        let det = det.with_spectra(det_spectra);

        let half = MirrorSplitter::default()
            .extract(&det, &mon, 16.0, f64::INFINITY)
            .unwrap();
        assert_eq!(half.mnorm.spectrum(0).unwrap().y[4], 0.0);
    }
}
