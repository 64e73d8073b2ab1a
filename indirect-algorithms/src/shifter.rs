//! Peak alignment by circular shifting.
//!
//! Each source spectrum is rotated by the channel offset of the elastic peak
//! of the matching reference spectrum. Bins that wrap around the array
//! boundary no longer belong to their x value and are masked.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use indirect_core::{Error, Result, Spectrum, Workspace};

use crate::epp::{find_epp, PeakSearch};

/// Rotates `spectrum` by `offset` channels and masks the wrapped bins.
///
/// A negative offset rotates right (trailing values move to the front), a
/// positive offset rotates left. Masks travel with their bins.
pub fn circular_shift(spectrum: &mut Spectrum, offset: i64) {
    let n = spectrum.len();
    if offset == 0 || n == 0 {
        return;
    }
    let magnitude = usize::try_from(offset.unsigned_abs()).unwrap_or(usize::MAX);
    let k = magnitude % n;
    let wrapped = magnitude.min(n);

    if offset < 0 {
        spectrum.y.rotate_right(k);
        spectrum.e.rotate_right(k);
        spectrum.mask.rotate_right(k);
        spectrum.mask[..wrapped].fill(true);
    } else {
        spectrum.y.rotate_left(k);
        spectrum.e.rotate_left(k);
        spectrum.mask.rotate_left(k);
        spectrum.mask[n - wrapped..].fill(true);
    }
}

/// Signed channel offset of every reference spectrum's fitted peak from x = 0.
///
/// `None` marks spectra whose fit did not converge; they are not shifted.
#[must_use]
pub fn peak_positions(reference: &Workspace) -> Vec<Option<i64>> {
    let centres = reference.bin_centres();
    let width = match centres.as_slice() {
        [first, second, ..] => second - first,
        _ => 0.0,
    };
    if !(width.is_finite() && width > 0.0) {
        log::warn!("reference axis has zero bin width, spectra will not be shifted");
        return vec![None; reference.num_spectra()];
    }

    reference
        .spectra()
        .iter()
        .map(|spectrum| match find_epp(&centres, spectrum) {
            PeakSearch::Converged(peak) => Some((peak.centre / width).trunc() as i64),
            PeakSearch::NotConverged => {
                log::warn!(
                    "peak fit of spectrum {} did not converge, spectrum not shifted",
                    spectrum.spectrum_no
                );
                None
            }
        })
        .collect()
}

/// Shifts every spectrum of `source` onto the peak of the matching spectrum
/// of `reference`. The x-axis of `source` is kept.
///
/// # Errors
/// Returns a shape mismatch if the spectrum counts differ.
pub fn shift_spectra(source: &Workspace, reference: &Workspace) -> Result<Workspace> {
    if source.num_spectra() != reference.num_spectra() {
        return Err(Error::ShapeMismatch {
            operation: "shift spectra",
            detail: format!(
                "{} source spectra for {} reference spectra",
                source.num_spectra(),
                reference.num_spectra()
            ),
        });
    }
    log::info!("shifting {} spectra", source.num_spectra());

    let offsets = peak_positions(reference);
    let spectra = source
        .spectra()
        .iter()
        .zip(offsets)
        .map(|(spectrum, offset)| {
            let mut shifted = spectrum.clone();
            if let Some(offset) = offset {
                log::debug!("spectrum {}: shift {offset}", spectrum.spectrum_no);
                circular_shift(&mut shifted, offset);
            }
            shifted
        })
        .collect();
    Ok(source.with_spectra(spectra))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::cast_precision_loss, clippy::float_cmp)]
    use super::*;
    use indirect_core::{AxisUnit, RunMetadata};

    fn ramp(n: usize) -> Spectrum {
        Spectrum::counts(1, (0..n).map(|i| i as f64).collect())
    }

    #[test]
    fn test_left_rotation_masks_trailing() {
        let mut s = ramp(6);
        circular_shift(&mut s, 2);
        assert_eq!(s.y, vec![2.0, 3.0, 4.0, 5.0, 0.0, 1.0]);
        assert_eq!(s.mask, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn test_right_rotation_masks_leading() {
        let mut s = ramp(6);
        circular_shift(&mut s, -1);
        assert_eq!(s.y, vec![5.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.e[0], 5.0_f64.sqrt());
        assert_eq!(s.mask, vec![true, false, false, false, false, false]);
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let mut s = ramp(4);
        circular_shift(&mut s, 0);
        assert_eq!(s, ramp(4));
    }

    #[test]
    fn test_existing_mask_moves_with_bin() {
        let mut s = ramp(5);
        s.mask[3] = true;
        circular_shift(&mut s, 1);
        assert!(s.mask[2]);
        assert!(!s.mask[3]);
        assert!(s.mask[4]);
    }

    #[test]
    fn test_oversized_offset_masks_everything() {
        let mut s = ramp(4);
        circular_shift(&mut s, 9);
        assert_eq!(s.masked_count(), 4);
        assert_eq!(s.y, vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_shift_aligns_with_reference_peak() {
        let n = 40;
        let gauss = |centre: f64| -> Vec<f64> {
            (0..n)
                .map(|i| {
                    let d = i as f64 - centre;
                    100.0 * (-0.5 * d * d / 4.0).exp() + 1.0
                })
                .collect()
        };
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let reference = Workspace::new(
            x.clone(),
            vec![Spectrum::counts(1, gauss(5.4))],
            AxisUnit::TimeChannel,
            RunMetadata::default(),
        )
        .unwrap();
        let source = reference.with_spectra(vec![Spectrum::counts(1, gauss(25.0))]);

        assert_eq!(peak_positions(&reference), vec![Some(5)]);
        let shifted = shift_spectra(&source, &reference).unwrap();
        let y = &shifted.spectrum(0).unwrap().y;
        assert_eq!(crate::epp::argmax(y), Some(20));
        assert_eq!(shifted.x(), x.as_slice());
    }

    #[test]
    fn test_unconverged_reference_leaves_source() {
        let reference = Workspace::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![Spectrum::counts(1, vec![1.0; 4])],
            AxisUnit::TimeChannel,
            RunMetadata::default(),
        )
        .unwrap();
        let source = reference.with_spectra(vec![ramp(4)]);
        let shifted = shift_spectra(&source, &reference).unwrap();
        assert_eq!(shifted, source);
    }

    #[test]
    fn test_spectrum_count_mismatch() {
        let a = Workspace::new(
            vec![0.0, 1.0],
            vec![ramp(2), ramp(2)],
            AxisUnit::TimeChannel,
            RunMetadata::default(),
        )
        .unwrap();
        let b = a.extract_spectrum(0).unwrap();
        assert!(matches!(
            shift_spectra(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
