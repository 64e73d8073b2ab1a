//! Elastic peak position (EPP) estimators.
//!
//! [`find_epp`] fits a Gaussian on a flat background to the dominant peak of
//! a spectrum with Levenberg-Marquardt damped least squares.
//! [`peak_maximum_position`] is the plain maximum-bin estimator for peaks too
//! narrow to fit.
#![allow(clippy::cast_precision_loss, clippy::many_single_char_names)]

use indirect_core::Spectrum;

const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949;
const WINDOW_FWHM: f64 = 3.0;
const MAX_ITERATIONS: usize = 200;
const MIN_POINTS: usize = 5;

/// Fitted peak parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPeak {
    /// Peak height above the background.
    pub height: f64,
    /// Peak centre in x units.
    pub centre: f64,
    /// Standard deviation in x units.
    pub sigma: f64,
    /// Flat background level.
    pub background: f64,
    /// Sum of squared residuals inside the fit window.
    pub chi_squared: f64,
}

impl GaussianPeak {
    /// Full width at half maximum.
    #[must_use]
    pub fn fwhm(&self) -> f64 {
        self.sigma * FWHM_TO_SIGMA
    }

    fn eval(params: &[f64; 4], x: f64) -> f64 {
        let [h, c, s, b] = *params;
        let d = x - c;
        h * (-0.5 * d * d / (s * s)).exp() + b
    }
}

/// Outcome of a peak fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeakSearch {
    /// The fit converged to a valid peak.
    Converged(GaussianPeak),
    /// No peak, too few points or a degenerate fit.
    NotConverged,
}

impl PeakSearch {
    /// Fitted centre, if the fit converged.
    #[must_use]
    pub fn centre(&self) -> Option<f64> {
        match self {
            Self::Converged(peak) => Some(peak.centre),
            Self::NotConverged => None,
        }
    }
}

/// Index of the largest value, ignoring NaN. Ties resolve to the first index.
#[must_use]
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Maximum-bin peak estimator.
///
/// Returns the index of the largest count, unless it lies in the central
/// band `[mid - n/4, mid + n/4)`, in which case no clear peak is assumed and
/// the midpoint is returned.
#[must_use]
pub fn peak_maximum_position(y: &[f64]) -> Option<usize> {
    let imax = argmax(y)?;
    let quarter = y.len() / 4;
    let mid = y.len() / 2;
    if (mid - quarter..mid + quarter).contains(&imax) {
        log::debug!("maximum at {imax} is central, using midpoint {mid}");
        Some(mid)
    } else {
        Some(imax)
    }
}

/// Fits the dominant peak of `spectrum` sampled at `centres`.
///
/// `centres` holds one x value per bin (bin centres for histogram data).
/// Masked and non-finite bins are excluded.
#[must_use]
pub fn find_epp(centres: &[f64], spectrum: &Spectrum) -> PeakSearch {
    let points: Vec<(f64, f64)> = centres
        .iter()
        .zip(&spectrum.y)
        .zip(&spectrum.mask)
        .filter(|((x, y), &masked)| !masked && x.is_finite() && y.is_finite())
        .map(|((&x, &y), _)| (x, y))
        .collect();

    let Some(initial) = initial_guess(&points) else {
        log::debug!("spectrum {}: no peak to fit", spectrum.spectrum_no);
        return PeakSearch::NotConverged;
    };

    let half_width = WINDOW_FWHM * initial[2] * FWHM_TO_SIGMA;
    let window: Vec<(f64, f64)> = points
        .into_iter()
        .filter(|(x, _)| (x - initial[1]).abs() <= half_width)
        .collect();
    if window.len() < MIN_POINTS {
        log::debug!(
            "spectrum {}: {} points in fit window",
            spectrum.spectrum_no,
            window.len()
        );
        return PeakSearch::NotConverged;
    }

    match levenberg_marquardt(&window, initial) {
        Some(peak) => {
            log::debug!(
                "spectrum {}: peak at {} (sigma {})",
                spectrum.spectrum_no,
                peak.centre,
                peak.sigma
            );
            PeakSearch::Converged(peak)
        }
        None => PeakSearch::NotConverged,
    }
}

/// Starting parameters `[height, centre, sigma, background]` from the
/// maximum bin and the half-maximum crossings around it.
fn initial_guess(points: &[(f64, f64)]) -> Option<[f64; 4]> {
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let imax = argmax(&ys)?;
    let background = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let height = ys[imax] - background;
    if height.is_nan() || height <= 0.0 {
        return None;
    }

    let half = background + 0.5 * height;
    let left = (0..imax).rev().find(|&i| ys[i] < half).unwrap_or(0);
    let right = (imax + 1..ys.len())
        .find(|&i| ys[i] < half)
        .unwrap_or(ys.len() - 1);
    let mut fwhm = points[right].0 - points[left].0;
    if fwhm <= 0.0 {
        fwhm = points
            .windows(2)
            .map(|w| w[1].0 - w[0].0)
            .find(|&d| d > 0.0)?;
    }
    Some([height, points[imax].0, fwhm / FWHM_TO_SIGMA, background])
}

fn chi_squared(points: &[(f64, f64)], params: &[f64; 4]) -> f64 {
    points
        .iter()
        .map(|&(x, y)| {
            let r = y - GaussianPeak::eval(params, x);
            r * r
        })
        .sum()
}

fn levenberg_marquardt(points: &[(f64, f64)], initial: [f64; 4]) -> Option<GaussianPeak> {
    let mut params = initial;
    let mut chi2 = chi_squared(points, &params);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let [h, c, s, _] = params;
        let mut jtj = [[0.0; 4]; 4];
        let mut jtr = [0.0; 4];
        for &(x, y) in points {
            let d = x - c;
            let g = (-0.5 * d * d / (s * s)).exp();
            let jac = [g, h * g * d / (s * s), h * g * d * d / (s * s * s), 1.0];
            let r = y - GaussianPeak::eval(&params, x);
            for i in 0..4 {
                jtr[i] += jac[i] * r;
                for j in 0..4 {
                    jtj[i][j] += jac[i] * jac[j];
                }
            }
        }

        let mut damped = jtj;
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] += lambda * jtj[i][i].max(f64::EPSILON);
        }
        let Some(step) = solve4(damped, jtr) else {
            lambda *= 10.0;
            continue;
        };

        let trial = [
            params[0] + step[0],
            params[1] + step[1],
            params[2] + step[2],
            params[3] + step[3],
        ];
        let trial_chi2 = chi_squared(points, &trial);
        if trial_chi2.is_finite() && trial_chi2 <= chi2 {
            let improvement = chi2 - trial_chi2;
            params = trial;
            chi2 = trial_chi2;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement <= 1e-12 * chi2.max(f64::MIN_POSITIVE) {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    let [height, centre, sigma, background] = params;
    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.0), hi.max(p.0))
        });
    let valid = params.iter().all(|v| v.is_finite())
        && height > 0.0
        && sigma.abs() > 0.0
        && (lo..=hi).contains(&centre);
    valid.then_some(GaussianPeak {
        height,
        centre,
        sigma: sigma.abs(),
        background,
        chi_squared: chi2,
    })
}

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
fn solve4(mut a: [[f64; 4]; 4], mut b: [f64; 4]) -> Option<[f64; 4]> {
    for col in 0..4 {
        let pivot = (col..4).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..4 {
            let factor = a[row][col] / a[col][col];
            for k in col..4 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; 4];
    for row in (0..4).rev() {
        let tail: f64 = (row + 1..4).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
