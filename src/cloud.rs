//! Cloud detection: per-sample local polynomial fits over the brightness
//! series.
//!
//! A cloud crossing the sensor's field produces a smooth but non-linear
//! brightness deviation, while a photometric sky follows a slowly varying
//! baseline that a local line (or, near night edges, a short quadratic)
//! fits tightly. The residual sum of squares of that fit is the per-sample
//! cloudiness score.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};

/// Scores are floored here so an exact-zero residual (flat window) stays
/// distinguishable from an unset value.
pub const SCORE_FLOOR: f64 = 1e-5;

/// One fit assignment for one sample of a night.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitWindow {
    pub center: usize,
    /// Half-open index range of the points entering the fit.
    pub range: Range<usize>,
    pub degree: usize,
}

/// Iterate the fit windows covering every sample of the night
/// `start..=end`, which must hold at least `3 * window` samples (the
/// short-night filter guarantees this upstream).
///
/// Interior samples get the full symmetric window and a straight-line fit;
/// samples within `2 * window` of either night edge get a one-sided
/// half-window with an extra curvature term, since no symmetric window
/// exists there.
pub fn fit_windows(
    start: usize,
    end: usize,
    window: usize,
) -> impl Iterator<Item = FitWindow> {
    let half = (window - 1) / 2;
    (start..=end).map(move |i| {
        if i + 2 * window >= end {
            FitWindow {
                center: i,
                range: i - half..i,
                degree: 2,
            }
        } else if i <= start + 2 * window {
            FitWindow {
                center: i,
                range: i..i + half,
                degree: 2,
            }
        } else {
            FitWindow {
                center: i,
                range: i - half..i + half + 1,
                degree: 1,
            }
        }
    })
}

/// Residual sum of squares of a least-squares polynomial fit of `y`
/// against `x`, floored at [`SCORE_FLOOR`].
///
/// The abscissae are re-centered on their mean before building the design
/// matrix; Julian days are large enough that raw powers lose precision.
/// A numerically degenerate system (a constant window) legitimately means
/// "no cloud" and comes back as the floor, never an error.
pub fn fit_residual(x: &[f64], y: &[f64], degree: usize) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len();
    if n == 0 {
        return SCORE_FLOOR;
    }

    let mean = x.iter().sum::<f64>() / n as f64;
    let design = DMatrix::from_fn(n, degree + 1, |r, c| (x[r] - mean).powi(c as i32));
    let rhs = DVector::from_column_slice(y);

    let svd = design.clone().svd(true, true);
    match svd.solve(&rhs, 1e-12) {
        Ok(coeffs) => {
            let residual = &design * &coeffs - &rhs;
            residual.norm_squared().max(SCORE_FLOOR)
        }
        Err(_) => SCORE_FLOOR,
    }
}

/// Score every sample of the night `start..=end` into `scores`.
/// `x` is the (Julian day) time axis and `y` the brightness series, both
/// indexed like `scores`.
pub fn score_night(x: &[f64], y: &[f64], start: usize, end: usize, window: usize, scores: &mut [f64]) {
    for fw in fit_windows(start, end, window) {
        scores[fw.center] = fit_residual(&x[fw.range.clone()], &y[fw.range], fw.degree);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_every_sample_once() {
        let (start, end, w) = (10usize, 100usize, 9usize);
        let windows: Vec<_> = fit_windows(start, end, w).collect();
        assert_eq!(windows.len(), end - start + 1);
        for (k, fw) in windows.iter().enumerate() {
            assert_eq!(fw.center, start + k);
            assert!(fw.range.start >= start, "window escapes night: {fw:?}");
            assert!(fw.range.end <= end + 1, "window escapes night: {fw:?}");
            assert!(!fw.range.is_empty());
        }
    }

    #[test]
    fn interior_windows_are_symmetric_lines() {
        let w = 9;
        let fw = fit_windows(0, 100, w)
            .find(|fw| fw.center == 50)
            .unwrap();
        assert_eq!(fw.degree, 1);
        assert_eq!(fw.range, 46..55);
        assert_eq!(fw.range.len(), w);
    }

    #[test]
    fn edges_get_half_windows_with_curvature() {
        let w = 9;
        let first = fit_windows(0, 100, w).next().unwrap();
        assert_eq!(first.degree, 2);
        assert_eq!(first.range, 0..4);

        let last = fit_windows(0, 100, w).last().unwrap();
        assert_eq!(last.degree, 2);
        assert_eq!(last.range, 96..100);
    }

    #[test]
    fn minimum_length_night_stays_in_bounds() {
        // Exactly 3 * window samples: all windows must stay inside.
        let w = 9;
        for fw in fit_windows(0, 3 * w - 1, w) {
            assert!(fw.range.end <= 3 * w);
            assert!(!fw.range.is_empty());
        }
    }

    #[test]
    fn flat_series_scores_the_floor() {
        let x: Vec<f64> = (0..19).map(|i| i as f64 / 288.0).collect();
        let y = vec![21.0; 19];
        assert_eq!(fit_residual(&x, &y, 1), SCORE_FLOOR);
        assert_eq!(fit_residual(&x[..9], &y[..9], 2), SCORE_FLOOR);
    }

    #[test]
    fn linear_trend_fits_a_line_exactly() {
        let x: Vec<f64> = (0..19).map(|i| i as f64 / 288.0).collect();
        let y: Vec<f64> = x.iter().map(|&t| 21.0 + 0.5 * t).collect();
        assert_eq!(fit_residual(&x, &y, 1), SCORE_FLOOR);
    }

    #[test]
    fn quadratic_trend_fits_degree_two_exactly() {
        let x: Vec<f64> = (0..9).map(|i| i as f64 / 288.0).collect();
        let y: Vec<f64> = x.iter().map(|&t| 21.0 - 3.0 * t + 40.0 * t * t).collect();
        assert_eq!(fit_residual(&x, &y, 2), SCORE_FLOOR);
    }

    #[test]
    fn step_excursion_raises_the_score() {
        // A 1-magnitude step inside the window leaves a large line-fit
        // residual.
        let x: Vec<f64> = (0..19).map(|i| i as f64 / 288.0).collect();
        let mut y = vec![21.0; 19];
        for v in y.iter_mut().take(13).skip(7) {
            *v = 20.0;
        }
        let score = fit_residual(&x, &y, 1);
        assert!(score > 0.009, "score = {score}");
    }

    #[test]
    fn scores_are_finite_and_floored() {
        let n = 60;
        let x: Vec<f64> = (0..n).map(|i| i as f64 / 288.0).collect();
        let y: Vec<f64> = (0..n).map(|i| 21.0 + 0.05 * (i as f64 * 0.7).sin()).collect();
        let mut scores = vec![f64::NAN; n];
        score_night(&x, &y, 0, n - 1, 9, &mut scores);
        for s in scores {
            assert!(s.is_finite());
            assert!(s >= SCORE_FLOOR);
        }
    }
}
