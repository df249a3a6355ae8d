use std::fmt;

use num::Float;
use serde::{Deserialize, Serialize};

use super::ValidationError;

pub const DEFAULT_RTOL: f64 = 1e-4;
pub const DEFAULT_ATOL: f64 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
        }
    }
}

impl Tolerance {
    /// `|a - b| <= atol + rtol * |b|`. Not symmetric: `b` is the reference value.
    /// Equal values (including matching infinities) are always close; NaN never is.
    /// An infinity is only close to the same infinity.
    pub fn is_close<A: Float>(&self, a: A, b: A) -> bool {
        if a == b {
            return true;
        }
        if a.is_infinite() || b.is_infinite() {
            return false;
        }
        let (Some(rtol), Some(atol)) = (
            <A as num::NumCast>::from(self.rtol),
            <A as num::NumCast>::from(self.atol),
        ) else {
            return false;
        };
        (a - b).abs() <= atol + rtol * b.abs()
    }
}

/// Percentage of golden elements the produced tensor does not reproduce, in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ToleranceVerdict(f64);

impl ToleranceVerdict {
    /// Every element mismatched.
    pub const WORST: ToleranceVerdict = ToleranceVerdict(100.0);
    pub const PERFECT: ToleranceVerdict = ToleranceVerdict(0.0);

    /// Clamps into `[0, 100]`; NaN becomes [Self::WORST].
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() {
            Self::WORST
        } else {
            Self(percent.clamp(0.0, 100.0))
        }
    }

    pub fn percent_failed(&self) -> f64 {
        self.0
    }

    pub fn percent_correct(&self) -> f64 {
        100.0 - self.0
    }

    /// Strict: a verdict equal to the threshold fails.
    pub fn passes(&self, max_percent_incorrect: f64) -> bool {
        self.0 < max_percent_incorrect
    }
}

impl fmt::Display for ToleranceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}%", self.0)
    }
}

pub fn count_mismatched<A: Float>(produced: &[A], golden: &[A], tolerance: &Tolerance) -> usize {
    produced
        .iter()
        .zip(golden)
        .filter(|&(&a, &b)| !tolerance.is_close(a, b))
        .count()
}

/// Compares element by element in memory order. Shapes are not checked here, only element counts.
/// An empty golden tensor has nothing to mismatch.
pub fn percent_mismatched<A: Float>(
    produced: &[A],
    golden: &[A],
    tolerance: &Tolerance,
) -> Result<ToleranceVerdict, ValidationError> {
    if produced.len() != golden.len() {
        return Err(ValidationError::ElementCountMismatch {
            produced: produced.len(),
            golden: golden.len(),
        });
    }
    if golden.is_empty() {
        return Ok(ToleranceVerdict::PERFECT);
    }
    let failed = count_mismatched(produced, golden, tolerance);
    Ok(ToleranceVerdict::from_percent(
        failed as f64 * 100.0 / golden.len() as f64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DEFAULT_MAX_PERCENT_INCORRECT;

    #[test]
    fn closeness_is_relative_to_the_golden_value() {
        let tol = Tolerance::default();
        assert!(tol.is_close(1.00005f32, 1.0));
        assert!(!tol.is_close(1.001f32, 1.0));
        // atol + rtol * |b| = 1e-4 + 1e-4 * 1000
        assert!(tol.is_close(1000.1f64, 1000.0));
        assert!(!tol.is_close(f32::NAN, f32::NAN));
        assert!(tol.is_close(f32::INFINITY, f32::INFINITY));
    }

    #[test]
    fn verdict_counts_mismatches() {
        let tol = Tolerance::default();
        let golden = [1.0f32, 2.0, 3.0, 4.0];
        let produced = [1.0f32, 2.5, 3.0, 4.0];
        let verdict = percent_mismatched(&produced, &golden, &tol).unwrap();
        assert_eq!(verdict.percent_failed(), 25.0);
        assert_eq!(verdict.percent_correct(), 75.0);
    }

    #[test]
    fn infinities_only_match_themselves() {
        let tol = Tolerance::default();
        assert!(!tol.is_close(5.0f64, f64::INFINITY));
        assert!(!tol.is_close(f64::NEG_INFINITY, f64::INFINITY));
        assert!(!tol.is_close(f32::INFINITY, 5.0));
        assert!(tol.is_close(f32::NEG_INFINITY, f32::NEG_INFINITY));

        let verdict = percent_mismatched(
            &[5.0f32, -1.0],
            &[f32::INFINITY, f32::NEG_INFINITY],
            &tol,
        )
        .unwrap();
        assert_eq!(verdict, ToleranceVerdict::WORST);
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        let err = percent_mismatched(&[1.0f32], &[1.0f32, 2.0], &Tolerance::default()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ElementCountMismatch { produced: 1, golden: 2 }
        ));
    }

    #[test]
    fn threshold_is_strict() {
        assert!(!ToleranceVerdict::from_percent(0.1).passes(0.1));
        assert!(ToleranceVerdict::from_percent(0.0999).passes(0.1));
        assert!(!ToleranceVerdict::WORST.passes(DEFAULT_MAX_PERCENT_INCORRECT));
        assert_eq!(ToleranceVerdict::from_percent(f64::NAN), ToleranceVerdict::WORST);
        assert_eq!(ToleranceVerdict::from_percent(250.0), ToleranceVerdict::WORST);
    }
}
