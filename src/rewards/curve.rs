//! Accuracy → Reward Curve
//!
//! `reward = round(base + (max - base) * (accuracy / 100) ^ steepness)`
//!
//! A steepness above 1 keeps low-accuracy payouts near `base` and spends
//! most of the range on the top end.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid curve parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    /// `max` is below `base`.
    #[error("max reward {max} is below base reward {base}")]
    MaxBelowBase {
        /// Configured base.
        base: u64,
        /// Configured max.
        max: u64,
    },
    /// Steepness must be finite and positive.
    #[error("invalid steepness {0}")]
    InvalidSteepness(f64),
}

/// Curve parameters, fixed per deployment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardCurveParams {
    /// Reward at 0% accuracy.
    pub base: u64,
    /// Reward at 100% accuracy.
    pub max: u64,
    /// Curve exponent.
    pub steepness: f64,
}

impl Default for RewardCurveParams {
    fn default() -> Self {
        Self {
            base: 100,
            max: 400,
            steepness: 2.5,
        }
    }
}

impl RewardCurveParams {
    /// Check the parameters describe a bounded, non-decreasing curve.
    pub fn validate(&self) -> Result<(), CurveError> {
        if self.max < self.base {
            return Err(CurveError::MaxBelowBase {
                base: self.base,
                max: self.max,
            });
        }
        if !self.steepness.is_finite() || self.steepness <= 0.0 {
            return Err(CurveError::InvalidSteepness(self.steepness));
        }
        Ok(())
    }
}

/// Token reward for an accuracy percentage.
///
/// Accuracy is clamped to [0, 100]; NaN pays `base`. The result always
/// lies in [base, max] for validated parameters.
pub fn reward(accuracy_percent: f64, params: &RewardCurveParams) -> u64 {
    if accuracy_percent.is_nan() {
        return params.base;
    }
    let fraction = accuracy_percent.clamp(0.0, 100.0) / 100.0;
    let span = params.max.saturating_sub(params.base) as f64;
    let raw = params.base as f64 + span * fraction.powf(params.steepness);
    // Float rounding can overshoot at the top of very large ranges
    (raw.round() as u64).clamp(params.base, params.max.max(params.base))
}

// =============================================================================
// TESTS
// =============================================================================
