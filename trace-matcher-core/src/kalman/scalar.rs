//! Scalar truncated-Gaussian moment matching shared by the 4-D position
//! state and the 2-D longitudinal projection state. Every inequality
//! constraint, one- or two-sided, reduces to "standardize, call
//! `truncate_gaussian`, scale back" -- kept in one place so both states
//! apply it identically.

use crate::error::NumericError;
use crate::numeric::truncate_gaussian;

/// Result of moment-matching a scalar Gaussian `mean ± sqrt(var)` against
/// bounds `[a, b]`: the negative log-probability paid, the standardized
/// mean shift `u`, and the standardized variance scale factor.
pub struct ConstraintMoments {
    pub distance: f64,
    pub u: f64,
    pub var_scale: f64,
    pub std: f64,
}

pub fn constrain(mean: f64, var: f64, a: f64, b: f64) -> Result<ConstraintMoments, NumericError> {
    if var <= 0.0 || !var.is_finite() {
        return Err(NumericError::NotPositiveSemidefinite);
    }
    let std = var.sqrt();
    let (log_p, u, var_scale) = truncate_gaussian((a - mean) / std, (b - mean) / std);
    if !log_p.is_finite() || !u.is_finite() || !var_scale.is_finite() {
        return Err(NumericError::NonFinite);
    }
    Ok(ConstraintMoments {
        distance: -log_p,
        u,
        var_scale,
        std,
    })
}

/// One-sided `X >= bound` distance.
pub fn lower_distance(mean: f64, var: f64, bound: f64) -> f64 {
    if var <= 0.0 || !var.is_finite() {
        return f64::INFINITY;
    }
    let std = var.sqrt();
    let (log_p, _, _) = truncate_gaussian((bound - mean) / std, f64::INFINITY);
    -log_p
}

/// One-sided `X <= bound` distance.
pub fn upper_distance(mean: f64, var: f64, bound: f64) -> f64 {
    if var <= 0.0 || !var.is_finite() {
        return f64::INFINITY;
    }
    let std = var.sqrt();
    let (log_p, _, _) = truncate_gaussian(f64::NEG_INFINITY, (bound - mean) / std);
    -log_p
}
