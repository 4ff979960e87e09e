use nalgebra::{SMatrix, SVector};

use super::longitudinal::LongitudinalState;
use super::scalar::{self, constrain};
use crate::error::NumericError;

pub type Vector4 = SVector<f64, 4>;
pub type Matrix4 = SMatrix<f64, 4, 4>;
pub type Vector2 = SVector<f64, 2>;
pub type Matrix2x4 = SMatrix<f64, 2, 4>;
pub type Matrix2 = SMatrix<f64, 2, 2>;

/// A Gaussian belief `(x, P)` over `(x, y, vx, vy)`. Every mutating method
/// leaves `P` symmetric (modulo floating-point tolerance); callers that
/// need the pre-update value should `clone` first.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    pub x: Vector4,
    pub p: Matrix4,
}

impl KalmanState {
    pub fn new(x: Vector4, p: Matrix4) -> Self {
        KalmanState { x, p }
    }

    fn symmetrize(&mut self) {
        self.p = (self.p + self.p.transpose()) * 0.5;
    }

    pub fn time_update(&mut self, f: &Matrix4, q: &Matrix4) {
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + q;
        self.symmetrize();
    }

    /// Unscented time update: propagates `2n` sigma points through the
    /// nonlinear `f` and refits mean/covariance, adding process noise `q`.
    pub fn unscented_time_update(
        &mut self,
        f: impl Fn(&Vector4) -> Vector4,
        q: &Matrix4,
    ) -> Result<(), NumericError> {
        let scaled = self.p * 4.0;
        let sqrt_p = cholesky_sqrt4(&scaled)?;
        let sigma_points: Vec<Vector4> = (0..4)
            .flat_map(|i| {
                let r = sqrt_p.column(i).into_owned();
                [f(&(self.x + r)), f(&(self.x - r))]
            })
            .collect();
        let n = sigma_points.len() as f64;
        let mean = sigma_points.iter().fold(Vector4::zeros(), |acc, v| acc + v) / n;
        let cov = sigma_points.iter().fold(Matrix4::zeros(), |acc, v| {
            let d = v - mean;
            acc + d * d.transpose()
        }) / n;
        self.x = mean;
        self.p = cov + q;
        self.symmetrize();
        Ok(())
    }

    fn innovation_covariance(&self, h: &Matrix2x4, r: &Matrix2) -> Matrix2 {
        h * self.p * h.transpose() + r
    }

    /// Standard Kalman measurement update; returns the Mahalanobis distance
    /// of the innovation divided by two (the negative log-likelihood up to
    /// a constant).
    pub fn measurement_update(
        &mut self,
        y: Vector2,
        h: Matrix2x4,
        r: Matrix2,
    ) -> Result<f64, NumericError> {
        let s = self.innovation_covariance(&h, &r);
        let s_inv = invert2(&s)?;
        let k = self.p * h.transpose() * s_inv;
        let innovation = y - h * self.x;
        self.x += k * innovation;
        let ikh = Matrix4::identity() - k * h;
        self.p = ikh * self.p * ikh.transpose() + k * r * k.transpose();
        self.symmetrize();
        distance_from_innovation(&innovation, &s_inv)
    }

    /// Sigma-point measurement update for a nonlinear observation model
    /// `h`, using the empirical cross-covariance `Pxy`.
    pub fn unscented_measurement_update(
        &mut self,
        y: Vector2,
        h: impl Fn(&Vector4) -> Vector2,
        r: Matrix2,
    ) -> Result<f64, NumericError> {
        let scaled = self.p * 4.0;
        let sqrt_p = cholesky_sqrt4(&scaled)?;
        let deltas: Vec<Vector4> = (0..4)
            .flat_map(|i| {
                let d = sqrt_p.column(i).into_owned();
                [d, -d]
            })
            .collect();
        let zs: Vec<Vector2> = deltas.iter().map(|d| h(&(self.x + d))).collect();
        let n = zs.len() as f64;
        let mean_z = zs.iter().fold(Vector2::zeros(), |acc, z| acc + z) / n;
        let mut pzz = Matrix2::zeros();
        let mut pxz = SMatrix::<f64, 4, 2>::zeros();
        for (d, z) in deltas.iter().zip(zs.iter()) {
            let dz = z - mean_z;
            pzz += dz * dz.transpose();
            pxz += d * dz.transpose();
        }
        pzz /= n;
        pxz /= n;
        let s = pzz + r;
        let s_inv = invert2(&s)?;
        let k = pxz * s_inv;
        let innovation = y - mean_z;
        self.x += k * innovation;
        self.p -= k * s * k.transpose();
        self.symmetrize();
        distance_from_innovation(&innovation, &s_inv)
    }

    /// Rauch-Tung-Striebel smoother step: `next` is the already-smoothed
    /// belief one step ahead; `f`/`q` is the same transition used in the
    /// forward pass between this state and `next`.
    pub fn smooth_update(&mut self, next: &KalmanState, f: &Matrix4, q: &Matrix4) -> Result<(), NumericError> {
        let pred_x = f * self.x;
        let pred_p = f * self.p * f.transpose() + q;
        let pred_p_inv = invert4(&pred_p)?;
        let c = self.p * f.transpose() * pred_p_inv;
        self.x += c * (next.x - pred_x);
        self.p += c * (next.p - pred_p) * c.transpose();
        self.symmetrize();
        Ok(())
    }

    /// Treats `D x = d` as a zero-noise measurement.
    pub fn constraint_update(&mut self, d_val: Vector2, d: Matrix2x4) -> Result<f64, NumericError> {
        self.measurement_update(d_val, d, Matrix2::zeros())
    }

    /// For each row `omega` of `d` (in order), constrains `omega . x` into
    /// `[a_i, b_i]` by moment-matching against a truncated Gaussian, and
    /// accumulates `-log p` across rows.
    pub fn ineq_constraint_update(&mut self, d: Matrix2x4, a: Vector2, b: Vector2) -> Result<f64, NumericError> {
        let mut total = 0.0;
        for i in 0..2 {
            let omega = d.row(i).transpose();
            let mean = omega.dot(&self.x);
            let var = (omega.transpose() * self.p * omega)[(0, 0)];
            let moments = constrain(mean, var, a[i], b[i])?;
            total += moments.distance;
            let p_omega = self.p * omega;
            self.x += p_omega * (moments.u / moments.std);
            let var2 = moments.std * moments.std;
            let s = (p_omega * p_omega.transpose()) / var2;
            self.p += s * (moments.var_scale - 1.0);
            self.symmetrize();
        }
        Ok(total)
    }

    /// Returns `(D x, D P D^T)` without mutating `self`.
    pub fn transform(&self, d: Matrix2x4) -> LongitudinalState {
        LongitudinalState::new(d * self.x, d * self.p * d.transpose())
    }

    pub fn measurement_distance(&self, y: Vector2, h: Matrix2x4, r: Matrix2) -> f64 {
        let s = self.innovation_covariance(&h, &r);
        match invert2(&s) {
            Ok(s_inv) => {
                let innovation = y - h * self.x;
                distance_from_innovation(&innovation, &s_inv).unwrap_or(f64::INFINITY)
            }
            Err(_) => f64::INFINITY,
        }
    }

    pub fn eq_constraint_distance(&self, d_val: Vector2, d: Matrix2x4) -> f64 {
        self.measurement_distance(d_val, d, Matrix2::zeros())
    }

    pub fn ineql_constraint_distance(&self, omega: Vector4, bound: f64) -> f64 {
        let mean = omega.dot(&self.x);
        let var = (omega.transpose() * self.p * omega)[(0, 0)];
        scalar::lower_distance(mean, var, bound)
    }

    pub fn ineqr_constraint_distance(&self, omega: Vector4, bound: f64) -> f64 {
        let mean = omega.dot(&self.x);
        let var = (omega.transpose() * self.p * omega)[(0, 0)];
        scalar::upper_distance(mean, var, bound)
    }
}

fn distance_from_innovation(innovation: &Vector2, s_inv: &Matrix2) -> Result<f64, NumericError> {
    let d = 0.5 * (innovation.transpose() * s_inv * innovation)[(0, 0)];
    if !d.is_finite() {
        return Err(NumericError::NonFinite);
    }
    Ok(d)
}

fn invert2(m: &Matrix2) -> Result<Matrix2, NumericError> {
    m.try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or_else(|| NumericError::DecompositionFailed("2x2 matrix not invertible".to_string()))
}

fn invert4(m: &Matrix4) -> Result<Matrix4, NumericError> {
    m.try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or_else(|| NumericError::DecompositionFailed("4x4 matrix not invertible".to_string()))
}

fn cholesky_sqrt4(m: &Matrix4) -> Result<Matrix4, NumericError> {
    nalgebra::linalg::Cholesky::new(*m)
        .map(|c| c.l())
        .filter(|l| l.iter().all(|v| v.is_finite()))
        .ok_or_else(|| NumericError::DecompositionFailed("covariance is not positive-definite".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity_state() -> KalmanState {
        KalmanState::new(Vector4::new(0.0, 0.0, 1.0, 1.0), Matrix4::identity())
    }

    #[test]
    fn time_update_keeps_p_symmetric_and_psd() {
        let mut s = identity_state();
        let f = Matrix4::new(
            1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        );
        let q = Matrix4::identity() * 0.01;
        s.time_update(&f, &q);
        assert_relative_eq!((s.p - s.p.transpose()).norm(), 0.0, epsilon = 1e-10);
        let eigen = s.p.symmetric_eigenvalues();
        assert!(eigen.iter().all(|&v| v >= -1e-9));
    }

    #[test]
    fn measurement_update_reduces_uncertainty() {
        let mut s = identity_state();
        let h = Matrix2x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        let r = Matrix2::identity() * 0.01;
        let trace_before = s.p.trace();
        s.measurement_update(Vector2::new(0.0, 0.0), h, r).unwrap();
        assert!(s.p.trace() < trace_before);
    }

    #[test]
    fn eq_constraint_distance_zero_iff_satisfied() {
        let s = identity_state();
        let d = Matrix2x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        let satisfied = s.eq_constraint_distance(Vector2::new(0.0, 0.0), d);
        assert!((0.0..1e-6).contains(&satisfied));
        let unsatisfied = s.eq_constraint_distance(Vector2::new(5.0, 5.0), d);
        assert!(unsatisfied > satisfied);
    }

    #[test]
    fn ineq_constraint_distance_zero_inside_box() {
        let s = identity_state();
        let omega = Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert!(s.ineql_constraint_distance(omega, -5.0) < 1e-6);
        assert!(s.ineqr_constraint_distance(omega, 5.0) < 1e-6);
        assert!(s.ineql_constraint_distance(omega, 5.0) > 1.0);
    }
}
