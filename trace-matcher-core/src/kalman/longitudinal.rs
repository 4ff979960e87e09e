use nalgebra::{SMatrix, SVector};

use super::scalar;

pub type Vector2 = SVector<f64, 2>;
pub type Matrix2 = SMatrix<f64, 2, 2>;

/// The 2-D `(along-edge position, along-edge speed)` view of a state after
/// it has been conditioned on lying on a segment. Carries its own, smaller
/// contract than the 4-D [`KalmanState`](super::KalmanState): a time update
/// for advancing along the segment's motion model, and the scalar distance
/// queries used to score continuations between consecutive projections.
#[derive(Debug, Clone, PartialEq)]
pub struct LongitudinalState {
    pub x: Vector2,
    pub p: Matrix2,
}

impl LongitudinalState {
    pub fn new(x: Vector2, p: Matrix2) -> Self {
        LongitudinalState { x, p }
    }

    fn symmetrize(&mut self) {
        self.p = (self.p + self.p.transpose()) * 0.5;
    }

    pub fn time_update(&mut self, f: &Matrix2, q: &Matrix2) {
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + q;
        self.symmetrize();
    }

    /// Non-mutating scalar measurement distance: `h . x` observed as `y`
    /// with variance `r`.
    pub fn measurement_distance(&self, y: f64, h: Vector2, r: f64) -> f64 {
        let mean = h.dot(&self.x);
        let var = (h.transpose() * self.p * h)[(0, 0)] + r;
        if var <= 0.0 || !var.is_finite() {
            return f64::INFINITY;
        }
        let innovation = y - mean;
        let d = 0.5 * innovation * innovation / var;
        if d.is_finite() {
            d
        } else {
            f64::INFINITY
        }
    }

    pub fn ineql_constraint_distance(&self, h: Vector2, bound: f64) -> f64 {
        let mean = h.dot(&self.x);
        let var = (h.transpose() * self.p * h)[(0, 0)];
        scalar::lower_distance(mean, var, bound)
    }

    pub fn ineqr_constraint_distance(&self, h: Vector2, bound: f64) -> f64 {
        let mean = h.dot(&self.x);
        let var = (h.transpose() * self.p * h)[(0, 0)];
        scalar::upper_distance(mean, var, bound)
    }
}
