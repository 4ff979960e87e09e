mod longitudinal;
mod scalar;
mod state;

pub use longitudinal::LongitudinalState;
pub use state::KalmanState;
