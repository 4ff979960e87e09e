mod erf;

pub use erf::{logerfc, truncate_gaussian};
