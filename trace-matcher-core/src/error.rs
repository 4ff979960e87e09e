use thiserror::Error;

/// A matrix operation (solve, Cholesky, inverse) produced a non-finite or
/// non-positive-semidefinite result. Callers treat this as infinite cost
/// rather than propagating a hard failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("matrix operation produced a non-finite result")]
    NonFinite,
    #[error("covariance matrix is not positive-semidefinite")]
    NotPositiveSemidefinite,
    #[error("required matrix decomposition failed: {0}")]
    DecompositionFailed(String),
}

/// A segment or edge was geometrically degenerate (zero length) or an edge
/// had no geometry at all. Treated as infinite projection cost.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("segment has zero length")]
    DegenerateSegment,
    #[error("edge has no geometry")]
    EmptyEdge,
}

impl From<NumericError> for GeometryError {
    fn from(_: NumericError) -> Self {
        GeometryError::DegenerateSegment
    }
}

/// The search exhausted its relaxation budget, or its open set emptied,
/// before reaching the Final node. Surfaced to the caller so the trajectory
/// can be dropped and logged.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no path found within the relaxation budget of {budget} for trajectory {trajectory_id}")]
pub struct NoPathError {
    pub trajectory_id: String,
    pub budget: usize,
}

/// Top-level error surfaced by the map-matching engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchingError {
    #[error("trajectory has no states to match")]
    EmptyTrace,
    #[error(transparent)]
    NoPath(#[from] NoPathError),
}
