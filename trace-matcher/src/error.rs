use thiserror::Error;

/// Top-level failure of the batch driver. Map-matching failures for
/// individual trajectories are not represented here: `MatchingError` is
/// logged and the trajectory dropped, per the engine's own error contract.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("failure reading configuration: {0}")]
    ConfigFailure(#[from] config::ConfigError),
    #[error("failure reading input file {path}: {source}")]
    IoFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failure parsing CSV at {path}: {source}")]
    CsvFailure {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("failure writing JSON output: {0}")]
    JsonFailure(#[from] serde_json::Error),
    #[error("edge graph has no edges; nothing to match against")]
    EmptyGraph,
    #[error("internal error: {0}")]
    InternalError(String),
}
