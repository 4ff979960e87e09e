use std::fs::File;
use std::io::{BufWriter, Write};

use trace_matcher_core::matching::MapMatchingResult;

use crate::error::AppError;

/// Writes one JSON object per line, in the same order as `results`.
pub fn write_results(path: &str, results: &[MapMatchingResult]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|source| AppError::IoFailure {
        path: path.to_string(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    for result in results {
        let line = serde_json::to_string(result)?;
        writeln!(writer, "{line}").map_err(|source| AppError::IoFailure {
            path: path.to_string(),
            source,
        })?;
    }
    writer.flush().map_err(|source| AppError::IoFailure {
        path: path.to_string(),
        source,
    })?;
    Ok(())
}
