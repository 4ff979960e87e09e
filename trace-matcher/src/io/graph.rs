use geo::Coord;
use serde::Deserialize;
use trace_matcher_core::graph::{InMemoryRoadGraph, RoadGraphBuilder, VertexId};

use crate::error::AppError;

/// One row of the edges CSV: an edge between `from`/`to`, with its polyline
/// given as a `;`-delimited list of `x,y` points (at least two).
#[derive(Debug, Deserialize)]
struct EdgeRow {
    from: usize,
    to: usize,
    geometry: String,
}

fn parse_geometry(path: &str, geometry: &str) -> Result<Vec<Coord<f64>>, AppError> {
    geometry
        .split(';')
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| AppError::InternalError(format!("malformed point {pair:?} in {path}")))?;
            let x: f64 = x
                .trim()
                .parse()
                .map_err(|_| AppError::InternalError(format!("bad x coordinate in {pair:?}")))?;
            let y: f64 = y
                .trim()
                .parse()
                .map_err(|_| AppError::InternalError(format!("bad y coordinate in {pair:?}")))?;
            Ok(Coord { x, y })
        })
        .collect()
}

/// Reads an edges CSV into an [`InMemoryRoadGraph`]. One edge per row;
/// vertex ids are whatever integers the caller used, reused across rows
/// that share an endpoint.
pub fn load_graph(path: &str) -> Result<InMemoryRoadGraph, AppError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| AppError::CsvFailure {
        path: path.to_string(),
        source,
    })?;
    let mut builder = RoadGraphBuilder::new();
    let mut count = 0usize;
    for record in reader.deserialize() {
        let row: EdgeRow = record.map_err(|source| AppError::CsvFailure {
            path: path.to_string(),
            source,
        })?;
        let polyline = parse_geometry(path, &row.geometry)?;
        builder.add_edge(VertexId(row.from), VertexId(row.to), polyline);
        count += 1;
    }
    if count == 0 {
        return Err(AppError::EmptyGraph);
    }
    log::info!("loaded {count} edges from {path}");
    Ok(builder.build())
}
