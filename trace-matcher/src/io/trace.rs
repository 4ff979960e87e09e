use std::collections::BTreeMap;

use nalgebra::{SMatrix, SVector};
use serde::Deserialize;
use trace_matcher_core::kalman::KalmanState;
use trace_matcher_core::matching::MapMatchingTrace;

use crate::config::MotionConfig;
use crate::error::AppError;

type Matrix4 = SMatrix<f64, 4, 4>;

#[derive(Debug, Deserialize)]
struct FixRow {
    trajectory_id: String,
    seq: i64,
    x: f64,
    y: f64,
}

/// Constant-velocity transition: position advances by the previous step's
/// velocity, velocity is held constant up to process noise.
fn transition_matrices(motion: &MotionConfig) -> (Matrix4, Matrix4) {
    #[rustfmt::skip]
    let f = Matrix4::new(
        1.0, 0.0, 1.0, 0.0,
        0.0, 1.0, 0.0, 1.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    let q = Matrix4::from_diagonal(&SVector::<f64, 4>::new(
        motion.position_noise,
        motion.position_noise,
        motion.velocity_noise,
        motion.velocity_noise,
    ));
    (f, q)
}

/// Builds the initial Kalman belief for a trajectory's first fix: position
/// at the raw fix, velocity estimated from the first two fixes (zero, and
/// large-variance, if there is only one), position variance from config.
fn initial_states(motion: &MotionConfig, points: &[(f64, f64)]) -> Vec<KalmanState> {
    let p0 = Matrix4::from_diagonal(&SVector::<f64, 4>::new(
        motion.position_variance,
        motion.position_variance,
        motion.velocity_noise * 10.0,
        motion.velocity_noise * 10.0,
    ));
    points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let (vx, vy) = match points.get(i + 1) {
                Some(&(nx, ny)) => (nx - x, ny - y),
                None if i > 0 => {
                    let (px, py) = points[i - 1];
                    (x - px, y - py)
                }
                None => (0.0, 0.0),
            };
            KalmanState::new(SVector::<f64, 4>::new(x, y, vx, vy), p0)
        })
        .collect()
}

/// Reads a fixes CSV grouped by `trajectory_id`, ordered by `seq` within
/// each group, into one [`MapMatchingTrace`] per trajectory. Trajectory
/// order in the returned vector follows first appearance in the file.
pub fn load_traces(
    path: &str,
    motion: &MotionConfig,
    road_width: f64,
) -> Result<Vec<MapMatchingTrace>, AppError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| AppError::CsvFailure {
        path: path.to_string(),
        source,
    })?;

    let mut order: Vec<String> = Vec::new();
    let mut grouped: BTreeMap<String, Vec<(i64, f64, f64)>> = BTreeMap::new();
    for record in reader.deserialize() {
        let row: FixRow = record.map_err(|source| AppError::CsvFailure {
            path: path.to_string(),
            source,
        })?;
        let entry = grouped.entry(row.trajectory_id.clone()).or_insert_with(|| {
            order.push(row.trajectory_id.clone());
            Vec::new()
        });
        entry.push((row.seq, row.x, row.y));
    }

    let transition = transition_matrices(motion);
    let traces = order
        .into_iter()
        .map(|id| {
            let mut fixes = grouped.remove(&id).unwrap_or_default();
            fixes.sort_by_key(|&(seq, _, _)| seq);
            let points: Vec<(f64, f64)> = fixes.iter().map(|&(_, x, y)| (x, y)).collect();
            let states = initial_states(motion, &points);
            MapMatchingTrace {
                id,
                states,
                transition,
                road_width,
            }
        })
        .collect();
    Ok(traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn motion() -> MotionConfig {
        MotionConfig {
            position_noise: 1.0,
            velocity_noise: 0.1,
            position_variance: 25.0,
        }
    }

    #[test]
    fn groups_fixes_by_trajectory_preserving_seq_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trajectory_id,seq,x,y").unwrap();
        writeln!(file, "a,1,10.0,0.0").unwrap();
        writeln!(file, "b,1,0.0,0.0").unwrap();
        writeln!(file, "a,0,0.0,0.0").unwrap();
        let traces = load_traces(file.path().to_str().unwrap(), &motion(), 2.0).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].id, "a");
        assert_eq!(traces[0].states.len(), 2);
        assert!((traces[0].states[0].x[0] - 0.0).abs() < 1e-9);
        assert!((traces[0].states[1].x[0] - 10.0).abs() < 1e-9);
    }
}
