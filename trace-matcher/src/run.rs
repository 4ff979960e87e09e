use rayon::prelude::*;
use trace_matcher_core::matching::{
    match_trace, DistanceCost, IntersectionCost, MapMatchingResult, MapMatchingTrace,
};

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::{io, output};

/// Loads the graph and trajectories named by `args`, matches every
/// trajectory in parallel, and writes the results in input order.
/// Individual trajectories that fail to match are logged and dropped;
/// only a load or write failure aborts the whole run.
pub fn command_line_runner(args: &CliArgs) -> Result<(), AppError> {
    let config = AppConfig::load(args.config_file.as_deref())?;
    let graph = io::graph::load_graph(&args.edges_file)?;
    let traces = io::trace::load_traces(&args.trace_file, &config.motion, config.network.road_width)?;
    log::info!("matching {} trajectories across {} threads", traces.len(), rayon::current_num_threads());

    let distance_cost = DistanceCost::uniform(config.search.off_network_distance_cost);
    let intersection_cost = IntersectionCost::uniform();

    let results: Vec<MapMatchingResult> = traces
        .par_iter()
        .filter_map(|trace: &MapMatchingTrace| {
            match match_trace(
                trace,
                &graph,
                &|e| distance_cost.call(e),
                &|u, v, k| intersection_cost.call(u, v, k),
                config.search.greedy_factor,
                config.search.relaxation_budget,
            ) {
                Ok(result) => Some(result),
                Err(e) => {
                    log::warn!("trajectory {} failed to match: {e}", trace.id);
                    None
                }
            }
        })
        .collect();

    log::info!("matched {} of {} trajectories", results.len(), traces.len());
    output::write_results(&args.output_file, &results)?;
    Ok(())
}
