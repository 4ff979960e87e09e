mod cost;
mod matcher;
mod node;
mod path;
mod projection;
pub(crate) mod search;
mod segment;

pub use cost::{DistanceCost, IntersectionCost, OFF_NETWORK_DISTANCE_COST};
pub use matcher::{match_trace, MapMatchingPoint, MapMatchingResult, MapMatchingTrace};
pub use node::{ForwardingNodeData, LinkedNodeData, Node, NodeKey};
pub use path::{format_path, Bound, MatchedSegment};
pub use projection::{Projection, ProjectionKey, ProjectionManager, INITIAL_QUANTILE};
pub use search::{find_best_path, SearchConfig, DEFAULT_RELAXATION_BUDGET};
pub use segment::{Link, LinkManager, Segment};
