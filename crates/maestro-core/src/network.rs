//! The simulated network: topology graph, and the routing oracle derived from
//! it once host addresses are known.

mod graph;
mod routing;
pub mod types;

pub use graph::{GraphError, NetworkGraph};
pub use routing::{PathCost, RoutingError, RoutingInfo};
pub use types::*;
