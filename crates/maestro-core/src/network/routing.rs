//! Precomputed source/destination path characteristics, consulted on every
//! simulated packet delivery.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::addressing::IpAssignment;
use crate::network::graph::NetworkGraph;
use crate::network::types::NodeId;
use crate::units::Nanosecs;

/// The cost of the chosen path between two used nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathCost {
    pub latency: Nanosecs,
    pub reliability: f64,
}

impl PathCost {
    const SELF: PathCost = PathCost {
        latency: Nanosecs::ZERO,
        reliability: 1.0,
    };
}

/// Routing information for every pair of nodes that hosts were assigned to.
/// Immutable after construction, except for the per-pair packet counters.
#[derive(Debug)]
pub struct RoutingInfo {
    assignment: IpAssignment,
    paths: FxHashMap<(NodeId, NodeId), PathCost>,
    counters: FxHashMap<(NodeId, NodeId), AtomicU64>,
}

impl RoutingInfo {
    /// Computes path costs between all pairs of nodes in use by `assignment`.
    ///
    /// With `use_shortest_path`, paths are minimum-latency routes through the
    /// graph; otherwise every pair of used nodes must be joined by a direct
    /// link.
    pub fn new(
        graph: &NetworkGraph,
        assignment: IpAssignment,
        use_shortest_path: bool,
    ) -> Result<Self, RoutingError> {
        let mut used = assignment.nodes_in_use().collect::<Vec<_>>();
        used.sort_unstable();
        for &node in &used {
            if !graph.contains(node) {
                return Err(RoutingError::UnknownNode(node));
            }
        }
        let paths = if use_shortest_path {
            shortest_paths(graph, &used)
        } else {
            direct_paths(graph, &used)?
        };
        let counters = paths
            .keys()
            .map(|&pair| (pair, AtomicU64::new(0)))
            .collect();
        Ok(Self {
            assignment,
            paths,
            counters,
        })
    }

    fn cost(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<&PathCost> {
        let src = self.assignment.node_of(src)?;
        let dst = self.assignment.node_of(dst)?;
        self.paths.get(&(src, dst))
    }

    /// Path latency in nanoseconds, or `None` if the pair is not routable.
    pub fn latency_ns(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<Nanosecs> {
        self.cost(src, dst).map(|c| c.latency)
    }

    /// Per-packet delivery probability, or `None` if the pair is not routable.
    pub fn reliability(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<f64> {
        self.cost(src, dst).map(|c| c.reliability)
    }

    pub fn is_routable(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.cost(src, dst).is_some()
    }

    /// Bumps the per-pair packet counter. Statistics only; a packet between
    /// unroutable endpoints is silently ignored.
    pub fn record_packet(&self, src: Ipv4Addr, dst: Ipv4Addr) {
        let (Some(src), Some(dst)) = (self.assignment.node_of(src), self.assignment.node_of(dst))
        else {
            return;
        };
        if let Some(counter) = self.counters.get(&(src, dst)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn packets_recorded(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<u64> {
        let src = self.assignment.node_of(src)?;
        let dst = self.assignment.node_of(dst)?;
        self.counters
            .get(&(src, dst))
            .map(|c| c.load(Ordering::Relaxed))
    }

    pub fn total_packets(&self) -> u64 {
        self.counters.values().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// The smallest latency between two distinct used nodes, which bounds the
    /// conservative time window.
    pub fn smallest_latency(&self) -> Option<Nanosecs> {
        self.paths
            .iter()
            .filter(|&(&(src, dst), _)| src != dst)
            .map(|(_, cost)| cost.latency)
            .min()
    }

    pub fn assignment(&self) -> &IpAssignment {
        &self.assignment
    }
}

/// Minimum-latency path costs from every used node, fanned out across a
/// thread pool and collected over a channel.
fn shortest_paths(graph: &NetworkGraph, used: &[NodeId]) -> FxHashMap<(NodeId, NodeId), PathCost> {
    use rayon::prelude::*;

    let targets = used.iter().copied().collect::<FxHashSet<_>>();
    let (s, r) = crossbeam_channel::unbounded();
    used.par_iter().for_each_with(s, |s, &src| {
        let costs = single_source(graph, src, &targets);
        s.send((src, costs)).unwrap(); // the channel should never become disconnected
    });
    let mut paths = FxHashMap::default();
    for (src, costs) in r {
        for (dst, cost) in costs {
            paths.insert((src, dst), cost);
        }
    }
    paths
}

/// Dijkstra by latency from `src`, keeping the delivery probability of the
/// chosen path alongside the distance. Unreachable targets are simply absent
/// (not routable).
fn single_source(
    graph: &NetworkGraph,
    src: NodeId,
    targets: &FxHashSet<NodeId>,
) -> FxHashMap<NodeId, PathCost> {
    let g = &graph.graph;
    // checked against the graph in `RoutingInfo::new`
    let start = *graph.idx_of(&src).unwrap();

    let mut best: FxHashMap<NodeIndex, PathCost> = FxHashMap::default();
    best.insert(start, PathCost::SELF);
    let mut heap = BinaryHeap::new();
    heap.push((Reverse(Nanosecs::ZERO), start));

    while let Some((Reverse(dist), idx)) = heap.pop() {
        if dist > best[&idx].latency {
            // stale heap entry
            continue;
        }
        let reliability = best[&idx].reliability;
        for edge in g.edges(idx) {
            let chan = edge.weight();
            let next = edge.target();
            let latency = dist.saturating_add(chan.latency());
            let better = match best.get(&next) {
                Some(cost) => latency < cost.latency,
                None => true,
            };
            if better {
                best.insert(
                    next,
                    PathCost {
                        latency,
                        reliability: reliability * chan.reliability(),
                    },
                );
                heap.push((Reverse(latency), next));
            }
        }
    }

    best.into_iter()
        .filter_map(|(idx, cost)| {
            let id = g[idx].id;
            targets.contains(&id).then_some((id, cost))
        })
        .collect()
}

/// Direct-link path costs. Every pair of distinct used nodes must be joined
/// by an edge.
fn direct_paths(
    graph: &NetworkGraph,
    used: &[NodeId],
) -> Result<FxHashMap<(NodeId, NodeId), PathCost>, RoutingError> {
    let mut paths = FxHashMap::default();
    for &a in used {
        for &b in used {
            if a == b {
                paths.insert((a, b), PathCost::SELF);
                continue;
            }
            // both checked against the graph in `RoutingInfo::new`
            let i = *graph.idx_of(&a).unwrap();
            let j = *graph.idx_of(&b).unwrap();
            let eidx = graph
                .find_edge(i, j)
                .ok_or(RoutingError::Disconnected { a, b })?;
            let chan = &graph.graph[eidx];
            paths.insert(
                (a, b),
                PathCost {
                    latency: chan.latency(),
                    reliability: chan.reliability(),
                },
            );
        }
    }
    Ok(paths)
}

/// Reasons routing information cannot be generated.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// A host was assigned to a node the graph does not contain.
    #[error("node {0} is in use but not present in the network graph")]
    UnknownNode(NodeId),

    /// Two used nodes have no direct link in direct routing mode.
    #[error("no direct link between used nodes {a} and {b}")]
    Disconnected {
        /// The source node.
        a: NodeId,
        /// The destination node.
        b: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;
    use crate::testing;
    use crate::units::Millisecs;

    fn assigned_pair(graph: &NetworkGraph) -> anyhow::Result<(RoutingInfo, Ipv4Addr, Ipv4Addr)> {
        let mut assignment = IpAssignment::new();
        let src = assignment.assign(NodeId::new(0))?;
        let dst = assignment.assign(NodeId::new(1))?;
        let routing = RoutingInfo::new(graph, assignment, true)?;
        Ok((routing, src, dst))
    }

    #[test]
    fn shortest_path_sums_latencies() -> anyhow::Result<()> {
        // 0 -- 2 -- 1 with 1ms per hop
        let graph =
            NetworkGraph::new(&testing::three_node_spec()).context("failed to create graph")?;
        let (routing, src, dst) = assigned_pair(&graph)?;
        assert_eq!(
            routing.latency_ns(src, dst),
            Some(Nanosecs::from(Millisecs::new(2)))
        );
        assert_eq!(routing.latency_ns(src, src), Some(Nanosecs::ZERO));
        assert_eq!(routing.smallest_latency(), Some(Nanosecs::from(Millisecs::new(2))));
        Ok(())
    }

    #[test]
    fn reliability_is_the_path_product() -> anyhow::Result<()> {
        let mut spec = testing::three_node_spec();
        for link in &mut spec.links {
            link.packet_loss = 0.1;
        }
        let graph = NetworkGraph::new(&spec).context("failed to create graph")?;
        let (routing, src, dst) = assigned_pair(&graph)?;
        let reliability = routing.reliability(src, dst).context("pair not routable")?;
        assert!((reliability - 0.81).abs() < 1e-9);
        assert_eq!(routing.reliability(src, src), Some(1.0));
        Ok(())
    }

    #[test]
    fn unknown_addresses_are_not_routable() -> anyhow::Result<()> {
        let graph =
            NetworkGraph::new(&testing::three_node_spec()).context("failed to create graph")?;
        let (routing, src, _) = assigned_pair(&graph)?;
        let stranger = Ipv4Addr::new(192, 168, 0, 1);
        assert!(!routing.is_routable(src, stranger));
        assert_eq!(routing.latency_ns(src, stranger), None);
        assert_eq!(routing.reliability(stranger, src), None);
        Ok(())
    }

    #[test]
    fn disconnected_nodes_are_not_routable() -> anyhow::Result<()> {
        // 0 -- 1, and an isolated pair 2 -- 3
        let spec = testing::split_spec();
        let graph = NetworkGraph::new(&spec).context("failed to create graph")?;
        let mut assignment = IpAssignment::new();
        let a = assignment.assign(NodeId::new(0))?;
        let c = assignment.assign(NodeId::new(2))?;
        let routing = RoutingInfo::new(&graph, assignment, true)?;
        assert!(!routing.is_routable(a, c));
        assert!(routing.is_routable(a, a));
        Ok(())
    }

    #[test]
    fn direct_mode_requires_a_direct_link() -> anyhow::Result<()> {
        // 0 and 1 are joined only through 2
        let graph =
            NetworkGraph::new(&testing::three_node_spec()).context("failed to create graph")?;
        let mut assignment = IpAssignment::new();
        assignment.assign(NodeId::new(0))?;
        assignment.assign(NodeId::new(1))?;
        let res = RoutingInfo::new(&graph, assignment, false);
        assert!(matches!(res, Err(RoutingError::Disconnected { .. })));
        Ok(())
    }

    #[test]
    fn direct_mode_uses_the_edge_cost() -> anyhow::Result<()> {
        let graph =
            NetworkGraph::new(&testing::three_node_spec()).context("failed to create graph")?;
        let mut assignment = IpAssignment::new();
        let a = assignment.assign(NodeId::new(0))?;
        let b = assignment.assign(NodeId::new(2))?;
        let routing = RoutingInfo::new(&graph, assignment, false)?;
        assert_eq!(
            routing.latency_ns(a, b),
            Some(Nanosecs::from(Millisecs::new(1)))
        );
        Ok(())
    }

    #[test]
    fn using_an_unknown_node_fails() {
        let graph = NetworkGraph::new(&testing::three_node_spec()).unwrap();
        let mut assignment = IpAssignment::new();
        assignment.assign(NodeId::new(9)).unwrap();
        let res = RoutingInfo::new(&graph, assignment, true);
        assert!(matches!(res, Err(RoutingError::UnknownNode(..))));
    }

    #[test]
    fn packet_counters_accumulate() -> anyhow::Result<()> {
        let graph =
            NetworkGraph::new(&testing::three_node_spec()).context("failed to create graph")?;
        let (routing, src, dst) = assigned_pair(&graph)?;
        assert_eq!(routing.packets_recorded(src, dst), Some(0));
        routing.record_packet(src, dst);
        routing.record_packet(src, dst);
        routing.record_packet(dst, src);
        assert_eq!(routing.packets_recorded(src, dst), Some(2));
        assert_eq!(routing.packets_recorded(dst, src), Some(1));
        assert_eq!(routing.total_packets(), 3);
        // counters never feed back into path costs
        assert_eq!(
            routing.latency_ns(src, dst),
            Some(Nanosecs::from(Millisecs::new(2)))
        );
        Ok(())
    }
}
