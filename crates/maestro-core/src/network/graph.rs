//! This module defines the in-memory network topology with per-node bandwidth
//! annotations. The graph is an intermediate artifact: the controller discards
//! it once routing information has been materialized.

use std::path::PathBuf;

use itertools::Itertools;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{ConfigOptions, GraphSource};
use crate::network::types::{Channel, GraphSpec, LinkSpec, Node, NodeId};
use crate::units::{BitsPerSec, Nanosecs};

/// The simulated network topology.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    pub(crate) graph: DiGraph<Node, Channel>,
    pub(crate) id2idx: FxHashMap<NodeId, NodeIndex>,
}

impl NetworkGraph {
    /// Builds a network graph from a specification. This function returns an
    /// error if the specification fails to produce a valid topology. The
    /// checks are not exhaustive.
    ///
    /// Correctness properties:
    ///
    /// - Every node must have a unique ID.
    /// - Node IDs must be contiguous.
    /// - Every link must have distinct endpoints in `nodes`.
    /// - For any two nodes, there must be at most one link between them.
    /// - Every link latency must be positive.
    /// - Every packet loss rate must be in `[0, 1)`.
    pub fn new(spec: &GraphSpec) -> Result<Self, GraphError> {
        let mut g = DiGraph::new();
        let mut id2idx = FxHashMap::default();
        for (i, n) in spec.nodes.iter().cloned().sorted_by_key(|n| n.id).enumerate() {
            let id = n.id;
            let idx = g.add_node(n);
            if id2idx.insert(id, idx).is_some() {
                // CORRECTNESS: Every node must have a unique ID.
                return Err(GraphError::DuplicateNodeId(id));
            }
            if id.inner() != i {
                // CORRECTNESS: Node IDs must be contiguous.
                return Err(GraphError::HoleBeforeId(id));
            }
        }
        let mut seen_pairs = FxHashSet::default();
        for &LinkSpec {
            a,
            b,
            latency,
            packet_loss,
        } in &spec.links
        {
            // CORRECTNESS: Every link must have distinct endpoints in `nodes`.
            if a == b {
                return Err(GraphError::NodeAdjacentSelf(a));
            }
            if !id2idx.contains_key(&a) {
                return Err(GraphError::UndeclaredNode(a));
            }
            if !id2idx.contains_key(&b) {
                return Err(GraphError::UndeclaredNode(b));
            }
            // CORRECTNESS: For any two nodes, there must be at most one link
            // between them.
            if !seen_pairs.insert((a.min(b), a.max(b))) {
                return Err(GraphError::DuplicateLink { n1: a, n2: b });
            }
            // CORRECTNESS: Every link latency must be positive. A zero-latency
            // link would collapse the conservative time window to nothing.
            if latency == Nanosecs::ZERO {
                return Err(GraphError::ZeroLatency { n1: a, n2: b });
            }
            // CORRECTNESS: Every packet loss rate must be in `[0, 1)`.
            if !(0.0..1.0).contains(&packet_loss) {
                return Err(GraphError::InvalidPacketLoss {
                    n1: a,
                    n2: b,
                    packet_loss,
                });
            }
            // Channels are unidirectional
            g.add_edge(id2idx[&a], id2idx[&b], Channel::new(a, b, latency, packet_loss));
            g.add_edge(id2idx[&b], id2idx[&a], Channel::new(b, a, latency, packet_loss));
        }
        Ok(Self { graph: g, id2idx })
    }

    /// Loads the graph named by the configuration, either inline or from a
    /// JSON file on disk.
    pub fn load(config: &ConfigOptions) -> Result<Self, GraphError> {
        match &config.graph {
            GraphSource::Inline(spec) => Self::new(spec),
            GraphSource::File { path } => {
                let contents = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
                    path: path.clone(),
                    source,
                })?;
                let spec: GraphSpec = serde_json::from_str(&contents)?;
                Self::new(&spec)
            }
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.id2idx.contains_key(&node)
    }

    pub fn bandwidth_down_bits(&self, node: NodeId) -> Option<BitsPerSec> {
        self.id2idx
            .get(&node)
            .and_then(|&idx| self.graph[idx].bandwidth_down)
    }

    pub fn bandwidth_up_bits(&self, node: NodeId) -> Option<BitsPerSec> {
        self.id2idx
            .get(&node)
            .and_then(|&idx| self.graph[idx].bandwidth_up)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.graph.edge_weights()
    }

    pub(crate) fn idx_of(&self, id: &NodeId) -> Option<&NodeIndex> {
        self.id2idx.get(id)
    }

    pub(crate) fn find_edge(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    delegate::delegate! {
        to self.graph {
            #[call(node_count)]
            pub fn nr_nodes(&self) -> usize;

            #[call(edge_count)]
            pub fn nr_channels(&self) -> usize;
        }
    }
}

/// An error type listing some of the reasons a graph specification is invalid.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Duplicate node ID.
    #[error("duplicate node ID {0}")]
    DuplicateNodeId(NodeId),

    /// Node IDs are not contiguous.
    #[error("node IDs not contiguous; hole before {0}")]
    HoleBeforeId(NodeId),

    /// A node is connected to itself.
    #[error("node {0} is connected to itself")]
    NodeAdjacentSelf(NodeId),

    /// A node is referenced by a link but does not exist.
    #[error("node {0} is not declared")]
    UndeclaredNode(NodeId),

    /// Duplicate link between two nodes.
    #[error("duplicate links between {n1} and {n2}")]
    DuplicateLink {
        /// The first node.
        n1: NodeId,
        /// The second node.
        n2: NodeId,
    },

    /// A link with zero latency.
    #[error("link between {n1} and {n2} has zero latency")]
    ZeroLatency {
        /// The first node.
        n1: NodeId,
        /// The second node.
        n2: NodeId,
    },

    /// A link with an out-of-range packet loss rate.
    #[error("link between {n1} and {n2} has packet loss {packet_loss} outside [0, 1)")]
    InvalidPacketLoss {
        /// The first node.
        n1: NodeId,
        /// The second node.
        n2: NodeId,
        /// The offending rate.
        packet_loss: f64,
    },

    /// Failed to read a graph file.
    #[error("failed to read graph file {}: {source}", .path.display())]
    Io {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Failed to parse a graph file.
    #[error("failed to parse graph file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;
    use crate::testing;
    use crate::units::{Millisecs, Nanosecs};

    #[test]
    fn empty_graph_succeeds() {
        let spec = GraphSpec {
            nodes: vec![],
            links: vec![],
        };
        assert!(NetworkGraph::new(&spec).is_ok(), "failed to create empty graph");
    }

    #[test]
    fn three_node_graph_works() -> anyhow::Result<()> {
        let spec = testing::three_node_spec();
        let graph = NetworkGraph::new(&spec).context("failed to create graph")?;
        assert_eq!(graph.nr_nodes(), 3);
        // two bidirectional links, one channel per direction
        assert_eq!(graph.nr_channels(), 4);
        Ok(())
    }

    #[test]
    fn bandwidth_annotations_are_queryable() -> anyhow::Result<()> {
        let spec = testing::three_node_spec();
        let graph = NetworkGraph::new(&spec).context("failed to create graph")?;
        assert!(graph.bandwidth_down_bits(NodeId::new(0)).is_some());
        // the relay node carries no bandwidth annotation
        assert!(graph.bandwidth_down_bits(NodeId::new(2)).is_none());
        assert!(graph.bandwidth_up_bits(NodeId::new(9)).is_none());
        Ok(())
    }

    #[test]
    fn duplicate_node_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(0)); // error
        let n3 = Node::new(NodeId::new(2));
        let l1 = LinkSpec::new(n1.id, n3.id, Millisecs::ONE);
        let spec = GraphSpec {
            nodes: vec![n1, n2, n3],
            links: vec![l1],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::DuplicateNodeId(..))));
    }

    #[test]
    fn non_contiguous_node_ids_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(2)); // error
        let l1 = LinkSpec::new(n1.id, n2.id, Millisecs::ONE);
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::HoleBeforeId(..))));
    }

    #[test]
    fn node_adjacent_self_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(1));
        let l1 = LinkSpec::new(n1.id, n2.id, Millisecs::ONE);
        let l2 = LinkSpec::new(n2.id, n2.id, Millisecs::ONE); // error
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1, l2],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::NodeAdjacentSelf(..))));
    }

    #[test]
    fn undeclared_node_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(1));
        let l1 = LinkSpec::new(n1.id, NodeId::new(7), Millisecs::ONE); // error
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::UndeclaredNode(..))));
    }

    #[test]
    fn duplicate_links_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(1));
        let l1 = LinkSpec::new(n1.id, n2.id, Millisecs::ONE);
        let l2 = LinkSpec::new(n2.id, n1.id, Millisecs::ONE); // error
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1, l2],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::DuplicateLink { .. })));
    }

    #[test]
    fn zero_latency_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(1));
        let l1 = LinkSpec::new(n1.id, n2.id, Nanosecs::ZERO); // error
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::ZeroLatency { .. })));
    }

    #[test]
    fn out_of_range_packet_loss_fails() {
        let n1 = Node::new(NodeId::new(0));
        let n2 = Node::new(NodeId::new(1));
        let l1 = LinkSpec::new(n1.id, n2.id, Millisecs::ONE).with_packet_loss(1.0); // error
        let spec = GraphSpec {
            nodes: vec![n1, n2],
            links: vec![l1],
        };
        let res = NetworkGraph::new(&spec);
        assert!(matches!(res, Err(GraphError::InvalidPacketLoss { .. })));
    }
}
