use crate::units::{BitsPerSec, Nanosecs};

#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    derive_more::FromStr,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct NodeId(usize);

impl NodeId {
    pub const ZERO: NodeId = Self::new(0);

    pub const fn new(val: usize) -> Self {
        Self(val)
    }

    pub const fn inner(self) -> usize {
        self.0
    }
}

/// An attachment point in the network graph. Hosts placed on a node inherit
/// its bandwidth annotations unless their own options override them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub bandwidth_down: Option<BitsPerSec>,
    #[serde(default)]
    pub bandwidth_up: Option<BitsPerSec>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            bandwidth_down: None,
            bandwidth_up: None,
        }
    }

    pub fn with_bandwidth(
        id: NodeId,
        down: impl Into<BitsPerSec>,
        up: impl Into<BitsPerSec>,
    ) -> Self {
        Self {
            id,
            bandwidth_down: Some(down.into()),
            bandwidth_up: Some(up.into()),
        }
    }
}

/// A bidirectional link between two graph nodes.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LinkSpec {
    pub a: NodeId,
    pub b: NodeId,
    pub latency: Nanosecs,
    #[serde(default)]
    pub packet_loss: f64,
}

impl LinkSpec {
    pub fn new(a: NodeId, b: NodeId, latency: impl Into<Nanosecs>) -> Self {
        Self {
            a,
            b,
            latency: latency.into(),
            packet_loss: 0.0,
        }
    }

    pub fn with_packet_loss(mut self, packet_loss: f64) -> Self {
        self.packet_loss = packet_loss;
        self
    }

    pub fn connects(&self, x: NodeId, y: NodeId) -> bool {
        self.a == x && self.b == y || self.a == y && self.b == x
    }
}

/// A unidirectional channel materialized from one direction of a link.
#[derive(Debug, Clone, Copy, PartialEq, derive_new::new, serde::Serialize)]
pub struct Channel {
    pub(crate) src: NodeId,
    pub(crate) dst: NodeId,
    pub(crate) latency: Nanosecs,
    pub(crate) packet_loss: f64,
}

impl Channel {
    pub fn latency(&self) -> Nanosecs {
        self.latency
    }

    /// Per-packet delivery probability over this channel.
    pub fn reliability(&self) -> f64 {
        1.0 - self.packet_loss
    }
}

/// The serializable description a [`NetworkGraph`](crate::network::NetworkGraph)
/// is built from.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<Node>,
    pub links: Vec<LinkSpec>,
}
