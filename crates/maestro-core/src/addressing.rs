//! This module maps simulated hosts to IP addresses. Addresses are either
//! pinned (taken literally from host options) or drawn from an internal pool;
//! pinned hosts must be registered first so that generated addresses can
//! never shadow them.

use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

use crate::network::NodeId;
use crate::utils;

/// Bookkeeping for (graph node, IP address) pairs.
#[derive(Debug, Default)]
pub struct IpAssignment {
    ip2node: FxHashMap<Ipv4Addr, NodeId>,
    node2ips: FxHashMap<NodeId, Vec<Ipv4Addr>>,
    next_auto: u32,
}

impl IpAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pinned address on `node`.
    pub fn assign_with_ip(&mut self, node: NodeId, ip: Ipv4Addr) -> Result<(), AddressingError> {
        if ip.is_unspecified() || ip.is_loopback() || ip.is_broadcast() {
            return Err(AddressingError::Reserved(ip));
        }
        if self.ip2node.contains_key(&ip) {
            return Err(AddressingError::AddressInUse(ip));
        }
        self.record(node, ip);
        Ok(())
    }

    /// Draws the next free address from the pool and registers it on `node`.
    pub fn assign(&mut self, node: NodeId) -> Result<Ipv4Addr, AddressingError> {
        loop {
            let candidate =
                utils::auto_ip(self.next_auto).ok_or(AddressingError::AddressExhausted)?;
            self.next_auto += 1;
            // pinned addresses may already occupy part of the pool
            if utils::is_assignable(candidate) && !self.ip2node.contains_key(&candidate) {
                self.record(node, candidate);
                return Ok(candidate);
            }
        }
    }

    fn record(&mut self, node: NodeId, ip: Ipv4Addr) {
        self.ip2node.insert(ip, node);
        self.node2ips.entry(node).or_default().push(ip);
    }

    pub fn node_of(&self, ip: Ipv4Addr) -> Option<NodeId> {
        self.ip2node.get(&ip).copied()
    }

    pub fn ips_on(&self, node: NodeId) -> &[Ipv4Addr] {
        self.node2ips.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes_in_use(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node2ips.keys().copied()
    }

    delegate::delegate! {
        to self.ip2node {
            #[call(len)]
            pub fn len(&self) -> usize;

            #[call(is_empty)]
            pub fn is_empty(&self) -> bool;
        }
    }
}

/// Reasons an address cannot be handed out.
#[derive(Debug, thiserror::Error)]
pub enum AddressingError {
    /// The address is already assigned to a host.
    #[error("address {0} is already in use")]
    AddressInUse(Ipv4Addr),

    /// The automatic assignment pool is empty.
    #[error("no addresses left in the assignment pool")]
    AddressExhausted,

    /// The address is not usable by a simulated host.
    #[error("address {0} is reserved")]
    Reserved(Ipv4Addr),
}
