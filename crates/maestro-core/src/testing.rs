//! Fixtures and a scripted [`Manager`] used by tests (and by nothing else).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::{
    ConfigOptions, GraphSource, HeartbeatInfo, HostOptions, LogLevel, ProcessOptions, QdiscKind,
};
use crate::controller::SimulationState;
use crate::manager::{HostParams, Manager, ProcessSpec};
use crate::network::types::{GraphSpec, LinkSpec, Node, NodeId};
use crate::units::{Bytes, Millisecs, Nanosecs, Secs};
use crate::window::ExecWindow;

/// Two annotated endpoints joined through a bare relay node, 1ms per hop.
pub fn three_node_spec() -> GraphSpec {
    let n1 = Node::with_bandwidth(NodeId::new(0), 1_000_000u64, 1_000_000u64);
    let n2 = Node::with_bandwidth(NodeId::new(1), 1_000_000u64, 1_000_000u64);
    let n3 = Node::new(NodeId::new(2));
    let l1 = LinkSpec::new(n1.id, n3.id, Millisecs::ONE);
    let l2 = LinkSpec::new(n2.id, n3.id, Millisecs::ONE);
    GraphSpec {
        nodes: vec![n1, n2, n3],
        links: vec![l1, l2],
    }
}

/// Two connected components: 0 -- 1 and 2 -- 3.
pub fn split_spec() -> GraphSpec {
    let nodes = (0..4usize)
        .map(|i| Node::with_bandwidth(NodeId::new(i), 1_000_000u64, 1_000_000u64))
        .collect::<Vec<_>>();
    let links = vec![
        LinkSpec::new(nodes[0].id, nodes[1].id, Millisecs::ONE),
        LinkSpec::new(nodes[2].id, nodes[3].id, Millisecs::ONE),
    ];
    GraphSpec { nodes, links }
}

/// A dumbbell: hosts 0 and 1 on one router, hosts 4 and 5 on the other, with
/// a 5ms trunk between routers 2 and 3.
pub fn dumbbell_spec() -> GraphSpec {
    let hosts = [0usize, 1, 4, 5]
        .into_iter()
        .map(|i| Node::with_bandwidth(NodeId::new(i), 10_000_000u64, 10_000_000u64));
    let routers = [2usize, 3].into_iter().map(|i| Node::new(NodeId::new(i)));
    let mut nodes = hosts.chain(routers).collect::<Vec<_>>();
    nodes.sort_by_key(|n| n.id);
    let links = vec![
        LinkSpec::new(NodeId::new(0), NodeId::new(2), Millisecs::ONE),
        LinkSpec::new(NodeId::new(1), NodeId::new(2), Millisecs::ONE),
        LinkSpec::new(NodeId::new(4), NodeId::new(3), Millisecs::ONE),
        LinkSpec::new(NodeId::new(5), NodeId::new(3), Millisecs::ONE),
        LinkSpec::new(NodeId::new(2), NodeId::new(3), Millisecs::new(5)),
    ];
    GraphSpec { nodes, links }
}

/// A configuration with sensible defaults, no hosts, and the given graph.
pub fn base_config(graph: GraphSpec) -> ConfigOptions {
    ConfigOptions {
        seed: 1,
        workers: 2,
        stop_time: Secs::new(60),
        bootstrap_end_time: Secs::ZERO,
        runahead: Millisecs::ZERO,
        use_shortest_path: true,
        log_level: LogLevel::Info,
        socket_send_buffer: Bytes::new(131_072),
        socket_recv_buffer: Bytes::new(174_760),
        socket_send_autotune: true,
        socket_recv_autotune: true,
        interface_buffer: Bytes::new(1_024_000),
        interface_qdisc: QdiscKind::Fifo,
        graph: GraphSource::Inline(graph),
        hosts: BTreeMap::new(),
    }
}

/// A host entry on `node` with no overrides and no processes.
pub fn host_on(node: NodeId) -> HostOptions {
    HostOptions {
        network_node_id: node,
        quantity: 1,
        ip_addr: None,
        bandwidth_down: None,
        bandwidth_up: None,
        log_level: None,
        heartbeat_log_level: None,
        heartbeat_log_info: vec![HeartbeatInfo::Node],
        heartbeat_interval: Secs::ONE,
        pcap_directory: None,
        processes: Vec::new(),
    }
}

/// A process entry starting at `start_secs`.
pub fn process(path: &str, start_secs: u64) -> ProcessOptions {
    ProcessOptions {
        path: path.into(),
        args: Vec::new(),
        environment: String::new(),
        quantity: 1,
        start_time: Secs::new(start_secs),
        stop_time: None,
    }
}

/// A manager that replays registered process start times as simulation
/// events, spawning a follow-up event one tick later for each one processed.
/// It records everything the controller hands it, so tests can inspect
/// registration order and the window protocol.
#[derive(Debug)]
pub struct ScriptedManager {
    state: Arc<SimulationState>,
    end_time: Nanosecs,
    tick: Nanosecs,
    events: BTreeSet<Nanosecs>,
    pub hosts: Vec<HostParams>,
    pub processes: Vec<(String, ProcessSpec)>,
    pub windows_seen: Vec<ExecWindow>,
    pub rounds: u64,
}

impl Manager for ScriptedManager {
    fn new(
        state: Arc<SimulationState>,
        _config: &ConfigOptions,
        end_time: Nanosecs,
        _bootstrap_end: Nanosecs,
        _seed: u32,
    ) -> Option<Self> {
        Some(Self {
            state,
            end_time,
            tick: Nanosecs::from(Millisecs::new(3)),
            events: BTreeSet::new(),
            hosts: Vec::new(),
            processes: Vec::new(),
            windows_seen: Vec::new(),
            rounds: 0,
        })
    }

    fn add_virtual_host(&mut self, params: HostParams) {
        self.hosts.push(params);
    }

    fn add_virtual_process(&mut self, hostname: &str, process: ProcessSpec) {
        self.events.insert(process.start_time);
        self.processes.push((hostname.to_string(), process));
    }

    fn raw_cpu_frequency_khz(&self) -> u64 {
        3_000_000
    }

    fn run(&mut self) {
        let mut window = self.state.execute_window();
        loop {
            while let Some(&next) = self.events.first() {
                if next >= window.end {
                    break;
                }
                self.events.pop_first();
                let follow_up = next.saturating_add(self.tick);
                if follow_up < self.end_time {
                    self.events.insert(follow_up);
                }
            }
            let min_next_event = self.events.first().copied().unwrap_or(Nanosecs::MAX);
            let status = self.state.finish_round(min_next_event);
            self.rounds += 1;
            self.windows_seen.push(status.window);
            window = status.window;
            if !status.keep_running {
                break;
            }
        }
    }

    fn shutdown(&mut self) -> i32 {
        0
    }
}
