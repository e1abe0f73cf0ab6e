//! The simulation controller: owns global simulation state (topology,
//! addressing, DNS, randomness, run boundaries) and drives managers through
//! bounded time windows until the simulation terminates.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::addressing::{AddressingError, IpAssignment};
use crate::config::{ConfigOptions, HostOptions, LogLevel};
use crate::dns::{Dns, DnsError};
use crate::logging;
use crate::manager::{HostParams, Manager, ProcessSpec};
use crate::network::{GraphError, NetworkGraph, NodeId, RoutingError, RoutingInfo};
use crate::random::Random;
use crate::units::{BitsPerSec, Millisecs, Nanosecs};
use crate::window::{ExecWindow, RoundStatus, WindowEngine};

/// The capability object shared with managers. It exposes exactly what a
/// worker may touch mid-run: round completion, the routing oracle, DNS, and
/// the stop flag. Everything else stays owned by the [`Controller`].
#[derive(Debug)]
pub struct SimulationState {
    windows: Mutex<WindowEngine>,
    routing: OnceLock<RoutingInfo>,
    dns: Dns,
    stop_requested: AtomicBool,
}

impl SimulationState {
    fn new(engine: WindowEngine) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(engine),
            routing: OnceLock::new(),
            dns: Dns::new(),
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn dns(&self) -> &Dns {
        &self.dns
    }

    /// The routing oracle; `None` until host registration has completed and
    /// routing has been computed.
    pub fn routing(&self) -> Option<&RoutingInfo> {
        self.routing.get()
    }

    /// Path latency in milliseconds, or `None` if the pair is not routable.
    pub fn latency_ms(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<f64> {
        let latency = self.routing()?.latency_ns(src, dst)?;
        Some(latency.into_f64() / 1e6)
    }

    /// Per-packet delivery probability, or `None` if the pair is not
    /// routable.
    pub fn reliability(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<f64> {
        self.routing()?.reliability(src, dst)
    }

    pub fn is_routable(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.routing().is_some_and(|r| r.is_routable(src, dst))
    }

    /// Bumps the per-pair packet counter. Statistics only.
    pub fn record_packet(&self, src: Ipv4Addr, dst: Ipv4Addr) {
        if let Some(routing) = self.routing() {
            routing.record_packet(src, dst);
        }
    }

    /// The window the manager is currently allowed to execute in.
    pub fn execute_window(&self) -> ExecWindow {
        // the lock is never poisoned: no code panics while holding it
        self.windows.lock().unwrap().window()
    }

    /// Called by the manager when a round completes, with the earliest event
    /// time still pending. Commits the next window and says whether to keep
    /// running. The manager must serialize this call with its workers'
    /// rounds; it is the synchronization barrier between rounds.
    pub fn finish_round(&self, min_next_event_time: Nanosecs) -> RoundStatus {
        let mut windows = self.windows.lock().unwrap();
        if self.stop_requested.load(Ordering::SeqCst) {
            windows.terminate();
        }
        windows.finish_round(min_next_event_time)
    }

    /// Records a path latency observed by the topology layer, shrinking the
    /// candidate minimum time jump.
    pub fn update_min_time_jump(&self, observed: Millisecs) {
        self.windows.lock().unwrap().update_min_time_jump(observed);
    }

    /// Flags the run for early termination; the next round's window clamps
    /// to zero and the round loop exits.
    // TODO: have the CLI install SIGINT/SIGTERM handlers that call this.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        info!("early termination requested");
    }
}

/// The top-level coordinator. Exactly one per simulation run.
#[derive(Debug)]
pub struct Controller<'cfg, M> {
    config: &'cfg ConfigOptions,
    /// Wall-clock stopwatch covering the whole run.
    run_timer: Instant,
    random: Random,
    /// Owned until routing is computed, then released to save memory.
    graph: Option<NetworkGraph>,
    /// Owned during registration, then moved into the routing oracle.
    assignment: Option<IpAssignment>,
    state: Arc<SimulationState>,
    manager: Option<M>,
}

impl<'cfg, M: Manager> Controller<'cfg, M> {
    pub fn new(config: &'cfg ConfigOptions) -> Self {
        let controller = Self {
            config,
            run_timer: Instant::now(),
            random: Random::new(config.seed),
            graph: None,
            assignment: None,
            state: SimulationState::new(WindowEngine::new(config.runahead)),
            manager: None,
        };
        info!("simulation controller created");
        controller
    }

    /// The capability object handed to managers.
    pub fn state(&self) -> &Arc<SimulationState> {
        &self.state
    }

    /// The manager, if one has been spawned.
    pub fn manager(&self) -> Option<&M> {
        self.manager.as_ref()
    }

    /// Runs the simulation to completion and returns the process exit code:
    /// the manager's own code on success, `1` on any fatal setup error.
    pub fn run(&mut self) -> i32 {
        match self.try_run() {
            Ok(code) => code,
            Err(err) => {
                error!("simulation aborted: {err}");
                1
            }
        }
    }

    fn try_run(&mut self) -> Result<i32, ControllerError> {
        info!("loading and initializing simulation data");

        self.graph = Some(NetworkGraph::load(self.config)?);
        self.assignment = Some(IpAssignment::new());

        let stop_time = Nanosecs::from(self.config.stop_time);
        let bootstrap_end = Nanosecs::from(self.config.bootstrap_end_time);
        self.state
            .windows
            .lock()
            .unwrap()
            .initialize(self.config.workers, stop_time, bootstrap_end);

        let manager_seed = self.random.next_u32();
        let manager = M::new(
            Arc::clone(&self.state),
            self.config,
            stop_time,
            bootstrap_end,
            manager_seed,
        )
        // a controller without a worker cannot do anything sensible
        .expect("unable to create manager");
        self.manager = Some(manager);

        info!("registering plugins and hosts");

        {
            // all three were set above; the borrows are disjoint
            let graph = self.graph.as_ref().unwrap();
            let assignment = self.assignment.as_mut().unwrap();
            let manager = self.manager.as_mut().unwrap();
            register_hosts(self.config, graph, assignment, self.state.dns(), manager)?;
        }

        // now that we know which graph nodes are in use, compute path costs
        let assignment = self.assignment.take().unwrap();
        let routing = RoutingInfo::new(
            self.graph.as_ref().unwrap(),
            assignment,
            self.config.use_shortest_path,
        )?;
        if let Some(latency) = routing.smallest_latency() {
            let observed = latency.whole_millisecs();
            // sub-millisecond paths keep the default floor
            if observed > Millisecs::ZERO {
                self.state.update_min_time_jump(observed);
            }
        }
        let routing_stored = self.state.routing.set(routing).is_ok();
        assert!(routing_stored, "routing is computed once per controller");

        // we don't need the network graph anymore, so free it to save memory
        self.graph = None;
        debug!("released the network graph");

        info!("running simulation");

        // don't buffer log messages in trace mode
        let buffer_logs = self.config.log_level != LogLevel::Trace;
        if buffer_logs {
            info!("log message buffering is enabled for efficiency");
            logging::set_buffering(true);
        }

        // set above; run() borrows the manager mutably for the whole round loop
        self.manager.as_mut().unwrap().run();

        // only disable buffering if it was enabled, otherwise don't log the
        // message as it may confuse the user
        if buffer_logs {
            logging::set_buffering(false);
            info!("log message buffering is disabled during cleanup");
        }

        info!(
            elapsed = ?self.run_timer.elapsed(),
            "simulation finished, cleaning up now"
        );

        // set above; the manager itself is dropped with the controller
        Ok(self.manager.as_mut().unwrap().shutdown())
    }
}

impl<M> Drop for Controller<'_, M> {
    fn drop(&mut self) {
        if self.graph.is_some() {
            // this should have been released once routing was computed
            warn!("network graph was not properly freed");
        }
        info!("simulation controller destroyed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationPhase {
    Pinned,
    Auto,
}

/// Registers every configured host with the manager, pinned addresses first
/// so generated addresses can never shadow them.
fn register_hosts<M: Manager>(
    config: &ConfigOptions,
    graph: &NetworkGraph,
    assignment: &mut IpAssignment,
    dns: &Dns,
    manager: &mut M,
) -> Result<(), RegistrationError> {
    register_phase(config, graph, assignment, dns, manager, RegistrationPhase::Pinned)?;
    register_phase(config, graph, assignment, dns, manager, RegistrationPhase::Auto)?;
    Ok(())
}

fn register_phase<M: Manager>(
    config: &ConfigOptions,
    graph: &NetworkGraph,
    assignment: &mut IpAssignment,
    dns: &Dns,
    manager: &mut M,
    phase: RegistrationPhase,
) -> Result<(), RegistrationError> {
    for (name, host) in config.hosts() {
        let pinned = host.ip_addr.is_some();
        if pinned != (phase == RegistrationPhase::Pinned) {
            continue;
        }
        register_host_entry(name, host, config, graph, assignment, dns, manager)?;
    }
    Ok(())
}

fn register_host_entry<M: Manager>(
    name: &str,
    host: &HostOptions,
    config: &ConfigOptions,
    graph: &NetworkGraph,
    assignment: &mut IpAssignment,
    dns: &Dns,
    manager: &mut M,
) -> Result<(), RegistrationError> {
    // a single pinned address cannot cover multiple hosts
    if host.ip_addr.is_some() && host.quantity > 1 {
        return Err(RegistrationError::PinnedQuantity {
            host: name.to_string(),
            quantity: host.quantity,
        });
    }
    if !graph.contains(host.network_node_id) {
        return Err(RegistrationError::UnknownGraphNode {
            host: name.to_string(),
            node: host.network_node_id,
        });
    }

    let cpu_khz = manager.raw_cpu_frequency_khz();
    let node = host.network_node_id;

    for i in 1..=host.quantity {
        let hostname = if host.quantity > 1 {
            format!("{name}{i}")
        } else {
            name.to_string()
        };

        let ip_addr = match host.ip_addr {
            Some(ip) => {
                assignment
                    .assign_with_ip(node, ip)
                    .map_err(|source| RegistrationError::Address {
                        host: hostname.clone(),
                        source,
                    })?;
                ip
            }
            None => assignment
                .assign(node)
                .map_err(|source| RegistrationError::Address {
                    host: hostname.clone(),
                    source,
                })?,
        };

        dns.register(&hostname, ip_addr)
            .map_err(|source| RegistrationError::Dns {
                host: hostname.clone(),
                source,
            })?;

        // bandwidth comes from the graph annotations unless the host options
        // override it
        let bw_down = host
            .bandwidth_down
            .or_else(|| graph.bandwidth_down_bits(node))
            .ok_or_else(|| RegistrationError::MissingBandwidthDown {
                host: hostname.clone(),
            })?;
        let bw_up = host
            .bandwidth_up
            .or_else(|| graph.bandwidth_up_bits(node))
            .ok_or_else(|| RegistrationError::MissingBandwidthUp {
                host: hostname.clone(),
            })?;
        if bw_down == BitsPerSec::ZERO || bw_up == BitsPerSec::ZERO {
            return Err(RegistrationError::ZeroBandwidth {
                host: hostname.clone(),
            });
        }

        let params = HostParams::builder()
            .hostname(hostname.clone())
            .ip_addr(ip_addr)
            .cpu_frequency_khz(cpu_khz)
            .log_level(host.log_level)
            .heartbeat_log_level(host.heartbeat_log_level)
            .heartbeat_log_info(host.heartbeat_log_info.clone())
            .heartbeat_interval(Nanosecs::from(host.heartbeat_interval))
            .pcap_dir(host.pcap_directory.clone())
            .send_buf_size(config.socket_send_buffer)
            .recv_buf_size(config.socket_recv_buffer)
            .autotune_send_buf(config.socket_send_autotune)
            .autotune_recv_buf(config.socket_recv_autotune)
            .interface_buf_size(config.interface_buffer)
            .qdisc(config.interface_qdisc)
            .requested_bw_down_bits(bw_down)
            .requested_bw_up_bits(bw_up)
            .build();

        debug!(host = %params.hostname, ip = %params.ip_addr, node = %node, "registering virtual host");
        manager.add_virtual_host(params);

        register_processes(&hostname, host, manager)?;
    }

    Ok(())
}

fn register_processes<M: Manager>(
    hostname: &str,
    host: &HostOptions,
    manager: &mut M,
) -> Result<(), RegistrationError> {
    for process in host.processes() {
        let plugin =
            process
                .resolved_path()
                .ok_or_else(|| RegistrationError::PluginNotFound {
                    host: hostname.to_string(),
                    path: process.raw_path().to_path_buf(),
                })?;

        let mut argv = Vec::with_capacity(process.args.len() + 1);
        argv.push(plugin.display().to_string());
        argv.extend(process.args.iter().cloned());

        let spec = ProcessSpec {
            plugin,
            start_time: Nanosecs::from(process.start_time),
            stop_time: process.stop_time.map(Nanosecs::from),
            argv,
            environment: process.environment.clone(),
        };

        for _ in 0..process.quantity {
            manager.add_virtual_process(hostname, spec.clone());
        }
    }
    Ok(())
}

/// Fatal registration errors; any of these aborts the run before the first
/// round.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// A pinned address combined with replication.
    #[error("host '{host}' has an IP address set with a quantity {quantity} greater than 1")]
    PinnedQuantity {
        /// The offending host entry.
        host: String,
        /// Its configured quantity.
        quantity: u64,
    },

    /// The host references a node the graph does not contain.
    #[error("host '{host}' references unknown graph node {node}")]
    UnknownGraphNode {
        /// The offending host entry.
        host: String,
        /// The missing node.
        node: NodeId,
    },

    /// Address assignment failed.
    #[error("could not assign an address for host '{host}': {source}")]
    Address {
        /// The offending host.
        host: String,
        /// The underlying error.
        source: AddressingError,
    },

    /// DNS registration failed.
    #[error("could not register host '{host}' in DNS: {source}")]
    Dns {
        /// The offending host.
        host: String,
        /// The underlying error.
        source: DnsError,
    },

    /// No downstream bandwidth in either the graph or the host options.
    #[error("no downstream bandwidth provided for host '{host}'")]
    MissingBandwidthDown {
        /// The offending host.
        host: String,
    },

    /// No upstream bandwidth in either the graph or the host options.
    #[error("no upstream bandwidth provided for host '{host}'")]
    MissingBandwidthUp {
        /// The offending host.
        host: String,
    },

    /// Bandwidth resolved to zero.
    #[error("bandwidth for host '{host}' must be non-zero")]
    ZeroBandwidth {
        /// The offending host.
        host: String,
    },

    /// A process plugin could not be located.
    #[error("for host '{host}', couldn't find program path '{}'", .path.display())]
    PluginNotFound {
        /// The offending host.
        host: String,
        /// The configured plugin path.
        path: PathBuf,
    },
}

/// Top-level fatal errors; [`Controller::run`] maps each to exit code 1
/// after logging it.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Graph loading or validation failed.
    #[error("error loading graph: {0}")]
    Graph(#[from] GraphError),

    /// Host or process registration failed.
    #[error("could not register hosts: {0}")]
    Registration(#[from] RegistrationError),

    /// Routing computation failed.
    #[error("unable to generate routing information: {0}")]
    Routing(#[from] RoutingError),
}
