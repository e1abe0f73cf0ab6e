//! This module defines the [`Manager`] trait that every simulation worker
//! implementation must satisfy, and the parameter types the controller hands
//! across that seam.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigOptions, HeartbeatInfo, LogLevel, QdiscKind};
use crate::controller::SimulationState;
use crate::units::{BitsPerSec, Bytes, Nanosecs};

/// An interface for simulation workers. The controller registers hosts and
/// processes, then hands control to [`Manager::run`], which drives rounds
/// against [`SimulationState::finish_round`] until it says stop.
pub trait Manager: Sized {
    /// Creates the worker. `state` is the capability object for routing
    /// queries, DNS access, and round completion. Returns `None` only on an
    /// unrecoverable setup failure, which aborts the whole process.
    fn new(
        state: Arc<SimulationState>,
        config: &ConfigOptions,
        end_time: Nanosecs,
        bootstrap_end: Nanosecs,
        seed: u32,
    ) -> Option<Self>;

    /// Registers a virtual host. The manager takes its own copy of `params`.
    fn add_virtual_host(&mut self, params: HostParams);

    /// Registers one replica of a process on a previously registered host.
    fn add_virtual_process(&mut self, hostname: &str, process: ProcessSpec);

    /// The host machine's CPU frequency in kHz, used to scale simulated CPU
    /// delays.
    fn raw_cpu_frequency_khz(&self) -> u64;

    /// Runs the simulation to completion.
    fn run(&mut self);

    /// Winds the worker down and reports its exit code. The controller keeps
    /// the manager alive until its own teardown.
    fn shutdown(&mut self) -> i32;
}

/// Everything a manager needs to instantiate one virtual host.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct HostParams {
    pub hostname: String,
    pub ip_addr: Ipv4Addr,
    pub cpu_frequency_khz: u64,
    #[builder(default = 0)]
    pub cpu_threshold: u64,
    #[builder(default = 200)]
    pub cpu_precision: u64,
    #[builder(default)]
    pub log_level: Option<LogLevel>,
    #[builder(default)]
    pub heartbeat_log_level: Option<LogLevel>,
    #[builder(default)]
    pub heartbeat_log_info: Vec<HeartbeatInfo>,
    pub heartbeat_interval: Nanosecs,
    #[builder(default)]
    pub pcap_dir: Option<PathBuf>,
    pub send_buf_size: Bytes,
    pub recv_buf_size: Bytes,
    pub autotune_send_buf: bool,
    pub autotune_recv_buf: bool,
    pub interface_buf_size: Bytes,
    pub qdisc: QdiscKind,
    pub requested_bw_down_bits: BitsPerSec,
    pub requested_bw_up_bits: BitsPerSec,
}

/// One process descriptor, replicated `quantity` times by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Resolved plugin executable.
    pub plugin: PathBuf,
    pub start_time: Nanosecs,
    pub stop_time: Option<Nanosecs>,
    /// The plugin path followed by the configured arguments.
    pub argv: Vec<String>,
    pub environment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_params_builder_fills_cpu_defaults() {
        let params = HostParams::builder()
            .hostname("client".to_string())
            .ip_addr(Ipv4Addr::new(11, 0, 0, 1))
            .cpu_frequency_khz(3_000_000)
            .heartbeat_interval(Nanosecs::new(1_000_000_000))
            .send_buf_size(Bytes::new(131_072))
            .recv_buf_size(Bytes::new(174_760))
            .autotune_send_buf(true)
            .autotune_recv_buf(true)
            .interface_buf_size(Bytes::new(1_024_000))
            .qdisc(QdiscKind::Fifo)
            .requested_bw_down_bits(BitsPerSec::new(1_000_000))
            .requested_bw_up_bits(BitsPerSec::new(1_000_000))
            .build();
        assert_eq!(params.cpu_threshold, 0);
        assert_eq!(params.cpu_precision, 200);
        assert_eq!(params.log_level, None);
        assert!(params.heartbeat_log_info.is_empty());
        assert_eq!(params.pcap_dir, None);
    }
}
