//! Read-only simulation options. The controller borrows a [`ConfigOptions`]
//! for its whole lifetime and never mutates it.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::network::types::{GraphSpec, NodeId};
use crate::units::{BitsPerSec, Bytes, Millisecs, Secs};

/// Parsed user configuration for a whole simulation.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOptions {
    /// Seed for the global random source.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of worker threads; zero runs single-threaded.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Absolute simulation stop time.
    pub stop_time: Secs,
    /// Simulated time before which bandwidth caps are not enforced.
    #[serde(default)]
    pub bootstrap_end_time: Secs,
    /// User-supplied floor on the minimum time jump; zero means unset.
    #[serde(default)]
    pub runahead: Millisecs,
    /// Route along minimum-latency paths; otherwise hosts must be directly
    /// linked.
    #[serde(default = "default_true")]
    pub use_shortest_path: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_send_buffer")]
    pub socket_send_buffer: Bytes,
    #[serde(default = "default_recv_buffer")]
    pub socket_recv_buffer: Bytes,
    #[serde(default = "default_true")]
    pub socket_send_autotune: bool,
    #[serde(default = "default_true")]
    pub socket_recv_autotune: bool,
    #[serde(default = "default_interface_buffer")]
    pub interface_buffer: Bytes,
    #[serde(default)]
    pub interface_qdisc: QdiscKind,
    /// The network topology, inline or in a JSON file.
    pub graph: GraphSource,
    /// Hosts to simulate, keyed by base name. The map's deterministic order
    /// is the registration order within each phase.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostOptions>,
}

impl ConfigOptions {
    /// Reads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &HostOptions)> {
        self.hosts.iter().map(|(name, host)| (name.as_str(), host))
    }
}

/// Where the network graph comes from.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum GraphSource {
    /// The graph spec is embedded in the configuration.
    Inline(GraphSpec),
    /// The graph spec lives in a JSON file.
    File {
        /// Path to the file.
        path: PathBuf,
    },
}

/// Options for one configured host entry (possibly expanded into several
/// virtual hosts via `quantity`).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostOptions {
    /// The graph node this host attaches to.
    pub network_node_id: NodeId,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    /// Pinned address; only permitted when `quantity == 1`.
    #[serde(default)]
    pub ip_addr: Option<Ipv4Addr>,
    /// Overrides the graph node's downstream bandwidth annotation.
    #[serde(default)]
    pub bandwidth_down: Option<BitsPerSec>,
    /// Overrides the graph node's upstream bandwidth annotation.
    #[serde(default)]
    pub bandwidth_up: Option<BitsPerSec>,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub heartbeat_log_level: Option<LogLevel>,
    #[serde(default = "default_heartbeat_info")]
    pub heartbeat_log_info: Vec<HeartbeatInfo>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Secs,
    #[serde(default)]
    pub pcap_directory: Option<PathBuf>,
    #[serde(default)]
    pub processes: Vec<ProcessOptions>,
}

impl HostOptions {
    pub fn processes(&self) -> impl Iterator<Item = &ProcessOptions> {
        self.processes.iter()
    }
}

/// Options for one process to run on a host.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessOptions {
    /// The plugin executable, as written in the configuration.
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment: String,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    #[serde(default)]
    pub start_time: Secs,
    #[serde(default)]
    pub stop_time: Option<Secs>,
}

impl ProcessOptions {
    /// The configured path, for diagnostics.
    pub fn raw_path(&self) -> &Path {
        &self.path
    }

    /// Locates the plugin on disk: an existing absolute or relative path is
    /// taken as-is, a bare name is searched on `$PATH`. Returns `None` if
    /// nothing matches.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if self.path.is_absolute() {
            return self.path.exists().then(|| self.path.clone());
        }
        if self.path.components().count() > 1 {
            return self
                .path
                .exists()
                .then(|| self.path.canonicalize().ok())
                .flatten();
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.path))
            .find(|candidate| candidate.exists())
    }
}

/// Log verbosity, mirroring `tracing` levels.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Interface queuing discipline applied to simulated hosts.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QdiscKind {
    #[default]
    Fifo,
    RoundRobin,
}

/// Which subsystems a host heartbeat line reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatInfo {
    Node,
    Socket,
    Ram,
}

/// Reasons a configuration cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_seed() -> u64 {
    1
}

fn default_workers() -> u32 {
    num_cpus::get() as u32
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> u64 {
    1
}

fn default_send_buffer() -> Bytes {
    Bytes::new(131_072)
}

fn default_recv_buffer() -> Bytes {
    Bytes::new(174_760)
}

fn default_interface_buffer() -> Bytes {
    Bytes::new(1_024_000)
}

fn default_heartbeat_info() -> Vec<HeartbeatInfo> {
    vec![HeartbeatInfo::Node]
}

fn default_heartbeat_interval() -> Secs {
    Secs::ONE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() -> anyhow::Result<()> {
        let config: ConfigOptions = serde_json::from_str(
            r#"{
                "stop_time": 60,
                "graph": {
                    "nodes": [{"id": 0, "bandwidth_down": 1000000, "bandwidth_up": 1000000}],
                    "links": []
                },
                "hosts": {
                    "client": {"network_node_id": 0}
                }
            }"#,
        )?;
        assert_eq!(config.seed, 1);
        assert_eq!(config.stop_time, Secs::new(60));
        assert_eq!(config.runahead, Millisecs::ZERO);
        assert!(config.use_shortest_path);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.interface_qdisc, QdiscKind::Fifo);
        let (name, host) = config.hosts().next().expect("one host");
        assert_eq!(name, "client");
        assert_eq!(host.quantity, 1);
        assert_eq!(host.heartbeat_interval, Secs::ONE);
        assert_eq!(host.heartbeat_log_info, vec![HeartbeatInfo::Node]);
        Ok(())
    }

    #[test]
    fn host_and_process_fields_parse() -> anyhow::Result<()> {
        let host: HostOptions = serde_json::from_str(
            r#"{
                "network_node_id": 2,
                "quantity": 3,
                "ip_addr": "10.0.0.5",
                "bandwidth_down": 10000000,
                "log_level": "debug",
                "processes": [
                    {"path": "/bin/echo", "args": ["hello"], "quantity": 2, "start_time": 5}
                ]
            }"#,
        )?;
        assert_eq!(host.network_node_id, NodeId::new(2));
        assert_eq!(host.ip_addr, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(host.log_level, Some(LogLevel::Debug));
        let process = host.processes().next().expect("one process");
        assert_eq!(process.args, vec!["hello"]);
        assert_eq!(process.start_time, Secs::new(5));
        assert_eq!(process.stop_time, None);
        Ok(())
    }

    #[test]
    fn graph_source_distinguishes_inline_from_file() -> anyhow::Result<()> {
        let inline: GraphSource =
            serde_json::from_str(r#"{"nodes": [], "links": []}"#)?;
        assert!(matches!(inline, GraphSource::Inline(..)));
        let file: GraphSource = serde_json::from_str(r#"{"path": "topology.json"}"#)?;
        assert!(matches!(file, GraphSource::File { .. }));
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<ConfigOptions, _> = serde_json::from_str(
            r#"{"stop_time": 1, "graph": {"nodes": [], "links": []}, "mystery": true}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn absolute_plugin_paths_resolve_only_if_present() {
        let missing = ProcessOptions {
            path: PathBuf::from("/definitely/not/a/real/plugin"),
            args: vec![],
            environment: String::new(),
            quantity: 1,
            start_time: Secs::ZERO,
            stop_time: None,
        };
        assert_eq!(missing.resolved_path(), None);

        let present = ProcessOptions {
            path: PathBuf::from("/bin/sh"),
            ..missing
        };
        assert_eq!(present.resolved_path(), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn bare_plugin_names_are_searched_on_path() {
        let process = ProcessOptions {
            path: PathBuf::from("sh"),
            args: vec![],
            environment: String::new(),
            quantity: 1,
            start_time: Secs::ZERO,
            stop_time: None,
        };
        let resolved = process.resolved_path().expect("sh should be on $PATH");
        assert!(resolved.ends_with("sh"));
        assert!(resolved.is_absolute());
    }
}
