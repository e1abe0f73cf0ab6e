use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use maestro_core::config::ConfigOptions;
use maestro_core::units::Nanosecs;
use maestro_core::{logging, Controller, HostParams, Manager, ProcessSpec, SimulationState};
use tracing::info;

/// Load a simulation configuration, register its hosts and processes, and
/// report the resulting addressing and routing. No simulation rounds run.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the simulation configuration (JSON)
    config: PathBuf,
    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let mut config = ConfigOptions::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    logging::init(config.log_level);

    let mut controller = Controller::<CheckManager>::new(&config);
    let code = controller.run();

    if code == 0 {
        let state = controller.state();
        println!("hosts ({}):", state.dns().len());
        for (name, addr) in state.dns().entries() {
            println!("  {name} -> {addr}");
        }
        if let Some(latency) = state.routing().and_then(|r| r.smallest_latency()) {
            println!("smallest path latency: {latency}");
        }
    }

    Ok(ExitCode::from(code as u8))
}

/// A worker that registers everything and simulates nothing, so a
/// configuration can be validated end to end without running it.
#[derive(Debug)]
struct CheckManager {
    state: Arc<SimulationState>,
    hosts: usize,
    processes: usize,
}

impl Manager for CheckManager {
    fn new(
        state: Arc<SimulationState>,
        _config: &ConfigOptions,
        _end_time: Nanosecs,
        _bootstrap_end: Nanosecs,
        _seed: u32,
    ) -> Option<Self> {
        Some(Self {
            state,
            hosts: 0,
            processes: 0,
        })
    }

    fn add_virtual_host(&mut self, _params: HostParams) {
        self.hosts += 1;
    }

    fn add_virtual_process(&mut self, _hostname: &str, _process: ProcessSpec) {
        self.processes += 1;
    }

    fn raw_cpu_frequency_khz(&self) -> u64 {
        host_cpu_frequency_khz().unwrap_or(1_000_000)
    }

    fn run(&mut self) {
        let window = self.state.execute_window();
        info!(
            hosts = self.hosts,
            processes = self.processes,
            first_window_end = %window.end,
            "configuration is valid; no rounds executed"
        );
    }

    fn shutdown(&mut self) -> i32 {
        0
    }
}

/// Best-effort read of the machine's CPU frequency, in kHz.
fn host_cpu_frequency_khz() -> Option<u64> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    let line = cpuinfo.lines().find(|line| line.starts_with("cpu MHz"))?;
    let mhz: f64 = line.split(':').nth(1)?.trim().parse().ok()?;
    Some((mhz * 1_000.0) as u64)
}
