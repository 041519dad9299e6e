//! Argument surface of `ptzctl`, plus the process-wide statics the error
//! path reads.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Default config location. A missing file here is not an error; the
/// built-in defaults cover a pure-simulation run.
pub const DEFAULT_CONFIG_PATH: &str = "etc/ptz_config.toml";

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set once from `--json`; the error path renders objects instead of prose.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective timing knobs used for the current run (for JSON error details).
pub static LAST_TIMING: OnceLock<CliTiming> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliTiming {
    pub pending_ttl_ms: u64,
    pub confirm_timeout_ms: u64,
    pub stop_grace_ms: u64,
}

#[derive(Parser, Debug)]
#[command(name = "ptzctl", version, about = "PTZ camera console CLI")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit JSON lines (logs and results) instead of pretty output
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Stderr log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a simulated camera through a full measurement session
    Demo {
        /// One-way delay injected into the simulated link, in ms
        #[arg(
            long,
            value_name = "MS",
            default_value_t = 20,
            long_help = "One-way transport delay injected into the simulated link, in milliseconds. Both directions are delayed, so the observed round trip is roughly twice this value plus the camera's convergence time. Values above the clock-sync window leave the offset estimate degraded, which is itself a useful failure rehearsal."
        )]
        latency_ms: u64,
        /// Also run a short visual-tracking burst against the simulated camera
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Feed a handful of synthetic video frames whose marker drifts away from the image center. The controller corrections dispatch as tracked commands, so their acknowledgement latencies land in the session export alongside the scripted moves."
        )]
        with_tracking: bool,
        /// Write the exported session rows to a CSV file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Estimate the console-to-camera clock offset and exit
    Sync {
        /// One-way delay injected into the simulated link, in ms
        #[arg(long, value_name = "MS", default_value_t = 20)]
        latency_ms: u64,
    },
    /// Quick health check (config loads / sim responds)
    SelfCheck,
}
