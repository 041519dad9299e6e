//! ptzctl binary: logging setup, config loading, and command dispatch.
//!
//! Stdout carries command results (pretty lines, or one JSON object with
//! --json); all logs go to stderr and, when configured, to a JSON file sink.

mod cli;
mod demo;
mod error_fmt;

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::{Cli, Commands, DEFAULT_CONFIG_PATH, FILE_GUARD, JSON_MODE};
use crate::demo::{DemoReport, SelfCheckReport, SyncReport};

fn main() {
    if let Err(err) = run() {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn run() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let (cfg, used_defaults) = load_config(&cli.config)?;
    init_logging(cli.json, &cli.log_level, &cfg.logging)?;
    if used_defaults {
        tracing::warn!(path = %cli.config.display(), "config file not found; using built-in defaults");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    match cli.cmd {
        Commands::Demo {
            latency_ms,
            with_tracking,
            out,
        } => {
            let started = Instant::now();
            let result = demo::run_demo(
                &cfg,
                latency_ms,
                with_tracking,
                out.as_deref(),
                Arc::clone(&shutdown),
            );
            let duration_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(report) => {
                    if cli.json {
                        println!("{}", demo_json(&report, latency_ms, duration_ms));
                    } else {
                        print_demo(&report, duration_ms);
                        if let Some(path) = &out {
                            println!("session csv: {}", path.display());
                        }
                    }
                }
                Err(err) => {
                    // The result line still goes out so log scrapers see the run.
                    if cli.json {
                        println!("{}", demo_fault_json(&err, latency_ms, duration_ms));
                    }
                    return Err(err);
                }
            }
        }
        Commands::Sync { latency_ms } => {
            let report = demo::run_sync(&cfg, latency_ms, Arc::clone(&shutdown))?;
            if cli.json {
                println!("{}", sync_json(&report, latency_ms));
            } else {
                let tail = if report.degraded { " (degraded)" } else { "" };
                println!("sync complete: offset {:.1} ms{tail}", report.offset_ms);
            }
        }
        Commands::SelfCheck => {
            let report = demo::run_self_check(&cfg, Arc::clone(&shutdown))?;
            if cli.json {
                println!("{}", self_check_json(&report));
            } else {
                println!(
                    "self-check ok: {} responding, offset {}",
                    report.target,
                    fmt_ms(report.offset_ms)
                );
            }
        }
    }
    Ok(())
}

/// Read, parse, and validate the config. A missing file is only tolerated
/// at the default path, where built-in defaults apply.
fn load_config(path: &Path) -> eyre::Result<(ptz_config::Config, bool)> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("read config {}", path.display()))?;
        let cfg = ptz_config::load_toml(&content).wrap_err("parse config TOML")?;
        cfg.validate()?;
        return Ok((cfg, false));
    }
    if path == Path::new(DEFAULT_CONFIG_PATH) {
        return Ok((ptz_config::Config::default(), true));
    }
    eyre::bail!("config file not found: {}", path.display())
}

/// Stderr logging (pretty or JSON) plus an optional JSON file sink with the
/// configured rotation.
fn init_logging(json: bool, flag_level: &str, logging: &ptz_config::Logging) -> eyre::Result<()> {
    // the flag wins unless it was left at its default
    let level = if flag_level == "info" {
        logging.level.as_deref().unwrap_or("info")
    } else {
        flag_level
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err("parse log filter")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = match path.parent() {
            Some(parent) if parent != Path::new("") => parent,
            _ => Path::new("."),
        };
        let name = path.file_name().unwrap_or_else(|| OsStr::new("ptzctl.log"));
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).with(filter).init();
    Ok(())
}

fn fmt_ms(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1} ms"))
}

fn print_demo(report: &DemoReport, duration_ms: u64) {
    let sync_note = if report.degraded { " (degraded)" } else { "" };
    println!("clock offset: {}{sync_note}", fmt_ms(report.offset_ms));
    println!(
        "acks: {} (mean {}), timeouts: {}",
        report.acks,
        fmt_ms(report.mean_ack_ms),
        report.timeouts
    );
    println!(
        "settles: {} (mean {}), corrections: {}",
        report.settles,
        fmt_ms(report.mean_settle_ms),
        report.corrections
    );
    println!(
        "demo complete: {} rows exported in {duration_ms} ms",
        report.rows
    );
}

fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn demo_json(report: &DemoReport, latency_ms: u64, duration_ms: u64) -> String {
    serde_json::json!({
        "timestamp": epoch_secs(),
        "profile": "sim",
        "latency_ms": latency_ms,
        "offset_ms": report.offset_ms,
        "degraded": report.degraded,
        "acks": report.acks,
        "timeouts": report.timeouts,
        "mean_ack_ms": report.mean_ack_ms,
        "settles": report.settles,
        "mean_settle_ms": report.mean_settle_ms,
        "corrections": report.corrections,
        "rows": report.rows,
        "duration_ms": duration_ms,
        "fault": serde_json::Value::Null,
    })
    .to_string()
}

/// Result line for a failed demo: stats nulled out, fault carries the
/// error's stable name.
fn demo_fault_json(err: &eyre::Report, latency_ms: u64, duration_ms: u64) -> String {
    use ptz_core::error::ControlError;
    let fault = err
        .downcast_ref::<ControlError>()
        .map_or("Error", demo::control_error_name);
    serde_json::json!({
        "timestamp": epoch_secs(),
        "profile": "sim",
        "latency_ms": latency_ms,
        "offset_ms": serde_json::Value::Null,
        "degraded": false,
        "acks": 0,
        "timeouts": 0,
        "mean_ack_ms": serde_json::Value::Null,
        "settles": 0,
        "mean_settle_ms": serde_json::Value::Null,
        "corrections": 0,
        "rows": 0,
        "duration_ms": duration_ms,
        "fault": fault,
    })
    .to_string()
}

fn sync_json(report: &SyncReport, latency_ms: u64) -> String {
    serde_json::json!({
        "timestamp": epoch_secs(),
        "profile": "sim",
        "latency_ms": latency_ms,
        "offset_ms": report.offset_ms,
        "degraded": report.degraded,
    })
    .to_string()
}

fn self_check_json(report: &SelfCheckReport) -> String {
    serde_json::json!({
        "timestamp": epoch_secs(),
        "status": "ok",
        "target": report.target,
        "offset_ms": report.offset_ms,
    })
    .to_string()
}
