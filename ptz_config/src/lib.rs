#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the PTZ control stack.
//!
//! - `Config` deserializes from TOML; `validate()` range-checks it.
//! - Every table is optional; missing tables and fields fall back to the
//!   defaults the control layer ships with, so an empty file is a valid
//!   configuration.
use serde::Deserialize;
use serde::de::Deserializer;

/// Clock-offset estimation over the link.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncCfg {
    /// Number of ping round trips to sample per estimation run.
    pub samples: usize,
    /// Sampling window (ms); the run closes after this even with fewer pongs.
    pub window_ms: u64,
    /// Pacing between consecutive pings (ms).
    pub ping_gap_ms: u64,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            samples: 10,
            window_ms: 1_000,
            ping_gap_ms: 50,
        }
    }
}

/// Tracked-command bookkeeping on the console side.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatchCfg {
    pub pending_cap: usize,
    /// Client-side expiry for a tracked command (ms). Should exceed
    /// confirm.timeout_ms so the camera's force-ack normally wins.
    pub pending_ttl_ms: u64,
}

impl Default for DispatchCfg {
    fn default() -> Self {
        Self {
            pending_cap: 256,
            pending_ttl_ms: 6_000,
        }
    }
}

/// Camera-side apply throttle.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ThrottleCfg {
    /// Minimum spacing between hardware applies per axis, 0..=50 ms.
    /// 0 disables coalescing.
    pub delay_ms: u64,
}

impl Default for ThrottleCfg {
    fn default() -> Self {
        Self { delay_ms: 50 }
    }
}

/// Convergence confirmation on the camera side.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConfirmCfg {
    /// Telemetry poll cadence, 1..=50 ms.
    pub poll_ms: u64,
    /// Tolerance factor for stepped axes: tolerance = step * factor,
    /// 0.1..=0.75.
    pub step_factor: f64,
    pub zoom_tolerance: f64,
    pub angular_tolerance: f64,
    /// Hard per-session timeout (ms); unconverged axes are force-acked.
    pub timeout_ms: u64,
}

impl Default for ConfirmCfg {
    fn default() -> Self {
        Self {
            poll_ms: 20,
            step_factor: 0.5,
            zoom_tolerance: 0.05,
            angular_tolerance: 2.0,
            timeout_ms: 5_000,
        }
    }
}

/// "Movement settled" listener on the camera side.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SettleCfg {
    /// Sliding window size for the stability check; at least 2.
    pub window: usize,
    pub stability_threshold: f64,
    /// Wide at-target tolerance in device units.
    pub wide_tolerance: f64,
    pub poll_ms: u64,
    /// Listener expiry (ms); on expiry a warning is logged and nothing is sent.
    pub timeout_ms: u64,
}

impl Default for SettleCfg {
    fn default() -> Self {
        Self {
            window: 5,
            stability_threshold: 0.1,
            wide_tolerance: 1_500.0,
            poll_ms: 50,
            timeout_ms: 3_000,
        }
    }
}

/// Gains for one controlled axis.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Gains {
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
}

/// Visual feedback controller.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrackCfg {
    /// Pan-axis gains. Accepts either:
    /// - a table: { kp = 84000.0, ki = 0.0, kd = 0.0 }
    /// - an array: [84000.0, 0.0, 0.0]
    #[serde(deserialize_with = "de_gains")]
    pub pan: Gains,
    /// Tilt-axis gains, same forms as `pan`.
    #[serde(deserialize_with = "de_gains")]
    pub tilt: Gains,
    /// Process every Nth frame; bounds detection cost.
    pub frame_stride: u32,
    pub integral_clamp: f64,
    /// Emit a cycle log record every N processed frames.
    pub log_every: u32,
}

impl Default for TrackCfg {
    fn default() -> Self {
        Self {
            pan: Gains {
                kp: 84_000.0,
                ki: 0.0,
                kd: 0.0,
            },
            tilt: Gains {
                kp: -85_000.0,
                ki: 0.0,
                kd: 0.0,
            },
            frame_stride: 4,
            integral_clamp: 1.0,
            log_every: 5,
        }
    }
}

/// Session log buffering and shutdown grace.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EvalCfg {
    pub flush_ms: u64,
    /// After stop, in-flight records are still accepted for this long (ms).
    pub stop_grace_ms: u64,
}

impl Default for EvalCfg {
    fn default() -> Self {
        Self {
            flush_ms: 1_000,
            stop_grace_ms: 2_000,
        }
    }
}

/// Orientation-stream and step-input shaping.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntentCfg {
    /// Per-axis floor between emitted relative commands (ms).
    pub min_interval_ms: u64,
    pub units_per_degree: f64,
    /// Orientation deltas below this many degrees accumulate instead of
    /// emitting a command.
    pub degree_threshold: f64,
    pub pan_divisor: f64,
    pub tilt_divisor: f64,
    pub zoom_divisor: f64,
}

impl Default for IntentCfg {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            units_per_degree: 7_200.0,
            degree_threshold: 1.0,
            pan_divisor: 5.0,
            tilt_divisor: 5.0,
            zoom_divisor: 20.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// File rotation: "never", "daily" or "hourly"; unknown values and
    /// absence both mean never.
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sync: SyncCfg,
    pub dispatch: DispatchCfg,
    pub throttle: ThrottleCfg,
    pub confirm: ConfirmCfg,
    pub settle: SettleCfg,
    pub track: TrackCfg,
    pub eval: EvalCfg,
    pub intent: IntentCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GainsToml {
    Triple((f64, f64, f64)),
    Table(Gains),
}

fn de_gains<'de, D>(deserializer: D) -> Result<Gains, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match GainsToml::deserialize(deserializer)? {
        GainsToml::Triple((kp, ki, kd)) => Gains { kp, ki, kd },
        GainsToml::Table(g) => g,
    })
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sync
        if self.sync.samples == 0 {
            eyre::bail!("sync.samples must be >= 1");
        }
        if self.sync.window_ms == 0 {
            eyre::bail!("sync.window_ms must be >= 1");
        }
        if self.sync.ping_gap_ms == 0 {
            eyre::bail!("sync.ping_gap_ms must be >= 1");
        }

        // Dispatch
        if self.dispatch.pending_cap == 0 {
            eyre::bail!("dispatch.pending_cap must be >= 1");
        }
        if self.dispatch.pending_ttl_ms == 0 {
            eyre::bail!("dispatch.pending_ttl_ms must be >= 1");
        }

        // Throttle
        if self.throttle.delay_ms > 50 {
            eyre::bail!("throttle.delay_ms must be in [0, 50]");
        }

        // Confirm
        if self.confirm.poll_ms == 0 || self.confirm.poll_ms > 50 {
            eyre::bail!("confirm.poll_ms must be in [1, 50]");
        }
        if !(self.confirm.step_factor >= 0.1 && self.confirm.step_factor <= 0.75) {
            eyre::bail!("confirm.step_factor must be in [0.1, 0.75]");
        }
        if !self.confirm.zoom_tolerance.is_finite() || self.confirm.zoom_tolerance <= 0.0 {
            eyre::bail!("confirm.zoom_tolerance must be > 0");
        }
        if !self.confirm.angular_tolerance.is_finite() || self.confirm.angular_tolerance <= 0.0 {
            eyre::bail!("confirm.angular_tolerance must be > 0");
        }
        if self.confirm.timeout_ms == 0 {
            eyre::bail!("confirm.timeout_ms must be >= 1");
        }

        // Settle
        if self.settle.window < 2 {
            eyre::bail!("settle.window must be >= 2");
        }
        if !self.settle.stability_threshold.is_finite() || self.settle.stability_threshold <= 0.0 {
            eyre::bail!("settle.stability_threshold must be > 0");
        }
        if !self.settle.wide_tolerance.is_finite() || self.settle.wide_tolerance <= 0.0 {
            eyre::bail!("settle.wide_tolerance must be > 0");
        }
        if self.settle.poll_ms == 0 {
            eyre::bail!("settle.poll_ms must be >= 1");
        }
        if self.settle.timeout_ms == 0 {
            eyre::bail!("settle.timeout_ms must be >= 1");
        }

        // Track
        if self.track.frame_stride == 0 {
            eyre::bail!("track.frame_stride must be >= 1");
        }
        if self.track.log_every == 0 {
            eyre::bail!("track.log_every must be >= 1");
        }
        if !self.track.integral_clamp.is_finite() || self.track.integral_clamp <= 0.0 {
            eyre::bail!("track.integral_clamp must be > 0");
        }
        for (name, g) in [("track.pan", self.track.pan), ("track.tilt", self.track.tilt)] {
            if !(g.kp.is_finite() && g.ki.is_finite() && g.kd.is_finite()) {
                eyre::bail!("{name} gains must be finite");
            }
        }

        // Eval
        if self.eval.flush_ms == 0 {
            eyre::bail!("eval.flush_ms must be >= 1");
        }

        // Intent
        if !self.intent.units_per_degree.is_finite() || self.intent.units_per_degree == 0.0 {
            eyre::bail!("intent.units_per_degree must be finite and non-zero");
        }
        if !self.intent.degree_threshold.is_finite() || self.intent.degree_threshold < 0.0 {
            eyre::bail!("intent.degree_threshold must be >= 0");
        }
        for (name, d) in [
            ("intent.pan_divisor", self.intent.pan_divisor),
            ("intent.tilt_divisor", self.intent.tilt_divisor),
            ("intent.zoom_divisor", self.intent.zoom_divisor),
        ] {
            if !d.is_finite() || d <= 0.0 {
                eyre::bail!("{name} must be > 0");
            }
        }

        // Logging: no extra validation; unknown rotation values fall back to
        // "never" at setup time

        Ok(())
    }
}
