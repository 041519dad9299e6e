//! Configuration types for the control layer.
//!
//! These are the runtime configuration structs used by `Console` and
//! `CameraAgent`. They are separate from the TOML-deserialized config in
//! `ptz_config`.

/// Clock-offset estimation parameters.
#[derive(Debug, Clone)]
pub struct SyncCfg {
    /// Number of round trips to sample.
    pub samples: usize,
    /// Sampling window; estimation closes after this even with fewer samples.
    pub window_ms: u64,
    /// Pacing between consecutive pings.
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

/// Tracked-command bookkeeping on the dispatching side.
#[derive(Debug, Clone)]
pub struct DispatchCfg {
    /// Hard cap on live pending commands; oldest entries are evicted beyond it.
    pub pending_cap: usize,
    /// Client-side expiry for a tracked command. Must exceed the actuator-side
    /// confirmation timeout so the remote force-ack normally wins.
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

/// Actuator-side apply throttle.
#[derive(Debug, Clone)]
pub struct ThrottleCfg {
    /// Minimum spacing between hardware applies per axis (0..=50 ms).
    /// 0 disables coalescing.
    pub delay_ms: u64,
}

impl Default for ThrottleCfg {
    fn default() -> Self {
        Self { delay_ms: 50 }
    }
}

/// Convergence confirmation parameters.
#[derive(Debug, Clone)]
pub struct ConfirmCfg {
    /// Telemetry poll cadence (1..=50 ms).
    pub poll_ms: u64,
    /// Dynamic tolerance factor for stepped axes: tolerance = step * factor
    /// (0.1..=0.75).
    pub step_factor: f64,
    /// Fixed tolerance for a continuous zoom axis.
    pub zoom_tolerance: f64,
    /// Fixed tolerance for continuous angular axes.
    pub angular_tolerance: f64,
    /// Hard per-session timeout; unconverged axes are force-acked at expiry.
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

/// "Movement settled" listener parameters.
#[derive(Debug, Clone)]
pub struct SettleCfg {
    /// Sliding window size for the stability check.
    pub window: usize,
    /// Window standard deviation must fall below this to count as stopped.
    pub stability_threshold: f64,
    /// Wide at-target tolerance in device units.
    pub wide_tolerance: f64,
    /// Telemetry poll cadence.
    pub poll_ms: u64,
    /// Listener expiry; logs a warning and sends nothing.
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
#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Visual feedback controller parameters.
///
/// Gain magnitudes are in device units per unit of normalized image error;
/// the signs differ per axis because increasing pan moves the image opposite
/// to increasing tilt in this mounting.
#[derive(Debug, Clone)]
pub struct TrackCfg {
    pub pan: PidGains,
    pub tilt: PidGains,
    /// Process every Nth frame; bounds detection cost.
    pub frame_stride: u32,
    /// Anti-windup bound on the integral accumulator.
    pub integral_clamp: f64,
    /// Emit a cycle log record every N processed frames.
    pub log_every: u32,
}

impl Default for TrackCfg {
    fn default() -> Self {
        Self {
            pan: PidGains::new(84_000.0, 0.0, 0.0),
            tilt: PidGains::new(-85_000.0, 0.0, 0.0),
            frame_stride: 4,
            integral_clamp: 1.0,
            log_every: 5,
        }
    }
}

/// Session log buffering and shutdown grace.
#[derive(Debug, Clone)]
pub struct EvalCfg {
    /// Buffered records move to the durable list at this cadence.
    pub flush_ms: u64,
    /// After stop, keep accepting in-flight records for this long before the
    /// session closes and export unlocks.
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

/// Orientation-stream and step-input intent shaping.
#[derive(Debug, Clone)]
pub struct IntentCfg {
    /// Per-axis floor between emitted relative commands.
    pub min_interval_ms: u64,
    /// Conversion from degrees of orientation change to device units.
    pub units_per_degree: f64,
    /// Deltas below this accumulate as residual instead of emitting.
    pub degree_threshold: f64,
    /// Axis range divided by these gives one keyboard/wheel step.
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

/// Aggregate configuration for the operator-side `Console`.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCfg {
    pub sync: SyncCfg,
    pub dispatch: DispatchCfg,
    pub track: TrackCfg,
    pub eval: EvalCfg,
    pub intent: IntentCfg,
}

/// Aggregate configuration for the actuator-side `CameraAgent`.
#[derive(Debug, Clone, Default)]
pub struct CameraCfg {
    pub throttle: ThrottleCfg,
    pub confirm: ConfirmCfg,
    pub settle: SettleCfg,
}
