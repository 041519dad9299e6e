//! `From` implementations bridging `ptz_config` types to `ptz_core` types.
//!
//! These keep the field-by-field mapping out of the CLI's setup path.

use crate::config::{
    CameraCfg, ConfirmCfg, ConsoleCfg, DispatchCfg, EvalCfg, IntentCfg, PidGains, SettleCfg,
    SyncCfg, ThrottleCfg, TrackCfg,
};

// ── SyncCfg ──────────────────────────────────────────────────────────────────

impl From<&ptz_config::SyncCfg> for SyncCfg {
    fn from(c: &ptz_config::SyncCfg) -> Self {
        Self {
            samples: c.samples,
            window_ms: c.window_ms,
            ping_gap_ms: c.ping_gap_ms,
        }
    }
}

// ── DispatchCfg ──────────────────────────────────────────────────────────────

impl From<&ptz_config::DispatchCfg> for DispatchCfg {
    fn from(c: &ptz_config::DispatchCfg) -> Self {
        Self {
            pending_cap: c.pending_cap,
            pending_ttl_ms: c.pending_ttl_ms,
        }
    }
}

// ── ThrottleCfg ──────────────────────────────────────────────────────────────

impl From<&ptz_config::ThrottleCfg> for ThrottleCfg {
    fn from(c: &ptz_config::ThrottleCfg) -> Self {
        Self {
            delay_ms: c.delay_ms,
        }
    }
}

// ── ConfirmCfg ───────────────────────────────────────────────────────────────

impl From<&ptz_config::ConfirmCfg> for ConfirmCfg {
    fn from(c: &ptz_config::ConfirmCfg) -> Self {
        Self {
            poll_ms: c.poll_ms,
            step_factor: c.step_factor,
            zoom_tolerance: c.zoom_tolerance,
            angular_tolerance: c.angular_tolerance,
            timeout_ms: c.timeout_ms,
        }
    }
}

// ── SettleCfg ────────────────────────────────────────────────────────────────

impl From<&ptz_config::SettleCfg> for SettleCfg {
    fn from(c: &ptz_config::SettleCfg) -> Self {
        Self {
            window: c.window,
            stability_threshold: c.stability_threshold,
            wide_tolerance: c.wide_tolerance,
            poll_ms: c.poll_ms,
            timeout_ms: c.timeout_ms,
        }
    }
}

// ── TrackCfg ─────────────────────────────────────────────────────────────────

impl From<ptz_config::Gains> for PidGains {
    fn from(g: ptz_config::Gains) -> Self {
        Self {
            kp: g.kp,
            ki: g.ki,
            kd: g.kd,
        }
    }
}

impl From<&ptz_config::TrackCfg> for TrackCfg {
    fn from(c: &ptz_config::TrackCfg) -> Self {
        Self {
            pan: c.pan.into(),
            tilt: c.tilt.into(),
            frame_stride: c.frame_stride,
            integral_clamp: c.integral_clamp,
            log_every: c.log_every,
        }
    }
}

// ── EvalCfg ──────────────────────────────────────────────────────────────────

impl From<&ptz_config::EvalCfg> for EvalCfg {
    fn from(c: &ptz_config::EvalCfg) -> Self {
        Self {
            flush_ms: c.flush_ms,
            stop_grace_ms: c.stop_grace_ms,
        }
    }
}

// ── IntentCfg ────────────────────────────────────────────────────────────────

impl From<&ptz_config::IntentCfg> for IntentCfg {
    fn from(c: &ptz_config::IntentCfg) -> Self {
        Self {
            min_interval_ms: c.min_interval_ms,
            units_per_degree: c.units_per_degree,
            degree_threshold: c.degree_threshold,
            pan_divisor: c.pan_divisor,
            tilt_divisor: c.tilt_divisor,
            zoom_divisor: c.zoom_divisor,
        }
    }
}

// ── Aggregates ───────────────────────────────────────────────────────────────

impl From<&ptz_config::Config> for ConsoleCfg {
    fn from(c: &ptz_config::Config) -> Self {
        Self {
            sync: (&c.sync).into(),
            dispatch: (&c.dispatch).into(),
            track: (&c.track).into(),
            eval: (&c.eval).into(),
            intent: (&c.intent).into(),
        }
    }
}

impl From<&ptz_config::Config> for CameraCfg {
    fn from(c: &ptz_config::Config) -> Self {
        Self {
            throttle: (&c.throttle).into(),
            confirm: (&c.confirm).into(),
            settle: (&c.settle).into(),
        }
    }
}
