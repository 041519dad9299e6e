//! Operator intent shaping.
//!
//! Orientation sensors stream absolute yaw/pitch at whatever rate the
//! device likes; axes want occasional relative nudges. The shaper keeps a
//! per-axis residual so sub-threshold wiggle accumulates instead of being
//! lost, wraps yaw across the +/-180 seam, and floors the emission rate so
//! a 60Hz sensor cannot flood the link. Step sizing for keyboard and wheel
//! input also lives here.

use std::time::Instant;

use ptz_traits::{Axis, AxisCapability};

use crate::config::IntentCfg;
use crate::util::wrap_degrees;

/// One relative movement the shaper wants dispatched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentDelta {
    pub axis: Axis,
    pub delta_units: f64,
}

#[derive(Debug, Default)]
struct AxisShaper {
    residual_deg: f64,
    emitted_at: Option<Instant>,
}

impl AxisShaper {
    fn offer(&mut self, delta_deg: f64, now: Instant, cfg: &IntentCfg) -> Option<f64> {
        self.residual_deg += delta_deg;
        if self.residual_deg.abs() < cfg.degree_threshold {
            return None;
        }
        if let Some(at) = self.emitted_at {
            let since_ms = now.saturating_duration_since(at).as_millis() as u64;
            if since_ms < cfg.min_interval_ms {
                return None;
            }
        }
        let units = self.residual_deg * cfg.units_per_degree;
        self.residual_deg = 0.0;
        self.emitted_at = Some(now);
        Some(units)
    }
}

/// Converts an absolute orientation stream into rate-limited relative
/// pan/tilt deltas.
#[derive(Debug)]
pub struct OrientationIntent {
    cfg: IntentCfg,
    last_yaw: Option<f64>,
    last_pitch: Option<f64>,
    pan: AxisShaper,
    tilt: AxisShaper,
}

impl OrientationIntent {
    pub fn new(cfg: IntentCfg) -> Self {
        Self {
            cfg,
            last_yaw: None,
            last_pitch: None,
            pan: AxisShaper::default(),
            tilt: AxisShaper::default(),
        }
    }

    /// Feed one absolute orientation sample in degrees. The first sample
    /// only primes the reference; later samples may emit up to one delta
    /// per axis.
    pub fn on_sample(&mut self, yaw_deg: f64, pitch_deg: f64, now: Instant) -> Vec<IntentDelta> {
        if !yaw_deg.is_finite() || !pitch_deg.is_finite() {
            tracing::debug!(yaw_deg, pitch_deg, "non-finite orientation sample dropped");
            return Vec::new();
        }
        let mut out = Vec::new();
        if let Some(last) = self.last_yaw {
            let delta = wrap_degrees(yaw_deg - last);
            if let Some(units) = self.pan.offer(delta, now, &self.cfg) {
                out.push(IntentDelta {
                    axis: Axis::Pan,
                    delta_units: units,
                });
            }
        }
        if let Some(last) = self.last_pitch {
            let delta = wrap_degrees(pitch_deg - last);
            if let Some(units) = self.tilt.offer(delta, now, &self.cfg) {
                out.push(IntentDelta {
                    axis: Axis::Tilt,
                    delta_units: units,
                });
            }
        }
        self.last_yaw = Some(yaw_deg);
        self.last_pitch = Some(pitch_deg);
        out
    }

    /// Forget the reference orientation and any accumulated residual.
    pub fn reset(&mut self) {
        self.last_yaw = None;
        self.last_pitch = None;
        self.pan = AxisShaper::default();
        self.tilt = AxisShaper::default();
    }
}

/// One keyboard or wheel step for an axis: its range over the configured
/// divisor.
pub fn step_size(cfg: &IntentCfg, cap: &AxisCapability, axis: Axis) -> f64 {
    let divisor = match axis {
        Axis::Pan => cfg.pan_divisor,
        Axis::Tilt => cfg.tilt_divisor,
        Axis::Zoom => cfg.zoom_divisor,
    };
    (cap.max - cap.min) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shaper() -> OrientationIntent {
        OrientationIntent::new(IntentCfg::default())
    }

    #[test]
    fn first_sample_only_primes() {
        let mut intent = shaper();
        assert!(intent.on_sample(10.0, 5.0, Instant::now()).is_empty());
    }

    #[test]
    fn above_threshold_delta_emits_in_device_units() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(0.0, 0.0, t0);
        let out = intent.on_sample(2.0, 0.0, t0 + Duration::from_millis(200));
        assert_eq!(
            out,
            vec![IntentDelta {
                axis: Axis::Pan,
                delta_units: 14_400.0
            }]
        );
    }

    #[test]
    fn sub_threshold_wiggle_accumulates() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(0.0, 0.0, t0);
        assert!(intent
            .on_sample(0.4, 0.0, t0 + Duration::from_millis(200))
            .is_empty());
        assert!(intent
            .on_sample(0.8, 0.0, t0 + Duration::from_millis(400))
            .is_empty());
        let out = intent.on_sample(1.2, 0.0, t0 + Duration::from_millis(600));
        // the full 1.2 degrees emits, not just the last step
        assert_eq!(out[0].delta_units, 1.2 * 7_200.0);
    }

    #[test]
    fn yaw_wraps_across_the_seam() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(179.0, 0.0, t0);
        let out = intent.on_sample(-179.0, 0.0, t0 + Duration::from_millis(200));
        assert_eq!(out[0].delta_units, 2.0 * 7_200.0);
    }

    #[test]
    fn emission_rate_is_floored() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(0.0, 0.0, t0);
        let first = intent.on_sample(3.0, 0.0, t0 + Duration::from_millis(150));
        assert_eq!(first.len(), 1);
        // too soon: suppressed but retained
        assert!(intent
            .on_sample(6.0, 0.0, t0 + Duration::from_millis(200))
            .is_empty());
        let late = intent.on_sample(6.0, 0.0, t0 + Duration::from_millis(300));
        assert_eq!(late[0].delta_units, 3.0 * 7_200.0);
    }

    #[test]
    fn axes_rate_limit_independently() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(0.0, 0.0, t0);
        let pan_only = intent.on_sample(2.0, 0.0, t0 + Duration::from_millis(150));
        assert_eq!(pan_only.len(), 1);
        assert_eq!(pan_only[0].axis, Axis::Pan);
        // tilt has not emitted yet, so its floor does not apply
        let tilt_only = intent.on_sample(2.0, 2.0, t0 + Duration::from_millis(200));
        assert_eq!(tilt_only.len(), 1);
        assert_eq!(tilt_only[0].axis, Axis::Tilt);
    }

    #[test]
    fn reset_forgets_reference_and_residual() {
        let mut intent = shaper();
        let t0 = Instant::now();
        intent.on_sample(0.0, 0.0, t0);
        intent.on_sample(0.5, 0.0, t0 + Duration::from_millis(100));
        intent.reset();
        // a big jump right after reset only primes again
        assert!(intent.on_sample(90.0, 0.0, t0 + Duration::from_millis(300)).is_empty());
    }

    #[test]
    fn step_sizes_divide_the_axis_range() {
        let cfg = IntentCfg::default();
        let pan_cap = AxisCapability::new(-50_000.0, 50_000.0, Some(3_600.0));
        assert_eq!(step_size(&cfg, &pan_cap, Axis::Pan), 20_000.0);
        let zoom_cap = AxisCapability::new(1.0, 5.0, None);
        assert!((step_size(&cfg, &zoom_cap, Axis::Zoom) - 0.2).abs() < 1e-12);
    }
}
