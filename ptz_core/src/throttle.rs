//! Actuator-side apply throttle (one hardware call per axis per window).
//!
//! Visual and manual control can both emit many requests per frame or pixel
//! of movement; this gate bounds actuator call frequency by coalescing:
//! within a delay window only the most recent pending value per axis is
//! kept, applied when the window reopens on a later tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ptz_traits::Axis;

use crate::config::ThrottleCfg;

#[derive(Debug, Default)]
struct GateSlot {
    last_applied: Option<Instant>,
    pending: Option<f64>,
}

/// Outcome of offering a value to the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Window open: apply this value to hardware now.
    Apply(f64),
    /// Window closed: stored as the sole pending value for the axis.
    Deferred,
}

#[derive(Debug)]
pub struct ApplyGate {
    delay: Duration,
    slots: HashMap<Axis, GateSlot>,
}

impl ApplyGate {
    pub fn new(cfg: &ThrottleCfg) -> Self {
        Self {
            delay: Duration::from_millis(cfg.delay_ms),
            slots: HashMap::new(),
        }
    }

    /// Offer a value for one axis. Newer offers overwrite a deferred one.
    pub fn offer(&mut self, axis: Axis, value: f64, now: Instant) -> GateDecision {
        let slot = self.slots.entry(axis).or_default();
        let open = match slot.last_applied {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.delay,
        };
        if open {
            slot.last_applied = Some(now);
            slot.pending = None;
            GateDecision::Apply(value)
        } else {
            slot.pending = Some(value);
            GateDecision::Deferred
        }
    }

    /// Collect deferred values whose window has reopened at `now`.
    /// Each returned value counts as applied at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(Axis, f64)> {
        let mut ready = Vec::new();
        for axis in Axis::ALL {
            let Some(slot) = self.slots.get_mut(&axis) else {
                continue;
            };
            if slot.pending.is_none() {
                continue;
            }
            let open = match slot.last_applied {
                None => true,
                Some(at) => now.saturating_duration_since(at) >= self.delay,
            };
            if open {
                if let Some(value) = slot.pending.take() {
                    slot.last_applied = Some(now);
                    ready.push((axis, value));
                }
            }
        }
        ready
    }

    /// True when some axis still holds a deferred value.
    pub fn has_pending(&self) -> bool {
        self.slots.values().any(|s| s.pending.is_some())
    }
}
