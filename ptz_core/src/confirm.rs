//! Actuator-side convergence confirmation.
//!
//! Two machines live here. `ConfirmSession` is the per-target id/ack path:
//! it polls telemetry for every pending axis and declares each command done
//! (within tolerance, or force-acked at the session timeout) so that every
//! measured command produces exactly one acknowledgement. `SettleListener`
//! is the per-axis "movement settled" variant: a sliding window over recent
//! telemetry that distinguishes "arrived and stopped" from "passed through
//! the target while still moving", emitting a single movement_finished.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use ptz_traits::{Axis, AxisSettings, TargetCapabilities};

use crate::config::{ConfirmCfg, SettleCfg};
use crate::dispatch::CommandId;
use crate::util::stddev;

/// Pending axis command inside a confirmation session. The desired value
/// never changes after creation; a newer command replaces the entry.
#[derive(Debug, Clone)]
pub struct ConvergenceEntry {
    pub desired: f64,
    pub id: CommandId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmEvent {
    Ack {
        id: CommandId,
        axis: Axis,
        timed_out: bool,
    },
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Polling { started: Instant, last_poll: Option<Instant> },
}

/// Per-target confirmation state machine (Idle <-> Polling).
#[derive(Debug)]
pub struct ConfirmSession {
    cfg: ConfirmCfg,
    caps: TargetCapabilities,
    state: SessionState,
    entries: HashMap<Axis, ConvergenceEntry>,
}

impl ConfirmSession {
    pub fn new(cfg: ConfirmCfg, caps: TargetCapabilities) -> Self {
        Self {
            cfg,
            caps,
            state: SessionState::Idle,
            entries: HashMap::new(),
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, SessionState::Polling { .. })
    }

    pub fn pending_axes(&self) -> usize {
        self.entries.len()
    }

    /// Register a pending axis command. Replaces any existing entry for the
    /// axis (the superseded id gets no ack; the dispatcher-side TTL covers
    /// it) and restarts the session timer for the new batch.
    pub fn begin_axis(&mut self, axis: Axis, desired: f64, id: CommandId, now: Instant) {
        if let Some(old) = self.entries.insert(axis, ConvergenceEntry { desired, id }) {
            tracing::debug!(axis = %axis, superseded = %old.id, "axis entry replaced");
        }
        self.state = SessionState::Polling {
            started: now,
            last_poll: match self.state {
                SessionState::Polling { last_poll, .. } => last_poll,
                SessionState::Idle => None,
            },
        };
    }

    /// Tear the session down without acknowledgements (telemetry gone).
    pub fn teardown(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                pending = self.entries.len(),
                "confirmation torn down; pending axes will resolve via dispatcher timeout"
            );
        }
        self.entries.clear();
        self.state = SessionState::Idle;
    }

    /// Advance the poll loop. `read` is invoked at most once, and only when
    /// a poll is due; returning None means telemetry is unavailable and the
    /// session tears down without acks.
    pub fn tick<F>(&mut self, now: Instant, read: F) -> Vec<ConfirmEvent>
    where
        F: FnOnce() -> Option<AxisSettings>,
    {
        let SessionState::Polling { started, last_poll } = &mut self.state else {
            return Vec::new();
        };
        let started = *started;

        let poll_due = match last_poll {
            None => true,
            Some(at) => now.saturating_duration_since(*at).as_millis() as u64 >= self.cfg.poll_ms,
        };
        if !poll_due {
            return Vec::new();
        }
        *last_poll = Some(now);

        let Some(settings) = read() else {
            self.teardown();
            return Vec::new();
        };

        let mut events = Vec::new();
        let cfg = self.cfg.clone();
        let caps = self.caps.clone();
        self.entries.retain(|axis, entry| {
            let measured = settings.axis(*axis);
            let tolerance = tolerance_for(&cfg, &caps, *axis);
            if (measured - entry.desired).abs() <= tolerance {
                tracing::debug!(axis = %axis, measured, desired = entry.desired, "axis converged");
                events.push(ConfirmEvent::Ack {
                    id: entry.id.clone(),
                    axis: *axis,
                    timed_out: false,
                });
                false
            } else {
                true
            }
        });

        let elapsed_ms = now.saturating_duration_since(started).as_millis() as u64;
        if elapsed_ms >= self.cfg.timeout_ms {
            for (axis, entry) in self.entries.drain() {
                tracing::warn!(axis = %axis, desired = entry.desired, "confirmation timed out");
                events.push(ConfirmEvent::Ack {
                    id: entry.id,
                    axis,
                    timed_out: true,
                });
            }
        }

        if self.entries.is_empty() {
            self.state = SessionState::Idle;
        }
        events
    }
}

/// Tolerance for one axis: capability step scaled by the profile factor for
/// stepped axes, a fixed per-kind tolerance for continuous ones.
fn tolerance_for(cfg: &ConfirmCfg, caps: &TargetCapabilities, axis: Axis) -> f64 {
    match caps.axis(axis).and_then(|c| c.step) {
        Some(step) => step * cfg.step_factor,
        None if axis.is_angular() => cfg.angular_tolerance,
        None => cfg.zoom_tolerance,
    }
}

/// Result of advancing a settle listener one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleStep {
    Pending,
    /// Movement arrived and stopped; emit movement_finished now.
    Finished {
        target_value: f64,
        mouse_timestamp: f64,
    },
    /// Expired without settling; log only, send nothing.
    TimedOut,
    /// Telemetry disappeared; drop silently.
    Lost,
}

/// Per-axis movement-settled listener (sliding stability window).
#[derive(Debug)]
pub struct SettleListener {
    cfg: SettleCfg,
    target: f64,
    mouse_timestamp: f64,
    started: Instant,
    last_poll: Option<Instant>,
    window: VecDeque<f64>,
}

impl SettleListener {
    pub fn new(cfg: SettleCfg, target: f64, mouse_timestamp: f64, now: Instant) -> Self {
        Self {
            cfg,
            target,
            mouse_timestamp,
            started: now,
            last_poll: None,
            window: VecDeque::new(),
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Advance the listener. `read` returns the axis's current telemetry
    /// value, or None when telemetry is gone.
    pub fn tick<F>(&mut self, now: Instant, read: F) -> SettleStep
    where
        F: FnOnce() -> Option<f64>,
    {
        let elapsed_ms = now.saturating_duration_since(self.started).as_millis() as u64;
        if elapsed_ms >= self.cfg.timeout_ms {
            tracing::warn!(target = self.target, "movement never settled before timeout");
            return SettleStep::TimedOut;
        }

        let poll_due = match self.last_poll {
            None => true,
            Some(at) => now.saturating_duration_since(at).as_millis() as u64 >= self.cfg.poll_ms,
        };
        if !poll_due {
            return SettleStep::Pending;
        }
        self.last_poll = Some(now);

        let Some(value) = read() else {
            return SettleStep::Lost;
        };

        self.window.push_back(value);
        while self.window.len() > self.cfg.window {
            self.window.pop_front();
        }
        if self.window.len() < self.cfg.window {
            return SettleStep::Pending;
        }

        let samples: Vec<f64> = self.window.iter().copied().collect();
        let at_target = (value - self.target).abs() <= self.cfg.wide_tolerance;
        let stable = stddev(&samples) < self.cfg.stability_threshold;
        if at_target && stable {
            SettleStep::Finished {
                target_value: self.target,
                mouse_timestamp: self.mouse_timestamp,
            }
        } else {
            SettleStep::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptz_traits::AxisCapability;
    use std::time::Duration;

    fn caps() -> TargetCapabilities {
        TargetCapabilities {
            pan: Some(AxisCapability::new(-100_000.0, 100_000.0, Some(3_600.0))),
            tilt: Some(AxisCapability::new(-100_000.0, 100_000.0, None)),
            zoom: Some(AxisCapability::new(1.0, 5.0, None)),
        }
    }

    #[test]
    fn stepped_axis_uses_dynamic_tolerance() {
        let cfg = ConfirmCfg::default();
        assert_eq!(tolerance_for(&cfg, &caps(), Axis::Pan), 1_800.0);
    }

    #[test]
    fn continuous_axes_use_fixed_tolerances() {
        let cfg = ConfirmCfg::default();
        assert_eq!(tolerance_for(&cfg, &caps(), Axis::Tilt), 2.0);
        assert_eq!(tolerance_for(&cfg, &caps(), Axis::Zoom), 0.05);
    }

    #[test]
    fn new_command_replaces_axis_entry() {
        let mut session = ConfirmSession::new(ConfirmCfg::default(), caps());
        let now = Instant::now();
        session.begin_axis(Axis::Pan, 10.0, "c0".into(), now);
        session.begin_axis(Axis::Pan, 20.0, "c1".into(), now);
        assert_eq!(session.pending_axes(), 1);
        // converge at the new desired value; only c1 acks
        let events = session.tick(now + Duration::from_millis(20), || {
            Some(AxisSettings {
                pan: 20.0,
                ..Default::default()
            })
        });
        assert_eq!(
            events,
            vec![ConfirmEvent::Ack {
                id: "c1".into(),
                axis: Axis::Pan,
                timed_out: false
            }]
        );
        assert!(!session.is_polling());
    }

    #[test]
    fn telemetry_loss_tears_down_without_acks() {
        let mut session = ConfirmSession::new(ConfirmCfg::default(), caps());
        let now = Instant::now();
        session.begin_axis(Axis::Pan, 10.0, "c0".into(), now);
        let events = session.tick(now + Duration::from_millis(20), || None);
        assert!(events.is_empty());
        assert!(!session.is_polling());
        assert_eq!(session.pending_axes(), 0);
    }

    #[test]
    fn settle_requires_full_window_and_stability() {
        let cfg = SettleCfg {
            window: 3,
            stability_threshold: 0.5,
            wide_tolerance: 10.0,
            poll_ms: 10,
            timeout_ms: 1_000,
        };
        let t0 = Instant::now();
        let mut listener = SettleListener::new(cfg, 100.0, 4_850.0, t0);
        // three polls converging and still: window fills, then settles
        let mut step = SettleStep::Pending;
        for i in 0..3u64 {
            step = listener.tick(t0 + Duration::from_millis(i * 10), || Some(100.0));
        }
        assert_eq!(
            step,
            SettleStep::Finished {
                target_value: 100.0,
                mouse_timestamp: 4_850.0
            }
        );
    }

    #[test]
    fn passing_through_target_while_moving_does_not_settle() {
        let cfg = SettleCfg {
            window: 3,
            stability_threshold: 0.5,
            wide_tolerance: 10.0,
            poll_ms: 10,
            timeout_ms: 1_000,
        };
        let t0 = Instant::now();
        let mut listener = SettleListener::new(cfg, 100.0, 0.0, t0);
        // values sweep through the target fast: at-target but unstable
        let sweep = [60.0, 100.0, 140.0];
        let mut last = SettleStep::Pending;
        for (i, v) in sweep.iter().enumerate() {
            last = listener.tick(t0 + Duration::from_millis(i as u64 * 10), || Some(*v));
        }
        assert_eq!(last, SettleStep::Pending);
    }

    #[test]
    fn window_must_be_stable_not_just_on_target() {
        let cfg = SettleCfg {
            window: 3,
            stability_threshold: 0.5,
            wide_tolerance: 10.0,
            poll_ms: 10,
            timeout_ms: 1_000,
        };
        let t0 = Instant::now();
        let mut listener = SettleListener::new(cfg, 100.0, 0.0, t0);
        // final sample lands on target but the window still shows motion
        let sweep = [60.0, 95.0, 100.0];
        let mut last = SettleStep::Pending;
        for (i, v) in sweep.iter().enumerate() {
            last = listener.tick(t0 + Duration::from_millis(i as u64 * 10), || Some(*v));
        }
        assert_eq!(last, SettleStep::Pending);
    }

    #[test]
    fn settle_times_out_when_movement_never_stops() {
        let cfg = SettleCfg {
            timeout_ms: 200,
            ..SettleCfg::default()
        };
        let t0 = Instant::now();
        let mut listener = SettleListener::new(cfg, 100.0, 0.0, t0);
        assert_eq!(listener.tick(t0, || Some(0.0)), SettleStep::Pending);
        assert_eq!(
            listener.tick(t0 + Duration::from_millis(200), || Some(0.0)),
            SettleStep::TimedOut
        );
    }

    #[test]
    fn telemetry_loss_drops_the_listener() {
        let t0 = Instant::now();
        let mut listener = SettleListener::new(SettleCfg::default(), 100.0, 0.0, t0);
        assert_eq!(listener.tick(t0, || None), SettleStep::Lost);
    }
}
