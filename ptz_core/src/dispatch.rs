//! Operator-side command dispatch and pending-command bookkeeping.
//!
//! Two entry points: tracked sends carry a unique id and expect exactly one
//! outcome (remote ack, or local expiry); untracked sends are fire-and-forget
//! for intermediate drag/orientation updates where only the final settled
//! value matters. Values are clamped against the target's capabilities
//! before they leave this node.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use ptz_traits::{Axis, TargetCapabilities};

use crate::clocksync::LocalMs;
use crate::config::DispatchCfg;
use crate::error::{ControlError, Report, Result};
use crate::message::Message;

pub type CommandId = String;

/// Bookkeeping for one tracked command awaiting its acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub target: String,
    pub axis: Axis,
    pub target_value: f64,
    /// When the command left this node (monotonic; drives TTL expiry).
    pub dispatched: Instant,
    /// Latency baseline: the dispatch instant's epoch ms, or an upstream
    /// input-event timestamp when the caller supplied one.
    pub start: LocalMs,
}

/// A tracked command ready to go on the wire.
#[derive(Debug)]
pub struct TrackedSend {
    pub id: CommandId,
    pub message: Message,
    /// Value after clamping, for the caller's last-commanded bookkeeping.
    pub value: f64,
}

#[derive(Debug)]
pub struct Dispatcher {
    cfg: DispatchCfg,
    next_id: u64,
    pending: HashMap<CommandId, PendingCommand>,
    /// Insertion order, for cap eviction of the oldest entries.
    order: VecDeque<CommandId>,
}

impl Dispatcher {
    pub fn new(cfg: DispatchCfg) -> Self {
        Self {
            cfg,
            next_id: 0,
            pending: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, id: &str) -> Option<&PendingCommand> {
        self.pending.get(id)
    }

    /// Build a measured command and record it in the pending map.
    ///
    /// `start` overrides the latency baseline; pass None to measure from the
    /// dispatch instant. `mouse_timestamp` rides along for the remote
    /// settled-listener path.
    #[allow(clippy::too_many_arguments)]
    pub fn send_tracked(
        &mut self,
        target: &str,
        axis: Axis,
        value: f64,
        caps: Option<&TargetCapabilities>,
        now: Instant,
        epoch_now: LocalMs,
        start: Option<LocalMs>,
        mouse_timestamp: Option<LocalMs>,
    ) -> Result<TrackedSend> {
        let value = clamp_value(target, axis, value, caps)?;
        let id = format!("c{}", self.next_id);
        self.next_id += 1;
        self.pending.insert(
            id.clone(),
            PendingCommand {
                target: target.to_string(),
                axis,
                target_value: value,
                dispatched: now,
                start: start.unwrap_or(epoch_now),
            },
        );
        self.order.push_back(id.clone());
        self.evict_over_cap();
        let message = Message::Command {
            target: target.to_string(),
            command: axis,
            value,
            id: Some(id.clone()),
            mouse_timestamp: mouse_timestamp.map(|t| t.0),
        };
        tracing::debug!(target_id = target, axis = %axis, value, id = %id, "tracked command");
        Ok(TrackedSend { id, message, value })
    }

    /// Build a fire-and-forget command: no id, no pending entry, no ack.
    pub fn send_untracked(
        &mut self,
        target: &str,
        axis: Axis,
        value: f64,
        caps: Option<&TargetCapabilities>,
        mouse_timestamp: Option<LocalMs>,
    ) -> Result<(Message, f64)> {
        let value = clamp_value(target, axis, value, caps)?;
        tracing::trace!(target_id = target, axis = %axis, value, "untracked command");
        Ok((
            Message::Command {
                target: target.to_string(),
                command: axis,
                value,
                id: None,
                mouse_timestamp: mouse_timestamp.map(|t| t.0),
            },
            value,
        ))
    }

    /// Take the pending entry matching an acknowledgement. Ids that already
    /// expired (or were never ours) come back None; the caller drops those.
    pub fn resolve(&mut self, id: &str) -> Option<PendingCommand> {
        self.pending.remove(id)
    }

    /// Expire entries older than the configured TTL. Each expired command is
    /// returned so the caller can emit its one timed-out outcome.
    pub fn sweep(&mut self, now: Instant) -> Vec<(CommandId, PendingCommand)> {
        let ttl_ms = self.cfg.pending_ttl_ms;
        let mut expired = Vec::new();
        self.pending.retain(|id, cmd| {
            let age_ms = now.saturating_duration_since(cmd.dispatched).as_millis() as u64;
            if age_ms >= ttl_ms {
                tracing::warn!(id = %id, axis = %cmd.axis, age_ms, "tracked command expired without ack");
                expired.push((id.clone(), cmd.clone()));
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            self.order.retain(|id| self.pending.contains_key(id));
        }
        // oldest first, so downstream records keep dispatch order
        expired.sort_by(|a, b| a.1.dispatched.cmp(&b.1.dispatched));
        expired
    }

    fn evict_over_cap(&mut self) {
        while self.pending.len() > self.cfg.pending_cap {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.pending.remove(&oldest).is_some() {
                tracing::warn!(id = %oldest, "pending map over capacity; evicting oldest entry");
            }
        }
    }
}

/// Clamp a requested value into the axis capability range.
///
/// Without a known capability the value passes through unclamped; the
/// actuator node clamps again on apply, so this is advisory until the
/// capabilities message lands.
fn clamp_value(
    target: &str,
    axis: Axis,
    value: f64,
    caps: Option<&TargetCapabilities>,
) -> Result<f64> {
    if !value.is_finite() {
        return Err(Report::new(ControlError::State(format!(
            "non-finite {axis} value for {target}"
        ))));
    }
    match caps.and_then(|c| c.axis(axis)) {
        Some(cap) => Ok(cap.clamp(value)),
        None => {
            tracing::debug!(target_id = target, axis = %axis, "no capability; passing value through");
            Ok(value)
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
            pan: Some(AxisCapability::new(-100.0, 100.0, Some(1.0))),
            tilt: Some(AxisCapability::new(-50.0, 50.0, Some(1.0))),
            zoom: Some(AxisCapability::new(1.0, 5.0, None)),
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatchCfg::default())
    }

    #[test]
    fn tracked_send_clamps_and_records_pending() {
        let mut d = dispatcher();
        let now = Instant::now();
        let sent = d
            .send_tracked(
                "cam1",
                Axis::Pan,
                250.0,
                Some(&caps()),
                now,
                LocalMs(1_000.0),
                None,
                None,
            )
            .unwrap();
        assert_eq!(sent.value, 100.0);
        let pending = d.pending(&sent.id).unwrap();
        assert_eq!(pending.target_value, 100.0);
        assert_eq!(pending.start, LocalMs(1_000.0));
        match sent.message {
            Message::Command { value, id, .. } => {
                assert_eq!(value, 100.0);
                assert_eq!(id.as_deref(), Some(sent.id.as_str()));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn supplied_start_overrides_dispatch_instant() {
        let mut d = dispatcher();
        let sent = d
            .send_tracked(
                "cam1",
                Axis::Tilt,
                10.0,
                Some(&caps()),
                Instant::now(),
                LocalMs(2_000.0),
                Some(LocalMs(1_900.0)),
                None,
            )
            .unwrap();
        assert_eq!(d.pending(&sent.id).unwrap().start, LocalMs(1_900.0));
    }

    #[test]
    fn untracked_send_keeps_no_state() {
        let mut d = dispatcher();
        let (msg, value) = d
            .send_untracked("cam1", Axis::Zoom, 9.0, Some(&caps()), None)
            .unwrap();
        assert_eq!(value, 5.0);
        assert!(matches!(msg, Message::Command { id: None, .. }));
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn ids_are_unique_across_sends() {
        let mut d = dispatcher();
        let a = d
            .send_tracked(
                "cam1",
                Axis::Pan,
                1.0,
                None,
                Instant::now(),
                LocalMs(0.0),
                None,
                None,
            )
            .unwrap();
        let b = d
            .send_tracked(
                "cam1",
                Axis::Pan,
                2.0,
                None,
                Instant::now(),
                LocalMs(0.0),
                None,
                None,
            )
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn resolve_is_single_shot() {
        let mut d = dispatcher();
        let sent = d
            .send_tracked(
                "cam1",
                Axis::Pan,
                1.0,
                None,
                Instant::now(),
                LocalMs(0.0),
                None,
                None,
            )
            .unwrap();
        assert!(d.resolve(&sent.id).is_some());
        assert!(d.resolve(&sent.id).is_none());
    }

    #[test]
    fn sweep_expires_only_overdue_entries() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        let old = d
            .send_tracked("cam1", Axis::Pan, 1.0, None, t0, LocalMs(0.0), None, None)
            .unwrap();
        let fresh_at = t0 + Duration::from_millis(5_000);
        let fresh = d
            .send_tracked("cam1", Axis::Tilt, 1.0, None, fresh_at, LocalMs(5_000.0), None, None)
            .unwrap();
        let expired = d.sweep(t0 + Duration::from_millis(6_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, old.id);
        assert!(d.pending(&fresh.id).is_some());
        // a late ack for the swept id finds nothing
        assert!(d.resolve(&old.id).is_none());
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let mut d = Dispatcher::new(DispatchCfg {
            pending_cap: 2,
            pending_ttl_ms: 60_000,
        });
        let now = Instant::now();
        let ids: Vec<_> = (0..3)
            .map(|i| {
                d.send_tracked(
                    "cam1",
                    Axis::Pan,
                    i as f64,
                    None,
                    now + Duration::from_millis(i),
                    LocalMs(i as f64),
                    None,
                    None,
                )
                .unwrap()
                .id
            })
            .collect();
        assert_eq!(d.pending_len(), 2);
        assert!(d.pending(&ids[0]).is_none());
        assert!(d.pending(&ids[1]).is_some());
        assert!(d.pending(&ids[2]).is_some());
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let mut d = dispatcher();
        let err = d
            .send_untracked("cam1", Axis::Pan, f64::NAN, Some(&caps()), None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ControlError>(),
            Some(ControlError::State(_))
        ));
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn unknown_capability_passes_value_through() {
        let mut d = dispatcher();
        let (_, value) = d
            .send_untracked("cam9", Axis::Pan, 12_345.0, None, None)
            .unwrap();
        assert_eq!(value, 12_345.0);
    }
}
