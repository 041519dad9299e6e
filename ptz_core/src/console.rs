//! The operator-side console.
//!
//! One `ConsoleCore` owns the link to the camera fleet and every piece of
//! operator-side state: the clock-offset estimator, the tracked-command
//! dispatcher, discovered capabilities, the visual tracker, orientation
//! intent shaping, and the measurement log. Each `tick` advances the
//! estimator, drains inbound frames, expires overdue commands, and flushes
//! the log. Everything observable surfaces through [`ConsoleEvent`]s so a
//! UI or CLI can poll without reaching into internals.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use eyre::WrapErr;

use ptz_traits::clock::Clock;
use ptz_traits::{Axis, Link, TargetCapabilities};

use crate::clocksync::{ClockOffset, ClockSync, LocalMs, RemoteMs};
use crate::config::ConsoleCfg;
use crate::dispatch::{CommandId, Dispatcher};
use crate::error::{ControlError, Report, Result};
use crate::eval::{Row, SessionLog};
use crate::intent::{IntentDelta, OrientationIntent, step_size};
use crate::link_error::map_link_error;
use crate::message::Message;
use crate::track::{Frame, TrackStep, Tracker};

/// Something the console wants the embedding UI to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// Clock-offset estimation finished (possibly degraded to 0).
    SyncReady { offset_ms: f64, degraded: bool },
    /// The link transitioned to closed; offsets and listeners were dropped.
    LinkDown,
    /// A capabilities announcement introduced a target we had not seen.
    TargetDiscovered { target: String },
    /// A tracked command resolved, by remote ack or local expiry.
    Acked {
        id: CommandId,
        target: String,
        axis: Axis,
        latency_ms: f64,
        timed_out: bool,
    },
    /// A measured movement settled on the remote end.
    Settled {
        target: String,
        axis: Axis,
        latency_ms: f64,
    },
    /// Visual tracking stopped itself after a fault.
    TrackingFault { reason: String },
}

pub struct ConsoleCore<L: Link> {
    pub(crate) link: L,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) cfg: ConsoleCfg,
    pub(crate) sync: ClockSync,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) caps: BTreeMap<String, TargetCapabilities>,
    /// Last value this console commanded, per target and axis. Seeds the
    /// base for relative moves until real telemetry exists on this side.
    pub(crate) last_commanded: HashMap<String, HashMap<Axis, f64>>,
    /// Which target a pending `movement_finished` on each axis belongs to.
    /// Newest measured send wins.
    pub(crate) measured: HashMap<Axis, String>,
    pub(crate) tracker: Tracker,
    pub(crate) intent: OrientationIntent,
    pub(crate) log: SessionLog,
    pub(crate) events: VecDeque<ConsoleEvent>,
    pub(crate) was_open: bool,
}

impl<L: Link> core::fmt::Debug for ConsoleCore<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConsoleCore")
            .field("targets", &self.caps.len())
            .field("pending", &self.dispatcher.pending_len())
            .field("tracking", &self.tracker.is_tracking())
            .field("recording", &self.log.is_recording())
            .finish()
    }
}

impl<L: Link> ConsoleCore<L> {
    pub fn link_open(&self) -> bool {
        self.link.is_open()
    }

    /// The current clock-offset estimate, once a run has completed.
    pub fn offset(&self) -> Option<ClockOffset> {
        self.sync.offset()
    }

    /// Discard the current estimate and start a fresh sampling run.
    pub fn resync(&mut self) -> Result<()> {
        if !self.link.is_open() {
            return Err(Report::new(ControlError::LinkClosed));
        }
        self.sync.begin(self.clock.now());
        Ok(())
    }

    pub fn targets(&self) -> Vec<&str> {
        self.caps.keys().map(String::as_str).collect()
    }

    pub fn capabilities(&self, target: &str) -> Option<&TargetCapabilities> {
        self.caps.get(target)
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    pub fn tracking_target(&self) -> Option<&str> {
        self.tracker.target()
    }

    pub fn is_recording(&self) -> bool {
        self.log.is_recording()
    }

    /// Next queued event, oldest first.
    pub fn poll_event(&mut self) -> Option<ConsoleEvent> {
        self.events.pop_front()
    }

    /// One scheduler iteration: link state, sync pacing, inbound frames,
    /// pending-command expiry, log flushing.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();

        let open = self.link.is_open();
        if open && !self.was_open {
            tracing::info!("link up; starting clock sync");
            self.sync.begin(now);
        } else if !open && self.was_open {
            tracing::warn!("link closed; dropping clock offset and settle listeners");
            self.sync.invalidate();
            self.measured.clear();
            self.events.push_back(ConsoleEvent::LinkDown);
            if self.tracker.is_tracking() {
                self.tracker.fail_safe("link closed");
                self.events.push_back(ConsoleEvent::TrackingFault {
                    reason: "link closed".into(),
                });
            }
        }
        self.was_open = open;

        if open {
            let epoch_now = LocalMs(self.clock.epoch_ms());
            let (ping, finished) = self.sync.tick(now, epoch_now);
            if let Some(message) = ping {
                self.send(&message)?;
            }
            if let Some(result) = finished {
                self.events.push_back(ConsoleEvent::SyncReady {
                    offset_ms: result.offset.ms(),
                    degraded: result.degraded,
                });
            }

            while let Some(frame) = self
                .link
                .poll()
                .map_err(|e| Report::new(map_link_error(&*e)))
                .wrap_err("polling link")?
            {
                self.handle_frame(frame)?;
            }
        }

        let epoch_now = LocalMs(self.clock.epoch_ms());
        for (id, cmd) in self.dispatcher.sweep(now) {
            let latency_ms = epoch_now.since(cmd.start);
            self.log.record_ack(
                id.clone(),
                &cmd.target,
                cmd.axis,
                cmd.target_value,
                cmd.start,
                epoch_now,
                true,
            );
            self.events.push_back(ConsoleEvent::Acked {
                id,
                target: cmd.target,
                axis: cmd.axis,
                latency_ms,
                timed_out: true,
            });
        }

        self.log.tick(now);
        Ok(())
    }

    fn handle_frame(&mut self, frame: String) -> Result<()> {
        let message = match Message::parse(&frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame dropped");
                return Ok(());
            }
        };
        match message {
            Message::Pong { t1, t2 } => {
                let received = LocalMs(self.clock.epoch_ms());
                if let Some(result) = self.sync.on_pong(t1, t2, received) {
                    self.events.push_back(ConsoleEvent::SyncReady {
                        offset_ms: result.offset.ms(),
                        degraded: result.degraded,
                    });
                }
                Ok(())
            }
            Message::Capabilities { data } => {
                for (target, caps) in data {
                    let discovered = !self.caps.contains_key(&target);
                    tracing::info!(target_id = %target, "capabilities received");
                    self.caps.insert(target.clone(), caps);
                    if discovered {
                        self.events.push_back(ConsoleEvent::TargetDiscovered { target });
                    }
                }
                Ok(())
            }
            Message::CommandAck {
                id,
                command,
                timed_out,
            } => {
                let Some(cmd) = self.dispatcher.resolve(&id) else {
                    tracing::debug!(%id, "ack for unknown or already-expired command dropped");
                    return Ok(());
                };
                if cmd.axis != command {
                    tracing::debug!(%id, sent = %cmd.axis, echoed = %command, "ack echoed a different axis");
                }
                let epoch_now = LocalMs(self.clock.epoch_ms());
                let latency_ms = epoch_now.since(cmd.start);
                self.log.record_ack(
                    id.clone(),
                    &cmd.target,
                    cmd.axis,
                    cmd.target_value,
                    cmd.start,
                    epoch_now,
                    timed_out,
                );
                self.events.push_back(ConsoleEvent::Acked {
                    id,
                    target: cmd.target,
                    axis: cmd.axis,
                    latency_ms,
                    timed_out,
                });
                Ok(())
            }
            Message::MovementFinished {
                command,
                target_value,
                mouse_timestamp,
                movement_end_time,
            } => {
                let Some(target) = self.measured.remove(&command) else {
                    tracing::debug!(axis = %command, "movement_finished without a waiting listener");
                    return Ok(());
                };
                let Some(offset) = self.sync.offset() else {
                    tracing::warn!(axis = %command, "movement_finished before clock offset; dropped");
                    return Ok(());
                };
                let mouse = LocalMs(mouse_timestamp);
                let end = RemoteMs(movement_end_time);
                let latency_ms = offset.correct(end).since(mouse);
                self.log
                    .record_settle(&target, command, target_value, mouse, end, offset);
                self.events.push_back(ConsoleEvent::Settled {
                    target,
                    axis: command,
                    latency_ms,
                });
                Ok(())
            }
            other => {
                tracing::debug!(frame = ?other, "frame ignored on console side");
                Ok(())
            }
        }
    }

    /// Position an axis. Untracked normally; while a recording session is
    /// open the command is tracked so its ack latency lands in the log.
    pub fn set_axis(&mut self, target: &str, axis: Axis, value: f64) -> Result<()> {
        self.dispatch_value(target, axis, value)?;
        Ok(())
    }

    /// Position an axis and demand an acknowledgement. Returns the command
    /// id the eventual [`ConsoleEvent::Acked`] will carry.
    pub fn set_axis_tracked(&mut self, target: &str, axis: Axis, value: f64) -> Result<CommandId> {
        let now = self.clock.now();
        let epoch_now = LocalMs(self.clock.epoch_ms());
        let sent = self.dispatcher.send_tracked(
            target,
            axis,
            value,
            self.caps.get(target),
            now,
            epoch_now,
            None,
            None,
        )?;
        self.send(&sent.message)?;
        self.note_commanded(target, axis, sent.value);
        Ok(sent.id)
    }

    /// Position an axis and ask the camera to report when movement settles.
    /// `mouse_timestamp` is the originating input event on this clock; the
    /// end-to-end latency is measured from it.
    pub fn set_axis_measured(
        &mut self,
        target: &str,
        axis: Axis,
        value: f64,
        mouse_timestamp: LocalMs,
    ) -> Result<()> {
        let (message, value) = self.dispatcher.send_untracked(
            target,
            axis,
            value,
            self.caps.get(target),
            Some(mouse_timestamp),
        )?;
        self.send(&message)?;
        self.note_commanded(target, axis, value);
        if let Some(previous) = self.measured.insert(axis, target.to_string()) {
            if previous != target {
                tracing::debug!(axis = %axis, %previous, "settle attribution replaced");
            }
        }
        Ok(())
    }

    /// Move an axis by whole steps of its capability-derived step size.
    /// Requires known capabilities; stepping blind has no meaningful size.
    pub fn nudge_axis(&mut self, target: &str, axis: Axis, steps: i32) -> Result<()> {
        let cap = self
            .caps
            .get(target)
            .and_then(|c| c.axis(axis))
            .copied()
            .ok_or_else(|| {
                Report::new(ControlError::State(format!(
                    "no {axis} capability known for {target}"
                )))
            })?;
        let step = step_size(&self.cfg.intent, &cap, axis);
        let value = self.current_value(target, axis) + f64::from(steps) * step;
        self.dispatch_value(target, axis, value)?;
        Ok(())
    }

    /// Feed one head-orientation sample. Deltas that clear the intent
    /// shaper's threshold and rate floor go out as untracked relative moves.
    pub fn on_orientation(&mut self, target: &str, yaw_deg: f64, pitch_deg: f64) -> Result<()> {
        let now = self.clock.now();
        for IntentDelta { axis, delta_units } in self.intent.on_sample(yaw_deg, pitch_deg, now) {
            let value = self.current_value(target, axis) + delta_units;
            let (message, value) =
                self.dispatcher
                    .send_untracked(target, axis, value, self.caps.get(target), None)?;
            self.send(&message)?;
            self.note_commanded(target, axis, value);
        }
        Ok(())
    }

    /// Begin visual tracking against a discovered target.
    pub fn start_tracking(&mut self, target: &str) -> Result<()> {
        if !self.caps.contains_key(target) {
            return Err(Report::new(ControlError::Tracking(format!(
                "unknown target {target}"
            ))));
        }
        self.tracker.start(target);
        Ok(())
    }

    pub fn stop_tracking(&mut self) {
        self.tracker.stop();
    }

    /// Feed one video frame to the tracker. Corrections dispatch as tracked
    /// commands; a dispatch failure stops tracking fail-safe. Processed
    /// cycles without a marker still land in the session log.
    pub fn feed_frame(&mut self, frame: &Frame) -> Result<()> {
        let correction = match self.tracker.on_frame(frame) {
            TrackStep::Idle => return Ok(()),
            TrackStep::NotDetected => {
                if let Some(target) = self.tracker.target() {
                    let epoch_now = LocalMs(self.clock.epoch_ms());
                    let target = target.to_string();
                    self.log.record_not_detected(&target, epoch_now);
                }
                return Ok(());
            }
            TrackStep::Corrected(correction) => correction,
        };
        let Some(target) = self.tracker.target().map(str::to_string) else {
            return Ok(());
        };
        let epoch_now = LocalMs(self.clock.epoch_ms());
        self.log.record_correction(&target, &correction, epoch_now);
        for (axis, delta) in [(Axis::Pan, correction.pan), (Axis::Tilt, correction.tilt)] {
            let value = self.current_value(&target, axis) + delta;
            if let Err(e) = self.set_axis_tracked(&target, axis, value) {
                self.tracker.fail_safe("command dispatch failed");
                self.events.push_back(ConsoleEvent::TrackingFault {
                    reason: "command dispatch failed".into(),
                });
                return Err(e);
            }
        }
        Ok(())
    }

    /// Open a measurement session, discarding any earlier rows.
    pub fn start_recording(&mut self) {
        self.log.start(self.clock.now());
    }

    /// Stop the session; rows still in flight are accepted for the grace
    /// period, then `export` unlocks.
    pub fn stop_recording(&mut self) {
        self.log.stop(self.clock.now());
    }

    /// All rows of the closed measurement session.
    pub fn export(&self) -> Result<&[Row]> {
        self.log.export()
    }

    fn dispatch_value(&mut self, target: &str, axis: Axis, value: f64) -> Result<Option<CommandId>> {
        if self.log.is_recording() {
            return self.set_axis_tracked(target, axis, value).map(Some);
        }
        let (message, value) =
            self.dispatcher
                .send_untracked(target, axis, value, self.caps.get(target), None)?;
        self.send(&message)?;
        self.note_commanded(target, axis, value);
        Ok(None)
    }

    fn current_value(&self, target: &str, axis: Axis) -> f64 {
        if let Some(value) = self.last_commanded.get(target).and_then(|m| m.get(&axis)) {
            return *value;
        }
        self.caps
            .get(target)
            .and_then(|c| c.axis(axis))
            .map(|cap| cap.midpoint())
            .unwrap_or(0.0)
    }

    fn note_commanded(&mut self, target: &str, axis: Axis, value: f64) {
        self.last_commanded
            .entry(target.to_string())
            .or_default()
            .insert(axis, value);
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.encode()?;
        self.link
            .send(&frame)
            .map_err(|e| Report::new(map_link_error(&*e)))
            .wrap_err("sending frame")
    }
}
