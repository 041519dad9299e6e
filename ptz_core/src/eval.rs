//! Latency measurement and the recording session log.
//!
//! Two latency paths meet here and they cross clock domains differently.
//! Acknowledgement latency is a same-clock subtraction: the command left at
//! a local time and the ack arrived at a local time. Settle latency crosses
//! clocks: the camera reports when movement ended on its own clock, so the
//! remote end time is corrected by the estimated offset before subtracting
//! the local gesture time. The log buffers rows and flushes them to the
//! durable list on a cadence; after stop it keeps accepting in-flight rows
//! for a grace period, then closes and unlocks export.

use std::time::Instant;

use serde::Serialize;

use ptz_traits::Axis;

use crate::clocksync::{ClockOffset, LocalMs, RemoteMs};
use crate::config::EvalCfg;
use crate::dispatch::CommandId;
use crate::error::{ControlError, Report, Result};
use crate::track::Correction;

/// Round-trip outcome of one tracked command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyRecord {
    pub id: CommandId,
    pub target: String,
    pub axis: Axis,
    pub value: f64,
    pub sent_at_ms: f64,
    pub latency_ms: f64,
    pub timed_out: bool,
}

/// Gesture-to-settled outcome of one measured movement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettleRecord {
    pub target: String,
    pub axis: Axis,
    pub target_value: f64,
    pub mouse_timestamp_ms: f64,
    /// End of movement on the remote clock, as reported.
    pub movement_end_ms: f64,
    /// The same instant mapped onto the local clock.
    pub corrected_end_ms: f64,
    pub latency_ms: f64,
}

/// One tracking correction cycle, for offline controller analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub target: String,
    pub error_x: f64,
    pub error_y: f64,
    pub pan: f64,
    pub tilt: f64,
    pub at_ms: f64,
}

/// A processed tracking cycle whose frame held no usable marker. Logged so
/// offline analysis can tell "marker lost" from "tracking off".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotDetectedRecord {
    pub target: String,
    pub at_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    Latency(LatencyRecord),
    Settle(SettleRecord),
    Track(TrackRecord),
    NotDetected(NotDetectedRecord),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LogState {
    Idle,
    Recording,
    Draining { until: Instant },
    Closed,
}

/// Buffered measurement log for one recording session.
#[derive(Debug)]
pub struct SessionLog {
    cfg: EvalCfg,
    state: LogState,
    last_flush: Option<Instant>,
    staged: Vec<Row>,
    rows: Vec<Row>,
}

impl SessionLog {
    pub fn new(cfg: EvalCfg) -> Self {
        Self {
            cfg,
            state: LogState::Idle,
            last_flush: None,
            staged: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, LogState::Recording | LogState::Draining { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.state == LogState::Closed
    }

    pub fn len(&self) -> usize {
        self.rows.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Begin a recording session, discarding any previous rows.
    pub fn start(&mut self, now: Instant) {
        if !self.is_empty() {
            tracing::info!(discarded = self.len(), "previous session rows discarded");
        }
        self.staged.clear();
        self.rows.clear();
        self.last_flush = Some(now);
        self.state = LogState::Recording;
        tracing::info!("recording session started");
    }

    /// Stop recording. In-flight rows are still accepted for the configured
    /// grace period, then the log closes.
    pub fn stop(&mut self, now: Instant) {
        match self.state {
            LogState::Recording => {
                self.state = LogState::Draining {
                    until: now + std::time::Duration::from_millis(self.cfg.stop_grace_ms),
                };
                tracing::info!(grace_ms = self.cfg.stop_grace_ms, "recording stopping");
            }
            _ => tracing::debug!("stop without an open recording session"),
        }
    }

    /// Flush staged rows on the configured cadence and close the log once
    /// the post-stop grace expires.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            LogState::Recording => {
                if self.flush_due(now) {
                    self.flush(now);
                }
            }
            LogState::Draining { until } => {
                if self.flush_due(now) {
                    self.flush(now);
                }
                if now >= until {
                    self.flush(now);
                    self.state = LogState::Closed;
                    tracing::info!(rows = self.rows.len(), "recording session closed");
                }
            }
            LogState::Idle | LogState::Closed => {}
        }
    }

    fn flush_due(&self, now: Instant) -> bool {
        match self.last_flush {
            None => true,
            Some(at) => now.saturating_duration_since(at).as_millis() as u64 >= self.cfg.flush_ms,
        }
    }

    fn flush(&mut self, now: Instant) {
        self.rows.append(&mut self.staged);
        self.last_flush = Some(now);
    }

    /// Record an acknowledgement outcome. Same-clock subtraction: both ends
    /// are local timestamps.
    #[allow(clippy::too_many_arguments)]
    pub fn record_ack(
        &mut self,
        id: CommandId,
        target: &str,
        axis: Axis,
        value: f64,
        sent_at: LocalMs,
        now: LocalMs,
        timed_out: bool,
    ) {
        if !self.accepting("ack") {
            return;
        }
        let latency_ms = now.since(sent_at);
        tracing::debug!(%id, axis = %axis, latency_ms, timed_out, "ack latency recorded");
        self.staged.push(Row::Latency(LatencyRecord {
            id,
            target: target.to_string(),
            axis,
            value,
            sent_at_ms: sent_at.0,
            latency_ms,
            timed_out,
        }));
    }

    /// Record a settled movement. The remote end time is mapped into the
    /// local domain through the clock offset before subtracting.
    pub fn record_settle(
        &mut self,
        target: &str,
        axis: Axis,
        target_value: f64,
        mouse_timestamp: LocalMs,
        movement_end: RemoteMs,
        offset: ClockOffset,
    ) {
        if !self.accepting("settle") {
            return;
        }
        let corrected_end = offset.correct(movement_end);
        let latency_ms = corrected_end.since(mouse_timestamp);
        tracing::debug!(axis = %axis, latency_ms, "settle latency recorded");
        self.staged.push(Row::Settle(SettleRecord {
            target: target.to_string(),
            axis,
            target_value,
            mouse_timestamp_ms: mouse_timestamp.0,
            movement_end_ms: movement_end.0,
            corrected_end_ms: corrected_end.0,
            latency_ms,
        }));
    }

    /// Record one tracking correction cycle.
    pub fn record_correction(&mut self, target: &str, correction: &Correction, at: LocalMs) {
        if !self.accepting("correction") {
            return;
        }
        self.staged.push(Row::Track(TrackRecord {
            target: target.to_string(),
            error_x: correction.error_x,
            error_y: correction.error_y,
            pan: correction.pan,
            tilt: correction.tilt,
            at_ms: at.0,
        }));
    }

    /// Record a processed cycle that found no marker.
    pub fn record_not_detected(&mut self, target: &str, at: LocalMs) {
        if !self.accepting("not-detected") {
            return;
        }
        self.staged.push(Row::NotDetected(NotDetectedRecord {
            target: target.to_string(),
            at_ms: at.0,
        }));
    }

    fn accepting(&self, kind: &str) -> bool {
        if self.is_recording() {
            true
        } else {
            tracing::debug!(kind, "row dropped outside a recording session");
            false
        }
    }

    #[cfg(test)]
    fn durable(&self) -> usize {
        self.rows.len()
    }

    /// All rows of the closed session, in arrival order.
    pub fn export(&self) -> Result<&[Row]> {
        if self.is_closed() {
            Ok(&self.rows)
        } else {
            Err(Report::new(ControlError::State(
                "session log is not closed; stop recording and wait for the grace period".into(),
            )))
        }
    }
}
