//! Round-trip clock-offset estimation between the two peers.
//!
//! The initiator sends paced pings carrying its own send time `t1`; the
//! responder echoes `t1` plus its receive time `t2`. Assuming symmetric
//! transit delay, each round trip yields one offset sample
//! `t2 - (t1 + rtt/2)`. The estimate is the arithmetic mean over a bounded
//! sampling window.
//!
//! Timestamps are tagged by clock domain (`LocalMs` vs `RemoteMs`) so that
//! cross-domain arithmetic only happens through `ClockOffset::correct`.

use std::time::Instant;

use crate::config::SyncCfg;
use crate::message::Message;

/// Epoch milliseconds on this process's clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LocalMs(pub f64);

impl LocalMs {
    /// Milliseconds elapsed since `earlier` on the same clock.
    pub fn since(&self, earlier: LocalMs) -> f64 {
        self.0 - earlier.0
    }
}

/// Epoch milliseconds on the peer's clock. Opaque until corrected.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RemoteMs(pub f64);

/// Estimated (remote clock - local clock) in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockOffset {
    ms: f64,
}

impl ClockOffset {
    pub fn from_ms(ms: f64) -> Self {
        Self { ms }
    }

    pub fn ms(&self) -> f64 {
        self.ms
    }

    /// Translate a remote-clock timestamp into the local clock domain.
    pub fn correct(&self, remote: RemoteMs) -> LocalMs {
        LocalMs(remote.0 - self.ms)
    }
}

/// One completed estimation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncResult {
    pub offset: ClockOffset,
    /// True when the window closed with zero samples and the offset fell
    /// back to 0; latency figures derived from it are approximate.
    pub degraded: bool,
    pub samples: usize,
}

#[derive(Debug)]
enum SyncState {
    Idle,
    Sampling {
        started: Instant,
        last_ping: Option<Instant>,
        sent: usize,
        samples: Vec<f64>,
    },
    Ready(SyncResult),
}

/// Initiator side of the offset estimation protocol.
///
/// Pure state machine: the caller owns the link and forwards the messages
/// this type asks it to send. All timing comes in through the caller's
/// clock, so tests drive it with a fake one.
#[derive(Debug)]
pub struct ClockSync {
    cfg: SyncCfg,
    state: SyncState,
}

impl ClockSync {
    pub fn new(cfg: SyncCfg) -> Self {
        Self {
            cfg,
            state: SyncState::Idle,
        }
    }

    /// Start (or restart) an estimation run. Any previous result is
    /// discarded, so this is also the reconnect path.
    pub fn begin(&mut self, now: Instant) {
        self.state = SyncState::Sampling {
            started: now,
            last_ping: None,
            sent: 0,
            samples: Vec::with_capacity(self.cfg.samples),
        };
    }

    /// Drop any estimate; called when the channel closes.
    pub fn invalidate(&mut self) {
        self.state = SyncState::Idle;
    }

    pub fn is_sampling(&self) -> bool {
        matches!(self.state, SyncState::Sampling { .. })
    }

    /// The completed estimate, if a run has finished since the last
    /// begin/invalidate.
    pub fn result(&self) -> Option<SyncResult> {
        match self.state {
            SyncState::Ready(r) => Some(r),
            _ => None,
        }
    }

    pub fn offset(&self) -> Option<ClockOffset> {
        self.result().map(|r| r.offset)
    }

    /// Record one pong. `received` is the local receipt time (t3).
    /// Returns the finished result when this sample completes the set.
    pub fn on_pong(&mut self, t1: f64, t2: f64, received: LocalMs) -> Option<SyncResult> {
        let SyncState::Sampling { samples, .. } = &mut self.state else {
            tracing::debug!(t1, "pong outside sampling window ignored");
            return None;
        };
        let rtt = received.0 - t1;
        if !rtt.is_finite() || rtt < 0.0 {
            tracing::debug!(t1, rtt, "discarding pong with bogus round-trip time");
            return None;
        }
        let offset = t2 - (t1 + rtt / 2.0);
        samples.push(offset);
        tracing::debug!(sample = samples.len(), rtt, offset, "sync sample");
        if samples.len() >= self.cfg.samples {
            return Some(self.finish());
        }
        None
    }

    /// Advance pacing and the window deadline. Returns a ping to send now
    /// and/or the finished result when the window closed this tick.
    pub fn tick(&mut self, now: Instant, epoch_now: LocalMs) -> (Option<Message>, Option<SyncResult>) {
        let SyncState::Sampling {
            started,
            last_ping,
            sent,
            ..
        } = &mut self.state
        else {
            return (None, None);
        };

        let elapsed_ms = now.saturating_duration_since(*started).as_millis() as u64;
        if elapsed_ms >= self.cfg.window_ms {
            return (None, Some(self.finish()));
        }

        let gap_open = match last_ping {
            None => true,
            Some(at) => {
                now.saturating_duration_since(*at).as_millis() as u64 >= self.cfg.ping_gap_ms
            }
        };
        if *sent < self.cfg.samples && gap_open {
            *last_ping = Some(now);
            *sent += 1;
            return (Some(Message::Ping { t1: epoch_now.0 }), None);
        }
        (None, None)
    }

    fn finish(&mut self) -> SyncResult {
        let samples = match &self.state {
            SyncState::Sampling { samples, .. } => samples.clone(),
            _ => Vec::new(),
        };
        let result = if samples.is_empty() {
            tracing::warn!("clock sync window closed with zero samples; offset defaults to 0");
            SyncResult {
                offset: ClockOffset::from_ms(0.0),
                degraded: true,
                samples: 0,
            }
        } else {
            let offset = crate::util::mean(&samples);
            tracing::info!(
                offset_ms = offset,
                samples = samples.len(),
                "clock offset estimated"
            );
            SyncResult {
                offset: ClockOffset::from_ms(offset),
                degraded: false,
                samples: samples.len(),
            }
        };
        self.state = SyncState::Ready(result);
        result
    }
}
