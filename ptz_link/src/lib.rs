pub mod error;
#[cfg(feature = "net")]
pub mod tcp;
pub mod util;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use ptz_traits::{Actuator, Axis, AxisCapability, AxisSettings, Link, TargetCapabilities};

use crate::error::LinkError;

/// In-memory link pair, the two ends of one duplex channel.
///
/// Frames sent on one end surface on the other in order. Dropping or closing
/// an end makes the peer's next use fail with `LinkError::Closed` once its
/// inbound queue drains.
pub struct LoopbackLink {
    tx: Option<Sender<String>>,
    rx: Option<Receiver<String>>,
}

impl LoopbackLink {
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Self {
                tx: Some(a_tx),
                rx: Some(a_rx),
            },
            Self {
                tx: Some(b_tx),
                rx: Some(b_rx),
            },
        )
    }

    /// Hang up this end. The peer keeps draining already-queued frames.
    pub fn close(&mut self) {
        self.tx = None;
        self.rx = None;
    }
}

impl Link for LoopbackLink {
    fn send(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(Box::new(LinkError::Closed));
        };
        if tx.send(frame.to_owned()).is_err() {
            // peer dropped its receiver
            self.close();
            return Err(Box::new(LinkError::Closed));
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let Some(rx) = self.rx.as_ref() else {
            return Err(Box::new(LinkError::Closed));
        };
        match rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.close();
                Err(Box::new(LinkError::Closed))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

/// Adds a fixed one-way delay in each direction of a wrapped link, with
/// optional patterned frame loss.
///
/// Frames sit in an internal queue until their due time and move on the next
/// `send`/`poll` call, so a regularly ticked endpoint observes realistic
/// round-trip latency without any background thread.
pub struct DelayLink<L: Link> {
    inner: L,
    delay: Duration,
    drop_every: u32,
    out_seen: u32,
    in_seen: u32,
    inbox: VecDeque<(Instant, String)>,
    outbox: VecDeque<(Instant, String)>,
}

impl<L: Link> DelayLink<L> {
    pub fn new(inner: L, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            drop_every: 0,
            out_seen: 0,
            in_seen: 0,
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Silently drop every `n`th frame in each direction; 0 restores
    /// lossless delivery. The pattern is deterministic so tests asserting
    /// on the surviving frames stay exact.
    pub fn drop_every(mut self, n: u32) -> Self {
        self.drop_every = n;
        self
    }

    fn pump_out(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Instant::now();
        while self.outbox.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, frame)) = self.outbox.pop_front() {
                self.inner.send(&frame)?;
            }
        }
        Ok(())
    }

    fn lost(counter: &mut u32, drop_every: u32) -> bool {
        *counter = counter.wrapping_add(1);
        drop_every > 0 && *counter % drop_every == 0
    }
}

impl<L: Link> Link for DelayLink<L> {
    fn send(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.inner.is_open() {
            return Err(Box::new(LinkError::Closed));
        }
        if Self::lost(&mut self.out_seen, self.drop_every) {
            tracing::debug!(n = self.out_seen, "outbound frame lost to pattern");
            return Ok(());
        }
        self.outbox
            .push_back((Instant::now() + self.delay, frame.to_owned()));
        self.pump_out()
    }

    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        self.pump_out()?;
        while let Some(frame) = self.inner.poll()? {
            if Self::lost(&mut self.in_seen, self.drop_every) {
                tracing::debug!(n = self.in_seen, "inbound frame lost to pattern");
                continue;
            }
            self.inbox.push_back((Instant::now() + self.delay, frame));
        }
        let now = Instant::now();
        if self.inbox.front().is_some_and(|(due, _)| *due <= now) {
            return Ok(self.inbox.pop_front().map(|(_, frame)| frame));
        }
        Ok(None)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

/// Simulated PTZ head.
///
/// Axis values move toward the applied setpoint by a fixed amount per
/// `settings()` poll, so convergence behavior is deterministic in tests.
pub struct SimulatedCamera {
    caps: TargetCapabilities,
    position: AxisSettings,
    target: AxisSettings,
    slew: AxisSettings,
    alive: bool,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        let mut caps = TargetCapabilities::default();
        caps.set_axis(
            Axis::Pan,
            AxisCapability::new(-50_000.0, 50_000.0, Some(3_600.0)),
        );
        caps.set_axis(
            Axis::Tilt,
            AxisCapability::new(-40_000.0, 40_000.0, Some(3_600.0)),
        );
        caps.set_axis(Axis::Zoom, AxisCapability::new(1.0, 5.0, None));

        let mut position = AxisSettings::default();
        for axis in Axis::ALL {
            if let Some(cap) = caps.axis(axis) {
                position.set_axis(axis, cap.midpoint());
            }
        }
        let mut slew = AxisSettings::default();
        slew.set_axis(Axis::Pan, 2_000.0);
        slew.set_axis(Axis::Tilt, 2_000.0);
        slew.set_axis(Axis::Zoom, 0.2);

        Self {
            caps,
            position,
            target: position,
            slew,
            alive: true,
        }
    }

    /// Override the per-poll slew rate of one axis.
    pub fn with_slew(mut self, axis: Axis, units_per_poll: f64) -> Self {
        self.slew.set_axis(axis, units_per_poll);
        self
    }

    /// Current simulated position of one axis.
    pub fn position(&self, axis: Axis) -> f64 {
        self.position.axis(axis)
    }

    /// Make subsequent telemetry reads fail, as if the device went away.
    pub fn unplug(&mut self) {
        self.alive = false;
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for SimulatedCamera {
    fn capabilities(&self) -> TargetCapabilities {
        self.caps.clone()
    }

    fn settings(&mut self) -> Result<AxisSettings, Box<dyn std::error::Error + Send + Sync>> {
        if !self.alive {
            return Err(Box::new(LinkError::Device("telemetry lost".into())));
        }
        for axis in Axis::ALL {
            let cur = self.position.axis(axis);
            let want = self.target.axis(axis);
            let step = self.slew.axis(axis);
            let next = if (want - cur).abs() <= step {
                want
            } else {
                cur + step.copysign(want - cur)
            };
            self.position.set_axis(axis, next);
        }
        Ok(self.position)
    }

    fn apply(
        &mut self,
        axis: Axis,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.alive {
            return Err(Box::new(LinkError::Device("apply rejected".into())));
        }
        tracing::debug!(%axis, value, "apply (simulated)");
        self.target.set_axis(axis, value);
        Ok(())
    }
}
