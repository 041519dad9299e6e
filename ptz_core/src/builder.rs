//! Type-state builder for `Console` and generic `build_console` constructor.
//!
//! The builder enforces at compile time that a link is provided before
//! `build()` is available. `try_build()` is always available for dynamic
//! checks.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

use ptz_traits::clock::{Clock, MonotonicClock};
use ptz_traits::{Axis, Link, TargetCapabilities};

use crate::clocksync::{ClockOffset, ClockSync, LocalMs};
use crate::config::ConsoleCfg;
use crate::console::{ConsoleCore, ConsoleEvent};
use crate::dispatch::{CommandId, Dispatcher};
use crate::error::{BuildError, Result};
use crate::eval::{Row, SessionLog};
use crate::intent::OrientationIntent;
use crate::track::{Frame, Tracker};

// ── Boxed console wrapper ────────────────────────────────────────────────────

/// Public dynamic (boxed) console that hides the link type via composition.
pub struct Console {
    pub(crate) inner: ConsoleCore<Box<dyn Link>>,
}

impl core::fmt::Debug for Console {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Console")
            .field("targets", &self.inner.caps.len())
            .field("tracking", &self.inner.tracker.is_tracking())
            .field("recording", &self.inner.log.is_recording())
            .finish()
    }
}

impl Console {
    /// Start building a Console.
    pub fn builder() -> ConsoleBuilder<Missing> {
        ConsoleBuilder::default()
    }

    /// One scheduler iteration.
    pub fn tick(&mut self) -> Result<()> {
        self.inner.tick()
    }

    /// Next queued event, oldest first.
    pub fn poll_event(&mut self) -> Option<ConsoleEvent> {
        self.inner.poll_event()
    }

    pub fn link_open(&self) -> bool {
        self.inner.link_open()
    }

    /// The current clock-offset estimate, once a run has completed.
    pub fn offset(&self) -> Option<ClockOffset> {
        self.inner.offset()
    }

    /// Discard the current estimate and start a fresh sampling run.
    pub fn resync(&mut self) -> Result<()> {
        self.inner.resync()
    }

    pub fn targets(&self) -> Vec<&str> {
        self.inner.targets()
    }

    pub fn capabilities(&self, target: &str) -> Option<&TargetCapabilities> {
        self.inner.capabilities(target)
    }

    /// Position an axis; tracked automatically while recording.
    pub fn set_axis(&mut self, target: &str, axis: Axis, value: f64) -> Result<()> {
        self.inner.set_axis(target, axis, value)
    }

    /// Position an axis and demand an acknowledgement.
    pub fn set_axis_tracked(&mut self, target: &str, axis: Axis, value: f64) -> Result<CommandId> {
        self.inner.set_axis_tracked(target, axis, value)
    }

    /// Position an axis and measure gesture-to-settled latency.
    pub fn set_axis_measured(
        &mut self,
        target: &str,
        axis: Axis,
        value: f64,
        mouse_timestamp: LocalMs,
    ) -> Result<()> {
        self.inner.set_axis_measured(target, axis, value, mouse_timestamp)
    }

    /// Move an axis by whole capability-derived steps.
    pub fn nudge_axis(&mut self, target: &str, axis: Axis, steps: i32) -> Result<()> {
        self.inner.nudge_axis(target, axis, steps)
    }

    /// Feed one head-orientation sample.
    pub fn on_orientation(&mut self, target: &str, yaw_deg: f64, pitch_deg: f64) -> Result<()> {
        self.inner.on_orientation(target, yaw_deg, pitch_deg)
    }

    /// Begin visual tracking against a discovered target.
    pub fn start_tracking(&mut self, target: &str) -> Result<()> {
        self.inner.start_tracking(target)
    }

    pub fn stop_tracking(&mut self) {
        self.inner.stop_tracking();
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.is_tracking()
    }

    pub fn tracking_target(&self) -> Option<&str> {
        self.inner.tracking_target()
    }

    /// Feed one video frame to the tracker.
    pub fn feed_frame(&mut self, frame: &Frame) -> Result<()> {
        self.inner.feed_frame(frame)
    }

    /// Open a measurement session.
    pub fn start_recording(&mut self) {
        self.inner.start_recording();
    }

    /// Stop the session; `export` unlocks after the grace period.
    pub fn stop_recording(&mut self) {
        self.inner.stop_recording();
    }

    pub fn is_recording(&self) -> bool {
        self.inner.is_recording()
    }

    /// All rows of the closed measurement session.
    pub fn export(&self) -> Result<&[Row]> {
        self.inner.export()
    }
}

// ── Builder type states ──────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Console`. All fields are validated on `build()`.
pub struct ConsoleBuilder<Lk> {
    link: Option<Box<dyn Link>>,
    cfg: Option<ConsoleCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _l: PhantomData<Lk>,
}

impl Default for ConsoleBuilder<Missing> {
    fn default() -> Self {
        Self {
            link: None,
            cfg: None,
            clock: None,
            _l: PhantomData,
        }
    }
}

/// Validate configuration and construct a `ConsoleCore`.
///
/// Both `ConsoleBuilder::try_build()` and `build_console()` funnel through
/// here, so every console sees the same range checks.
fn validate_and_build<L: Link>(
    link: L,
    cfg: ConsoleCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ConsoleCore<L>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if cfg.sync.samples == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sync samples must be >= 1",
        )));
    }
    if cfg.sync.window_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sync window must be >= 1 ms",
        )));
    }
    if cfg.sync.ping_gap_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "ping gap must be >= 1 ms",
        )));
    }
    if cfg.dispatch.pending_cap == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pending cap must be >= 1",
        )));
    }
    if cfg.dispatch.pending_ttl_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pending ttl must be >= 1 ms",
        )));
    }
    if cfg.track.frame_stride == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "frame stride must be >= 1",
        )));
    }
    if cfg.track.log_every == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "tracking log cadence must be >= 1",
        )));
    }
    if !(cfg.track.integral_clamp.is_finite() && cfg.track.integral_clamp > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "integral clamp must be positive and finite",
        )));
    }
    for gains in [cfg.track.pan, cfg.track.tilt] {
        if !(gains.kp.is_finite() && gains.ki.is_finite() && gains.kd.is_finite()) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "controller gains must be finite",
            )));
        }
    }
    if cfg.eval.flush_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "flush cadence must be >= 1 ms",
        )));
    }
    if !cfg.intent.units_per_degree.is_finite() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "units per degree must be finite",
        )));
    }
    if !(cfg.intent.degree_threshold.is_finite() && cfg.intent.degree_threshold >= 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "degree threshold must be >= 0",
        )));
    }
    for divisor in [
        cfg.intent.pan_divisor,
        cfg.intent.tilt_divisor,
        cfg.intent.zoom_divisor,
    ] {
        if !(divisor.is_finite() && divisor > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "step divisors must be > 0",
            )));
        }
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(ConsoleCore {
        sync: ClockSync::new(cfg.sync.clone()),
        dispatcher: Dispatcher::new(cfg.dispatch.clone()),
        tracker: Tracker::new(cfg.track.clone()),
        intent: OrientationIntent::new(cfg.intent.clone()),
        log: SessionLog::new(cfg.eval.clone()),
        link,
        clock,
        cfg,
        caps: BTreeMap::new(),
        last_commanded: HashMap::new(),
        measured: HashMap::new(),
        events: VecDeque::new(),
        was_open: false,
    })
}

impl<Lk> ConsoleBuilder<Lk> {
    /// Fallible build available in any type-state; returns a detailed error
    /// for missing pieces.
    pub fn try_build(self) -> Result<Console> {
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let inner = validate_and_build(link, self.cfg.unwrap_or_default(), self.clock)?;
        Ok(Console { inner })
    }

    pub fn with_cfg(mut self, cfg: ConsoleCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`
    /// when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setter that advances type-state when providing the mandatory link
impl ConsoleBuilder<Missing> {
    pub fn with_link(self, link: impl Link + 'static) -> ConsoleBuilder<Set> {
        ConsoleBuilder {
            link: Some(Box::new(link)),
            cfg: self.cfg,
            clock: self.clock,
            _l: PhantomData,
        }
    }
}

impl ConsoleBuilder<Set> {
    /// Validate and build the Console. Only available once a link is set.
    pub fn build(self) -> Result<Console> {
        self.try_build()
    }
}

/// Statically-dispatched console for callers with a concrete link type.
pub type ConsoleG<L> = ConsoleCore<L>;

/// Build a generic, statically-dispatched console from a concrete link.
pub fn build_console<L>(
    link: L,
    cfg: ConsoleCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ConsoleG<L>>
where
    L: Link,
{
    validate_and_build(link, cfg, clock)
}
