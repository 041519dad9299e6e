//! Scripted sessions against a simulated camera: rig assembly, phase
//! pumping, and report building.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ptz_core::error::{ControlError, Result as CoreResult};
use ptz_core::{
    CameraAgent, CameraCfg, ConsoleCfg, ConsoleEvent, ConsoleG, Detection, Frame, LocalMs, Row,
    build_console,
};
use ptz_link::{DelayLink, LoopbackLink, SimulatedCamera};
use ptz_traits::Axis;
use ptz_traits::clock::{Clock, MonotonicClock};

use crate::cli::{CliTiming, LAST_TIMING};

const DEMO_TARGET: &str = "camera-1";

const DISCOVER_DEADLINE: Duration = Duration::from_secs(5);
const SYNC_DEADLINE: Duration = Duration::from_secs(10);
const ACK_DEADLINE: Duration = Duration::from_secs(10);
const SETTLE_DEADLINE: Duration = Duration::from_secs(10);

pub fn control_error_name(e: &ControlError) -> &'static str {
    use ptz_core::error::ControlError::*;
    match e {
        LinkClosed => "LinkClosed",
        Link(_) => "Link",
        Protocol(_) => "Protocol",
        Actuator(_) => "Actuator",
        Tracking(_) => "Tracking",
        State(_) => "State",
        Config(_) => "Config",
    }
}

/// Everything a finished demo run can report about itself.
#[derive(Debug, Clone, Copy)]
pub struct DemoReport {
    pub offset_ms: Option<f64>,
    pub degraded: bool,
    pub acks: usize,
    pub timeouts: usize,
    pub mean_ack_ms: Option<f64>,
    pub settles: usize,
    pub mean_settle_ms: Option<f64>,
    pub corrections: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub offset_ms: f64,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct SelfCheckReport {
    pub target: String,
    pub offset_ms: Option<f64>,
}

/// Console and camera agent joined back-to-back over an in-process link.
struct Rig {
    console: ConsoleG<DelayLink<LoopbackLink>>,
    agent: CameraAgent<SimulatedCamera, LoopbackLink>,
    events: Vec<ConsoleEvent>,
}

impl Rig {
    fn new(cfg: &ptz_config::Config, latency_ms: u64) -> CoreResult<Self> {
        let (near, far) = LoopbackLink::pair();
        let console_cfg: ConsoleCfg = cfg.into();
        let camera_cfg: CameraCfg = cfg.into();
        let console = build_console(
            DelayLink::new(near, Duration::from_millis(latency_ms)),
            console_cfg,
            None,
        )?;
        let agent = CameraAgent::new(
            DEMO_TARGET,
            SimulatedCamera::new(),
            far,
            camera_cfg,
            Arc::new(MonotonicClock::new()),
        );
        Ok(Self {
            console,
            agent,
            events: Vec::new(),
        })
    }

    /// One tick of both ends, draining console events into the record.
    fn step(&mut self) -> CoreResult<()> {
        self.console.tick()?;
        self.agent.tick()?;
        while let Some(event) = self.console.poll_event() {
            self.events.push(event);
        }
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    /// Tick both ends until an event satisfies `done`, returning that event.
    fn pump<F>(
        &mut self,
        phase: &'static str,
        deadline: Duration,
        shutdown: &AtomicBool,
        mut done: F,
    ) -> CoreResult<ConsoleEvent>
    where
        F: FnMut(&ConsoleEvent) -> bool,
    {
        let start = Instant::now();
        loop {
            if shutdown.load(Ordering::Relaxed) {
                self.console.stop_tracking();
                return Err(ControlError::State("interrupted by signal".into()).into());
            }
            self.console.tick()?;
            self.agent.tick()?;
            let mut matched = None;
            while let Some(event) = self.console.poll_event() {
                if matched.is_none() && done(&event) {
                    matched = Some(event.clone());
                }
                self.events.push(event);
            }
            if let Some(event) = matched {
                return Ok(event);
            }
            if start.elapsed() > deadline {
                return Err(ControlError::State(format!(
                    "{phase} timed out after {} ms",
                    deadline.as_millis()
                ))
                .into());
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Tick both ends for a fixed span, still collecting events.
    fn run_for(&mut self, span: Duration, shutdown: &AtomicBool) -> CoreResult<()> {
        let start = Instant::now();
        while start.elapsed() < span {
            if shutdown.load(Ordering::Relaxed) {
                return Err(ControlError::State("interrupted by signal".into()).into());
            }
            self.step()?;
        }
        Ok(())
    }

    fn report(&self) -> CoreResult<DemoReport> {
        let rows = self.console.export()?;
        let mut offset_ms = None;
        let mut degraded = false;
        let mut ack_lat = Vec::new();
        let mut timeouts = 0usize;
        let mut settle_lat = Vec::new();
        for event in &self.events {
            match event {
                ConsoleEvent::SyncReady {
                    offset_ms: o,
                    degraded: d,
                } => {
                    offset_ms = Some(*o);
                    degraded = *d;
                }
                ConsoleEvent::Acked {
                    latency_ms,
                    timed_out,
                    ..
                } => {
                    if *timed_out {
                        timeouts += 1;
                    } else {
                        ack_lat.push(*latency_ms);
                    }
                }
                ConsoleEvent::Settled { latency_ms, .. } => settle_lat.push(*latency_ms),
                _ => {}
            }
        }
        let corrections = rows
            .iter()
            .filter(|row| matches!(row, Row::Track(_)))
            .count();
        Ok(DemoReport {
            offset_ms,
            degraded,
            acks: ack_lat.len(),
            timeouts,
            mean_ack_ms: mean_of(&ack_lat),
            settles: settle_lat.len(),
            mean_settle_ms: mean_of(&settle_lat),
            corrections,
            rows: rows.len(),
        })
    }
}

/// Full scripted session: sync, an untracked drag burst, an orientation
/// stream, one tracked move, one measured move, an optional tracking burst,
/// then the exported session rolled into a report (and a CSV when asked).
pub fn run_demo(
    cfg: &ptz_config::Config,
    latency_ms: u64,
    with_tracking: bool,
    out: Option<&Path>,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<DemoReport> {
    let _ = LAST_TIMING.set(CliTiming {
        pending_ttl_ms: cfg.dispatch.pending_ttl_ms,
        confirm_timeout_ms: cfg.confirm.timeout_ms,
        stop_grace_ms: cfg.eval.stop_grace_ms,
    });

    let mut rig = Rig::new(cfg, latency_ms)?;
    let wall = MonotonicClock::new();
    tracing::info!(latency_ms, with_tracking, "demo start");

    let discovered = rig.pump("target discovery", DISCOVER_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::TargetDiscovered { .. })
    })?;
    let ConsoleEvent::TargetDiscovered { target } = discovered else {
        return Err(ControlError::State("discovery finished without a target".into()).into());
    };
    rig.pump("clock sync", SYNC_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::SyncReady { .. })
    })?;

    // Untracked drag burst: the apply gate coalesces these, only the newest
    // value per window reaches the actuator.
    for value in [6_000.0, 7_500.0, 9_000.0, 10_500.0] {
        rig.console.set_axis(&target, Axis::Pan, value)?;
        rig.step()?;
    }

    // Orientation stream: the first sample primes the reference, later ones
    // emit relative moves once past the threshold and rate floor.
    rig.console.on_orientation(&target, 0.0, 0.0)?;
    for (yaw, pitch) in [(2.0, -1.5), (4.0, -3.0)] {
        rig.run_for(
            Duration::from_millis(cfg.intent.min_interval_ms + 20),
            &shutdown,
        )?;
        rig.console.on_orientation(&target, yaw, pitch)?;
    }

    rig.console.start_recording();

    // One tracked move; the ack latency covers transport plus convergence.
    let id = rig.console.set_axis_tracked(&target, Axis::Pan, 20_000.0)?;
    rig.pump("pan acknowledgement", ACK_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::Acked { id: got, .. } if *got == id)
    })?;

    // One measured move; the settle latency is corrected through the offset.
    rig.console
        .set_axis_measured(&target, Axis::Tilt, 4_000.0, LocalMs(wall.epoch_ms()))?;
    rig.pump("tilt settle", SETTLE_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::Settled { .. })
    })?;

    if with_tracking {
        let acks_before = count_acks(&rig.events);
        rig.console.start_tracking(&target)?;
        for index in 0..8 {
            rig.console.feed_frame(&drift_frame(index, wall.epoch_ms()))?;
            rig.step()?;
        }
        rig.console.stop_tracking();
        // correction acks may already have landed during the burst
        let mut acks = count_acks(&rig.events) - acks_before;
        if acks < 2 {
            rig.pump(
                "correction acknowledgements",
                ACK_DEADLINE,
                &shutdown,
                |e| {
                    if matches!(e, ConsoleEvent::Acked { .. }) {
                        acks += 1;
                    }
                    acks >= 2
                },
            )?;
        }
    }

    rig.console.stop_recording();
    rig.run_for(
        Duration::from_millis(cfg.eval.stop_grace_ms + 200),
        &shutdown,
    )?;

    let report = rig.report()?;
    if let Some(path) = out {
        write_session_csv(path, rig.console.export()?)?;
        tracing::info!(path = %path.display(), rows = report.rows, "session CSV written");
    }
    tracing::info!(
        acks = report.acks,
        settles = report.settles,
        rows = report.rows,
        "demo complete"
    );
    Ok(report)
}

/// Run only the clock-offset estimation and return its outcome.
pub fn run_sync(
    cfg: &ptz_config::Config,
    latency_ms: u64,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<SyncReport> {
    let mut rig = Rig::new(cfg, latency_ms)?;
    tracing::info!(latency_ms, "sync check start");
    let event = rig.pump("clock sync", SYNC_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::SyncReady { .. })
    })?;
    let ConsoleEvent::SyncReady { offset_ms, degraded } = event else {
        return Err(ControlError::State("sync finished without a result".into()).into());
    };
    Ok(SyncReport { offset_ms, degraded })
}

/// Discovery, sync, and one command round trip over a zero-delay link.
pub fn run_self_check(
    cfg: &ptz_config::Config,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<SelfCheckReport> {
    let mut rig = Rig::new(cfg, 0)?;
    let discovered = rig.pump("target discovery", DISCOVER_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::TargetDiscovered { .. })
    })?;
    let ConsoleEvent::TargetDiscovered { target } = discovered else {
        return Err(ControlError::State("discovery finished without a target".into()).into());
    };
    rig.pump("clock sync", SYNC_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::SyncReady { .. })
    })?;
    // one full round trip through the gate and confirmation machinery
    let id = rig.console.set_axis_tracked(&target, Axis::Zoom, 2.0)?;
    rig.pump("zoom acknowledgement", ACK_DEADLINE, &shutdown, |e| {
        matches!(e, ConsoleEvent::Acked { id: got, timed_out: false, .. } if *got == id)
    })?;
    Ok(SelfCheckReport {
        target,
        offset_ms: rig.console.offset().map(|o| o.ms()),
    })
}

/// Synthetic 1280x720 frame whose marker starts right of center and creeps
/// further out, the way a walking subject leaves the framing.
fn drift_frame(index: usize, at_ms: f64) -> Frame {
    let cx = 760.0 + 40.0 * index as f64;
    let cy = 300.0;
    Frame {
        timestamp_ms: at_ms,
        width: 1_280.0,
        height: 720.0,
        detection: Some(Detection {
            corners: [
                (cx - 6.0, cy - 6.0),
                (cx + 6.0, cy - 6.0),
                (cx + 6.0, cy + 6.0),
                (cx - 6.0, cy + 6.0),
            ],
        }),
    }
}

/// Flat CSV over all row kinds: one superset header named after the record
/// fields, blank cells where a field does not apply, floats at 3 decimals.
pub fn write_session_csv(path: &Path, rows: &[Row]) -> CoreResult<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| eyre::eyre!("create session CSV {:?}: {}", path, e))?;
    writer
        .write_record([
            "kind",
            "target",
            "axis",
            "id",
            "value",
            "target_value",
            "sent_at_ms",
            "latency_ms",
            "timed_out",
            "mouse_timestamp_ms",
            "movement_end_ms",
            "corrected_end_ms",
            "error_x",
            "error_y",
            "pan",
            "tilt",
            "at_ms",
        ])
        .map_err(|e| eyre::eyre!("write CSV header: {}", e))?;
    let blank = String::new;
    for row in rows {
        let record: [String; 17] = match row {
            Row::Latency(r) => [
                "latency".into(),
                r.target.clone(),
                r.axis.to_string(),
                r.id.clone(),
                num3(r.value),
                blank(),
                num3(r.sent_at_ms),
                num3(r.latency_ms),
                r.timed_out.to_string(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
            ],
            Row::Settle(r) => [
                "settle".into(),
                r.target.clone(),
                r.axis.to_string(),
                blank(),
                blank(),
                num3(r.target_value),
                blank(),
                num3(r.latency_ms),
                blank(),
                num3(r.mouse_timestamp_ms),
                num3(r.movement_end_ms),
                num3(r.corrected_end_ms),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
            ],
            Row::Track(r) => [
                "track".into(),
                r.target.clone(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                blank(),
                num3(r.error_x),
                num3(r.error_y),
                num3(r.pan),
                num3(r.tilt),
                num3(r.at_ms),
            ],
            Row::NotDetected(r) => {
                let mut record: [String; 17] = Default::default();
                record[0] = "not_detected".into();
                record[1] = r.target.clone();
                record[16] = num3(r.at_ms);
                record
            }
        };
        writer
            .write_record(&record)
            .map_err(|e| eyre::eyre!("write CSV row: {}", e))?;
    }
    writer
        .flush()
        .map_err(|e| eyre::eyre!("flush session CSV {:?}: {}", path, e))?;
    Ok(())
}

fn num3(v: f64) -> String {
    format!("{v:.3}")
}

fn count_acks(events: &[ConsoleEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ConsoleEvent::Acked { .. }))
        .count()
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
