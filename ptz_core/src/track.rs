//! Closed-loop visual tracking.
//!
//! The tracker turns marker detections into pan/tilt correction deltas. It
//! is a pure state machine: the caller feeds frames in and wires the
//! resulting [`Correction`] into the dispatcher, so the same loop drives a
//! live link or a scripted test. Per-axis PID with an anti-windup clamp on
//! the integral term; gain signs encode the mount's image-to-axis polarity.

use crate::config::{PidGains, TrackCfg};
use crate::util::centroid;

/// One detected marker, as the four corner points in image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub corners: [(f64, f64); 4],
}

/// One camera frame presented to the tracker.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Capture time in milliseconds on the local clock.
    pub timestamp_ms: f64,
    pub width: f64,
    pub height: f64,
    pub detection: Option<Detection>,
}

/// Correction deltas for one processed frame, in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub pan: f64,
    pub tilt: f64,
    /// Normalized image error that produced the deltas, for logging.
    pub error_x: f64,
    pub error_y: f64,
}

/// Outcome of feeding one frame to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackStep {
    /// Stopped, frame skipped by the stride, or an unusable frame.
    Idle,
    /// Processed cycle without a usable marker; controller state holds.
    NotDetected,
    /// Processed cycle that produced correction deltas to dispatch.
    Corrected(Correction),
}

#[derive(Debug, Default)]
struct PidState {
    integral: f64,
    prev_error: Option<f64>,
}

impl PidState {
    /// One controller step. `dt` is None on the first processed frame, where
    /// only the proportional term contributes.
    fn step(&mut self, gains: &PidGains, error: f64, dt: Option<f64>, clamp: f64) -> f64 {
        let mut derivative = 0.0;
        if let Some(dt) = dt {
            self.integral = (self.integral + error * dt).clamp(-clamp, clamp);
            if let Some(prev) = self.prev_error {
                derivative = (error - prev) / dt;
            }
        }
        self.prev_error = Some(error);
        gains.kp * error + gains.ki * self.integral + gains.kd * derivative
    }
}

#[derive(Debug)]
struct Session {
    target: String,
    frames_seen: u64,
    processed: u64,
    prev_ts: Option<f64>,
    pan: PidState,
    tilt: PidState,
}

/// Visual feedback controller, Stopped until started against a target.
#[derive(Debug)]
pub struct Tracker {
    cfg: TrackCfg,
    session: Option<Session>,
}

impl Tracker {
    pub fn new(cfg: TrackCfg) -> Self {
        Self { cfg, session: None }
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    pub fn target(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.target.as_str())
    }

    /// Begin tracking. Starting while already tracking resets the controller
    /// state against the new target.
    pub fn start(&mut self, target: &str) {
        if let Some(old) = &self.session {
            tracing::info!(from = %old.target, to = target, "tracking retargeted");
        } else {
            tracing::info!(target, "tracking started");
        }
        self.session = Some(Session {
            target: target.to_string(),
            frames_seen: 0,
            processed: 0,
            prev_ts: None,
            pan: PidState::default(),
            tilt: PidState::default(),
        });
    }

    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            tracing::info!("tracking stopped");
        }
    }

    /// Stop immediately after a downstream fault; the axes hold their last
    /// commanded values.
    pub fn fail_safe(&mut self, reason: &str) {
        if self.session.take().is_some() {
            tracing::warn!(reason, "tracking stopped after fault");
        }
    }

    /// Feed one frame. Every `frame_stride`th frame is processed; a processed
    /// frame yields either a correction or a not-detected marker, so the
    /// caller can keep the evaluation stream continuous through misses.
    pub fn on_frame(&mut self, frame: &Frame) -> TrackStep {
        let cfg = &self.cfg;
        let Some(session) = self.session.as_mut() else {
            return TrackStep::Idle;
        };
        session.frames_seen += 1;
        if session.frames_seen % u64::from(cfg.frame_stride.max(1)) != 0 {
            return TrackStep::Idle;
        }
        if frame.width <= 0.0 || frame.height <= 0.0 {
            tracing::warn!(frame.width, frame.height, "frame with degenerate dimensions skipped");
            return TrackStep::Idle;
        }
        let Some(detection) = &frame.detection else {
            tracing::debug!(target = %session.target, "marker not detected");
            return TrackStep::NotDetected;
        };

        let dt = match session.prev_ts {
            Some(prev) => {
                let dt = (frame.timestamp_ms - prev) / 1_000.0;
                if dt <= 0.0 {
                    tracing::debug!(dt, "non-advancing frame timestamp skipped");
                    return TrackStep::Idle;
                }
                Some(dt)
            }
            None => None,
        };
        session.prev_ts = Some(frame.timestamp_ms);

        let (cx, cy) = centroid(&detection.corners);
        let error_x = (cx - frame.width / 2.0) / frame.width;
        let error_y = (cy - frame.height / 2.0) / frame.height;

        let pan = session
            .pan
            .step(&cfg.pan, error_x, dt, cfg.integral_clamp);
        let tilt = session
            .tilt
            .step(&cfg.tilt, error_y, dt, cfg.integral_clamp);

        session.processed += 1;
        if session.processed % u64::from(cfg.log_every.max(1)) == 0 {
            tracing::info!(
                target = %session.target,
                error_x,
                error_y,
                pan,
                tilt,
                "tracking correction"
            );
        }
        TrackStep::Corrected(Correction {
            pan,
            tilt,
            error_x,
            error_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_at(cx: f64, cy: f64) -> Detection {
        Detection {
            corners: [
                (cx - 5.0, cy - 5.0),
                (cx + 5.0, cy - 5.0),
                (cx + 5.0, cy + 5.0),
                (cx - 5.0, cy + 5.0),
            ],
        }
    }

    fn frame(ts: f64, detection: Option<Detection>) -> Frame {
        Frame {
            timestamp_ms: ts,
            width: 640.0,
            height: 480.0,
            detection,
        }
    }

    fn correction(step: TrackStep) -> Correction {
        match step {
            TrackStep::Corrected(c) => c,
            other => panic!("expected a correction, got {other:?}"),
        }
    }

    #[test]
    fn stopped_tracker_ignores_frames() {
        let mut tracker = Tracker::new(TrackCfg::default());
        assert_eq!(
            tracker.on_frame(&frame(0.0, Some(square_at(320.0, 240.0)))),
            TrackStep::Idle
        );
    }

    #[test]
    fn only_every_nth_frame_is_processed() {
        let mut tracker = Tracker::new(TrackCfg::default());
        tracker.start("camera-1");
        let mut corrections = 0;
        for i in 0..8 {
            let f = frame(i as f64 * 33.0, Some(square_at(400.0, 240.0)));
            if matches!(tracker.on_frame(&f), TrackStep::Corrected(_)) {
                corrections += 1;
            }
        }
        assert_eq!(corrections, 2);
    }

    #[test]
    fn centered_marker_yields_zero_correction() {
        let cfg = TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let c = correction(tracker.on_frame(&frame(0.0, Some(square_at(320.0, 240.0)))));
        assert_eq!(c.pan, 0.0);
        assert_eq!(c.tilt, 0.0);
    }

    #[test]
    fn marker_right_of_center_pans_positive() {
        let cfg = TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let c = correction(tracker.on_frame(&frame(0.0, Some(square_at(480.0, 240.0)))));
        // quarter-frame error to the right
        assert!((c.error_x - 0.25).abs() < 1e-12);
        assert_eq!(c.pan, 84_000.0 * 0.25);
        assert_eq!(c.tilt, 0.0);
    }

    #[test]
    fn marker_below_center_tilts_negative() {
        let cfg = TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let c = correction(tracker.on_frame(&frame(0.0, Some(square_at(320.0, 360.0)))));
        assert!((c.error_y - 0.25).abs() < 1e-12);
        assert!(c.tilt < 0.0);
    }

    #[test]
    fn non_advancing_timestamp_is_skipped() {
        let cfg = TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let det = Some(square_at(400.0, 240.0));
        assert!(matches!(
            tracker.on_frame(&frame(100.0, det)),
            TrackStep::Corrected(_)
        ));
        assert_eq!(tracker.on_frame(&frame(100.0, det)), TrackStep::Idle);
        assert_eq!(tracker.on_frame(&frame(90.0, det)), TrackStep::Idle);
        assert!(matches!(
            tracker.on_frame(&frame(133.0, det)),
            TrackStep::Corrected(_)
        ));
    }

    #[test]
    fn integral_term_saturates_at_clamp() {
        let cfg = TrackCfg {
            frame_stride: 1,
            pan: PidGains::new(0.0, 10.0, 0.0),
            tilt: PidGains::new(0.0, 0.0, 0.0),
            integral_clamp: 1.0,
            log_every: 5,
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let det = Some(square_at(480.0, 240.0));
        let mut last = 0.0;
        for i in 0..50 {
            if let TrackStep::Corrected(c) = tracker.on_frame(&frame(i as f64 * 1_000.0, det)) {
                last = c.pan;
            }
        }
        // ki * clamped integral, regardless of how long the error persisted
        assert_eq!(last, 10.0);
    }

    #[test]
    fn missed_detection_reports_not_detected_and_holds_state() {
        let cfg = TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        };
        let mut tracker = Tracker::new(cfg);
        tracker.start("camera-1");
        let c = correction(tracker.on_frame(&frame(0.0, Some(square_at(480.0, 240.0)))));
        assert_eq!(tracker.on_frame(&frame(33.0, None)), TrackStep::NotDetected);
        // the next detection still produces a correction from held state
        let next = correction(tracker.on_frame(&frame(66.0, Some(square_at(480.0, 240.0)))));
        assert_eq!(next.error_x, c.error_x);
    }

    #[test]
    fn not_detected_only_while_a_session_is_live() {
        let mut tracker = Tracker::new(TrackCfg {
            frame_stride: 1,
            ..TrackCfg::default()
        });
        assert_eq!(tracker.on_frame(&frame(0.0, None)), TrackStep::Idle);
    }

    #[test]
    fn fail_safe_stops_tracking() {
        let mut tracker = Tracker::new(TrackCfg::default());
        tracker.start("camera-1");
        tracker.fail_safe("link closed");
        assert!(!tracker.is_tracking());
        assert_eq!(tracker.target(), None);
    }
}
