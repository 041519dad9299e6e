//! The actuator-side agent.
//!
//! One `CameraAgent` owns one actuator and one link back to the operator
//! console. Each `tick` drains inbound frames, flushes the apply gate,
//! advances confirmation and settle machines against live telemetry, and
//! sends whatever those machines produced. The agent never initiates
//! traffic beyond its capability announcement; everything else is a
//! response to operator frames.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;

use ptz_traits::clock::Clock;
use ptz_traits::{Actuator, Axis, Link};

use crate::config::{CameraCfg, SettleCfg};
use crate::confirm::{ConfirmEvent, ConfirmSession, SettleListener, SettleStep};
use crate::error::{Report, Result};
use crate::link_error::map_link_error;
use crate::message::Message;
use crate::throttle::{ApplyGate, GateDecision};

pub struct CameraAgent<A: Actuator, L: Link> {
    name: String,
    actuator: A,
    link: L,
    clock: Arc<dyn Clock + Send + Sync>,
    gate: ApplyGate,
    confirm: ConfirmSession,
    settle_cfg: SettleCfg,
    settles: HashMap<Axis, SettleListener>,
    announced: bool,
}

impl<A: Actuator, L: Link> core::fmt::Debug for CameraAgent<A, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CameraAgent")
            .field("name", &self.name)
            .field("announced", &self.announced)
            .field("pending_confirm", &self.confirm.pending_axes())
            .field("pending_settle", &self.settles.len())
            .finish()
    }
}

impl<A: Actuator, L: Link> CameraAgent<A, L> {
    pub fn new(
        name: impl Into<String>,
        actuator: A,
        link: L,
        cfg: CameraCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let caps = actuator.capabilities();
        Self {
            name: name.into(),
            actuator,
            link,
            clock,
            gate: ApplyGate::new(&cfg.throttle),
            confirm: ConfirmSession::new(cfg.confirm, caps),
            settle_cfg: cfg.settle,
            settles: HashMap::new(),
            announced: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_open(&self) -> bool {
        self.link.is_open()
    }

    /// One scheduler iteration: inbound frames, deferred applies, then the
    /// confirmation and settle machines.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();

        if !self.announced {
            self.announce()?;
            self.announced = true;
        }

        while let Some(frame) = self
            .link
            .poll()
            .map_err(|e| Report::new(map_link_error(&*e)))
            .wrap_err("polling link")?
        {
            self.handle_frame(frame, now)?;
        }

        for (axis, value) in self.gate.due(now) {
            self.apply_axis(axis, value);
        }

        let events = {
            let actuator = &mut self.actuator;
            self.confirm.tick(now, || match actuator.settings() {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(error = %e, "telemetry read failed");
                    None
                }
            })
        };
        for ConfirmEvent::Ack { id, axis, timed_out } in events {
            self.send(&Message::CommandAck {
                id,
                command: axis,
                timed_out,
            })?;
        }

        let epoch_now = self.clock.epoch_ms();
        let mut finished = Vec::new();
        {
            let actuator = &mut self.actuator;
            self.settles.retain(|axis, listener| {
                let step = listener.tick(now, || match actuator.settings() {
                    Ok(s) => Some(s.axis(*axis)),
                    Err(e) => {
                        tracing::debug!(error = %e, "telemetry read failed during settle watch");
                        None
                    }
                });
                match step {
                    SettleStep::Pending => true,
                    SettleStep::Finished {
                        target_value,
                        mouse_timestamp,
                    } => {
                        finished.push(Message::MovementFinished {
                            command: *axis,
                            target_value,
                            mouse_timestamp,
                            movement_end_time: epoch_now,
                        });
                        false
                    }
                    SettleStep::TimedOut | SettleStep::Lost => false,
                }
            });
        }
        for message in finished {
            self.send(&message)?;
        }

        Ok(())
    }

    fn announce(&mut self) -> Result<()> {
        let mut data = BTreeMap::new();
        data.insert(self.name.clone(), self.actuator.capabilities());
        tracing::info!(target = %self.name, "announcing capabilities");
        self.send(&Message::Capabilities { data })
    }

    fn handle_frame(&mut self, frame: String, now: Instant) -> Result<()> {
        let message = match Message::parse(&frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame dropped");
                return Ok(());
            }
        };
        match message {
            Message::Ping { t1 } => {
                let t2 = self.clock.epoch_ms();
                self.send(&Message::Pong { t1, t2 })
            }
            Message::Command {
                target,
                command,
                value,
                id,
                mouse_timestamp,
            } => {
                if target != self.name {
                    tracing::trace!(%target, "command addressed elsewhere");
                    return Ok(());
                }
                if !value.is_finite() {
                    tracing::warn!(axis = %command, value, "non-finite command value dropped");
                    return Ok(());
                }
                if let Some(id) = id {
                    self.confirm.begin_axis(command, value, id, now);
                } else if let Some(ts) = mouse_timestamp {
                    self.settles.insert(
                        command,
                        SettleListener::new(self.settle_cfg.clone(), value, ts, now),
                    );
                }
                match self.gate.offer(command, value, now) {
                    GateDecision::Apply(v) => self.apply_axis(command, v),
                    GateDecision::Deferred => {
                        tracing::trace!(axis = %command, "apply deferred by rate gate");
                    }
                }
                Ok(())
            }
            other => {
                tracing::debug!(frame = ?other, "frame ignored on camera side");
                Ok(())
            }
        }
    }

    /// Best-effort hardware write; a failed apply drops the command and the
    /// confirmation machinery resolves it through its timeout.
    fn apply_axis(&mut self, axis: Axis, value: f64) {
        if let Err(e) = self.actuator.apply(axis, value) {
            tracing::warn!(axis = %axis, value, error = %e, "apply failed; command dropped");
        }
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.encode()?;
        self.link
            .send(&frame)
            .map_err(|e| Report::new(map_link_error(&*e)))
            .wrap_err("sending frame")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptz_traits::clock::test_clock::TestClock;
    use ptz_traits::{AxisCapability, AxisSettings, TargetCapabilities};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::result::Result;

    #[derive(Default)]
    struct LinkInner {
        inbox: VecDeque<String>,
        sent: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct ScriptLink(Rc<RefCell<LinkInner>>);

    impl ScriptLink {
        fn push_inbound(&self, message: &Message) {
            self.0
                .borrow_mut()
                .inbox
                .push_back(message.encode().unwrap());
        }

        fn sent(&self) -> Vec<Message> {
            self.0
                .borrow()
                .sent
                .iter()
                .map(|f| Message::parse(f).unwrap())
                .collect()
        }
    }

    impl Link for ScriptLink {
        fn send(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.borrow_mut().sent.push(frame.to_string());
            Ok(())
        }

        fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.borrow_mut().inbox.pop_front())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct ActInner {
        settings: AxisSettings,
        applied: Vec<(Axis, f64)>,
        fail_apply: bool,
    }

    #[derive(Clone, Default)]
    struct ScriptActuator(Rc<RefCell<ActInner>>);

    impl Actuator for ScriptActuator {
        fn capabilities(&self) -> TargetCapabilities {
            TargetCapabilities {
                pan: Some(AxisCapability::new(-50_000.0, 50_000.0, Some(3_600.0))),
                tilt: Some(AxisCapability::new(-40_000.0, 40_000.0, None)),
                zoom: Some(AxisCapability::new(1.0, 5.0, None)),
            }
        }

        fn settings(&mut self) -> Result<AxisSettings, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.borrow().settings)
        }

        fn apply(
            &mut self,
            axis: Axis,
            value: f64,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mut inner = self.0.borrow_mut();
            if inner.fail_apply {
                return Err(Box::new(std::io::Error::other("servo fault")));
            }
            inner.applied.push((axis, value));
            inner.settings.set_axis(axis, value);
            Ok(())
        }
    }

    fn agent(
        link: ScriptLink,
        actuator: ScriptActuator,
        clock: &TestClock,
    ) -> CameraAgent<ScriptActuator, ScriptLink> {
        CameraAgent::new(
            "camera-1",
            actuator,
            link,
            CameraCfg::default(),
            Arc::new(clock.clone()),
        )
    }

    #[test]
    fn first_tick_announces_capabilities() {
        let link = ScriptLink::default();
        let clock = TestClock::with_epoch_ms(1_000.0);
        let mut cam = agent(link.clone(), ScriptActuator::default(), &clock);
        cam.tick().unwrap();
        match &link.sent()[0] {
            Message::Capabilities { data } => assert!(data.contains_key("camera-1")),
            other => panic!("expected capabilities, got {other:?}"),
        }
    }

    #[test]
    fn ping_answered_with_local_receive_time() {
        let link = ScriptLink::default();
        let clock = TestClock::with_epoch_ms(5_120.0);
        let mut cam = agent(link.clone(), ScriptActuator::default(), &clock);
        link.push_inbound(&Message::Ping { t1: 4_990.0 });
        cam.tick().unwrap();
        let sent = link.sent();
        assert_eq!(sent[1], Message::Pong { t1: 4_990.0, t2: 5_120.0 });
    }

    #[test]
    fn command_for_another_target_is_ignored() {
        let link = ScriptLink::default();
        let actuator = ScriptActuator::default();
        let clock = TestClock::new();
        let mut cam = agent(link.clone(), actuator.clone(), &clock);
        link.push_inbound(&Message::Command {
            target: "camera-2".into(),
            command: Axis::Pan,
            value: 10.0,
            id: None,
            mouse_timestamp: None,
        });
        cam.tick().unwrap();
        assert!(actuator.0.borrow().applied.is_empty());
    }

    #[test]
    fn tracked_command_is_applied_and_acked_when_converged() {
        let link = ScriptLink::default();
        let actuator = ScriptActuator::default();
        let clock = TestClock::new();
        let mut cam = agent(link.clone(), actuator.clone(), &clock);
        link.push_inbound(&Message::Command {
            target: "camera-1".into(),
            command: Axis::Pan,
            value: 7_200.0,
            id: Some("c3".into()),
            mouse_timestamp: None,
        });
        cam.tick().unwrap();
        assert_eq!(actuator.0.borrow().applied, vec![(Axis::Pan, 7_200.0)]);
        let ack = link
            .sent()
            .into_iter()
            .find(|m| matches!(m, Message::CommandAck { .. }));
        assert_eq!(
            ack,
            Some(Message::CommandAck {
                id: "c3".into(),
                command: Axis::Pan,
                timed_out: false
            })
        );
    }

    #[test]
    fn apply_failure_is_dropped_not_fatal() {
        let link = ScriptLink::default();
        let actuator = ScriptActuator::default();
        actuator.0.borrow_mut().fail_apply = true;
        let clock = TestClock::new();
        let mut cam = agent(link.clone(), actuator.clone(), &clock);
        link.push_inbound(&Message::Command {
            target: "camera-1".into(),
            command: Axis::Zoom,
            value: 2.0,
            id: None,
            mouse_timestamp: None,
        });
        cam.tick().unwrap();
        assert!(actuator.0.borrow().applied.is_empty());
    }

    #[test]
    fn measured_movement_reports_movement_finished_after_settling() {
        let link = ScriptLink::default();
        let actuator = ScriptActuator::default();
        let clock = TestClock::with_epoch_ms(10_000.0);
        let mut cam = agent(link.clone(), actuator.clone(), &clock);
        link.push_inbound(&Message::Command {
            target: "camera-1".into(),
            command: Axis::Tilt,
            value: 500.0,
            id: None,
            mouse_timestamp: Some(9_800.0),
        });
        cam.tick().unwrap();
        // five stable polls fill the settle window
        for _ in 0..5 {
            clock.advance_ms(50);
            cam.tick().unwrap();
        }
        let finished = link
            .sent()
            .into_iter()
            .find(|m| matches!(m, Message::MovementFinished { .. }));
        match finished {
            Some(Message::MovementFinished {
                command,
                target_value,
                mouse_timestamp,
                movement_end_time,
            }) => {
                assert_eq!(command, Axis::Tilt);
                assert_eq!(target_value, 500.0);
                assert_eq!(mouse_timestamp, 9_800.0);
                assert!(movement_end_time > 10_000.0);
            }
            other => panic!("expected movement_finished, got {other:?}"),
        }
    }
}
