//! Error surfacing across crate boundaries: every failure the embedding
//! UI can hit must downcast to a `ControlError` variant it can match on.

use std::sync::Arc;

use ptz_core::error::ControlError;
use ptz_core::mocks::{NoopActuator, NullLink};
use ptz_core::{CameraAgent, CameraCfg, ConsoleCfg, Message, build_console};
use ptz_link::LoopbackLink;
use ptz_traits::Axis;
use ptz_traits::Link;
use ptz_traits::clock::MonotonicClock;

#[test]
fn sending_on_a_hung_up_link_maps_to_link_closed() {
    let (a, b) = LoopbackLink::pair();
    drop(b);
    let mut console = build_console(a, ConsoleCfg::default(), None).unwrap();
    let err = console
        .set_axis("camera-1", Axis::Pan, 100.0)
        .expect_err("send into a dropped peer must fail");
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::LinkClosed)
    ));
}

#[test]
fn resync_without_an_open_link_is_rejected() {
    let mut console = build_console(NullLink, ConsoleCfg::default(), None).unwrap();
    let err = console.resync().expect_err("no link to sample over");
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::LinkClosed)
    ));
}

#[test]
fn export_before_the_session_closes_is_an_invalid_state() {
    let mut console = build_console(NullLink, ConsoleCfg::default(), None).unwrap();
    console.start_recording();
    let err = console.export().expect_err("recording session must not export");
    match err.downcast_ref::<ControlError>() {
        Some(ControlError::State(msg)) => {
            assert!(msg.contains("stop recording"), "message was {msg:?}")
        }
        other => panic!("expected State, got {other:?}"),
    }
}

#[test]
fn malformed_frames_are_protocol_errors() {
    let err = Message::parse("pan=100").expect_err("not json");
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::Protocol(_))
    ));
    let err = Message::parse(r#"{"type":"warp_drive"}"#).expect_err("unknown tag");
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::Protocol(_))
    ));
}

#[test]
fn failing_actuator_does_not_kill_the_agent() {
    let (mut console_end, camera_end) = LoopbackLink::pair();
    let mut camera = CameraAgent::new(
        "camera-1",
        NoopActuator,
        camera_end,
        CameraCfg::default(),
        Arc::new(MonotonicClock::new()),
    );
    let frame = Message::Command {
        target: "camera-1".into(),
        command: Axis::Pan,
        value: 10.0,
        id: Some("c0".into()),
        mouse_timestamp: None,
    }
    .encode()
    .unwrap();
    console_end.send(&frame).unwrap();

    // Apply and telemetry both error; the agent logs, tears the session
    // down, and keeps ticking.
    camera.tick().expect("tick survives an actuator fault");
    camera.tick().expect("subsequent ticks stay healthy");

    let mut acks = 0;
    while let Ok(Some(frame)) = console_end.poll() {
        if matches!(Message::parse(&frame), Ok(Message::CommandAck { .. })) {
            acks += 1;
        }
    }
    assert_eq!(acks, 0, "no ack may be fabricated for a dead actuator");
}
