use std::thread;
use std::time::Duration;

use ptz_link::LoopbackLink;
use ptz_link::error::LinkError;
use ptz_link::util::wait_for_frame;
use ptz_traits::Link;
use rstest::rstest;

#[rstest]
fn wait_for_frame_success_path() {
    let (mut a, mut b) = LoopbackLink::pair();
    // Peer sends after a short delay
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        b.send(r#"{"type":"ping","t1":1.0}"#).unwrap();
    });

    let frame = wait_for_frame(
        &mut a,
        Duration::from_millis(500),
        Duration::from_micros(200),
    )
    .expect("frame should arrive");
    assert!(frame.contains("ping"));
}

#[rstest]
fn wait_for_frame_timeout_path() {
    let (mut a, _b) = LoopbackLink::pair();

    let err = wait_for_frame(
        &mut a,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    match err {
        LinkError::Timeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
fn wait_for_frame_on_a_hung_up_link_errors() {
    let (mut a, b) = LoopbackLink::pair();
    drop(b);

    let err = wait_for_frame(
        &mut a,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected transport error");

    match err {
        LinkError::Transport(msg) => assert!(msg.to_lowercase().contains("closed")),
        other => panic!("unexpected error: {other:?}"),
    }
}
