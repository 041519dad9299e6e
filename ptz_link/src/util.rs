use std::time::{Duration, Instant};

use ptz_traits::Link;

use crate::error::{LinkError, Result};

/// Poll a link until the next inbound frame arrives, or a timeout expires.
/// Sleeps in small intervals to avoid CPU spinning.
pub fn wait_for_frame(
    link: &mut impl Link,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        match link.poll() {
            Ok(Some(frame)) => return Ok(frame),
            Ok(None) => {}
            Err(e) => return Err(LinkError::Transport(e.to_string())),
        }
        if Instant::now() >= deadline {
            return Err(LinkError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
}
