//! Maps `Box<dyn Error>` from the `Link` seam to typed `ControlError`.
//!
//! The trait boundary stays erased so any transport can plug in; here the
//! orchestrators recover a typed `ControlError` from it. With the
//! `link-errors` feature (default) a `ptz_link::LinkError` downcast gives a
//! precise mapping; otherwise message heuristics decide.

use crate::error::ControlError;

/// Map a link-boundary error to a typed `ControlError`.
///
/// Attempts to downcast the known transport error type first, then falls
/// back to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "link-errors")]
    {
        if let Some(le) = e.downcast_ref::<ptz_link::error::LinkError>() {
            return match le {
                ptz_link::error::LinkError::Closed => ControlError::LinkClosed,
                other => ControlError::Link(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("closed") {
        ControlError::LinkClosed
    } else {
        ControlError::Link(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StringError(&'static str);

    impl std::fmt::Display for StringError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for StringError {}

    #[test]
    fn closed_heuristic_maps_to_link_closed() {
        let e = StringError("channel Closed by peer");
        assert!(matches!(map_link_error(&e), ControlError::LinkClosed));
    }

    #[test]
    fn other_errors_keep_their_message() {
        let e = StringError("send buffer full");
        match map_link_error(&e) {
            ControlError::Link(msg) => assert_eq!(msg, "send buffer full"),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[cfg(feature = "link-errors")]
    #[test]
    fn typed_downcast_wins_over_heuristics() {
        let e = ptz_link::error::LinkError::Closed;
        assert!(matches!(map_link_error(&e), ControlError::LinkClosed));
    }
}
