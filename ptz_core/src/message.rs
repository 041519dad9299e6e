//! Wire protocol: the closed set of JSON messages exchanged between peers.
//!
//! Every frame is a single line of JSON with a `type` tag. Field names keep
//! the wire's camelCase spelling so both peers agree byte-for-byte.

use std::collections::BTreeMap;

use ptz_traits::{Axis, TargetCapabilities};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Tagged union over the six wire-message shapes.
///
/// `t1`/`t2` are epoch milliseconds on the sender's own clock; see
/// `clocksync` for how they combine into an offset estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Ping {
        t1: f64,
    },
    Pong {
        t1: f64,
        t2: f64,
    },
    #[serde(rename_all = "camelCase")]
    Command {
        target: String,
        command: Axis,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Epoch-ms timestamp of the originating input event on the sender's
        /// clock. Echoed back verbatim in `movement_finished`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mouse_timestamp: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    CommandAck {
        id: String,
        command: Axis,
        timed_out: bool,
    },
    #[serde(rename_all = "camelCase")]
    MovementFinished {
        command: Axis,
        target_value: f64,
        mouse_timestamp: f64,
        movement_end_time: f64,
    },
    Capabilities {
        data: BTreeMap<String, TargetCapabilities>,
    },
}

impl Message {
    /// Encode to a single-line JSON frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::Report::new(ControlError::Protocol(e.to_string())))
    }

    /// Parse an inbound frame. Unknown `type` tags or malformed payloads are
    /// protocol errors; callers log and drop them (loss must not corrupt
    /// state).
    pub fn parse(frame: &str) -> Result<Message> {
        serde_json::from_str(frame)
            .map_err(|e| crate::error::Report::new(ControlError::Protocol(e.to_string())))
    }
}
