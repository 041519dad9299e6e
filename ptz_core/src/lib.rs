#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core PTZ control logic (transport-agnostic).
//!
//! This crate provides the transport-independent remote-control engine for
//! pan/tilt/zoom camera heads. All I/O goes through the `ptz_traits::Link`
//! and `ptz_traits::Actuator` traits.
//!
//! ## Architecture
//!
//! - **Clock sync**: ping/pong offset estimation over the link (`clocksync`)
//! - **Dispatch**: tracked command ids, pending table, TTL sweep (`dispatch`)
//! - **Confirmation**: camera-side convergence and settle detection (`confirm`)
//! - **Throttle**: per-axis coalescing gate ahead of the hardware (`throttle`)
//! - **Tracking**: visual feedback controller over detection frames (`track`)
//! - **Evaluation**: latency/settle session log with export (`eval`)
//! - **Endpoints**: operator `Console` and remote `CameraAgent` (`console`,
//!   `camera`)
//!
//! ## Time Domains
//!
//! Console wall-clock milliseconds (`LocalMs`) and camera wall-clock
//! milliseconds (`RemoteMs`) are distinct newtypes; `ClockOffset` is the only
//! bridge between them. Monotonic `Instant`s drive every local timer, so
//! wall-clock steps never corrupt timeouts.

// Module declarations
pub mod builder;
pub mod camera;
pub mod clocksync;
pub mod config;
pub mod confirm;
pub mod console;
pub mod conversions;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod intent;
pub mod link_error;
pub mod message;
pub mod mocks;
pub mod throttle;
pub mod track;
pub mod util;

pub use crate::builder::{Console, ConsoleBuilder, ConsoleG, Missing, Set, build_console};
pub use crate::camera::CameraAgent;
pub use crate::clocksync::{ClockOffset, ClockSync, LocalMs, RemoteMs, SyncResult};
pub use crate::config::{
    CameraCfg, ConfirmCfg, ConsoleCfg, DispatchCfg, EvalCfg, IntentCfg, PidGains, SettleCfg,
    SyncCfg, ThrottleCfg, TrackCfg,
};
pub use crate::console::{ConsoleCore, ConsoleEvent};
pub use crate::dispatch::{CommandId, Dispatcher, PendingCommand, TrackedSend};
pub use crate::error::{BuildError, ControlError, Result};
pub use crate::eval::{LatencyRecord, NotDetectedRecord, Row, SessionLog, SettleRecord, TrackRecord};
pub use crate::message::Message;
pub use crate::track::{Correction, Detection, Frame, TrackStep, Tracker};
