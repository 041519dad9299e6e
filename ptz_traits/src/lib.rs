pub mod clock;

pub use clock::{Clock, MonotonicClock};

use serde::{Deserialize, Serialize};

/// An independently controllable degree of freedom of the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Pan,
    Tilt,
    Zoom,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Pan, Axis::Tilt, Axis::Zoom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Pan => "pan",
            Axis::Tilt => "tilt",
            Axis::Zoom => "zoom",
        }
    }

    /// Pan and tilt are angular axes; zoom is not.
    pub fn is_angular(&self) -> bool {
        !matches!(self, Axis::Zoom)
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value range of one axis on one actuator target. Immutable once received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCapability {
    pub min: f64,
    pub max: f64,
    /// Granularity of the axis, when the device reports one. Axes without a
    /// step are treated as continuous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl AxisCapability {
    pub fn new(min: f64, max: f64, step: Option<f64>) -> Self {
        Self { min, max, step }
    }

    /// Clamp a requested value into [min, max].
    pub fn clamp(&self, value: f64) -> f64 {
        value.min(self.max).max(self.min)
    }

    /// Midpoint of the range, used to seed "current setting" estimates.
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Capability set of one actuator target; axes the device lacks are None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<AxisCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt: Option<AxisCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<AxisCapability>,
}

impl TargetCapabilities {
    pub fn axis(&self, axis: Axis) -> Option<&AxisCapability> {
        match axis {
            Axis::Pan => self.pan.as_ref(),
            Axis::Tilt => self.tilt.as_ref(),
            Axis::Zoom => self.zoom.as_ref(),
        }
    }

    pub fn set_axis(&mut self, axis: Axis, cap: AxisCapability) {
        match axis {
            Axis::Pan => self.pan = Some(cap),
            Axis::Tilt => self.tilt = Some(cap),
            Axis::Zoom => self.zoom = Some(cap),
        }
    }
}

/// Live actuator telemetry: the current value of each axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

impl AxisSettings {
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Pan => self.pan,
            Axis::Tilt => self.tilt,
            Axis::Zoom => self.zoom,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Pan => self.pan = value,
            Axis::Tilt => self.tilt = value,
            Axis::Zoom => self.zoom = value,
        }
    }
}

/// Physical (or simulated) PTZ device handle.
///
/// `settings()` is fallible because telemetry can disappear mid-session
/// (device unplugged, track ended); callers treat that as a teardown signal,
/// not a fatal error. `apply()` failures mean the device rejected or could
/// not service the constraint; the intent is dropped, never retried.
pub trait Actuator {
    fn capabilities(&self) -> TargetCapabilities;
    fn settings(&mut self) -> Result<AxisSettings, Box<dyn std::error::Error + Send + Sync>>;
    fn apply(
        &mut self,
        axis: Axis,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Ordered, best-effort duplex message transport between two peers.
///
/// Frames are single-line JSON text; parsing happens above this seam.
/// `poll()` is non-blocking and returns the next inbound frame when one is
/// ready. Loss is possible and must not corrupt caller state.
pub trait Link {
    fn send(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
    fn is_open(&self) -> bool;
}

// Boxed trait objects forward to the inner value, so `Box<dyn Link>` and
// `Box<dyn Actuator>` satisfy the same bounds as concrete implementations.
impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn capabilities(&self) -> TargetCapabilities {
        (**self).capabilities()
    }

    fn settings(&mut self) -> Result<AxisSettings, Box<dyn std::error::Error + Send + Sync>> {
        (**self).settings()
    }

    fn apply(
        &mut self,
        axis: Axis,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).apply(axis, value)
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(frame)
    }

    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).poll()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds_and_idempotence() {
        let cap = AxisCapability::new(-100.0, 100.0, Some(1.0));
        assert_eq!(cap.clamp(250.0), 100.0);
        assert_eq!(cap.clamp(-250.0), -100.0);
        assert_eq!(cap.clamp(42.0), 42.0);
        assert_eq!(cap.clamp(cap.clamp(250.0)), 100.0);
    }

    #[test]
    fn axis_serializes_lowercase() {
        let json = serde_json::to_string(&Axis::Pan).unwrap();
        assert_eq!(json, "\"pan\"");
        let back: Axis = serde_json::from_str("\"zoom\"").unwrap();
        assert_eq!(back, Axis::Zoom);
    }

    #[test]
    fn capability_step_omitted_when_absent() {
        let cap = AxisCapability::new(1.0, 5.0, None);
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, "{\"min\":1.0,\"max\":5.0}");
    }

    #[test]
    fn settings_round_trip_by_axis() {
        let mut s = AxisSettings::default();
        for (i, axis) in Axis::ALL.iter().enumerate() {
            s.set_axis(*axis, i as f64 * 10.0);
        }
        assert_eq!(s.axis(Axis::Pan), 0.0);
        assert_eq!(s.axis(Axis::Tilt), 10.0);
        assert_eq!(s.axis(Axis::Zoom), 20.0);
    }
}
