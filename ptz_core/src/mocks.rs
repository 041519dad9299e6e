//! Test and helper mocks for ptz_core

use ptz_traits::{Axis, AxisSettings, TargetCapabilities};

/// An actuator that reports no axes and errors on every access; useful when
/// exercising link plumbing without simulated hardware behind it.
pub struct NoopActuator;

impl ptz_traits::Actuator for NoopActuator {
    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities::default()
    }

    fn settings(&mut self) -> Result<AxisSettings, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop actuator")))
    }

    fn apply(
        &mut self,
        _axis: Axis,
        _value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop actuator")))
    }
}

/// A permanently closed link: sends fail and polls yield nothing.
pub struct NullLink;

impl ptz_traits::Link for NullLink {
    fn send(&mut self, _frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("link closed")))
    }

    fn poll(&mut self) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(None)
    }

    fn is_open(&self) -> bool {
        false
    }
}
