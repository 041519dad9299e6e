use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ControlError {
    #[error("link closed")]
    LinkClosed,
    #[error("link error: {0}")]
    Link(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("tracking fault: {0}")]
    Tracking(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing link")]
    MissingLink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
