use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("inbound frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
