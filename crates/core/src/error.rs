/// Result alias that carries the custom [`MorphError`] type.
pub type Result<T> = std::result::Result<T, MorphError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MorphError {
    /// The morph duration was zero, negative or not a finite number.
    #[error("morph duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),
    /// The start delay was negative or not a finite number.
    #[error("start delay must be a non-negative number of seconds, got {0}")]
    InvalidDelay(f64),
    /// A real-time frame host was configured with a zero refresh rate.
    #[error("refresh rate must be at least 1 Hz, got {0}")]
    InvalidRefreshRate(u32),
    /// `start` was called on a scheduler that has no frame host to drive it.
    #[error("no frame host attached; attach one with `with_host` before starting")]
    HostUnavailable,
    /// A host was asked to fire frames with a timestamp that went backwards.
    #[error("frame timestamp {current}ms precedes previous timestamp {previous}ms")]
    NonMonotonicTimestamp { previous: f64, current: f64 },
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MorphError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for MorphError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MorphError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
