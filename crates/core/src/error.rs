/// Result alias that carries the custom [`GrainScoreError`] type.
pub type Result<T> = std::result::Result<T, GrainScoreError>;

/// Common error type for the core crate.
///
/// Every variant is a construction-time failure: curves and controllers
/// validate their input once and never fail while being evaluated.
#[derive(Debug, thiserror::Error)]
pub enum GrainScoreError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// A breakpoint list or envelope description has the wrong shape.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    /// The requested interpolation kind is not one of linear, step or cubic.
    #[error("unknown interpolation `{0}` (expected linear, step or cubic)")]
    UnknownInterpolation(String),
    /// The requested time distribution is not registered.
    #[error("unknown time distribution `{name}` (available: {available})")]
    UnknownDistribution { name: String, available: String },
    /// A compact pattern failed validation.
    #[error("invalid compact pattern: {0}")]
    InvalidPattern(String),
    /// Legacy multi-cycle curves have no integral and are refused outright.
    #[error("the legacy `cycle` marker is not supported; expand the pattern into a compact spec")]
    UnsupportedCycleMarker,
    /// A stream or pointer parameter is out of its valid domain.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    /// Wrapper around JSON decoding errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl GrainScoreError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn envelope<T: Into<String>>(msg: T) -> Self {
        Self::InvalidEnvelope(msg.into())
    }

    pub(crate) fn pattern<T: Into<String>>(msg: T) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub(crate) fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
