use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SunprintError {
    /// Network failure or elapsed timeout; the backend is presumed down.
    #[error("Backend unreachable: {message}")]
    Unreachable { message: String, timed_out: bool },

    /// Non-2xx answer carrying the server's own explanation.
    #[error("Request rejected ({status}): {detail}")]
    RemoteRejected { status: u16, detail: String },

    /// A local precondition failed before any network call was made.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Polling gave up after {attempts} attempts")]
    PollExhausted { attempts: u32 },

    /// The request was superseded by a newer one of the same kind.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SunprintError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            detail: detail.into(),
        }
    }

    /// True when the caller should re-run a health check rather than
    /// treat the failure as a generic error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Text to show the user. Server detail is surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::RemoteRejected { detail, .. } => detail.clone(),
            Self::ValidationFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<image::ImageError> for SunprintError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => Self::Encode(e.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SunprintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_surfaces_server_detail() {
        let err = SunprintError::rejected(422, "Blueprint 12 is disabled");
        assert_eq!(err.user_message(), "Blueprint 12 is disabled");
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_timeout_is_unreachable() {
        let err = SunprintError::timed_out("checkout submission after 180s");
        assert!(err.is_unreachable());
        assert!(matches!(
            err,
            SunprintError::Unreachable {
                timed_out: true,
                ..
            }
        ));
    }
}
