use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid cursor `{value}`: {reason}")]
    InvalidCursor { value: String, reason: String },
    #[error("timestamp cannot be represented canonically: {message}")]
    UnrepresentableTimestamp { message: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn invalid_cursor(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCursor {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unrepresentable(message: impl Into<String>) -> Self {
        Self::UnrepresentableTimestamp {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
