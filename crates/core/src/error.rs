use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Discriminator carried by every failure that reaches the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCause {
    /// The entity (or a unique key of it) already exists.
    Exists,
    /// The entity is unknown, or the failure could not be classified.
    Unknown,
    /// Input failed validation.
    Invalid,
    /// A relational constraint prevents the operation.
    Constrain,
}

impl ErrorCause {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCause::Exists => "exists",
            ErrorCause::Unknown => "unknown",
            ErrorCause::Invalid => "invalid",
            ErrorCause::Constrain => "constrain",
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn cause(&self) -> ErrorCause {
        ErrorCause::Invalid
    }
}
