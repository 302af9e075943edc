//! Request-level error types.

use thiserror::Error;

/// Errors surfaced to callers of the conversion API.
///
/// Infrastructure failures (cache, upstream) never show up here; they are
/// absorbed by the engine's degradation paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Request field failed validation.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Currency code outside the supported set.
    #[error("Unsupported currency for {field}: {code}")]
    UnsupportedCurrency { field: String, code: String },

    /// Batch exceeds the configured size limit.
    #[error("Batch of {size} requests exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

impl ConversionError {
    /// Create a validation error for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConversionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConversionError::Validation { .. } => "VALIDATION_ERROR",
            ConversionError::UnsupportedCurrency { .. } => "UNSUPPORTED_CURRENCY",
            ConversionError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
        }
    }

    /// Request field that caused the error (if applicable).
    pub fn field(&self) -> Option<&str> {
        match self {
            ConversionError::Validation { field, .. } => Some(field),
            ConversionError::UnsupportedCurrency { field, .. } => Some(field),
            ConversionError::BatchTooLarge { .. } => None,
        }
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConversionError>;
