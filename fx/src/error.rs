//! Internal FX error types.

use fxgate_common::Currency;
use thiserror::Error;

/// Infrastructure errors inside the conversion pipeline.
///
/// None of these reach API callers: cache errors become forced misses
/// and upstream errors become fallback snapshots.
#[derive(Debug, Error)]
pub enum FxError {
    /// Cache backend is detached, unreachable or timed out.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Upstream provider could not be reached.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream provider did not answer within the timeout.
    #[error("Upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    /// Upstream provider returned a non-success status.
    #[error("Upstream returned status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// Upstream provider answered but reported an error in the body.
    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// Snapshot has no usable quote for a currency.
    #[error("No quote for {currency} against {base}")]
    MissingQuote { base: Currency, currency: Currency },

    /// Configured quote is not a positive number.
    #[error("Invalid quote for {currency}: {value}")]
    InvalidQuote { currency: Currency, value: String },

    /// Cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FxError {
    /// Check if this error came from the cache tier.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, FxError::CacheUnavailable(_))
    }

    /// Check if this error came from the upstream provider.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            FxError::UpstreamUnavailable(_)
                | FxError::UpstreamTimeout { .. }
                | FxError::UpstreamStatus { .. }
                | FxError::UpstreamRejected(_)
        )
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
