//! fxgate Common Types
//!
//! Shared types used across fxgate: the closed set of supported
//! currencies, display rounding, and request-level errors.

pub mod error;
pub mod monetary;

pub use error::*;
pub use monetary::*;
