//! fxgate Server
//!
//! The currency conversion service: configuration, the service facade
//! that owns the cache and upstream clients, and the HTTP surface.

pub mod config;
pub mod http;
pub mod metrics;
pub mod service;
pub mod state;

pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use service::{CacheHealth, CurrencyService, HealthReport, OverallHealth};
pub use state::ServiceState;
