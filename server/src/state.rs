//! Service lifecycle state.

use serde::Serialize;

/// Service operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Constructed, cache not yet connected.
    Starting,
    /// Accepting requests.
    Running,
    /// Shutting down, not accepting new requests.
    ShuttingDown,
    /// Cache released.
    Stopped,
}

impl ServiceState {
    /// Check if the service is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServiceState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_running_accepts_requests() {
        assert!(ServiceState::Running.accepts_requests());
        assert!(!ServiceState::Starting.accepts_requests());
        assert!(!ServiceState::ShuttingDown.accepts_requests());
        assert!(!ServiceState::Stopped.accepts_requests());
    }
}
