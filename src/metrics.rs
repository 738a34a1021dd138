//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the host installs a recorder.

/// Metric names and label values
pub mod labels {
    /// Reconcile operation counter
    pub const RECONCILE_TOTAL: &str = "mongo_rbac_reconcile_total";
    /// Reconcile operation outcome counter
    pub const RECONCILE_COMPLETED: &str = "mongo_rbac_reconcile_completed_total";
    /// Established connections
    pub const CONNECTIONS: &str = "mongo_rbac_connections_total";
    /// Authentication attempts
    pub const AUTH_ATTEMPTED: &str = "mongo_rbac_auth_attempted_total";
    /// Authentication failures
    pub const AUTH_FAILED: &str = "mongo_rbac_auth_failed_total";
    /// Command round-trip duration
    pub const COMMAND_DURATION: &str = "mongo_rbac_command_duration_seconds";

    /// SCRAM-SHA-256 mechanism label
    pub const MECHANISM_SCRAM_SHA_256: &str = "SCRAM-SHA-256";
    /// Successful outcome label
    pub const OUTCOME_OK: &str = "ok";
}

/// Counter helpers
pub mod counters {
    use super::labels;

    /// A reconcile operation started
    pub fn reconcile_started(operation: &'static str) {
        metrics::counter!(labels::RECONCILE_TOTAL, "operation" => operation).increment(1);
    }

    /// A reconcile operation finished; `outcome` is `ok` or an error category
    pub fn reconcile_completed(operation: &'static str, outcome: &'static str) {
        metrics::counter!(
            labels::RECONCILE_COMPLETED,
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
    }

    /// A connection finished its handshake
    pub fn connection_established(tls: bool) {
        let transport = if tls { "tls" } else { "plain" };
        metrics::counter!(labels::CONNECTIONS, "transport" => transport).increment(1);
    }

    /// Authentication started
    pub fn auth_attempted(mechanism: &'static str) {
        metrics::counter!(labels::AUTH_ATTEMPTED, "mechanism" => mechanism).increment(1);
    }

    /// Authentication failed
    pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
        metrics::counter!(
            labels::AUTH_FAILED,
            "mechanism" => mechanism,
            "reason" => reason
        )
        .increment(1);
    }
}

/// Histogram helpers
pub mod histograms {
    use super::labels;
    use std::time::Duration;

    /// Round-trip time of one command
    pub fn command_duration(command: String, elapsed: Duration) {
        metrics::histogram!(labels::COMMAND_DURATION, "command" => command)
            .record(elapsed.as_secs_f64());
    }
}
