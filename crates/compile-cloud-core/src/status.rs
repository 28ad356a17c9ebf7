//! Session states and their presentation-facing projections.

use serde::{Deserialize, Serialize};

/// Connection lifecycle of the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Execution state. Only meaningful while connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
}

/// Transient condition that colours the status until the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOverride {
    /// The backend reported an `ERROR:` for the last run.
    Error,
    /// `stop()` closed the connection and a reconnect is pending.
    Stopping,
}

/// Three-valued status severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Err,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Err => "err",
        }
    }
}

/// Severity plus human label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub severity: Severity,
    pub label: &'static str,
}

impl Status {
    pub const CONNECTING: Self = Self::new(Severity::Warn, "Connecting");
    pub const IDLE: Self = Self::new(Severity::Ok, "Connected (Idle)");
    pub const RUNNING: Self = Self::new(Severity::Warn, "Running");
    pub const ERROR: Self = Self::new(Severity::Err, "Error");
    pub const STOPPING: Self = Self::new(Severity::Err, "Stopping");
    pub const DISCONNECTED: Self = Self::new(Severity::Err, "Disconnected");

    #[must_use]
    pub const fn new(severity: Severity, label: &'static str) -> Self {
        Self { severity, label }
    }

    /// Project the session state into a status.
    #[must_use]
    pub const fn project(
        connection: ConnectionState,
        execution: ExecutionState,
        status_override: Option<StatusOverride>,
    ) -> Self {
        match (status_override, connection, execution) {
            (Some(StatusOverride::Stopping), ..) => Self::STOPPING,
            (Some(StatusOverride::Error), ConnectionState::Connected, _) => Self::ERROR,
            (_, ConnectionState::Disconnected, _) => Self::DISCONNECTED,
            (_, ConnectionState::Connecting, _) => Self::CONNECTING,
            (_, ConnectionState::Connected, ExecutionState::Idle) => Self::IDLE,
            (_, ConnectionState::Connected, ExecutionState::Running) => Self::RUNNING,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity.as_str(), self.label)
    }
}

/// Which user operations are currently available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Controls {
    pub can_connect: bool,
    pub can_run: bool,
    pub can_stop: bool,
    pub input_enabled: bool,
}

impl Controls {
    /// `closing` is set between `stop()` and the stopped connection's close
    /// being reported; nothing but waiting is possible then.
    #[must_use]
    pub const fn project(
        connection: ConnectionState,
        execution: ExecutionState,
        closing: bool,
    ) -> Self {
        let connected = !closing && matches!(connection, ConnectionState::Connected);
        let running = connected && matches!(execution, ExecutionState::Running);
        Self {
            can_connect: !closing,
            can_run: connected && !running,
            can_stop: running,
            input_enabled: running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_projection() {
        use ConnectionState::*;
        use ExecutionState::*;

        assert_eq!(Status::project(Disconnected, Idle, None), Status::DISCONNECTED);
        assert_eq!(Status::project(Connecting, Idle, None), Status::CONNECTING);
        assert_eq!(Status::project(Connected, Idle, None), Status::IDLE);
        assert_eq!(Status::project(Connected, Running, None), Status::RUNNING);
        assert_eq!(
            Status::project(Connected, Idle, Some(StatusOverride::Error)),
            Status::ERROR
        );
        assert_eq!(
            Status::project(Connected, Idle, Some(StatusOverride::Stopping)),
            Status::STOPPING
        );
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::IDLE.label, "Connected (Idle)");
        assert_eq!(Status::IDLE.severity, Severity::Ok);
        assert_eq!(Status::STOPPING.to_string(), "[err] Stopping");
    }

    #[test]
    fn test_controls() {
        let idle = Controls::project(ConnectionState::Connected, ExecutionState::Idle, false);
        assert!(idle.can_run && !idle.can_stop && !idle.input_enabled);

        let running = Controls::project(ConnectionState::Connected, ExecutionState::Running, false);
        assert!(!running.can_run && running.can_stop && running.input_enabled);

        let closing = Controls::project(ConnectionState::Connected, ExecutionState::Idle, true);
        assert!(!closing.can_connect && !closing.can_run && !closing.input_enabled);

        let closed = Controls::project(ConnectionState::Disconnected, ExecutionState::Idle, false);
        assert!(closed.can_connect && !closed.can_run && !closed.can_stop);
    }
}
