//! Semantic events emitted to the presentation layer.

use serde::Serialize;

use crate::{
    codec::RunOutcome,
    status::{Severity, Status},
};

/// Event consumed by a [`PresentationSink`](crate::PresentationSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Status projection changed.
    StatusChanged {
        severity: Severity,
        label: &'static str,
    },
    /// A run was submitted; build log and output panes start fresh.
    RunStarted,
    /// Build diagnostic line. Sinks append their own trailing newline.
    BuildLogAppended { text: String },
    /// Raw output chunk, possibly containing ANSI SGR escapes.
    OutputAppended { chunk: String },
    /// The run finished.
    RunEnded { outcome: RunOutcome },
    /// Backend-reported build or runtime error.
    ErrorReported { text: String },
    /// Input forwarded to the running program.
    InputEchoed { text: String },
    /// Client-side notice, never sent on the wire.
    LocalNotice { text: String },
}

impl SessionEvent {
    #[must_use]
    pub const fn status(status: Status) -> Self {
        Self::StatusChanged {
            severity: status.severity,
            label: status.label,
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::LocalNotice { text: text.into() }
    }

    /// Approximate heap size, used to bound stored history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 16;
        let payload = match self {
            Self::StatusChanged { label, .. } => label.len(),
            Self::RunStarted => 0,
            Self::BuildLogAppended { text }
            | Self::ErrorReported { text }
            | Self::InputEchoed { text }
            | Self::LocalNotice { text } => text.len(),
            Self::OutputAppended { chunk } => chunk.len(),
            Self::RunEnded { outcome } => outcome.as_payload().len(),
        };
        payload + OVERHEAD
    }

    /// Serialize as a single JSON line.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event() {
        assert_eq!(
            SessionEvent::status(Status::IDLE),
            SessionEvent::StatusChanged {
                severity: Severity::Ok,
                label: "Connected (Idle)"
            }
        );
    }

    #[test]
    fn test_json_shape() {
        let json = SessionEvent::OutputAppended {
            chunk: "hello".into(),
        }
        .to_json_line()
        .unwrap();
        assert_eq!(json, r#"{"type":"output_appended","chunk":"hello"}"#);

        let json = SessionEvent::status(Status::RUNNING).to_json_line().unwrap();
        assert!(json.contains(r#""severity":"warn""#));
        assert!(json.contains(r#""label":"Running""#));
    }

    #[test]
    fn test_approx_bytes_grows_with_payload() {
        let small = SessionEvent::notice("a");
        let large = SessionEvent::notice("a".repeat(100));
        assert!(large.approx_bytes() > small.approx_bytes());
    }
}
