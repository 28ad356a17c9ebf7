//! Wire codec for the tagged text protocol.
//!
//! Every frame is `TAG:PAYLOAD`. Only the first `:` is structural, so the
//! payload is carried verbatim and may contain further colons or newlines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between tag and payload.
pub const DELIMITER: char = ':';

/// Fixed leading token of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Submit source code for compilation and execution.
    Run,
    /// One line of interactive input for the running program.
    Input,
    /// One compiler/build diagnostic line.
    BuildLog,
    /// Raw program output chunk.
    Output,
    /// Execution finished.
    End,
    /// Unrecoverable build or runtime error.
    Error,
}

impl Tag {
    const ALL: [Self; 6] = [
        Self::Run,
        Self::Input,
        Self::BuildLog,
        Self::Output,
        Self::End,
        Self::Error,
    ];

    /// Literal token used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "RUN",
            Self::Input => "INPUT",
            Self::BuildLog => "BUILD_LOG",
            Self::Output => "OUTPUT",
            Self::End => "END",
            Self::Error => "ERROR",
        }
    }

    /// Whether the backend sends this tag to the client.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::BuildLog | Self::Output | Self::End | Self::Error)
    }

    /// Case-sensitive lookup of a wire token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == token)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message from client to backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Source code to compile and run.
    Run(String),
    /// Interactive input for the running program.
    Input(String),
}

impl Outbound {
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Run(_) => Tag::Run,
            Self::Input(_) => Tag::Input,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Run(p) | Self::Input(p) => p,
        }
    }
}

/// How a run finished, as reported in the `END` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Empty payload.
    Unspecified,
    /// `END:SUCCESS`.
    Success,
    /// `END:TIMEOUT`, the backend killed the program.
    Timeout,
    /// Any other payload, kept verbatim.
    Other(String),
}

impl RunOutcome {
    /// Interpret an `END` payload.
    #[must_use]
    pub fn from_payload(payload: &str) -> Self {
        match payload.trim() {
            "" => Self::Unspecified,
            "SUCCESS" => Self::Success,
            "TIMEOUT" => Self::Timeout,
            _ => Self::Other(payload.to_string()),
        }
    }

    /// Payload written for this outcome.
    #[must_use]
    pub fn as_payload(&self) -> &str {
        match self {
            Self::Unspecified => "",
            Self::Success => "SUCCESS",
            Self::Timeout => "TIMEOUT",
            Self::Other(p) => p,
        }
    }
}

/// Message from backend to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Build diagnostic line (no trailing newline is added here).
    BuildLog(String),
    /// Program output chunk, ANSI escapes untouched.
    Output(String),
    /// Execution finished.
    Ended(RunOutcome),
    /// Build or runtime failure description.
    Error(String),
}

impl Inbound {
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::BuildLog(_) => Tag::BuildLog,
            Self::Output(_) => Tag::Output,
            Self::Ended(_) => Tag::End,
            Self::Error(_) => Tag::Error,
        }
    }
}

/// Reasons a raw frame could not be decoded.
///
/// Callers drop such frames without any visible effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("frame has no `:` delimiter")]
    NoDelimiter,
    #[error("unknown message tag: {0}")]
    UnknownTag(String),
}

fn split_frame(raw: &str) -> Result<(&str, &str), DecodeFailure> {
    raw.split_once(DELIMITER).ok_or(DecodeFailure::NoDelimiter)
}

fn frame(tag: Tag, payload: &str) -> String {
    let mut out = String::with_capacity(tag.as_str().len() + 1 + payload.len());
    out.push_str(tag.as_str());
    out.push(DELIMITER);
    out.push_str(payload);
    out
}

/// Encode a client message.
#[must_use]
pub fn encode(message: &Outbound) -> String {
    frame(message.tag(), message.payload())
}

/// Decode a frame received from the backend.
///
/// # Errors
/// Returns [`DecodeFailure`] when the frame has no delimiter or its tag is
/// not one the backend sends.
pub fn decode(raw: &str) -> Result<Inbound, DecodeFailure> {
    let (token, payload) = split_frame(raw)?;
    match Tag::from_token(token) {
        Some(Tag::BuildLog) => Ok(Inbound::BuildLog(payload.to_string())),
        Some(Tag::Output) => Ok(Inbound::Output(payload.to_string())),
        Some(Tag::End) => Ok(Inbound::Ended(RunOutcome::from_payload(payload))),
        Some(Tag::Error) => Ok(Inbound::Error(payload.to_string())),
        Some(Tag::Run | Tag::Input) | None => Err(DecodeFailure::UnknownTag(token.to_string())),
    }
}

/// Encode a backend message. Used by backends and test peers.
#[must_use]
pub fn encode_inbound(message: &Inbound) -> String {
    match message {
        Inbound::BuildLog(p) | Inbound::Output(p) | Inbound::Error(p) => frame(message.tag(), p),
        Inbound::Ended(outcome) => frame(Tag::End, outcome.as_payload()),
    }
}

/// Decode a frame sent by a client. Used by backends and test peers.
///
/// # Errors
/// Returns [`DecodeFailure`] when the frame has no delimiter or its tag is
/// not one a client sends.
pub fn decode_outbound(raw: &str) -> Result<Outbound, DecodeFailure> {
    let (token, payload) = split_frame(raw)?;
    match Tag::from_token(token) {
        Some(Tag::Run) => Ok(Outbound::Run(payload.to_string())),
        Some(Tag::Input) => Ok(Outbound::Input(payload.to_string())),
        _ => Err(DecodeFailure::UnknownTag(token.to_string())),
    }
}
