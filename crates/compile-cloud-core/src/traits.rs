//! Core traits for transports and presentation sinks.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::{Endpoint, SessionEvent};

/// Identifier distinguishing successive transport handles of a session.
pub type Generation = u64;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    #[error("Connection is not open")]
    NotOpen,
}

/// What happened on a transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed.
    Opened,
    /// One raw text frame.
    DataReceived(String),
    /// Connection closed, by either side.
    Closed,
    /// Connection failed or could not be established.
    Failed(String),
}

impl TransportEventKind {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }
}

/// Transport event tagged with the generation of the handle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

/// Receiving end for transport events.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Reports lifecycle and data events for a single transport handle.
///
/// Enforces the handle contract: `Opened` at most once and before any data,
/// exactly one terminal event, nothing after it.
#[derive(Debug)]
pub struct EventReporter {
    generation: Generation,
    tx: mpsc::UnboundedSender<TransportEvent>,
    opened: bool,
    terminated: bool,
}

impl EventReporter {
    #[must_use]
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            generation,
            tx,
            opened: false,
            terminated: false,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.opened && !self.terminated
    }

    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn emit(&self, kind: TransportEventKind) {
        // Receiver gone means the session was torn down.
        let _ = self.tx.send(TransportEvent {
            generation: self.generation,
            kind,
        });
    }

    /// Report a completed handshake.
    pub fn opened(&mut self) {
        if self.opened || self.terminated {
            return;
        }
        self.opened = true;
        self.emit(TransportEventKind::Opened);
    }

    /// Report one inbound frame. Dropped unless open.
    pub fn data(&mut self, text: impl Into<String>) {
        if !self.is_open() {
            tracing::trace!(generation = self.generation, "dropping frame outside open window");
            return;
        }
        self.emit(TransportEventKind::DataReceived(text.into()));
    }

    /// Report a close. No-op after a terminal event.
    pub fn closed(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.emit(TransportEventKind::Closed);
    }

    /// Report a failure. No-op after a terminal event.
    pub fn failed(&mut self, reason: impl Into<String>) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.emit(TransportEventKind::Failed(reason.into()));
    }
}

/// Creates duplex connections.
///
/// `open` must not block: the handshake completes in the background and is
/// reported through the [`EventReporter`].
pub trait Transport: Send + Sync {
    /// Open a fresh connection.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectFailed`] if the endpoint cannot be
    /// used at all. Handshake failures are reported asynchronously.
    fn open(
        &self,
        endpoint: &Endpoint,
        reporter: EventReporter,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(
        &self,
        endpoint: &Endpoint,
        reporter: EventReporter,
    ) -> Result<Box<dyn Connection>, TransportError> {
        (**self).open(endpoint, reporter)
    }
}

/// One duplex connection handle.
pub trait Connection: Send {
    /// Send one text frame.
    ///
    /// # Errors
    /// Returns [`TransportError::NotOpen`] unless the connection is open.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Request closure. Idempotent.
    fn close(&self);
}

/// Receives semantic events from the session.
pub trait PresentationSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

impl<S: PresentationSink + ?Sized> PresentationSink for Arc<S> {
    fn emit(&self, event: SessionEvent) {
        (**self).emit(event);
    }
}

impl PresentationSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.send(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn emit(&self, _event: SessionEvent) {}
}
