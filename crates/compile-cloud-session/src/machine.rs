//! Session state machine.
//!
//! Synchronous and deterministic: every public method is one atomic step.
//! Transport events reach it through [`Session::handle_transport_event`];
//! the driver owns the event receiver and the reconnect timer.

use std::time::Duration;

use compile_cloud_core::{
    ClientConfig, Connection, ConnectionState, Controls, Endpoint, EventReporter, ExecutionState,
    Generation, Inbound, Outbound, PresentationSink, SessionEvent, Status, StatusOverride,
    Transport, TransportEvent, TransportEventKind, codec,
};
use serde::Serialize;
use tokio::{sync::mpsc, time::Instant};

/// Notice emitted when input is submitted without an active run.
pub const NO_ACTIVE_RUN: &str = "cannot send input, no active run";
/// Notice emitted when the connection opens.
pub const CONNECTION_ESTABLISHED: &str = "connection established, ready to compile and run code";
/// Notice emitted when the connection closes.
pub const SESSION_CLOSED: &str = "session closed";

/// Identifier of one scheduled auto-reconnect.
pub type Ticket = u64;

/// Auto-reconnect scheduled by `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    pub ticket: Ticket,
    pub deadline: Instant,
}

/// Observable state of the session after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub generation: Generation,
    pub connection: ConnectionState,
    pub execution: ExecutionState,
    pub status: Status,
    pub controls: Controls,
    pub closing: bool,
    pub reconnect_pending: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            connection: ConnectionState::Disconnected,
            execution: ExecutionState::Idle,
            status: Status::DISCONNECTED,
            controls: Controls::project(ConnectionState::Disconnected, ExecutionState::Idle, false),
            closing: false,
            reconnect_pending: false,
        }
    }
}

/// One client session against an execution backend.
pub struct Session<T, S> {
    transport: T,
    sink: S,
    endpoint: Endpoint,
    reconnect_delay: Duration,
    events_tx: mpsc::UnboundedSender<TransportEvent>,

    generation: Generation,
    handle: Option<Box<dyn Connection>>,
    connection: ConnectionState,
    execution: ExecutionState,
    status_override: Option<StatusOverride>,
    // stop() closed the handle and its terminal event has not arrived yet
    closing: bool,

    pending_reconnect: Option<PendingReconnect>,
    next_ticket: Ticket,
}

impl<T, S> Session<T, S>
where
    T: Transport,
    S: PresentationSink,
{
    /// Create a disconnected session.
    ///
    /// Transport events for every handle this session opens are sent on
    /// `events_tx`; feed them back through [`Self::handle_transport_event`].
    pub fn new(
        config: &ClientConfig,
        transport: T,
        sink: S,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            transport,
            sink,
            endpoint: config.endpoint.clone(),
            reconnect_delay: config.reconnect_delay(),
            events_tx,
            generation: 0,
            handle: None,
            connection: ConnectionState::Disconnected,
            execution: ExecutionState::Idle,
            status_override: None,
            closing: false,
            pending_reconnect: None,
            next_ticket: 0,
        }
    }

    pub const fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub const fn execution(&self) -> ExecutionState {
        self.execution
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub const fn status(&self) -> Status {
        Status::project(self.connection, self.execution, self.status_override)
    }

    pub const fn controls(&self) -> Controls {
        Controls::project(self.connection, self.execution, self.closing)
    }

    /// Whether input would currently reach a running program.
    pub const fn input_enabled(&self) -> bool {
        self.controls().input_enabled
    }

    /// Whether a stopped connection is still waiting for its close.
    pub const fn is_closing(&self) -> bool {
        self.closing
    }

    pub const fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending_reconnect
    }

    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub const fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            connection: self.connection,
            execution: self.execution,
            status: self.status(),
            controls: self.controls(),
            closing: self.closing,
            reconnect_pending: self.pending_reconnect.is_some(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }

    fn publish_status(&self) {
        let status = self.status();
        tracing::debug!(
            generation = self.generation,
            connection = ?self.connection,
            execution = ?self.execution,
            %status,
            "session state"
        );
        self.emit(SessionEvent::status(status));
    }

    fn send(&self, message: &Outbound) -> bool {
        let Some(handle) = &self.handle else {
            return false;
        };
        match handle.send(codec::encode(message)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation = self.generation, tag = %message.tag(), "send failed: {e}");
                false
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.controls().can_run
    }

    fn is_running(&self) -> bool {
        self.controls().can_stop
    }

    /// Open a fresh connection, replacing any existing one.
    ///
    /// Cancels a pending auto-reconnect. Late events from the replaced
    /// handle are ignored by generation.
    pub fn connect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            tracing::debug!(ticket = pending.ticket, "cancelled pending reconnect");
        }
        if let Some(old) = self.handle.take() {
            old.close();
        }

        self.generation += 1;
        self.connection = ConnectionState::Connecting;
        self.execution = ExecutionState::Idle;
        self.status_override = None;
        self.closing = false;
        self.publish_status();

        let reporter = EventReporter::new(self.generation, self.events_tx.clone());
        match self.transport.open(&self.endpoint, reporter) {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                tracing::warn!(generation = self.generation, endpoint = %self.endpoint, "open failed: {e}");
                self.connection = ConnectionState::Disconnected;
                self.emit(SessionEvent::notice(format!("connection failed: {e}")));
                self.publish_status();
            }
        }
    }

    /// Submit source code. Ignored unless connected and idle.
    ///
    /// Returns whether the run was submitted.
    pub fn run(&mut self, source: &str) -> bool {
        if !self.is_idle() {
            tracing::debug!(connection = ?self.connection, execution = ?self.execution, "run ignored");
            return false;
        }
        if !self.send(&Outbound::Run(source.to_string())) {
            self.emit(SessionEvent::notice("cannot run, connection is not open"));
            return false;
        }
        self.execution = ExecutionState::Running;
        self.status_override = None;
        self.emit(SessionEvent::RunStarted);
        self.publish_status();
        true
    }

    /// Forward one line of input to the running program.
    ///
    /// Without an active run this only emits a local notice.
    /// Returns whether the input was sent.
    pub fn send_input(&mut self, text: &str) -> bool {
        if !self.is_running() || !self.send(&Outbound::Input(text.to_string())) {
            self.emit(SessionEvent::notice(NO_ACTIVE_RUN));
            return false;
        }
        self.emit(SessionEvent::InputEchoed {
            text: text.to_string(),
        });
        true
    }

    /// Terminate the active run by closing the connection, then reconnect
    /// after the configured delay. Ignored unless running.
    ///
    /// The session reaches Disconnected when the handle reports its close.
    /// Frames arriving in between are dropped.
    ///
    /// Returns whether a stop was performed.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            tracing::debug!(connection = ?self.connection, execution = ?self.execution, "stop ignored");
            return false;
        }
        if let Some(handle) = &self.handle {
            handle.close();
        }
        self.execution = ExecutionState::Idle;
        self.status_override = Some(StatusOverride::Stopping);
        self.closing = true;

        self.next_ticket += 1;
        let pending = PendingReconnect {
            ticket: self.next_ticket,
            deadline: Instant::now() + self.reconnect_delay,
        };
        self.pending_reconnect = Some(pending);
        tracing::debug!(ticket = pending.ticket, delay = ?self.reconnect_delay, "reconnect scheduled");

        self.publish_status();
        true
    }

    /// Run the auto-reconnect for `ticket` if it is still pending.
    ///
    /// Returns whether a reconnect was issued.
    pub fn fire_reconnect(&mut self, ticket: Ticket) -> bool {
        match self.pending_reconnect {
            Some(pending) if pending.ticket == ticket => {
                self.pending_reconnect = None;
                tracing::debug!(ticket, "auto-reconnect");
                self.connect();
                true
            }
            _ => false,
        }
    }

    /// Apply one transport event. Events from replaced handles are ignored.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation || self.handle.is_none() {
            tracing::trace!(
                event_generation = event.generation,
                current = self.generation,
                "ignoring stale transport event"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::DataReceived(raw) => self.on_frame(&raw),
            TransportEventKind::Closed => self.on_terminated(None),
            TransportEventKind::Failed(reason) => self.on_terminated(Some(reason)),
        }
    }

    fn on_opened(&mut self) {
        if self.connection != ConnectionState::Connecting {
            return;
        }
        self.connection = ConnectionState::Connected;
        self.execution = ExecutionState::Idle;
        self.status_override = None;
        self.emit(SessionEvent::notice(CONNECTION_ESTABLISHED));
        self.publish_status();
    }

    fn on_frame(&mut self, raw: &str) {
        if self.connection != ConnectionState::Connected || self.closing {
            tracing::trace!(generation = self.generation, "dropping frame while not connected");
            return;
        }
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::trace!(generation = self.generation, "dropping frame: {e}");
                return;
            }
        };

        match message {
            Inbound::BuildLog(text) => self.emit(SessionEvent::BuildLogAppended { text }),
            Inbound::Output(chunk) => self.emit(SessionEvent::OutputAppended { chunk }),
            Inbound::Ended(outcome) => {
                self.execution = ExecutionState::Idle;
                self.status_override = None;
                self.emit(SessionEvent::RunEnded { outcome });
                self.publish_status();
            }
            Inbound::Error(text) => {
                self.execution = ExecutionState::Idle;
                self.status_override = Some(StatusOverride::Error);
                self.emit(SessionEvent::ErrorReported { text });
                self.publish_status();
            }
        }
    }

    fn on_terminated(&mut self, failure: Option<String>) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        self.connection = ConnectionState::Disconnected;
        self.execution = ExecutionState::Idle;
        self.status_override = None;
        self.closing = false;

        let notice = match failure {
            Some(reason) => {
                tracing::warn!(generation = self.generation, "connection failed: {reason}");
                format!("connection failed: {reason}")
            }
            None => SESSION_CLOSED.to_string(),
        };
        self.emit(SessionEvent::notice(notice));
        self.publish_status();
    }

    /// Close the connection and drop any pending reconnect, without events.
    pub fn shutdown(&mut self) {
        self.pending_reconnect = None;
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        self.connection = ConnectionState::Disconnected;
        self.execution = ExecutionState::Idle;
        self.status_override = None;
        self.closing = false;
    }
}
