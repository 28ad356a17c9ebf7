//! Async driver owning a [`Session`] inside one task.
//!
//! Commands and transport events are applied one at a time, so no caller
//! ever observes a partially applied transition. Queued commands go first:
//! a program flooding output cannot hold back `stop()`.

use compile_cloud_core::{ClientConfig, PresentationSink, Transport, TransportEventReceiver};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep_until,
};

use crate::machine::{PendingReconnect, Session, SessionSnapshot, Ticket};

/// Driver error.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Session driver has shut down")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Connect,
    Run(String),
    SendInput(String),
    Stop,
    Shutdown,
}

/// Cloneable handle to a running session driver.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn command(&self, command: Command) -> Result<(), DriverError> {
        self.commands.send(command).map_err(|_| DriverError::Closed)
    }

    /// Open a fresh connection, replacing the current one.
    ///
    /// # Errors
    /// Returns error if the driver has shut down.
    pub fn connect(&self) -> Result<(), DriverError> {
        self.command(Command::Connect)
    }

    /// Submit source code. Ignored unless connected and idle.
    ///
    /// # Errors
    /// Returns error if the driver has shut down.
    pub fn run(&self, source: impl Into<String>) -> Result<(), DriverError> {
        self.command(Command::Run(source.into()))
    }

    /// Forward one line of input to the running program.
    ///
    /// # Errors
    /// Returns error if the driver has shut down.
    pub fn send_input(&self, text: impl Into<String>) -> Result<(), DriverError> {
        self.command(Command::SendInput(text.into()))
    }

    /// Stop the running program and reconnect after the configured delay.
    ///
    /// # Errors
    /// Returns error if the driver has shut down.
    pub fn stop(&self) -> Result<(), DriverError> {
        self.command(Command::Stop)
    }

    /// Close the connection and end the driver task.
    ///
    /// # Errors
    /// Returns error if the driver has already shut down.
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.command(Command::Shutdown)
    }

    /// State after the most recent step.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver notified after every step.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the session state satisfies `predicate`.
    ///
    /// # Errors
    /// Returns error if the driver shuts down first.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionSnapshot, DriverError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        rx.wait_for(predicate)
            .await
            .map(|snapshot| *snapshot)
            .map_err(|_| DriverError::Closed)
    }
}

/// Spawn a disconnected session on the current runtime.
pub fn spawn<T, S>(config: &ClientConfig, transport: T, sink: S) -> (SessionHandle, JoinHandle<()>)
where
    T: Transport + 'static,
    S: PresentationSink + 'static,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let session = Session::new(config, transport, sink, events_tx);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

    let task = tokio::spawn(drive(session, events_rx, commands_rx, snapshot_tx));
    let handle = SessionHandle {
        commands: commands_tx,
        snapshot: snapshot_rx,
    };
    (handle, task)
}

async fn reconnect_due(pending: Option<PendingReconnect>) -> Ticket {
    match pending {
        Some(PendingReconnect { ticket, deadline }) => {
            sleep_until(deadline).await;
            ticket
        }
        None => std::future::pending().await,
    }
}

async fn drive<T, S>(
    mut session: Session<T, S>,
    mut events: TransportEventReceiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
) where
    T: Transport,
    S: PresentationSink,
{
    loop {
        let pending = session.pending_reconnect();
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Connect) => session.connect(),
                Some(Command::Run(source)) => {
                    session.run(&source);
                }
                Some(Command::SendInput(text)) => {
                    session.send_input(&text);
                }
                Some(Command::Stop) => {
                    session.stop();
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(event) = events.recv() => session.handle_transport_event(event),
            ticket = reconnect_due(pending) => {
                session.fire_reconnect(ticket);
            }
        }
        snapshot.send_replace(session.snapshot());
    }

    session.shutdown();
    snapshot.send_replace(session.snapshot());
    tracing::debug!("session driver stopped");
}
