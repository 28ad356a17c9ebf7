//! WebSocket client transport.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use compile_cloud_core::{Connection, Endpoint, EventReporter, Transport, TransportError};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, client::IntoClientRequest, handshake::client::Request},
};

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

enum Command {
    Text(String),
    Close,
}

/// Transport opening one WebSocket per handle.
///
/// Each handle is driven by its own task on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        endpoint: &Endpoint,
        reporter: EventReporter,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::ConnectFailed(format!("no tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(CONNECTING));

        tracing::debug!(generation = reporter.generation(), %endpoint, "opening websocket");
        runtime.spawn(drive(request, reporter, rx, Arc::clone(&state)));

        Ok(Box::new(WebSocketConnection { tx, state }))
    }
}

struct WebSocketConnection {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<AtomicU8>,
}

impl Connection for WebSocketConnection {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.state.load(Ordering::Acquire) != OPEN {
            return Err(TransportError::NotOpen);
        }
        self.tx
            .send(Command::Text(text))
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&self) {
        if self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED {
            let _ = self.tx.send(Command::Close);
        }
    }
}

/// Resolves once closure is requested or the handle is dropped.
async fn close_requested(rx: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        if matches!(command, Command::Close) {
            return;
        }
    }
}

async fn drive(
    request: Request,
    mut reporter: EventReporter,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<AtomicU8>,
) {
    let generation = reporter.generation();

    let connected = tokio::select! {
        result = connect_async(request) => result,
        () = close_requested(&mut commands) => {
            tracing::debug!(generation, "websocket closed before handshake completed");
            reporter.closed();
            return;
        }
    };

    let mut stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(generation, "websocket connect failed: {e}");
            state.store(CLOSED, Ordering::Release);
            reporter.failed(e.to_string());
            return;
        }
    };

    if state
        .compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        let _ = stream.close(None).await;
        reporter.closed();
        return;
    }
    reporter.opened();
    tracing::debug!(generation, "websocket open");

    let (mut sink, mut source) = stream.split();

    let outcome: Result<(), String> = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break Err(e.to_string());
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => reporter.data(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => reporter.data(text),
                    Err(_) => tracing::trace!(generation, "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.to_string()),
            },
        }
    };

    state.store(CLOSED, Ordering::Release);
    match outcome {
        Ok(()) => {
            tracing::debug!(generation, "websocket closed");
            reporter.closed();
        }
        Err(reason) => {
            tracing::warn!(generation, "websocket error: {reason}");
            reporter.failed(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use compile_cloud_core::TransportEventKind;

    use super::*;

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        // Nothing listens on port 9 on loopback in test environments.
        let endpoint = Endpoint::parse("ws://127.0.0.1:9/terminal").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = WebSocketTransport::new()
            .open(&endpoint, EventReporter::new(1, tx))
            .unwrap();

        assert_eq!(conn.send("RUN:x".into()), Err(TransportError::NotOpen));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            TransportEventKind::Failed(_) | TransportEventKind::Closed
        ));
    }

    #[test]
    fn test_open_requires_runtime() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9/terminal").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WebSocketTransport::new().open(&endpoint, EventReporter::new(1, tx));
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
