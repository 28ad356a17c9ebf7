//! In-process transport backed by tokio channels.
//!
//! The client side implements [`Transport`]; the [`MemoryBackend`] side plays
//! the execution backend and is driven explicitly by tests and demos.

use std::sync::{Arc, Mutex, PoisonError};

use compile_cloud_core::{
    Connection, DecodeFailure, Endpoint, EventReporter, Generation, Inbound, Outbound, Transport,
    TransportError, codec,
};
use tokio::sync::mpsc;

/// Shared lifecycle of one link.
struct Link {
    reporter: EventReporter,
    client_closed: bool,
}

impl Link {
    fn lock(link: &Mutex<Self>) -> std::sync::MutexGuard<'_, Self> {
        link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client half of the in-process transport.
#[derive(Clone)]
pub struct MemoryTransport {
    incoming: mpsc::UnboundedSender<BackendPeer>,
}

impl MemoryTransport {
    /// Create a transport and the backend that accepts its connections.
    #[must_use]
    pub fn new() -> (Self, MemoryBackend) {
        let (incoming, peers) = mpsc::unbounded_channel();
        (Self { incoming }, MemoryBackend { peers })
    }
}

impl Transport for MemoryTransport {
    fn open(
        &self,
        endpoint: &Endpoint,
        reporter: EventReporter,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let generation = reporter.generation();
        let link = Arc::new(Mutex::new(Link {
            reporter,
            client_closed: false,
        }));
        let (to_backend, from_client) = mpsc::unbounded_channel();

        let peer = BackendPeer {
            generation,
            endpoint: endpoint.clone(),
            link: Arc::clone(&link),
            from_client,
        };
        self.incoming
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("backend is not listening".into()))?;

        tracing::debug!(generation, %endpoint, "memory connection requested");
        Ok(Box::new(MemoryConnection { link, to_backend }))
    }
}

struct MemoryConnection {
    link: Arc<Mutex<Link>>,
    to_backend: mpsc::UnboundedSender<String>,
}

impl Connection for MemoryConnection {
    fn send(&self, text: String) -> Result<(), TransportError> {
        let link = Link::lock(&self.link);
        if !link.reporter.is_open() || link.client_closed {
            return Err(TransportError::NotOpen);
        }
        self.to_backend
            .send(text)
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&self) {
        let mut link = Link::lock(&self.link);
        link.client_closed = true;
        link.reporter.closed();
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Backend half: receives connection attempts.
pub struct MemoryBackend {
    peers: mpsc::UnboundedReceiver<BackendPeer>,
}

impl MemoryBackend {
    /// Wait for the next connection attempt.
    pub async fn next_peer(&mut self) -> Option<BackendPeer> {
        self.peers.recv().await
    }

    /// Take a pending connection attempt without waiting.
    pub fn try_next_peer(&mut self) -> Option<BackendPeer> {
        self.peers.try_recv().ok()
    }
}

/// Backend view of one client connection.
pub struct BackendPeer {
    generation: Generation,
    endpoint: Endpoint,
    link: Arc<Mutex<Link>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl BackendPeer {
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Complete the handshake.
    pub fn accept(&self) {
        Link::lock(&self.link).reporter.opened();
    }

    /// Refuse the handshake.
    pub fn reject(&self, reason: &str) {
        Link::lock(&self.link).reporter.failed(reason);
    }

    /// Deliver one raw frame to the client.
    pub fn push_raw(&self, text: impl Into<String>) {
        Link::lock(&self.link).reporter.data(text);
    }

    /// Deliver one protocol message to the client.
    pub fn push(&self, message: &Inbound) {
        self.push_raw(codec::encode_inbound(message));
    }

    /// Close the connection from the backend side.
    pub fn close(&self) {
        Link::lock(&self.link).reporter.closed();
    }

    /// Fail the connection, as on a network error.
    pub fn fail(&self, reason: &str) {
        Link::lock(&self.link).reporter.failed(reason);
    }

    /// Whether the client closed its end.
    #[must_use]
    pub fn is_closed_by_client(&self) -> bool {
        Link::lock(&self.link).client_closed
    }

    /// Whether the link has ended, from either side.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        Link::lock(&self.link).reporter.is_terminated()
    }

    /// Wait for the next raw frame from the client.
    pub async fn recv_raw(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Take the next raw frame from the client without waiting.
    pub fn try_recv_raw(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Wait for the next decoded client message.
    pub async fn recv(&mut self) -> Option<Result<Outbound, DecodeFailure>> {
        self.recv_raw().await.map(|raw| codec::decode_outbound(&raw))
    }

    /// Take the next decoded client message without waiting.
    pub fn try_recv(&mut self) -> Option<Result<Outbound, DecodeFailure>> {
        self.try_recv_raw().map(|raw| codec::decode_outbound(&raw))
    }
}
