//! Broadcast + history store for session events.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{PresentationSink, SessionEvent};

/// Default history size limit (8 MB).
const HISTORY_BYTES: usize = 8 * 1024 * 1024;

/// Live channel capacity.
const CHANNEL_CAPACITY: usize = 10_000;

#[derive(Clone)]
struct StoredEvent {
    event: SessionEvent,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredEvent>,
    total_bytes: usize,
}

/// Presentation sink with broadcast and history support.
///
/// A view that attaches late receives the history first, then switches to
/// live events without gaps.
pub struct EventStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SessionEvent>,
    limit_bytes: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    /// Create a new event store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(HISTORY_BYTES)
    }

    /// Create a store keeping at most `limit_bytes` of history.
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
            limit_bytes,
        }
    }

    /// Push an event to both live listeners and history.
    pub fn push(&self, event: SessionEvent) {
        let bytes = event.approx_bytes();
        // Hold the write lock across the broadcast so history and live order agree.
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let _ = self.sender.send(event.clone());

        while inner.total_bytes.saturating_add(bytes) > self.limit_bytes {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredEvent { event, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<SessionEvent> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .map(|s| s.event.clone())
            .collect()
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        let (history, rx) = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let history: Vec<SessionEvent> =
                inner.history.iter().map(|s| s.event.clone()).collect();
            (history, self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}

impl PresentationSink for EventStore {
    fn emit(&self, event: SessionEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{RunOutcome, Status};

    #[test]
    fn test_history_keeps_order() {
        let store = EventStore::new();
        store.emit(SessionEvent::status(Status::CONNECTING));
        store.emit(SessionEvent::status(Status::IDLE));
        assert_eq!(
            store.get_history(),
            vec![
                SessionEvent::status(Status::CONNECTING),
                SessionEvent::status(Status::IDLE)
            ]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let store = EventStore::with_limit(100);
        for _ in 0..10 {
            store.push(SessionEvent::OutputAppended {
                chunk: "x".repeat(40),
            });
        }
        let history = store.get_history();
        assert!(history.len() < 10);
        assert!(!history.is_empty());
    }

    #[tokio::test]
    async fn test_history_plus_stream_history_then_live() {
        let store = EventStore::new();
        store.push(SessionEvent::RunStarted);
        store.push(SessionEvent::OutputAppended { chunk: "a".into() });

        let mut stream = store.history_plus_stream();

        store.push(SessionEvent::RunEnded {
            outcome: RunOutcome::Success,
        });

        assert_eq!(stream.next().await, Some(SessionEvent::RunStarted));
        assert_eq!(
            stream.next().await,
            Some(SessionEvent::OutputAppended { chunk: "a".into() })
        );
        assert_eq!(
            stream.next().await,
            Some(SessionEvent::RunEnded {
                outcome: RunOutcome::Success
            })
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_live_events_once() {
        let store = std::sync::Arc::new(EventStore::new());
        store.push(SessionEvent::notice("first"));

        let stream = store.history_plus_stream();
        store.push(SessionEvent::notice("second"));
        drop(store);

        let events: Vec<SessionEvent> = stream.collect().await;
        assert_eq!(
            events,
            vec![SessionEvent::notice("first"), SessionEvent::notice("second")]
        );
    }
}
