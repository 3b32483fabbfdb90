//! Endpoint to session routing.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::Session;
use super::task::SessionTask;
use crate::config::ServerConfig;
use crate::storage::Store;
use crate::types::{RaceEvent, TelemetrySample};

/// Live sessions keyed by endpoint (`ip:port`).
pub(crate) type SessionTable = Arc<DashMap<String, SessionHandle>>;

/// What the registry keeps for a live session.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub(crate) session_id: Uuid,
    pub(crate) samples: mpsc::Sender<TelemetrySample>,
    pub(crate) close: CancellationToken,
}

/// Routes samples to per-endpoint sessions, creating them on first contact.
///
/// Exactly one session exists per endpoint at any time, even when datagrams
/// from the same endpoint are routed concurrently. Session tasks are tracked
/// so shutdown can wait for every close sequence to finish.
pub struct Registry {
    sessions: SessionTable,
    store: Arc<dyn Store>,
    events: broadcast::Sender<RaceEvent>,
    tracker: TaskTracker,
    closed: AtomicBool,
    checkpoint_interval: Duration,
    queue_capacity: usize,
    buffer_capacity: usize,
}

impl Registry {
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn Store>,
        events: broadcast::Sender<RaceEvent>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            store,
            events,
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
            checkpoint_interval: config.checkpoint_interval,
            queue_capacity: config.queue_capacity,
            buffer_capacity: config.buffer_capacity,
        }
    }

    /// Hand `sample` to the session for `endpoint` without blocking.
    ///
    /// Returns `false` when the sample was dropped: the session queue is
    /// full, the session is shutting down, or the registry is closed.
    /// Must be called from within a tokio runtime.
    pub fn route(&self, endpoint: &str, sample: TelemetrySample) -> bool {
        let existing = self.sessions.get(endpoint).map(|handle| handle.samples.clone());
        let sender = match existing {
            Some(sender) => sender,
            None => match self.open(endpoint) {
                Some(sender) => sender,
                None => return false,
            },
        };

        match sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(endpoint, "Session queue full, dropping sample");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(endpoint, "Session closing, dropping sample");
                false
            }
        }
    }

    /// Insert-if-absent under the shard lock; only the winner spawns a task.
    fn open(&self, endpoint: &str) -> Option<mpsc::Sender<TelemetrySample>> {
        match self.sessions.entry(endpoint.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().samples.clone()),
            Entry::Vacant(entry) => {
                // Checked under the lock so close_all cannot miss this session.
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }

                let session = Session::new(self.store.clone(), self.events.clone(), self.buffer_capacity);
                let (tx, rx) = mpsc::channel(self.queue_capacity);
                let close = CancellationToken::new();
                debug!(endpoint, session = %session.id(), "Opening session");

                entry.insert(SessionHandle {
                    session_id: session.id(),
                    samples: tx.clone(),
                    close: close.clone(),
                });

                let task = SessionTask {
                    endpoint: endpoint.to_string(),
                    session,
                    samples: rx,
                    close,
                    table: self.sessions.clone(),
                    checkpoint_interval: self.checkpoint_interval,
                };
                self.tracker.spawn(task.run());
                Some(tx)
            }
        }
    }

    /// Endpoints with a live session.
    pub fn endpoints(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session tasks still running, including ones already unregistered
    /// but still flushing.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Refuse new sessions and tell every live session to close.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for entry in self.sessions.iter() {
            entry.value().close.cancel();
        }
        self.tracker.close();
    }

    /// Resolves once every session task has finished its close sequence.
    ///
    /// Only resolves after [`close_all`](Self::close_all).
    pub async fn wait_closed(&self) {
        self.tracker.wait().await;
    }

    /// Accept sessions again after a [`close_all`](Self::close_all).
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_utils::{driving, parked};

    fn registry(store: Arc<dyn Store>, interval: Duration, queue_capacity: usize) -> Registry {
        let (events, _) = broadcast::channel(64);
        let config = ServerConfig {
            checkpoint_interval: interval,
            queue_capacity,
            ..ServerConfig::default()
        };
        Registry::new(&config, store, events)
    }

    #[tokio::test]
    async fn one_session_per_endpoint() {
        let registry = registry(Arc::new(MemoryStore::new()), Duration::from_secs(5), 8);

        assert!(registry.route("10.0.0.1:1000", driving(1.0, 1.0)));
        assert!(registry.route("10.0.0.1:1000", driving(1.0, 2.0)));
        assert!(registry.route("10.0.0.2:1000", driving(1.0, 1.0)));

        let mut endpoints = registry.endpoints();
        endpoints.sort();
        assert_eq!(endpoints, vec!["10.0.0.1:1000", "10.0.0.2:1000"]);
        assert_eq!(registry.pending(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_samples() {
        // The session task cannot run until this test yields.
        let registry = registry(Arc::new(MemoryStore::new()), Duration::from_secs(5), 1);

        assert!(registry.route("10.0.0.1:1000", driving(1.0, 1.0)));
        assert!(!registry.route("10.0.0.1:1000", driving(1.0, 2.0)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_contact_creates_one_session() {
        let registry = Arc::new(registry(Arc::new(MemoryStore::new()), Duration::from_secs(5), 64));

        let routes: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.route("10.0.0.1:1000", driving(1.0, i as f32 + 1.0)) })
            })
            .collect();
        for route in routes {
            route.await.unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_removed_and_finalized() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone(), Duration::from_millis(500), 8);

        registry.route("10.0.0.1:1000", driving(1.0, 1.0));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(store.sample_count().await, 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(registry.is_empty());
        let races = store.select_races().await.unwrap();
        assert_eq!(races.len(), 1);
        assert!(!races[0].in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_returning_after_idle_gets_new_session() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone(), Duration::from_millis(500), 8);

        registry.route("10.0.0.1:1000", parked(1.0));
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(registry.is_empty());

        assert!(registry.route("10.0.0.1:1000", driving(1.0, 1.0)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_all_waits_for_sessions_and_refuses_new_ones() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone(), Duration::from_secs(5), 8);
        registry.route("10.0.0.1:1000", driving(1.0, 1.0));
        registry.route("10.0.0.2:1000", driving(1.0, 1.0));

        registry.close_all();
        tokio::time::timeout(Duration::from_secs(5), registry.wait_closed()).await.unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.pending(), 0);
        assert!(!registry.route("10.0.0.3:1000", driving(1.0, 1.0)));
        let races = store.select_races().await.unwrap();
        assert_eq!(races.len(), 2);
        assert!(races.iter().all(|race| !race.in_progress));

        registry.reopen();
        assert!(registry.route("10.0.0.3:1000", driving(1.0, 1.0)));
    }
}
