//! UDP listener for Forza "Data Out" telemetry.
//!
//! One [`Server`] binds a single socket and demultiplexes datagrams by
//! sender endpoint into sessions (see [`crate::session`]). The receive loop
//! never waits on a session: a slow session loses samples rather than
//! stalling every other endpoint.
//!
//! ```rust,no_run
//! use forza_telemetry::{Server, ServerConfig, storage::MemoryStore};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> forza_telemetry::Result<()> {
//! let config = ServerConfig::new("0.0.0.0:8000", Duration::from_secs(5));
//! let server = Arc::new(Server::new(config, Arc::new(MemoryStore::new())));
//!
//! let listener = server.clone();
//! tokio::spawn(async move { listener.listen_and_process().await });
//!
//! // ... later
//! server.shutdown(Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{DEFAULT_LISTEN_ADDR, ServerConfig};
use crate::packet::{self, MAX_PACKET_SIZE};
use crate::session::Registry;
use crate::storage::Store;
use crate::types::RaceEvent;
use crate::{Result, TelemetryError};

/// Race events buffered per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

enum State {
    Stopped,
    /// Claimed by one caller while it binds.
    Starting { cancel: CancellationToken },
    Listening { addr: SocketAddr, cancel: CancellationToken },
}

/// Telemetry ingestion server.
///
/// Share it behind an [`Arc`]: one task runs
/// [`listen_and_process`](Self::listen_and_process) while others query it or
/// call [`shutdown`](Self::shutdown).
pub struct Server {
    config: ServerConfig,
    registry: Registry,
    events: broadcast::Sender<RaceEvent>,
    state: Mutex<State>,
}

impl Server {
    /// Create a stopped server. Nothing is bound until
    /// [`listen_and_process`](Self::listen_and_process).
    pub fn new(mut config: ServerConfig, store: Arc<dyn Store>) -> Self {
        if config.listen_addr.trim().is_empty() {
            config.listen_addr = DEFAULT_LISTEN_ADDR.to_string();
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let registry = Registry::new(&config, store, events.clone());
        Self { config, registry, events, state: Mutex::new(State::Stopped) }
    }

    /// Bind the socket and process datagrams until shut down.
    ///
    /// Returns [`TelemetryError::AlreadyRunning`] if this server is already
    /// listening or binding, and [`TelemetryError::Bind`] if the socket
    /// cannot be bound.
    /// Otherwise it only returns once the receive loop has ended, always
    /// with [`TelemetryError::ServerClosed`].
    pub async fn listen_and_process(&self) -> Result<()> {
        let (socket, cancel) = self.listen().await?;
        self.process(socket, cancel).await;
        Err(TelemetryError::ServerClosed)
    }

    async fn listen(&self) -> Result<(UdpSocket, CancellationToken)> {
        let cancel = {
            let mut state = self.lock_state();
            if !matches!(*state, State::Stopped) {
                return Err(TelemetryError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            *state = State::Starting { cancel: cancel.clone() };
            cancel
        };

        let listen_addr = &self.config.listen_addr;
        let bound = UdpSocket::bind(listen_addr)
            .await
            .and_then(|socket| socket.local_addr().map(|addr| (socket, addr)));

        let mut state = self.lock_state();
        if cancel.is_cancelled() {
            // Shut down while binding; the state already belongs to someone else.
            debug!("Shut down before the socket was bound");
            return Err(TelemetryError::ServerClosed);
        }
        let (socket, addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                *state = State::Stopped;
                return Err(TelemetryError::bind_failed(listen_addr.as_str(), e));
            }
        };
        *state = State::Listening { addr, cancel: cancel.clone() };
        self.registry.reopen();

        info!(%addr, interval = ?self.config.checkpoint_interval, "Listening for telemetry");
        Ok((socket, cancel))
    }

    async fn process(&self, socket: UdpSocket, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut datagrams = 0u64;

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Receive loop cancelled");
                    break;
                }
                received = socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    datagrams += 1;
                    self.handle_datagram(&buf[..len], peer);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from telemetry socket, stopping receive loop");
                    break;
                }
            }
        }

        info!(datagrams, "Telemetry receive loop ended");
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        let sample = match packet::decode(datagram) {
            Ok(sample) => sample,
            Err(e) => {
                trace!(%peer, len = datagram.len(), error = %e, "Dropping undecodable datagram");
                return;
            }
        };

        // Menus and pause screens send packets with a zero timestamp.
        if !sample.has_timestamp() {
            debug!(%peer, "Dropping sample without timestamp");
            return;
        }

        self.registry.route(&peer.to_string(), sample);
    }

    /// Stop receiving, close every session and wait for them to finish.
    ///
    /// Sessions flush and finish their open races before this resolves. If
    /// they are not done within `deadline`, returns
    /// [`TelemetryError::ShutdownTimeout`]; the remaining sessions keep
    /// closing in the background. Shutting down a stopped server is a no-op.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lock_state(), State::Stopped);
        let cancel = match previous {
            State::Stopped => return Ok(()),
            State::Starting { cancel } => {
                // Nothing bound yet and no sessions; the binding caller sees the cancel.
                cancel.cancel();
                return Ok(());
            }
            State::Listening { cancel, addr } => {
                info!(%addr, sessions = self.registry.len(), "Shutting down telemetry listener");
                cancel
            }
        };

        cancel.cancel();
        self.registry.close_all();

        match tokio::time::timeout(deadline, self.registry.wait_closed()).await {
            Ok(()) => {
                info!("All sessions closed");
                Ok(())
            }
            Err(_) => {
                let pending = self.registry.pending();
                warn!(pending, ?deadline, "Sessions still closing after shutdown deadline");
                Err(TelemetryError::ShutdownTimeout { duration: deadline, pending })
            }
        }
    }

    /// Whether the socket is bound and the server has not been shut down.
    pub fn running(&self) -> bool {
        matches!(*self.lock_state(), State::Listening { .. })
    }

    /// The bound socket address, `None` while stopped.
    pub fn addr(&self) -> Option<SocketAddr> {
        match *self.lock_state() {
            State::Listening { addr, .. } => Some(addr),
            State::Stopped | State::Starting { .. } => None,
        }
    }

    /// Endpoints that currently have a live session.
    pub fn listeners(&self) -> Vec<String> {
        self.registry.endpoints()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Race lifecycle events from every session.
    ///
    /// Only events published after subscribing are delivered. A subscriber
    /// that falls too far behind skips the events it missed.
    pub fn race_events(&self) -> impl Stream<Item = RaceEvent> + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move { event.ok() })
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
