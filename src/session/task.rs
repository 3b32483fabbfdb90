//! The task owning one session: queue consumer, checkpoint ticker and idle
//! detection.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionTable;
use super::state::Session;
use crate::types::TelemetrySample;

/// Everything a session task needs, moved into the spawned future.
pub(crate) struct SessionTask {
    pub(crate) endpoint: String,
    pub(crate) session: Session,
    pub(crate) samples: mpsc::Receiver<TelemetrySample>,
    pub(crate) close: CancellationToken,
    pub(crate) table: SessionTable,
    pub(crate) checkpoint_interval: Duration,
}

impl SessionTask {
    /// Consume samples until shutdown or an idle checkpoint interval.
    ///
    /// The session unregisters itself before the close sequence runs, so a
    /// datagram arriving from the same endpoint meanwhile opens a new session.
    pub(crate) async fn run(mut self) {
        let interval = self.checkpoint_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut received = false;
        let mut processed = 0u64;

        loop {
            tokio::select! {
                _ = self.close.cancelled() => {
                    debug!(endpoint = %self.endpoint, "Session closed by listener");
                    break;
                }
                sample = self.samples.recv() => match sample {
                    Some(sample) => {
                        received = true;
                        processed += 1;
                        self.session.add(sample).await;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !received {
                        info!(endpoint = %self.endpoint, session = %self.session.id(), "Session idle");
                        break;
                    }
                    self.session.checkpoint().await;
                    received = false;
                }
            }
        }

        let id = self.session.id();
        self.table.remove_if(&self.endpoint, |_, handle| handle.session_id == id);

        // Whatever was queued before the queue closed still belongs to this session.
        self.samples.close();
        while let Ok(sample) = self.samples.try_recv() {
            processed += 1;
            self.session.add(sample).await;
        }

        self.session.close().await;
        info!(endpoint = %self.endpoint, session = %id, samples = processed, "Session ended");
    }
}
