//! Race-boundary state machine for one endpoint.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::storage::Store;
use crate::types::{Race, RaceEvent, RecordedSample, TelemetrySample};

/// Race clock (seconds) under which a regression can mean a new race.
///
/// Tuned against solo and multiplayer sessions. Manual rewinds and
/// multiplayer rejoins also rewind the clock, which is why
/// [`is_new_race`] additionally requires an unset last lap.
pub const NEW_RACE_CLOCK_THRESHOLD: f32 = 1.0;

/// Whether `sample` starts a new race on top of `race`.
///
/// The race clock starts at zero, so a clock that went backwards close to
/// zero usually means a restart. Rewinds and rejoins also move it backwards;
/// those are filtered out by requiring that no lap was completed yet. An
/// early-lap restart is therefore occasionally missed.
pub fn is_new_race(race: &Race, sample: &TelemetrySample) -> bool {
    sample.current_race_time < NEW_RACE_CLOCK_THRESHOLD
        && sample.current_race_time < race.race_time
        && sample.last_lap == 0.0
}

/// Processing state for one endpoint: the sample buffer and current race.
///
/// A `Session` is driven by exactly one task, so nothing here is shared.
/// Storage failures are logged and never stop ingestion; in-memory state
/// keeps advancing.
pub struct Session {
    id: Uuid,
    store: Arc<dyn Store>,
    events: broadcast::Sender<RaceEvent>,
    buffer: Vec<RecordedSample>,
    race: Option<Race>,
}

impl Session {
    /// Create a session with a buffer pre-sized to `buffer_capacity` samples.
    pub fn new(
        store: Arc<dyn Store>,
        events: broadcast::Sender<RaceEvent>,
        buffer_capacity: usize,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, "New session");
        Self { id, store, events, buffer: Vec::with_capacity(buffer_capacity), race: None }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The race currently open, if any.
    pub fn race(&self) -> Option<&Race> {
        self.race.as_ref()
    }

    /// Samples waiting for the next checkpoint.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Feed one sample through the state machine.
    pub async fn add(&mut self, sample: TelemetrySample) {
        if !sample.is_on_track() {
            self.pause().await;
            return;
        }

        // Grid and formation states report a zero lap time.
        if sample.current_lap == 0.0 {
            return;
        }

        let (boundary, paused) = match &self.race {
            Some(race) => (is_new_race(race, &sample), race.paused),
            None => (false, false),
        };

        if self.race.is_none() {
            self.open_race(&sample).await;
        } else if boundary {
            self.next_race(&sample).await;
        } else if paused {
            self.resume().await;
        }

        if let Some(race) = self.race.as_mut() {
            self.buffer.push(RecordedSample::new(sample, race.id, Utc::now()));
            race.race_time = sample.current_race_time;
        }
    }

    /// Flush buffered samples and race aggregates to storage.
    ///
    /// The buffer is cleared even when the sample insert fails, so memory
    /// stays bounded while storage is down.
    pub async fn checkpoint(&mut self) {
        let Some(last) = self.buffer.last().copied() else {
            return;
        };
        let Some(race) = self.race.as_mut() else {
            self.buffer.clear();
            return;
        };

        let start = Instant::now();
        race.update(&last.sample);
        let race = race.clone();

        self.save(std::slice::from_ref(&race), "checkpoint race").await;
        if let Err(e) = self.store.insert_samples(&race, &self.buffer).await {
            error!(
                session = %self.id,
                race = %race.id,
                samples = self.buffer.len(),
                error = %e,
                "Failed to insert samples, dropping them"
            );
        }

        let flushed = self.buffer.len();
        self.buffer.clear();
        debug!(
            session = %self.id,
            race = %race.id,
            samples = flushed,
            capacity = self.buffer.capacity(),
            duration = ?start.elapsed(),
            "Checkpoint"
        );
    }

    /// Flush and finish the open race, if any.
    pub async fn close(&mut self) {
        info!(session = %self.id, "Closing session");
        if self.race.is_none() {
            return;
        }

        self.checkpoint().await;
        let Some(race) = self.race.take() else {
            return;
        };
        let finished = self.finish(race).await;
        self.save(std::slice::from_ref(&finished), "finish race").await;
        info!(session = %self.id, race = %finished.id, "Finished race");
        self.publish(RaceEvent::Finished(finished));
    }

    async fn open_race(&mut self, sample: &TelemetrySample) {
        let race = Race::start(sample, self.id);
        info!(session = %self.id, race = %race.id, track = race.track, car = race.car, "New race");
        self.save(std::slice::from_ref(&race), "start race").await;
        self.publish(RaceEvent::Started(race.clone()));
        self.race = Some(race);
    }

    async fn next_race(&mut self, sample: &TelemetrySample) {
        self.checkpoint().await;
        let Some(current) = self.race.take() else {
            return;
        };

        let finished = self.finish(current).await;
        let next = Race::start(sample, self.id);
        info!(session = %self.id, race = %finished.id, next = %next.id, "Finished race, new race");

        self.save(&[finished.clone(), next.clone()], "finish race and start next").await;
        self.publish(RaceEvent::Finished(finished));
        self.publish(RaceEvent::Started(next.clone()));
        self.race = Some(next);
    }

    async fn pause(&mut self) {
        match &self.race {
            Some(race) if !race.paused => {
                info!(session = %self.id, race = %race.id, "Pausing race");
            }
            _ => return,
        }

        self.checkpoint().await;
        let Some(race) = self.race.as_mut() else {
            return;
        };
        race.paused = true;
        let race = race.clone();
        self.save(std::slice::from_ref(&race), "pause race").await;
        self.publish(RaceEvent::Paused(race));
    }

    async fn resume(&mut self) {
        let Some(race) = self.race.as_mut() else {
            return;
        };
        info!(session = %self.id, race = %race.id, "Resuming race");
        race.paused = false;
        let race = race.clone();
        self.save(std::slice::from_ref(&race), "resume race").await;
        self.publish(RaceEvent::Resumed(race));
    }

    /// Close `race` with the aggregates of its last persisted sample.
    async fn finish(&self, mut race: Race) -> Race {
        match self.store.select_last_sample(race.id).await {
            Ok(last) => race.finish(&last),
            Err(e) if e.is_not_found() => {
                debug!(session = %self.id, race = %race.id, "No persisted samples for race");
                race.finish_now();
            }
            Err(e) => {
                error!(session = %self.id, race = %race.id, error = %e, "Failed to read last sample of race");
                race.finish_now();
            }
        }
        race
    }

    async fn save(&self, races: &[Race], action: &'static str) {
        if let Err(e) = self.store.upsert_races(races).await {
            error!(session = %self.id, action, races = races.len(), error = %e, "Failed to upsert race");
        }
    }

    fn publish(&self, event: RaceEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}
