//! Race aggregates and lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RecordedSample, TelemetrySample};

/// A driving activity bounded by a start and a finish.
///
/// Identity and car/track fields are fixed when the race starts. Only the
/// fields copied by [`Race::merge_mutable`] change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub id: Uuid,
    pub session_id: Uuid,

    pub paused: bool,
    pub in_progress: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub car: i32,
    pub car_class: i32,
    pub car_performance_index: i32,
    pub track: i32,

    pub best_lap: f32,
    pub race_time: f32,
    pub position: u8,
    pub distance_traveled: f32,
}

impl Race {
    /// Open a race from the sample that started it.
    pub fn start(sample: &TelemetrySample, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            paused: !sample.is_on_track(),
            in_progress: true,
            started_at: Utc::now(),
            finished_at: None,
            car: sample.car_ordinal,
            car_class: sample.car_class,
            car_performance_index: sample.car_performance_index,
            track: sample.track_ordinal,
            best_lap: 0.0,
            race_time: 0.0,
            position: 0,
            distance_traveled: 0.0,
        }
    }

    /// Refresh the running aggregates from a sample.
    pub fn update(&mut self, sample: &TelemetrySample) {
        self.best_lap = sample.best_lap;
        self.race_time = sample.current_race_time;
        self.position = sample.race_position;
        self.distance_traveled = sample.distance_traveled;
    }

    /// Close the race using its last persisted sample.
    pub fn finish(&mut self, last: &RecordedSample) {
        self.update(&last.sample);
        self.in_progress = false;
        self.finished_at = Some(last.created_at);
    }

    /// Close the race when nothing was ever persisted for it.
    pub fn finish_now(&mut self) {
        self.in_progress = false;
        self.finished_at = Some(Utc::now());
    }

    /// Copy the fields an upsert is allowed to change.
    pub fn merge_mutable(&mut self, other: &Race) {
        self.paused = other.paused;
        self.in_progress = other.in_progress;
        self.finished_at = other.finished_at;
        self.best_lap = other.best_lap;
        self.race_time = other.race_time;
        self.position = other.position;
        self.distance_traveled = other.distance_traveled;
    }
}

/// Race lifecycle notifications published by sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "event", content = "race", rename_all = "camelCase")]
pub enum RaceEvent {
    Started(Race),
    Paused(Race),
    Resumed(Race),
    Finished(Race),
}

impl RaceEvent {
    pub fn race(&self) -> &Race {
        match self {
            RaceEvent::Started(race)
            | RaceEvent::Paused(race)
            | RaceEvent::Resumed(race)
            | RaceEvent::Finished(race) => race,
        }
    }
}
