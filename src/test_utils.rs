//! Test utilities shared by unit tests and benchmarks.
//!
//! Sample builders produce realistic values so decoded, stored and
//! aggregated fields are all distinguishable. The store wrappers count or
//! break writes to observe what a session persists.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::StorageError;
use crate::packet;
use crate::storage::{MemoryStore, StorageResult, Store};
use crate::types::{Corners, Race, RecordedSample, TelemetrySample, Vec3};

fn corners<T: Copy>(front_left: T, front_right: T, rear_left: T, rear_right: T) -> Corners<T> {
    Corners { front_left, front_right, rear_left, rear_right }
}

/// A sample with every field populated.
///
/// `is_race_on` is taken as-is so callers can build on-track and off-track
/// variants. The race clock is zero and no lap is completed yet.
pub fn full_sample(is_race_on: i32) -> TelemetrySample {
    TelemetrySample {
        is_race_on,
        timestamp_ms: 1000,
        engine_max_rpm: 8500.0,
        engine_idle_rpm: 900.0,
        engine_current_rpm: 6150.25,
        acceleration: Vec3 { x: 0.5, y: -0.25, z: 3.75 },
        velocity: Vec3 { x: 1.5, y: 0.0, z: 42.0 },
        angular_velocity: Vec3 { x: 0.01, y: -0.02, z: 0.03 },
        yaw: 1.25,
        pitch: -0.05,
        roll: 0.02,
        normalized_suspension_travel: corners(0.4, 0.41, 0.52, 0.53),
        tire_slip_ratio: corners(0.01, 0.02, 0.05, 0.06),
        wheel_rotation_speed: corners(120.0, 121.0, 125.5, 126.5),
        wheel_on_rumble_strip: corners(0, 1, 0, 1),
        wheel_in_puddle_depth: corners(0.0, 0.0, 0.25, 0.0),
        surface_rumble: corners(0.1, 0.2, 0.3, 0.4),
        tire_slip_angle: corners(0.03, 0.04, 0.07, 0.08),
        tire_combined_slip: corners(0.05, 0.06, 0.09, 0.1),
        suspension_travel_meters: corners(0.08, 0.081, 0.09, 0.091),
        car_ordinal: 2352,
        car_class: 3,
        car_performance_index: 100,
        drivetrain_type: 1,
        num_cylinders: 8,
        position: Vec3 { x: -512.5, y: 12.0, z: 1024.75 },
        speed: 42.5,
        power: 310_000.0,
        torque: 540.0,
        tire_temp: corners(180.0, 181.0, 185.0, 185.0),
        boost: 14.5,
        fuel: 0.85,
        distance_traveled: 1500.0,
        best_lap: 0.0,
        last_lap: 0.0,
        current_lap: 1.1,
        current_race_time: 0.0,
        lap_number: 2,
        race_position: 4,
        accel: 255,
        brake: 0,
        clutch: 0,
        hand_brake: 0,
        gear: 4,
        steer: -12,
        normalized_driving_line: 5,
        normalized_ai_brake_difference: -3,
        tire_wear: corners(0.1, 0.11, 0.15, 0.16),
        track_ordinal: 510,
    }
}

/// An on-track sample at the given lap and race clock.
pub fn driving(current_lap: f32, current_race_time: f32) -> TelemetrySample {
    TelemetrySample { current_lap, current_race_time, ..full_sample(1) }
}

/// An off-track sample at the given race clock.
pub fn parked(current_race_time: f32) -> TelemetrySample {
    TelemetrySample { current_race_time, ..full_sample(0) }
}

/// Record a full sample against `race`.
pub fn recorded(race: &Race, created_at: DateTime<Utc>) -> RecordedSample {
    RecordedSample::new(full_sample(1), race.id, created_at)
}

/// Wire bytes of a full on-track sample.
pub fn sample_packet() -> Vec<u8> {
    packet::encode(&full_sample(1))
}

/// Memory store that counts write calls.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    race_writes: AtomicUsize,
    sample_writes: AtomicUsize,
}

impl CountingStore {
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Calls to `upsert_races`.
    pub fn race_writes(&self) -> usize {
        self.race_writes.load(Ordering::SeqCst)
    }

    /// Calls to `insert_samples`.
    pub fn sample_writes(&self) -> usize {
        self.sample_writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Store for CountingStore {
    async fn insert_samples(&self, race: &Race, samples: &[RecordedSample]) -> StorageResult<()> {
        self.sample_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_samples(race, samples).await
    }

    async fn upsert_races(&self, races: &[Race]) -> StorageResult<()> {
        self.race_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_races(races).await
    }

    async fn select_last_sample(&self, race_id: Uuid) -> StorageResult<RecordedSample> {
        self.inner.select_last_sample(race_id).await
    }

    async fn select_race(&self, race_id: Uuid) -> StorageResult<Option<Race>> {
        self.inner.select_race(race_id).await
    }

    async fn select_races(&self) -> StorageResult<Vec<Race>> {
        self.inner.select_races().await
    }

    async fn select_samples(&self, race_id: Uuid) -> StorageResult<Vec<RecordedSample>> {
        self.inner.select_samples(race_id).await
    }
}

/// Store whose every call fails with an I/O error.
#[derive(Debug, Default)]
pub struct FailingStore;

impl FailingStore {
    fn error() -> StorageError {
        StorageError::io("/unavailable", std::io::Error::other("storage unavailable"))
    }
}

#[async_trait::async_trait]
impl Store for FailingStore {
    async fn insert_samples(&self, _race: &Race, _samples: &[RecordedSample]) -> StorageResult<()> {
        Err(Self::error())
    }

    async fn upsert_races(&self, _races: &[Race]) -> StorageResult<()> {
        Err(Self::error())
    }

    async fn select_last_sample(&self, _race_id: Uuid) -> StorageResult<RecordedSample> {
        Err(Self::error())
    }

    async fn select_race(&self, _race_id: Uuid) -> StorageResult<Option<Race>> {
        Err(Self::error())
    }

    async fn select_races(&self) -> StorageResult<Vec<Race>> {
        Err(Self::error())
    }

    async fn select_samples(&self, _race_id: Uuid) -> StorageResult<Vec<RecordedSample>> {
        Err(Self::error())
    }
}

/// Memory store that sleeps before every write.
#[derive(Debug)]
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self { inner: MemoryStore::new(), delay }
    }
}

#[async_trait::async_trait]
impl Store for SlowStore {
    async fn insert_samples(&self, race: &Race, samples: &[RecordedSample]) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_samples(race, samples).await
    }

    async fn upsert_races(&self, races: &[Race]) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert_races(races).await
    }

    async fn select_last_sample(&self, race_id: Uuid) -> StorageResult<RecordedSample> {
        self.inner.select_last_sample(race_id).await
    }

    async fn select_race(&self, race_id: Uuid) -> StorageResult<Option<Race>> {
        self.inner.select_race(race_id).await
    }

    async fn select_races(&self) -> StorageResult<Vec<Race>> {
        self.inner.select_races().await
    }

    async fn select_samples(&self, race_id: Uuid) -> StorageResult<Vec<RecordedSample>> {
        self.inner.select_samples(race_id).await
    }
}
