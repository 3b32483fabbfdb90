//! Storage collaborator for sessions.
//!
//! Sessions only ever call the three write-side methods
//! ([`insert_samples`](Store::insert_samples), [`upsert_races`](Store::upsert_races),
//! [`select_last_sample`](Store::select_last_sample)). The remaining query
//! methods serve presentation code and tests.

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::StorageError;
use crate::config::StorageConfig;
use crate::types::{Lap, Race, RecordedSample};

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Trait for race and sample persistence backends.
///
/// Backends are shared by every live session and must tolerate concurrent
/// calls. Writes from a single session arrive in that session's order.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Append recorded samples belonging to `race`.
    async fn insert_samples(&self, race: &Race, samples: &[RecordedSample]) -> StorageResult<()>;

    /// Insert races, or update the mutable fields of races already stored.
    ///
    /// Identity, car, track and start time of an existing race are never
    /// overwritten (see [`Race::merge_mutable`]).
    async fn upsert_races(&self, races: &[Race]) -> StorageResult<()>;

    /// The most recent sample of a race.
    ///
    /// Returns [`StorageError::NotFound`] when no sample was stored yet.
    async fn select_last_sample(&self, race_id: Uuid) -> StorageResult<RecordedSample>;

    /// A single race by identifier.
    async fn select_race(&self, race_id: Uuid) -> StorageResult<Option<Race>>;

    /// All races, most recently started first.
    async fn select_races(&self) -> StorageResult<Vec<Race>>;

    /// Samples of a race in receipt order.
    async fn select_samples(&self, race_id: Uuid) -> StorageResult<Vec<RecordedSample>>;

    /// Last-known sample of every lap of a race.
    async fn select_laps(&self, race_id: Uuid) -> StorageResult<BTreeMap<u16, Lap>> {
        let samples = self.select_samples(race_id).await?;
        Ok(Lap::collect(&samples))
    }
}

/// Build the backend described by a [`StorageConfig`].
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn Store>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageConfig::Jsonl { data_dir } => Ok(Arc::new(JsonlStore::open(data_dir).await?)),
    }
}

/// Order races most recently started first.
fn sort_newest_first(races: &mut [Race]) {
    races.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

/// Pick the sample with the greatest `created_at`, later entries winning ties.
fn latest_sample<'a, I>(samples: I) -> Option<&'a RecordedSample>
where
    I: IntoIterator<Item = &'a RecordedSample>,
{
    samples.into_iter().fold(None, |latest, candidate| match latest {
        Some(current) if current.created_at > candidate.created_at => Some(current),
        _ => Some(candidate),
    })
}
