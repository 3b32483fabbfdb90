//! In-process storage backend.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StorageResult, Store, latest_sample, sort_newest_first};
use crate::StorageError;
use crate::types::{Race, RecordedSample};

/// Keeps races and samples in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    races: RwLock<HashMap<Uuid, Race>>,
    samples: RwLock<HashMap<Uuid, Vec<RecordedSample>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of races stored.
    pub async fn race_count(&self) -> usize {
        self.races.read().await.len()
    }

    /// Number of samples stored across all races.
    pub async fn sample_count(&self) -> usize {
        self.samples.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_samples(&self, race: &Race, samples: &[RecordedSample]) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.samples.write().await.entry(race.id).or_default().extend_from_slice(samples);
        Ok(())
    }

    async fn upsert_races(&self, races: &[Race]) -> StorageResult<()> {
        let mut stored = self.races.write().await;
        for race in races {
            stored
                .entry(race.id)
                .and_modify(|existing| existing.merge_mutable(race))
                .or_insert_with(|| race.clone());
        }
        Ok(())
    }

    async fn select_last_sample(&self, race_id: Uuid) -> StorageResult<RecordedSample> {
        let samples = self.samples.read().await;
        samples
            .get(&race_id)
            .and_then(|samples| latest_sample(samples))
            .copied()
            .ok_or(StorageError::NotFound { race_id })
    }

    async fn select_race(&self, race_id: Uuid) -> StorageResult<Option<Race>> {
        Ok(self.races.read().await.get(&race_id).cloned())
    }

    async fn select_races(&self) -> StorageResult<Vec<Race>> {
        let mut races: Vec<Race> = self.races.read().await.values().cloned().collect();
        sort_newest_first(&mut races);
        Ok(races)
    }

    async fn select_samples(&self, race_id: Uuid) -> StorageResult<Vec<RecordedSample>> {
        Ok(self.samples.read().await.get(&race_id).cloned().unwrap_or_default())
    }
}
