//! Directory-backed storage using JSON files.
//!
//! Layout under the data directory:
//!
//! ```text
//! races.json               every race, rewritten on each upsert
//! samples/<race id>.jsonl  one recorded sample per line, append only
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{StorageResult, Store, latest_sample, sort_newest_first};
use crate::StorageError;
use crate::types::{Race, RecordedSample};

const RACES_FILE: &str = "races.json";
const SAMPLES_DIR: &str = "samples";

/// Durable store writing JSON documents under a directory.
#[derive(Debug)]
pub struct JsonlStore {
    root: PathBuf,
    races: RwLock<HashMap<Uuid, Race>>,
}

impl JsonlStore {
    /// Open (or create) a data directory and load its race index.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let samples_dir = root.join(SAMPLES_DIR);
        fs::create_dir_all(&samples_dir).await.map_err(|e| StorageError::io(&samples_dir, e))?;

        let races_path = root.join(RACES_FILE);
        let races: Vec<Race> = match fs::read(&races_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Serialization { context: races_path.display().to_string(), source: e }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::io(&races_path, e)),
        };

        info!(root = %root.display(), races = races.len(), "Opened JSON data directory");

        Ok(Self { root, races: RwLock::new(races.into_iter().map(|r| (r.id, r)).collect()) })
    }

    /// The data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn samples_path(&self, race_id: Uuid) -> PathBuf {
        self.root.join(SAMPLES_DIR).join(format!("{race_id}.jsonl"))
    }

    /// Write the race index through a temporary file so readers never see a
    /// partial document.
    async fn write_races(&self, races: &HashMap<Uuid, Race>) -> StorageResult<()> {
        let mut snapshot: Vec<&Race> = races.values().collect();
        snapshot.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| StorageError::Serialization {
            context: RACES_FILE.to_string(),
            source: e,
        })?;

        let path = self.root.join(RACES_FILE);
        let tmp = self.root.join(format!("{RACES_FILE}.tmp"));
        fs::write(&tmp, json).await.map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    async fn read_samples(&self, race_id: Uuid) -> StorageResult<Option<Vec<RecordedSample>>> {
        let path = self.samples_path(race_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| StorageError::Serialization {
                    context: path.display().to_string(),
                    source: e,
                })
            })
            .collect::<StorageResult<Vec<_>>>()
            .map(Some)
    }
}

#[async_trait::async_trait]
impl Store for JsonlStore {
    async fn insert_samples(&self, race: &Race, samples: &[RecordedSample]) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let path = self.samples_path(race.id);
        let mut lines = String::with_capacity(samples.len() * 1024);
        for sample in samples {
            let line = serde_json::to_string(sample).map_err(|e| StorageError::Serialization {
                context: path.display().to_string(),
                source: e,
            })?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        file.write_all(lines.as_bytes()).await.map_err(|e| StorageError::io(&path, e))?;
        file.flush().await.map_err(|e| StorageError::io(&path, e))?;

        debug!(race = %race.id, samples = samples.len(), "Appended samples");
        Ok(())
    }

    async fn upsert_races(&self, races: &[Race]) -> StorageResult<()> {
        // Held across the file write so concurrent upserts serialize.
        let mut stored = self.races.write().await;
        let mut next = stored.clone();
        for race in races {
            next.entry(race.id)
                .and_modify(|existing| existing.merge_mutable(race))
                .or_insert_with(|| race.clone());
        }
        // The index only changes once the file does.
        self.write_races(&next).await?;
        *stored = next;
        Ok(())
    }

    async fn select_last_sample(&self, race_id: Uuid) -> StorageResult<RecordedSample> {
        let samples = self.read_samples(race_id).await?.unwrap_or_default();
        latest_sample(&samples).copied().ok_or(StorageError::NotFound { race_id })
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
        Ok(self.read_samples(race_id).await?.unwrap_or_default())
    }
}
