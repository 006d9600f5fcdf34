use crate::core::leveling::{LevelRecord, LevelStore, LevelingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout: `{ "version": 1, "users": { "<user_id>": { level, experience } } }`.
/// A BTreeMap keeps the file ordered so consecutive snapshots diff cleanly.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    users: BTreeMap<u64, SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SnapshotEntry {
    level: u32,
    experience: u64,
}

/// Level records kept in memory and written out as a JSON snapshot.
///
/// Writes only touch memory. `flush` rewrites the whole file through a
/// temporary sibling and a rename, so a crash mid-write leaves the previous
/// snapshot intact. Flushes are serialized: only one writer owns the temp
/// file at a time.
pub struct SnapshotLevelStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, LevelRecord>>,
    write_lock: Mutex<()>,
}

impl SnapshotLevelStore {
    /// Load the snapshot at `path`. A missing file is an empty store; a file
    /// that does not parse is an error so it never gets overwritten.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LevelingError> {
        let path = path.into();
        let records = if path.exists() {
            read_snapshot(&path)?
        } else {
            HashMap::new()
        };

        tracing::info!(
            path = %path.display(),
            users = records.len(),
            "Loaded leveling snapshot"
        );

        Ok(Self {
            path,
            cache: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that starts empty and never reads `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn storage_error(context: &str, path: &Path, err: impl std::fmt::Display) -> LevelingError {
    LevelingError::StorageError(format!("{} {}: {}", context, path.display(), err))
}

fn read_snapshot(path: &Path) -> Result<HashMap<u64, LevelRecord>, LevelingError> {
    let file = File::open(path).map_err(|e| storage_error("failed to open", path, e))?;
    let snapshot: SnapshotFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| storage_error("failed to parse", path, e))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(storage_error(
            "unsupported snapshot version in",
            path,
            snapshot.version,
        ));
    }

    Ok(snapshot
        .users
        .into_iter()
        .map(|(user_id, entry)| {
            (
                user_id,
                LevelRecord {
                    user_id,
                    level: entry.level,
                    experience: entry.experience,
                },
            )
        })
        .collect())
}

#[async_trait]
impl LevelStore for SnapshotLevelStore {
    async fn add_experience(
        &self,
        user_id: u64,
        amount: u64,
        level_for: &(dyn Fn(u64) -> u32 + Send + Sync),
    ) -> Result<(LevelRecord, LevelRecord), LevelingError> {
        let mut cache = self.cache.write().await;
        let record = cache
            .entry(user_id)
            .or_insert_with(|| LevelRecord::new(user_id));
        let before = *record;

        record.experience = record.experience.saturating_add(amount);
        // Levels never go down, even if the rate was lowered since last run.
        record.level = record.level.max(level_for(record.experience));

        Ok((before, *record))
    }

    async fn get_record(&self, user_id: u64) -> Result<Option<LevelRecord>, LevelingError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&user_id).copied())
    }

    async fn all_records(&self) -> Result<Vec<LevelRecord>, LevelingError> {
        let cache = self.cache.read().await;
        Ok(cache.values().copied().collect())
    }

    async fn flush(&self) -> Result<(), LevelingError> {
        let _writer = self.write_lock.lock().await;
        let snapshot = {
            let cache = self.cache.read().await;
            SnapshotFile {
                version: SNAPSHOT_VERSION,
                users: cache
                    .values()
                    .map(|r| {
                        (
                            r.user_id,
                            SnapshotEntry {
                                level: r.level,
                                experience: r.experience,
                            },
                        )
                    })
                    .collect(),
            }
        };

        let tmp = self.temp_path();
        let file = File::create(&tmp).map_err(|e| storage_error("failed to create", &tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &snapshot)
            .map_err(|e| storage_error("failed to write", &tmp, e))?;
        writer
            .flush()
            .map_err(|e| storage_error("failed to write", &tmp, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| storage_error("failed to sync", &tmp, e))?;
        drop(writer);

        std::fs::rename(&tmp, &self.path)
            .map_err(|e| storage_error("failed to replace", &self.path, e))?;

        tracing::debug!(users = snapshot.users.len(), "Leveling snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn one_level_per_xp(experience: u64) -> u32 {
        experience as u32
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leveling_data.json");

        let store = SnapshotLevelStore::load(&path).unwrap();
        for _ in 0..3 {
            store.add_experience(5, 1, &one_level_per_xp).await.unwrap();
        }
        store.add_experience(8, 10, &one_level_per_xp).await.unwrap();
        store.flush().await.unwrap();

        let reloaded = SnapshotLevelStore::load(&path).unwrap();
        let mut before = store.all_records().await.unwrap();
        let mut after = reloaded.all_records().await.unwrap();
        before.sort_by_key(|r| r.user_id);
        after.sort_by_key(|r| r.user_id);
        assert_eq!(before, after);
        assert_eq!(
            reloaded.get_record(5).await.unwrap(),
            Some(LevelRecord {
                user_id: 5,
                level: 3,
                experience: 3
            })
        );
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotLevelStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.all_records().await.unwrap().is_empty());
        assert!(store.get_record(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_replaces_the_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");

        let store = SnapshotLevelStore::load(&path).unwrap();
        store.add_experience(1, 1, &one_level_per_xp).await.unwrap();
        store.flush().await.unwrap();
        store.add_experience(1, 1, &one_level_per_xp).await.unwrap();
        store.flush().await.unwrap();

        assert!(!store.temp_path().exists());
        let reloaded = SnapshotLevelStore::load(&path).unwrap();
        assert_eq!(reloaded.get_record(1).await.unwrap().unwrap().experience, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_flushes_all_succeed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");
        let store = std::sync::Arc::new(SnapshotLevelStore::load(&path).unwrap());
        store.add_experience(3, 6, &one_level_per_xp).await.unwrap();

        for _ in 0..25 {
            let first = tokio::spawn({
                let store = std::sync::Arc::clone(&store);
                async move { store.flush().await }
            });
            let second = tokio::spawn({
                let store = std::sync::Arc::clone(&store);
                async move { store.flush().await }
            });
            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();
        }

        let reloaded = SnapshotLevelStore::load(&path).unwrap();
        assert_eq!(reloaded.get_record(3).await.unwrap().unwrap().experience, 6);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn empty_store_ignores_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");
        std::fs::write(&path, "not json").unwrap();

        let store = SnapshotLevelStore::empty(&path);
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn level_never_decreases() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotLevelStore::load(dir.path().join("levels.json")).unwrap();

        store.add_experience(1, 4, &one_level_per_xp).await.unwrap();
        let (before, after) = store.add_experience(1, 1, &|_: u64| 0u32).await.unwrap();

        assert_eq!(before.level, 4);
        assert_eq!(after.level, 4);
        assert_eq!(after.experience, 5);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");
        std::fs::write(&path, "{'123': (4, 4)}").unwrap();

        let result = SnapshotLevelStore::load(&path);
        assert!(matches!(result, Err(LevelingError::StorageError(_))));
    }

    #[test]
    fn unknown_version_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");
        std::fs::write(&path, r#"{"version": 9, "users": {}}"#).unwrap();

        assert!(SnapshotLevelStore::load(&path).is_err());
    }

    #[tokio::test]
    async fn reads_hand_written_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "users": {"42": {"level": 7, "experience": 7}}}"#,
        )
        .unwrap();

        let store = SnapshotLevelStore::load(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let records = store.all_records().await.unwrap();
        assert_eq!(
            records,
            vec![LevelRecord {
                user_id: 42,
                level: 7,
                experience: 7
            }]
        );
    }
}
