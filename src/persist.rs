//! ==============================================================================
//! persist.rs - persistence bridge
//! ==============================================================================
//!
//! purpose:
//!     write-through of the latest and history maps to durable key-value
//!     storage, and rehydration of both at startup.
//!
//! write model:
//!     every mutation hands a serialized snapshot to a per-key watch channel.
//!     a background task drains each channel and writes the newest value,
//!     so callers never wait and a slow disk only ever skips stale snapshots.
//!     write failures are logged and dropped; memory stays authoritative.
//!
//! relationships:
//!     - used by: hub.rs
//!     - stored format:
//!         latest  -> { "<sensor-id>": { "value": .., "updatedAt": .. } }
//!         history -> { "<sensor-id>": [ { "ts": .., "value": .. }, .. ] }
//!
//! ==============================================================================

use crate::domain::{HistoryEntry, HistoryMap, LatestMap, SensorId, SensorReading};
use crate::error::StorageError;

use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

// ==============================================================================
// key-value backends
// ==============================================================================

/// durable string storage; calls may block and are run off the async threads
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// one file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// keys like `@asma/sensors:last` become `_asma_sensors_last.json`
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let write = |p: &Path| -> std::io::Result<()> {
            std::fs::create_dir_all(&self.dir)?;
            // write-then-rename so a crash never leaves half a file behind
            let tmp = p.with_extension("json.tmp");
            std::fs::write(&tmp, value)?;
            std::fs::rename(&tmp, p)
        };
        write(&path).map_err(|source| StorageError::Write { path, source })
    }
}

/// process-local store, for tests and for running without a data dir
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ==============================================================================
// bridge
// ==============================================================================

#[derive(Debug, Clone)]
pub struct StorageKeys {
    pub latest: String,
    pub history: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            latest: "@asma/sensors:last".to_string(),
            history: "@asma/sensors:history".to_string(),
        }
    }
}

pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    latest_tx: watch::Sender<Option<String>>,
    history_tx: watch::Sender<Option<String>>,
}

impl Persistence {
    /// spawn the two background writers; must run inside a tokio runtime
    pub fn start(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        let (latest_tx, latest_rx) = watch::channel(None);
        let (history_tx, history_rx) = watch::channel(None);

        tokio::spawn(run_writer(store.clone(), keys.latest.clone(), latest_rx));
        tokio::spawn(run_writer(store.clone(), keys.history.clone(), history_rx));

        Self { store, keys, latest_tx, history_tx }
    }

    /// load both maps. missing keys, unreadable storage and malformed json all
    /// yield empty maps; unknown sensors and malformed entries are dropped.
    pub async fn rehydrate(&self, max_history: usize) -> (LatestMap, HistoryMap) {
        let (raw_latest, raw_history) = tokio::join!(
            self.read(self.keys.latest.clone()),
            self.read(self.keys.history.clone()),
        );

        let latest = raw_latest.map(|s| sanitize_latest(&s)).unwrap_or_default();
        let history = raw_history
            .map(|s| sanitize_history(&s, max_history))
            .unwrap_or_default();

        debug!(
            "rehydrated {} latest readings, {} history series",
            latest.len(),
            history.len()
        );
        (latest, history)
    }

    pub fn persist_latest(&self, latest: &LatestMap) {
        Self::queue(&self.latest_tx, &self.keys.latest, serde_json::to_string(latest));
    }

    pub fn persist_history(&self, history: &HistoryMap) {
        Self::queue(&self.history_tx, &self.keys.history, serde_json::to_string(history));
    }

    fn queue(tx: &watch::Sender<Option<String>>, key: &str, payload: serde_json::Result<String>) {
        match payload {
            Ok(json) => {
                if tx.send(Some(json)).is_err() {
                    debug!("writer for {} has stopped; snapshot dropped", key);
                }
            }
            Err(e) => warn!("failed to serialize {}: {}", key, e),
        }
    }

    async fn read(&self, key: String) -> Option<String> {
        let store = self.store.clone();
        match blocking(move || store.get(&key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to load sensor cache: {}", e);
                None
            }
        }
    }
}

async fn run_writer(
    store: Arc<dyn KeyValueStore>,
    key: String,
    mut rx: watch::Receiver<Option<String>>,
) {
    while rx.changed().await.is_ok() {
        let Some(payload) = rx.borrow_and_update().clone() else {
            continue;
        };
        let store = store.clone();
        let write_key = key.clone();
        if let Err(e) = blocking(move || store.set(&write_key, &payload)).await {
            warn!("failed to persist {}: {}", key, e);
        }
    }
}

/// run a storage call off the async threads; a failed task is a storage error
async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

// ==============================================================================
// sanitizing
// ==============================================================================

fn parse_object(raw: &str, what: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("stored {} is not a json object; ignoring", what);
            Map::new()
        }
        Err(e) => {
            warn!("stored {} is not valid json: {}", what, e);
            Map::new()
        }
    }
}

pub fn sanitize_latest(raw: &str) -> LatestMap {
    parse_object(raw, "latest map")
        .into_iter()
        .filter_map(|(k, v)| {
            let id = k.parse::<SensorId>().ok()?;
            let reading = serde_json::from_value::<SensorReading>(v).ok()?;
            Some((id, reading))
        })
        .collect()
}

/// keeps at most the newest `max_history` entries per sensor
pub fn sanitize_history(raw: &str, max_history: usize) -> HistoryMap {
    parse_object(raw, "history map")
        .into_iter()
        .filter_map(|(k, v)| {
            let id = k.parse::<SensorId>().ok()?;
            let Value::Array(items) = v else {
                return None;
            };
            let entries: Vec<HistoryEntry> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<HistoryEntry>(item).ok())
                .collect();
            let skip = entries.len().saturating_sub(max_history);
            Some((id, entries.into_iter().skip(skip).collect::<VecDeque<_>>()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorValue;

    #[test]
    fn unknown_latest_keys_are_dropped() {
        let raw = r#"{
            "batimentos-cardiacos": {"value": 78, "updatedAt": 1},
            "pressao": {"value": 120, "updatedAt": 1},
            "saturacao": {"value": "97", "updatedAt": 2}
        }"#;
        let latest = sanitize_latest(raw);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&SensorId::BatimentosCardiacos].value, SensorValue::Numeric(78.0));
        assert_eq!(latest[&SensorId::Saturacao].value, SensorValue::Text("97".into()));
    }

    #[test]
    fn malformed_latest_entries_are_dropped() {
        let raw = r#"{"umidade": 55, "som": {"value": 3, "updatedAt": 4}}"#;
        let latest = sanitize_latest(raw);
        assert_eq!(latest.keys().copied().collect::<Vec<_>>(), [SensorId::Som]);
    }

    #[test]
    fn history_requires_arrays() {
        let raw = r#"{
            "umidade": [{"ts": 1, "value": 50}, {"bogus": true}, {"ts": 2, "value": "0"}],
            "som": {"ts": 1, "value": 2},
            "desconhecido": []
        }"#;
        let history = sanitize_history(raw, 100);
        assert_eq!(history.len(), 1);
        let ts: Vec<u64> = history[&SensorId::Umidade].iter().map(|e| e.ts).collect();
        assert_eq!(ts, [1, 2]);
    }

    #[test]
    fn history_longer_than_bound_keeps_newest() {
        let items: Vec<String> = (0..5).map(|i| format!(r#"{{"ts": {i}, "value": {i}}}"#)).collect();
        let raw = format!(r#"{{"piezo": [{}]}}"#, items.join(","));
        let history = sanitize_history(&raw, 3);
        let ts: Vec<u64> = history[&SensorId::Piezo].iter().map(|e| e.ts).collect();
        assert_eq!(ts, [2, 3, 4]);
    }

    #[test]
    fn garbage_yields_empty_maps() {
        assert!(sanitize_latest("not json").is_empty());
        assert!(sanitize_history("[1,2,3]", 100).is_empty());
    }

    /// panics on the first write, then behaves
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failed: std::sync::atomic::AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("disk went away");
            }
            self.inner.set(key, value)
        }
    }

    #[tokio::test]
    async fn panicking_storage_call_is_a_join_error() {
        let result = blocking(|| -> Result<(), StorageError> { panic!("disk went away") }).await;
        assert!(matches!(result, Err(StorageError::Join(_))));
    }

    #[tokio::test]
    async fn writer_survives_a_panicking_write() {
        let store = Arc::new(FlakyStore::default());
        let persistence = Persistence::start(store.clone(), StorageKeys::default());
        let mut latest = LatestMap::new();
        latest.insert(
            SensorId::Som,
            SensorReading { value: SensorValue::Numeric(1.0), updated_at: 1 },
        );

        persistence.persist_latest(&latest);
        for _ in 0..100 {
            if store.failed.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        latest.get_mut(&SensorId::Som).unwrap().updated_at = 2;
        persistence.persist_latest(&latest);
        for _ in 0..100 {
            if let Ok(Some(raw)) = store.get("@asma/sensors:last") {
                assert!(raw.contains(r#""updatedAt":2"#));
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("second snapshot never written");
    }

    #[test]
    fn file_store_round_trip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert!(store.get("@asma/sensors:last").unwrap().is_none());
        store.set("@asma/sensors:last", "{}").unwrap();
        assert_eq!(store.get("@asma/sensors:last").unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("nested").join("_asma_sensors_last.json").exists());
    }
}
