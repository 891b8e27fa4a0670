//! ==============================================================================
//! hub.rs - owned sensor state
//! ==============================================================================
//!
//! purpose:
//!     one `SensorHub` is created at startup and shared (Arc) between:
//!     - the transport task (the only writer, one message at a time)
//!     - the web server and the assistant (readers)
//!
//!     every mutation is followed by a fire-and-forget write-through of the
//!     map(s) it touched. until `rehydrate` has merged the stored state,
//!     arrivals only touch memory.
//!
//! relationships:
//!     - owns: store.rs (SensorStore), persist.rs (Persistence)
//!     - used by: transport.rs (ingest), server.rs (reads), main.rs (rehydrate)
//!
//! ==============================================================================

use crate::domain::{AiSnapshot, HistoryEntry, HistoryMap, LatestMap, SensorId, SensorReading, SensorValue};
use crate::persist::Persistence;
use crate::store::{Applied, SensorStore};

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct SensorHub {
    store: RwLock<SensorStore>,
    persistence: Persistence,
    /// set under the store write lock once stored state is merged
    rehydrated: AtomicBool,
    log_readings: bool,
}

impl SensorHub {
    pub fn new(max_history: usize, persistence: Persistence) -> Self {
        Self {
            store: RwLock::new(SensorStore::new(max_history)),
            persistence,
            rehydrated: AtomicBool::new(false),
            log_readings: false,
        }
    }

    /// log every accepted reading at info instead of debug
    pub fn with_reading_log(mut self, enabled: bool) -> Self {
        self.log_readings = enabled;
        self
    }

    /// apply one decoded arrival and queue the write-through
    pub async fn ingest(&self, id: SensorId, value: SensorValue, now: u64) -> Applied {
        let mut store = self.store.write().await;
        let applied = store.apply(id, value, now);

        // serialize under the lock so queued snapshots follow arrival order
        let persist = self.rehydrated.load(Ordering::SeqCst);
        if persist {
            self.persistence.persist_history(store.history_map());
        }
        if applied.latest_changed {
            if persist {
                self.persistence.persist_latest(store.latest_map());
            }
            if let Some(reading) = store.latest(id) {
                if self.log_readings {
                    info!("[{}] {}", id, reading.value);
                } else {
                    debug!("[{}] {}", id, reading.value);
                }
            }
        } else {
            debug!("[{}] zero-like reading kept in history only", id);
        }
        applied
    }

    /// load persisted state, merge it under anything that arrived live, then
    /// write the combined maps and turn on write-through
    pub async fn rehydrate(&self) {
        let max_history = self.store.read().await.max_history();
        let (latest, history) = self.persistence.rehydrate(max_history).await;
        let restored = latest.len();

        let mut store = self.store.write().await;
        store.merge_rehydrated(latest, history);
        if !store.latest_map().is_empty() || !store.history_map().is_empty() {
            self.persistence.persist_latest(store.latest_map());
            self.persistence.persist_history(store.history_map());
        }
        self.rehydrated.store(true, Ordering::SeqCst);
        info!("restored cached readings for {} sensors", restored);
    }

    pub async fn latest(&self, id: SensorId) -> Option<SensorReading> {
        self.store.read().await.latest(id).cloned()
    }

    pub async fn latest_map(&self) -> LatestMap {
        self.store.read().await.latest_map().clone()
    }

    pub async fn history(&self, id: SensorId) -> Vec<HistoryEntry> {
        self.store
            .read()
            .await
            .history(id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn history_map(&self) -> HistoryMap {
        self.store.read().await.history_map().clone()
    }

    pub async fn ai_snapshot(&self) -> AiSnapshot {
        self.store.read().await.ai_snapshot()
    }
}
