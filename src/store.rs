//! ==============================================================================
//! store.rs - sensor state store
//! ==============================================================================
//!
//! purpose:
//!     holds the two in-memory views of the sensor network:
//!     - latest: last non-zero value per sensor (what the dashboard shows)
//!     - history: bounded fifo of every raw arrival, zeros included
//!
//!     and derives the ai snapshot, the most recent believable value per
//!     sensor, from both.
//!
//! relationships:
//!     - owned by: hub.rs (behind a lock, written by the transport task only)
//!     - uses: decode.rs (is_zero_like)
//!
//! ==============================================================================

use crate::decode::is_zero_like;
use crate::domain::{AiSnapshot, HistoryEntry, HistoryMap, LatestMap, SensorId, SensorReading, SensorValue};

pub const DEFAULT_HISTORY_MAX: usize = 100;

/// which maps an update touched, so the caller persists only those
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub latest_changed: bool,
}

#[derive(Debug, Clone)]
pub struct SensorStore {
    latest: LatestMap,
    history: HistoryMap,
    max_history: usize,
}

impl Default for SensorStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX)
    }
}

impl SensorStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            latest: LatestMap::new(),
            history: HistoryMap::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// apply one decoded arrival.
    ///
    /// history always grows (oldest entry evicted past the bound); the latest
    /// view only moves for non-zero values.
    pub fn apply(&mut self, id: SensorId, value: SensorValue, now: u64) -> Applied {
        let entries = self.history.entry(id).or_default();
        entries.push_back(HistoryEntry { ts: now, value: value.clone() });
        while entries.len() > self.max_history {
            entries.pop_front();
        }

        if is_zero_like(&value) {
            return Applied { latest_changed: false };
        }

        self.latest.insert(id, SensorReading { value, updated_at: now });
        Applied { latest_changed: true }
    }

    pub fn latest(&self, id: SensorId) -> Option<&SensorReading> {
        self.latest.get(&id)
    }

    pub fn latest_map(&self) -> &LatestMap {
        &self.latest
    }

    pub fn history(&self, id: SensorId) -> Option<&std::collections::VecDeque<HistoryEntry>> {
        self.history.get(&id)
    }

    pub fn history_map(&self) -> &HistoryMap {
        &self.history
    }

    /// newest non-zero value per sensor; sensors with none are omitted
    pub fn ai_snapshot(&self) -> AiSnapshot {
        SensorId::ALL
            .iter()
            .filter_map(|&id| self.last_for_ai(id).map(|v| (id, v.clone())))
            .collect()
    }

    fn last_for_ai(&self, id: SensorId) -> Option<&SensorValue> {
        let from_history = self
            .history
            .get(&id)
            .and_then(|entries| entries.iter().rev().map(|e| &e.value).find(|v| !is_zero_like(v)));

        from_history.or_else(|| {
            self.latest
                .get(&id)
                .map(|r| &r.value)
                .filter(|v| !is_zero_like(v))
        })
    }

    /// fold state loaded from storage into whatever arrived live meanwhile.
    ///
    /// latest: the newer `updatedAt` wins per sensor, zero-like stored
    /// values are ignored. history: stored entries go before live ones,
    /// ordered by timestamp, then trimmed to the bound.
    pub fn merge_rehydrated(&mut self, latest: LatestMap, history: HistoryMap) {
        for (id, stored) in latest {
            if is_zero_like(&stored.value) {
                continue;
            }
            match self.latest.get(&id) {
                Some(live) if live.updated_at >= stored.updated_at => {}
                _ => {
                    self.latest.insert(id, stored);
                }
            }
        }

        for (id, stored) in history {
            let live = self.history.remove(&id).unwrap_or_default();
            let mut merged: Vec<HistoryEntry> = stored.into_iter().chain(live).collect();
            // stable: equal timestamps keep stored-before-live order
            merged.sort_by_key(|e| e.ts);
            let skip = merged.len().saturating_sub(self.max_history);
            self.history.insert(id, merged.into_iter().skip(skip).collect());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn num(n: f64) -> SensorValue {
        SensorValue::Numeric(n)
    }

    fn text(s: &str) -> SensorValue {
        SensorValue::Text(s.to_string())
    }

    #[test]
    fn zero_then_value_then_zero() {
        let id = SensorId::BatimentosCardiacos;
        let mut store = SensorStore::default();

        store.apply(id, text("0"), 1);
        store.apply(id, text("78"), 2);
        store.apply(id, text("0"), 3);

        let values: Vec<_> = store.history(id).unwrap().iter().map(|e| e.value.to_string()).collect();
        assert_eq!(values, ["0", "78", "0"]);
        assert_eq!(
            store.latest(id),
            Some(&SensorReading { value: text("78"), updated_at: 2 })
        );
        assert_eq!(store.ai_snapshot().get(&id), Some(&text("78")));
    }

    #[test]
    fn zero_like_update_leaves_latest_untouched() {
        let id = SensorId::Saturacao;
        let mut store = SensorStore::default();
        store.apply(id, num(97.0), 10);
        let before = store.latest(id).cloned();

        for v in [num(0.0), text("0"), text("0.0"), text(" ")] {
            let applied = store.apply(id, v, 11);
            assert!(!applied.latest_changed);
            assert_eq!(store.latest(id).cloned(), before);
        }
    }

    #[test]
    fn history_is_bounded_fifo() {
        let id = SensorId::Umidade;
        let mut store = SensorStore::new(100);
        for i in 0..250u64 {
            store.apply(id, num(i as f64), i);
            assert_eq!(store.history(id).unwrap().len(), ((i + 1) as usize).min(100));
        }
        let entries = store.history(id).unwrap();
        assert_eq!(entries.front().unwrap().ts, 150);
        assert_eq!(entries.back().unwrap(), &HistoryEntry { ts: 249, value: num(249.0) });
    }

    #[test]
    fn never_seen_sensor_is_absent_everywhere() {
        let mut store = SensorStore::default();
        store.apply(SensorId::Som, num(3.0), 1);
        assert!(store.latest(SensorId::Piezo).is_none());
        assert!(!store.ai_snapshot().contains_key(&SensorId::Piezo));
    }

    #[test]
    fn snapshot_skips_sensors_with_only_zeros() {
        let mut store = SensorStore::default();
        store.apply(SensorId::ContagemTosse, num(0.0), 1);
        store.apply(SensorId::ContagemTosse, text("0"), 2);
        assert!(store.ai_snapshot().is_empty());
    }

    #[test]
    fn snapshot_falls_back_to_latest_when_history_evicted_it() {
        let id = SensorId::TemperaturaAmbiente;
        let mut store = SensorStore::new(2);
        store.apply(id, num(24.5), 1);
        store.apply(id, num(0.0), 2);
        store.apply(id, num(0.0), 3);
        assert_eq!(store.ai_snapshot().get(&id), Some(&num(24.5)));
    }

    #[test]
    fn merge_keeps_newer_latest_and_orders_history() {
        let id = SensorId::BatimentosCardiacos;
        let mut store = SensorStore::new(3);
        store.apply(id, num(80.0), 20);

        let mut stored_latest = LatestMap::new();
        stored_latest.insert(id, SensorReading { value: num(70.0), updated_at: 10 });
        stored_latest.insert(SensorId::Saturacao, SensorReading { value: num(96.0), updated_at: 5 });
        stored_latest.insert(SensorId::Som, SensorReading { value: num(0.0), updated_at: 5 });

        let mut stored_history = HistoryMap::new();
        stored_history.insert(
            id,
            VecDeque::from(vec![
                HistoryEntry { ts: 8, value: num(69.0) },
                HistoryEntry { ts: 9, value: num(0.0) },
                HistoryEntry { ts: 10, value: num(70.0) },
            ]),
        );

        store.merge_rehydrated(stored_latest, stored_history);

        assert_eq!(store.latest(id).unwrap().value, num(80.0));
        assert_eq!(store.latest(SensorId::Saturacao).unwrap().updated_at, 5);
        assert!(store.latest(SensorId::Som).is_none());

        let ts: Vec<u64> = store.history(id).unwrap().iter().map(|e| e.ts).collect();
        assert_eq!(ts, [9, 10, 20]);
    }
}
