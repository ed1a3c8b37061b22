//! Persisted alert ledger: which (entity, tier) pairs have already fired.
//!
//! The ledger is the sole source of truth for "have we already alerted
//! this". Cooldown prevents re-notifying the same tier too frequently;
//! retention bounds growth for entities that stop appearing. The two are
//! independent knobs.
//!
//! Persistence is a whole-snapshot JSON file rewritten atomically (temp
//! file + rename). A missing or corrupt snapshot loads as an empty
//! ledger; a read failure must never take the pipeline down.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Deduplication unit: one entity in one urgency tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub entity_id: String,
    pub tier: Tier,
}

impl AlertKey {
    pub fn new(entity_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            entity_id: entity_id.into(),
            tier,
        }
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.entity_id, self.tier)
    }
}

/// One persisted entry: key plus last-fired wall time in epoch millis.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    entity_id: String,
    tier: Tier,
    last_fired_ms: i64,
}

/// In-memory fired-alert map with cooldown and eviction logic.
#[derive(Debug, Default)]
pub struct AlertLedger {
    entries: HashMap<AlertKey, i64>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the key has never fired, or its last fire is strictly older
    /// than the cooldown. Does not mutate state.
    pub fn should_fire(&self, key: &AlertKey, now_ms: i64, cooldown_ms: i64) -> bool {
        match self.entries.get(key) {
            None => true,
            Some(&fired_ms) => now_ms - fired_ms > cooldown_ms,
        }
    }

    /// Upsert the key's last-fired timestamp.
    pub fn record(&mut self, key: AlertKey, now_ms: i64) {
        self.entries.insert(key, now_ms);
    }

    /// Drop entries strictly older than the retention window. An entry
    /// exactly at the boundary is retained.
    pub fn evict_older_than(&mut self, now_ms: i64, retention_ms: i64) {
        let before = self.entries.len();
        self.entries.retain(|_, &mut fired_ms| now_ms - fired_ms <= retention_ms);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "evicted stale ledger entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_snapshot(&self) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .map(|(key, &last_fired_ms)| LedgerEntry {
                entity_id: key.entity_id.clone(),
                tier: key.tier,
                last_fired_ms,
            })
            .collect()
    }

    fn from_snapshot(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (AlertKey::new(e.entity_id, e.tier), e.last_fired_ms))
                .collect(),
        }
    }
}

/// Durable snapshot surface for the ledger: whole-file JSON read/write at
/// a stable path.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Missing or unreadable files yield an empty
    /// ledger, logged, never an error.
    pub fn load(&self) -> AlertLedger {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no ledger snapshot, starting empty");
                return AlertLedger::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ledger read failed, starting empty");
                return AlertLedger::new();
            }
        };
        match serde_json::from_str::<Vec<LedgerEntry>>(&contents) {
            Ok(entries) => {
                let ledger = AlertLedger::from_snapshot(entries);
                debug!(entries = ledger.len(), "ledger snapshot loaded");
                ledger
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt ledger snapshot, starting empty");
                AlertLedger::new()
            }
        }
    }

    /// Write the whole snapshot. Temp file then rename, so a crash
    /// mid-write leaves the previous snapshot intact.
    pub fn save(&self, ledger: &AlertLedger) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&ledger.to_snapshot())?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: i64 = 10 * 60 * 1000;
    const RETENTION: i64 = 24 * 60 * 60 * 1000;

    fn key(entity: &str, tier: Tier) -> AlertKey {
        AlertKey::new(entity, tier)
    }

    #[test]
    fn test_unknown_key_fires() {
        let ledger = AlertLedger::new();
        assert!(ledger.should_fire(&key("mint1", Tier::Imminent), 1_000, COOLDOWN));
    }

    #[test]
    fn test_cooldown_window() {
        let mut ledger = AlertLedger::new();
        let k = key("mint1", Tier::Soon);
        let t0 = 1_000_000;
        ledger.record(k.clone(), t0);

        assert!(!ledger.should_fire(&k, t0, COOLDOWN));
        assert!(!ledger.should_fire(&k, t0 + COOLDOWN - 1, COOLDOWN));
        assert!(!ledger.should_fire(&k, t0 + COOLDOWN, COOLDOWN));
        assert!(ledger.should_fire(&k, t0 + COOLDOWN + 1, COOLDOWN));
    }

    #[test]
    fn test_record_idempotent() {
        let mut ledger = AlertLedger::new();
        let k = key("mint1", Tier::Imminent);
        ledger.record(k.clone(), 5_000);
        ledger.record(k.clone(), 5_000);
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.should_fire(&k, 5_000, COOLDOWN));
    }

    #[test]
    fn test_tiers_are_independent_keys() {
        let mut ledger = AlertLedger::new();
        ledger.record(key("mint1", Tier::Upcoming), 1_000);
        assert!(ledger.should_fire(&key("mint1", Tier::Imminent), 1_000, COOLDOWN));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_eviction_boundary() {
        let mut ledger = AlertLedger::new();
        let now = RETENTION + 1_000_000;
        // Exactly at the boundary: retained.
        ledger.record(key("edge", Tier::Soon), now - RETENTION);
        // Strictly over: evicted.
        ledger.record(key("stale", Tier::Soon), now - RETENTION - 1);
        ledger.record(key("fresh", Tier::Soon), now);

        ledger.evict_older_than(now, RETENTION);
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.should_fire(&key("edge", Tier::Soon), now, RETENTION));
        assert!(ledger.should_fire(&key("stale", Tier::Soon), now, COOLDOWN));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = AlertLedger::new();
        ledger.record(key("mint1", Tier::Imminent), 42_000);
        ledger.record(key("mint2", Tier::Upcoming), 43_000);
        store.save(&ledger).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.should_fire(&key("mint1", Tier::Imminent), 42_000, COOLDOWN));
        assert!(!loaded.should_fire(&key("mint2", Tier::Upcoming), 43_000, COOLDOWN));
    }

    #[test]
    fn test_missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(LedgerStore::new(path).load().is_empty());
    }
}
