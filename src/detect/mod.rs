//! Migration detection pipeline.
//!
//! Turns raw scraped candidates into the subset worth alerting right now:
//!
//!   raw observations → time parse → tier classify → ledger filter → alerts
//!
//! Policy throughout: a false negative is preferable to a false positive.
//! Observations with unknown timing are silently excluded; only the ledger
//! decides whether a (entity, tier) pair is new enough to fire.

use crate::ledger::{AlertKey, AlertLedger, LedgerStore};
use crate::tier::{self, Tier};
use crate::timeparse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Longest raw_text we keep on an observation. Scraped lines are untrusted
/// and can be a whole page dump.
const MAX_RAW_TEXT: usize = 280;

/// One scraped migration candidate. Produced fresh each cycle; never
/// persisted.
#[derive(Debug, Clone)]
pub struct RawObservation {
    /// Mint/contract address when the scraper recognized one.
    pub identifier: Option<String>,
    pub display_name: String,
    /// Source line the candidate came from, truncated.
    pub raw_text: String,
    /// Text believed to carry the countdown, if any.
    pub time_text: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// Whole-page fallback capture with no per-token structure. Carries no
    /// timing signal and must never alert.
    pub fallback: bool,
}

impl RawObservation {
    pub fn new(
        identifier: Option<String>,
        display_name: impl Into<String>,
        raw_text: impl Into<String>,
        time_text: Option<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let mut raw_text = raw_text.into();
        if raw_text.len() > MAX_RAW_TEXT {
            let cut = (0..=MAX_RAW_TEXT)
                .rev()
                .find(|&i| raw_text.is_char_boundary(i))
                .unwrap_or(0);
            raw_text.truncate(cut);
        }
        Self {
            identifier,
            display_name: display_name.into(),
            raw_text,
            time_text,
            observed_at,
            fallback: false,
        }
    }

    /// Placeholder observation for a page where nothing structured matched.
    pub fn page_fallback(raw_text: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        let mut obs = Self::new(None, "page", raw_text, None, observed_at);
        obs.fallback = true;
        obs
    }

    /// Deduplication identity: address when known, display name otherwise.
    pub fn entity_id(&self) -> Option<&str> {
        match &self.identifier {
            Some(id) if !id.is_empty() => Some(id),
            _ => {
                let name = self.display_name.trim();
                if name.is_empty() {
                    None
                } else {
                    Some(name)
                }
            }
        }
    }
}

/// An observation that cleared every filter this cycle, ready to notify.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationAlert {
    pub entity_id: String,
    pub display_name: String,
    pub minutes_until: f64,
    pub tier: Tier,
    pub raw_text: String,
    pub observed_at: DateTime<Utc>,
}

/// Events emitted by the pipeline for the main loop to surface.
#[derive(Debug, Clone)]
pub enum DetectEvent {
    AlertFired {
        entity_id: String,
        tier: Tier,
        minutes_until: f64,
    },
    CycleComplete {
        observed: usize,
        alertable: usize,
        ledger_entries: usize,
    },
}

/// Pipeline knobs. Interval and threshold arrive here as parameters; the
/// core never reads the environment.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Ignore anything further out than this many minutes.
    pub threshold_minutes: f64,
    /// Minimum gap between two fires of the same (entity, tier).
    pub cooldown: Duration,
    /// Maximum age of a ledger entry before it is purged.
    pub retention: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: 30.0,
            cooldown: Duration::from_secs(10 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Orchestrates parse → classify → ledger-filter and owns the ledger's
/// load/save lifecycle. One instance per process; cycles never overlap.
pub struct DetectionPipeline {
    ledger: AlertLedger,
    store: LedgerStore,
    config: DetectorConfig,
    event_tx: mpsc::UnboundedSender<DetectEvent>,
}

impl DetectionPipeline {
    pub fn new(
        store: LedgerStore,
        config: DetectorConfig,
        event_tx: mpsc::UnboundedSender<DetectEvent>,
    ) -> Self {
        let ledger = store.load();
        info!(
            entries = ledger.len(),
            threshold_mins = config.threshold_minutes,
            cooldown_secs = config.cooldown.as_secs(),
            "detection pipeline ready"
        );
        Self {
            ledger,
            store,
            config,
            event_tx,
        }
    }

    /// Run one detection cycle. Returns the alerts to send, in input
    /// order, and persists the updated ledger before returning.
    pub fn detect(
        &mut self,
        observations: &[RawObservation],
        now: DateTime<Utc>,
    ) -> Vec<MigrationAlert> {
        let now_ms = now.timestamp_millis();
        let cooldown_ms = self.config.cooldown.as_millis() as i64;
        let retention_ms = self.config.retention.as_millis() as i64;

        let mut alerts = Vec::new();

        for obs in observations {
            if obs.fallback {
                debug!(name = %obs.display_name, "skipping fallback observation");
                continue;
            }

            let entity_id = match obs.entity_id() {
                Some(id) => id.to_string(),
                None => {
                    debug!("skipping observation with no derivable entity id");
                    continue;
                }
            };

            let minutes = match obs.time_text.as_deref().and_then(timeparse::parse_minutes) {
                Some(m) => m,
                None => {
                    debug!(entity = %entity_id, "skipping observation with unknown timing");
                    continue;
                }
            };

            if minutes > self.config.threshold_minutes {
                debug!(
                    entity = %entity_id,
                    minutes,
                    threshold = self.config.threshold_minutes,
                    "outside alert threshold"
                );
                continue;
            }

            let tier = tier::classify(minutes);
            let key = AlertKey::new(entity_id.clone(), tier);

            if !self.ledger.should_fire(&key, now_ms, cooldown_ms) {
                debug!(key = %key, "alert suppressed (cooldown)");
                continue;
            }
            self.ledger.record(key, now_ms);

            info!(
                entity = %entity_id,
                name = %obs.display_name,
                tier = %tier,
                minutes,
                "MIGRATION ALERT"
            );
            let _ = self.event_tx.send(DetectEvent::AlertFired {
                entity_id: entity_id.clone(),
                tier,
                minutes_until: minutes,
            });

            alerts.push(MigrationAlert {
                entity_id,
                display_name: obs.display_name.clone(),
                minutes_until: minutes,
                tier,
                raw_text: obs.raw_text.clone(),
                observed_at: obs.observed_at,
            });
        }

        self.ledger.evict_older_than(now_ms, retention_ms);
        if let Err(e) = self.store.save(&self.ledger) {
            // In-memory decisions stand for this run; next cycle may
            // re-fire the same alerts.
            error!(path = %self.store.path().display(), error = %e, "ledger save failed");
        }

        let _ = self.event_tx.send(DetectEvent::CycleComplete {
            observed: observations.len(),
            alertable: alerts.len(),
            ledger_entries: self.ledger.len(),
        });

        alerts
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pipeline(dir: &tempfile::TempDir) -> DetectionPipeline {
        let (tx, _rx) = mpsc::unbounded_channel();
        DetectionPipeline::new(
            LedgerStore::new(dir.path().join("ledger.json")),
            DetectorConfig::default(),
            tx,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn obs(identifier: Option<&str>, name: &str, time_text: Option<&str>) -> RawObservation {
        RawObservation::new(
            identifier.map(str::to_string),
            name,
            format!("{} row", name),
            time_text.map(str::to_string),
            at(0),
        )
    }

    #[test]
    fn test_same_entity_distinct_tiers_both_fire() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);

        let alerts = p.detect(
            &[
                obs(Some("mint1"), "PEPE", Some("4m")),
                obs(Some("mint1"), "PEPE", Some("20m")),
            ],
            at(0),
        );

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].tier, Tier::Imminent);
        assert_eq!(alerts[1].tier, Tier::Upcoming);
        assert_eq!(alerts[0].entity_id, alerts[1].entity_id);
    }

    #[test]
    fn test_rerun_within_cooldown_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);
        let batch = [
            obs(Some("mint1"), "PEPE", Some("4m")),
            obs(Some("mint2"), "DOGE", Some("12m")),
        ];

        assert_eq!(p.detect(&batch, at(0)).len(), 2);
        // Two minutes later, same page state: everything suppressed.
        assert_eq!(p.detect(&batch, at(120)).len(), 0);
        // Past the 10-minute cooldown both tiers re-fire.
        assert_eq!(p.detect(&batch, at(601)).len(), 2);
    }

    #[test]
    fn test_unknown_timing_never_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);

        let alerts = p.detect(
            &[
                obs(Some("mint1"), "PEPE", Some("migration pending")),
                obs(Some("mint2"), "DOGE", None),
            ],
            at(0),
        );
        assert!(alerts.is_empty());
        assert_eq!(p.ledger_len(), 0);
    }

    #[test]
    fn test_fallback_and_anonymous_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);

        let mut fallback = RawObservation::page_fallback("entire page text 5m", at(0));
        // Even with a parseable countdown a fallback must not alert.
        fallback.time_text = Some("5m".to_string());
        let nameless = obs(None, "  ", Some("5m"));

        assert!(p.detect(&[fallback, nameless], at(0)).is_empty());
    }

    #[test]
    fn test_threshold_filters_scheduled() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);

        let alerts = p.detect(
            &[
                obs(Some("mint1"), "PEPE", Some("2h")),
                obs(Some("mint2"), "DOGE", Some("30m")),
            ],
            at(0),
        );
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].entity_id, "mint2");
        assert_eq!(alerts[0].tier, Tier::Upcoming);
    }

    #[test]
    fn test_entity_id_falls_back_to_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&dir);

        let alerts = p.detect(&[obs(None, "PEPE", Some("4m"))], at(0));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].entity_id, "PEPE");

        // Same name, same tier, within cooldown: deduped by name.
        assert!(p.detect(&[obs(None, "PEPE", Some("3m"))], at(60)).is_empty());
    }

    #[test]
    fn test_ledger_survives_pipeline_restart() {
        let dir = tempfile::tempdir().unwrap();
        let batch = [obs(Some("mint1"), "PEPE", Some("4m"))];

        let mut p1 = pipeline(&dir);
        assert_eq!(p1.detect(&batch, at(0)).len(), 1);
        drop(p1);

        // Fresh pipeline over the same snapshot: still inside cooldown.
        let mut p2 = pipeline(&dir);
        assert!(p2.detect(&batch, at(60)).is_empty());
    }

    #[test]
    fn test_raw_text_bounded() {
        let long = "x".repeat(1000);
        let o = RawObservation::new(None, "PEPE", long, None, at(0));
        assert!(o.raw_text.len() <= 280);
    }
}
