use chrono::Utc;
use migwatch::config::Config;
use migwatch::detect::{DetectEvent, DetectionPipeline, DetectorConfig};
use migwatch::ledger::LedgerStore;
use migwatch::notify::Notifier;
use migwatch::scrape::PageFetcher;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = if Path::new("migwatch.toml").exists() {
        Config::load(Path::new("migwatch.toml"))?
    } else {
        info!("no migwatch.toml found, using env-only config");
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("migwatch v{} starting", env!("CARGO_PKG_VERSION"));

    // --- Collaborators ---
    let fetcher = PageFetcher::new(
        config.watcher.page_url.clone(),
        Duration::from_secs(config.watcher.fetch_timeout_secs),
    )?;

    let notifier = if config.has_webhook() {
        Some(Notifier::new(
            config.notify.webhook_url.clone(),
            Duration::from_millis(config.notify.send_delay_ms),
        )?)
    } else {
        warn!(
            "no webhook configured - alerts will be logged only \
             (set MIGWATCH_WEBHOOK_URL to deliver them)"
        );
        None
    };

    // --- Detection Pipeline ---
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DetectEvent>();
    let detector_config = DetectorConfig {
        threshold_minutes: config.watcher.alert_threshold_mins,
        cooldown: Duration::from_secs(config.ledger.cooldown_mins * 60),
        retention: Duration::from_secs(config.ledger.retention_hours * 3600),
    };
    let mut pipeline = DetectionPipeline::new(
        LedgerStore::new(&config.ledger.path),
        detector_config,
        event_tx,
    );

    // --- Watch Loop ---
    // One task owns scrape → detect → notify sequentially, so a new cycle
    // cannot start while the previous one is still in flight. The ledger's
    // load/mutate/save never races.
    let check_interval = Duration::from_secs(config.watcher.check_interval_mins * 60);
    let failure_notice_after = config.watcher.failure_notice_after;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_interval);
        let mut consecutive_failures = 0u32;
        loop {
            interval.tick().await;

            let observations = match fetcher.fetch().await {
                Ok(obs) => {
                    consecutive_failures = 0;
                    obs
                }
                Err(e) => {
                    // Unknown state, not "zero migrations": skip the cycle,
                    // no ledger mutation, retry on the next tick.
                    consecutive_failures += 1;
                    error!(
                        error = %e,
                        consecutive = consecutive_failures,
                        "fetch failed, skipping cycle"
                    );
                    if consecutive_failures == failure_notice_after {
                        if let Some(ref n) = notifier {
                            n.send_fetch_failure(consecutive_failures, &e.to_string())
                                .await;
                        }
                    }
                    continue;
                }
            };

            let alerts = pipeline.detect(&observations, Utc::now());
            if alerts.is_empty() {
                continue;
            }
            match notifier {
                Some(ref n) => n.send_batch(&alerts).await,
                None => {
                    for a in &alerts {
                        info!(
                            entity = %a.entity_id,
                            tier = %a.tier,
                            minutes = a.minutes_until,
                            "alert (no webhook configured)"
                        );
                    }
                }
            }
        }
    });

    info!(
        interval_mins = config.watcher.check_interval_mins,
        threshold_mins = config.watcher.alert_threshold_mins,
        "entering watch loop - press Ctrl+C to stop"
    );

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    DetectEvent::AlertFired { entity_id, tier, minutes_until } => {
                        debug!(
                            entity = %entity_id,
                            tier = %tier,
                            minutes = minutes_until,
                            "alert fired"
                        );
                    }
                    DetectEvent::CycleComplete { observed, alertable, ledger_entries } => {
                        info!(observed, alertable, ledger_entries, "cycle complete");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
