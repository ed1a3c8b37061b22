//! Webhook notification dispatch.
//!
//! One embed per alert, colored by tier. Batch sends are sequential with
//! a fixed delay between posts to respect the channel's rate limits, and
//! a failure sending one alert never aborts the rest of the batch: each
//! send is independently attempted and its failure logged.

use crate::detect::MigrationAlert;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
    send_delay: Duration,
}

impl Notifier {
    pub fn new(webhook_url: String, send_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            webhook_url,
            send_delay,
        })
    }

    /// Send every alert in order. Per-entity failures are logged and
    /// swallowed; the batch always runs to completion.
    pub async fn send_batch(&self, alerts: &[MigrationAlert]) {
        for (i, alert) in alerts.iter().enumerate() {
            if i > 0 {
                sleep(self.send_delay).await;
            }
            match self.send_alert(alert).await {
                Ok(()) => info!(
                    entity = %alert.entity_id,
                    tier = %alert.tier,
                    "alert delivered"
                ),
                Err(e) => error!(
                    entity = %alert.entity_id,
                    tier = %alert.tier,
                    error = %e,
                    "alert delivery failed"
                ),
            }
        }
    }

    pub async fn send_alert(&self, alert: &MigrationAlert) -> Result<()> {
        self.post(build_payload(alert)).await
    }

    /// Best-effort notice that scraping has been failing for a while.
    /// Subject to the same failure semantics as any other send.
    pub async fn send_fetch_failure(&self, consecutive: u32, last_error: &str) {
        let payload = serde_json::json!({
            "embeds": [{
                "title": "Migration watcher degraded",
                "description": format!(
                    "{} consecutive fetch failures. Last error: {}",
                    consecutive, last_error
                ),
                "color": 0x992D22,
            }]
        });
        if let Err(e) = self.post(payload).await {
            error!(error = %e, "failure notice delivery failed");
        }
    }

    async fn post(&self, payload: serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;
        if !resp.status().is_success() {
            bail!("webhook returned status {}", resp.status());
        }
        Ok(())
    }
}

/// Embed payload for a single alert. Pure so the shape is testable.
fn build_payload(alert: &MigrationAlert) -> serde_json::Value {
    serde_json::json!({
        "embeds": [{
            "title": format!("{}: {}", alert.tier.label(), alert.display_name),
            "description": format!(
                "`{}` migrates in ~{:.0} min\n{}",
                alert.entity_id, alert.minutes_until, alert.raw_text
            ),
            "color": alert.tier.color(),
            "timestamp": alert.observed_at.to_rfc3339(),
        }]
    })
}
