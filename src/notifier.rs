use std::sync::Arc;
use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::chain::Network;
use crate::config;
use crate::db::Store;
use crate::rest::TransactionRs;

/// Delivers confirmed balance events to the subscriber, one block batch at a
/// time, strictly ascending. A failed delivery stalls the watermark so the
/// same height is retried on the next pass; nothing above it is attempted.
pub struct Notifier {
    store: Arc<dyn Store>,
    network: Network,
    subscriber_url: String,
    http: reqwest::Client,
    cfg: config::NotifierConfig,
}

impl Notifier {
    pub fn new(
        cfg: &config::NotifierConfig,
        network: Network,
        store: Arc<dyn Store>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            store,
            network,
            subscriber_url: cfg.subscriber_url.trim_end_matches('/').to_string(),
            http,
            cfg: cfg.clone(),
        })
    }

    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, stop_signal: CancellationToken) {
        let mut watermark = match self.store.last_notified_block(self.network).await {
            Ok(Some(block)) => block.number,
            Ok(None) => self.cfg.starting_height,
            Err(err) => {
                error!(
                    "can't read notify watermark, using configured floor: network={} error={}",
                    self.network, err
                );
                self.cfg.starting_height
            }
        };
        info!(
            "notifier started: network={} watermark={}",
            self.network, watermark
        );

        loop {
            match self.notify(watermark).await {
                Ok(height) => watermark = height,
                Err(err) => {
                    // Store errors only; retried on the next tick.
                    error!(
                        "notify pass failed: network={} watermark={} error={}",
                        self.network, watermark, err
                    );
                }
            }

            tokio::select! {
                _ = sleep(Duration::from_secs(self.cfg.poll_interval_secs)) => {
                    continue;
               }

                _ = stop_signal.cancelled() => {
                    break;
                }
            };
        }

        info!("notifier stopped: network={}", self.network);
    }

    /// One delivery pass. Returns the new watermark: the highest confirmed
    /// height when everything went out, or `failed_height - 1` on a delivery
    /// failure so the caller resumes exactly there.
    pub async fn notify(&self, last_notified_height: i64) -> anyhow::Result<i64> {
        let last_block = self
            .store
            .last_unnotified_success_block(self.network)
            .await?;

        let Some(last_block) = last_block else {
            return Ok(last_notified_height);
        };
        if last_block.number < last_notified_height {
            return Ok(last_notified_height);
        }

        let currency = self.network.native_currency();

        for height in last_notified_height + 1..=last_block.number {
            let block = self.store.success_block_at(self.network, height).await?;

            // Heights without a confirmed block (forked slots, gaps) and
            // already-delivered blocks are skipped, not retried.
            let Some(block) = block else {
                debug!("skip block: network={} height={}", self.network, height);
                continue;
            };
            if block.is_notified {
                debug!("skip block: network={} height={}", self.network, height);
                continue;
            }

            let events = self.store.unnotified_events(block.id, currency).await?;
            let batch: Vec<TransactionRs> = events
                .iter()
                .map(|row| TransactionRs::from_event(row, currency))
                .collect();

            if !batch.is_empty() {
                if !self.deliver(&batch).await {
                    info!(
                        "delivery failed, stalling: network={} height={} events={}",
                        self.network,
                        height,
                        batch.len()
                    );
                    return Ok(height - 1);
                }

                info!(
                    "delivered block events: network={} height={} events={}",
                    self.network,
                    height,
                    batch.len()
                );
                self.store.set_events_notified(block.id).await?;
            }

            self.store.set_block_notified(block.id).await?;
        }

        Ok(last_block.number)
    }

    /// Success is exactly HTTP 200. Anything else, transport errors and
    /// timeouts included, is a delivery failure.
    async fn deliver(&self, batch: &[TransactionRs]) -> bool {
        let url = format!("{}/notify", self.subscriber_url);
        match self.http.post(&url).json(batch).send().await {
            Ok(rs) => rs.status() == reqwest::StatusCode::OK,
            Err(err) => {
                error!("notify request failed: url={} error={}", url, err);
                false
            }
        }
    }
}
