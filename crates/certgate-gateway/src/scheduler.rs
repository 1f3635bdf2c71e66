//! Periodic release of held certificates.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::metrics::MetricsHandle;
use crate::storage::{unix_timestamp_ms, GatewayStore};
use crate::upstream::UpstreamClient;

pub struct ReleaseScheduler {
    store: GatewayStore,
    upstream: UpstreamClient,
    metrics: MetricsHandle,
    tick: Duration,
}

impl ReleaseScheduler {
    pub fn new(
        store: GatewayStore,
        upstream: UpstreamClient,
        metrics: MetricsHandle,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            upstream,
            metrics,
            tick,
        }
    }

    /// Tick until the shutdown signal flips. At most one tick runs at a
    /// time; a tick that overruns its interval delays the next one instead
    /// of queueing it.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.tick, "starting certificate release scheduler");
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it so a fresh start waits
        // one full interval like every later round
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("release scheduler stopping");
                    return;
                }
            }
            if *shutdown.borrow() {
                info!("release scheduler stopping");
                return;
            }
            self.process_pending(&shutdown).await;
        }
    }

    /// One scheduler pass: forward every eligible record in id order,
    /// marking each processed on success. Per-record failures are logged
    /// and retried on a later tick.
    pub async fn process_pending(&self, shutdown: &watch::Receiver<bool>) {
        match self.store.get_scheduler_flag().await {
            Ok(true) => {}
            Ok(false) => {
                info!("scheduler is disabled via kill switch, skipping certificate processing");
                return;
            }
            Err(err) => {
                error!(error = %err, "failed to read scheduler status");
                return;
            }
        }

        let delay_seconds = match self.delay_seconds().await {
            Some(delay) => delay,
            None => return,
        };

        let eligible = match self
            .store
            .list_eligible(unix_timestamp_ms(), delay_seconds)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to list eligible certificates");
                return;
            }
        };

        if eligible.is_empty() {
            debug!("no processable certificates found");
            return;
        }

        info!(count = eligible.len(), "found processable certificates");

        for record in eligible {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping mid-batch");
                break;
            }

            match self.upstream.submit_raw(record.raw_request.clone()).await {
                Ok(_) => match self.store.mark_processed(record.id).await {
                    Ok(_) => info!(id = record.id, "certificate released upstream"),
                    Err(err) => {
                        error!(id = record.id, error = %err, "failed to mark certificate processed");
                    }
                },
                Err(status) => {
                    error!(id = record.id, error = %status, "failed to release certificate, will retry next tick");
                }
            }
        }

        self.metrics.trigger();
    }

    async fn delay_seconds(&self) -> Option<i64> {
        let raw = match self.store.get_config("delay_seconds").await {
            Ok(raw) => raw,
            Err(err) => {
                error!(error = %err, "failed to read delay configuration");
                return None;
            }
        };
        match raw.parse::<i64>() {
            Ok(delay) => Some(delay),
            Err(_) => {
                error!(value = %raw, "unparseable delay_seconds configuration");
                None
            }
        }
    }
}
