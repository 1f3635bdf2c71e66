//! Event- and tick-driven recomputation of queue metrics.
//!
//! State changes post a token into a buffered channel; the worker
//! recomputes from storage on every token. A full channel means a
//! recompute is already queued, so extra triggers are dropped. A 5-second
//! heartbeat covers anything that slips through.

mod reporter;

pub use reporter::{PrometheusReporter, Totals};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::storage::{CertificateRecord, GatewayStore};

const TRIGGER_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Cheap cloneable handle for posting a metrics refresh.
#[derive(Clone)]
pub struct MetricsHandle {
    trigger_tx: mpsc::Sender<()>,
}

impl MetricsHandle {
    /// Non-blocking refresh request; dropped when the channel is full.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }
}

pub struct MetricsUpdater {
    store: GatewayStore,
    reporter: Arc<PrometheusReporter>,
}

impl MetricsUpdater {
    pub fn new(store: GatewayStore, reporter: Arc<PrometheusReporter>) -> Self {
        Self { store, reporter }
    }

    /// Spawn the recompute worker and the heartbeat; returns the trigger
    /// handle shared by every component that mutates queue state.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> MetricsHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let handle = MetricsHandle { trigger_tx };

        let mut worker_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = trigger_rx.recv() => self.update().await,
                    _ = worker_shutdown.changed() => return,
                }
            }
        });

        let heartbeat = handle.clone();
        let mut heartbeat_shutdown = shutdown;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("timer based metrics refresh");
                        heartbeat.trigger();
                    }
                    _ = heartbeat_shutdown.changed() => return,
                }
            }
        });

        handle
    }

    async fn update(&self) {
        debug!("updating metrics");
        let unprocessed = match self.store.list_unprocessed().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to list unprocessed certificates");
                return;
            }
        };

        let totals = compute_totals(&unprocessed);
        self.reporter.report_totals(&totals);
    }
}

/// Fold the stored metadata summaries into per-network totals.
pub fn compute_totals(records: &[CertificateRecord]) -> Totals {
    let mut networks: HashMap<u32, BigUint> = HashMap::new();

    for record in records {
        if record.metadata.is_empty() {
            continue;
        }
        let Ok(meta) = serde_json::from_str::<Value>(&record.metadata) else {
            continue;
        };
        let Some(network) = meta.get("network_id").and_then(Value::as_u64) else {
            continue;
        };
        let entry = networks.entry(network as u32).or_default();

        if let Some(exits) = meta.get("bridge_exits").and_then(Value::as_array) {
            for exit in exits {
                if let Some(amount) = exit
                    .get("amount")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    *entry += amount;
                }
            }
        }
    }

    Totals {
        cert_count: records.len() as u64,
        networks,
    }
}
