use crate::gateway::client::StkGateway;
use crate::payments::store::PaymentStore;
use crate::services::reconciliation::{OutcomeSource, ReconcileResult, ReconciliationEngine};
use chrono::{Duration as ChronoDuration, Utc};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub poll_interval: Duration,
    /// A PENDING record older than this is considered missed by the webhook.
    pub stale_after: ChronoDuration,
    pub batch_size: i64,
}

impl SweepConfig {
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        SweepConfig {
            poll_interval: Duration::from_secs(secs("SWEEP_POLL_INTERVAL_SECONDS", 60)),
            stale_after: ChronoDuration::seconds(secs("SWEEP_STALE_AFTER_SECONDS", 180) as i64),
            batch_size: env::var("SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(50),
        }
    }
}

/// Background recovery for payments whose callback never arrived.
///
/// Periodically queries the gateway for stale PENDING records and applies
/// whatever terminal outcome it reports. Settlement goes through the same
/// conditional transition as the callback path, so a callback racing the
/// sweep is harmless.
pub struct RecoverySweep {
    config: SweepConfig,
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn StkGateway>,
    engine: Arc<ReconciliationEngine>,
    shutdown: watch::Receiver<bool>,
}

impl RecoverySweep {
    pub fn new(
        config: SweepConfig,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn StkGateway>,
        engine: Arc<ReconciliationEngine>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            engine,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            stale_after_secs = self.config.stale_after.num_seconds(),
            "recovery sweep started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("recovery sweep shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn sweep_once(&self) {
        let cutoff = Utc::now() - self.config.stale_after;
        let stale = match self
            .store
            .find_stale_pending(cutoff, self.config.batch_size)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "sweep could not list stale payments");
                return;
            }
        };

        if stale.is_empty() {
            debug!("sweep found no stale pending payments");
            return;
        }
        info!(count = stale.len(), "sweeping stale pending payments");

        let mut settled = 0usize;
        for record in stale {
            let Some(correlation_id) = record.checkout_request_id.as_deref() else {
                continue;
            };
            match self
                .engine
                .reconcile_by_query(self.gateway.as_ref(), correlation_id, OutcomeSource::Sweep)
                .await
            {
                Ok(ReconcileResult::Applied(_)) => settled += 1,
                Ok(ReconcileResult::StillPending) => {
                    debug!(correlation_id, "still pending at gateway");
                }
                Ok(_) => {}
                // Leave the record for the next cycle.
                Err(e) => {
                    warn!(correlation_id, error = %e, "sweep reconciliation failed");
                }
            }
        }
        if settled > 0 {
            info!(settled, "sweep settled payments");
        }
    }
}
