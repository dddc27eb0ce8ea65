//! Rolling analytics: burn-rate extrapolation (§4.7) and alert evaluation (§4.8).

pub mod alerts;
pub mod burn_rate;

pub use alerts::{AlertEngine, AlertRule, CostRateSurgeRule, ErrorStormRule, LoopDetectorRule, Notifier};
pub use burn_rate::{classify_threshold, BurnRateCalculator, BurnRateSnapshot, ModelRate, ThresholdColor, Trend};

use crate::persistence::{BurnRateSnapshotRow, Storage};
use crate::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Drives burn-rate recomputation then alert evaluation on a single tick,
/// sequentially (spec.md §5: "running burn-rate recomputation and alert
/// evaluation sequentially"). Publishes the computed snapshot to `latest`
/// (read by `BurnRateProvider`) and persists it alongside any firing alerts,
/// since a tick is the natural point to record history for the UI's
/// history provider (spec.md §6 "Persisted state (optional)").
#[allow(clippy::too_many_arguments)]
pub async fn start_periodic_analytics(
    store: Arc<SessionStore>,
    burn_rate: Arc<BurnRateCalculator>,
    alerts: Arc<AlertEngine>,
    storage: Arc<dyn Storage>,
    latest: Arc<RwLock<BurnRateSnapshot>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = crate::domain::Timestamp::now().0;
                let snapshot = burn_rate.compute(&store, now).await;
                let fired = alerts.evaluate(&store, &snapshot, now).await;

                *latest.write().await = snapshot.clone();

                if let Err(err) = storage
                    .record_burn_rate_snapshot(&BurnRateSnapshotRow {
                        timestamp: now,
                        hourly_rate: snapshot.hourly_rate,
                        token_velocity_per_min: snapshot.token_velocity_per_min,
                    })
                    .await
                {
                    warn!(%err, "failed to persist burn-rate snapshot");
                }
                for alert in &fired {
                    if let Err(err) = storage.record_alert(alert).await {
                        warn!(%err, "failed to persist alert");
                    }
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}
