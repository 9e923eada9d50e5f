//! Connectivity detection by polling the origin.
//!
//! Any HTTP answer from the origin counts as online, whatever its status.
//! Only a failed request counts as offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::coordinator::Connectivity;
use crate::cache::{AssetRequest, Fetcher};

/// Request the origin root once and classify the outcome.
pub async fn check_reachability(fetcher: &dyn Fetcher) -> Connectivity {
    match fetcher.fetch(&AssetRequest::get("/")).await {
        Ok(response) => {
            debug!(status = %response.status, "Origin reachable");
            Connectivity::Online
        }
        Err(e) => {
            debug!(error = %e, "Origin unreachable");
            Connectivity::Offline
        }
    }
}

/// Spawn a task reporting reachability every `interval` into `reports`.
///
/// The coordinator ignores repeats, so every check is sent. The task ends
/// when the receiving side closes.
pub fn spawn_reachability_monitor(
    fetcher: Arc<dyn Fetcher>,
    interval: Duration,
    reports: mpsc::Sender<Connectivity>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Reachability monitor started");
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            let connectivity = check_reachability(fetcher.as_ref()).await;
            if reports.send(connectivity).await.is_err() {
                break;
            }
        }
        debug!("Reachability monitor stopped");
    })
}
