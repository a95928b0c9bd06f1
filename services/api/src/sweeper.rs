//! services/api/src/sweeper.rs
//!
//! The background task that deletes expired sessions.

use std::{future::Future, time::Duration};
use tax_analysis_core::{AnalysisSessionManager, Outcome};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawns the sweeper. It runs once immediately, then every `period`, until
/// `cancellation_token` is cancelled.
pub fn spawn_session_sweeper(
    manager: AnalysisSessionManager,
    period: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_sweeper(period, cancellation_token, || {
            let manager = manager.clone();
            async move { manager.cleanup_expired_sessions().await }
        })
        .await
    })
}

/// Calls `sweep` on every tick. Failures have already been logged by the
/// manager, so a failed sweep just waits for the next tick.
pub async fn run_sweeper<F, Fut>(period: Duration, cancellation_token: CancellationToken, mut sweep: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<u64>>,
{
    info!(period_secs = period.as_secs(), "Session sweeper started.");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancellation_token.cancelled() => {
                info!("Session sweeper cancelled.");
                return;
            }
            _ = ticker.tick() => {
                let outcome = sweep().await;
                if !outcome.has_warnings() {
                    debug!(deleted = outcome.value, "Session sweep finished.");
                }
            }
        }
    }
}
