use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Watcher;
use crate::model::CycleReport;

/// Drive `watcher` until `shutdown` fires, then stop it.
///
/// The first cycle runs immediately. A cycle still running at shutdown gets
/// `grace` to finish before it is dropped.
pub async fn run_watcher(mut watcher: Watcher, shutdown: CancellationToken, grace: Duration) {
    let mut ticker = tokio::time::interval(watcher.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("checking every {}s", watcher.interval().as_secs());

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let finished = {
            let cycle = watcher.run_cycle();
            tokio::pin!(cycle);
            tokio::select! {
                report = &mut cycle => {
                    log_report(&report);
                    true
                }
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, waiting up to {grace:?} for the running cycle");
                    match tokio::time::timeout(grace, &mut cycle).await {
                        Ok(report) => log_report(&report),
                        Err(_) => tracing::warn!("cycle did not finish in time, abandoning it"),
                    }
                    false
                }
            }
        };
        if !finished {
            break;
        }
    }

    watcher.stop().await;
    info!("watcher stopped");
}

fn log_report(report: &CycleReport) {
    for outcome in &report.outcomes {
        let result = outcome.result();
        match &result.error {
            Some(error) => tracing::warn!(check = outcome.name(), "check failed: {error}"),
            None => info!(
                check = outcome.name(),
                met = result.condition_met,
                "{}",
                result.message.as_deref().unwrap_or("")
            ),
        }
    }
}
