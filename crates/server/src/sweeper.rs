use std::time::Duration;

use chrono::Utc;
use leaveflow_core::{EscalationSweeper, SweepReport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Runs one escalation pass per `interval` until `shutdown` flips to true.
/// The first pass runs immediately.
pub fn spawn(
    sweeper: EscalationSweeper,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            event_name = "system.sweeper.started",
            interval_secs = interval.as_secs(),
            "escalation sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_pass(&sweeper).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "system.sweeper.stopped", "escalation sweeper stopped");
    })
}

async fn run_pass(sweeper: &EscalationSweeper) -> Option<SweepReport> {
    match sweeper.sweep_once(Utc::now()).await {
        Ok(report) => {
            if report.is_clean() {
                info!(
                    event_name = "system.sweeper.pass",
                    escalated = report.escalated.len(),
                    skipped = report.skipped.len(),
                    "escalation pass finished"
                );
            } else {
                warn!(
                    event_name = "system.sweeper.pass",
                    escalated = report.escalated.len(),
                    skipped = report.skipped.len(),
                    failures = report.failures.len(),
                    "escalation pass finished with failures"
                );
            }
            Some(report)
        }
        Err(error) => {
            error!(
                event_name = "system.sweeper.error",
                error_class = error.error_class(),
                error = %error,
                "escalation pass aborted"
            );
            None
        }
    }
}
