use chrono::{DateTime, Utc};
use leaveflow_core::EscalationSweeper;

use crate::commands::session::{execute, Failure};
use crate::commands::CommandResult;

/// Exit code when the pass completed but some requests failed to escalate.
pub const EXIT_PARTIAL: u8 = 1;

/// One escalation pass as of `at`, or now.
pub fn run(at: Option<DateTime<Utc>>) -> CommandResult {
    execute("sweep", |session| async move {
        let now = at.unwrap_or_else(Utc::now);
        let report = EscalationSweeper::new(session.workflow()).sweep_once(now).await?;

        let message = format!(
            "escalated {}, skipped {}, failed {}",
            report.escalated.len(),
            report.skipped.len(),
            report.failures.len()
        );
        let clean = report.is_clean();
        let mut result =
            CommandResult::success_with_data("sweep", message, serde_json::to_value(&report).ok());
        if !clean {
            result.exit_code = EXIT_PARTIAL;
        }
        Ok::<_, Failure>(result)
    })
}
