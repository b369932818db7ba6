//! Read-side commands over the workflow service.

use leaveflow_core::audit::{replay, ReplayState};
use leaveflow_core::{AbsenceRequest, AuditEntry, RequestId, RequestStatus, Stage, UserId};
use serde::Serialize;
use serde_json::Value;

use crate::commands::session::{execute, Failure, EXIT_WORKFLOW};
use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ReplaySummary {
    state: Option<ReplayState>,
    error: Option<String>,
    consistent: bool,
}

#[derive(Debug, Serialize)]
struct TrailReport {
    request: AbsenceRequest,
    entries: Vec<AuditEntry>,
    replay: ReplaySummary,
}

fn to_data<T: Serialize>(value: &T) -> Result<Option<Value>, Failure> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|error| Failure::new("serialization", error.to_string(), EXIT_WORKFLOW))
}

pub fn pending(stage: Stage, actor: &str) -> CommandResult {
    let actor = UserId::new(actor);
    execute("pending", |session| async move {
        let requests = session.workflow().list_pending_for_stage(stage, &actor).await?;
        let message = format!("{} pending at {stage} for `{actor}`", requests.len());
        let data = to_data(&requests)?;
        Ok::<_, Failure>(CommandResult::success_with_data("pending", message, data))
    })
}

pub fn counts(actor: &str) -> CommandResult {
    let actor = UserId::new(actor);
    execute("counts", |session| async move {
        let counts = session.workflow().counts(&actor).await?;
        let total: usize = counts.values().sum();
        let message = format!("{total} pending across {} stages for `{actor}`", counts.len());
        let data = to_data(&counts)?;
        Ok::<_, Failure>(CommandResult::success_with_data("counts", message, data))
    })
}

/// Audit trail plus a replay of it. The replay uses the routing that
/// applies today, so a reconfigured role graph can make old trails diverge.
/// Archived requests are checked against the terminal outcome they were
/// archived from, since archival leaves no trail entry.
pub fn trail(request_id: &str) -> CommandResult {
    let request_id = RequestId(request_id.to_string());
    execute("trail", |session| async move {
        let workflow = session.workflow();
        let request = workflow.find_request(&request_id).await?;
        let entries = workflow.audit_trail(&request_id).await?;

        let flags = workflow.route_flags(&request.employee_id, &request.request_type).await?;
        let initial_stage = workflow.router().initial_stage(&flags);
        let summary = match replay(workflow.router(), &flags, initial_stage, &entries) {
            Ok(state) => ReplaySummary {
                consistent: replay_matches(&request, &state),
                state: Some(state),
                error: None,
            },
            Err(error) => {
                ReplaySummary { state: None, error: Some(error.to_string()), consistent: false }
            }
        };

        let message = format!("{} audit entries for `{request_id}`", entries.len());
        let data = to_data(&TrailReport { request, entries, replay: summary })?;
        Ok::<_, Failure>(CommandResult::success_with_data("trail", message, data))
    })
}

fn replay_matches(request: &AbsenceRequest, state: &ReplayState) -> bool {
    let status_matches = match request.status {
        RequestStatus::Archived => {
            matches!(state.status, RequestStatus::Approved | RequestStatus::Declined)
        }
        status => state.status == status,
    };
    status_matches && state.current_stage == request.current_stage
}
