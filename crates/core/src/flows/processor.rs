//! Pure transition planning. Each function validates the observed request and
//! returns the complete commit for one step; nothing here performs I/O.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::employee::UserId;
use crate::domain::history::{ApprovalAction, ApprovalHistory, EscalationLog};
use crate::domain::request::{AbsenceRequest, RequestStatus, Stage};
use crate::errors::WorkflowError;
use crate::flows::cutoff::stamp_terminal;
use crate::flows::router::{RouteFlags, RouteOutcome, StageRouter};
use crate::ports::TransitionCommit;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionInput {
    pub actor: UserId,
    pub action: ApprovalAction,
    pub claimed_stage: Stage,
    pub comment: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedTransition {
    pub from_stage: Stage,
    pub outcome: RouteOutcome,
    pub commit: TransitionCommit,
}

impl PlannedTransition {
    pub fn request(&self) -> &AbsenceRequest {
        &self.commit.request
    }
}

/// Fails with a conflict unless the request is pending at `claimed_stage`.
pub fn ensure_actionable(
    request: &AbsenceRequest,
    claimed_stage: Stage,
) -> Result<(), WorkflowError> {
    if !request.is_pending() {
        return Err(WorkflowError::not_pending(&request.id, request.status));
    }
    if request.current_stage != claimed_stage {
        return Err(WorkflowError::conflict(
            &request.id,
            format!(
                "claimed stage {claimed_stage} but request is at {}",
                request.current_stage
            ),
        ));
    }
    Ok(())
}

/// Human approve/decline. Authorization is checked by the caller.
pub fn plan_action(
    request: &AbsenceRequest,
    router: &StageRouter,
    flags: &RouteFlags,
    input: ActionInput,
) -> Result<PlannedTransition, WorkflowError> {
    ensure_actionable(request, input.claimed_stage)?;

    let from_stage = request.current_stage;
    let decided_at = decision_time(request, input.now);
    let outcome = router.route(from_stage, input.action, flags);
    let updated = advance(request, outcome, decided_at);
    let history = ApprovalHistory {
        id: Uuid::new_v4().to_string(),
        request_id: request.id.clone(),
        approver: input.actor,
        stage: from_stage,
        action: input.action,
        comment: input.comment.filter(|comment| !comment.trim().is_empty()),
        occurred_at: decided_at,
        state_version: updated.state_version,
    };

    Ok(PlannedTransition {
        from_stage,
        outcome,
        commit: TransitionCommit {
            expected: request.stamp(),
            request: updated,
            approval: Some(history),
            escalation: None,
        },
    })
}

/// Employee withdrawal: a decline recorded under the owner's identity.
pub fn plan_withdrawal(
    request: &AbsenceRequest,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<PlannedTransition, WorkflowError> {
    ensure_actionable(request, request.current_stage)?;

    let from_stage = request.current_stage;
    let decided_at = decision_time(request, now);
    let updated = advance(request, RouteOutcome::Declined, decided_at);
    let history = ApprovalHistory {
        id: Uuid::new_v4().to_string(),
        request_id: request.id.clone(),
        approver: request.employee_id.clone(),
        stage: from_stage,
        action: ApprovalAction::Declined,
        comment: Some(comment.unwrap_or_else(|| "withdrawn by employee".to_owned())),
        occurred_at: decided_at,
        state_version: updated.state_version,
    };

    Ok(PlannedTransition {
        from_stage,
        outcome: RouteOutcome::Declined,
        commit: TransitionCommit {
            expected: request.stamp(),
            request: updated,
            approval: Some(history),
            escalation: None,
        },
    })
}

/// System advance of a stalled request; behaves like an approval at the
/// current stage.
pub fn plan_escalation(
    request: &AbsenceRequest,
    router: &StageRouter,
    flags: &RouteFlags,
    now: DateTime<Utc>,
    reason: &str,
    notified: BTreeSet<UserId>,
) -> Result<PlannedTransition, WorkflowError> {
    ensure_actionable(request, request.current_stage)?;

    let from_stage = request.current_stage;
    let decided_at = decision_time(request, now);
    let outcome = router.route(from_stage, ApprovalAction::Approved, flags);
    let mut updated = advance(request, outcome, decided_at);
    updated.escalation_count += 1;
    updated.is_escalated = true;

    let log = EscalationLog {
        id: Uuid::new_v4().to_string(),
        request_id: request.id.clone(),
        from_stage,
        to_stage: updated.current_stage,
        occurred_at: decided_at,
        reason: reason.to_owned(),
        notified,
        state_version: updated.state_version,
    };

    Ok(PlannedTransition {
        from_stage,
        outcome,
        commit: TransitionCommit {
            expected: request.stamp(),
            request: updated,
            approval: None,
            escalation: Some(log),
        },
    })
}

/// Soft-terminal marker; only approved or declined requests may be archived.
pub fn plan_archive(
    request: &AbsenceRequest,
    now: DateTime<Utc>,
) -> Result<TransitionCommit, WorkflowError> {
    match request.status {
        RequestStatus::Approved | RequestStatus::Declined => {}
        RequestStatus::Pending => {
            return Err(WorkflowError::conflict(&request.id, "pending requests cannot be archived"));
        }
        RequestStatus::Archived => {
            return Err(WorkflowError::not_pending(&request.id, request.status));
        }
    }

    let mut updated = request.clone();
    updated.status = RequestStatus::Archived;
    updated.last_action_at = decision_time(request, now);
    updated.state_version += 1;

    Ok(TransitionCommit { expected: request.stamp(), request: updated, approval: None, escalation: None })
}

/// A caller clock behind the last recorded action is lifted to it, so
/// `last_action_at` and trail timestamps never run backwards.
fn decision_time(request: &AbsenceRequest, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(request.last_action_at)
}

fn advance(request: &AbsenceRequest, outcome: RouteOutcome, now: DateTime<Utc>) -> AbsenceRequest {
    let mut updated = request.clone();
    stamp_terminal(&mut updated, outcome, request.current_stage, now);

    match outcome {
        RouteOutcome::Advance(next) => updated.current_stage = next,
        RouteOutcome::Approved => {
            updated.status = RequestStatus::Approved;
            updated.current_stage = Stage::Completed;
        }
        // The stage a decline happened at stays visible on the record.
        RouteOutcome::Declined => updated.status = RequestStatus::Declined,
    }
    updated.last_action_at = now;
    updated.state_version += 1;
    updated
}
