use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::history::{ApprovalAction, EscalationLog};
use crate::domain::request::{AbsenceRequest, RequestId};
use crate::errors::WorkflowError;
use crate::flows::processor::plan_escalation;
use crate::ports::CommitOutcome;
use crate::workflow::WorkflowService;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub request_id: RequestId,
    pub error_class: &'static str,
    pub message: String,
}

/// Outcome of one pass. Requests that lost a race to a human action are
/// `skipped` and picked up again next pass if still stalled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub escalated: Vec<EscalationLog>,
    pub skipped: Vec<RequestId>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct EscalationSweeper {
    workflow: WorkflowService,
}

impl EscalationSweeper {
    pub fn new(workflow: WorkflowService) -> Self {
        Self { workflow }
    }

    /// Escalates every pending request idle for at least the configured
    /// threshold as of `now`. A failing request never stops the pass.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let idle_since = now - self.workflow.settings().escalation_threshold;
        let stalled = self.workflow.ports().store.list_stalled(idle_since).await?;

        let mut report = SweepReport::default();
        for request in stalled {
            match self.escalate(&request, now).await {
                Ok(Some(log)) => report.escalated.push(log),
                Ok(None) => {
                    info!(
                        event_name = "workflow.sweep.skipped",
                        request_id = %request.id,
                        stage = %request.current_stage,
                        "request changed during sweep"
                    );
                    report.skipped.push(request.id);
                }
                Err(error) => {
                    warn!(
                        event_name = "workflow.sweep.failed",
                        request_id = %request.id,
                        stage = %request.current_stage,
                        error_class = error.error_class(),
                        error = %error,
                        "escalation failed"
                    );
                    report.failures.push(SweepFailure {
                        request_id: request.id,
                        error_class: error.error_class(),
                        message: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn escalate(
        &self,
        request: &AbsenceRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<EscalationLog>, WorkflowError> {
        let workflow = &self.workflow;
        let reason = workflow.settings().escalation_reason.as_str();
        let context = workflow.routing_context(request).await?;
        let resolver = workflow.resolver(&context.snapshot);

        let outcome =
            workflow.router().route(request.current_stage, ApprovalAction::Approved, &context.flags);
        let notified = workflow.next_recipients(&resolver, &context.employee, outcome).await?;
        let planned = plan_escalation(
            request,
            workflow.router(),
            &context.flags,
            now,
            reason,
            notified.clone(),
        )?;

        if workflow.ports().store.commit(planned.commit.clone()).await? == CommitOutcome::Conflict {
            return Ok(None);
        }
        info!(
            event_name = "workflow.sweep.escalated",
            request_id = %request.id,
            from_stage = %planned.from_stage,
            stage = %planned.request().current_stage,
            escalation_count = planned.request().escalation_count,
            "stalled request escalated"
        );
        workflow.dispatch_effects(&planned, notified, reason).await;

        Ok(planned.commit.escalation)
    }
}
