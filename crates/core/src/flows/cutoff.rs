use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeRecord;
use crate::domain::request::{AbsenceRequest, DateWindow, Stage};
use crate::errors::WorkflowError;
use crate::flows::router::RouteOutcome;
use crate::ports::PayrollCalendar;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollFlags {
    pub late_approval: bool,
    pub excluded_from_payroll: bool,
}

/// Cutoff of the period the request targets. Computed once, at creation.
pub async fn compute_cutoff(
    calendar: &dyn PayrollCalendar,
    employee: &EmployeeRecord,
    window: &DateWindow,
) -> Result<DateTime<Utc>, WorkflowError> {
    calendar.cutoff_for(employee, window).await
}

/// Flags for a transition decided at `stage`. Non-terminal outcomes carry
/// no flags; rejections only exclude once HR had the request.
pub fn payroll_flags(
    outcome: RouteOutcome,
    stage: Stage,
    decided_at: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> PayrollFlags {
    match outcome {
        RouteOutcome::Advance(_) => PayrollFlags::default(),
        RouteOutcome::Approved => {
            PayrollFlags { late_approval: decided_at > cutoff, excluded_from_payroll: false }
        }
        RouteOutcome::Declined => {
            PayrollFlags { late_approval: false, excluded_from_payroll: stage.is_hr_capable() }
        }
    }
}

/// Freezes the flags on a request leaving PENDING. Terminal requests are
/// never restamped.
pub fn stamp_terminal(
    request: &mut AbsenceRequest,
    outcome: RouteOutcome,
    stage: Stage,
    decided_at: DateTime<Utc>,
) {
    if matches!(outcome, RouteOutcome::Advance(_)) || !request.is_pending() {
        return;
    }
    let flags = payroll_flags(outcome, stage, decided_at, request.payroll_cutoff_date);
    request.late_approval_flag = flags.late_approval;
    request.excluded_from_payroll = flags.excluded_from_payroll;
}
