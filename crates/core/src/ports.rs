//! Collaborator seams. Everything the workflow reads from or hands off to
//! the outside world goes through one of these traits.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::{HrAssignment, RoleInheritance};
use crate::domain::employee::{EmployeeRecord, RoleCode, UserId};
use crate::domain::history::{ApprovalHistory, AuditEntry, EscalationLog};
use crate::domain::request::{AbsenceRequest, DateWindow, RequestId, StateStamp, Stage};
use crate::errors::WorkflowError;

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, WorkflowError>;
    async fn list_by_role(&self, role: &RoleCode) -> Result<Vec<EmployeeRecord>, WorkflowError>;
}

/// Read fresh on every resolution; administration may change it at any time.
#[async_trait]
pub trait RoleConfigSource: Send + Sync {
    async fn role_edges(&self) -> Result<Vec<RoleInheritance>, WorkflowError>;
    async fn hr_assignments(&self) -> Result<Vec<HrAssignment>, WorkflowError>;
}

#[async_trait]
pub trait PayrollCalendar: Send + Sync {
    /// Processing cutoff of the payroll period the window falls into.
    async fn cutoff_for(
        &self,
        employee: &EmployeeRecord,
        window: &DateWindow,
    ) -> Result<DateTime<Utc>, WorkflowError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollIncidence {
    pub employee_id: UserId,
    pub request_type: String,
    pub window: DateWindow,
    pub quantity: Decimal,
    pub source_request_id: RequestId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftException {
    pub employee_id: UserId,
    pub date: NaiveDate,
    pub new_shift_id: String,
    pub source_request_id: RequestId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNotification {
    pub recipients: BTreeSet<UserId>,
    pub request_id: RequestId,
    pub new_stage: Stage,
    pub reason: String,
}

#[async_trait]
pub trait PayrollGateway: Send + Sync {
    async fn create_incidence(&self, incidence: PayrollIncidence) -> Result<(), WorkflowError>;
    async fn create_shift_exception(&self, exception: ShiftException) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: StageNotification) -> Result<(), WorkflowError>;
}

/// A single atomic transition: the state update and its audit entry land
/// together or not at all.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionCommit {
    pub expected: StateStamp,
    pub request: AbsenceRequest,
    pub approval: Option<ApprovalHistory>,
    pub escalation: Option<EscalationLog>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// The stored record no longer matches `expected`; nothing was written.
    Conflict,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: AbsenceRequest) -> Result<(), WorkflowError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AbsenceRequest>, WorkflowError>;

    async fn list_pending(&self, stage: Option<Stage>)
        -> Result<Vec<AbsenceRequest>, WorkflowError>;

    /// Pending requests whose last action is at or before `idle_since`.
    async fn list_stalled(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError>;

    /// Pending or approved requests of `employee_id` intersecting `window`.
    async fn list_overlapping(
        &self,
        employee_id: &UserId,
        window: &DateWindow,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError>;

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, WorkflowError>;

    /// Approval and escalation entries in commit order.
    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEntry>, WorkflowError>;
}
