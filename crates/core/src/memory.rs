//! In-process implementations of every port. Used by tests, by the CLI's
//! dry runs and by anyone embedding the workflow without a database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::approvals::{HrAssignment, RoleInheritance};
use crate::audit::commit_order;
use crate::domain::employee::{EmployeeRecord, RoleCode, UserId};
use crate::domain::history::AuditEntry;
use crate::domain::request::{AbsenceRequest, DateWindow, RequestId, RequestStatus, Stage};
use crate::errors::WorkflowError;
use crate::ports::{
    CommitOutcome, EmployeeDirectory, Notifier, PayrollCalendar, PayrollGateway, PayrollIncidence,
    RequestStore, RoleConfigSource, ShiftException, StageNotification, TransitionCommit,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    employees: Arc<Mutex<BTreeMap<UserId, EmployeeRecord>>>,
}

impl InMemoryDirectory {
    pub fn new(records: Vec<EmployeeRecord>) -> Self {
        let employees =
            records.into_iter().map(|record| (record.employee_id.clone(), record)).collect();
        Self { employees: Arc::new(Mutex::new(employees)) }
    }

    pub fn get(&self, id: &UserId) -> Option<EmployeeRecord> {
        lock(&self.employees).get(id).cloned()
    }

    pub fn upsert(&self, record: EmployeeRecord) {
        lock(&self.employees).insert(record.employee_id.clone(), record);
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryDirectory {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, WorkflowError> {
        Ok(self.get(id))
    }

    async fn list_by_role(&self, role: &RoleCode) -> Result<Vec<EmployeeRecord>, WorkflowError> {
        Ok(lock(&self.employees)
            .values()
            .filter(|record| &record.assigned_role == role)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRoleConfig {
    edges: Arc<Mutex<Vec<RoleInheritance>>>,
    assignments: Arc<Mutex<Vec<HrAssignment>>>,
}

impl InMemoryRoleConfig {
    pub fn new(edges: Vec<RoleInheritance>, assignments: Vec<HrAssignment>) -> Self {
        Self { edges: Arc::new(Mutex::new(edges)), assignments: Arc::new(Mutex::new(assignments)) }
    }

    pub fn replace_edges(&self, edges: Vec<RoleInheritance>) {
        *lock(&self.edges) = edges;
    }

    pub fn replace_assignments(&self, assignments: Vec<HrAssignment>) {
        *lock(&self.assignments) = assignments;
    }
}

#[async_trait]
impl RoleConfigSource for InMemoryRoleConfig {
    async fn role_edges(&self) -> Result<Vec<RoleInheritance>, WorkflowError> {
        Ok(lock(&self.edges).clone())
    }

    async fn hr_assignments(&self) -> Result<Vec<HrAssignment>, WorkflowError> {
        Ok(lock(&self.assignments).clone())
    }
}

/// Every window shares the same cutoff.
#[derive(Clone, Debug)]
pub struct FixedCutoffCalendar {
    cutoff: DateTime<Utc>,
}

impl FixedCutoffCalendar {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }
}

#[async_trait]
impl PayrollCalendar for FixedCutoffCalendar {
    async fn cutoff_for(
        &self,
        _employee: &EmployeeRecord,
        _window: &DateWindow,
    ) -> Result<DateTime<Utc>, WorkflowError> {
        Ok(self.cutoff)
    }
}

#[derive(Default)]
struct StoreState {
    requests: BTreeMap<RequestId, AbsenceRequest>,
    trail: Vec<AuditEntry>,
}

/// Check-and-set happens under one lock, so a commit is atomic with respect
/// to every other call on the same store.
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRequestStore {
    pub fn requests(&self) -> Vec<AbsenceRequest> {
        lock(&self.state).requests.values().cloned().collect()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: AbsenceRequest) -> Result<(), WorkflowError> {
        let mut state = lock(&self.state);
        if state.requests.contains_key(&request.id) {
            return Err(WorkflowError::conflict(&request.id, "request already exists"));
        }
        state.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AbsenceRequest>, WorkflowError> {
        Ok(lock(&self.state).requests.get(id).cloned())
    }

    async fn list_pending(
        &self,
        stage: Option<Stage>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        Ok(lock(&self.state)
            .requests
            .values()
            .filter(|request| request.is_pending())
            .filter(|request| stage.map_or(true, |stage| request.current_stage == stage))
            .cloned()
            .collect())
    }

    async fn list_stalled(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        let mut stalled: Vec<AbsenceRequest> = lock(&self.state)
            .requests
            .values()
            .filter(|request| request.is_pending() && request.last_action_at <= idle_since)
            .cloned()
            .collect();
        stalled.sort_by_key(|request| request.last_action_at);
        Ok(stalled)
    }

    async fn list_overlapping(
        &self,
        employee_id: &UserId,
        window: &DateWindow,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        Ok(lock(&self.state)
            .requests
            .values()
            .filter(|request| &request.employee_id == employee_id)
            .filter(|request| {
                matches!(request.status, RequestStatus::Pending | RequestStatus::Approved)
            })
            .filter(|request| request.window.overlaps(window))
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, WorkflowError> {
        let mut state = lock(&self.state);
        let Some(stored) = state.requests.get(&commit.request.id) else {
            return Err(WorkflowError::NotFound(commit.request.id.clone()));
        };
        if !stored.matches_stamp(&commit.expected) {
            return Ok(CommitOutcome::Conflict);
        }

        state.requests.insert(commit.request.id.clone(), commit.request);
        if let Some(history) = commit.approval {
            state.trail.push(AuditEntry::Approval(history));
        }
        if let Some(log) = commit.escalation {
            state.trail.push(AuditEntry::Escalation(log));
        }
        Ok(CommitOutcome::Applied)
    }

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEntry>, WorkflowError> {
        let mut entries: Vec<AuditEntry> = lock(&self.state)
            .trail
            .iter()
            .filter(|entry| entry.request_id() == id)
            .cloned()
            .collect();
        commit_order(&mut entries);
        Ok(entries)
    }
}

/// Records every outbound payroll and notification call. Can be switched to
/// fail so effect isolation is observable.
#[derive(Clone, Default)]
pub struct RecordingOutbox {
    incidences: Arc<Mutex<Vec<PayrollIncidence>>>,
    shift_exceptions: Arc<Mutex<Vec<ShiftException>>>,
    notifications: Arc<Mutex<Vec<StageNotification>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingOutbox {
    pub fn failing() -> Self {
        let outbox = Self::default();
        outbox.set_failing(true);
        outbox
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn incidences(&self) -> Vec<PayrollIncidence> {
        lock(&self.incidences).clone()
    }

    pub fn shift_exceptions(&self) -> Vec<ShiftException> {
        lock(&self.shift_exceptions).clone()
    }

    pub fn notifications(&self) -> Vec<StageNotification> {
        lock(&self.notifications).clone()
    }

    fn check(&self, what: &str) -> Result<(), WorkflowError> {
        if *lock(&self.failing) {
            return Err(WorkflowError::Integration(format!("{what} endpoint unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl PayrollGateway for RecordingOutbox {
    async fn create_incidence(&self, incidence: PayrollIncidence) -> Result<(), WorkflowError> {
        self.check("payroll incidence")?;
        lock(&self.incidences).push(incidence);
        Ok(())
    }

    async fn create_shift_exception(&self, exception: ShiftException) -> Result<(), WorkflowError> {
        self.check("shift exception")?;
        lock(&self.shift_exceptions).push(exception);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingOutbox {
    async fn notify(&self, notification: StageNotification) -> Result<(), WorkflowError> {
        self.check("notification")?;
        lock(&self.notifications).push(notification);
        Ok(())
    }
}
