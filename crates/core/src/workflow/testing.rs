//! Shared fixtures for workflow tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use crate::approvals::{HrAssignment, RoleInheritance};
use crate::domain::employee::{CollarType, EmployeeRecord, RoleCode, UserId};
use crate::domain::history::AuditEntry;
use crate::domain::request::{AbsenceRequest, DateWindow, RequestId, RequestPayload, Stage};
use crate::errors::WorkflowError;
use crate::memory::{
    FixedCutoffCalendar, InMemoryDirectory, InMemoryRequestStore, InMemoryRoleConfig,
    RecordingOutbox,
};
use crate::ports::{CommitOutcome, RequestStore, TransitionCommit};
use crate::workflow::{NewRequest, WorkflowPorts, WorkflowService, WorkflowSettings};

pub(crate) struct Harness {
    pub service: WorkflowService,
    pub store: InMemoryRequestStore,
    pub directory: InMemoryDirectory,
    pub role_config: InMemoryRoleConfig,
    pub outbox: RecordingOutbox,
}

pub(crate) fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("base instant") + Duration::hours(hours)
}

pub(crate) fn window(start_day: u32, end_day: u32) -> DateWindow {
    DateWindow::new(
        NaiveDate::from_ymd_opt(2026, 3, start_day).expect("start"),
        NaiveDate::from_ymd_opt(2026, 3, end_day).expect("end"),
    )
}

pub(crate) fn new_request(employee: &str, request_type: &str) -> NewRequest {
    NewRequest {
        employee_id: UserId::new(employee),
        request_type: request_type.to_owned(),
        window: window(10, 12),
        quantity: Decimal::new(3, 0),
        payload: RequestPayload::default(),
    }
}

fn person(
    id: &str,
    role: &str,
    collar: CollarType,
    employee_type: &str,
    supervisor: Option<&str>,
    general_manager: Option<&str>,
) -> EmployeeRecord {
    EmployeeRecord {
        employee_id: UserId::new(id),
        supervisor_id: supervisor.map(UserId::new),
        general_manager_id: general_manager.map(UserId::new),
        collar_type: collar,
        employee_type: employee_type.to_owned(),
        assigned_role: RoleCode::new(role),
    }
}

fn staff() -> Vec<EmployeeRecord> {
    use CollarType::{Blue, White};

    vec![
        person("emp-white", "EMPLOYEE", White, "confidential", Some("sup-plain"), None),
        person("emp-blue", "EMPLOYEE", Blue, "unionized", Some("sup-plain"), None),
        person("emp-combined", "EMPLOYEE", White, "confidential", Some("sup-combined"), None),
        person("emp-orphan", "EMPLOYEE", White, "confidential", None, None),
        person("sup-plain", "SUPERVISOR", White, "confidential", None, Some("mgr-plain")),
        person("sup-combined", "SUPERVISOR_GENERAL_MANAGER", White, "confidential", None, None),
        person("mgr-plain", "MANAGER", White, "confidential", None, None),
        person("hr-1", "HR", White, "confidential", None, None),
        person("hr-union", "HR_BLUE_GRAY", White, "confidential", None, None),
        person("hr-union-2", "HR_BLUE_GRAY", White, "confidential", None, None),
        person("admin-1", "ADMIN", White, "confidential", None, None),
    ]
}

pub(crate) fn role_edges() -> Vec<RoleInheritance> {
    vec![
        RoleInheritance::new("HR_BLUE_GRAY", "HR"),
        RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "SUPERVISOR"),
        RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "GENERAL_MANAGER"),
        RoleInheritance::new("ADMIN", "HR"),
        RoleInheritance::new("ADMIN", "GENERAL_MANAGER"),
    ]
}

fn role_config() -> InMemoryRoleConfig {
    InMemoryRoleConfig::new(role_edges(), vec![HrAssignment::new("hr-union", "unionized")])
}

fn build(store: InMemoryRequestStore, ports_store: Arc<dyn RequestStore>) -> Harness {
    let directory = InMemoryDirectory::new(staff());
    let role_config = role_config();
    let outbox = RecordingOutbox::default();
    let ports = WorkflowPorts {
        directory: Arc::new(directory.clone()),
        role_config: Arc::new(role_config.clone()),
        calendar: Arc::new(FixedCutoffCalendar::new(at(240))),
        store: ports_store,
        payroll: Arc::new(outbox.clone()),
        notifier: Arc::new(outbox.clone()),
    };
    Harness {
        service: WorkflowService::new(ports, WorkflowSettings::default()),
        store,
        directory,
        role_config,
        outbox,
    }
}

pub(crate) fn harness() -> Harness {
    let store = InMemoryRequestStore::default();
    build(store.clone(), Arc::new(store))
}

/// Commits wait until two callers have reached the commit point, so both
/// racers are guaranteed to have read the same state.
pub(crate) fn gated_harness() -> Harness {
    let store = InMemoryRequestStore::default();
    let gated = GatedStore { inner: store.clone(), barrier: Arc::new(Barrier::new(2)) };
    build(store, Arc::new(gated))
}

struct GatedStore {
    inner: InMemoryRequestStore,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl RequestStore for GatedStore {
    async fn insert(&self, request: AbsenceRequest) -> Result<(), WorkflowError> {
        self.inner.insert(request).await
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AbsenceRequest>, WorkflowError> {
        self.inner.find_by_id(id).await
    }

    async fn list_pending(
        &self,
        stage: Option<Stage>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        self.inner.list_pending(stage).await
    }

    async fn list_stalled(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        self.inner.list_stalled(idle_since).await
    }

    async fn list_overlapping(
        &self,
        employee_id: &UserId,
        window: &DateWindow,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        self.inner.list_overlapping(employee_id, window).await
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, WorkflowError> {
        self.barrier.wait().await;
        self.inner.commit(commit).await
    }

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEntry>, WorkflowError> {
        self.inner.audit_trail(id).await
    }
}
