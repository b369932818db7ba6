use std::collections::BTreeSet;

use crate::approvals::roles::{HrAssignment, RoleGraph};
use crate::domain::catalog::RequestTypeDefinition;
use crate::domain::employee::{EmployeeRecord, RoleCode, UserId};
use crate::domain::request::Stage;
use crate::errors::WorkflowError;
use crate::flows::router::RouteFacts;
use crate::ports::{EmployeeDirectory, RoleConfigSource};

/// Role names the policy refers to by meaning rather than by data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRoles {
    pub hr: RoleCode,
    pub payroll: RoleCode,
    pub admin: RoleCode,
    pub general_manager: RoleCode,
    /// Roles that already encompass supervisor and general-manager authority.
    pub combined: Vec<RoleCode>,
}

impl Default for PolicyRoles {
    fn default() -> Self {
        Self {
            hr: RoleCode::new("HR"),
            payroll: RoleCode::new("PAYROLL"),
            admin: RoleCode::new("ADMIN"),
            general_manager: RoleCode::new("GENERAL_MANAGER"),
            combined: vec![RoleCode::new("SUPERVISOR_GENERAL_MANAGER")],
        }
    }
}

/// Role configuration as read for a single operation.
#[derive(Clone, Debug, Default)]
pub struct RoleSnapshot {
    pub graph: RoleGraph,
    pub hr_assignments: Vec<HrAssignment>,
}

impl RoleSnapshot {
    pub async fn load(
        source: &dyn RoleConfigSource,
        max_depth: usize,
    ) -> Result<Self, WorkflowError> {
        let edges = source.role_edges().await?;
        let hr_assignments = source.hr_assignments().await?;
        Ok(Self { graph: RoleGraph::with_max_depth(edges, max_depth), hr_assignments })
    }
}

pub struct ApproverResolver<'a> {
    directory: &'a dyn EmployeeDirectory,
    snapshot: &'a RoleSnapshot,
    roles: &'a PolicyRoles,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(
        directory: &'a dyn EmployeeDirectory,
        snapshot: &'a RoleSnapshot,
        roles: &'a PolicyRoles,
    ) -> Self {
        Self { directory, snapshot, roles }
    }

    /// Identities allowed to act on `stage` for `employee`. Never empty.
    pub async fn resolve(
        &self,
        employee: &EmployeeRecord,
        stage: Stage,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        let approvers: BTreeSet<UserId> = match stage {
            Stage::Supervisor => employee.supervisor_id.iter().cloned().collect(),
            Stage::Manager | Stage::GeneralManager => {
                self.general_manager_of(employee).await?.into_iter().collect()
            }
            Stage::Hr | Stage::HrBlueGray => self.hr_approvers(employee).await?,
            Stage::Payroll => self
                .directory
                .list_by_role(&self.roles.payroll)
                .await?
                .into_iter()
                .map(|record| record.employee_id)
                .collect(),
            Stage::Completed => BTreeSet::new(),
        };

        if approvers.is_empty() {
            return Err(WorkflowError::Configuration {
                stage,
                employee_id: employee.employee_id.clone(),
            });
        }
        Ok(approvers)
    }

    /// Admits the resolved approvers and anyone whose role strictly inherits
    /// the role of one of them.
    pub async fn authorize(
        &self,
        actor: &UserId,
        employee: &EmployeeRecord,
        stage: Stage,
    ) -> Result<(), WorkflowError> {
        let approvers = self.resolve(employee, stage).await?;
        if approvers.contains(actor) {
            return Ok(());
        }

        let denied = || WorkflowError::Authorization { actor: actor.clone(), stage };
        let Some(actor_record) = self.directory.find_employee(actor).await? else {
            return Err(denied());
        };

        for approver in &approvers {
            let Some(record) = self.directory.find_employee(approver).await? else {
                continue;
            };
            if self.snapshot.graph.strictly_inherits(&actor_record.assigned_role, &record.assigned_role)
            {
                return Ok(());
            }
        }

        Err(denied())
    }

    pub async fn is_admin(&self, actor: &UserId) -> Result<bool, WorkflowError> {
        let Some(record) = self.directory.find_employee(actor).await? else {
            return Ok(false);
        };
        Ok(self.snapshot.graph.inherits(&record.assigned_role, &self.roles.admin))
    }

    /// Collects what the router needs to know about the approval line.
    pub async fn route_facts(
        &self,
        employee: &EmployeeRecord,
        definition: &RequestTypeDefinition,
    ) -> Result<RouteFacts, WorkflowError> {
        let supervisor_role = match &employee.supervisor_id {
            Some(id) => self.directory.find_employee(id).await?.map(|record| record.assigned_role),
            None => None,
        };
        let manager_role = match self.general_manager_of(employee).await? {
            Some(id) => self.directory.find_employee(&id).await?.map(|record| record.assigned_role),
            None => None,
        };

        Ok(RouteFacts {
            collar_type: employee.collar_type,
            hr_mandatory: definition.hr_mandatory,
            supervisor_role,
            manager_role,
        })
    }

    async fn general_manager_of(
        &self,
        employee: &EmployeeRecord,
    ) -> Result<Option<UserId>, WorkflowError> {
        if let Some(id) = &employee.general_manager_id {
            return Ok(Some(id.clone()));
        }
        let Some(supervisor_id) = &employee.supervisor_id else {
            return Ok(None);
        };
        Ok(self
            .directory
            .find_employee(supervisor_id)
            .await?
            .and_then(|supervisor| supervisor.general_manager_id))
    }

    async fn hr_approvers(
        &self,
        employee: &EmployeeRecord,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        let scoped: BTreeSet<UserId> = self
            .snapshot
            .hr_assignments
            .iter()
            .filter(|assignment| assignment.covers(&employee.employee_type))
            .map(|assignment| assignment.hr_user_id.clone())
            .collect();
        if !scoped.is_empty() {
            return Ok(scoped);
        }

        Ok(self
            .directory
            .list_by_role(&self.roles.hr)
            .await?
            .into_iter()
            .map(|record| record.employee_id)
            .collect())
    }
}
