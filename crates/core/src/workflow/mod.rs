//! Request lifecycle orchestration over the ports.

pub mod service;
pub mod sweeper;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use chrono::Duration;

use crate::approvals::{PolicyRoles, DEFAULT_MAX_ROLE_DEPTH};
use crate::config::DEFAULT_ESCALATION_REASON;
use crate::domain::catalog::RequestTypeCatalog;
use crate::ports::{
    EmployeeDirectory, Notifier, PayrollCalendar, PayrollGateway, RequestStore, RoleConfigSource,
};

pub use service::{ActionCommand, NewRequest, WorkflowService};
pub use sweeper::{EscalationSweeper, SweepFailure, SweepReport};

/// Policy inputs. Passed in explicitly so tests control every threshold.
#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub escalation_threshold: Duration,
    pub escalation_reason: String,
    pub roles: PolicyRoles,
    pub max_role_depth: usize,
    pub catalog: RequestTypeCatalog,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            escalation_threshold: Duration::hours(24),
            escalation_reason: DEFAULT_ESCALATION_REASON.to_owned(),
            roles: PolicyRoles::default(),
            max_role_depth: DEFAULT_MAX_ROLE_DEPTH,
            catalog: RequestTypeCatalog::standard(),
        }
    }
}

#[derive(Clone)]
pub struct WorkflowPorts {
    pub directory: Arc<dyn EmployeeDirectory>,
    pub role_config: Arc<dyn RoleConfigSource>,
    pub calendar: Arc<dyn PayrollCalendar>,
    pub store: Arc<dyn RequestStore>,
    pub payroll: Arc<dyn PayrollGateway>,
    pub notifier: Arc<dyn Notifier>,
}
