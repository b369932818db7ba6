pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod memory;
pub mod ports;
pub mod workflow;

pub use approvals::{
    ApproverResolver, HrAssignment, PolicyRoles, RoleGraph, RoleGraphError, RoleInheritance,
    RoleSnapshot,
};
pub use audit::{replay, ReplayError, ReplayState};
pub use domain::catalog::{QuantityUnit, RequestCategory, RequestTypeCatalog, RequestTypeDefinition};
pub use domain::employee::{CollarType, EmployeeRecord, RoleCode, UserId};
pub use domain::history::{ApprovalAction, ApprovalHistory, AuditEntry, EscalationLog};
pub use domain::request::{
    AbsenceRequest, DateWindow, RequestId, RequestPayload, RequestStatus, Stage, StateStamp,
};
pub use errors::{ValidationFailure, WorkflowError};
pub use flows::{RouteFlags, RouteOutcome, StageRouter};
pub use ports::{
    CommitOutcome, EmployeeDirectory, Notifier, PayrollCalendar, PayrollGateway, PayrollIncidence,
    RequestStore, RoleConfigSource, ShiftException, StageNotification, TransitionCommit,
};
pub use workflow::{
    ActionCommand, EscalationSweeper, NewRequest, SweepReport, WorkflowPorts, WorkflowService,
    WorkflowSettings,
};
