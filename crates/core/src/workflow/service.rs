use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approvals::{ApproverResolver, RoleSnapshot};
use crate::audit::INITIAL_STATE_VERSION;
use crate::domain::catalog::RequestTypeDefinition;
use crate::domain::employee::{EmployeeRecord, UserId};
use crate::domain::history::{ApprovalAction, AuditEntry};
use crate::domain::request::{
    AbsenceRequest, DateWindow, RequestId, RequestPayload, RequestStatus, Stage,
};
use crate::errors::{ValidationFailure, WorkflowError};
use crate::flows::cutoff::compute_cutoff;
use crate::flows::processor::{
    ensure_actionable, plan_action, plan_archive, plan_withdrawal, ActionInput, PlannedTransition,
};
use crate::flows::router::{RouteFlags, RouteOutcome, StageRouter};
use crate::ports::{CommitOutcome, PayrollIncidence, ShiftException, StageNotification};
use crate::workflow::{WorkflowPorts, WorkflowSettings};

#[derive(Clone, Debug, PartialEq)]
pub struct NewRequest {
    pub employee_id: UserId,
    pub request_type: String,
    pub window: DateWindow,
    pub quantity: Decimal,
    pub payload: RequestPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCommand {
    pub request_id: RequestId,
    pub actor: UserId,
    pub action: ApprovalAction,
    pub claimed_stage: Stage,
    pub comment: Option<String>,
}

/// Everything routing needs for one request, read fresh per call.
pub(crate) struct RoutingContext {
    pub employee: EmployeeRecord,
    pub snapshot: RoleSnapshot,
    pub flags: RouteFlags,
}

#[derive(Clone)]
pub struct WorkflowService {
    ports: WorkflowPorts,
    settings: WorkflowSettings,
    router: StageRouter,
}

impl WorkflowService {
    pub fn new(ports: WorkflowPorts, settings: WorkflowSettings) -> Self {
        let router = StageRouter::new(settings.roles.clone());
        Self { ports, settings, router }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn router(&self) -> &StageRouter {
        &self.router
    }

    pub(crate) fn ports(&self) -> &WorkflowPorts {
        &self.ports
    }

    /// Validates, routes and persists a new request. Every stage on the
    /// planned path must already have approvers.
    pub async fn create_request(
        &self,
        new: NewRequest,
        now: DateTime<Utc>,
    ) -> Result<AbsenceRequest, WorkflowError> {
        let definition = self.validate_new(&new)?;
        let employee = self.employee(&new.employee_id).await?;
        let snapshot = self.load_snapshot().await?;
        let resolver = self.resolver(&snapshot);

        let facts = resolver.route_facts(&employee, definition).await?;
        let flags = self.router.flags(&facts, &snapshot.graph);
        let initial_stage = self.router.initial_stage(&flags);

        let mut initial_approvers = BTreeSet::new();
        for stage in self.router.plan(&flags) {
            let approvers = resolver.resolve(&employee, stage).await?;
            if stage == initial_stage {
                initial_approvers = approvers;
            }
        }

        let cutoff = compute_cutoff(self.ports.calendar.as_ref(), &employee, &new.window).await?;
        let request = AbsenceRequest {
            id: RequestId(format!("REQ-{}", Uuid::new_v4().simple())),
            employee_id: employee.employee_id.clone(),
            request_type: definition.code.clone(),
            window: new.window,
            quantity: new.quantity,
            payload: new.payload,
            status: RequestStatus::Pending,
            current_stage: initial_stage,
            last_action_at: now,
            escalation_count: 0,
            is_escalated: false,
            payroll_cutoff_date: cutoff,
            late_approval_flag: false,
            excluded_from_payroll: false,
            state_version: INITIAL_STATE_VERSION,
            created_at: now,
        };
        self.ports.store.insert(request.clone()).await?;

        info!(
            event_name = "workflow.request.created",
            request_id = %request.id,
            employee_id = %request.employee_id,
            request_type = %request.request_type,
            stage = %request.current_stage,
            "absence request created"
        );
        self.notify(StageNotification {
            recipients: initial_approvers,
            request_id: request.id.clone(),
            new_stage: initial_stage,
            reason: "request submitted".to_owned(),
        })
        .await;

        Ok(request)
    }

    /// Applies one approve/decline decision by `command.actor`.
    pub async fn act(
        &self,
        command: ActionCommand,
        now: DateTime<Utc>,
    ) -> Result<AbsenceRequest, WorkflowError> {
        let request = self.load(&command.request_id).await?;
        if let Err(error) = ensure_actionable(&request, command.claimed_stage) {
            self.log_conflict(&request.id, &command.actor, command.claimed_stage);
            return Err(error);
        }

        let context = self.routing_context(&request).await?;
        let resolver = self.resolver(&context.snapshot);
        resolver.authorize(&command.actor, &context.employee, request.current_stage).await?;

        let action = command.action;
        let planned = plan_action(
            &request,
            &self.router,
            &context.flags,
            ActionInput {
                actor: command.actor.clone(),
                action,
                claimed_stage: command.claimed_stage,
                comment: command.comment,
                now,
            },
        )?;
        let recipients = self.next_recipients(&resolver, &context.employee, planned.outcome).await?;
        self.commit_or_conflict(&planned, &command.actor).await?;

        log_transition(&planned, &command.actor);
        let reason = format!("{} at {}", action.as_str(), planned.from_stage);
        self.dispatch_effects(&planned, recipients, &reason).await;

        Ok(planned.commit.request)
    }

    /// Owner-initiated cancellation of a pending request.
    pub async fn withdraw(
        &self,
        request_id: &RequestId,
        actor: &UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AbsenceRequest, WorkflowError> {
        let request = self.load(request_id).await?;
        if &request.employee_id != actor {
            return Err(WorkflowError::Authorization {
                actor: actor.clone(),
                stage: request.current_stage,
            });
        }

        let planned = plan_withdrawal(&request, comment, now)?;
        self.commit_or_conflict(&planned, actor).await?;
        info!(
            event_name = "workflow.request.withdrawn",
            request_id = %request.id,
            actor = %actor,
            stage = %planned.from_stage,
            "absence request withdrawn"
        );

        // The stage's approvers lose a pending item; failing to find them is not fatal.
        let recipients = match self.routing_context(&request).await {
            Ok(context) => self
                .resolver(&context.snapshot)
                .resolve(&context.employee, planned.from_stage)
                .await
                .unwrap_or_default(),
            Err(_) => BTreeSet::new(),
        };
        self.dispatch_effects(&planned, recipients, "withdrawn by employee").await;

        Ok(planned.commit.request)
    }

    pub async fn archive(
        &self,
        request_id: &RequestId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<AbsenceRequest, WorkflowError> {
        let request = self.load(request_id).await?;
        if &request.employee_id != actor {
            let snapshot = self.load_snapshot().await?;
            if !self.resolver(&snapshot).is_admin(actor).await? {
                return Err(WorkflowError::Authorization {
                    actor: actor.clone(),
                    stage: request.current_stage,
                });
            }
        }

        let commit = plan_archive(&request, now)?;
        if self.ports.store.commit(commit.clone()).await? == CommitOutcome::Conflict {
            self.log_conflict(&request.id, actor, request.current_stage);
            return Err(WorkflowError::conflict(&request.id, "request changed since it was read"));
        }
        info!(
            event_name = "workflow.request.archived",
            request_id = %request.id,
            actor = %actor,
            "absence request archived"
        );

        Ok(commit.request)
    }

    pub async fn find_request(&self, request_id: &RequestId) -> Result<AbsenceRequest, WorkflowError> {
        self.load(request_id).await
    }

    /// Pending requests at `stage` that `actor` may act on.
    pub async fn list_pending_for_stage(
        &self,
        stage: Stage,
        actor: &UserId,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        let snapshot = self.load_snapshot().await?;
        let resolver = self.resolver(&snapshot);

        let mut visible = Vec::new();
        for request in self.ports.store.list_pending(Some(stage)).await? {
            if self.may_act(&resolver, actor, &request).await? {
                visible.push(request);
            }
        }
        Ok(visible)
    }

    /// Pending requests visible to `actor`, per stage.
    pub async fn counts(&self, actor: &UserId) -> Result<BTreeMap<Stage, usize>, WorkflowError> {
        let snapshot = self.load_snapshot().await?;
        let resolver = self.resolver(&snapshot);

        let mut counts = BTreeMap::new();
        for request in self.ports.store.list_pending(None).await? {
            if self.may_act(&resolver, actor, &request).await? {
                *counts.entry(request.current_stage).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub async fn list_overlapping(
        &self,
        employee_id: &UserId,
        window: &DateWindow,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        if !window.is_well_formed() {
            return Err(ValidationFailure::InvalidWindow.into());
        }
        self.ports.store.list_overlapping(employee_id, window).await
    }

    pub async fn audit_trail(&self, request_id: &RequestId) -> Result<Vec<AuditEntry>, WorkflowError> {
        self.load(request_id).await?;
        self.ports.store.audit_trail(request_id).await
    }

    /// Routing classification for a prospective request of `request_type`.
    pub async fn route_flags(
        &self,
        employee_id: &UserId,
        request_type: &str,
    ) -> Result<RouteFlags, WorkflowError> {
        let definition = self.definition(request_type)?;
        let employee = self.employee(employee_id).await?;
        let snapshot = self.load_snapshot().await?;
        let facts = self.resolver(&snapshot).route_facts(&employee, definition).await?;
        Ok(self.router.flags(&facts, &snapshot.graph))
    }

    /// Stages a request of `request_type` would visit, in order.
    pub async fn preview_plan(
        &self,
        employee_id: &UserId,
        request_type: &str,
    ) -> Result<Vec<Stage>, WorkflowError> {
        let flags = self.route_flags(employee_id, request_type).await?;
        Ok(self.router.plan(&flags))
    }

    pub(crate) async fn routing_context(
        &self,
        request: &AbsenceRequest,
    ) -> Result<RoutingContext, WorkflowError> {
        let definition = self.definition(&request.request_type)?;
        let employee = self.employee(&request.employee_id).await?;
        let snapshot = self.load_snapshot().await?;
        let facts = self.resolver(&snapshot).route_facts(&employee, definition).await?;
        let flags = self.router.flags(&facts, &snapshot.graph);
        Ok(RoutingContext { employee, snapshot, flags })
    }

    pub(crate) fn resolver<'a>(&'a self, snapshot: &'a RoleSnapshot) -> ApproverResolver<'a> {
        ApproverResolver::new(self.ports.directory.as_ref(), snapshot, &self.settings.roles)
    }

    /// Who hears about the transition: the next stage's approvers, or the
    /// employee once the request is terminal. Resolving before the commit
    /// keeps a request from advancing into a stage nobody can act on.
    pub(crate) async fn next_recipients(
        &self,
        resolver: &ApproverResolver<'_>,
        employee: &EmployeeRecord,
        outcome: RouteOutcome,
    ) -> Result<BTreeSet<UserId>, WorkflowError> {
        match outcome {
            RouteOutcome::Advance(next) => resolver.resolve(employee, next).await,
            RouteOutcome::Approved | RouteOutcome::Declined => {
                Ok(BTreeSet::from([employee.employee_id.clone()]))
            }
        }
    }

    /// Outbound calls for a committed transition. Failures are logged and
    /// never undo the commit.
    pub(crate) async fn dispatch_effects(
        &self,
        planned: &PlannedTransition,
        recipients: BTreeSet<UserId>,
        reason: &str,
    ) {
        let request = planned.request();
        if planned.outcome == RouteOutcome::Approved {
            self.emit_payroll(request).await;
        }
        self.notify(StageNotification {
            recipients,
            request_id: request.id.clone(),
            new_stage: request.current_stage,
            reason: reason.to_owned(),
        })
        .await;
    }

    async fn emit_payroll(&self, request: &AbsenceRequest) {
        let incidence = PayrollIncidence {
            employee_id: request.employee_id.clone(),
            request_type: request.request_type.clone(),
            window: request.window,
            quantity: request.quantity,
            source_request_id: request.id.clone(),
        };
        if let Err(error) = self.ports.payroll.create_incidence(incidence).await {
            warn!(
                event_name = "workflow.effect.failed",
                request_id = %request.id,
                effect = "payroll_incidence",
                error = %error,
                "payroll incidence could not be emitted"
            );
        }

        let is_shift_change = self
            .settings
            .catalog
            .get(&request.request_type)
            .is_some_and(RequestTypeDefinition::is_shift_change);
        let Some(new_shift_id) = request.payload.target_shift_id.as_ref().filter(|_| is_shift_change)
        else {
            return;
        };
        for date in request.window.days() {
            let exception = ShiftException {
                employee_id: request.employee_id.clone(),
                date,
                new_shift_id: new_shift_id.clone(),
                source_request_id: request.id.clone(),
            };
            if let Err(error) = self.ports.payroll.create_shift_exception(exception).await {
                warn!(
                    event_name = "workflow.effect.failed",
                    request_id = %request.id,
                    effect = "shift_exception",
                    date = %date,
                    error = %error,
                    "shift exception could not be emitted"
                );
            }
        }
    }

    async fn notify(&self, notification: StageNotification) {
        if notification.recipients.is_empty() {
            return;
        }
        let request_id = notification.request_id.clone();
        if let Err(error) = self.ports.notifier.notify(notification).await {
            warn!(
                event_name = "workflow.effect.failed",
                request_id = %request_id,
                effect = "notification",
                error = %error,
                "stage notification could not be emitted"
            );
        }
    }

    async fn commit_or_conflict(
        &self,
        planned: &PlannedTransition,
        actor: &UserId,
    ) -> Result<(), WorkflowError> {
        match self.ports.store.commit(planned.commit.clone()).await? {
            CommitOutcome::Applied => Ok(()),
            CommitOutcome::Conflict => {
                let request_id = &planned.request().id;
                self.log_conflict(request_id, actor, planned.from_stage);
                Err(WorkflowError::conflict(request_id, "request changed since it was read"))
            }
        }
    }

    fn log_conflict(&self, request_id: &RequestId, actor: &UserId, stage: Stage) {
        warn!(
            event_name = "workflow.action.conflict",
            request_id = %request_id,
            actor = %actor,
            stage = %stage,
            "transition rejected by optimistic check"
        );
    }

    async fn may_act(
        &self,
        resolver: &ApproverResolver<'_>,
        actor: &UserId,
        request: &AbsenceRequest,
    ) -> Result<bool, WorkflowError> {
        let Some(employee) = self.ports.directory.find_employee(&request.employee_id).await? else {
            return Ok(false);
        };
        match resolver.authorize(actor, &employee, request.current_stage).await {
            Ok(()) => Ok(true),
            Err(WorkflowError::Authorization { .. } | WorkflowError::Configuration { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn validate_new(&self, new: &NewRequest) -> Result<&RequestTypeDefinition, ValidationFailure> {
        if !new.window.is_well_formed() {
            return Err(ValidationFailure::InvalidWindow);
        }
        if new.quantity <= Decimal::ZERO {
            return Err(ValidationFailure::NonPositiveQuantity);
        }
        let definition = self.settings.catalog.get(&new.request_type).ok_or_else(|| {
            ValidationFailure::UnknownRequestType { code: new.request_type.clone() }
        })?;

        let has_target =
            new.payload.target_shift_id.as_deref().is_some_and(|shift| !shift.trim().is_empty());
        if definition.is_shift_change() && !has_target {
            return Err(ValidationFailure::MissingShiftTarget);
        }
        for key in &definition.required_fields {
            match new.payload.custom_fields.get(key) {
                Some(value) if !value.is_null() => {}
                _ => return Err(ValidationFailure::MissingCustomField { key: key.clone() }),
            }
        }

        Ok(definition)
    }

    fn definition(&self, request_type: &str) -> Result<&RequestTypeDefinition, WorkflowError> {
        self.settings.catalog.get(request_type).ok_or_else(|| {
            ValidationFailure::UnknownRequestType { code: request_type.to_owned() }.into()
        })
    }

    async fn employee(&self, employee_id: &UserId) -> Result<EmployeeRecord, WorkflowError> {
        self.ports.directory.find_employee(employee_id).await?.ok_or_else(|| {
            ValidationFailure::UnknownEmployee { employee_id: employee_id.clone() }.into()
        })
    }

    async fn load(&self, request_id: &RequestId) -> Result<AbsenceRequest, WorkflowError> {
        self.ports
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))
    }

    async fn load_snapshot(&self) -> Result<RoleSnapshot, WorkflowError> {
        RoleSnapshot::load(self.ports.role_config.as_ref(), self.settings.max_role_depth).await
    }
}

fn log_transition(planned: &PlannedTransition, actor: &UserId) {
    let request = planned.request();
    match planned.outcome {
        RouteOutcome::Advance(next) => info!(
            event_name = "workflow.request.advanced",
            request_id = %request.id,
            actor = %actor,
            from_stage = %planned.from_stage,
            stage = %next,
            "absence request advanced"
        ),
        RouteOutcome::Approved => info!(
            event_name = "workflow.request.approved",
            request_id = %request.id,
            actor = %actor,
            stage = %planned.from_stage,
            late_approval = request.late_approval_flag,
            "absence request approved"
        ),
        RouteOutcome::Declined => info!(
            event_name = "workflow.request.declined",
            request_id = %request.id,
            actor = %actor,
            stage = %planned.from_stage,
            excluded_from_payroll = request.excluded_from_payroll,
            "absence request declined"
        ),
    }
}
