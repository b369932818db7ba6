use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use leaveflow_core::audit::commit_order;
use leaveflow_core::domain::employee::UserId;
use leaveflow_core::domain::history::{ApprovalAction, ApprovalHistory, AuditEntry, EscalationLog};
use leaveflow_core::domain::request::{
    AbsenceRequest, DateWindow, RequestId, RequestPayload, RequestStatus, Stage,
};
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::ports::{CommitOutcome, RequestStore, TransitionCommit};

use super::{decode_date, decode_err, decode_ts, encode_date, encode_ts, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, employee_id, request_type, window_start, window_end, quantity,
    payload_json, status, current_stage, last_action_at, escalation_count, is_escalated,
    payroll_cutoff_date, late_approval_flag, excluded_from_payroll, state_version, created_at";

pub struct SqlRequestStore {
    pool: DbPool,
}

enum Applied {
    Written,
    Stale,
    Missing,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, request: &AbsenceRequest) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&request.payload)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO absence_request (id, employee_id, request_type, window_start, window_end,
                                          quantity, payload_json, status, current_stage,
                                          last_action_at, escalation_count, is_escalated,
                                          payroll_cutoff_date, late_approval_flag,
                                          excluded_from_payroll, state_version, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.employee_id.0)
        .bind(&request.request_type)
        .bind(encode_date(request.window.start))
        .bind(encode_date(request.window.end))
        .bind(request.quantity.to_string())
        .bind(payload)
        .bind(request.status.as_str())
        .bind(request.current_stage.as_str())
        .bind(encode_ts(request.last_action_at))
        .bind(i64::from(request.escalation_count))
        .bind(request.is_escalated)
        .bind(encode_ts(request.payroll_cutoff_date))
        .bind(request.late_approval_flag)
        .bind(request.excluded_from_payroll)
        .bind(i64::from(request.state_version))
        .bind(encode_ts(request.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Conditional update plus audit insert in one transaction.
    async fn apply(&self, commit: &TransitionCommit) -> Result<Applied, RepositoryError> {
        let request = &commit.request;
        let expected = &commit.expected;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE absence_request
             SET status = ?, current_stage = ?, last_action_at = ?, escalation_count = ?,
                 is_escalated = ?, late_approval_flag = ?, excluded_from_payroll = ?,
                 state_version = ?
             WHERE id = ? AND status = ? AND current_stage = ? AND last_action_at = ?
                   AND state_version = ?",
        )
        .bind(request.status.as_str())
        .bind(request.current_stage.as_str())
        .bind(encode_ts(request.last_action_at))
        .bind(i64::from(request.escalation_count))
        .bind(request.is_escalated)
        .bind(request.late_approval_flag)
        .bind(request.excluded_from_payroll)
        .bind(i64::from(request.state_version))
        .bind(&request.id.0)
        .bind(expected.status.as_str())
        .bind(expected.current_stage.as_str())
        .bind(encode_ts(expected.last_action_at))
        .bind(i64::from(expected.state_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM absence_request WHERE id = ?")
                .bind(&request.id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;
            return Ok(if exists { Applied::Stale } else { Applied::Missing });
        }

        if let Some(history) = &commit.approval {
            sqlx::query(
                "INSERT INTO approval_history (id, request_id, approver_id, stage, action, comment,
                                               occurred_at, state_version)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&history.id)
            .bind(&history.request_id.0)
            .bind(&history.approver.0)
            .bind(history.stage.as_str())
            .bind(history.action.as_str())
            .bind(&history.comment)
            .bind(encode_ts(history.occurred_at))
            .bind(i64::from(history.state_version))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(log) = &commit.escalation {
            let notified: Vec<&str> = log.notified.iter().map(|id| id.0.as_str()).collect();
            let notified_json = serde_json::to_string(&notified)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            sqlx::query(
                "INSERT INTO escalation_log (id, request_id, from_stage, to_stage, occurred_at,
                                             reason, notified_json, state_version)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&log.id)
            .bind(&log.request_id.0)
            .bind(log.from_stage.as_str())
            .bind(log.to_stage.as_str())
            .bind(encode_ts(log.occurred_at))
            .bind(&log.reason)
            .bind(notified_json)
            .bind(i64::from(log.state_version))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Applied::Written)
    }

    async fn fetch_requests(
        &self,
        filter: &str,
        binds: &[String],
    ) -> Result<Vec<AbsenceRequest>, RepositoryError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM absence_request WHERE {filter}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect()
    }

    async fn load_trail(&self, id: &RequestId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let approvals = sqlx::query(
            "SELECT id, request_id, approver_id, stage, action, comment, occurred_at, state_version
             FROM approval_history WHERE request_id = ?",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let escalations = sqlx::query(
            "SELECT id, request_id, from_stage, to_stage, occurred_at, reason, notified_json,
                    state_version
             FROM escalation_log WHERE request_id = ?",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(approvals.len() + escalations.len());
        for row in &approvals {
            entries.push(AuditEntry::Approval(row_to_history(row)?));
        }
        for row in &escalations {
            entries.push(AuditEntry::Escalation(row_to_escalation(row)?));
        }
        commit_order(&mut entries);
        Ok(entries)
    }
}

fn parse_stage(column: &str, raw: &str) -> Result<Stage, RepositoryError> {
    Stage::parse(raw).ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown stage `{raw}`")))
}

fn version(row: &SqliteRow) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get("state_version").map_err(decode_err)?;
    u32::try_from(raw).map_err(|error| RepositoryError::Decode(format!("state_version: {error}")))
}

fn row_to_request(row: &SqliteRow) -> Result<AbsenceRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let employee_id: String = row.try_get("employee_id").map_err(decode_err)?;
    let request_type: String = row.try_get("request_type").map_err(decode_err)?;
    let window_start: String = row.try_get("window_start").map_err(decode_err)?;
    let window_end: String = row.try_get("window_end").map_err(decode_err)?;
    let quantity: String = row.try_get("quantity").map_err(decode_err)?;
    let payload_json: String = row.try_get("payload_json").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let current_stage: String = row.try_get("current_stage").map_err(decode_err)?;
    let last_action_at: String = row.try_get("last_action_at").map_err(decode_err)?;
    let escalation_count: i64 = row.try_get("escalation_count").map_err(decode_err)?;
    let payroll_cutoff_date: String = row.try_get("payroll_cutoff_date").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    let payload: RequestPayload = serde_json::from_str(&payload_json)
        .map_err(|error| RepositoryError::Decode(format!("payload_json: {error}")))?;

    Ok(AbsenceRequest {
        id: RequestId(id),
        employee_id: UserId(employee_id),
        request_type,
        window: DateWindow::new(
            decode_date("window_start", &window_start)?,
            decode_date("window_end", &window_end)?,
        ),
        quantity: Decimal::from_str(&quantity)
            .map_err(|error| RepositoryError::Decode(format!("quantity: {error}")))?,
        payload,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("status: unknown `{status}`")))?,
        current_stage: parse_stage("current_stage", &current_stage)?,
        last_action_at: decode_ts("last_action_at", &last_action_at)?,
        escalation_count: u32::try_from(escalation_count)
            .map_err(|error| RepositoryError::Decode(format!("escalation_count: {error}")))?,
        is_escalated: row.try_get("is_escalated").map_err(decode_err)?,
        payroll_cutoff_date: decode_ts("payroll_cutoff_date", &payroll_cutoff_date)?,
        late_approval_flag: row.try_get("late_approval_flag").map_err(decode_err)?,
        excluded_from_payroll: row.try_get("excluded_from_payroll").map_err(decode_err)?,
        state_version: version(row)?,
        created_at: decode_ts("created_at", &created_at)?,
    })
}

fn row_to_history(row: &SqliteRow) -> Result<ApprovalHistory, RepositoryError> {
    let stage: String = row.try_get("stage").map_err(decode_err)?;
    let action: String = row.try_get("action").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    Ok(ApprovalHistory {
        id: row.try_get("id").map_err(decode_err)?,
        request_id: RequestId(row.try_get("request_id").map_err(decode_err)?),
        approver: UserId(row.try_get("approver_id").map_err(decode_err)?),
        stage: parse_stage("stage", &stage)?,
        action: ApprovalAction::parse(&action)
            .ok_or_else(|| RepositoryError::Decode(format!("action: unknown `{action}`")))?,
        comment: row.try_get("comment").map_err(decode_err)?,
        occurred_at: decode_ts("occurred_at", &occurred_at)?,
        state_version: version(row)?,
    })
}

fn row_to_escalation(row: &SqliteRow) -> Result<EscalationLog, RepositoryError> {
    let from_stage: String = row.try_get("from_stage").map_err(decode_err)?;
    let to_stage: String = row.try_get("to_stage").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;
    let notified_json: String = row.try_get("notified_json").map_err(decode_err)?;
    let notified: Vec<String> = serde_json::from_str(&notified_json)
        .map_err(|error| RepositoryError::Decode(format!("notified_json: {error}")))?;

    Ok(EscalationLog {
        id: row.try_get("id").map_err(decode_err)?,
        request_id: RequestId(row.try_get("request_id").map_err(decode_err)?),
        from_stage: parse_stage("from_stage", &from_stage)?,
        to_stage: parse_stage("to_stage", &to_stage)?,
        occurred_at: decode_ts("occurred_at", &occurred_at)?,
        reason: row.try_get("reason").map_err(decode_err)?,
        notified: notified.into_iter().map(UserId).collect::<BTreeSet<_>>(),
        state_version: version(row)?,
    })
}

#[async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(&self, request: AbsenceRequest) -> Result<(), WorkflowError> {
        match self.insert_row(&request).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Database(sqlx::Error::Database(error)))
                if error.is_unique_violation() =>
            {
                Err(WorkflowError::conflict(&request.id, "request already exists"))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<AbsenceRequest>, WorkflowError> {
        let mut found = self.fetch_requests("id = ?", &[id.0.clone()]).await?;
        Ok(found.pop())
    }

    async fn list_pending(
        &self,
        stage: Option<Stage>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        let requests = match stage {
            Some(stage) => {
                self.fetch_requests(
                    "status = 'pending' AND current_stage = ? ORDER BY created_at ASC, id ASC",
                    &[stage.as_str().to_owned()],
                )
                .await?
            }
            None => {
                self.fetch_requests("status = 'pending' ORDER BY created_at ASC, id ASC", &[])
                    .await?
            }
        };
        Ok(requests)
    }

    async fn list_stalled(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        Ok(self
            .fetch_requests(
                "status = 'pending' AND last_action_at <= ? ORDER BY last_action_at ASC, id ASC",
                &[encode_ts(idle_since)],
            )
            .await?)
    }

    async fn list_overlapping(
        &self,
        employee_id: &UserId,
        window: &DateWindow,
    ) -> Result<Vec<AbsenceRequest>, WorkflowError> {
        Ok(self
            .fetch_requests(
                "employee_id = ? AND status IN ('pending', 'approved')
                 AND window_start <= ? AND window_end >= ?
                 ORDER BY window_start ASC, id ASC",
                &[employee_id.0.clone(), encode_date(window.end), encode_date(window.start)],
            )
            .await?)
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, WorkflowError> {
        match self.apply(&commit).await? {
            Applied::Written => Ok(CommitOutcome::Applied),
            Applied::Stale => Ok(CommitOutcome::Conflict),
            Applied::Missing => Err(WorkflowError::NotFound(commit.request.id)),
        }
    }

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEntry>, WorkflowError> {
        Ok(self.load_trail(id).await?)
    }
}
