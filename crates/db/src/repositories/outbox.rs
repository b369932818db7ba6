use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use leaveflow_core::domain::request::RequestId;
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::ports::{
    Notifier, PayrollGateway, PayrollIncidence, ShiftException, StageNotification,
};

use super::{decode_err, decode_ts, encode_ts, RepositoryError};
use crate::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    PayrollIncidence,
    ShiftException,
    Notification,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayrollIncidence => "payroll_incidence",
            Self::ShiftException => "shift_exception",
            Self::Notification => "notification",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payroll_incidence" => Some(Self::PayrollIncidence),
            "shift_exception" => Some(Self::ShiftException),
            "notification" => Some(Self::Notification),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboxRecord {
    pub id: String,
    pub kind: OutboxKind,
    pub request_id: RequestId,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Durable hand-off for payroll and notification effects. A separate relay
/// drains undelivered rows to the real systems.
pub struct SqlOutbox {
    pool: DbPool,
}

impl SqlOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn enqueue<T: Serialize>(
        &self,
        kind: OutboxKind,
        request_id: &RequestId,
        payload: &T,
    ) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO integration_outbox (id, kind, request_id, payload_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(format!("OBX-{}", Uuid::new_v4().simple()))
        .bind(kind.as_str())
        .bind(&request_id.0)
        .bind(payload_json)
        .bind(encode_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_undelivered(&self, limit: u32) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, kind, request_id, payload_json, created_at, delivered_at
             FROM integration_outbox
             WHERE delivered_at IS NULL
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind").map_err(decode_err)?;
                let payload_json: String = row.try_get("payload_json").map_err(decode_err)?;
                let created_at: String = row.try_get("created_at").map_err(decode_err)?;
                let delivered_at: Option<String> =
                    row.try_get("delivered_at").map_err(decode_err)?;

                Ok(OutboxRecord {
                    id: row.try_get("id").map_err(decode_err)?,
                    kind: OutboxKind::parse(&kind).ok_or_else(|| {
                        RepositoryError::Decode(format!("kind: unknown `{kind}`"))
                    })?,
                    request_id: RequestId(row.try_get("request_id").map_err(decode_err)?),
                    payload: serde_json::from_str(&payload_json)
                        .map_err(|error| RepositoryError::Decode(format!("payload_json: {error}")))?,
                    created_at: decode_ts("created_at", &created_at)?,
                    delivered_at: delivered_at
                        .map(|raw| decode_ts("delivered_at", &raw))
                        .transpose()?,
                })
            })
            .collect()
    }

    /// Returns false when the row was already delivered or does not exist.
    pub async fn mark_delivered(
        &self,
        id: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE integration_outbox SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL",
        )
        .bind(encode_ts(delivered_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PayrollGateway for SqlOutbox {
    async fn create_incidence(&self, incidence: PayrollIncidence) -> Result<(), WorkflowError> {
        self.enqueue(OutboxKind::PayrollIncidence, &incidence.source_request_id, &incidence)
            .await
            .map_err(|error| WorkflowError::Integration(error.to_string()))
    }

    async fn create_shift_exception(&self, exception: ShiftException) -> Result<(), WorkflowError> {
        self.enqueue(OutboxKind::ShiftException, &exception.source_request_id, &exception)
            .await
            .map_err(|error| WorkflowError::Integration(error.to_string()))
    }
}

#[async_trait]
impl Notifier for SqlOutbox {
    async fn notify(&self, notification: StageNotification) -> Result<(), WorkflowError> {
        self.enqueue(OutboxKind::Notification, &notification.request_id, &notification)
            .await
            .map_err(|error| WorkflowError::Integration(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use leaveflow_core::domain::employee::UserId;
    use leaveflow_core::domain::request::{DateWindow, RequestId, Stage};
    use leaveflow_core::ports::{Notifier, PayrollGateway, PayrollIncidence, StageNotification};

    use super::{OutboxKind, SqlOutbox};
    use crate::repositories::test_support::setup;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("date")
    }

    #[tokio::test]
    async fn effects_are_queued_until_marked_delivered() {
        let outbox = SqlOutbox::new(setup().await);
        let request_id = RequestId("REQ-1".to_string());

        outbox
            .create_incidence(PayrollIncidence {
                employee_id: UserId::new("emp-1"),
                request_type: "vacation".to_string(),
                window: DateWindow::new(date(10), date(12)),
                quantity: Decimal::new(3, 0),
                source_request_id: request_id.clone(),
            })
            .await
            .expect("incidence");
        outbox
            .notify(StageNotification {
                recipients: BTreeSet::from([UserId::new("emp-1")]),
                request_id: request_id.clone(),
                new_stage: Stage::Hr,
                reason: "approved at hr".to_string(),
            })
            .await
            .expect("notification");

        let pending = outbox.list_undelivered(10).await.expect("pending");
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|record| record.request_id == request_id));
        let incidence = pending
            .iter()
            .find(|record| record.kind == OutboxKind::PayrollIncidence)
            .expect("incidence row");
        assert_eq!(incidence.payload["request_type"], "vacation");

        assert!(outbox.mark_delivered(&incidence.id, Utc::now()).await.expect("mark"));
        assert!(!outbox.mark_delivered(&incidence.id, Utc::now()).await.expect("mark again"));

        let remaining = outbox.list_undelivered(10).await.expect("remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, OutboxKind::Notification);
    }
}
