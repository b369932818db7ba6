use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use leaveflow_core::domain::employee::EmployeeRecord;
use leaveflow_core::domain::request::DateWindow;
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::ports::PayrollCalendar;

use super::{decode_date, decode_err, decode_ts, encode_date, encode_ts, RepositoryError};
use crate::DbPool;

/// Applies to every employee type.
pub const ANY_EMPLOYEE_TYPE: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPeriod {
    pub period_id: String,
    pub employee_type: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub cutoff_at: DateTime<Utc>,
}

pub struct SqlPayrollCalendar {
    pool: DbPool,
}

impl SqlPayrollCalendar {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_period(&self, period: &PayrollPeriod) -> Result<(), RepositoryError> {
        if period.ends_on < period.starts_on {
            return Err(RepositoryError::Rejected(format!(
                "period `{}` ends before it starts",
                period.period_id
            )));
        }

        sqlx::query(
            "INSERT INTO payroll_period (period_id, employee_type, starts_on, ends_on, cutoff_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(period_id) DO UPDATE SET
                employee_type = excluded.employee_type,
                starts_on = excluded.starts_on,
                ends_on = excluded.ends_on,
                cutoff_at = excluded.cutoff_at",
        )
        .bind(&period.period_id)
        .bind(&period.employee_type)
        .bind(encode_date(period.starts_on))
        .bind(encode_date(period.ends_on))
        .bind(encode_ts(period.cutoff_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Period containing `date`; a period for the exact employee type wins
    /// over the catch-all one.
    pub async fn period_containing(
        &self,
        employee_type: &str,
        date: NaiveDate,
    ) -> Result<Option<PayrollPeriod>, RepositoryError> {
        let row = sqlx::query(
            "SELECT period_id, employee_type, starts_on, ends_on, cutoff_at
             FROM payroll_period
             WHERE starts_on <= ?1 AND ends_on >= ?1 AND employee_type IN (?2, '*')
             ORDER BY CASE WHEN employee_type = ?2 THEN 0 ELSE 1 END, starts_on DESC
             LIMIT 1",
        )
        .bind(encode_date(date))
        .bind(employee_type)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let starts_on: String = row.try_get("starts_on").map_err(decode_err)?;
        let ends_on: String = row.try_get("ends_on").map_err(decode_err)?;
        let cutoff_at: String = row.try_get("cutoff_at").map_err(decode_err)?;
        Ok(Some(PayrollPeriod {
            period_id: row.try_get("period_id").map_err(decode_err)?,
            employee_type: row.try_get("employee_type").map_err(decode_err)?,
            starts_on: decode_date("starts_on", &starts_on)?,
            ends_on: decode_date("ends_on", &ends_on)?,
            cutoff_at: decode_ts("cutoff_at", &cutoff_at)?,
        }))
    }
}

#[async_trait]
impl PayrollCalendar for SqlPayrollCalendar {
    async fn cutoff_for(
        &self,
        employee: &EmployeeRecord,
        window: &DateWindow,
    ) -> Result<DateTime<Utc>, WorkflowError> {
        match self.period_containing(&employee.employee_type, window.start).await? {
            Some(period) => Ok(period.cutoff_at),
            None => Err(WorkflowError::Integration(format!(
                "no payroll period covers {} for employee type `{}`",
                window.start, employee.employee_type
            ))),
        }
    }
}
