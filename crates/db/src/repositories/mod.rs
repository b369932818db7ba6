use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

use leaveflow_core::errors::WorkflowError;
use leaveflow_core::workflow::WorkflowPorts;

use crate::DbPool;

pub mod calendar;
pub mod directory;
pub mod outbox;
pub mod request;

pub use calendar::{PayrollPeriod, SqlPayrollCalendar};
pub use directory::SqlDirectory;
pub use outbox::{OutboxKind, OutboxRecord, SqlOutbox};
pub use request::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rejected write: {0}")]
    Rejected(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        WorkflowError::Persistence(error.to_string())
    }
}

/// Every workflow port backed by the same pool. Effects land in the outbox.
pub fn sql_ports(pool: &DbPool) -> WorkflowPorts {
    let directory = Arc::new(SqlDirectory::new(pool.clone()));
    let outbox = Arc::new(SqlOutbox::new(pool.clone()));
    WorkflowPorts {
        directory: directory.clone(),
        role_config: directory,
        calendar: Arc::new(SqlPayrollCalendar::new(pool.clone())),
        store: Arc::new(SqlRequestStore::new(pool.clone())),
        payroll: outbox.clone(),
        notifier: outbox,
    }
}

/// Fixed-width UTC encoding so stored timestamps compare lexically.
pub(crate) fn encode_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn encode_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn decode_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub(crate) async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }
}
