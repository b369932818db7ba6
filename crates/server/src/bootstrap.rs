use leaveflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leaveflow_core::WorkflowService;
use leaveflow_db::{connect_with_config, migrations, sql_ports, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: WorkflowService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        database_url = %config.database.url,
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let workflow = WorkflowService::new(sql_ports(&db_pool), config.workflow_settings());
    info!(
        event_name = "system.bootstrap.workflow_ready",
        request_types = workflow.settings().catalog.len(),
        escalation_threshold_hours = config.workflow.escalation_threshold_hours,
        "workflow service wired to sqlite adapters"
    );

    Ok(Application { config, db_pool, workflow })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use leaveflow_core::config::{ConfigOverrides, LoadOptions};
    use leaveflow_core::{DateWindow, NewRequest, RequestPayload, Stage, UserId};
    use leaveflow_db::DemoOrganization;
    use rust_decimal::Decimal;

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn options(database_url: &str, threshold_hours: Option<u32>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                escalation_threshold_hours: threshold_hours,
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_out_of_range_threshold() {
        let result = bootstrap(options("sqlite::memory:", Some(0))).await;

        let error = result.err().expect("threshold of zero should fail validation");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("escalation_threshold_hours"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_serves_the_workflow() {
        let app = bootstrap(options("sqlite::memory:", Some(48))).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('absence_request', 'approval_history', 'escalation_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("workflow tables should exist after bootstrap");
        assert_eq!(table_count, 3);
        assert_eq!(app.workflow.settings().escalation_threshold, chrono::Duration::hours(48));

        DemoOrganization::load(&app.db_pool).await.expect("seed");
        let created = app
            .workflow
            .create_request(
                NewRequest {
                    employee_id: UserId::new("emp-analyst"),
                    request_type: "paid_leave".to_string(),
                    window: DateWindow::new(
                        NaiveDate::from_ymd_opt(2026, 4, 20).expect("start"),
                        NaiveDate::from_ymd_opt(2026, 4, 20).expect("end"),
                    ),
                    quantity: Decimal::ONE,
                    payload: RequestPayload::default(),
                },
                Utc.with_ymd_and_hms(2026, 4, 14, 8, 0, 0).single().expect("now"),
            )
            .await
            .expect("create");
        assert_eq!(created.current_stage, Stage::Supervisor);

        app.db_pool.close().await;
    }
}
