//! Shared preamble for commands that need the database: load config, build a
//! runtime, connect, migrate, then hand a ready session to the command body.

use std::future::Future;

use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_core::{WorkflowError, WorkflowService};
use leaveflow_db::{connect_with_config, migrations, sql_ports, DbPool};

use crate::commands::CommandResult;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_VERIFICATION: u8 = 6;
pub const EXIT_WORKFLOW: u8 = 7;

pub struct Session {
    pub config: AppConfig,
    pub pool: DbPool,
}

impl Session {
    pub fn workflow(&self) -> WorkflowService {
        WorkflowService::new(sql_ports(&self.pool), self.config.workflow_settings())
    }
}

#[derive(Debug)]
pub struct Failure {
    pub error_class: String,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub fn new(error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class: error_class.to_string(), message: message.into(), exit_code }
    }
}

impl From<WorkflowError> for Failure {
    fn from(error: WorkflowError) -> Self {
        Self::new(error.error_class(), error.to_string(), EXIT_WORKFLOW)
    }
}

pub fn execute<F, Fut>(command: &str, body: F) -> CommandResult
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<CommandResult, Failure>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| Failure::new("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), EXIT_MIGRATION))?;

        let outcome = body(Session { config, pool: pool.clone() }).await;
        pool.close().await;
        outcome
    });

    result.unwrap_or_else(|failure| {
        CommandResult::failure(command, &failure.error_class, failure.message, failure.exit_code)
    })
}
