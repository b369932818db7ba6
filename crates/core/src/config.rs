use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::{PolicyRoles, DEFAULT_MAX_ROLE_DEPTH};
use crate::domain::catalog::{RequestTypeCatalog, RequestTypeDefinition};
use crate::domain::employee::RoleCode;
use crate::workflow::WorkflowSettings;

pub const DEFAULT_ESCALATION_REASON: &str = "stalled beyond threshold";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub request_types: Vec<RequestTypeDefinition>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub escalation_threshold_hours: u32,
    pub sweep_interval_secs: u64,
    pub escalation_reason: String,
    pub hr_role: String,
    pub payroll_role: String,
    pub admin_role: String,
    pub general_manager_role: String,
    pub combined_roles: Vec<String>,
    pub max_role_depth: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub escalation_threshold_hours: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let roles = PolicyRoles::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://leaveflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                escalation_threshold_hours: 24,
                sweep_interval_secs: 300,
                escalation_reason: DEFAULT_ESCALATION_REASON.to_string(),
                hr_role: roles.hr.to_string(),
                payroll_role: roles.payroll.to_string(),
                admin_role: roles.admin.to_string(),
                general_manager_role: roles.general_manager.to_string(),
                combined_roles: roles.combined.iter().map(ToString::to_string).collect(),
                max_role_depth: DEFAULT_MAX_ROLE_DEPTH,
            },
            request_types: Vec::new(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leaveflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Standard catalog with configured `[[request_types]]` replacing or
    /// extending entries by code.
    pub fn catalog(&self) -> RequestTypeCatalog {
        let standard = RequestTypeCatalog::standard();
        let merged =
            standard.definitions().cloned().chain(self.request_types.iter().cloned()).collect();
        RequestTypeCatalog::new(merged)
    }

    pub fn policy_roles(&self) -> PolicyRoles {
        PolicyRoles {
            hr: RoleCode::new(&self.workflow.hr_role),
            payroll: RoleCode::new(&self.workflow.payroll_role),
            admin: RoleCode::new(&self.workflow.admin_role),
            general_manager: RoleCode::new(&self.workflow.general_manager_role),
            combined: self.workflow.combined_roles.iter().map(RoleCode::new).collect(),
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            escalation_threshold: Duration::hours(i64::from(self.workflow.escalation_threshold_hours)),
            escalation_reason: self.workflow.escalation_reason.clone(),
            roles: self.policy_roles(),
            max_role_depth: self.workflow.max_role_depth,
            catalog: self.catalog(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(hours) = workflow.escalation_threshold_hours {
                self.workflow.escalation_threshold_hours = hours;
            }
            if let Some(interval) = workflow.sweep_interval_secs {
                self.workflow.sweep_interval_secs = interval;
            }
            if let Some(reason) = workflow.escalation_reason {
                self.workflow.escalation_reason = reason;
            }
            if let Some(role) = workflow.hr_role {
                self.workflow.hr_role = role;
            }
            if let Some(role) = workflow.payroll_role {
                self.workflow.payroll_role = role;
            }
            if let Some(role) = workflow.admin_role {
                self.workflow.admin_role = role;
            }
            if let Some(role) = workflow.general_manager_role {
                self.workflow.general_manager_role = role;
            }
            if let Some(roles) = workflow.combined_roles {
                self.workflow.combined_roles = roles;
            }
            if let Some(depth) = workflow.max_role_depth {
                self.workflow.max_role_depth = depth;
            }
        }

        if let Some(request_types) = patch.request_types {
            self.request_types = request_types;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEAVEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEAVEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("LEAVEFLOW_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEAVEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_ESCALATION_THRESHOLD_HOURS") {
            self.workflow.escalation_threshold_hours =
                parse_u32("LEAVEFLOW_WORKFLOW_ESCALATION_THRESHOLD_HOURS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_SWEEP_INTERVAL_SECS") {
            self.workflow.sweep_interval_secs =
                parse_u64("LEAVEFLOW_WORKFLOW_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_ESCALATION_REASON") {
            self.workflow.escalation_reason = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_HR_ROLE") {
            self.workflow.hr_role = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_PAYROLL_ROLE") {
            self.workflow.payroll_role = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_ADMIN_ROLE") {
            self.workflow.admin_role = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_GENERAL_MANAGER_ROLE") {
            self.workflow.general_manager_role = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_COMBINED_ROLES") {
            self.workflow.combined_roles = value
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_MAX_ROLE_DEPTH") {
            self.workflow.max_role_depth = parse_usize("LEAVEFLOW_WORKFLOW_MAX_ROLE_DEPTH", &value)?;
        }

        let log_level =
            read_env("LEAVEFLOW_LOGGING_LEVEL").or_else(|| read_env("LEAVEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEAVEFLOW_LOGGING_FORMAT").or_else(|| read_env("LEAVEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(hours) = overrides.escalation_threshold_hours {
            self.workflow.escalation_threshold_hours = hours;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_request_types(&self.request_types)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leaveflow.toml"), PathBuf::from("config/leaveflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if !(1..=720).contains(&workflow.escalation_threshold_hours) {
        return Err(ConfigError::Validation(
            "workflow.escalation_threshold_hours must be in range 1..=720".to_string(),
        ));
    }

    if workflow.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "workflow.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    if workflow.escalation_reason.trim().is_empty() {
        return Err(ConfigError::Validation(
            "workflow.escalation_reason must not be empty".to_string(),
        ));
    }

    let named_roles = [
        ("workflow.hr_role", &workflow.hr_role),
        ("workflow.payroll_role", &workflow.payroll_role),
        ("workflow.admin_role", &workflow.admin_role),
        ("workflow.general_manager_role", &workflow.general_manager_role),
    ];
    for (key, role) in named_roles {
        if role.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }

    if workflow.max_role_depth == 0 {
        return Err(ConfigError::Validation(
            "workflow.max_role_depth must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_request_types(request_types: &[RequestTypeDefinition]) -> Result<(), ConfigError> {
    for definition in request_types {
        if definition.code.trim().is_empty() {
            return Err(ConfigError::Validation(
                "request_types entries require a non-empty `code`".to_string(),
            ));
        }
        if definition.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "request type `{}` requires a non-empty `name`",
                definition.code
            )));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    request_types: Option<Vec<RequestTypeDefinition>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    escalation_threshold_hours: Option<u32>,
    sweep_interval_secs: Option<u64>,
    escalation_reason: Option<String>,
    hr_role: Option<String>,
    payroll_role: Option<String>,
    admin_role: Option<String>,
    general_manager_role: Option<String>,
    combined_roles: Option<Vec<String>>,
    max_role_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
