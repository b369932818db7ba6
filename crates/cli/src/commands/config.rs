use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leaveflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let workflow = &config.workflow;
    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "LEAVEFLOW_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "LEAVEFLOW_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "LEAVEFLOW_DATABASE_TIMEOUT_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "LEAVEFLOW_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "LEAVEFLOW_SERVER_HEALTH_CHECK_PORT",
        ),
        (
            "workflow.escalation_threshold_hours",
            workflow.escalation_threshold_hours.to_string(),
            "LEAVEFLOW_WORKFLOW_ESCALATION_THRESHOLD_HOURS",
        ),
        (
            "workflow.sweep_interval_secs",
            workflow.sweep_interval_secs.to_string(),
            "LEAVEFLOW_WORKFLOW_SWEEP_INTERVAL_SECS",
        ),
        (
            "workflow.escalation_reason",
            workflow.escalation_reason.clone(),
            "LEAVEFLOW_WORKFLOW_ESCALATION_REASON",
        ),
        ("workflow.hr_role", workflow.hr_role.clone(), "LEAVEFLOW_WORKFLOW_HR_ROLE"),
        ("workflow.payroll_role", workflow.payroll_role.clone(), "LEAVEFLOW_WORKFLOW_PAYROLL_ROLE"),
        ("workflow.admin_role", workflow.admin_role.clone(), "LEAVEFLOW_WORKFLOW_ADMIN_ROLE"),
        (
            "workflow.general_manager_role",
            workflow.general_manager_role.clone(),
            "LEAVEFLOW_WORKFLOW_GENERAL_MANAGER_ROLE",
        ),
        (
            "workflow.combined_roles",
            workflow.combined_roles.join(","),
            "LEAVEFLOW_WORKFLOW_COMBINED_ROLES",
        ),
        (
            "workflow.max_role_depth",
            workflow.max_role_depth.to_string(),
            "LEAVEFLOW_WORKFLOW_MAX_ROLE_DEPTH",
        ),
        ("logging.level", config.logging.level.clone(), "LEAVEFLOW_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "LEAVEFLOW_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in &fields {
        lines.push(render_line(
            key_path,
            value,
            field_source(
                key_path,
                Some(*env_key),
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    let catalog = config.catalog();
    let hr_mandatory: Vec<&str> = catalog
        .definitions()
        .filter(|definition| definition.hr_mandatory)
        .map(|definition| definition.code.as_str())
        .collect();
    lines.push(format!(
        "- request_types = {} configured, hr mandatory: [{}] (source: {})",
        catalog.len(),
        hr_mandatory.join(", "),
        if config.request_types.is_empty() { "default" } else { "file" }
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("leaveflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leaveflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
