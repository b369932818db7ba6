use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::{NaiveDate, TimeZone, Utc};
use leaveflow_cli::commands::{migrate, seed, sweep, workflow};
use leaveflow_core::{
    DateWindow, NewRequest, RequestId, RequestPayload, Stage, UserId, WorkflowService,
    WorkflowSettings,
};
use leaveflow_db::{connect_with_settings, sql_ports};
use rust_decimal::Decimal;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("LEAVEFLOW_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_out_of_range_threshold() {
    with_env(
        &[
            ("LEAVEFLOW_DATABASE_URL", "sqlite::memory:"),
            ("LEAVEFLOW_WORKFLOW_ESCALATION_THRESHOLD_HOURS", "0"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
            assert!(payload["message"]
                .as_str()
                .unwrap_or_default()
                .contains("escalation_threshold_hours"));
        },
    );
}

#[test]
fn seed_is_repeatable_against_the_same_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("LEAVEFLOW_DATABASE_URL", &url)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "first seed should succeed: {}", first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "reseeding should be idempotent: {}", second.output);

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["data"], second_payload["data"]);
        assert_eq!(first_payload["data"]["employees"], 8);
        assert_eq!(first_payload["data"]["payroll_periods"], 24);
    });
}

#[test]
fn read_commands_and_sweep_follow_a_stalled_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("LEAVEFLOW_DATABASE_URL", &url)], || {
        assert_eq!(seed::run().exit_code, 0);
        let request_id = create_vacation(&url, "emp-analyst");

        let pending = parse_payload(&workflow::pending(Stage::Supervisor, "sup-office").output);
        assert_eq!(pending["status"], "ok");
        assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

        let foreign = parse_payload(&workflow::pending(Stage::Supervisor, "emp-operator").output);
        assert_eq!(foreign["data"].as_array().map(Vec::len), Some(0));

        let counts = parse_payload(&workflow::counts("sup-office").output);
        assert_eq!(counts["data"]["supervisor"], 1);

        let swept = sweep::run(Some(Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap()));
        assert_eq!(swept.exit_code, 0, "sweep should be clean: {}", swept.output);
        let report = parse_payload(&swept.output);
        assert_eq!(report["data"]["escalated"].as_array().map(Vec::len), Some(1));

        let trail = parse_payload(&workflow::trail(&request_id.0).output);
        assert_eq!(trail["status"], "ok");
        assert_eq!(trail["data"]["entries"].as_array().map(Vec::len), Some(1));
        assert_eq!(trail["data"]["request"]["current_stage"], "general_manager");
        assert_eq!(trail["data"]["replay"]["consistent"], true);
    });
}

#[test]
fn trail_reports_unknown_requests_as_workflow_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("LEAVEFLOW_DATABASE_URL", &url)], || {
        let result = workflow::trail("REQ-missing");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "trail");
        assert_eq!(payload["error_class"], "not_found");
    });
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("leaveflow.db").display())
}

fn create_vacation(url: &str, employee: &str) -> RequestId {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 30).await.expect("pool");
        let service = WorkflowService::new(sql_ports(&pool), WorkflowSettings::default());
        let created = service
            .create_request(
                NewRequest {
                    employee_id: UserId::new(employee),
                    request_type: "vacation".to_string(),
                    window: DateWindow::new(
                        NaiveDate::from_ymd_opt(2026, 3, 9).expect("start"),
                        NaiveDate::from_ymd_opt(2026, 3, 11).expect("end"),
                    ),
                    quantity: Decimal::new(3, 0),
                    payload: RequestPayload::default(),
                },
                Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            )
            .await
            .expect("create request");
        pool.close().await;
        created.id
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LEAVEFLOW_DATABASE_URL",
        "LEAVEFLOW_DATABASE_MAX_CONNECTIONS",
        "LEAVEFLOW_DATABASE_TIMEOUT_SECS",
        "LEAVEFLOW_SERVER_BIND_ADDRESS",
        "LEAVEFLOW_SERVER_HEALTH_CHECK_PORT",
        "LEAVEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LEAVEFLOW_WORKFLOW_ESCALATION_THRESHOLD_HOURS",
        "LEAVEFLOW_WORKFLOW_SWEEP_INTERVAL_SECS",
        "LEAVEFLOW_WORKFLOW_ESCALATION_REASON",
        "LEAVEFLOW_WORKFLOW_HR_ROLE",
        "LEAVEFLOW_WORKFLOW_PAYROLL_ROLE",
        "LEAVEFLOW_WORKFLOW_ADMIN_ROLE",
        "LEAVEFLOW_WORKFLOW_GENERAL_MANAGER_ROLE",
        "LEAVEFLOW_WORKFLOW_COMBINED_ROLES",
        "LEAVEFLOW_WORKFLOW_MAX_ROLE_DEPTH",
        "LEAVEFLOW_LOGGING_LEVEL",
        "LEAVEFLOW_LOGGING_FORMAT",
        "LEAVEFLOW_LOG_LEVEL",
        "LEAVEFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
