use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_core::{RoleConfigSource, RoleGraph};
use leaveflow_db::{connect_with_config, migrations, ping, SqlDirectory};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded and validated ({} request types)",
                    config.catalog().len()
                ),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "role_graph"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "role_graph",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("database query failed: {error}"),
            },
        };
        let role_graph = check_role_graph(&pool, config).await;

        pool.close().await;
        vec![connectivity, role_graph]
    })
}

/// Flags inheritance edges that close a cycle. Resolution tolerates them,
/// but they usually mean an administrative mistake.
async fn check_role_graph(pool: &leaveflow_db::DbPool, config: &AppConfig) -> DoctorCheck {
    if let Err(error) = migrations::run_pending(pool).await {
        return DoctorCheck {
            name: "role_graph",
            status: CheckStatus::Fail,
            details: format!("migrations could not be applied: {error}"),
        };
    }

    let edges = match SqlDirectory::new(pool.clone()).role_edges().await {
        Ok(edges) => edges,
        Err(error) => {
            return DoctorCheck {
                name: "role_graph",
                status: CheckStatus::Fail,
                details: format!("failed to load role inheritance: {error}"),
            };
        }
    };

    let active: Vec<_> = edges.into_iter().filter(|edge| edge.active).collect();
    let graph = RoleGraph::with_max_depth(active.clone(), config.workflow.max_role_depth);
    let cyclic: Vec<String> = active
        .iter()
        .filter(|edge| graph.inherits(&edge.parent_role, &edge.child_role))
        .map(|edge| format!("{} -> {}", edge.child_role, edge.parent_role))
        .collect();

    if cyclic.is_empty() {
        DoctorCheck {
            name: "role_graph",
            status: CheckStatus::Pass,
            details: format!("{} active inheritance edges, no cycles", active.len()),
        }
    } else {
        DoctorCheck {
            name: "role_graph",
            status: CheckStatus::Fail,
            details: format!("edges closing a cycle: {}", cyclic.join(", ")),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
