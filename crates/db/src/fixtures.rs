use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use leaveflow_core::approvals::{HrAssignment, RoleInheritance};
use leaveflow_core::domain::employee::{CollarType, EmployeeRecord, RoleCode, UserId};

use crate::connection::DbPool;
use crate::repositories::{
    PayrollPeriod, RepositoryError, SqlDirectory, SqlPayrollCalendar,
};

struct SeedEmployee {
    id: &'static str,
    supervisor: Option<&'static str>,
    general_manager: Option<&'static str>,
    collar: CollarType,
    employee_type: &'static str,
    role: &'static str,
}

/// A small plant: one office line, one unionized floor line with a
/// combined supervisor, and the HR and payroll staff that serve both.
const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee {
        id: "gm-plant",
        supervisor: None,
        general_manager: None,
        collar: CollarType::White,
        employee_type: "confidential",
        role: "GENERAL_MANAGER",
    },
    SeedEmployee {
        id: "sup-office",
        supervisor: Some("gm-plant"),
        general_manager: Some("gm-plant"),
        collar: CollarType::White,
        employee_type: "confidential",
        role: "SUPERVISOR",
    },
    SeedEmployee {
        id: "sup-floor",
        supervisor: Some("gm-plant"),
        general_manager: Some("gm-plant"),
        collar: CollarType::Blue,
        employee_type: "unionized",
        role: "SUPERVISOR_GENERAL_MANAGER",
    },
    SeedEmployee {
        id: "emp-analyst",
        supervisor: Some("sup-office"),
        general_manager: Some("gm-plant"),
        collar: CollarType::White,
        employee_type: "confidential",
        role: "EMPLOYEE",
    },
    SeedEmployee {
        id: "emp-operator",
        supervisor: Some("sup-floor"),
        general_manager: None,
        collar: CollarType::Blue,
        employee_type: "unionized",
        role: "EMPLOYEE",
    },
    SeedEmployee {
        id: "hr-office",
        supervisor: None,
        general_manager: None,
        collar: CollarType::White,
        employee_type: "confidential",
        role: "HR",
    },
    SeedEmployee {
        id: "hr-union",
        supervisor: None,
        general_manager: None,
        collar: CollarType::White,
        employee_type: "confidential",
        role: "HR_BLUE_GRAY",
    },
    SeedEmployee {
        id: "payroll-1",
        supervisor: None,
        general_manager: None,
        collar: CollarType::White,
        employee_type: "confidential",
        role: "PAYROLL",
    },
];

const SEED_ROLE_EDGES: &[(&str, &str)] = &[
    ("SUPERVISOR_GENERAL_MANAGER", "SUPERVISOR"),
    ("SUPERVISOR_GENERAL_MANAGER", "GENERAL_MANAGER"),
    ("HR_BLUE_GRAY", "HR"),
    ("ADMIN", "HR"),
    ("ADMIN", "GENERAL_MANAGER"),
];

const SEED_HR_ASSIGNMENTS: &[(&str, &str)] = &[("hr-union", "unionized")];

/// Semi-monthly periods for the seeded year; cutoff is 18:00 UTC three
/// days before each period closes.
pub const SEED_PAYROLL_YEAR: i32 = 2026;

/// Deterministic demo organization for local runs and smoke checks.
pub struct DemoOrganization;

#[derive(Clone, Debug, Serialize)]
pub struct SeedResult {
    pub employees: usize,
    pub role_edges: usize,
    pub hr_assignments: usize,
    pub payroll_periods: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

impl DemoOrganization {
    /// Idempotent: re-running updates rows in place.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlDirectory::new(pool.clone());
        for seed in SEED_EMPLOYEES {
            directory.upsert_employee(&seed.record()).await?;
        }
        for (child, parent) in SEED_ROLE_EDGES {
            directory.add_role_edge(&RoleInheritance::new(child, parent)).await?;
        }
        for (hr_user, employee_type) in SEED_HR_ASSIGNMENTS {
            directory.add_hr_assignment(&HrAssignment::new(*hr_user, *employee_type)).await?;
        }

        let calendar = SqlPayrollCalendar::new(pool.clone());
        let periods = payroll_periods(SEED_PAYROLL_YEAR)?;
        for period in &periods {
            calendar.upsert_period(period).await?;
        }

        Ok(SeedResult {
            employees: SEED_EMPLOYEES.len(),
            role_edges: SEED_ROLE_EDGES.len(),
            hr_assignments: SEED_HR_ASSIGNMENTS.len(),
            payroll_periods: periods.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for seed in SEED_EMPLOYEES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM employee WHERE employee_id = ?1 AND assigned_role = ?2)",
            )
            .bind(seed.id)
            .bind(seed.role)
            .fetch_one(pool)
            .await?;
            checks.push((format!("employee:{}", seed.id), exists == 1));
        }

        for (child, parent) in SEED_ROLE_EDGES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM role_inheritance
                               WHERE child_role = ?1 AND parent_role = ?2 AND active = 1)",
            )
            .bind(*child)
            .bind(*parent)
            .fetch_one(pool)
            .await?;
            checks.push((format!("role-edge:{child}->{parent}"), exists == 1));
        }

        let period_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM payroll_period WHERE starts_on LIKE ?1 AND employee_type = '*'",
        )
        .bind(format!("{SEED_PAYROLL_YEAR}-%"))
        .fetch_one(pool)
        .await?;
        checks.push(("payroll-periods".to_string(), period_count == 24));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

impl SeedEmployee {
    fn record(&self) -> EmployeeRecord {
        EmployeeRecord {
            employee_id: UserId::new(self.id),
            supervisor_id: self.supervisor.map(UserId::new),
            general_manager_id: self.general_manager.map(UserId::new),
            collar_type: self.collar,
            employee_type: self.employee_type.to_string(),
            assigned_role: RoleCode::new(self.role),
        }
    }
}

fn payroll_periods(year: i32) -> Result<Vec<PayrollPeriod>, RepositoryError> {
    let invalid = || RepositoryError::Rejected(format!("cannot build payroll periods for {year}"));
    let mut periods = Vec::with_capacity(24);

    for month in 1..=12u32 {
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        let last = next_month - Duration::days(1);
        let mid = NaiveDate::from_ymd_opt(year, month, 15).ok_or_else(invalid)?;

        for (half, starts_on, ends_on) in [(1, first, mid), (2, mid + Duration::days(1), last)] {
            let cutoff_day = ends_on - Duration::days(3);
            let cutoff_at = Utc
                .with_ymd_and_hms(cutoff_day.year(), cutoff_day.month(), cutoff_day.day(), 18, 0, 0)
                .single()
                .ok_or_else(invalid)?;
            periods.push(PayrollPeriod {
                period_id: format!("{year}-{month:02}-Q{half}"),
                employee_type: "*".to_string(),
                starts_on,
                ends_on,
                cutoff_at,
            });
        }
    }

    Ok(periods)
}
