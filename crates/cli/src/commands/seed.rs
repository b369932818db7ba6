use leaveflow_db::DemoOrganization;

use crate::commands::session::{execute, Failure, EXIT_MIGRATION, EXIT_VERIFICATION};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    execute("seed", |session| async move {
        let seeded = DemoOrganization::load(&session.pool)
            .await
            .map_err(|error| Failure::new("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoOrganization::verify(&session.pool).await.map_err(|error| {
            Failure::new("seed_verification", error.to_string(), EXIT_VERIFICATION)
        })?;
        if !verification.all_present {
            let failed = failed_checks(&verification.checks);
            return Err(Failure::new(
                "seed_verification",
                verification_message(&failed),
                EXIT_VERIFICATION,
            ));
        }

        let message = format!(
            "demo organization loaded: {} employees, {} role edges, {} hr assignments, {} payroll periods",
            seeded.employees, seeded.role_edges, seeded.hr_assignments, seeded.payroll_periods
        );
        let data = serde_json::to_value(&seeded).ok();
        Ok::<_, Failure>(CommandResult::success_with_data("seed", message, data))
    })
}

fn failed_checks(checks: &[(String, bool)]) -> Vec<&str> {
    checks.iter().filter_map(|(check, passed)| (!passed).then_some(check.as_str())).collect()
}

fn verification_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}
