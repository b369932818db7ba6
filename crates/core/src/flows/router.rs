use serde::{Deserialize, Serialize};

use crate::approvals::{PolicyRoles, RoleGraph};
use crate::domain::employee::{CollarType, RoleCode};
use crate::domain::history::ApprovalAction;
use crate::domain::request::{RequestStatus, Stage};

/// Attributes of a request and its approval line that decide routing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFacts {
    pub collar_type: CollarType,
    pub hr_mandatory: bool,
    pub supervisor_role: Option<RoleCode>,
    pub manager_role: Option<RoleCode>,
}

/// Classification flags the transition table is keyed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteFlags {
    /// Supervisor holds a role that already carries general-manager authority.
    pub combined_supervisor: bool,
    /// `Manager` or `GeneralManager`.
    pub manager_stage: Stage,
    /// HR variant the request must pass, if any.
    pub hr_stage: Option<Stage>,
}

/// Where a request goes after an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteOutcome {
    Advance(Stage),
    Approved,
    Declined,
}

impl RouteOutcome {
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Advance(_) => RequestStatus::Pending,
            Self::Approved => RequestStatus::Approved,
            Self::Declined => RequestStatus::Declined,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StageRouter {
    roles: PolicyRoles,
}

impl StageRouter {
    pub fn new(roles: PolicyRoles) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &PolicyRoles {
        &self.roles
    }

    pub fn flags(&self, facts: &RouteFacts, graph: &RoleGraph) -> RouteFlags {
        let combined_supervisor = facts.supervisor_role.as_ref().is_some_and(|role| {
            self.roles.combined.iter().any(|combined| graph.inherits(role, combined))
        });
        let manager_stage = match &facts.manager_role {
            Some(role) if graph.inherits(role, &self.roles.general_manager) => {
                Stage::GeneralManager
            }
            _ => Stage::Manager,
        };
        let collar_hr = if facts.collar_type.is_blue_or_gray() { Stage::HrBlueGray } else { Stage::Hr };
        let hr_stage = if combined_supervisor || facts.collar_type.is_blue_or_gray() || facts.hr_mandatory
        {
            Some(collar_hr)
        } else {
            None
        };

        RouteFlags { combined_supervisor, manager_stage, hr_stage }
    }

    pub fn initial_stage(&self, flags: &RouteFlags) -> Stage {
        match (flags.combined_supervisor, flags.hr_stage) {
            (true, Some(hr)) => hr,
            // A combined line with no HR stage has nobody to ask.
            (true, None) => flags.manager_stage,
            (false, _) => Stage::Supervisor,
        }
    }

    /// Transition table: (current stage, flags) → next stage.
    pub fn next_stage(&self, current: Stage, flags: &RouteFlags) -> Stage {
        use Stage::{Completed, GeneralManager, Hr, HrBlueGray, Manager, Payroll, Supervisor};

        match (current, flags.combined_supervisor, flags.hr_stage) {
            (Supervisor, false, _) => flags.manager_stage,
            (Supervisor, true, Some(hr)) => hr,
            (Supervisor, true, None) => Completed,
            (Manager | GeneralManager, _, Some(hr)) => hr,
            (Manager | GeneralManager, _, None) => Completed,
            (Hr | HrBlueGray | Payroll | Completed, _, _) => Completed,
        }
    }

    pub fn route(&self, current: Stage, action: ApprovalAction, flags: &RouteFlags) -> RouteOutcome {
        if action == ApprovalAction::Declined {
            return RouteOutcome::Declined;
        }
        match self.next_stage(current, flags) {
            Stage::Completed => RouteOutcome::Approved,
            next => RouteOutcome::Advance(next),
        }
    }

    /// Ordered stages a request will visit, `Completed` excluded.
    pub fn plan(&self, flags: &RouteFlags) -> Vec<Stage> {
        let mut stages = Vec::new();
        let mut current = self.initial_stage(flags);
        while current != Stage::Completed && stages.len() < Stage::ACTIONABLE.len() {
            stages.push(current);
            current = self.next_stage(current, flags);
        }
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::{RouteFacts, RouteFlags, RouteOutcome, StageRouter};
    use crate::approvals::{RoleGraph, RoleInheritance};
    use crate::domain::employee::{CollarType, RoleCode};
    use crate::domain::history::ApprovalAction;
    use crate::domain::request::Stage;

    fn graph() -> RoleGraph {
        RoleGraph::new(vec![
            RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "SUPERVISOR"),
            RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "GENERAL_MANAGER"),
            RoleInheritance::new("PLANT_DIRECTOR", "SUPERVISOR_GENERAL_MANAGER"),
        ])
    }

    fn facts(collar: CollarType, supervisor: &str, manager: &str, hr_mandatory: bool) -> RouteFacts {
        RouteFacts {
            collar_type: collar,
            hr_mandatory,
            supervisor_role: Some(RoleCode::new(supervisor)),
            manager_role: Some(RoleCode::new(manager)),
        }
    }

    fn plan_for(facts: &RouteFacts) -> Vec<Stage> {
        let router = StageRouter::default();
        router.plan(&router.flags(facts, &graph()))
    }

    #[test]
    fn policy_table_matches_documented_sequences() {
        use CollarType::{Blue, Gray, White};
        use Stage::{GeneralManager, Hr, HrBlueGray, Manager, Supervisor};

        let cases = [
            (White, "SUPERVISOR", "MANAGER", false, vec![Supervisor, Manager]),
            (White, "SUPERVISOR", "MANAGER", true, vec![Supervisor, Manager, Hr]),
            (White, "SUPERVISOR", "GENERAL_MANAGER", false, vec![Supervisor, GeneralManager]),
            (Blue, "SUPERVISOR", "MANAGER", false, vec![Supervisor, Manager, HrBlueGray]),
            (Gray, "SUPERVISOR", "GENERAL_MANAGER", false, vec![Supervisor, GeneralManager, HrBlueGray]),
            (White, "SUPERVISOR_GENERAL_MANAGER", "MANAGER", false, vec![Hr]),
            (Blue, "SUPERVISOR_GENERAL_MANAGER", "MANAGER", false, vec![HrBlueGray]),
            (Gray, "PLANT_DIRECTOR", "MANAGER", true, vec![HrBlueGray]),
        ];

        for (collar, supervisor, manager, hr_mandatory, expected) in cases {
            assert_eq!(
                plan_for(&facts(collar, supervisor, manager, hr_mandatory)),
                expected,
                "collar={collar:?} supervisor={supervisor} manager={manager} hr_mandatory={hr_mandatory}"
            );
        }
    }

    #[test]
    fn missing_line_roles_default_to_plain_sequence() {
        let router = StageRouter::default();
        let flags = router.flags(
            &RouteFacts {
                collar_type: CollarType::White,
                hr_mandatory: false,
                supervisor_role: None,
                manager_role: None,
            },
            &graph(),
        );

        assert_eq!(router.plan(&flags), vec![Stage::Supervisor, Stage::Manager]);
    }

    #[test]
    fn decline_short_circuits_every_stage() {
        let router = StageRouter::default();
        let flags = router.flags(&facts(CollarType::Blue, "SUPERVISOR", "MANAGER", false), &graph());

        for stage in Stage::ACTIONABLE {
            assert_eq!(router.route(stage, ApprovalAction::Declined, &flags), RouteOutcome::Declined);
        }
    }

    #[test]
    fn approval_never_regresses() {
        let router = StageRouter::default();
        let flag_sets = [
            RouteFlags { combined_supervisor: false, manager_stage: Stage::Manager, hr_stage: None },
            RouteFlags {
                combined_supervisor: true,
                manager_stage: Stage::GeneralManager,
                hr_stage: Some(Stage::HrBlueGray),
            },
            RouteFlags {
                combined_supervisor: false,
                manager_stage: Stage::GeneralManager,
                hr_stage: Some(Stage::Hr),
            },
        ];

        for flags in flag_sets {
            for stage in Stage::ACTIONABLE {
                let next = router.next_stage(stage, &flags);
                assert!(next.rank() > stage.rank(), "{stage:?} -> {next:?} regressed");
            }
        }
    }

    #[test]
    fn last_stage_approval_completes_request() {
        let router = StageRouter::default();
        let flags = router.flags(&facts(CollarType::White, "SUPERVISOR", "MANAGER", false), &graph());

        assert_eq!(
            router.route(Stage::Supervisor, ApprovalAction::Approved, &flags),
            RouteOutcome::Advance(Stage::Manager)
        );
        assert_eq!(router.route(Stage::Manager, ApprovalAction::Approved, &flags), RouteOutcome::Approved);
        assert_eq!(RouteOutcome::Approved.status().as_str(), "approved");
    }
}
