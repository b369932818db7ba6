use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::{RoleCode, UserId};

pub const DEFAULT_MAX_ROLE_DEPTH: usize = 32;

/// Holders of `child_role` also carry every permission of `parent_role`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInheritance {
    pub child_role: RoleCode,
    pub parent_role: RoleCode,
    pub active: bool,
    pub priority: i32,
}

impl RoleInheritance {
    pub fn new(child_role: impl AsRef<str>, parent_role: impl AsRef<str>) -> Self {
        Self {
            child_role: RoleCode::new(child_role),
            parent_role: RoleCode::new(parent_role),
            active: true,
            priority: 0,
        }
    }
}

/// Routes HR approval for one employee classification to one HR user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrAssignment {
    pub hr_user_id: UserId,
    pub employee_type: String,
}

impl HrAssignment {
    pub fn new(hr_user_id: impl Into<String>, employee_type: impl Into<String>) -> Self {
        Self { hr_user_id: UserId::new(hr_user_id), employee_type: employee_type.into() }
    }

    pub fn covers(&self, employee_type: &str) -> bool {
        let assigned = normalize_key(&self.employee_type);
        assigned == "*" || assigned == "all" || assigned == normalize_key(employee_type)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoleGraphError {
    #[error("edge `{child}` -> `{parent}` would close an inheritance cycle")]
    Cycle { child: RoleCode, parent: RoleCode },
}

/// Active inheritance edges indexed by child role.
///
/// Traversal never trusts the data to be acyclic: every walk carries a
/// visited set and stops at `max_depth` hops.
#[derive(Clone, Debug, Default)]
pub struct RoleGraph {
    parents: HashMap<RoleCode, Vec<RoleCode>>,
    max_depth: usize,
}

impl RoleGraph {
    pub fn new(edges: Vec<RoleInheritance>) -> Self {
        Self::with_max_depth(edges, DEFAULT_MAX_ROLE_DEPTH)
    }

    pub fn with_max_depth(edges: Vec<RoleInheritance>, max_depth: usize) -> Self {
        let mut active: Vec<RoleInheritance> = edges.into_iter().filter(|edge| edge.active).collect();
        active.sort_by(|left, right| {
            right
                .priority
                .cmp(&left.priority)
                .then_with(|| left.parent_role.cmp(&right.parent_role))
        });

        let mut parents: HashMap<RoleCode, Vec<RoleCode>> = HashMap::new();
        for edge in active {
            let entry = parents.entry(edge.child_role).or_default();
            if !entry.contains(&edge.parent_role) {
                entry.push(edge.parent_role);
            }
        }

        Self { parents, max_depth: max_depth.max(1) }
    }

    /// Every role `role` transitively inherits from, excluding itself.
    pub fn ancestors(&self, role: &RoleCode) -> BTreeSet<RoleCode> {
        let mut visited: HashSet<RoleCode> = HashSet::from([role.clone()]);
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<(RoleCode, usize)> = VecDeque::from([(role.clone(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            let Some(parents) = self.parents.get(&current) else {
                continue;
            };
            for parent in parents {
                if visited.insert(parent.clone()) {
                    found.insert(parent.clone());
                    queue.push_back((parent.clone(), depth + 1));
                }
            }
        }

        found
    }

    /// True when `role` is `target` or carries its permissions.
    pub fn inherits(&self, role: &RoleCode, target: &RoleCode) -> bool {
        role == target || self.strictly_inherits(role, target)
    }

    pub fn strictly_inherits(&self, role: &RoleCode, target: &RoleCode) -> bool {
        role != target && self.ancestors(role).contains(target)
    }

    /// Administrative guard: reject an edge whose parent already inherits
    /// from the child.
    pub fn check_new_edge(&self, child: &RoleCode, parent: &RoleCode) -> Result<(), RoleGraphError> {
        if self.inherits(parent, child) {
            return Err(RoleGraphError::Cycle { child: child.clone(), parent: parent.clone() });
        }
        Ok(())
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{HrAssignment, RoleGraph, RoleGraphError, RoleInheritance};
    use crate::domain::employee::RoleCode;

    fn role(raw: &str) -> RoleCode {
        RoleCode::new(raw)
    }

    #[test]
    fn ancestors_follow_transitive_edges() {
        let graph = RoleGraph::new(vec![
            RoleInheritance::new("HR_BLUE_GRAY", "HR"),
            RoleInheritance::new("HR", "EMPLOYEE"),
            RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "SUPERVISOR"),
            RoleInheritance::new("SUPERVISOR_GENERAL_MANAGER", "GENERAL_MANAGER"),
        ]);

        assert_eq!(
            graph.ancestors(&role("hr_blue_gray")),
            BTreeSet::from([role("HR"), role("EMPLOYEE")])
        );
        assert!(graph.inherits(&role("SUPERVISOR_GENERAL_MANAGER"), &role("GENERAL_MANAGER")));
        assert!(graph.inherits(&role("HR"), &role("HR")));
        assert!(!graph.strictly_inherits(&role("HR"), &role("HR")));
        assert!(!graph.inherits(&role("HR"), &role("HR_BLUE_GRAY")));
    }

    #[test]
    fn inactive_edges_are_ignored() {
        let mut edge = RoleInheritance::new("ADMIN", "HR");
        edge.active = false;
        let graph = RoleGraph::new(vec![edge]);

        assert!(!graph.inherits(&role("ADMIN"), &role("HR")));
    }

    #[test]
    fn cyclic_data_terminates() {
        let graph = RoleGraph::new(vec![
            RoleInheritance::new("A", "B"),
            RoleInheritance::new("B", "C"),
            RoleInheritance::new("C", "A"),
        ]);

        assert_eq!(graph.ancestors(&role("A")), BTreeSet::from([role("B"), role("C")]));
        assert!(graph.inherits(&role("C"), &role("B")));
    }

    #[test]
    fn depth_bound_limits_traversal() {
        let graph = RoleGraph::with_max_depth(
            vec![RoleInheritance::new("A", "B"), RoleInheritance::new("B", "C")],
            1,
        );

        assert_eq!(graph.ancestors(&role("A")), BTreeSet::from([role("B")]));
    }

    #[test]
    fn cycle_introducing_edge_is_rejected() {
        let graph = RoleGraph::new(vec![
            RoleInheritance::new("HR_WHITE", "HR"),
            RoleInheritance::new("HR", "EMPLOYEE"),
        ]);

        assert_eq!(
            graph.check_new_edge(&role("EMPLOYEE"), &role("HR_WHITE")),
            Err(RoleGraphError::Cycle { child: role("EMPLOYEE"), parent: role("HR_WHITE") })
        );
        assert!(graph.check_new_edge(&role("ADMIN"), &role("HR")).is_ok());
        assert!(graph.check_new_edge(&role("HR"), &role("HR")).is_err());
    }

    #[test]
    fn hr_assignment_supports_wildcards() {
        assert!(HrAssignment::new("hr-1", "Unionized").covers("unionized"));
        assert!(HrAssignment::new("hr-2", "*").covers("confidential"));
        assert!(!HrAssignment::new("hr-3", "unionized").covers("confidential"));
    }
}
