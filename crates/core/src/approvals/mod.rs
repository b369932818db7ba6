pub mod resolver;
pub mod roles;

pub use resolver::{ApproverResolver, PolicyRoles, RoleSnapshot};
pub use roles::{HrAssignment, RoleGraph, RoleGraphError, RoleInheritance, DEFAULT_MAX_ROLE_DEPTH};
