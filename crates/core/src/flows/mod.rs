pub mod cutoff;
pub mod processor;
pub mod router;

pub use cutoff::{compute_cutoff, payroll_flags, stamp_terminal, PayrollFlags};
pub use processor::{
    ensure_actionable, plan_action, plan_archive, plan_escalation, plan_withdrawal, ActionInput,
    PlannedTransition,
};
pub use router::{RouteFacts, RouteFlags, RouteOutcome, StageRouter};
