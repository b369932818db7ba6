//! Reconstruction of a request's state from its audit trail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::history::AuditEntry;
use crate::domain::request::{RequestStatus, Stage};
use crate::flows::router::{RouteFlags, RouteOutcome, StageRouter};

/// Version a freshly created request carries; the first entry produces the next one.
pub const INITIAL_STATE_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayState {
    pub status: RequestStatus,
    pub current_stage: Stage,
    pub state_version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("entry {index} carries version {found}, expected {expected}")]
    OutOfSequence { index: usize, expected: u32, found: u32 },
    #[error("entry {index} acts on stage {found} while the request was at {expected}")]
    StageMismatch { index: usize, expected: Stage, found: Stage },
    #[error("entry {index} follows terminal status {status}")]
    AfterTerminal { index: usize, status: &'static str },
}

/// Sorts entries into commit order: timestamp first, version as tie-breaker.
pub fn commit_order(entries: &mut [AuditEntry]) {
    entries.sort_by(|left, right| {
        left.occurred_at()
            .cmp(&right.occurred_at())
            .then(left.state_version().cmp(&right.state_version()))
    });
}

/// Folds ordered audit entries into the `(status, stage)` they produce.
///
/// Archival is outside the round trip: it writes no entry, so an archived
/// request replays to the approved or declined status it was archived from.
/// Compare an archived request by its pre-archive outcome, never by status.
pub fn replay(
    router: &StageRouter,
    flags: &RouteFlags,
    initial_stage: Stage,
    entries: &[AuditEntry],
) -> Result<ReplayState, ReplayError> {
    let mut state = ReplayState {
        status: RequestStatus::Pending,
        current_stage: initial_stage,
        state_version: INITIAL_STATE_VERSION,
    };

    for (index, entry) in entries.iter().enumerate() {
        if state.status != RequestStatus::Pending {
            return Err(ReplayError::AfterTerminal { index, status: state.status.as_str() });
        }
        let expected = state.state_version + 1;
        if entry.state_version() != expected {
            return Err(ReplayError::OutOfSequence {
                index,
                expected,
                found: entry.state_version(),
            });
        }

        let (acted_on, outcome) = match entry {
            AuditEntry::Approval(history) => {
                (history.stage, router.route(history.stage, history.action, flags))
            }
            AuditEntry::Escalation(log) => {
                let outcome = match log.to_stage {
                    Stage::Completed => RouteOutcome::Approved,
                    next => RouteOutcome::Advance(next),
                };
                (log.from_stage, outcome)
            }
        };
        if acted_on != state.current_stage {
            return Err(ReplayError::StageMismatch {
                index,
                expected: state.current_stage,
                found: acted_on,
            });
        }

        match outcome {
            RouteOutcome::Advance(next) => state.current_stage = next,
            RouteOutcome::Approved => {
                state.status = RequestStatus::Approved;
                state.current_stage = Stage::Completed;
            }
            RouteOutcome::Declined => state.status = RequestStatus::Declined,
        }
        state.state_version = expected;
    }

    Ok(state)
}
