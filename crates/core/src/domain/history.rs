use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::UserId;
use crate::domain::request::{RequestId, Stage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Declined,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "declined" | "decline" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// One human decision. Never mutated after it is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalHistory {
    pub id: String,
    pub request_id: RequestId,
    pub approver: UserId,
    pub stage: Stage,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Request version produced by the transition that wrote this entry.
    pub state_version: u32,
}

/// One system-initiated stage advance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationLog {
    pub id: String,
    pub request_id: RequestId,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub occurred_at: DateTime<Utc>,
    pub reason: String,
    pub notified: BTreeSet<UserId>,
    pub state_version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    Approval(ApprovalHistory),
    Escalation(EscalationLog),
}

impl AuditEntry {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Approval(entry) => entry.occurred_at,
            Self::Escalation(entry) => entry.occurred_at,
        }
    }

    pub fn state_version(&self) -> u32 {
        match self {
            Self::Approval(entry) => entry.state_version,
            Self::Escalation(entry) => entry.state_version,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Approval(entry) => &entry.request_id,
            Self::Escalation(entry) => &entry.request_id,
        }
    }
}
