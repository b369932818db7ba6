use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::UserId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
    Archived,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "declined" => Some(Self::Declined),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Supervisor,
    Manager,
    GeneralManager,
    Hr,
    HrBlueGray,
    Payroll,
    Completed,
}

impl Stage {
    pub const ACTIONABLE: [Stage; 6] = [
        Stage::Supervisor,
        Stage::Manager,
        Stage::GeneralManager,
        Stage::Hr,
        Stage::HrBlueGray,
        Stage::Payroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Manager => "manager",
            Self::GeneralManager => "general_manager",
            Self::Hr => "hr",
            Self::HrBlueGray => "hr_blue_gray",
            Self::Payroll => "payroll",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supervisor" => Some(Self::Supervisor),
            "manager" => Some(Self::Manager),
            "general_manager" => Some(Self::GeneralManager),
            "hr" => Some(Self::Hr),
            "hr_blue_gray" => Some(Self::HrBlueGray),
            "payroll" => Some(Self::Payroll),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Position in the approval line. Stages sharing a rank are alternatives.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Supervisor => 0,
            Self::Manager | Self::GeneralManager => 1,
            Self::Hr | Self::HrBlueGray => 2,
            Self::Payroll => 3,
            Self::Completed => 4,
        }
    }

    pub fn is_hr_capable(&self) -> bool {
        matches!(self, Self::Hr | Self::HrBlueGray | Self::Payroll)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar window of an absence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_well_formed(&self) -> bool {
        self.end >= self.start
    }

    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub target_shift_id: Option<String>,
}

/// Optimistic-concurrency guard captured when a request is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStamp {
    pub status: RequestStatus,
    pub current_stage: Stage,
    pub last_action_at: DateTime<Utc>,
    pub state_version: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbsenceRequest {
    pub id: RequestId,
    pub employee_id: UserId,
    pub request_type: String,
    pub window: DateWindow,
    pub quantity: Decimal,
    pub payload: RequestPayload,
    pub status: RequestStatus,
    pub current_stage: Stage,
    pub last_action_at: DateTime<Utc>,
    pub escalation_count: u32,
    pub is_escalated: bool,
    pub payroll_cutoff_date: DateTime<Utc>,
    pub late_approval_flag: bool,
    pub excluded_from_payroll: bool,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
}

impl AbsenceRequest {
    pub fn stamp(&self) -> StateStamp {
        StateStamp {
            status: self.status,
            current_stage: self.current_stage,
            last_action_at: self.last_action_at,
            state_version: self.state_version,
        }
    }

    pub fn matches_stamp(&self, stamp: &StateStamp) -> bool {
        self.stamp() == *stamp
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DateWindow, RequestStatus, Stage};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    #[test]
    fn stage_storage_encoding_is_stable() {
        for stage in Stage::ACTIONABLE.into_iter().chain([Stage::Completed]) {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
        }
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Declined,
            RequestStatus::Archived,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn stage_ranks_are_ordered_along_the_line() {
        assert!(Stage::Supervisor.rank() < Stage::Manager.rank());
        assert_eq!(Stage::Manager.rank(), Stage::GeneralManager.rank());
        assert!(Stage::GeneralManager.rank() < Stage::HrBlueGray.rank());
        assert!(Stage::Payroll.rank() < Stage::Completed.rank());
    }

    #[test]
    fn window_days_are_inclusive() {
        let window = DateWindow::new(date(2), date(4));
        let days: Vec<NaiveDate> = window.days().collect();

        assert_eq!(days, vec![date(2), date(3), date(4)]);
        assert!(window.overlaps(&DateWindow::new(date(4), date(9))));
        assert!(!window.overlaps(&DateWindow::new(date(5), date(9))));
        assert!(!DateWindow::new(date(4), date(2)).is_well_formed());
    }
}
