use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of any person known to the directory: employees, supervisors, HR staff.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role codes compare case-insensitively; they are stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleCode(String);

impl RoleCode {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollarType {
    White,
    Blue,
    Gray,
}

impl CollarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Blue => "blue",
            Self::Gray => "gray",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "white" | "white_collar" => Some(Self::White),
            "blue" | "blue_collar" => Some(Self::Blue),
            "gray" | "grey" | "gray_collar" => Some(Self::Gray),
            _ => None,
        }
    }

    pub fn is_blue_or_gray(&self) -> bool {
        matches!(self, Self::Blue | Self::Gray)
    }
}

/// Snapshot of an employee as supplied by the external directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub employee_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub general_manager_id: Option<UserId>,
    pub collar_type: CollarType,
    /// Classification used to partition HR responsibility (e.g. `unionized`).
    pub employee_type: String,
    pub assigned_role: RoleCode,
}
