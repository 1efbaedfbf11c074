//! Attendance ledger records

use serde::{Deserialize, Serialize};

/// How a check-in reached the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Scan,
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Scan => "scan",
            Source::Manual => "manual",
        }
    }
}

/// One check-in event. A user collects a new record for every check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub username: String,
    pub session_id: String,
    pub course_id: String,
    pub section_id: String,
    pub time: i64,
    pub device: String,
    pub source: Source,
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub kicked: bool,
}

/// Roster of a session that was replaced by a later start on the same slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedRoster {
    pub session_id: String,
    pub course_id: String,
    pub section_id: String,
    pub lecturer: String,
    pub start_at: i64,
    pub end_at: i64,
    pub attendance: Vec<AttendanceRecord>,
}
