//! Domain models and the request/response payloads of the HTTP API

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

pub mod account;
pub mod attendance;
pub mod history;
pub mod session;
pub mod slot;

pub use account::{Account, Role};
pub use attendance::{ArchivedRoster, AttendanceRecord, Source};
pub use history::{HistoryEntry, LecturerEntry};
pub use session::LectureSession;
pub use slot::SlotKey;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Query selecting a slot
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotQuery {
    pub course_id: Option<String>,
    pub section_id: Option<String>,
}

/// Request for starting a session
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub lecturer: Option<String>,
    pub duration_minutes: Option<i64>,
    pub replace_active: Option<bool>,
}

/// Request for adding an attendance record. Either `sessionId` or the raw
/// scanned `ticket` must be present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAttendanceRequest {
    pub session_id: Option<String>,
    pub ticket: Option<String>,
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub source: Source,
    pub device: Option<String>,
    #[serde(default)]
    pub r#override: bool,
}

/// Request for leaving a session
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub username: Option<String>,
}

/// Request for removing an attendee
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub student_id: Option<String>,
}

/// Request for user login
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Response for user login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub allowed_sections: Vec<String>,
}

/// Request for creating an account
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "sections_from_list_or_csv")]
    pub allowed_sections: Vec<String>,
}

/// Response body of the ledger mutations
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub ok: bool,
    pub attendance: Vec<AttendanceRecord>,
}

/// Active session with its live head count
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionSummary {
    #[serde(flatten)]
    pub session: LectureSession,
    pub present_count: usize,
    pub total: usize,
}

/// Accepts `["C1-S1","C2-S3"]` or `"C1-S1, C2-S3"`.
fn sections_from_list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Sections {
        List(Vec<String>),
        Csv(String),
    }

    let sections = match Option::<Sections>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Sections::List(list)) => list,
        Some(Sections::Csv(raw)) => raw.split(',').map(str::to_string).collect(),
    };

    Ok(sections
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
