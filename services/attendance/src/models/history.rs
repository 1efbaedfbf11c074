//! Per-user history log entries

use serde::{Deserialize, Serialize};

use super::attendance::AttendanceRecord;

/// Lecture opened by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerEntry {
    pub session_id: String,
    pub course_id: String,
    pub section_id: String,
    pub start_at: i64,
    pub end_at: i64,
    pub created_at: i64,
}

/// Append-only history item, tagged by the part the user played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum HistoryEntry {
    Lecturer(LecturerEntry),
    Student(AttendanceRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_carry_role_tag() {
        let entry = HistoryEntry::Lecturer(LecturerEntry {
            session_id: "SES-A".to_string(),
            course_id: "C1".to_string(),
            section_id: "S1".to_string(),
            start_at: 1,
            end_at: 2,
            created_at: 1,
        });
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["role"], "lecturer");
        assert_eq!(value["sessionId"], "SES-A");
    }
}
