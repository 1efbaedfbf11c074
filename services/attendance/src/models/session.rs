//! Lecture session model

use serde::{Deserialize, Serialize};

use super::slot::SlotKey;

/// A time-boxed lecture opened by a presenter on one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureSession {
    pub session_id: String,
    pub course_id: String,
    pub section_id: String,
    pub lecturer: String,
    /// Serialized ticket handed out as the scannable code
    pub payload: String,
    pub created_at: i64,
    pub start_at: i64,
    pub end_at: i64,
    pub duration_minutes: i64,
    pub active: bool,
}

impl LectureSession {
    pub fn slot(&self) -> SlotKey {
        SlotKey::new(&self.course_id, &self.section_id)
    }

    /// `endAt` has passed. The `active` flag may still be set until someone
    /// reads the status.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.end_at
    }

    pub fn accepts_check_in(&self, now: i64) -> bool {
        self.active && !self.is_expired(now)
    }
}
