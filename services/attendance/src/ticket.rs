//! Ticket codec
//!
//! A ticket is the JSON payload embedded in the scannable code. Only the
//! `sessionId` decides whether a check-in is accepted; the other fields are
//! informational, `ts` included, so a refreshed ticket does not invalidate
//! earlier ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AttendanceError;
use crate::models::LectureSession;

#[derive(Error, Debug)]
pub enum TicketError {
    #[error("ticket is empty")]
    Empty,

    #[error("ticket is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<TicketError> for AttendanceError {
    fn from(e: TicketError) -> Self {
        AttendanceError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub session_id: String,
    pub course_id: String,
    pub section_id: String,
    pub lecturer: String,
    pub ts: i64,
}

impl Ticket {
    pub fn for_session(session: &LectureSession, ts: i64) -> Self {
        Self {
            session_id: session.session_id.clone(),
            course_id: session.course_id.clone(),
            section_id: session.section_id.clone(),
            lecturer: session.lecturer.clone(),
            ts,
        }
    }

    pub fn encode(&self) -> Result<String, TicketError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self, TicketError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claim {
    session_id: String,
}

/// Extract the claimed session id from a scanned or typed payload.
///
/// Accepts any JSON object carrying `sessionId`; anything that is not JSON is
/// taken as a bare session id typed by hand.
pub fn session_id_from(payload: &str) -> Result<String, TicketError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(TicketError::Empty);
    }

    if payload.starts_with('{') {
        let claim: Claim = serde_json::from_str(payload)?;
        return Ok(claim.session_id);
    }

    Ok(payload.to_string())
}
