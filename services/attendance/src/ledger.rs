//! Attendance ledger
//!
//! Per-slot log of check-ins. Records are never removed while the session
//! lives; leaving or being kicked flips `present` off on the user's open
//! record. The whole roster is returned after every mutation.

use tracing::{info, warn};

use crate::error::{AttendanceError, AttendanceResult};
use crate::export;
use crate::models::{
    Account, ArchivedRoster, AttendanceRecord, HistoryEntry, SlotKey, Source, now_millis,
};
use crate::policy;
use crate::store::{DocumentStore, Effects, SlotState};
use crate::tokens::AuthUser;

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub session_id: String,
    pub slot: SlotKey,
    pub username: String,
    pub source: Source,
    pub device: String,
    /// Skip the allow-list check. Reserved for staff manual entry.
    pub override_allow_list: bool,
}

/// Append a present record for the user, after checking ticket, time box,
/// allow-list and that the user is not already present.
pub fn record_check_in(
    state: &mut SlotState,
    effects: &mut Effects,
    check_in: &CheckIn,
    account: Option<&Account>,
    now: i64,
) -> AttendanceResult<Vec<AttendanceRecord>> {
    let session = state
        .session
        .as_ref()
        .filter(|s| s.session_id == check_in.session_id)
        .ok_or(AttendanceError::SessionMismatch)?;

    if !session.accepts_check_in(now) {
        return Err(AttendanceError::Ended);
    }

    if !check_in.override_allow_list
        && account.is_some_and(|a| !policy::is_allowed(a, &check_in.slot))
    {
        return Err(AttendanceError::Forbidden(format!(
            "{} may not check into {}",
            check_in.username, check_in.slot
        )));
    }

    if state
        .attendance
        .iter()
        .any(|r| r.username == check_in.username && r.present)
    {
        return Err(AttendanceError::Conflict(format!(
            "{} is already checked in",
            check_in.username
        )));
    }

    let record = AttendanceRecord {
        username: check_in.username.clone(),
        session_id: session.session_id.clone(),
        course_id: check_in.slot.course_id.clone(),
        section_id: check_in.slot.section_id.clone(),
        time: now,
        device: check_in.device.clone(),
        source: check_in.source,
        present: true,
        left_at: None,
        kicked: false,
    };

    effects.record_history(&check_in.username, HistoryEntry::Student(record.clone()));
    state.attendance.push(record);

    Ok(state.attendance.clone())
}

/// Close the user's open record. `kicked` marks a removal by staff.
pub fn record_departure(
    state: &mut SlotState,
    username: &str,
    kicked: bool,
    now: i64,
) -> AttendanceResult<Vec<AttendanceRecord>> {
    let record = state
        .attendance
        .iter_mut()
        .find(|r| r.username == username && r.present)
        .ok_or_else(|| AttendanceError::NotFound(format!("{username} is not present")))?;

    record.present = false;
    record.left_at = Some(now);
    if kicked {
        record.kicked = true;
    }

    Ok(state.attendance.clone())
}

/// Attendance ledger
#[derive(Clone)]
pub struct AttendanceLedger {
    store: DocumentStore,
}

impl AttendanceLedger {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Check a user into the slot's current session
    pub async fn add(&self, check_in: CheckIn) -> AttendanceResult<Vec<AttendanceRecord>> {
        let account = self.store.account(&check_in.username).await;

        let roster = self
            .store
            .transact(&check_in.slot, |state, effects| {
                record_check_in(state, effects, &check_in, account.as_ref(), now_millis())
            })
            .await
            .inspect_err(|e| {
                warn!(
                    "Check-in of {} on {} rejected: {}",
                    check_in.username, check_in.slot, e
                )
            })?;

        info!(
            "{} checked into {} via {}",
            check_in.username,
            check_in.slot,
            check_in.source.as_str()
        );
        Ok(roster)
    }

    /// The user leaves the slot
    pub async fn leave(
        &self,
        slot: &SlotKey,
        username: &str,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let roster = self
            .store
            .transact(slot, |state, _| {
                record_departure(state, username, false, now_millis())
            })
            .await?;

        info!("{} left {}", username, slot);
        Ok(roster)
    }

    /// Staff removes a student from the slot
    pub async fn kick(
        &self,
        slot: &SlotKey,
        student_id: &str,
        actor: &AuthUser,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        if !policy::is_privileged(actor.role) {
            return Err(AttendanceError::Forbidden(
                "only staff can remove attendees".to_string(),
            ));
        }

        let roster = self
            .store
            .transact(slot, |state, _| {
                record_departure(state, student_id, true, now_millis())
            })
            .await?;

        info!("{} removed {} from {}", actor.username, student_id, slot);
        Ok(roster)
    }

    /// Every record accumulated since the slot's last start
    pub async fn list(&self, slot: &SlotKey) -> Vec<AttendanceRecord> {
        self.store.slot(slot).await.attendance
    }

    /// The slot's ledger as CSV, named after the session it belongs to
    pub async fn export(&self, slot: &SlotKey) -> AttendanceResult<(String, String)> {
        let state = self.store.slot(slot).await;
        let session = state.session.ok_or(AttendanceError::NoSession)?;
        Ok((session.session_id, export::to_csv(&state.attendance)))
    }

    /// Roster of a session replaced by a later start
    pub async fn archived(&self, session_id: &str) -> AttendanceResult<ArchivedRoster> {
        self.store
            .archived(session_id)
            .await
            .ok_or_else(|| AttendanceError::NotFound(format!("no archived roster for {session_id}")))
    }

    pub async fn history(&self, username: &str) -> Vec<HistoryEntry> {
        self.store.history(username).await
    }
}
