//! Session manager
//!
//! Owns the lifecycle of the single lecture session a slot can hold. The
//! state transitions are plain functions over a [`SlotState`] and an explicit
//! `now`; the manager runs them inside store transactions.

use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{Catalog, SECTION_CAPACITY};
use crate::error::{AttendanceError, AttendanceResult};
use crate::models::{
    ActiveSessionSummary, ArchivedRoster, HistoryEntry, LectureSession, LecturerEntry, SlotKey,
    now_millis,
};
use crate::store::{DocumentStore, Effects, SlotState};
use crate::ticket::Ticket;

const SESSION_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SESSION_ID_LEN: usize = 8;

/// Longest session a start may request: one week
pub const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

/// What `start` does when the slot already holds a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Replace it and reset the roster
    Replace,
    /// Fail with `Conflict`
    Reject,
}

impl From<bool> for ReplacePolicy {
    fn from(replace: bool) -> Self {
        if replace {
            ReplacePolicy::Replace
        } else {
            ReplacePolicy::Reject
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartSession {
    pub slot: SlotKey,
    pub lecturer: String,
    pub duration_minutes: i64,
    pub policy: ReplacePolicy,
}

/// Opaque session id: `SES-` plus eight characters from `[A-Z0-9]`
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect();
    format!("SES-{suffix}")
}

/// Install a new session on the slot, archiving and clearing whatever roster
/// the previous one left behind.
pub fn open(
    state: &mut SlotState,
    effects: &mut Effects,
    request: &StartSession,
    session_id: &str,
    now: i64,
) -> AttendanceResult<LectureSession> {
    if let Some(previous) = &state.session {
        if request.policy == ReplacePolicy::Reject && previous.accepts_check_in(now) {
            return Err(AttendanceError::Conflict(format!(
                "session {} is still active",
                previous.session_id
            )));
        }

        effects.archive(ArchivedRoster {
            session_id: previous.session_id.clone(),
            course_id: previous.course_id.clone(),
            section_id: previous.section_id.clone(),
            lecturer: previous.lecturer.clone(),
            start_at: previous.start_at,
            end_at: previous.end_at,
            attendance: std::mem::take(&mut state.attendance),
        });
    }

    let end_at = request
        .duration_minutes
        .checked_mul(60 * 1000)
        .and_then(|ms| now.checked_add(ms))
        .ok_or_else(|| AttendanceError::Validation("durationMinutes is out of range".to_string()))?;
    let mut session = LectureSession {
        session_id: session_id.to_string(),
        course_id: request.slot.course_id.clone(),
        section_id: request.slot.section_id.clone(),
        lecturer: request.lecturer.clone(),
        payload: String::new(),
        created_at: now,
        start_at: now,
        end_at,
        duration_minutes: request.duration_minutes,
        active: true,
    };
    session.payload = Ticket::for_session(&session, now)
        .encode()
        .map_err(|e| AttendanceError::Internal(e.to_string()))?;

    state.attendance.clear();
    state.session = Some(session.clone());

    effects.record_history(
        &request.lecturer,
        HistoryEntry::Lecturer(LecturerEntry {
            session_id: session.session_id.clone(),
            course_id: session.course_id.clone(),
            section_id: session.section_id.clone(),
            start_at: session.start_at,
            end_at: session.end_at,
            created_at: now,
        }),
    );

    Ok(session)
}

/// Deactivate the session. `endAt` is pulled back to `now` if it lies ahead.
pub fn close(state: &mut SlotState, now: i64) -> AttendanceResult<LectureSession> {
    let session = state
        .session
        .as_mut()
        .filter(|s| s.active)
        .ok_or(AttendanceError::NotActive)?;

    session.active = false;
    if now < session.end_at {
        session.end_at = now;
    }

    Ok(session.clone())
}

/// Re-issue the ticket with a fresh timestamp; the session id is unchanged.
pub fn rotate_ticket(state: &mut SlotState, now: i64) -> AttendanceResult<LectureSession> {
    let session = state.session.as_mut().ok_or(AttendanceError::NoSession)?;

    session.payload = Ticket::for_session(session, now)
        .encode()
        .map_err(|e| AttendanceError::Internal(e.to_string()))?;

    Ok(session.clone())
}

/// Flip an active session whose `endAt` has passed to inactive. Idempotent.
pub fn expire_if_stale(state: &mut SlotState, now: i64) -> Option<LectureSession> {
    let session = state.session.as_mut()?;
    if session.active && session.is_expired(now) {
        session.active = false;
    }
    Some(session.clone())
}

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    store: DocumentStore,
    catalog: Arc<Catalog>,
}

impl SessionManager {
    pub fn new(store: DocumentStore, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Open a new session on the slot
    pub async fn start(&self, request: StartSession) -> AttendanceResult<LectureSession> {
        if !self.catalog.contains(&request.slot) {
            return Err(AttendanceError::NotFound(format!(
                "unknown course/section {}",
                request.slot
            )));
        }
        if !(1..=MAX_DURATION_MINUTES).contains(&request.duration_minutes) {
            return Err(AttendanceError::Validation(format!(
                "durationMinutes must be between 1 and {MAX_DURATION_MINUTES}"
            )));
        }

        let session_id = generate_session_id();
        let session = self
            .store
            .transact(&request.slot, |state, effects| {
                open(state, effects, &request, &session_id, now_millis())
            })
            .await
            .inspect_err(|e| warn!("Start on {} rejected: {}", request.slot, e))?;

        info!(
            "Session {} started on {} by {} for {} minutes",
            session.session_id, request.slot, request.lecturer, request.duration_minutes
        );
        Ok(session)
    }

    /// End the slot's session
    pub async fn end(&self, slot: &SlotKey) -> AttendanceResult<LectureSession> {
        let session = self
            .store
            .transact(slot, |state, _| close(state, now_millis()))
            .await
            .inspect_err(|e| warn!("End on {} rejected: {}", slot, e))?;

        info!("Session {} on {} ended", session.session_id, slot);
        Ok(session)
    }

    /// Re-issue the slot's ticket
    pub async fn refresh(&self, slot: &SlotKey) -> AttendanceResult<LectureSession> {
        let session = self
            .store
            .transact(slot, |state, _| rotate_ticket(state, now_millis()))
            .await?;

        info!("Ticket for session {} on {} refreshed", session.session_id, slot);
        Ok(session)
    }

    /// Current session of the slot, expiring it first if its time is up
    pub async fn status(&self, slot: &SlotKey) -> AttendanceResult<Option<LectureSession>> {
        self.store
            .transact(slot, |state, _| {
                Ok::<_, AttendanceError>(expire_if_stale(state, now_millis()))
            })
            .await
    }

    /// Sessions flagged active, with their live head count. A session past
    /// `endAt` stays listed until a status read expires it.
    pub async fn active(&self) -> Vec<ActiveSessionSummary> {
        self.store
            .slots()
            .await
            .into_iter()
            .filter_map(|state| {
                let session = state.session.filter(|s| s.active)?;
                let present_count = state.attendance.iter().filter(|r| r.present).count();
                Some(ActiveSessionSummary {
                    session,
                    present_count,
                    total: SECTION_CAPACITY,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceRecord, Source};
    use crate::store::test_support::{block_saves, temp_store};

    const T0: i64 = 1_700_000_000_000;

    fn request(policy: ReplacePolicy) -> StartSession {
        StartSession {
            slot: SlotKey::new("C1", "S1"),
            lecturer: "L1".to_string(),
            duration_minutes: 60,
            policy,
        }
    }

    fn record(username: &str, session_id: &str) -> AttendanceRecord {
        AttendanceRecord {
            username: username.to_string(),
            session_id: session_id.to_string(),
            course_id: "C1".to_string(),
            section_id: "S1".to_string(),
            time: T0,
            device: "unknown".to_string(),
            source: Source::Scan,
            present: true,
            left_at: None,
            kicked: false,
        }
    }

    fn manager(store: DocumentStore) -> SessionManager {
        SessionManager::new(store, Arc::new(Catalog::standard()))
    }

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert!(id.starts_with("SES-"));
        assert_eq!(id.len(), 4 + SESSION_ID_LEN);
        assert!(id[4..].bytes().all(|b| SESSION_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_open_sets_time_box_and_ticket() {
        let mut state = SlotState::default();
        let mut effects = Effects::default();

        let session = open(
            &mut state,
            &mut effects,
            &request(ReplacePolicy::Replace),
            "SES-A",
            T0,
        )
        .unwrap();

        assert_eq!(session.start_at, T0);
        assert_eq!(session.end_at, T0 + 3_600_000);
        assert!(session.active);
        let ticket = Ticket::decode(&session.payload).unwrap();
        assert_eq!(ticket.session_id, "SES-A");
        assert_eq!(ticket.ts, T0);
    }

    #[test]
    fn test_open_replaces_and_archives_roster() {
        let mut state = SlotState::default();
        let mut effects = Effects::default();
        open(&mut state, &mut effects, &request(ReplacePolicy::Replace), "SES-A", T0).unwrap();
        state.attendance.push(record("stud1", "SES-A"));

        let mut effects = Effects::default();
        let session = open(
            &mut state,
            &mut effects,
            &request(ReplacePolicy::Replace),
            "SES-B",
            T0 + 1,
        )
        .unwrap();

        assert_eq!(session.session_id, "SES-B");
        assert!(state.attendance.is_empty());
        assert_eq!(state.session.as_ref().unwrap().session_id, "SES-B");
    }

    #[test]
    fn test_reject_policy_refuses_live_session() {
        let mut state = SlotState::default();
        let mut effects = Effects::default();
        open(&mut state, &mut effects, &request(ReplacePolicy::Replace), "SES-A", T0).unwrap();

        let err = open(
            &mut state,
            &mut effects,
            &request(ReplacePolicy::Reject),
            "SES-B",
            T0 + 1,
        )
        .unwrap_err();
        assert!(matches!(err, AttendanceError::Conflict(_)));
        assert_eq!(state.session.as_ref().unwrap().session_id, "SES-A");

        // Once the time box is over the slot is free again.
        let after = T0 + 3_600_001;
        let session = open(
            &mut state,
            &mut effects,
            &request(ReplacePolicy::Reject),
            "SES-C",
            after,
        )
        .unwrap();
        assert_eq!(session.session_id, "SES-C");
    }

    #[test]
    fn test_close_pulls_end_forward() {
        let mut state = SlotState::default();
        open(
            &mut state,
            &mut Effects::default(),
            &request(ReplacePolicy::Replace),
            "SES-A",
            T0,
        )
        .unwrap();

        let closed = close(&mut state, T0 + 10).unwrap();
        assert!(!closed.active);
        assert_eq!(closed.end_at, T0 + 10);

        assert!(matches!(close(&mut state, T0 + 20), Err(AttendanceError::NotActive)));
    }

    #[test]
    fn test_close_without_session() {
        assert!(matches!(
            close(&mut SlotState::default(), T0),
            Err(AttendanceError::NotActive)
        ));
    }

    #[test]
    fn test_rotate_keeps_session_id() {
        let mut state = SlotState::default();
        let original = open(
            &mut state,
            &mut Effects::default(),
            &request(ReplacePolicy::Replace),
            "SES-A",
            T0,
        )
        .unwrap();

        let rotated = rotate_ticket(&mut state, T0 + 5_000).unwrap();
        assert_eq!(rotated.session_id, original.session_id);
        assert_ne!(rotated.payload, original.payload);
        assert_eq!(Ticket::decode(&rotated.payload).unwrap().ts, T0 + 5_000);

        assert!(matches!(
            rotate_ticket(&mut SlotState::default(), T0),
            Err(AttendanceError::NoSession)
        ));
    }

    #[test]
    fn test_expire_if_stale_is_idempotent() {
        let mut state = SlotState::default();
        open(
            &mut state,
            &mut Effects::default(),
            &request(ReplacePolicy::Replace),
            "SES-A",
            T0,
        )
        .unwrap();

        assert!(expire_if_stale(&mut state, T0 + 3_600_000).unwrap().active);

        let late = T0 + 3_600_001;
        assert!(!expire_if_stale(&mut state, late).unwrap().active);
        let snapshot = state.clone();
        assert!(!expire_if_stale(&mut state, late + 1).unwrap().active);
        assert_eq!(state, snapshot);

        assert!(expire_if_stale(&mut SlotState::default(), late).is_none());
    }

    #[tokio::test]
    async fn test_start_then_status() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store.clone());

        let session = sessions.start(request(ReplacePolicy::Replace)).await.unwrap();
        assert_eq!(session.end_at - session.start_at, 3_600_000);

        let status = sessions.status(&SlotKey::new("C1", "S1")).await.unwrap().unwrap();
        assert!(status.active);
        assert_eq!(status.session_id, session.session_id);
        assert_eq!(store.history("L1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_start_unknown_slot_or_bad_duration() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store);

        let mut unknown = request(ReplacePolicy::Replace);
        unknown.slot = SlotKey::new("C42", "S1");
        assert!(matches!(
            sessions.start(unknown).await,
            Err(AttendanceError::NotFound(_))
        ));

        let mut zero = request(ReplacePolicy::Replace);
        zero.duration_minutes = 0;
        assert!(matches!(
            sessions.start(zero).await,
            Err(AttendanceError::Validation(_))
        ));

        for minutes in [MAX_DURATION_MINUTES + 1, i64::MAX / 1000, i64::MAX] {
            let mut huge = request(ReplacePolicy::Replace);
            huge.duration_minutes = minutes;
            assert!(matches!(
                sessions.start(huge).await,
                Err(AttendanceError::Validation(_))
            ));
        }
        assert!(sessions.status(&SlotKey::new("C1", "S1")).await.unwrap().is_none());

        let mut week = request(ReplacePolicy::Replace);
        week.duration_minutes = MAX_DURATION_MINUTES;
        let session = sessions.start(week).await.unwrap();
        assert_eq!(session.end_at - session.start_at, MAX_DURATION_MINUTES * 60_000);
    }

    #[test]
    fn test_open_rejects_overflowing_duration() {
        let mut state = SlotState::default();
        let mut effects = Effects::default();
        let mut huge = request(ReplacePolicy::Replace);
        huge.duration_minutes = i64::MAX / 1000;

        let result = open(&mut state, &mut effects, &huge, "SES-AAAAAAAA", T0);
        assert!(matches!(result, Err(AttendanceError::Validation(_))));
        assert!(state.session.is_none());
    }

    #[tokio::test]
    async fn test_failed_save_does_not_start_session() {
        let (store, dir) = temp_store().await;
        let sessions = manager(store);
        block_saves(&dir);

        assert!(matches!(
            sessions.start(request(ReplacePolicy::Replace)).await,
            Err(AttendanceError::Store(_))
        ));
        assert!(sessions.status(&SlotKey::new("C1", "S1")).await.unwrap().is_none());
        assert!(sessions.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_after_expiry_is_persisted() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store.clone());
        let slot = SlotKey::new("C1", "S1");

        sessions.start(request(ReplacePolicy::Replace)).await.unwrap();
        store
            .transact::<_, AttendanceError, _>(&slot, |state, _| {
                if let Some(s) = state.session.as_mut() {
                    s.end_at = now_millis() - 1;
                }
                Ok(())
            })
            .await
            .unwrap();

        let first = sessions.status(&slot).await.unwrap().unwrap();
        assert!(!first.active);
        let version = store.slot(&slot).await.version;

        let second = sessions.status(&slot).await.unwrap().unwrap();
        assert!(!second.active);
        assert_eq!(store.slot(&slot).await.version, version);
        assert!(sessions.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_status_reads_expire_once() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store.clone());
        let slot = SlotKey::new("C1", "S1");

        sessions.start(request(ReplacePolicy::Replace)).await.unwrap();
        store
            .transact::<_, AttendanceError, _>(&slot, |state, _| {
                if let Some(s) = state.session.as_mut() {
                    s.end_at = now_millis() - 1;
                }
                Ok(())
            })
            .await
            .unwrap();
        let before = store.slot(&slot).await.version;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sessions = sessions.clone();
            let slot = slot.clone();
            handles.push(tokio::spawn(async move { sessions.status(&slot).await }));
        }
        for handle in handles {
            assert!(!handle.await.unwrap().unwrap().unwrap().active);
        }

        assert_eq!(store.slot(&slot).await.version, before + 1);
    }

    #[tokio::test]
    async fn test_active_lists_live_sessions_with_counts() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store.clone());
        let session = sessions.start(request(ReplacePolicy::Replace)).await.unwrap();

        store
            .transact::<_, AttendanceError, _>(&SlotKey::new("C1", "S1"), |state, _| {
                state.attendance.push(record("stud1", &session.session_id));
                let mut left = record("stud2", &session.session_id);
                left.present = false;
                state.attendance.push(left);
                Ok(())
            })
            .await
            .unwrap();

        let active = sessions.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].present_count, 1);
        assert_eq!(active[0].total, SECTION_CAPACITY);

        sessions.end(&SlotKey::new("C1", "S1")).await.unwrap();
        assert!(sessions.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_active_follows_flag_until_status_expires() {
        let (store, _dir) = temp_store().await;
        let sessions = manager(store.clone());
        let slot = SlotKey::new("C1", "S1");
        sessions.start(request(ReplacePolicy::Replace)).await.unwrap();

        store
            .transact::<_, AttendanceError, _>(&slot, |state, _| {
                if let Some(s) = state.session.as_mut() {
                    s.end_at = now_millis() - 1;
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(sessions.active().await.len(), 1);

        sessions.status(&slot).await.unwrap();
        assert!(sessions.active().await.is_empty());
    }
}
