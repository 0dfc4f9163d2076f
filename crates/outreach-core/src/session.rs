use crate::error::{OutreachError, Result};
use crate::phone::CanonicalAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Started,
    Probe1Sent,
    Probe1Verified,
    Probe2Sent,
    Complete,
    Failed,
    Expired,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Started => "started",
            SessionState::Probe1Sent => "probe1_sent",
            SessionState::Probe1Verified => "probe1_verified",
            SessionState::Probe2Sent => "probe2_sent",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
            SessionState::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Failed | SessionState::Expired
        )
    }

    /// The probe pipeline only ever moves forward; any non-terminal state
    /// may fail.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Started, Probe1Sent) => true,
            (Probe1Sent, Probe1Verified) => true,
            (Probe1Verified, Probe2Sent) => true,
            (Probe2Sent, Complete) => true,
            (from, Failed) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OutreachSession
// ---------------------------------------------------------------------------

/// Per-address state tracking probe and sequence progress for one outreach
/// attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachSession {
    pub address: CanonicalAddress,
    pub business_name: String,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    pub probe1_delivered: bool,
    pub probe2_delivered: bool,
    /// The idempotence guard: flips false→true exactly once, via
    /// [`SessionStore::claim_sequence_send`].
    pub sequence_sent: bool,
    pub message_ids: Vec<String>,
}

impl OutreachSession {
    fn new(address: CanonicalAddress, business_name: String, now: DateTime<Utc>) -> Self {
        Self {
            address,
            business_name,
            started_at: now,
            state: SessionState::Started,
            probe1_delivered: false,
            probe2_delivered: false,
            sequence_sent: false,
            message_ids: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// One live `OutreachSession` per canonical address, behind a single lock.
///
/// Safe for concurrent access from the acknowledgment handler and the
/// driver loop; every check-and-set below happens under one lock
/// acquisition, so no two paths can both observe "complete and unclaimed".
pub struct SessionStore {
    inner: Mutex<HashMap<CanonicalAddress, OutreachSession>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn locked(&self) -> MutexGuard<'_, HashMap<CanonicalAddress, OutreachSession>> {
        self.inner.lock().unwrap()
    }

    /// Create a fresh session for `address`.
    ///
    /// Errors with `SessionExists` while a live session is present; a
    /// session the sweeper would consider expired is replaced in place.
    pub fn create(
        &self,
        address: &CanonicalAddress,
        business_name: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        let mut map = self.locked();
        if let Some(existing) = map.get(address) {
            let age = now.signed_duration_since(existing.started_at);
            if age.num_milliseconds() < ttl.as_millis() as i64 {
                return Err(OutreachError::SessionExists(address.to_string()));
            }
            warn!(%address, state = %existing.state, "replacing expired session");
        }
        debug!(%address, business = business_name, "session created");
        map.insert(
            address.clone(),
            OutreachSession::new(address.clone(), business_name.to_string(), now),
        );
        Ok(())
    }

    pub fn get(&self, address: &CanonicalAddress) -> Option<OutreachSession> {
        self.locked().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    /// Advance the session state, validating the move.
    pub fn transition(&self, address: &CanonicalAddress, next: SessionState) -> Result<()> {
        let mut map = self.locked();
        let session = map
            .get_mut(address)
            .ok_or_else(|| OutreachError::SessionNotFound(address.to_string()))?;
        if !session.state.can_transition_to(next) {
            return Err(OutreachError::InvalidSessionTransition {
                from: session.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(%address, from = %session.state, to = %next, "session transition");
        session.state = next;
        Ok(())
    }

    /// Mark the session failed (allowed from any non-terminal state).
    pub fn fail(&self, address: &CanonicalAddress) {
        let mut map = self.locked();
        if let Some(session) = map.get_mut(address) {
            if !session.state.is_terminal() {
                session.state = SessionState::Failed;
            }
        }
    }

    pub fn mark_probe1_delivered(&self, address: &CanonicalAddress) -> Result<()> {
        self.with_session(address, |s| s.probe1_delivered = true)
    }

    pub fn mark_probe2_delivered(&self, address: &CanonicalAddress) -> Result<()> {
        self.with_session(address, |s| s.probe2_delivered = true)
    }

    pub fn push_message_id(&self, address: &CanonicalAddress, message_id: &str) -> Result<()> {
        self.with_session(address, |s| s.message_ids.push(message_id.to_string()))
    }

    /// Atomically claim the right to send the full sequence.
    ///
    /// Returns `true` exactly once per session lifetime: when the session is
    /// `Complete` and `sequence_sent` is still false. The check and the set
    /// share one lock acquisition.
    pub fn claim_sequence_send(&self, address: &CanonicalAddress) -> bool {
        let mut map = self.locked();
        match map.get_mut(address) {
            Some(s) if s.state == SessionState::Complete && !s.sequence_sent => {
                s.sequence_sent = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the session could still claim a sequence send. After a claim
    /// this is false forever, regardless of the probe flags.
    pub fn eligible_for_sequence(&self, address: &CanonicalAddress) -> bool {
        self.locked()
            .get(address)
            .map(|s| s.state == SessionState::Complete && !s.sequence_sent)
            .unwrap_or(false)
    }

    /// Destroy the session, returning its final record.
    pub fn remove(&self, address: &CanonicalAddress) -> Option<OutreachSession> {
        self.locked().remove(address)
    }

    /// Drop sessions older than `ttl`. Orphans are logged and discarded,
    /// never retried. Returns the number swept.
    pub fn sweep(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let mut map = self.locked();
        let ttl_ms = ttl.as_millis() as i64;
        let before = map.len();
        map.retain(|address, session| {
            let age = now.signed_duration_since(session.started_at);
            if age.num_milliseconds() >= ttl_ms {
                session.state = SessionState::Expired;
                warn!(
                    %address,
                    age_ms = age.num_milliseconds(),
                    probe1 = session.probe1_delivered,
                    probe2 = session.probe2_delivered,
                    "sweeping stale session"
                );
                false
            } else {
                true
            }
        });
        before - map.len()
    }

    fn with_session<F: FnOnce(&mut OutreachSession)>(
        &self,
        address: &CanonicalAddress,
        f: F,
    ) -> Result<()> {
        let mut map = self.locked();
        let session = map
            .get_mut(address)
            .ok_or_else(|| OutreachError::SessionNotFound(address.to_string()))?;
        f(session);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(3600);

    fn addr(s: &str) -> CanonicalAddress {
        CanonicalAddress::from_raw(s)
    }

    fn complete_session(store: &SessionStore, a: &CanonicalAddress) {
        store.create(a, "Cafe Rivadavia", Utc::now(), TTL).unwrap();
        store.transition(a, SessionState::Probe1Sent).unwrap();
        store.mark_probe1_delivered(a).unwrap();
        store.transition(a, SessionState::Probe1Verified).unwrap();
        store.transition(a, SessionState::Probe2Sent).unwrap();
        store.mark_probe2_delivered(a).unwrap();
        store.transition(a, SessionState::Complete).unwrap();
    }

    #[test]
    fn one_session_per_address() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        store.create(&a, "Cafe", Utc::now(), TTL).unwrap();
        let err = store.create(&a, "Cafe", Utc::now(), TTL).unwrap_err();
        assert!(matches!(err, OutreachError::SessionExists(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_session_is_replaced_on_create() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        let long_ago = Utc::now() - chrono::Duration::hours(5);
        store.create(&a, "Old", long_ago, TTL).unwrap();
        store.create(&a, "New", Utc::now(), TTL).unwrap();
        assert_eq!(store.get(&a).unwrap().business_name, "New");
    }

    #[test]
    fn transitions_follow_probe_pipeline() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        complete_session(&store, &a);

        let s = store.get(&a).unwrap();
        assert_eq!(s.state, SessionState::Complete);
        assert!(s.probe1_delivered);
        assert!(s.probe2_delivered);
    }

    #[test]
    fn skipping_a_probe_state_is_rejected() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        store.create(&a, "Cafe", Utc::now(), TTL).unwrap();
        let err = store.transition(&a, SessionState::Complete).unwrap_err();
        assert!(matches!(
            err,
            OutreachError::InvalidSessionTransition { .. }
        ));
    }

    #[test]
    fn fail_allowed_from_any_live_state() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        store.create(&a, "Cafe", Utc::now(), TTL).unwrap();
        store.transition(&a, SessionState::Probe1Sent).unwrap();
        store.fail(&a);
        assert_eq!(store.get(&a).unwrap().state, SessionState::Failed);
    }

    #[test]
    fn fail_does_not_reopen_complete() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        complete_session(&store, &a);
        store.fail(&a);
        assert_eq!(store.get(&a).unwrap().state, SessionState::Complete);
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        complete_session(&store, &a);

        assert!(store.eligible_for_sequence(&a));
        assert!(store.claim_sequence_send(&a));
        // Probe flags are still true, yet eligibility is gone for good.
        assert!(!store.claim_sequence_send(&a));
        assert!(!store.eligible_for_sequence(&a));
        let s = store.get(&a).unwrap();
        assert!(s.probe1_delivered && s.probe2_delivered);
        assert!(s.sequence_sent);
    }

    #[test]
    fn claim_rejected_before_complete() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        store.create(&a, "Cafe", Utc::now(), TTL).unwrap();
        store.transition(&a, SessionState::Probe1Sent).unwrap();
        assert!(!store.claim_sequence_send(&a));
    }

    #[test]
    fn concurrent_claims_grant_one_winner() {
        let store = Arc::new(SessionStore::new());
        let a = addr("5491143219876");
        complete_session(&store, &a);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let a = a.clone();
            handles.push(std::thread::spawn(move || store.claim_sequence_send(&a)));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn sweep_drops_only_stale_sessions() {
        let store = SessionStore::new();
        let now = Utc::now();
        let stale = addr("5491111111111");
        let fresh = addr("5492222222222");
        store
            .create(&stale, "Old", now - chrono::Duration::hours(2), TTL)
            .unwrap();
        store.create(&fresh, "New", now, TTL).unwrap();

        let swept = store.sweep(TTL, now);
        assert_eq!(swept, 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn message_ids_accumulate_in_order() {
        let store = SessionStore::new();
        let a = addr("5491143219876");
        store.create(&a, "Cafe", Utc::now(), TTL).unwrap();
        store.push_message_id(&a, "m1").unwrap();
        store.push_message_id(&a, "m2").unwrap();
        assert_eq!(store.get(&a).unwrap().message_ids, vec!["m1", "m2"]);
    }

    #[test]
    fn operations_on_missing_session_error() {
        let store = SessionStore::new();
        let a = addr("5490000000000");
        assert!(matches!(
            store.transition(&a, SessionState::Probe1Sent),
            Err(OutreachError::SessionNotFound(_))
        ));
        assert!(!store.claim_sequence_send(&a));
        assert!(store.remove(&a).is_none());
    }
}
