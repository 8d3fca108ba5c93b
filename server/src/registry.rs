//! Registry of in-progress games for the game server
//!
//! This module owns every live game session and is the only place sessions
//! are created, mutated or retired:
//! - Session lifecycle (start, reconcile, removal)
//! - Lazy time accounting, reconciled on every request for a player
//! - Retirement side effects: archival of the transcript and score records
//!
//! The registry is not shared between tasks. The server's owner loop holds it
//! and feeds it one request at a time, so no two mutations for a player ever
//! interleave.

use crate::scoring::{calculate_score, ScoreRecord};
use crate::store::{EndRecord, GameStore, TranscriptHeader, TrialRecord};
use chrono::{DateTime, Duration, Local};
use log::{error, info};
use shared::{Code, EndStatus, GameMode, PlayerId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Server-side state of one player's active game
///
/// Each session tracks:
/// - The secret and the mode it was created in
/// - The time budget and how much of it has been consumed
/// - Trial accounting used to validate and de-duplicate guesses
#[derive(Debug, Clone)]
pub struct Session {
    pub plid: PlayerId,
    pub mode: GameMode,
    pub secret: Code,
    /// Budget requested at start, in seconds
    pub total_budget_secs: u32,
    pub remaining_secs: i64,
    pub elapsed_secs: u32,
    /// Trial number the next fresh guess must carry
    pub current_trial: u32,
    /// Advances with `current_trial`; a retransmission of the previous guess
    /// carries `expected_trial - 1`
    pub expected_trial: u32,
    pub last_guess: Option<Code>,
    /// Wall-clock instant up to which time has been accounted
    pub last_update_time: DateTime<Local>,
    pub start_time: DateTime<Local>,
}

impl Session {
    /// Creates a fresh session with its whole budget remaining
    pub fn new(
        plid: PlayerId,
        budget_secs: u32,
        mode: GameMode,
        secret: Code,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            plid,
            mode,
            secret,
            total_budget_secs: budget_secs,
            remaining_secs: i64::from(budget_secs),
            elapsed_secs: 0,
            current_trial: 1,
            expected_trial: 1,
            last_guess: None,
            last_update_time: now,
            start_time: now,
        }
    }

    /// Charges the whole seconds passed since the last reconciliation
    ///
    /// Only whole seconds are consumed; `last_update_time` advances by
    /// exactly that amount so fractions carry over to the next call.
    pub fn advance_clock(&mut self, now: DateTime<Local>) {
        let delta = (now - self.last_update_time).num_seconds().max(0);
        if delta == 0 {
            return;
        }
        self.last_update_time = self.last_update_time + Duration::seconds(delta);
        self.elapsed_secs = self
            .elapsed_secs
            .saturating_add(u32::try_from(delta).unwrap_or(u32::MAX));
        self.remaining_secs -= delta;
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs <= 0
    }

    pub fn header(&self) -> TranscriptHeader {
        TranscriptHeader {
            plid: self.plid,
            mode: self.mode,
            secret: self.secret.clone(),
            budget_secs: self.total_budget_secs,
            started_at: self.start_time,
        }
    }

    /// End record for a game retired at `now`
    ///
    /// A timed-out game is closed at the moment its budget ran out, not at
    /// the moment the expiry was noticed.
    fn end_record(&self, status: EndStatus, now: DateTime<Local>) -> EndRecord {
        let mut ended_at = now;
        if status == EndStatus::Timeout {
            let deadline = self.start_time + Duration::seconds(i64::from(self.total_budget_secs));
            ended_at = ended_at.min(deadline);
        }
        let duration = (ended_at - self.start_time).num_seconds().max(0);
        EndRecord {
            ended_at,
            duration_secs: u32::try_from(duration).unwrap_or(u32::MAX),
            status,
        }
    }
}

/// Outcome of reconciling a player's clock
#[derive(Debug)]
pub enum Reconcile {
    NoSession,
    /// The budget ran out; the session has already been retired as a
    /// timeout and is handed back for its secret
    Expired(Session),
    Active,
}

/// Result of [`SessionRegistry::create_or_get`]
#[derive(Debug)]
pub enum Admission<'a> {
    Created(&'a Session),
    Existing(&'a Session),
}

/// Owns all active sessions and the store their records go to
///
/// At most one session exists per player id. Removal is the single path that
/// retires a game, and it performs archival and score emission in the same
/// step.
pub struct SessionRegistry<S: GameStore> {
    sessions: HashMap<PlayerId, Session>,
    store: S,
}

impl<S: GameStore> SessionRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            sessions: HashMap::new(),
            store,
        }
    }

    pub fn get(&self, plid: PlayerId) -> Option<&Session> {
        self.sessions.get(&plid)
    }

    pub fn get_mut(&mut self, plid: PlayerId) -> Option<&mut Session> {
        self.sessions.get_mut(&plid)
    }

    /// Returns the player's session, creating it if there is none
    ///
    /// A newly created session gets its live transcript opened. A failure to
    /// do so is logged and the game goes ahead.
    pub fn create_or_get(
        &mut self,
        plid: PlayerId,
        budget_secs: u32,
        mode: GameMode,
        secret: Code,
        now: DateTime<Local>,
    ) -> Admission<'_> {
        match self.sessions.entry(plid) {
            Entry::Occupied(entry) => Admission::Existing(entry.into_mut()),
            Entry::Vacant(entry) => {
                let session = Session::new(plid, budget_secs, mode, secret, now);
                if let Err(e) = self.store.open_transcript(&session.header()) {
                    error!("Failed to open transcript for {}: {}", plid, e);
                }
                info!(
                    "Player {} started a {} game ({}s)",
                    plid,
                    mode.name(),
                    budget_secs
                );
                Admission::Created(entry.insert(session))
            }
        }
    }

    /// Brings the player's clock up to `now`, retiring the game on expiry
    pub fn reconcile_time(&mut self, plid: PlayerId, now: DateTime<Local>) -> Reconcile {
        let expired = match self.sessions.get_mut(&plid) {
            None => return Reconcile::NoSession,
            Some(session) => {
                session.advance_clock(now);
                session.is_expired()
            }
        };

        if !expired {
            return Reconcile::Active;
        }
        match self.remove(plid, EndStatus::Timeout, now) {
            Some(session) => Reconcile::Expired(session),
            None => Reconcile::NoSession,
        }
    }

    /// Appends an accepted trial to the player's live transcript
    pub fn record_trial(&mut self, plid: PlayerId, trial: &TrialRecord) {
        if let Err(e) = self.store.append_trial(plid, trial) {
            error!("Failed to record trial for {}: {}", plid, e);
        }
    }

    /// Retires the player's game
    ///
    /// Removes the session, archives its transcript and, for a win, emits a
    /// score record. Removing an absent player does nothing and returns
    /// `None`. Storage failures are logged; the session is gone either way.
    pub fn remove(
        &mut self,
        plid: PlayerId,
        status: EndStatus,
        now: DateTime<Local>,
    ) -> Option<Session> {
        let mut session = self.sessions.remove(&plid)?;
        if status == EndStatus::Timeout {
            session.elapsed_secs = session.elapsed_secs.min(session.total_budget_secs);
            session.remaining_secs = 0;
        }
        let end = session.end_record(status, now);

        if let Err(e) = self.store.archive(plid, &end) {
            error!("Failed to archive game of {}: {}", plid, e);
        }

        if status == EndStatus::Win {
            let record = ScoreRecord {
                score: calculate_score(
                    session.current_trial,
                    session.elapsed_secs,
                    session.total_budget_secs,
                ),
                plid,
                secret: session.secret.clone(),
                trials: session.current_trial,
                mode: session.mode,
                completed_at: end.ended_at,
            };
            info!("Player {} won with score {}", plid, record.score);
            if let Err(e) = self.store.record_score(&record) {
                error!("Failed to record score for {}: {}", plid, e);
            }
        } else {
            info!("Game of player {} ended: {}", plid, status);
        }

        Some(session)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Returns the number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no game is in progress
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Registry lifecycle, time reconciliation and retirement side effects
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{at, code, plid, trial};
    use crate::store::MemoryStore;

    fn registry() -> SessionRegistry<MemoryStore> {
        SessionRegistry::new(MemoryStore::new())
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(plid("103274"), 120, GameMode::Play, code("RGBY"), at(0));

        assert_eq!(session.remaining_secs, 120);
        assert_eq!(session.elapsed_secs, 0);
        assert_eq!(session.current_trial, 1);
        assert_eq!(session.expected_trial, 1);
        assert!(session.last_guess.is_none());
    }

    #[test]
    fn test_create_or_get_is_unique_per_player() {
        let mut registry = registry();
        let id = plid("103274");

        assert!(matches!(
            registry.create_or_get(id, 120, GameMode::Play, code("RGBY"), at(0)),
            Admission::Created(_)
        ));
        match registry.create_or_get(id, 60, GameMode::Debug, code("OOOO"), at(1)) {
            Admission::Existing(session) => {
                assert_eq!(session.secret, code("RGBY"));
                assert_eq!(session.total_budget_secs, 120);
            }
            Admission::Created(_) => panic!("second session created"),
        }
        assert_eq!(registry.len(), 1);
        assert!(registry.store().live_transcript(id).unwrap().is_some());
    }

    #[test]
    fn test_reconcile_accumulates_whole_seconds() {
        let mut registry = registry();
        let id = plid("103274");
        registry.create_or_get(id, 120, GameMode::Play, code("RGBY"), at(0));

        let start = registry.get(id).unwrap().start_time;
        // Two reconciliations 700ms apart must still add up to a second.
        let first = start + Duration::milliseconds(700);
        let second = start + Duration::milliseconds(1400);
        assert!(matches!(registry.reconcile_time(id, first), Reconcile::Active));
        assert!(matches!(registry.reconcile_time(id, second), Reconcile::Active));

        let session = registry.get(id).unwrap();
        assert_eq!(session.elapsed_secs, 1);
        assert_eq!(session.remaining_secs, 119);
    }

    #[test]
    fn test_reconcile_unknown_player() {
        let mut registry = registry();
        assert!(matches!(
            registry.reconcile_time(plid("103274"), at(0)),
            Reconcile::NoSession
        ));
    }

    #[test]
    fn test_reconcile_expires_and_archives() {
        let mut registry = registry();
        let id = plid("103274");
        registry.create_or_get(id, 30, GameMode::Play, code("RGBY"), at(0));

        match registry.reconcile_time(id, at(45)) {
            Reconcile::Expired(session) => {
                assert_eq!(session.secret, code("RGBY"));
                assert_eq!(session.elapsed_secs, 30);
            }
            other => panic!("expected expiry, got {:?}", other),
        }
        assert!(registry.is_empty());

        let archived = registry.store().latest_archive(id).unwrap().unwrap();
        let end = archived.end.unwrap();
        assert_eq!(end.status, EndStatus::Timeout);
        assert_eq!(end.duration_secs, 30);
        assert_eq!(end.ended_at, at(30));
        assert_eq!(registry.store().score_count(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = registry();
        let id = plid("103274");
        registry.create_or_get(id, 120, GameMode::Play, code("RGBY"), at(0));

        assert!(registry.remove(id, EndStatus::Quit, at(5)).is_some());
        assert!(registry.remove(id, EndStatus::Quit, at(6)).is_none());
        assert_eq!(registry.store().archive_count(id), 1);
    }

    #[test]
    fn test_win_emits_one_score() {
        let mut registry = registry();
        let id = plid("103274");
        registry.create_or_get(id, 100, GameMode::Debug, code("RGBY"), at(0));
        registry.reconcile_time(id, at(20));
        registry.record_trial(id, &trial("RGBY", 4, 0, 20));

        registry.remove(id, EndStatus::Win, at(20));

        let scores = registry.store().load_scores().unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 90);
        assert_eq!(scores[0].trials, 1);
        assert_eq!(scores[0].mode, GameMode::Debug);
        assert_eq!(scores[0].completed_at, at(20));
    }

    #[test]
    fn test_storage_failure_still_retires_session() {
        let mut registry = registry();
        let id = plid("103274");
        registry.create_or_get(id, 120, GameMode::Play, code("RGBY"), at(0));
        registry.store_mut().refuse_writes(true);

        assert!(registry.remove(id, EndStatus::Win, at(3)).is_some());
        assert!(registry.get(id).is_none());
        assert_eq!(registry.store().score_count(), 0);
    }
}
