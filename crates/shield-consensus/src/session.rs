//! Voting Session lifecycle: open -> open (submit/get) -> sealed.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use shield_types::{ConsensusSnapshot, Vote};
use tracing::{debug, warn};

use crate::algorithm::{compute_snapshot, HaltConfig};
use crate::{ConsensusError, Result};

/// Per-session state: the vote set keyed by model id, whether the session
/// is sealed, and the last computed snapshot.
pub struct SessionState {
    votes: RwLock<BTreeMap<String, Vote>>,
    sealed: std::sync::atomic::AtomicBool,
    cfg: HaltConfig,
}

impl SessionState {
    fn new(cfg: HaltConfig) -> Self {
        Self {
            votes: RwLock::new(BTreeMap::new()),
            sealed: std::sync::atomic::AtomicBool::new(false),
            cfg,
        }
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// Holds every open/sealed Voting Session. One engine instance is shared
/// across all claims being verified concurrently; sessions are
/// independent, so concurrent submissions to different sessions never
/// contend (spec.md §5).
#[derive(Default, Clone)]
pub struct ConsensusEngine {
    sessions: Arc<DashMap<String, Arc<SessionState>>>,
}

impl ConsensusEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or fetch, if already open) the session for `session_id`
    /// with the given per-domain halt configuration.
    pub fn open_session(&self, session_id: &str, cfg: HaltConfig) -> Arc<SessionState> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionState::new(cfg)))
            .clone()
    }

    /// Submit a vote: validates ranges, upserts by model id (later
    /// arrivals overwrite earlier — spec.md §3 invariants), recomputes the
    /// snapshot, and returns it.
    pub fn submit_vote(&self, session_id: &str, vote: Vote) -> Result<ConsensusSnapshot> {
        vote.validate().map_err(|e| ConsensusError::InvalidInput(e.to_string()))?;

        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ConsensusError::NotFound(session_id.to_string()))?
            .clone();

        if session.is_sealed() {
            return Err(ConsensusError::SessionSealed(session_id.to_string()));
        }

        {
            let mut votes = session.votes.write();
            votes.insert(vote.model_id.0.clone(), vote);
        }

        let snapshot = {
            let votes = session.votes.read();
            compute_snapshot(session_id, &votes, session.cfg)
        };

        debug!(session_id, final_verdict = %snapshot.final_verdict, "vote recorded");
        if snapshot.variance_halt || snapshot.constitutional_halt {
            warn!(session_id, variance_halt = snapshot.variance_halt, constitutional_halt = snapshot.constitutional_halt, "halt triggered");
        }

        Ok(snapshot)
    }

    pub fn get_snapshot(&self, session_id: &str) -> Result<ConsensusSnapshot> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ConsensusError::NotFound(session_id.to_string()))?;
        let votes = session.votes.read();
        Ok(compute_snapshot(session_id, &votes, session.cfg))
    }

    /// Seal the session: no further votes are accepted; `get_snapshot`
    /// still returns the final, frozen result.
    pub fn seal(&self, session_id: &str) -> Result<ConsensusSnapshot> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ConsensusError::NotFound(session_id.to_string()))?;
        session.sealed.store(true, std::sync::atomic::Ordering::Release);
        let votes = session.votes.read();
        Ok(compute_snapshot(session_id, &votes, session.cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::Verdict;

    fn vote(model: &str, verdict: Verdict, confidence: f64) -> Vote {
        Vote {
            model_id: model.into(),
            verdict,
            confidence,
            coherence: confidence,
            reasoning: String::new(),
            weight: 1.0,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn submit_requires_open_session() {
        let engine = ConsensusEngine::new();
        let err = engine.submit_vote("nope", vote("m1", Verdict::Verified, 0.9)).unwrap_err();
        assert_eq!(err, ConsensusError::NotFound("nope".to_string()));
    }

    #[test]
    fn sealed_session_rejects_new_votes() {
        let engine = ConsensusEngine::new();
        engine.open_session("s1", HaltConfig::default());
        engine.submit_vote("s1", vote("m1", Verdict::Verified, 0.9)).unwrap();
        engine.submit_vote("s1", vote("m2", Verdict::Verified, 0.9)).unwrap();
        engine.submit_vote("s1", vote("m3", Verdict::Verified, 0.9)).unwrap();
        engine.seal("s1").unwrap();
        let err = engine.submit_vote("s1", vote("m4", Verdict::Verified, 0.9)).unwrap_err();
        assert_eq!(err, ConsensusError::SessionSealed("s1".to_string()));
    }

    #[test]
    fn get_snapshot_after_seal_returns_final_result() {
        let engine = ConsensusEngine::new();
        engine.open_session("s1", HaltConfig::default());
        engine.submit_vote("s1", vote("m1", Verdict::Verified, 0.9)).unwrap();
        engine.submit_vote("s1", vote("m2", Verdict::Verified, 0.9)).unwrap();
        engine.submit_vote("s1", vote("m3", Verdict::Verified, 0.9)).unwrap();
        let sealed = engine.seal("s1").unwrap();
        let fetched = engine.get_snapshot("s1").unwrap();
        assert_eq!(sealed.final_verdict, fetched.final_verdict);
    }

    #[test]
    fn invalid_vote_is_rejected_without_mutating_session() {
        let engine = ConsensusEngine::new();
        engine.open_session("s1", HaltConfig::default());
        let err = engine.submit_vote("s1", vote("m1", Verdict::Verified, 1.5)).unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidInput(_)));
        let snap = engine.get_snapshot("s1").unwrap();
        assert_eq!(snap.valid_vote_count, 0);
    }
}
