use std::sync::Arc;

use dashmap::DashMap;
use shield_types::{Decision, HitlTicket, TicketStatus};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HitlError {
    #[error("ticket {0} not found")]
    NotFound(String),

    #[error("ticket {0} is already resolved")]
    AlreadyResolved(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for HitlError {
    fn from(e: sled::Error) -> Self {
        HitlError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for HitlError {
    fn from(e: serde_json::Error) -> Self {
        HitlError::Storage(e.to_string())
    }
}

struct TicketEntry {
    ticket: std::sync::RwLock<HitlTicket>,
    notify: Notify,
}

fn ticket_key(ticket_id: &str) -> Vec<u8> {
    format!("ticket/{ticket_id}").into_bytes()
}

/// Holds every open and resolved ticket for the lifetime of the process.
/// Tickets never move between gates; one `HitlGate` is shared across all
/// pipeline instances, the same way `ConsensusEngine` shares one session
/// map across claims.
///
/// Backed by an optional `sled` store (spec.md §4.3's crash-recovery
/// requirement): `open`/`open_temporary` persist every ticket write-through
/// and repopulate `tickets` from disk at startup. `new`/`default` stay
/// in-memory only, for tests that don't care about surviving a restart.
#[derive(Clone, Default)]
pub struct HitlGate {
    tickets: Arc<DashMap<String, Arc<TicketEntry>>>,
    store: Option<Arc<sled::Db>>,
}

impl HitlGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, HitlError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn open_temporary() -> Result<Self, HitlError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, HitlError> {
        let gate = Self {
            tickets: Arc::new(DashMap::new()),
            store: Some(Arc::new(db)),
        };
        for kv in gate.store.as_ref().unwrap().scan_prefix(b"ticket/") {
            let (_, value) = kv?;
            let ticket: HitlTicket = serde_json::from_slice(&value)?;
            gate.tickets.insert(
                ticket.ticket_id.clone(),
                Arc::new(TicketEntry {
                    ticket: std::sync::RwLock::new(ticket),
                    notify: Notify::new(),
                }),
            );
        }
        Ok(gate)
    }

    fn persist(&self, ticket: &HitlTicket) -> Result<(), HitlError> {
        if let Some(db) = &self.store {
            let bytes = serde_json::to_vec(ticket)?;
            db.insert(ticket_key(&ticket.ticket_id), bytes)?;
            db.flush()?;
        }
        Ok(())
    }

    /// Open a ticket and index it as pending. Callers that decide a claim
    /// doesn't need review should not call this at all — see
    /// `synthetic_auto_approval` in the pipeline crate for the bypass path.
    pub fn open_ticket(
        &self,
        ticket_id: impl Into<String>,
        claim_id: impl Into<String>,
        instance_id: impl Into<String>,
        risk_summary: impl Into<String>,
        deadline: chrono::DateTime<chrono::Utc>,
    ) -> Result<HitlTicket, HitlError> {
        let ticket = HitlTicket::new(ticket_id, claim_id, instance_id, risk_summary, deadline);
        self.persist(&ticket)?;
        self.tickets.insert(
            ticket.ticket_id.clone(),
            Arc::new(TicketEntry {
                ticket: std::sync::RwLock::new(ticket.clone()),
                notify: Notify::new(),
            }),
        );
        info!(ticket_id = %ticket.ticket_id, claim_id = %ticket.claim_id, "hitl ticket opened");
        Ok(ticket)
    }

    pub fn get(&self, ticket_id: &str) -> Result<HitlTicket, HitlError> {
        let entry = self.tickets.get(ticket_id).ok_or_else(|| HitlError::NotFound(ticket_id.to_string()))?;
        let ticket = entry.ticket.read().unwrap().clone();
        Ok(ticket)
    }

    pub fn list_pending(&self) -> Vec<HitlTicket> {
        self.tickets
            .iter()
            .filter_map(|e| {
                let t = e.value().ticket.read().unwrap();
                (!t.status.is_terminal()).then(|| t.clone())
            })
            .collect()
    }

    /// Atomically transition a ticket from `awaiting` to the decision,
    /// then wake anyone suspended in `await_resolution`. Exactly-once:
    /// resolving an already-resolved ticket fails with `AlreadyResolved`.
    pub fn resolve(
        &self,
        ticket_id: &str,
        decision: Decision,
        reviewer_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<HitlTicket, HitlError> {
        let entry = self.tickets.get(ticket_id).ok_or_else(|| HitlError::NotFound(ticket_id.to_string()))?.clone();
        let resolved = {
            let mut t = entry.ticket.write().unwrap();
            if t.status.is_terminal() {
                return Err(HitlError::AlreadyResolved(ticket_id.to_string()));
            }
            t.status = match decision {
                Decision::Approved => TicketStatus::Approved,
                Decision::Rejected => TicketStatus::Rejected,
            };
            t.reviewer_id = Some(reviewer_id.into());
            t.reason = Some(reason.into());
            t.clone()
        };
        self.persist(&resolved)?;
        entry.notify.notify_waiters();
        info!(ticket_id, status = ?resolved.status, "hitl ticket resolved");
        Ok(resolved)
    }

    /// Internal: transitions an overdue awaiting ticket to `expired` and
    /// wakes the suspended instance with a synthetic rejection (spec.md
    /// §4.3, §7 "HITL expiry: treated as rejection by synthetic decision").
    pub fn expire(&self, ticket_id: &str) -> Result<HitlTicket, HitlError> {
        let entry = self.tickets.get(ticket_id).ok_or_else(|| HitlError::NotFound(ticket_id.to_string()))?.clone();
        let expired = {
            let mut t = entry.ticket.write().unwrap();
            if t.status.is_terminal() {
                return Err(HitlError::AlreadyResolved(ticket_id.to_string()));
            }
            t.status = TicketStatus::Expired;
            t.reviewer_id = Some("system".to_string());
            t.reason = Some("deadline exceeded".to_string());
            t.clone()
        };
        self.persist(&expired)?;
        entry.notify.notify_waiters();
        warn!(ticket_id, "hitl ticket expired");
        Ok(expired)
    }

    /// Suspend until `ticket_id` reaches a terminal status. Holds no
    /// pipeline resources while waiting — only this async task's stack.
    /// Safe to call again after a crash: it re-reads the ticket's current
    /// status first rather than assuming it starts `awaiting`.
    pub async fn await_resolution(&self, ticket_id: &str) -> Result<HitlTicket, HitlError> {
        let entry = self.tickets.get(ticket_id).ok_or_else(|| HitlError::NotFound(ticket_id.to_string()))?.clone();
        loop {
            if let Some(t) = Self::terminal_snapshot(&entry) {
                return Ok(t);
            }
            let notified = entry.notify.notified();
            if let Some(t) = Self::terminal_snapshot(&entry) {
                return Ok(t);
            }
            notified.await;
        }
    }

    fn terminal_snapshot(entry: &TicketEntry) -> Option<HitlTicket> {
        let t = entry.ticket.read().unwrap();
        t.status.is_terminal().then(|| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadline() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + chrono::Duration::days(7)
    }

    #[test]
    fn opening_indexes_as_pending() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        assert_eq!(gate.list_pending().len(), 1);
    }

    #[test]
    fn resolve_transitions_status_and_records_reviewer() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        let resolved = gate.resolve("t1", Decision::Approved, "reviewer-1", "evidence reviewed").unwrap();
        assert_eq!(resolved.status, TicketStatus::Approved);
        assert_eq!(resolved.reviewer_id.as_deref(), Some("reviewer-1"));
        assert!(gate.list_pending().is_empty());
    }

    #[test]
    fn resolving_twice_fails_with_already_resolved() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        gate.resolve("t1", Decision::Approved, "reviewer-1", "ok").unwrap();
        let err = gate.resolve("t1", Decision::Rejected, "reviewer-2", "ok").unwrap_err();
        assert_eq!(err, HitlError::AlreadyResolved("t1".to_string()));
    }

    #[test]
    fn resolving_unknown_ticket_fails_with_not_found() {
        let gate = HitlGate::new();
        let err = gate.resolve("nope", Decision::Approved, "r", "ok").unwrap_err();
        assert_eq!(err, HitlError::NotFound("nope".to_string()));
    }

    #[test]
    fn expire_produces_a_synthetic_rejection_decision() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        let expired = gate.expire("t1").unwrap();
        assert_eq!(expired.status, TicketStatus::Expired);
        assert_eq!(expired.reviewer_id.as_deref(), Some("system"));
    }

    #[test]
    fn expiring_an_already_resolved_ticket_fails() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        gate.resolve("t1", Decision::Approved, "reviewer-1", "ok").unwrap();
        let err = gate.expire("t1").unwrap_err();
        assert_eq!(err, HitlError::AlreadyResolved("t1".to_string()));
    }

    #[tokio::test]
    async fn await_resolution_wakes_on_resolve() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        let waiter_gate = gate.clone();
        let waiter = tokio::spawn(async move { waiter_gate.await_resolution("t1").await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        gate.resolve("t1", Decision::Approved, "reviewer-1", "ok").unwrap();
        let resolved = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("should resolve promptly")
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, TicketStatus::Approved);
    }

    #[tokio::test]
    async fn await_resolution_returns_immediately_if_already_terminal() {
        let gate = HitlGate::new();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        gate.resolve("t1", Decision::Rejected, "reviewer-1", "ok").unwrap();
        let resolved = gate.await_resolution("t1").await.unwrap();
        assert_eq!(resolved.status, TicketStatus::Rejected);
    }

    #[test]
    fn a_ticket_opened_before_restart_is_still_pending_after_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let gate = HitlGate::open(dir.path()).unwrap();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        drop(gate);

        let reopened = HitlGate::open(dir.path()).unwrap();
        assert_eq!(reopened.list_pending().len(), 1);
        assert_eq!(reopened.get("t1").unwrap().status, TicketStatus::Awaiting);
    }

    #[test]
    fn a_resolution_survives_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let gate = HitlGate::open(dir.path()).unwrap();
        gate.open_ticket("t1", "c1", "i1", "high risk", deadline()).unwrap();
        gate.resolve("t1", Decision::Approved, "reviewer-1", "ok").unwrap();
        drop(gate);

        let reopened = HitlGate::open(dir.path()).unwrap();
        assert_eq!(reopened.get("t1").unwrap().status, TicketStatus::Approved);
    }
}
