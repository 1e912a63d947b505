//! Append-only audit ledger (spec.md §3, §4.5, §7).

use shield_types::AuditEvent;
use sled::Db;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sequential, append-only log of `AuditEvent`s keyed by claim id.
///
/// `record` enforces the durability split from spec.md §4.5/§7:
/// `stage-complete` and `proof-signed` events must be flushed to disk
/// before the call returns success; every other kind is best-effort — a
/// write failure is logged as a warning and swallowed so it never blocks
/// the pipeline.
pub struct AuditLedger {
    db: Db,
}

fn event_key(claim_id: &str, seq: u64) -> Vec<u8> {
    format!("evt/{claim_id}/{seq:020}").into_bytes()
}

impl AuditLedger {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LedgerError> {
        Ok(Self { db: sled::open(path)? })
    }

    pub fn open_temporary() -> Result<Self, LedgerError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    fn append(&self, event: &AuditEvent) -> Result<(), LedgerError> {
        let seq = self.db.generate_id()?;
        let bytes = serde_json::to_vec(event)?;
        self.db.insert(event_key(&event.claim_id, seq), bytes)?;
        Ok(())
    }

    /// Record an event, honoring its durability requirement.
    pub fn record(&self, event: AuditEvent) -> Result<(), LedgerError> {
        let durable = event.kind.requires_durability();
        match self.append(&event) {
            Ok(()) => {
                if durable {
                    self.db.flush()?;
                }
                Ok(())
            }
            Err(e) if durable => Err(e),
            Err(e) => {
                warn!(claim_id = %event.claim_id, kind = ?event.kind, error = %e, "audit ledger write failed, proceeding (best-effort)");
                Ok(())
            }
        }
    }

    pub fn for_claim(&self, claim_id: &str) -> Result<Vec<AuditEvent>, LedgerError> {
        let prefix = format!("evt/{claim_id}/");
        let mut out = Vec::new();
        for kv in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = kv?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::AuditEventKind;

    fn event(claim_id: &str, kind: AuditEventKind) -> AuditEvent {
        AuditEvent::new(claim_id, kind, serde_json::json!({}))
    }

    #[test]
    fn events_are_recorded_and_readable_in_order() {
        let ledger = AuditLedger::open_temporary().unwrap();
        ledger.record(event("c1", AuditEventKind::Submit)).unwrap();
        ledger.record(event("c1", AuditEventKind::StageStart)).unwrap();
        ledger.record(event("c1", AuditEventKind::StageComplete)).unwrap();
        let events = ledger.for_claim("c1").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, AuditEventKind::Submit);
        assert_eq!(events[2].kind, AuditEventKind::StageComplete);
    }

    #[test]
    fn claims_are_isolated() {
        let ledger = AuditLedger::open_temporary().unwrap();
        ledger.record(event("c1", AuditEventKind::Submit)).unwrap();
        ledger.record(event("c2", AuditEventKind::Submit)).unwrap();
        assert_eq!(ledger.for_claim("c1").unwrap().len(), 1);
        assert_eq!(ledger.for_claim("c2").unwrap().len(), 1);
    }

    #[test]
    fn durable_kinds_are_flushed_before_returning() {
        let ledger = AuditLedger::open_temporary().unwrap();
        ledger.record(event("c1", AuditEventKind::ProofSigned)).unwrap();
        // A flushed sled write survives being read back through a fresh handle
        // on the same backing store.
        assert_eq!(ledger.for_claim("c1").unwrap().len(), 1);
    }

    #[test]
    fn unknown_claim_returns_empty() {
        let ledger = AuditLedger::open_temporary().unwrap();
        assert!(ledger.for_claim("nope").unwrap().is_empty());
    }
}
