//! Background expiry sweep (spec.md §4.3 "Expire: internal; triggered when
//! wall clock passes deadline"). Grounded on `knhk-sidecar`'s
//! `KeyRotationManager::start_background_task` spawn-loop-sleep shape.

use std::time::Duration;

use tracing::{debug, error};

use crate::gate::HitlGate;

/// Periodically scans pending tickets and expires any whose deadline has
/// passed, waking the suspended pipeline instance with a synthetic
/// rejection.
pub struct ExpiryReaper {
    gate: HitlGate,
    sweep_interval: Duration,
}

impl ExpiryReaper {
    pub fn new(gate: HitlGate, sweep_interval: Duration) -> Self {
        Self { gate, sweep_interval }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.sweep_interval).await;
                self.sweep_once();
            }
        })
    }

    /// One sweep pass; exposed directly so tests (and a CLI `status` dry-run)
    /// don't have to wait on a real sleep interval.
    pub fn sweep_once(&self) {
        let now = chrono::Utc::now();
        for ticket in self.gate.list_pending() {
            if ticket.is_past_deadline(now) {
                match self.gate.expire(&ticket.ticket_id) {
                    Ok(_) => debug!(ticket_id = %ticket.ticket_id, "reaped expired hitl ticket"),
                    Err(e) => error!(ticket_id = %ticket.ticket_id, error = %e, "failed to expire hitl ticket"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::TicketStatus;

    #[test]
    fn sweep_expires_overdue_tickets_and_leaves_others() {
        let gate = HitlGate::new();
        gate.open_ticket("overdue", "c1", "i1", "r", chrono::Utc::now() - chrono::Duration::seconds(1)).unwrap();
        gate.open_ticket("fresh", "c2", "i2", "r", chrono::Utc::now() + chrono::Duration::days(1)).unwrap();

        let reaper = ExpiryReaper::new(gate.clone(), Duration::from_secs(60));
        reaper.sweep_once();

        assert_eq!(gate.get("overdue").unwrap().status, TicketStatus::Expired);
        assert_eq!(gate.get("fresh").unwrap().status, TicketStatus::Awaiting);
    }
}
