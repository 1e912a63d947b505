//! HITL Ticket: the suspension record a Pipeline Instance parks on while
//! awaiting a human decision (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Awaiting,
    Approved,
    Rejected,
    Expired,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TicketStatus::Awaiting)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitlTicket {
    pub ticket_id: String,
    pub claim_id: String,
    pub instance_id: String,
    pub risk_summary: String,
    pub status: TicketStatus,
    pub reviewer_id: Option<String>,
    pub reason: Option<String>,
    pub auto_approved: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub deadline: chrono::DateTime<chrono::Utc>,
}

impl HitlTicket {
    pub fn new(
        ticket_id: impl Into<String>,
        claim_id: impl Into<String>,
        instance_id: impl Into<String>,
        risk_summary: impl Into<String>,
        deadline: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            claim_id: claim_id.into(),
            instance_id: instance_id.into(),
            risk_summary: risk_summary.into(),
            status: TicketStatus::Awaiting,
            reviewer_id: None,
            reason: None,
            auto_approved: false,
            created_at: chrono::Utc::now(),
            deadline,
        }
    }

    pub fn is_past_deadline(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.deadline
    }
}
