//! Per-account tier and daily-quota enforcement.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shield_types::Priority;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    Free,
    Pro,
    Enterprise,
}

impl AccountTier {
    pub fn daily_request_limit(self) -> u32 {
        match self {
            AccountTier::Free => 100,
            AccountTier::Pro => 5_000,
            AccountTier::Enterprise => 100_000,
        }
    }

    /// Highest claim priority this tier may submit without a 403.
    pub fn max_priority(self) -> Priority {
        match self {
            AccountTier::Free => Priority::Normal,
            AccountTier::Pro | AccountTier::Enterprise => Priority::High,
        }
    }

    /// Per-request overage price once the daily limit is hit. `None` means
    /// the tier has no payable overage path — it's hard-capped (spec.md §6:
    /// 403 quota-exceeded vs. 402 payment-required).
    pub fn overage_price_usd(self) -> Option<f64> {
        match self {
            AccountTier::Free => None,
            AccountTier::Pro => Some(0.05),
            AccountTier::Enterprise => Some(0.02),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeteringError {
    #[error("account {0} not found")]
    UnknownAccount(String),

    #[error("account {account_id} exceeded its daily limit of {limit_per_day} requests")]
    QuotaExceeded { account_id: String, limit_per_day: u32 },

    #[error("account {account_id} requires payment to continue: ${price_usd} {currency}")]
    PaymentRequired {
        account_id: String,
        price_usd: f64,
        currency: String,
    },

    #[error("account {account_id} (tier {tier:?}) is not permitted to submit priority={requested:?} claims")]
    PriorityNotAllowed {
        account_id: String,
        tier: AccountTier,
        requested: Priority,
    },
}

struct AccountState {
    tier: AccountTier,
    window_start: DateTime<Utc>,
    requests_today: u32,
}

/// Tracks every registered account's tier and rolling daily request count.
#[derive(Clone, Default)]
pub struct AccountRegistry {
    accounts: Arc<DashMap<String, std::sync::RwLock<AccountState>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, account_id: impl Into<String>, tier: AccountTier) {
        self.accounts.insert(
            account_id.into(),
            std::sync::RwLock::new(AccountState {
                tier,
                window_start: Utc::now(),
                requests_today: 0,
            }),
        );
    }

    /// Enforce the daily quota and priority ceiling for one request,
    /// recording it on success.
    pub fn check_and_record(&self, account_id: &str, priority: Priority) -> Result<(), MeteringError> {
        let entry = self
            .accounts
            .get(account_id)
            .ok_or_else(|| MeteringError::UnknownAccount(account_id.to_string()))?;
        let mut state = entry.write().unwrap();

        if Utc::now() - state.window_start >= Duration::days(1) {
            state.window_start = Utc::now();
            state.requests_today = 0;
        }

        if priority == Priority::High && state.tier.max_priority() == Priority::Normal {
            return Err(MeteringError::PriorityNotAllowed {
                account_id: account_id.to_string(),
                tier: state.tier,
                requested: priority,
            });
        }

        if state.requests_today >= state.tier.daily_request_limit() {
            return Err(match state.tier.overage_price_usd() {
                Some(price_usd) => MeteringError::PaymentRequired {
                    account_id: account_id.to_string(),
                    price_usd,
                    currency: "USD".to_string(),
                },
                None => MeteringError::QuotaExceeded {
                    account_id: account_id.to_string(),
                    limit_per_day: state.tier.daily_request_limit(),
                },
            });
        }

        state.requests_today += 1;
        Ok(())
    }

    pub fn remaining_quota(&self, account_id: &str) -> Result<u32, MeteringError> {
        let entry = self
            .accounts
            .get(account_id)
            .ok_or_else(|| MeteringError::UnknownAccount(account_id.to_string()))?;
        let state = entry.read().unwrap();
        Ok(state.tier.daily_request_limit().saturating_sub(state.requests_today))
    }

    pub fn tier_of(&self, account_id: &str) -> Result<AccountTier, MeteringError> {
        let entry = self
            .accounts
            .get(account_id)
            .ok_or_else(|| MeteringError::UnknownAccount(account_id.to_string()))?;
        let tier = entry.read().unwrap().tier;
        Ok(tier)
    }
}
