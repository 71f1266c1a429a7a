//! Daily-quota state machine.
//!
//! Each user gets a fixed number of queries per UTC calendar day. A user is
//! on a fresh day when the stored `last_query_date` is absent or differs
//! from today; checking on a fresh day persists the rollover reset. Spending
//! goes through a single conditional update on the store, so two concurrent
//! requests can never both take the last query of the day.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::store::{StoreError, UserStore};

pub struct QuotaManager {
    store: Arc<UserStore>,
    daily_limit: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Daily query limit reached")]
    Exceeded,
    #[error("No user record for subject: {0}")]
    UnknownSubject(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QuotaManager {
    pub fn new(store: Arc<UserStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    /// Peek at today's remaining allowance without spending any of it.
    ///
    /// On a fresh day the rollover reset is persisted and the full limit is
    /// returned. Fails with [`QuotaError::Exceeded`] once today's allowance
    /// is gone; callers that only report usage map that to 0 remaining.
    pub fn check_and_get_remaining(&self, subject_id: &str) -> Result<u32, QuotaError> {
        let today = Self::today();
        let user = self
            .store
            .get(subject_id)?
            .ok_or_else(|| QuotaError::UnknownSubject(subject_id.to_string()))?;

        let fresh_day = user.last_query_date != Some(today);
        if fresh_day {
            self.store.reset_usage_if_stale(subject_id, today)?;
            return Ok(self.daily_limit);
        }

        let used = user.used_on(today);
        if used >= self.daily_limit {
            return Err(QuotaError::Exceeded);
        }
        Ok(self.daily_limit - used)
    }

    /// Spend one query, returning the allowance left afterwards.
    ///
    /// Check and increment happen in one atomic conditional update
    /// (rollover-or-increment-if-under-limit), so the stored counter never
    /// exceeds the limit even under concurrent same-user requests.
    pub fn consume(&self, subject_id: &str) -> Result<u32, QuotaError> {
        let today = Self::today();

        match self.store.try_consume(subject_id, today, self.daily_limit)? {
            Some(new_count) => Ok(self.daily_limit.saturating_sub(new_count)),
            None => Err(QuotaError::Exceeded),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}
