use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// User record created on first successful Google authentication.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Stable subject identifier from Google (sub claim)
    pub subject_id: String,
    /// Email from the verified ID token
    pub email: Option<String>,
    /// Display name from the verified ID token
    pub display_name: Option<String>,
    /// Queries spent against today's allowance
    pub queries_used_today: u32,
    /// UTC date of the last quota-affecting event; None means never queried
    pub last_query_date: Option<NaiveDate>,
    /// When the user first authenticated
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Usage that counts against today's limit. A stale `last_query_date`
    /// means the stored counter belongs to a previous day and reads as 0.
    pub fn used_on(&self, today: NaiveDate) -> u32 {
        match self.last_query_date {
            Some(date) if date == today => self.queries_used_today,
            _ => 0,
        }
    }
}
