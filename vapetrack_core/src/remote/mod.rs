//! Remote backend abstraction.
//!
//! The hosted service offers email/password accounts, a `profiles` table
//! keyed by account id and an append-only `logs` table. Two backends are
//! provided:
//! - [`RestBackend`] - Supabase-compatible REST over HTTP
//! - [`MemoryBackend`] - in-process, for tests and offline runs

mod memory;
mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::types::Session;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a sign-up request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account is active and signed in
    SignedIn(Session),
    /// Account exists but the email must be confirmed before sign-in
    PendingConfirmation { account_id: String, email: String },
}

/// Row of the remote `profiles` table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Denormalized profile document
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What a `logs` row records
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Puff,
    JuicePurchase,
}

/// Row of the remote `logs` table, one per puff or purchase
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRow {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(default)]
    pub vape_name: Option<String>,
    #[serde(default)]
    pub vape_nicotine: Option<f64>,
    #[serde(default)]
    pub juice_level_before: Option<f64>,
    #[serde(default)]
    pub juice_level_after: Option<f64>,
    #[serde(default)]
    pub day_of_week: String,
    #[serde(default)]
    pub hour_of_day: u32,
    #[serde(default)]
    pub time_since_last_puff_ms: Option<i64>,
    #[serde(default)]
    pub user_xp: u64,
    #[serde(default)]
    pub daily_puff_count: u64,
    #[serde(default)]
    pub streak_days: u64,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Operations the sync gateway needs from a hosted backend
///
/// Every call is blocking; the gateway decides which calls run on its
/// background worker.
pub trait RemoteBackend: Send + Sync {
    fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome>;

    fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    fn sign_out(&self, session: &Session) -> Result<()>;

    /// Profile row for the session's account, if one was ever written
    fn fetch_profile(&self, session: &Session) -> Result<Option<ProfileRow>>;

    fn upsert_profile(&self, session: &Session, row: &ProfileRow) -> Result<()>;

    /// All log rows of the account, oldest first
    fn fetch_logs(&self, session: &Session) -> Result<Vec<LogRow>>;

    fn insert_logs(&self, session: &Session, rows: &[LogRow]) -> Result<()>;
}
