use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Kind of key a usage snapshot is recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    /// Key living on exactly one gateway
    AccessKey,
    /// Aggregate key spanning access keys on several gateways
    DynamicKey,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessKey => "ACCESS_KEY",
            Self::DynamicKey => "DYNAMIC_KEY",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only usage observation
/// Maps to `usage_snapshots` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UsageSnapshot {
    pub id: i64,
    /// `None` for dynamic key aggregates
    pub server_id: Option<String>,
    pub key_id: String,
    pub key_type: KeyType,
    /// Cumulative counter as reported by the gateway
    pub used_bytes: i64,
    /// Non-negative increase since the previous snapshot of the same key
    pub delta_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// New UsageSnapshot for insertion (without generated fields)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUsageSnapshot {
    pub server_id: Option<String>,
    pub key_id: String,
    pub key_type: KeyType,
    pub used_bytes: i64,
    pub delta_bytes: i64,
}
