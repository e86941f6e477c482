use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Remote VPN gateway as configured in the dashboard
/// Maps to `servers` table (read-only for the workers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Server {
    pub id: String,
    pub name: String,
    /// Base URL of the gateway management API, including its secret path prefix
    pub api_url: String,
    /// Pinned SHA-256 fingerprint of the management API certificate (hex)
    pub api_cert_sha256: String,
    pub is_active: bool,
}

/// Access key provisioned on a single gateway
/// Maps to `access_keys` table (read-only for the workers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AccessKey {
    pub id: String,
    pub server_id: String,
    /// Identifier of the key on the gateway, as used in its metrics document
    pub remote_key_id: String,
    /// Dynamic key this access key contributes to, if any
    pub dynamic_key_id: Option<String>,
}
