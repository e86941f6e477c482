//! PostgreSQL implementation of the persistence seams.
//!
//! Lock mutations are single conditional statements; the affected-row count is
//! the answer, so two workers racing on the same row can never both succeed.

use super::{LockStore, ServerDirectory, TelemetryStore};
use crate::constants::DASHBOARD_PROBE_ID;
use crate::error::GatewatchResult;
use crate::models::{
    AccessKey, DashboardSecurityProbe, KeyType, NewUsageSnapshot, SecurityProbe, Server,
    WorkerLock,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LockStore for PgStore {
    #[instrument(skip(self, lock), fields(lock_id = %lock.id, worker_id = %lock.worker_id))]
    async fn insert_if_absent(&self, lock: &WorkerLock) -> GatewatchResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO worker_locks (id, worker_id, locked_at, expires_at, heartbeat_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&lock.id)
        .bind(&lock.worker_id)
        .bind(lock.locked_at)
        .bind(lock.expires_at)
        .bind(lock.heartbeat_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn find(&self, id: &str) -> GatewatchResult<Option<WorkerLock>> {
        let lock = sqlx::query_as::<_, WorkerLock>(
            r#"
            SELECT id, worker_id, locked_at, expires_at, heartbeat_at
            FROM worker_locks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lock)
    }

    #[instrument(skip(self))]
    async fn take_over_expired(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE worker_locks
            SET worker_id = $2, locked_at = $3, heartbeat_at = $3, expires_at = $4
            WHERE id = $1 AND expires_at <= $3
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn renew(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> GatewatchResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE worker_locks
            SET heartbeat_at = $3, expires_at = $4
            WHERE id = $1 AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str, worker_id: &str) -> GatewatchResult<bool> {
        let result = sqlx::query("DELETE FROM worker_locks WHERE id = $1 AND worker_id = $2")
            .bind(id)
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ServerDirectory for PgStore {
    async fn list_active_servers(&self) -> GatewatchResult<Vec<Server>> {
        let servers = sqlx::query_as::<_, Server>(
            r#"
            SELECT id, name, api_url, api_cert_sha256, is_active
            FROM servers
            WHERE is_active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(servers)
    }

    async fn list_access_keys(&self, server_id: &str) -> GatewatchResult<Vec<AccessKey>> {
        let keys = sqlx::query_as::<_, AccessKey>(
            r#"
            SELECT id, server_id, remote_key_id, dynamic_key_id
            FROM access_keys
            WHERE server_id = $1
            ORDER BY id
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn list_dynamic_key_members(&self) -> GatewatchResult<Vec<AccessKey>> {
        let keys = sqlx::query_as::<_, AccessKey>(
            r#"
            SELECT k.id, k.server_id, k.remote_key_id, k.dynamic_key_id
            FROM access_keys k
            JOIN servers s ON s.id = k.server_id
            WHERE k.dynamic_key_id IS NOT NULL AND s.is_active = TRUE
            ORDER BY k.dynamic_key_id, k.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn latest_used_bytes(
        &self,
        key_type: KeyType,
        key_ids: &[String],
    ) -> GatewatchResult<HashMap<String, i64>> {
        if key_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (key_id) key_id, used_bytes
            FROM usage_snapshots
            WHERE key_type = $1 AND key_id = ANY($2)
            ORDER BY key_id, created_at DESC, id DESC
            "#,
        )
        .bind(key_type)
        .bind(key_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert_usage_snapshots(&self, rows: &[NewUsageSnapshot]) -> GatewatchResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let server_ids: Vec<Option<String>> = rows.iter().map(|r| r.server_id.clone()).collect();
        let key_ids: Vec<String> = rows.iter().map(|r| r.key_id.clone()).collect();
        let key_types: Vec<&str> = rows.iter().map(|r| r.key_type.as_str()).collect();
        let used: Vec<i64> = rows.iter().map(|r| r.used_bytes).collect();
        let deltas: Vec<i64> = rows.iter().map(|r| r.delta_bytes).collect();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO usage_snapshots (server_id, key_id, key_type, used_bytes, delta_bytes)
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::bigint[], $5::bigint[])
            "#,
        )
        .bind(&server_ids)
        .bind(&key_ids)
        .bind(&key_types)
        .bind(&used)
        .bind(&deltas)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(inserted = result.rows_affected(), "Usage snapshots written");
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, probe), fields(server_id = %probe.server_id, result = %probe.result))]
    async fn upsert_security_probe(&self, probe: &SecurityProbe) -> GatewatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_probes (
                server_id, scheme, tls_version, cipher_suite, cert_subject, cert_issuer,
                cert_expiry, cert_days_left, result, error_message, last_checked_at, next_check_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (server_id) DO UPDATE SET
                scheme = EXCLUDED.scheme,
                tls_version = EXCLUDED.tls_version,
                cipher_suite = EXCLUDED.cipher_suite,
                cert_subject = EXCLUDED.cert_subject,
                cert_issuer = EXCLUDED.cert_issuer,
                cert_expiry = EXCLUDED.cert_expiry,
                cert_days_left = EXCLUDED.cert_days_left,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                last_checked_at = EXCLUDED.last_checked_at,
                next_check_at = EXCLUDED.next_check_at
            "#,
        )
        .bind(&probe.server_id)
        .bind(probe.scheme)
        .bind(&probe.tls_version)
        .bind(&probe.cipher_suite)
        .bind(&probe.cert_subject)
        .bind(&probe.cert_issuer)
        .bind(probe.cert_expiry)
        .bind(probe.cert_days_left)
        .bind(probe.result)
        .bind(&probe.error_message)
        .bind(probe.last_checked_at)
        .bind(probe.next_check_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, probe), fields(score = probe.security_score, result = %probe.result))]
    async fn upsert_dashboard_probe(&self, probe: &DashboardSecurityProbe) -> GatewatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dashboard_security_probe (
                id, url, scheme, tls_version, cipher_suite, cert_subject, cert_issuer,
                cert_expiry, cert_days_left, has_hsts, hsts_max_age, has_secure_cookies,
                has_http_only_cookies, has_same_site_cookies, has_csp, csp_directives,
                has_x_frame_options, has_x_content_type_options, security_score, result,
                error_message, last_checked_at, next_check_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (id) DO UPDATE SET
                url = EXCLUDED.url,
                scheme = EXCLUDED.scheme,
                tls_version = EXCLUDED.tls_version,
                cipher_suite = EXCLUDED.cipher_suite,
                cert_subject = EXCLUDED.cert_subject,
                cert_issuer = EXCLUDED.cert_issuer,
                cert_expiry = EXCLUDED.cert_expiry,
                cert_days_left = EXCLUDED.cert_days_left,
                has_hsts = EXCLUDED.has_hsts,
                hsts_max_age = EXCLUDED.hsts_max_age,
                has_secure_cookies = EXCLUDED.has_secure_cookies,
                has_http_only_cookies = EXCLUDED.has_http_only_cookies,
                has_same_site_cookies = EXCLUDED.has_same_site_cookies,
                has_csp = EXCLUDED.has_csp,
                csp_directives = EXCLUDED.csp_directives,
                has_x_frame_options = EXCLUDED.has_x_frame_options,
                has_x_content_type_options = EXCLUDED.has_x_content_type_options,
                security_score = EXCLUDED.security_score,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                last_checked_at = EXCLUDED.last_checked_at,
                next_check_at = EXCLUDED.next_check_at
            "#,
        )
        .bind(DASHBOARD_PROBE_ID)
        .bind(&probe.url)
        .bind(probe.scheme)
        .bind(&probe.tls_version)
        .bind(&probe.cipher_suite)
        .bind(&probe.cert_subject)
        .bind(&probe.cert_issuer)
        .bind(probe.cert_expiry)
        .bind(probe.cert_days_left)
        .bind(probe.has_hsts)
        .bind(probe.hsts_max_age)
        .bind(probe.has_secure_cookies)
        .bind(probe.has_http_only_cookies)
        .bind(probe.has_same_site_cookies)
        .bind(probe.has_csp)
        .bind(&probe.csp_directives)
        .bind(probe.has_x_frame_options)
        .bind(probe.has_x_content_type_options)
        .bind(probe.security_score)
        .bind(probe.result)
        .bind(&probe.error_message)
        .bind(probe.last_checked_at)
        .bind(probe.next_check_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_usage_snapshots_before(&self, cutoff: DateTime<Utc>) -> GatewatchResult<u64> {
        let result = sqlx::query("DELETE FROM usage_snapshots WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
