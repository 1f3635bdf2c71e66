//! Database queries for the certificate gateway.

use std::time::Duration;

use super::db::{unix_timestamp_ms, GatewayStore, StoreError};
use super::models::CertificateRecord;

impl GatewayStore {
    // =========================================================================
    // Certificate queries
    // =========================================================================

    /// Insert a held certificate and return its local id.
    pub async fn insert_certificate(
        &self,
        raw_request: &[u8],
        metadata: &str,
        cert_id: &[u8],
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO certificates (raw_request, metadata, cert_id, received_at) VALUES (?, ?, ?, ?)",
        )
        .bind(raw_request)
        .bind(metadata)
        .bind(cert_id)
        .bind(unix_timestamp_ms())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Mark a certificate processed. A no-op when already processed, so the
    /// null -> non-null transition happens at most once.
    pub async fn mark_processed(&self, id: i64) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE certificates SET processed_at = ? WHERE id = ? AND processed_at IS NULL")
                .bind(unix_timestamp_ms())
                .bind(id)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unprocessed certificates whose hold has elapsed, in ascending id order.
    pub async fn list_eligible(
        &self,
        now_ms: i64,
        delay_seconds: i64,
    ) -> Result<Vec<CertificateRecord>, StoreError> {
        let cutoff = now_ms - delay_seconds * 1000;

        let records = sqlx::query_as::<_, CertificateRecord>(
            "SELECT * FROM certificates WHERE processed_at IS NULL AND received_at <= ? ORDER BY id ASC",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    /// Look up a held or processed certificate by its 32-byte identifier.
    pub async fn get_by_cert_id(
        &self,
        cert_id: &[u8],
    ) -> Result<Option<CertificateRecord>, StoreError> {
        let record =
            sqlx::query_as::<_, CertificateRecord>("SELECT * FROM certificates WHERE cert_id = ?")
                .bind(cert_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(record)
    }

    /// All certificates, newest first, for the status page.
    pub async fn list_all_descending(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let records = sqlx::query_as::<_, CertificateRecord>(
            "SELECT * FROM certificates ORDER BY received_at DESC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    /// All certificates still awaiting release.
    pub async fn list_unprocessed(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let records = sqlx::query_as::<_, CertificateRecord>(
            "SELECT * FROM certificates WHERE processed_at IS NULL ORDER BY id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    // =========================================================================
    // Configuration and credentials
    // =========================================================================

    /// Read a configuration value; absent keys read as the empty string.
    pub async fn get_config(&self, key: &str) -> Result<String, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM configuration WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(value,)| value).unwrap_or_default())
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO configuration (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Read a stored credential hash; absent keys read as the empty string.
    pub async fn get_credential(&self, key: &str) -> Result<String, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM credentials WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|(value,)| value).unwrap_or_default())
    }

    pub async fn set_credential(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO credentials (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // Scheduler flag and kill-switch attempts
    // =========================================================================

    /// Whether the release scheduler is allowed to forward certificates.
    /// Defaults to active when the singleton row is missing.
    pub async fn get_scheduler_flag(&self) -> Result<bool, StoreError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_active FROM scheduler_status WHERE id = 1")
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(active,)| active).unwrap_or(true))
    }

    pub async fn set_scheduler_flag(&self, is_active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE scheduler_status SET is_active = ?, last_updated = ? WHERE id = 1")
            .bind(is_active)
            .bind(unix_timestamp_ms())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    pub async fn record_attempt(&self, kind: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO kill_switch_attempts (attempt_type, attempted_at) VALUES (?, ?)")
            .bind(kind)
            .bind(unix_timestamp_ms())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Count attempts of a kind within the trailing window.
    pub async fn count_recent_attempts(
        &self,
        kind: &str,
        window: Duration,
    ) -> Result<i64, StoreError> {
        let cutoff = unix_timestamp_ms() - window.as_millis() as i64;

        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM kill_switch_attempts WHERE attempt_type = ? AND attempted_at >= ?",
        )
        .bind(kind)
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Drop attempts older than the retention window.
    pub async fn prune_attempts(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = unix_timestamp_ms() - older_than.as_millis() as i64;

        let result = sqlx::query("DELETE FROM kill_switch_attempts WHERE attempted_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
