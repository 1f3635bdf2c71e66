//! SQLite database for the certificate gateway.

use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Default hold duration: 48 hours.
const DEFAULT_DELAY_SECONDS: i64 = 172_800;

/// Chains delayed out of the box: Ethereum mainnet and Polygon.
const DEFAULT_DELAYED_CHAINS: &str = "1,137";

#[derive(Clone)]
pub struct GatewayStore {
    pool: Pool<Sqlite>,
}

impl GatewayStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
                .map_err(|e| StoreError::Connection(e.to_string()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(path = %path.display(), "Gateway database opened");

        let store = Self { pool };
        store.run_migrations().await?;
        store.init_defaults().await?;

        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        store.init_defaults().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!("Gateway database migrations complete");
        Ok(())
    }

    /// Seed the singleton scheduler row and default configuration, and run
    /// the one-shot `delay_hours` -> `delay_seconds` migration.
    async fn init_defaults(&self) -> Result<(), StoreError> {
        let now = unix_timestamp_ms();
        sqlx::query(
            "INSERT OR IGNORE INTO scheduler_status (id, is_active, last_updated) VALUES (1, 1, ?)",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let legacy_hours = self.get_config("delay_hours").await?;
        if !legacy_hours.is_empty() {
            if let Ok(hours) = legacy_hours.parse::<i64>() {
                self.set_config("delay_seconds", &(hours * 3600).to_string())
                    .await?;
                sqlx::query("DELETE FROM configuration WHERE key = 'delay_hours'")
                    .execute(&self.pool)
                    .await?;
                info!(hours, "Migrated legacy delay_hours configuration");
            }
        }

        if self.get_config("delay_seconds").await?.is_empty() {
            self.set_config("delay_seconds", &DEFAULT_DELAY_SECONDS.to_string())
                .await?;
        }

        if self.get_config("delayed_chains").await?.is_empty() {
            self.set_config("delayed_chains", DEFAULT_DELAYED_CHAINS)
                .await?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Returns the current time as Unix milliseconds.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub fn unix_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
