//! SQLite persistence layer
//!
//! Backs the [`SubscriberStore`] and [`DeliveryLedger`] seams with SQLx.
//! The check-then-act sequences of the dispatch path are expressed as single
//! conditional statements here ([`mark_prompted`](Database::mark_prompted),
//! [`reserve_delivery`](Database::reserve_delivery)), so two concurrent
//! evaluators observe exactly one winner.

use crate::core::{DeliveryLedger, Subscriber, SubscriberStore};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLx error (connection, query, etc.)
    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const POOL_SIZE: u32 = 5;

    /// Connects to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`;
    /// use `sqlite::memory:` for tests.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_pool_size(url, Self::POOL_SIZE).await
    }

    /// Connects with a custom pool size.
    ///
    /// An in-memory database needs a pool size of 1: every pooled connection
    /// would otherwise open its own empty `:memory:` instance.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        info!("Connected to database: {}", url);
        Ok(Self { pool })
    }

    /// Runs database migrations.
    ///
    /// Called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SubscriberStore for Database {
    async fn upsert_subscriber(&self, chat_id: i64, display_name: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, display_name)
            VALUES (?, ?)
            ON CONFLICT (chat_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, bool)>(
            r#"
            SELECT chat_id, display_name, region, prompted
            FROM subscribers
            ORDER BY chat_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(chat_id, display_name, region_preference, prompted)| Subscriber {
                    chat_id,
                    display_name,
                    region_preference,
                    prompted,
                },
            )
            .collect())
    }

    async fn set_region_preference(&self, chat_id: i64, region: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscribers
            SET region = ?
            WHERE chat_id = ?
            "#,
        )
        .bind(region)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_prompted(&self, chat_id: i64) -> Result<bool, StoreError> {
        // Conditional update: only one of two concurrent callers sees a row
        // change, which keeps the flag's false→true transition single-shot.
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET prompted = 1
            WHERE chat_id = ? AND prompted = 0
            "#,
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_cursor(&self) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT last_update_id FROM ingest_cursor WHERE id = 0
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(last_update_id,)| last_update_id))
    }

    async fn save_cursor(&self, last_update_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ingest_cursor (id, last_update_id)
            VALUES (0, ?)
            ON CONFLICT (id) DO UPDATE SET last_update_id = excluded.last_update_id
            "#,
        )
        .bind(last_update_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for Database {
    async fn reserve_delivery(&self, event_id: &str, chat_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO deliveries (event_id, chat_id, status)
            VALUES (?, ?, 'pending')
            ON CONFLICT (event_id, chat_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn confirm_delivery(&self, event_id: &str, chat_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'sent'
            WHERE event_id = ? AND chat_id = ?
            "#,
        )
        .bind(event_id)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_delivered(&self, event_id: &str, chat_id: i64) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM deliveries WHERE event_id = ? AND chat_id = ?
            "#,
        )
        .bind(event_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn prune_older_than(&self, age: Duration) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM deliveries
            WHERE reserved_at < strftime('%s', 'now') - ?
            "#,
        )
        .bind(age.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
