//! Outbox Store: the producer-facing `append` contract and the relay-facing
//! claim protocol (`claim_batch` / `mark_processed` / `abort`).
//!
//! `claim_batch` is modeled as a trait object ([`ClaimedBatch`]) that owns an
//! open relational transaction, rather than a plain `Vec<OutboxRow>` plus a
//! separate commit/rollback call, so it is impossible to call
//! `mark_processed` against a transaction you never claimed rows under.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::model::OutboxRow;

/// Rows claimed under skip-locked row locking, plus the open transaction
/// that holds their locks.
///
/// Exactly one of [`ClaimedBatch::mark_processed`] or [`ClaimedBatch::abort`]
/// must be called to release the locks. Consuming `self` by value makes
/// calling neither, or both, a compile error.
#[async_trait]
pub trait ClaimedBatch: Send {
    /// Rows claimed, in ascending `id` order.
    fn rows(&self) -> &[OutboxRow];

    /// Commit the transaction with every claimed row flipped to
    /// `processed = true`.
    async fn mark_processed(self: Box<Self>) -> RelayResult<()>;

    /// Roll back the transaction. No row is marked processed; their locks
    /// are released and a later claim may pick them up again.
    async fn abort(self: Box<Self>) -> RelayResult<()>;
}

/// Public contract toward producers and the relay worker.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a row with `processed = false` inside the caller's open
    /// transaction. Never opens its own transaction or commits.
    async fn append(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_type: &str,
        environment: &str,
        event_context: &Value,
        metadata_version: i32,
    ) -> RelayResult<i64>;

    /// Claim up to `limit` unprocessed rows under skip-locked row locking,
    /// in ascending `id` order.
    async fn claim_batch(&self, limit: i64) -> RelayResult<Box<dyn ClaimedBatch>>;

    /// Pending count and the age (seconds) of the oldest pending row,
    /// `(0, 0)` if none are pending. Used for metrics only.
    async fn pending_stats(&self) -> RelayResult<(i64, i64)>;

    /// Force a single row to `processed = true` outside of the normal claim
    /// protocol. For operator quarantine of a poison row after inspection.
    async fn quarantine(&self, id: i64) -> RelayResult<()>;
}

/// PostgreSQL-backed [`OutboxStore`].
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn append(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_type: &str,
        environment: &str,
        event_context: &Value,
        metadata_version: i32,
    ) -> RelayResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO outbox_events (
                event_type,
                event_date_time,
                environment,
                event_context,
                metadata_version,
                processed
            ) VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id
            "#,
        )
        .bind(event_type)
        .bind(Utc::now())
        .bind(environment)
        .bind(event_context)
        .bind(metadata_version)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RelayError::OutboxWriteConflict(db_err.to_string())
            }
            _ => RelayError::Database(e),
        })?;

        let id: i64 = row.try_get("id")?;
        debug!(id, event_type, "appended outbox row");
        Ok(id)
    }

    async fn claim_batch(&self, limit: i64) -> RelayResult<Box<dyn ClaimedBatch>> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, event_type, event_date_time, environment, event_context,
                   metadata_version, processed
            FROM outbox_events
            WHERE processed = false
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        debug!(count = rows.len(), "claimed outbox rows");
        Ok(Box::new(PgClaimedBatch { tx, rows }))
    }

    async fn pending_stats(&self) -> RelayResult<(i64, i64)> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                EXTRACT(EPOCH FROM (NOW() - MIN(event_date_time)))::BIGINT AS age_seconds
            FROM outbox_events
            WHERE processed = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = rec.try_get("pending").unwrap_or(0);
        let age: i64 = rec.try_get("age_seconds").unwrap_or(0);
        Ok((pending, age))
    }

    async fn quarantine(&self, id: i64) -> RelayResult<()> {
        let result = sqlx::query("UPDATE outbox_events SET processed = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RelayError::RowNotFound(id));
        }

        warn!(id, "outbox row quarantined out-of-band by operator");
        Ok(())
    }
}

struct PgClaimedBatch {
    tx: Transaction<'static, Postgres>,
    rows: Vec<OutboxRow>,
}

#[async_trait]
impl ClaimedBatch for PgClaimedBatch {
    fn rows(&self) -> &[OutboxRow] {
        &self.rows
    }

    async fn mark_processed(mut self: Box<Self>) -> RelayResult<()> {
        let ids: Vec<i64> = self.rows.iter().map(|r| r.id).collect();
        if !ids.is_empty() {
            sqlx::query("UPDATE outbox_events SET processed = true WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *self.tx)
                .await?;
        }
        self.tx.commit().await?;
        debug!(count = ids.len(), "marked outbox rows processed");
        Ok(())
    }

    async fn abort(self: Box<Self>) -> RelayResult<()> {
        let count = self.rows.len();
        self.tx.rollback().await?;
        debug!(count, "aborted outbox claim, rows remain pending");
        Ok(())
    }
}
