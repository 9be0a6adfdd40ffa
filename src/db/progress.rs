//! Sync progress log and the atomic artifact-plus-cursor commit.

use crate::error::DatabaseError;
use crate::store::ProgressStore;
use crate::types::{Artifact, CursorTriple, SyncProgress};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::SqliteConnection;

use super::{Database, SyncFetchRow};

impl Database {
    /// Get the most recent progress record
    ///
    /// "Most recent" is by commit timestamp, ties broken by insertion order.
    pub async fn get_last_sync_fetch(&self) -> Result<Option<SyncProgress>> {
        let row = sqlx::query_as::<_, SyncFetchRow>(
            r#"
            SELECT id, timestamp_ms, outputs_before, outputs_after, inputs_before,
                   inputs_after, reports_before, reports_after, output_ids
            FROM sync_fetches
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load last sync fetch: {}",
                e
            )))
        })?;

        Ok(row.map(SyncProgress::from))
    }

    /// Append a progress record outside of an artifact commit
    ///
    /// Returns the new record's ID.
    pub async fn record_sync_fetch(
        &self,
        before: &CursorTriple,
        after: &CursorTriple,
        output_ids: &str,
    ) -> Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        Self::insert_sync_fetch(&mut *conn, before, after, output_ids).await
    }

    /// Count progress records
    pub async fn count_sync_fetches(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_fetches")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count sync fetches: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Delete progress records older than `cutoff_ms`
    ///
    /// The most recent record always survives, whatever its age, because it is the
    /// resume point. Returns the number of records deleted.
    pub async fn purge_sync_fetches_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sync_fetches
            WHERE timestamp_ms < ?
              AND id NOT IN (
                  SELECT id FROM sync_fetches
                  ORDER BY timestamp_ms DESC, id DESC
                  LIMIT 1
              )
            "#,
        )
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to purge sync fetches: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Persist `artifacts` and the cursor move in one transaction
    ///
    /// A progress record is only appended when the cursors actually moved, so a
    /// cycle that re-delivers artifacts under unchanged cursors leaves no log entry.
    pub async fn commit_sync_page(
        &self,
        artifacts: &[Artifact],
        before: &CursorTriple,
        after: &CursorTriple,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to begin commit: {}",
                e
            )))
        })?;

        // Dropping `tx` on any early return rolls everything back
        for artifact in artifacts {
            Self::insert_artifact(&mut *tx, artifact).await?;
        }

        if before != after {
            let output_ids = artifacts
                .iter()
                .filter_map(Artifact::output_id)
                .collect::<Vec<_>>()
                .join(";");
            Self::insert_sync_fetch(&mut *tx, before, after, &output_ids).await?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::TransactionFailed(format!(
                "Failed to commit sync page: {}",
                e
            )))
        })?;

        Ok(())
    }

    async fn insert_sync_fetch(
        conn: &mut SqliteConnection,
        before: &CursorTriple,
        after: &CursorTriple,
        output_ids: &str,
    ) -> Result<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO sync_fetches (
                timestamp_ms, outputs_before, outputs_after, inputs_before,
                inputs_after, reports_before, reports_after, output_ids
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(now)
        .bind(&before.outputs)
        .bind(&after.outputs)
        .bind(&before.inputs)
        .bind(&after.inputs)
        .bind(&before.reports)
        .bind(&after.reports)
        .bind(output_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert sync fetch: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl ProgressStore for Database {
    async fn get_last(&self) -> Result<Option<CursorTriple>> {
        Ok(self.get_last_sync_fetch().await?.map(|record| record.after))
    }

    async fn commit_advance(
        &self,
        artifacts: &[Artifact],
        before: &CursorTriple,
        after: &CursorTriple,
    ) -> Result<()> {
        self.commit_sync_page(artifacts, before, after).await
    }
}
