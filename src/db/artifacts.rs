//! Voucher, notice, input and report rows.
//!
//! Every write is insert-or-ignore on the artifact's natural key, so re-delivered
//! pages never duplicate rows nor overwrite state changed after the first delivery
//! (such as a voucher's `executed` flag).

use crate::error::DatabaseError;
use crate::types::{Artifact, Input, Notice, Report, Voucher};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, InputRow, NoticeRow, ReportRow, VoucherRow, to_i64};

impl Database {
    /// Insert one artifact, ignoring it if its key already exists
    pub(super) async fn insert_artifact(
        conn: &mut SqliteConnection,
        artifact: &Artifact,
    ) -> Result<()> {
        match artifact {
            Artifact::Voucher(voucher) => Self::insert_voucher(conn, voucher).await,
            Artifact::Notice(notice) => Self::insert_notice(conn, notice).await,
            Artifact::Input(input) => Self::insert_input(conn, input).await,
            Artifact::Report(report) => Self::insert_report(conn, report).await,
        }
    }

    async fn insert_voucher(conn: &mut SqliteConnection, voucher: &Voucher) -> Result<()> {
        let proof = voucher.proof.as_ref().map(serde_json::to_string).transpose()?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO vouchers (
                input_index, output_index, destination, value, payload,
                executed, proof, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(input_index, output_index) DO NOTHING
            "#,
        )
        .bind(to_i64("vouchers.input_index", voucher.input_index)?)
        .bind(to_i64("vouchers.output_index", voucher.output_index)?)
        .bind(&voucher.destination)
        .bind(&voucher.value)
        .bind(&voucher.payload)
        .bind(voucher.executed)
        .bind(proof)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert voucher {}:{}: {}",
                voucher.input_index, voucher.output_index, e
            )))
        })?;

        Ok(())
    }

    async fn insert_notice(conn: &mut SqliteConnection, notice: &Notice) -> Result<()> {
        let proof = notice.proof.as_ref().map(serde_json::to_string).transpose()?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO notices (input_index, output_index, payload, proof, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(input_index, output_index) DO NOTHING
            "#,
        )
        .bind(to_i64("notices.input_index", notice.input_index)?)
        .bind(to_i64("notices.output_index", notice.output_index)?)
        .bind(&notice.payload)
        .bind(proof)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert notice {}:{}: {}",
                notice.input_index, notice.output_index, e
            )))
        })?;

        Ok(())
    }

    async fn insert_input(conn: &mut SqliteConnection, input: &Input) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let metadata = input.metadata.as_ref();
        let block_number = metadata
            .map(|m| to_i64("inputs.block_number", m.block_number))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO inputs (
                input_index, blob, status, msg_sender, block_number,
                block_timestamp, prev_randao, payload, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(input_index) DO NOTHING
            "#,
        )
        .bind(to_i64("inputs.input_index", input.index)?)
        .bind(&input.blob)
        .bind(input.status.as_str())
        .bind(metadata.map(|m| m.msg_sender.as_str()))
        .bind(block_number)
        .bind(metadata.map(|m| m.block_timestamp))
        .bind(metadata.map(|m| m.prev_randao.as_str()))
        .bind(metadata.map(|m| m.payload.as_str()))
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert input {}: {}",
                input.index, e
            )))
        })?;

        Ok(())
    }

    async fn insert_report(conn: &mut SqliteConnection, report: &Report) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO reports (report_index, input_index, blob, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(report_index) DO NOTHING
            "#,
        )
        .bind(to_i64("reports.report_index", report.index)?)
        .bind(to_i64("reports.input_index", report.input_index)?)
        .bind(&report.blob)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert report {}: {}",
                report.index, e
            )))
        })?;

        Ok(())
    }

    /// Get a voucher by its natural key
    pub async fn get_voucher(&self, input_index: u64, output_index: u64) -> Result<Option<Voucher>> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r#"
            SELECT input_index, output_index, destination, value, payload, executed, proof
            FROM vouchers
            WHERE input_index = ? AND output_index = ?
            "#,
        )
        .bind(to_i64("vouchers.input_index", input_index)?)
        .bind(to_i64("vouchers.output_index", output_index)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get voucher: {}",
                e
            )))
        })?;

        Ok(row.map(Voucher::from))
    }

    /// List vouchers in output order with pagination
    pub async fn list_vouchers(&self, limit: usize, offset: usize) -> Result<Vec<Voucher>> {
        let rows = sqlx::query_as::<_, VoucherRow>(
            r#"
            SELECT input_index, output_index, destination, value, payload, executed, proof
            FROM vouchers
            ORDER BY input_index ASC, output_index ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list vouchers: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Voucher::from).collect())
    }

    /// Mark a voucher as executed
    ///
    /// Returns false if no such voucher exists.
    pub async fn mark_voucher_executed(&self, input_index: u64, output_index: u64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE vouchers SET executed = 1 WHERE input_index = ? AND output_index = ?",
        )
        .bind(to_i64("vouchers.input_index", input_index)?)
        .bind(to_i64("vouchers.output_index", output_index)?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark voucher executed: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a notice by its natural key
    pub async fn get_notice(&self, input_index: u64, output_index: u64) -> Result<Option<Notice>> {
        let row = sqlx::query_as::<_, NoticeRow>(
            r#"
            SELECT input_index, output_index, payload, proof
            FROM notices
            WHERE input_index = ? AND output_index = ?
            "#,
        )
        .bind(to_i64("notices.input_index", input_index)?)
        .bind(to_i64("notices.output_index", output_index)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get notice: {}",
                e
            )))
        })?;

        Ok(row.map(Notice::from))
    }

    /// List notices in output order with pagination
    pub async fn list_notices(&self, limit: usize, offset: usize) -> Result<Vec<Notice>> {
        let rows = sqlx::query_as::<_, NoticeRow>(
            r#"
            SELECT input_index, output_index, payload, proof
            FROM notices
            ORDER BY input_index ASC, output_index ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list notices: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Notice::from).collect())
    }

    /// Get an input by index
    pub async fn get_input(&self, index: u64) -> Result<Option<Input>> {
        let row = sqlx::query_as::<_, InputRow>(
            r#"
            SELECT input_index, blob, status, msg_sender, block_number,
                   block_timestamp, prev_randao, payload
            FROM inputs
            WHERE input_index = ?
            "#,
        )
        .bind(to_i64("inputs.input_index", index)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get input: {}",
                e
            )))
        })?;

        Ok(row.map(Input::from))
    }

    /// List inputs in index order with pagination
    pub async fn list_inputs(&self, limit: usize, offset: usize) -> Result<Vec<Input>> {
        let rows = sqlx::query_as::<_, InputRow>(
            r#"
            SELECT input_index, blob, status, msg_sender, block_number,
                   block_timestamp, prev_randao, payload
            FROM inputs
            ORDER BY input_index ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list inputs: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Input::from).collect())
    }

    /// List reports in index order, optionally only those of one input
    pub async fn list_reports(&self, input_index: Option<u64>) -> Result<Vec<Report>> {
        let query = match input_index {
            Some(input_index) => sqlx::query_as::<_, ReportRow>(
                r#"
                SELECT report_index, input_index, blob
                FROM reports
                WHERE input_index = ?
                ORDER BY report_index ASC
                "#,
            )
            .bind(to_i64("reports.input_index", input_index)?),
            None => sqlx::query_as::<_, ReportRow>(
                r#"
                SELECT report_index, input_index, blob
                FROM reports
                ORDER BY report_index ASC
                "#,
            ),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list reports: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Report::from).collect())
    }
}
