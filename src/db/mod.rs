//! Database layer for rollup-sync
//!
//! Handles SQLite persistence for synchronized artifacts and sync progress.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`artifacts`] - Voucher, notice, input and report rows
//! - [`progress`] - Sync progress log, the atomic commit, retention purge

use crate::error::DatabaseError;
use crate::types::{
    AdvanceMetadata, CompletionStatus, CursorTriple, Input, Notice, OutputProof, Report,
    SyncProgress, Voucher,
};
use crate::{Error, Result};
use sqlx::{FromRow, sqlite::SqlitePool};

mod artifacts;
mod migrations;
mod progress;

/// Sync progress record from database
#[derive(Debug, Clone, FromRow)]
pub struct SyncFetchRow {
    /// Unique database ID
    pub id: i64,
    /// Unix timestamp in milliseconds when the commit happened
    pub timestamp_ms: i64,
    /// Outputs cursor before the commit
    pub outputs_before: Option<String>,
    /// Outputs cursor after the commit
    pub outputs_after: Option<String>,
    /// Inputs cursor before the commit
    pub inputs_before: Option<String>,
    /// Inputs cursor after the commit
    pub inputs_after: Option<String>,
    /// Reports cursor before the commit
    pub reports_before: Option<String>,
    /// Reports cursor after the commit
    pub reports_after: Option<String>,
    /// `;`-separated ids of the outputs committed with this record
    pub output_ids: String,
}

impl From<SyncFetchRow> for SyncProgress {
    fn from(row: SyncFetchRow) -> Self {
        SyncProgress {
            id: row.id,
            timestamp_ms: row.timestamp_ms,
            before: CursorTriple {
                outputs: row.outputs_before,
                inputs: row.inputs_before,
                reports: row.reports_before,
            },
            after: CursorTriple {
                outputs: row.outputs_after,
                inputs: row.inputs_after,
                reports: row.reports_after,
            },
            output_ids: row.output_ids,
        }
    }
}

/// Voucher record from database
#[derive(Debug, Clone, FromRow)]
pub struct VoucherRow {
    /// Index of the producing input
    pub input_index: i64,
    /// Global output index
    pub output_index: i64,
    /// Destination address
    pub destination: String,
    /// Value in wei, decimal
    pub value: String,
    /// V2 payload hex
    pub payload: String,
    /// Whether the voucher was executed
    pub executed: bool,
    /// Proof fields as JSON
    pub proof: Option<String>,
}

impl From<VoucherRow> for Voucher {
    fn from(row: VoucherRow) -> Self {
        Voucher {
            input_index: row.input_index as u64,
            output_index: row.output_index as u64,
            destination: row.destination,
            value: row.value,
            payload: row.payload,
            executed: row.executed,
            proof: parse_proof(row.proof),
        }
    }
}

/// Notice record from database
#[derive(Debug, Clone, FromRow)]
pub struct NoticeRow {
    /// Index of the producing input
    pub input_index: i64,
    /// Global output index
    pub output_index: i64,
    /// V2 payload hex
    pub payload: String,
    /// Proof fields as JSON
    pub proof: Option<String>,
}

impl From<NoticeRow> for Notice {
    fn from(row: NoticeRow) -> Self {
        Notice {
            input_index: row.input_index as u64,
            output_index: row.output_index as u64,
            payload: row.payload,
            proof: parse_proof(row.proof),
        }
    }
}

/// Input record from database
#[derive(Debug, Clone, FromRow)]
pub struct InputRow {
    /// Global input index
    pub input_index: i64,
    /// Raw blob
    pub blob: String,
    /// Completion status text
    pub status: String,
    /// Sender, when the blob was an `EvmAdvance` call
    pub msg_sender: Option<String>,
    /// Block number
    pub block_number: Option<i64>,
    /// Block timestamp
    pub block_timestamp: Option<i64>,
    /// PREVRANDAO, decimal
    pub prev_randao: Option<String>,
    /// Inner application payload
    pub payload: Option<String>,
}

impl From<InputRow> for Input {
    fn from(row: InputRow) -> Self {
        // Metadata columns are written together, so one missing means none were
        let metadata = match (
            row.msg_sender,
            row.block_number,
            row.block_timestamp,
            row.prev_randao,
            row.payload,
        ) {
            (
                Some(msg_sender),
                Some(block_number),
                Some(block_timestamp),
                Some(prev_randao),
                Some(payload),
            ) => Some(AdvanceMetadata {
                msg_sender,
                block_number: block_number as u64,
                block_timestamp,
                prev_randao,
                payload,
            }),
            _ => None,
        };

        let status = CompletionStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!(
                input_index = row.input_index,
                status = %row.status,
                "Unknown input status in database, reading as unprocessed"
            );
            CompletionStatus::Unprocessed
        });

        Input {
            index: row.input_index as u64,
            blob: row.blob,
            status,
            metadata,
        }
    }
}

/// Report record from database
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    /// Global report index
    pub report_index: i64,
    /// Index of the input the report belongs to
    pub input_index: i64,
    /// Raw blob
    pub blob: String,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            input_index: row.input_index as u64,
            index: row.report_index as u64,
            blob: row.blob,
        }
    }
}

fn parse_proof(proof: Option<String>) -> Option<OutputProof> {
    proof.and_then(|json| match serde_json::from_str(&json) {
        Ok(proof) => Some(proof),
        Err(e) => {
            tracing::warn!(error = %e, "Stored output proof is not valid JSON, ignoring");
            None
        }
    })
}

/// Convert an upstream index to an SQLite integer
pub(crate) fn to_i64(column: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Database(DatabaseError::OutOfRange { column, value }))
}

/// Database handle for rollup-sync
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
