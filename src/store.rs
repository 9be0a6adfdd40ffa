//! Durable sync progress
//!
//! [`ProgressStore`] is the seam between the synchronizer and storage. The SQLite
//! implementation lives on [`Database`](crate::db::Database); tests substitute an
//! in-memory one.

use crate::error::Result;
use crate::types::{Artifact, CursorTriple};
use async_trait::async_trait;

/// Storage for artifacts and the cursor triple that unlocked them
///
/// Only one writer may commit against a store at a time: `before` in
/// [`commit_advance`](ProgressStore::commit_advance) is trusted, not re-checked.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Cursors of the most recent commit, or `None` if nothing was ever committed
    async fn get_last(&self) -> Result<Option<CursorTriple>>;

    /// Persist `artifacts` and record the move from `before` to `after`.
    ///
    /// All or nothing: on error no artifact is visible and no progress is recorded.
    /// Artifacts already stored under the same natural key are left untouched, so
    /// committing the same page twice yields the same rows as committing it once.
    ///
    /// # Errors
    /// Returns [`Error::Database`](crate::Error::Database), or
    /// [`Error::Serialization`](crate::Error::Serialization) for an unencodable proof;
    /// the caller must assume nothing was written.
    async fn commit_advance(
        &self,
        artifacts: &[Artifact],
        before: &CursorTriple,
        after: &CursorTriple,
    ) -> Result<()>;
}
