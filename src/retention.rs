//! Periodic purge of old sync progress records
//!
//! Progress records are an audit trail; only the latest one matters for resuming.
//! [`RetentionTask`] deletes records older than the configured age on a fixed
//! interval, independently of the synchronizer.

use crate::config::RetentionConfig;
use crate::db::Database;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Background purge of progress records
pub struct RetentionTask {
    db: Arc<Database>,
    interval: Duration,
    max_age: Duration,
}

impl RetentionTask {
    /// Create a task purging `db` per `config`
    pub fn new(db: Arc<Database>, config: &RetentionConfig) -> Self {
        Self {
            db,
            interval: config.interval,
            max_age: config.max_age,
        }
    }

    /// Purge once, returning the number of deleted records
    pub async fn purge_once(&self) -> Result<u64> {
        let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(max_age_ms);

        let deleted = self.db.purge_sync_fetches_before(cutoff_ms).await?;
        if deleted > 0 {
            info!(deleted, max_age = ?self.max_age, "Purged old sync progress records");
        } else {
            debug!("No sync progress records to purge");
        }
        Ok(deleted)
    }

    /// Purge on every interval tick until cancelled
    ///
    /// Purge failures are logged and retried on the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, max_age = ?self.max_age, "Retention task started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; start purging one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.purge_once().await {
                        error!(error = %e, "Failed to purge sync progress records");
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }

        info!("Retention task stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CursorTriple;
    use tempfile::NamedTempFile;

    fn cursors(outputs: &str) -> CursorTriple {
        CursorTriple {
            outputs: Some(outputs.to_string()),
            ..Default::default()
        }
    }

    fn config(interval: Duration, max_age: Duration) -> RetentionConfig {
        RetentionConfig {
            enabled: true,
            interval,
            max_age,
        }
    }

    #[tokio::test]
    async fn test_purge_once_keeps_resume_point() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        db.record_sync_fetch(&CursorTriple::default(), &cursors("o1"), "")
            .await
            .unwrap();
        db.record_sync_fetch(&cursors("o1"), &cursors("o2"), "")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let task = RetentionTask::new(db.clone(), &config(Duration::from_secs(600), Duration::ZERO));
        let deleted = task.purge_once().await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(db.count_sync_fetches().await.unwrap(), 1);
        let last = db.get_last_sync_fetch().await.unwrap().unwrap();
        assert_eq!(last.after, cursors("o2"));
    }

    #[tokio::test]
    async fn test_purge_once_respects_max_age() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        db.record_sync_fetch(&CursorTriple::default(), &cursors("o1"), "")
            .await
            .unwrap();
        db.record_sync_fetch(&cursors("o1"), &cursors("o2"), "")
            .await
            .unwrap();

        let task = RetentionTask::new(db.clone(), &config(Duration::from_secs(600), Duration::from_secs(600)));

        assert_eq!(task.purge_once().await.unwrap(), 0);
        assert_eq!(db.count_sync_fetches().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_purges_on_interval_and_stops_on_cancel() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
        for n in 1..=3 {
            db.record_sync_fetch(&cursors(&format!("o{}", n - 1)), &cursors(&format!("o{n}")), "")
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let task = RetentionTask::new(db.clone(), &config(Duration::from_millis(10), Duration::ZERO));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while db.count_sync_fetches().await.unwrap() > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("retention task purged old records");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("retention task stops on cancel")
            .unwrap();
        assert_eq!(db.count_sync_fetches().await.unwrap(), 1);
    }
}
