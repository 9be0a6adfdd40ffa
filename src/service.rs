//! Service wiring and lifecycle
//!
//! [`SyncService`] builds every component from a [`Config`] and owns the background
//! tasks: the synchronizer loop and, when enabled, the retention purge. Both share
//! one cancellation token.

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::GraphqlFetcher;
use crate::retention::RetentionTask;
use crate::synchronizer::Synchronizer;
use crate::types::SyncState;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct ServiceTasks {
    sync: JoinHandle<Result<()>>,
    retention: Option<JoinHandle<()>>,
}

/// A configured synchronizer with its database and background tasks
pub struct SyncService {
    config: Config,
    db: Arc<Database>,
    synchronizer: Arc<Synchronizer>,
    cancel: CancellationToken,
    tasks: Mutex<Option<ServiceTasks>>,
}

impl SyncService {
    /// Validate `config`, open the database and build the synchronizer
    ///
    /// Nothing runs until [`start`](Self::start).
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let fetcher = Arc::new(GraphqlFetcher::new(&config.upstream)?);
        let synchronizer = Arc::new(Synchronizer::new(fetcher, db.clone(), &config.sync));

        info!(
            upstream = %config.upstream.graphql_url,
            database = %config.persistence.database_path.display(),
            "Sync service initialized"
        );

        Ok(Self {
            config,
            db,
            synchronizer,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(None),
        })
    }

    /// Spawn the background tasks and wait until the synchronizer is ready
    ///
    /// # Errors
    /// Fails if the service was already started, or if the synchronizer stopped before
    /// becoming ready (for example because the stored progress could not be read).
    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(Error::Other("sync service already started".to_string()));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let sync = tokio::spawn({
            let synchronizer = self.synchronizer.clone();
            let cancel = self.cancel.clone();
            async move { synchronizer.run(ready_tx, cancel).await }
        });

        // The sender is dropped without a signal only if the loop ended during startup
        if ready_rx.await.is_err() {
            sync.await
                .map_err(|e| Error::Other(format!("synchronizer task panicked: {}", e)))??;
            return Err(Error::Other(
                "synchronizer stopped before becoming ready".to_string(),
            ));
        }

        let retention = if self.config.retention.enabled {
            let task = RetentionTask::new(self.db.clone(), &self.config.retention);
            Some(tokio::spawn(task.run(self.cancel.clone())))
        } else {
            info!("Retention purge disabled");
            None
        };

        *tasks = Some(ServiceTasks { sync, retention });
        Ok(())
    }

    /// Resolves once the synchronizer loop has stopped, for whatever reason
    pub async fn stopped(&self) {
        let mut state = self.synchronizer.subscribe();
        // Err means the synchronizer was dropped, which also means it stopped
        state
            .wait_for(|state| *state == SyncState::Stopped)
            .await
            .ok();
    }

    /// Watch the synchronizer's state
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.synchronizer.subscribe()
    }

    /// Database the service writes into
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Cancel the background tasks and wait for them to finish
    ///
    /// # Errors
    /// Returns the error that halted the synchronizer, if it halted on its own.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown");
        self.cancel.cancel();

        let Some(tasks) = self.tasks.lock().await.take() else {
            return Ok(());
        };

        if let Some(retention) = tasks.retention
            && let Err(e) = retention.await
        {
            warn!(error = %e, "Retention task did not finish cleanly");
        }

        let result = match tasks.sync.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("synchronizer task panicked: {}", e))),
        };

        self.db.pool().close().await;
        info!("Graceful shutdown complete");
        result
    }
}
