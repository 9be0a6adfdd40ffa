//! The synchronizer loop
//!
//! [`Synchronizer`] repeatedly fetches one page covering every enabled stream, decodes
//! it, and commits the artifacts together with the advanced cursors. It moves through
//! the states of [`SyncState`]:
//!
//! ```text
//! Starting -> Polling -> Decoding -> Persisting -> Sleeping -> Polling ... -> Stopped
//!                |                                   ^
//!                +-- fetch failed / nothing new -----+
//! ```
//!
//! # Failure handling
//!
//! - Transport and protocol failures are logged and the loop sleeps its fixed
//!   interval before polling again with unchanged cursors.
//! - Decode failures (under [`DecodeFailurePolicy::Halt`]) and persistence failures
//!   stop the loop with an error. Retrying them would reproduce the same failure.
//! - Cancellation is observed while loading cursors, fetching, committing and
//!   sleeping. An interrupted commit is rolled back; the same page is re-delivered on
//!   the next run, which is harmless because artifact writes are idempotent.
//!
//! # Example
//!
//! ```no_run
//! use rollup_sync::{Database, GraphqlFetcher, Synchronizer, config::Config};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rollup_sync::Result<()> {
//! let config = Config::default();
//! let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//! let fetcher = Arc::new(GraphqlFetcher::new(&config.upstream)?);
//! let synchronizer = Synchronizer::new(fetcher, db, &config.sync);
//!
//! let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
//! let cancel = CancellationToken::new();
//! let handle = tokio::spawn({
//!     let cancel = cancel.clone();
//!     async move { synchronizer.run(ready_tx, cancel).await }
//! });
//!
//! ready_rx.await.ok();
//! cancel.cancel();
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

use crate::config::{DecodeFailurePolicy, SyncConfig};
use crate::decoder::ArtifactDecoder;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::query::QueryBuilder;
use crate::store::ProgressStore;
use crate::types::{Artifact, CursorTriple, Page, SyncState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one poll cycle that reached the upstream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every stream is caught up; nothing was written
    Idle,
    /// Artifacts and/or cursor moves were committed
    Committed {
        /// Cursors after the commit
        cursors: CursorTriple,
        /// Number of artifacts written
        artifacts: usize,
        /// Number of entries dropped under [`DecodeFailurePolicy::Skip`]
        skipped: usize,
    },
}

/// Multi-stream cursor synchronizer
pub struct Synchronizer {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ProgressStore>,
    decoder: ArtifactDecoder,
    queries: QueryBuilder,
    poll_interval: Duration,
    decode_failure: DecodeFailurePolicy,
    state_tx: watch::Sender<SyncState>,
}

impl Synchronizer {
    /// Create a synchronizer reading from `fetcher` and committing into `store`
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ProgressStore>,
        config: &SyncConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Starting);
        Self {
            fetcher,
            store,
            decoder: ArtifactDecoder::new(config.payload_encoding),
            queries: QueryBuilder::new(config.batch_size, config.streams),
            poll_interval: config.poll_interval,
            decode_failure: config.decode_failure,
            state_tx,
        }
    }

    /// Watch the loop's current state
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Current state of the loop
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Run until cancelled or until a non-transient failure.
    ///
    /// `ready` is signalled once the last committed cursors are loaded. Cancellation
    /// returns `Ok(())`.
    ///
    /// # Errors
    /// Returns the decode or persistence error that halted the loop. Loading the
    /// initial cursors failing also halts it.
    pub async fn run(&self, ready: oneshot::Sender<()>, cancel: CancellationToken) -> Result<()> {
        self.set_state(SyncState::Starting);

        let loaded = tokio::select! {
            _ = cancel.cancelled() => {
                self.stop();
                return Ok(());
            }
            loaded = self.store.get_last() => loaded,
        };
        let mut cursors = match loaded {
            Ok(cursors) => cursors.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "Failed to load sync progress, synchronizer not started");
                self.set_state(SyncState::Stopped);
                return Err(e);
            }
        };

        info!(
            outputs = ?cursors.outputs,
            inputs = ?cursors.inputs,
            reports = ?cursors.reports,
            poll_interval = ?self.poll_interval,
            "Synchronizer started"
        );
        // The caller may have stopped waiting; that does not affect the loop
        ready.send(()).ok();

        loop {
            self.set_state(SyncState::Polling);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.poll_once(&cursors) => outcome,
            };

            match outcome {
                Ok(CycleOutcome::Committed { cursors: next, .. }) => cursors = next,
                Ok(CycleOutcome::Idle) => {}
                Err(e) if e.is_transient() => {
                    warn!(
                        error = %e,
                        retry_in = ?self.poll_interval,
                        "Upstream fetch failed, cursors unchanged"
                    );
                }
                Err(e) => {
                    error!(
                        error = %e,
                        outputs = ?cursors.outputs,
                        inputs = ?cursors.inputs,
                        reports = ?cursors.reports,
                        "Synchronizer halted, operator action required"
                    );
                    self.set_state(SyncState::Stopped);
                    return Err(e);
                }
            }

            self.set_state(SyncState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.stop();
        Ok(())
    }

    /// Run exactly one fetch-decode-commit cycle starting from `cursors`.
    ///
    /// Takes the current cursors and returns the next ones inside the outcome; the
    /// synchronizer itself keeps no cursor state.
    ///
    /// # Errors
    /// - transient [`Error::Transport`](crate::Error::Transport) /
    ///   [`Error::Protocol`](crate::Error::Protocol) from the fetch
    /// - [`Error::Decode`](crate::Error::Decode) when an output cannot be decoded and
    ///   the policy is `Halt`; nothing from the page is committed
    /// - database errors from the commit; nothing from the page is committed
    pub async fn poll_once(&self, cursors: &CursorTriple) -> Result<CycleOutcome> {
        let request = self.queries.build(cursors);
        let page = self.fetcher.fetch(&request, self.queries.streams()).await?;

        self.set_state(SyncState::Decoding);
        let (artifacts, skipped) = self.decode_page(&page)?;
        let after = page.advance(cursors);

        if artifacts.is_empty() && after == *cursors {
            debug!(skipped, "All streams caught up");
            return Ok(CycleOutcome::Idle);
        }

        self.set_state(SyncState::Persisting);
        self.store.commit_advance(&artifacts, cursors, &after).await?;

        info!(
            outputs = page.outputs.entries.len(),
            inputs = page.inputs.entries.len(),
            reports = page.reports.entries.len(),
            skipped,
            cursors = ?after,
            "Committed sync page"
        );

        Ok(CycleOutcome::Committed {
            cursors: after,
            artifacts: artifacts.len(),
            skipped,
        })
    }

    /// Decode outputs, then inputs, then reports
    fn decode_page(&self, page: &Page) -> Result<(Vec<Artifact>, usize)> {
        let mut artifacts = Vec::with_capacity(page.len());
        let mut skipped = 0;

        for raw in &page.outputs.entries {
            match self.decoder.decode_output(raw) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => match self.decode_failure {
                    DecodeFailurePolicy::Halt => return Err(e.into()),
                    DecodeFailurePolicy::Skip => {
                        error!(
                            output_index = raw.index,
                            input_index = raw.input_index,
                            blob = %raw.blob,
                            error = %e,
                            "Skipping undecodable output"
                        );
                        skipped += 1;
                    }
                },
            }
        }

        artifacts.extend(page.inputs.entries.iter().map(|raw| self.decoder.decode_input(raw)));
        artifacts.extend(
            page.reports
                .entries
                .iter()
                .map(|raw| self.decoder.decode_report(raw)),
        );

        Ok((artifacts, skipped))
    }

    fn stop(&self) {
        info!("Synchronizer stopped");
        self.set_state(SyncState::Stopped);
    }

    fn set_state(&self, state: SyncState) {
        self.state_tx.send_replace(state);
    }
}
