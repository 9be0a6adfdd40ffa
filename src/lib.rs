//! # rollup-sync
//!
//! Cursor-based synchronizer that mirrors a rollup node's outputs, inputs and reports
//! into SQLite.
//!
//! ## Design Philosophy
//!
//! rollup-sync is designed to be:
//! - **Crash-consistent** - Artifacts and the cursors that unlocked them are committed
//!   in one transaction; a restart resumes from the last commit
//! - **Idempotent** - Re-delivered pages never duplicate rows
//! - **Patient** - An unreachable upstream is retried forever at a fixed interval
//! - **Library-first** - No CLI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use rollup_sync::{Config, SyncService, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.upstream.graphql_url = "http://localhost:5000/graphql".to_string();
//!
//!     let service = SyncService::new(config).await?;
//!
//!     // Runs until SIGTERM/SIGINT or until the synchronizer halts
//!     run_with_shutdown(service).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Output, input and report decoding
pub mod decoder;
/// Error types
pub mod error;
/// Upstream page fetching
pub mod fetch;
/// GraphQL query composition
pub mod query;
/// Progress record retention
pub mod retention;
/// Service wiring and lifecycle
pub mod service;
/// Progress store seam
pub mod store;
/// The synchronizer loop
pub mod synchronizer;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, DecodeFailurePolicy, EncodingMode, StreamSelection};
pub use db::Database;
pub use decoder::ArtifactDecoder;
pub use error::{DatabaseError, DecodeError, Error, Result};
pub use fetch::{Fetcher, GraphqlFetcher};
pub use query::{GraphqlRequest, QueryBuilder};
pub use retention::RetentionTask;
pub use service::SyncService;
pub use store::ProgressStore;
pub use synchronizer::{CycleOutcome, Synchronizer};
pub use types::{
    Artifact, CompletionStatus, CursorTriple, Input, Notice, Page, Report, SyncProgress,
    SyncState, Voucher,
};

/// Helper function to run the service with graceful signal handling.
///
/// Starts the service, then waits for a termination signal or for the synchronizer to
/// halt on its own, and finally calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Errors
/// Returns the startup error, or the decode/persistence error that halted the
/// synchronizer.
pub async fn run_with_shutdown(service: SyncService) -> Result<()> {
    service.start().await?;

    tokio::select! {
        _ = wait_for_signal() => {}
        _ = service.stopped() => {
            tracing::warn!("Synchronizer stopped without a shutdown signal");
        }
    }

    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
