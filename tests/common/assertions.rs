//! Custom waits and assertions for integration tests

use rollup_sync::SyncState;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Poll `condition` until it returns true or `timeout` elapses
///
/// Returns whether the condition was met.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Wait until the synchronizer reports `expected`
pub async fn wait_for_state(
    states: &mut watch::Receiver<SyncState>,
    expected: SyncState,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, states.wait_for(|state| *state == expected))
        .await
        .is_ok_and(|result| result.is_ok())
}
