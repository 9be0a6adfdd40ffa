//! Test configuration helpers

use rollup_sync::Config;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration pointing at `graphql_url` with a database inside `dir`
///
/// Polls every 20ms so tests do not wait on the production interval.
pub fn test_config(dir: &TempDir, graphql_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.graphql_url = graphql_url.to_string();
    config.upstream.request_timeout = Duration::from_secs(2);
    config.sync.poll_interval = Duration::from_millis(20);
    config.persistence.database_path = dir.path().join("rollup-sync.db");
    config
}

/// A URL nothing listens on
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}/graphql", port)
}
