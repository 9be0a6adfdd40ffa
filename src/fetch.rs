//! Upstream page fetching
//!
//! [`Fetcher`] is the seam between the synchronizer and the network. The production
//! implementation, [`GraphqlFetcher`], performs exactly one HTTP POST per call and
//! never retries; retry policy belongs to the synchronizer loop.

use crate::config::{StreamSelection, UpstreamConfig};
use crate::error::{Error, Result};
use crate::query::GraphqlRequest;
use crate::types::{
    OutputProof, Page, PageInfo, PayloadEncoding, RawInput, RawOutput, RawReport, StreamPage,
};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Source of sync pages
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute one page request.
    ///
    /// `streams` names the collections the request asked for; a response missing one
    /// of them is a protocol error.
    ///
    /// # Errors
    /// - [`Error::Transport`] when the upstream cannot be reached or times out
    /// - [`Error::Protocol`] when the response is not a well-formed page
    async fn fetch(&self, request: &GraphqlRequest, streams: StreamSelection) -> Result<Page>;
}

/// Fetches pages from a rollup node's GraphQL endpoint
pub struct GraphqlFetcher {
    /// HTTP client with the configured timeout
    http_client: reqwest::Client,

    /// GraphQL endpoint
    url: String,
}

impl GraphqlFetcher {
    /// Create a fetcher for the configured endpoint
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: config.graphql_url.clone(),
        })
    }

    /// Endpoint this fetcher talks to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fetcher for GraphqlFetcher {
    async fn fetch(&self, request: &GraphqlRequest, streams: StreamSelection) -> Result<Page> {
        debug!(url = %self.url, variables = %request.variables, "Querying upstream");

        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                Error::Transport(format!(
                    "failed to reach {} (is the rollup node running?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Protocol(format!(
                "{} answered with HTTP {}",
                self.url, status
            )));
        }

        let body = response.text().await.map_err(|e| {
            Error::Transport(format!("failed to read response from {}: {}", self.url, e))
        })?;

        parse_page(&body, streams)
    }
}

/// Parse a GraphQL response body into a [`Page`]
pub(crate) fn parse_page(body: &str, streams: StreamSelection) -> Result<Page> {
    let response: GraphqlResponse = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("malformed GraphQL response: {}", e)))?;

    if let Some(first) = response.errors.first() {
        return Err(Error::Protocol(format!(
            "upstream returned {} GraphQL error(s), first: {}",
            response.errors.len(),
            first.message
        )));
    }

    let data = response
        .data
        .ok_or_else(|| Error::Protocol("GraphQL response has no data".to_string()))?;

    let outputs = take_stream(data.outputs, streams.outputs, "outputs")?;
    let inputs = take_stream(data.inputs, streams.inputs, "inputs")?;
    let reports = take_stream(data.reports, streams.reports, "reports")?;

    Ok(Page {
        outputs: convert(outputs, |edge| RawOutput {
            index: edge.node.index,
            input_index: edge.node.input_index,
            blob: edge.node.blob,
            cursor: edge.cursor,
            encoding: edge.node.encoding,
            proof: edge.node.proof_by_input_index_and_output_index,
        }),
        inputs: convert(inputs, |edge| RawInput {
            index: edge.node.index,
            blob: edge.node.blob,
            cursor: edge.cursor,
        }),
        reports: convert(reports, |edge| RawReport {
            index: edge.node.index,
            input_index: edge.node.input_index,
            blob: edge.node.blob,
            cursor: edge.cursor,
        }),
    })
}

fn take_stream<N>(
    connection: Option<Connection<N>>,
    requested: bool,
    name: &str,
) -> Result<Option<Connection<N>>> {
    match (connection, requested) {
        (None, true) => Err(Error::Protocol(format!(
            "GraphQL response is missing the {} connection",
            name
        ))),
        (connection, true) => Ok(connection),
        // Anything the request did not ask for is ignored.
        (_, false) => Ok(None),
    }
}

fn convert<N, T>(
    connection: Option<Connection<N>>,
    to_entry: impl FnMut(Edge<N>) -> T,
) -> StreamPage<T> {
    match connection {
        Some(connection) => StreamPage {
            entries: connection.edges.into_iter().map(to_entry).collect(),
            page_info: connection.page_info,
        },
        None => StreamPage::default(),
    }
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<PageData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct PageData {
    outputs: Option<Connection<OutputNode>>,
    inputs: Option<Connection<InputNode>>,
    reports: Option<Connection<ReportNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<N> {
    edges: Vec<Edge<N>>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct Edge<N> {
    #[serde(default)]
    cursor: Option<String>,
    node: N,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputNode {
    #[serde(deserialize_with = "index_from_number_or_string")]
    index: u64,
    #[serde(deserialize_with = "index_from_number_or_string")]
    input_index: u64,
    blob: String,
    #[serde(default)]
    encoding: Option<PayloadEncoding>,
    #[serde(default)]
    proof_by_input_index_and_output_index: Option<OutputProof>,
}

#[derive(Deserialize)]
struct InputNode {
    #[serde(deserialize_with = "index_from_number_or_string")]
    index: u64,
    blob: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportNode {
    #[serde(deserialize_with = "index_from_number_or_string")]
    index: u64,
    #[serde(deserialize_with = "index_from_number_or_string")]
    input_index: u64,
    blob: String,
}

// Indexes are BigInt columns upstream and may arrive as JSON strings
fn index_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
