//! GraphQL query composition
//!
//! One request covers every enabled stream. Cursors travel as variables, so an
//! absent cursor is a `null` `after` argument and the connection starts from its
//! first edge.

use crate::config::StreamSelection;
use crate::types::{CursorTriple, Stream};
use serde::Serialize;
use serde_json::{Map, Value};

const PAGE_INFO_SELECTION: &str = "pageInfo { startCursor endCursor hasNextPage hasPreviousPage }";

const OUTPUT_NODE_SELECTION: &str = "index blob inputIndex \
proofByInputIndexAndOutputIndex { \
validityOutputIndexWithinInput validityOutputHashesRootHash \
validityOutputHashesInEpochSiblings validityOutputHashInOutputHashesSiblings \
validityOutputEpochRootHash validityMachineStateHash validityInputIndexWithinEpoch }";

const INPUT_NODE_SELECTION: &str = "index blob";

const REPORT_NODE_SELECTION: &str = "index inputIndex blob";

/// Body of a GraphQL POST request
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// Operation name, matching the `query` text
    pub operation_name: &'static str,
    /// Query document
    pub query: String,
    /// Variable values (`batchSize` plus one `after` cursor per enabled stream)
    pub variables: Value,
}

/// Builds the sync page query for a batch size and a set of enabled streams
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    batch_size: u32,
    streams: StreamSelection,
}

impl QueryBuilder {
    /// Operation name used in every request
    pub const OPERATION_NAME: &'static str = "SyncPage";

    /// Create a builder requesting at most `batch_size` entries per stream
    pub fn new(batch_size: u32, streams: StreamSelection) -> Self {
        Self {
            batch_size,
            streams,
        }
    }

    /// Streams this builder requests
    pub fn streams(&self) -> StreamSelection {
        self.streams
    }

    /// Compose the request for the given cursors
    pub fn build(&self, cursors: &CursorTriple) -> GraphqlRequest {
        let enabled = self.enabled();

        let mut declarations = vec!["$batchSize: Int!".to_string()];
        let mut selections = Vec::with_capacity(enabled.len());
        let mut variables = Map::new();
        variables.insert("batchSize".into(), Value::from(self.batch_size));

        for stream in enabled {
            let var = after_variable(stream);
            declarations.push(format!("${var}: Cursor"));
            selections.push(format!(
                "{field}(first: $batchSize, after: ${var}) {{ edges {{ cursor node {{ {node} }} }} {PAGE_INFO_SELECTION} }}",
                field = stream.as_str(),
                node = node_selection(stream),
            ));
            variables.insert(
                var.into(),
                cursors
                    .get(stream)
                    .map_or(Value::Null, |c| Value::String(c.to_string())),
            );
        }

        GraphqlRequest {
            operation_name: Self::OPERATION_NAME,
            query: format!(
                "query {}({}) {{ {} }}",
                Self::OPERATION_NAME,
                declarations.join(", "),
                selections.join(" ")
            ),
            variables: Value::Object(variables),
        }
    }

    fn enabled(&self) -> Vec<Stream> {
        Stream::ALL
            .into_iter()
            .filter(|s| match s {
                Stream::Outputs => self.streams.outputs,
                Stream::Inputs => self.streams.inputs,
                Stream::Reports => self.streams.reports,
            })
            .collect()
    }
}

fn after_variable(stream: Stream) -> &'static str {
    match stream {
        Stream::Outputs => "outputsAfter",
        Stream::Inputs => "inputsAfter",
        Stream::Reports => "reportsAfter",
    }
}

fn node_selection(stream: Stream) -> &'static str {
    match stream {
        Stream::Outputs => OUTPUT_NODE_SELECTION,
        Stream::Inputs => INPUT_NODE_SELECTION,
        Stream::Reports => REPORT_NODE_SELECTION,
    }
}
