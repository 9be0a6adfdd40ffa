//! Core types for rollup-sync

use serde::{Deserialize, Serialize};

/// One of the three upstream collections
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Vouchers and notices
    Outputs,
    /// Inputs sent to the application
    Inputs,
    /// Diagnostic reports attached to inputs
    Reports,
}

impl Stream {
    /// All streams, in the order a page is decoded
    pub const ALL: [Stream; 3] = [Stream::Outputs, Stream::Inputs, Stream::Reports];

    /// Name of the GraphQL connection field for this stream
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Outputs => "outputs",
            Stream::Inputs => "inputs",
            Stream::Reports => "reports",
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of the synchronizer in each stream
///
/// `None` means "from the beginning". Cursors are opaque upstream tokens; they are
/// only ever replaced by a later token, never cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorTriple {
    /// Cursor of the last committed output page
    pub outputs: Option<String>,
    /// Cursor of the last committed input page
    pub inputs: Option<String>,
    /// Cursor of the last committed report page
    pub reports: Option<String>,
}

impl CursorTriple {
    /// Cursor for one stream
    pub fn get(&self, stream: Stream) -> Option<&str> {
        match stream {
            Stream::Outputs => self.outputs.as_deref(),
            Stream::Inputs => self.inputs.as_deref(),
            Stream::Reports => self.reports.as_deref(),
        }
    }

    /// Replace the cursor for one stream
    pub fn set(&mut self, stream: Stream, cursor: String) {
        match stream {
            Stream::Outputs => self.outputs = Some(cursor),
            Stream::Inputs => self.inputs = Some(cursor),
            Stream::Reports => self.reports = Some(cursor),
        }
    }

    /// True if no stream has been synchronized yet
    pub fn is_empty(&self) -> bool {
        self.outputs.is_none() && self.inputs.is_none() && self.reports.is_none()
    }
}

/// Payload encoding generation of an output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Legacy ABI tuple without a kind selector
    V1,
    /// Kind selector followed by the ABI tuple
    V2,
}

/// Relay pagination info of one stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    /// Cursor of the first edge in the page
    pub start_cursor: Option<String>,
    /// Cursor of the last edge in the page
    pub end_cursor: Option<String>,
    /// More entries exist after `end_cursor`
    pub has_next_page: bool,
    /// Entries exist before `start_cursor`
    pub has_previous_page: bool,
}

/// Entries of one stream within a page, in source order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamPage<T> {
    /// Raw entries
    pub entries: Vec<T>,
    /// Pagination info
    pub page_info: PageInfo,
}

impl<T> Default for StreamPage<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            page_info: PageInfo::default(),
        }
    }
}

impl<T> StreamPage<T> {
    /// Cursor this stream moves to once the page is committed, if it moves at all
    ///
    /// A stream advances when the upstream reports more data or the page carried at
    /// least one entry. An empty terminal page, or a page without an end cursor,
    /// leaves the stream where it is.
    pub fn next_cursor(&self) -> Option<&str> {
        let end = self.page_info.end_cursor.as_deref().filter(|c| !c.is_empty())?;
        if self.page_info.has_next_page || !self.entries.is_empty() {
            Some(end)
        } else {
            None
        }
    }
}

/// Proof-of-validity fields attached to an output node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputProof {
    /// Position of the output among its input's outputs
    pub validity_output_index_within_input: Option<u64>,
    /// Root of the input's output hashes
    pub validity_output_hashes_root_hash: Option<String>,
    /// Siblings proving the output hashes root within the epoch
    pub validity_output_hashes_in_epoch_siblings: Option<Vec<String>>,
    /// Siblings proving the output hash within the output hashes
    pub validity_output_hash_in_output_hashes_siblings: Option<Vec<String>>,
    /// Epoch root of all output hashes
    pub validity_output_epoch_root_hash: Option<String>,
    /// Machine state hash at the end of the epoch
    pub validity_machine_state_hash: Option<String>,
    /// Position of the input within its epoch
    pub validity_input_index_within_epoch: Option<u64>,
}

/// Undecoded output entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawOutput {
    /// Global output index
    pub index: u64,
    /// Index of the input that produced the output
    pub input_index: u64,
    /// 0x-prefixed hex payload
    pub blob: String,
    /// Edge cursor
    pub cursor: Option<String>,
    /// Encoding generation when the upstream states it explicitly
    pub encoding: Option<PayloadEncoding>,
    /// Proof-of-validity fields, when the upstream has them
    pub proof: Option<OutputProof>,
}

/// Undecoded input entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawInput {
    /// Global input index
    pub index: u64,
    /// 0x-prefixed hex blob
    pub blob: String,
    /// Edge cursor
    pub cursor: Option<String>,
}

/// Undecoded report entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawReport {
    /// Global report index
    pub index: u64,
    /// Index of the input the report belongs to
    pub input_index: u64,
    /// 0x-prefixed hex blob
    pub blob: String,
    /// Edge cursor
    pub cursor: Option<String>,
}

/// One fetch result: a page of every requested stream
///
/// Streams that were not requested stay empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    /// Output entries
    pub outputs: StreamPage<RawOutput>,
    /// Input entries
    pub inputs: StreamPage<RawInput>,
    /// Report entries
    pub reports: StreamPage<RawReport>,
}

impl Page {
    /// Number of raw entries across all streams
    pub fn len(&self) -> usize {
        self.outputs.entries.len() + self.inputs.entries.len() + self.reports.entries.len()
    }

    /// True if no stream carried an entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor triple after committing this page on top of `before`
    pub fn advance(&self, before: &CursorTriple) -> CursorTriple {
        let mut after = before.clone();
        if let Some(cursor) = self.outputs.next_cursor() {
            after.set(Stream::Outputs, cursor.to_string());
        }
        if let Some(cursor) = self.inputs.next_cursor() {
            after.set(Stream::Inputs, cursor.to_string());
        }
        if let Some(cursor) = self.reports.next_cursor() {
            after.set(Stream::Reports, cursor.to_string());
        }
        after
    }
}

/// Processing status of an input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Not processed yet
    Unprocessed,
    /// Processed and accepted
    Accepted,
    /// Processed and rejected
    Rejected,
    /// Processing raised an exception
    Exception,
}

impl CompletionStatus {
    /// Stable text stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Unprocessed => "unprocessed",
            CompletionStatus::Accepted => "accepted",
            CompletionStatus::Rejected => "rejected",
            CompletionStatus::Exception => "exception",
        }
    }

    /// Parse the stored text, `None` for anything [`as_str`](Self::as_str) never produces
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "unprocessed" => Some(CompletionStatus::Unprocessed),
            "accepted" => Some(CompletionStatus::Accepted),
            "rejected" => Some(CompletionStatus::Rejected),
            "exception" => Some(CompletionStatus::Exception),
            _ => None,
        }
    }
}

/// Decoded value/call transfer instruction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Index of the producing input
    pub input_index: u64,
    /// Global output index
    pub output_index: u64,
    /// 0x-prefixed lowercase destination address
    pub destination: String,
    /// Transferred value in wei, decimal
    pub value: String,
    /// V2 payload (selector included), 0x-prefixed hex
    pub payload: String,
    /// Whether the voucher was executed on-chain
    pub executed: bool,
    /// Proof-of-validity fields
    pub proof: Option<OutputProof>,
}

/// Decoded opaque output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Index of the producing input
    pub input_index: u64,
    /// Global output index
    pub output_index: u64,
    /// V2 payload (selector included), 0x-prefixed hex
    pub payload: String,
    /// Proof-of-validity fields
    pub proof: Option<OutputProof>,
}

/// Fields of an `EvmAdvance` input blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceMetadata {
    /// 0x-prefixed lowercase sender address
    pub msg_sender: String,
    /// Block the input was added in
    pub block_number: u64,
    /// Unix timestamp of that block
    pub block_timestamp: i64,
    /// PREVRANDAO of that block, decimal
    pub prev_randao: String,
    /// Application payload, 0x-prefixed hex
    pub payload: String,
}

/// Decoded input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Global input index
    pub index: u64,
    /// Raw blob as delivered
    pub blob: String,
    /// Processing status
    pub status: CompletionStatus,
    /// Advance fields, when the blob is an `EvmAdvance` call
    pub metadata: Option<AdvanceMetadata>,
}

/// Decoded report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Index of the input the report belongs to
    pub input_index: u64,
    /// Global report index
    pub index: u64,
    /// Raw blob as delivered
    pub blob: String,
}

/// Anything the decoder produces
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    /// Output with a destination
    Voucher(Voucher),
    /// Output without a destination
    Notice(Notice),
    /// Application input
    Input(Input),
    /// Diagnostic report
    Report(Report),
}

impl Artifact {
    /// `"input:output"` id for outputs, used in the progress audit log
    pub fn output_id(&self) -> Option<String> {
        match self {
            Artifact::Voucher(v) => Some(format!("{}:{}", v.input_index, v.output_index)),
            Artifact::Notice(n) => Some(format!("{}:{}", n.input_index, n.output_index)),
            Artifact::Input(_) | Artifact::Report(_) => None,
        }
    }
}

/// One entry of the append-only sync progress log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncProgress {
    /// Database id (monotonic)
    pub id: i64,
    /// Unix timestamp in milliseconds when the record was written
    pub timestamp_ms: i64,
    /// Cursors before the commit
    pub before: CursorTriple,
    /// Cursors after the commit
    pub after: CursorTriple,
    /// `;`-separated `"input:output"` ids of the committed outputs
    pub output_ids: String,
}

/// Where the synchronizer loop currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Loading the last committed cursors
    Starting,
    /// Fetching a page
    Polling,
    /// Decoding a fetched page
    Decoding,
    /// Committing artifacts and cursors
    Persisting,
    /// Waiting for the next poll
    Sleeping,
    /// Terminal
    Stopped,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn page_info(end: Option<&str>, has_next_page: bool) -> PageInfo {
        PageInfo {
            start_cursor: None,
            end_cursor: end.map(str::to_string),
            has_next_page,
            has_previous_page: false,
        }
    }

    fn report(index: u64) -> RawReport {
        RawReport {
            index,
            input_index: 0,
            blob: "0x".into(),
            cursor: None,
        }
    }

    #[test]
    fn test_stream_advances_when_entries_present() {
        let page = StreamPage {
            entries: vec![report(1)],
            page_info: page_info(Some("c1"), false),
        };
        assert_eq!(page.next_cursor(), Some("c1"));
    }

    #[test]
    fn test_stream_advances_when_more_pages_exist() {
        let page: StreamPage<RawReport> = StreamPage {
            entries: vec![],
            page_info: page_info(Some("c2"), true),
        };
        assert_eq!(page.next_cursor(), Some("c2"));
    }

    #[test]
    fn test_empty_terminal_page_does_not_advance() {
        let page: StreamPage<RawReport> = StreamPage {
            entries: vec![],
            page_info: page_info(Some("c3"), false),
        };
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn test_missing_or_blank_end_cursor_does_not_advance() {
        let page = StreamPage {
            entries: vec![report(1)],
            page_info: page_info(None, false),
        };
        assert_eq!(page.next_cursor(), None);

        let page = StreamPage {
            entries: vec![report(1)],
            page_info: page_info(Some(""), true),
        };
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn test_page_advance_keeps_untouched_streams() {
        let before = CursorTriple {
            outputs: Some("o0".into()),
            inputs: Some("i0".into()),
            reports: None,
        };
        let page = Page {
            reports: StreamPage {
                entries: vec![report(4)],
                page_info: page_info(Some("r1"), false),
            },
            ..Default::default()
        };

        let after = page.advance(&before);

        assert_eq!(after.outputs.as_deref(), Some("o0"));
        assert_eq!(after.inputs.as_deref(), Some("i0"));
        assert_eq!(after.reports.as_deref(), Some("r1"));
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_completion_status_text() {
        for status in [
            CompletionStatus::Unprocessed,
            CompletionStatus::Accepted,
            CompletionStatus::Rejected,
            CompletionStatus::Exception,
        ] {
            assert_eq!(CompletionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CompletionStatus::parse("garbage"), None);
        assert_eq!(CompletionStatus::parse(""), None);
    }
}
