//! GraphQL page fixtures and payload generators

use ethers_core::abi::{Token, encode};
use ethers_core::types::{Address, U256};
use serde_json::{Value, json};

/// Destination used by generated vouchers
pub const DESTINATION: [u8; 20] = [0xab; 20];

/// Legacy (selector-less) voucher payload as 0x-hex
pub fn legacy_voucher_blob(value: u64, payload: &[u8]) -> String {
    let legacy = encode(&[
        Token::Address(Address::from_slice(&DESTINATION)),
        Token::Uint(U256::from(value)),
        Token::Bytes(payload.to_vec()),
    ]);
    format!("0x{}", hex::encode(legacy))
}

/// Legacy (selector-less) notice payload as 0x-hex
pub fn legacy_notice_blob(payload: &[u8]) -> String {
    let legacy = encode(&[Token::Bytes(payload.to_vec())]);
    format!("0x{}", hex::encode(legacy))
}

/// Output edge
pub fn output_edge(index: u64, input_index: u64, blob: &str) -> Value {
    json!({
        "cursor": format!("output-{}", index),
        "node": { "index": index, "inputIndex": input_index, "blob": blob }
    })
}

/// Input edge
pub fn input_edge(index: u64, blob: &str) -> Value {
    json!({
        "cursor": format!("input-{}", index),
        "node": { "index": index, "blob": blob }
    })
}

/// Report edge
pub fn report_edge(index: u64, input_index: u64, blob: &str) -> Value {
    json!({
        "cursor": format!("report-{}", index),
        "node": { "index": index, "inputIndex": input_index, "blob": blob }
    })
}

/// Relay connection with the given edges
pub fn connection(edges: Vec<Value>, end_cursor: Option<&str>, has_next_page: bool) -> Value {
    json!({
        "edges": edges,
        "pageInfo": {
            "startCursor": null,
            "endCursor": end_cursor,
            "hasNextPage": has_next_page,
            "hasPreviousPage": false
        }
    })
}

/// Full GraphQL response body for one sync page
pub fn page_body(outputs: Value, inputs: Value, reports: Value) -> Value {
    json!({ "data": { "outputs": outputs, "inputs": inputs, "reports": reports } })
}

/// Response of an upstream with nothing new
pub fn empty_page_body() -> Value {
    page_body(
        connection(vec![], None, false),
        connection(vec![], None, false),
        connection(vec![], None, false),
    )
}
