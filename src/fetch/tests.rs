use super::*;
use crate::query::QueryBuilder;
use crate::types::CursorTriple;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FULL_PAGE: &str = r#"{
    "data": {
        "outputs": {
            "pageInfo": {
                "startCursor": "output_start_1",
                "endCursor": "output_end_1",
                "hasNextPage": true,
                "hasPreviousPage": false
            },
            "edges": [
                { "cursor": "output_cursor_1", "node": { "index": 1, "blob": "0x1a2b3c", "inputIndex": 1 } },
                { "cursor": "output_cursor_2", "node": { "index": "2", "blob": "0x4d5e6f", "inputIndex": "2",
                  "proofByInputIndexAndOutputIndex": {
                      "validityOutputIndexWithinInput": 0,
                      "validityMachineStateHash": "0xabc",
                      "validityOutputHashesInEpochSiblings": ["0x01", "0x02"]
                  } } }
            ]
        },
        "inputs": {
            "pageInfo": { "startCursor": "input_start_1", "endCursor": "input_end_1",
                          "hasNextPage": false, "hasPreviousPage": false },
            "edges": [
                { "cursor": "input_cursor_1", "node": { "index": 1, "blob": "0x7a8b9c" } }
            ]
        },
        "reports": {
            "pageInfo": { "startCursor": "report_start_1", "endCursor": "report_end_1",
                          "hasNextPage": false, "hasPreviousPage": true },
            "edges": [
                { "node": { "index": 1, "inputIndex": 1, "blob": "0x123456" } }
            ]
        }
    }
}"#;

fn upstream_config(url: String) -> UpstreamConfig {
    UpstreamConfig {
        graphql_url: url,
        request_timeout: Duration::from_millis(500),
        user_agent: "rollup-sync-test".to_string(),
    }
}

async fn fetch_from(server: &MockServer, streams: StreamSelection) -> Result<Page> {
    let fetcher = GraphqlFetcher::new(&upstream_config(format!("{}/graphql", server.uri())))
        .expect("client builds");
    let request = QueryBuilder::new(10, streams).build(&CursorTriple::default());
    fetcher.fetch(&request, streams).await
}

#[test]
fn test_parse_full_page() {
    let page = parse_page(FULL_PAGE, StreamSelection::ALL).unwrap();

    assert_eq!(page.outputs.entries.len(), 2);
    assert_eq!(page.outputs.entries[0].index, 1);
    assert_eq!(page.outputs.entries[0].blob, "0x1a2b3c");
    assert_eq!(
        page.outputs.entries[0].cursor.as_deref(),
        Some("output_cursor_1")
    );
    assert_eq!(page.outputs.entries[1].index, 2, "string index must parse");
    assert_eq!(page.outputs.entries[1].input_index, 2);
    let proof = page.outputs.entries[1].proof.as_ref().expect("proof parsed");
    assert_eq!(proof.validity_output_index_within_input, Some(0));
    assert_eq!(proof.validity_machine_state_hash.as_deref(), Some("0xabc"));
    assert_eq!(
        proof.validity_output_hashes_in_epoch_siblings,
        Some(vec!["0x01".to_string(), "0x02".to_string()])
    );
    assert!(page.outputs.page_info.has_next_page);
    assert_eq!(
        page.outputs.page_info.end_cursor.as_deref(),
        Some("output_end_1")
    );

    assert_eq!(page.inputs.entries.len(), 1);
    assert_eq!(page.inputs.entries[0].blob, "0x7a8b9c");

    assert_eq!(page.reports.entries.len(), 1);
    assert_eq!(page.reports.entries[0].input_index, 1);
    assert!(page.reports.entries[0].cursor.is_none());
    assert!(page.reports.page_info.has_previous_page);
}

#[test]
fn test_parse_ignores_unrequested_streams() {
    let page = parse_page(FULL_PAGE, StreamSelection::OUTPUTS_ONLY).unwrap();

    assert_eq!(page.outputs.entries.len(), 2);
    assert!(page.inputs.entries.is_empty());
    assert!(page.reports.entries.is_empty());
    assert_eq!(page.inputs.page_info, PageInfo::default());
}

#[test]
fn test_parse_missing_requested_stream_is_protocol_error() {
    let body = r#"{ "data": { "outputs": { "edges": [], "pageInfo": { "hasNextPage": false } } } }"#;

    let err = parse_page(body, StreamSelection::ALL).unwrap_err();
    assert!(matches!(err, Error::Protocol(ref m) if m.contains("inputs")), "{err}");
}

#[test]
fn test_parse_graphql_errors_is_protocol_error() {
    let body = r#"{ "data": null, "errors": [ { "message": "relation \"outputs\" does not exist" } ] }"#;

    let err = parse_page(body, StreamSelection::ALL).unwrap_err();
    match err {
        Error::Protocol(message) => assert!(message.contains("does not exist")),
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[test]
fn test_parse_garbage_is_protocol_error() {
    assert!(matches!(
        parse_page("<html>502 Bad Gateway</html>", StreamSelection::ALL),
        Err(Error::Protocol(_))
    ));
    assert!(matches!(
        parse_page(r#"{ "data": null }"#, StreamSelection::ALL),
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_fetch_posts_query_and_parses_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(serde_json::json!({
            "operationName": "SyncPage",
            "variables": { "batchSize": 10, "outputsAfter": null }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(FULL_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetch_from(&server, StreamSelection::ALL).await.unwrap();
    assert_eq!(page.len(), 4);
}

#[tokio::test]
async fn test_fetch_bad_status_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = fetch_from(&server, StreamSelection::ALL).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ref m) if m.contains("503")), "{err}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_timeout_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FULL_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = fetch_from(&server, StreamSelection::ALL).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err}");
}

#[tokio::test]
async fn test_fetch_unreachable_is_transport_error() {
    // Bind and drop a listener to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let fetcher =
        GraphqlFetcher::new(&upstream_config(format!("http://127.0.0.1:{port}/graphql"))).unwrap();
    let request = QueryBuilder::new(10, StreamSelection::ALL).build(&CursorTriple::default());

    let err = fetcher
        .fetch(&request, StreamSelection::ALL)
        .await
        .unwrap_err();
    match err {
        Error::Transport(message) => assert!(message.contains(fetcher.url())),
        other => panic!("expected transport error, got {other:?}"),
    }
}
