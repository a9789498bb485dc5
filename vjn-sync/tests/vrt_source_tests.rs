//! VRT playlist source against a mock GraphQL endpoint

use serde_json::{json, Value};
use std::time::Duration;
use vjn_common::PlaylistEntry;
use vjn_sync::source::{PlaylistSource, VrtPlaylistSource};
use vjn_sync::Error;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn song(title: &str, artist: &str) -> Value {
    json!({ "node": { "title": title, "description": artist, "active": false } })
}

fn playlist_document(edges: Vec<Value>) -> Value {
    json!({
        "data": {
            "component": {
                "components": [
                    { "title": "Header" },
                    { "paginatedItems": { "edges": edges } }
                ]
            }
        }
    })
}

fn source_for(server: &MockServer) -> VrtPlaylistSource {
    VrtPlaylistSource::with_url(format!("{}/graphql", server.uri()), Duration::from_secs(2))
        .unwrap()
}

#[tokio::test]
async fn test_fetch_returns_play_order_and_skips_malformed() {
    let server = MockServer::start().await;
    let document = playlist_document(vec![
        song("Hey Ya!", "Outkast"),
        json!({ "node": { "title": "No Artist" } }),
        song("Crazy in Love", "Beyonce"),
        json!({ "node": { "title": "   ", "description": "Blank Title" } }),
        song("Toxic", "Britney Spears"),
    ]);

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("x-vrt-client-name", "WEB"))
        .and(body_partial_json(json!({
            "operationName": "component",
            "variables": { "lazyItemCount": 30 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .expect(1)
        .mount(&server)
        .await;

    let source = source_for(&server);
    let entries = source.fetch().await.unwrap();

    assert_eq!(
        entries,
        vec![
            PlaylistEntry::new("Britney Spears", "Toxic"),
            PlaylistEntry::new("Beyonce", "Crazy in Love"),
            PlaylistEntry::new("Outkast", "Hey Ya!"),
        ]
    );

    let diagnostics = source.last_fetch().expect("diagnostics recorded");
    assert_eq!(diagnostics.entries, 3);
    assert_eq!(diagnostics.skipped, 2);
}

#[tokio::test]
async fn test_empty_playlist_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(playlist_document(Vec::new())))
        .mount(&server)
        .await;

    let entries = source_for(&server).fetch().await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_http_error_is_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let source = source_for(&server);
    let result = source.fetch().await;
    assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    assert!(source.last_fetch().is_none());
}

#[tokio::test]
async fn test_graphql_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "component": null },
            "errors": [{ "message": "component not found" }]
        })))
        .mount(&server)
        .await;

    match source_for(&server).fetch().await {
        Err(Error::SourceUnavailable(msg)) => assert!(msg.contains("component not found")),
        other => panic!("Expected SourceUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_is_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = source_for(&server).fetch().await;
    assert!(matches!(result, Err(Error::SourceUnavailable(_))));
}
