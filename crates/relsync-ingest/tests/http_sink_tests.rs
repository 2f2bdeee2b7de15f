//! HttpSink against a mock ingestion service

use relsync_ingest::entities;
use relsync_ingest::sink::{BatchSink, HttpSink, IngestionStatus};
use relsync_ingest::IngestError;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink(server: &MockServer) -> HttpSink {
    HttpSink::new(server.uri(), Some("secret".to_string()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_missing_table_is_created() {
    let server = MockServer::start().await;
    let schema = entities::find("Release").unwrap().schema();

    Mock::given(method("GET"))
        .and(path("/v1/tables/Release"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/tables/Release"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    sink(&server).ensure_table(&schema).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(body["table"], "Release");
    assert_eq!(body["mapping"], "Release_mapping");
    assert!(body["columns"].as_array().unwrap().len() > 5);
}

#[tokio::test]
async fn test_existing_table_is_left_alone() {
    let server = MockServer::start().await;
    let schema = entities::find("Release").unwrap().schema();

    Mock::given(method("GET"))
        .and(path("/v1/tables/Release"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "table": "Release" })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    sink(&server).ensure_table(&schema).await.unwrap();
}

#[tokio::test]
async fn test_table_lookup_error_is_sink_error() {
    let server = MockServer::start().await;
    let schema = entities::find("Release").unwrap().schema();

    Mock::given(method("GET"))
        .and(path("/v1/tables/Release"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let result = sink(&server).ensure_table(&schema).await;

    assert!(matches!(result, Err(IngestError::Sink(msg)) if msg.contains("403")));
}

#[tokio::test]
async fn test_ingest_posts_ndjson_with_table_and_mapping() {
    let server = MockServer::start().await;
    let schema = entities::find("ReleaseDefinition").unwrap().schema();
    let ndjson = b"{\"id\":1}\n{\"id\":2}\n".to_vec();

    Mock::given(method("POST"))
        .and(path("/v1/ingest"))
        .and(query_param("table", "ReleaseDefinition"))
        .and(query_param("mapping", "ReleaseDefinition_mapping"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string("{\"id\":1}\n{\"id\":2}\n"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = sink(&server).ingest(&schema, ndjson).await.unwrap();

    assert_eq!(receipt.table, "ReleaseDefinition");
    assert_eq!(receipt.rows, 2);
    assert_eq!(receipt.bytes, 18);

    let requests = server.received_requests().await.unwrap();
    let sent_id = requests[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "ingestionId")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(sent_id, receipt.ingestion_id.to_string());
}

#[tokio::test]
async fn test_rejected_ingest_is_sink_error() {
    let server = MockServer::start().await;
    let schema = entities::find("ReleaseDefinition").unwrap().schema();

    Mock::given(method("POST"))
        .and(path("/v1/ingest"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cluster busy"))
        .mount(&server)
        .await;

    let result = sink(&server).ingest(&schema, b"{}\n".to_vec()).await;

    assert!(matches!(result, Err(IngestError::Sink(msg)) if msg.contains("cluster busy")));
}

#[tokio::test]
async fn test_notifications_are_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/ingest/notifications"))
        .and(query_param("table", "Release"))
        .and(query_param("limit", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "successes": [
                { "ingestionId": "a1", "table": "Release", "status": "succeeded" }
            ],
            "failures": [
                {
                    "ingestionId": "b2",
                    "table": "ReleaseArtifact",
                    "status": "failed",
                    "message": "mapping mismatch",
                    "timestamp": "2024-05-01T12:00:00Z"
                }
            ]
        })))
        .mount(&server)
        .await;

    let report = sink(&server).notifications("Release", 25).await.unwrap();

    assert_eq!(report.successes.len(), 1);
    assert_eq!(report.successes[0].ingestion_id.as_deref(), Some("a1"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].status, IngestionStatus::Failed);
    assert_eq!(report.failures[0].message.as_deref(), Some("mapping mismatch"));
    assert!(report.failures[0].timestamp.is_some());
}
