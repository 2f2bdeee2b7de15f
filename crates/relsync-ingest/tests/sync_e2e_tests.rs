//! Full sync from a mock DevOps API into a local directory sink

use relsync_common::ProjectScope;
use relsync_ingest::config::{SinkConfig, SyncConfig};
use relsync_ingest::orchestrator::Orchestrator;
use relsync_ingest::sink::SCHEMA_FILE;
use relsync_ingest::watermark::{SqliteWatermarkStore, WatermarkStore};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, dir: &TempDir) -> SyncConfig {
    SyncConfig {
        organization: "contoso".to_string(),
        project: "web".to_string(),
        pat: "pat".to_string(),
        release_api_url: server.uri(),
        core_api_url: server.uri(),
        settle_secs: 0,
        http_max_retries: 1,
        watermark_db_url: format!("sqlite://{}", dir.path().join("wm.db").display()),
        sink: SinkConfig::Directory {
            path: dir.path().join("data"),
        },
        entities: vec!["ReleaseDefinition".to_string()],
        ..SyncConfig::default()
    }
}

async fn mount_project(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/projects/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "proj-guid" })))
        .mount(server)
        .await;
}

async fn mount_definitions(server: &MockServer, token: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path("/contoso/web/_apis/release/definitions"))
        .and(query_param("continuationToken", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": items })))
        .mount(server)
        .await;
}

fn data_lines(table_dir: &Path) -> Vec<Value> {
    let mut lines = Vec::new();
    for entry in std::fs::read_dir(table_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) == Some("ndjson") {
            for row in serde_jsonlines::json_lines(&path).unwrap() {
                let row: Value = row.unwrap();
                lines.push(row);
            }
        }
    }
    lines.sort_by_key(|row| row["ReleaseDefinitionId"].as_i64());
    lines
}

#[tokio::test]
async fn test_sync_writes_projected_rows_and_watermark() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_project(&server).await;
    mount_definitions(
        &server,
        "0",
        json!([
            { "id": 1, "name": "web-app", "revision": 4, "createdBy": { "displayName": "Ada" } },
            { "id": 2, "name": "worker", "revision": 1 }
        ]),
    )
    .await;
    mount_definitions(&server, "3", json!([])).await;

    let config = config(&server, &dir);
    let orchestrator = Orchestrator::from_config(&config).await.unwrap();
    let report = orchestrator.run_all().await;

    assert_eq!(report.succeeded(), 1);
    let summary = report.get("ReleaseDefinition").unwrap().outcome.as_ref().unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.watermark, "3");

    let table_dir = dir.path().join("data").join("ReleaseDefinition");
    assert!(table_dir.join(SCHEMA_FILE).is_file());

    let rows = data_lines(&table_dir);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["ReleaseDefinitionName"], "web-app");
    assert_eq!(rows[0]["CreatedByDisplayName"], "Ada");
    assert_eq!(rows[0]["ProjectId"], "proj-guid");
    assert_eq!(rows[1]["CreatedByDisplayName"], Value::Null);

    let store = SqliteWatermarkStore::connect(
        &config.watermark_db_url,
        ProjectScope::new("contoso", "proj-guid"),
    )
    .await
    .unwrap();
    assert_eq!(store.read("ReleaseDefinition").await.unwrap().as_deref(), Some("3"));
}

#[tokio::test]
async fn test_second_sync_resumes_from_stored_watermark() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_project(&server).await;
    mount_definitions(&server, "0", json!([{ "id": 1 }, { "id": 2 }])).await;
    mount_definitions(&server, "3", json!([])).await;

    let config = config(&server, &dir);
    Orchestrator::from_config(&config).await.unwrap().run_all().await;
    let report = Orchestrator::from_config(&config).await.unwrap().run_all().await;

    let summary = report.get("ReleaseDefinition").unwrap().outcome.as_ref().unwrap();
    assert_eq!(summary.records, 0);
    assert!(!summary.advanced());

    let requests = server.received_requests().await.unwrap();
    let first_page_requests = requests
        .iter()
        .filter(|r| r.url.path().ends_with("/definitions"))
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "continuationToken" && v == "0"))
        .count();
    assert_eq!(first_page_requests, 1);
}

#[tokio::test]
async fn test_unreachable_project_lookup_fails_construction() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/contoso/_apis/projects/web"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = Orchestrator::from_config(&config(&server, &dir)).await;
    assert!(result.is_err());
}
