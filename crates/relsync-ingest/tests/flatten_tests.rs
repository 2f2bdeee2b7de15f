//! Flattening of the catalog's release trees

mod common;

use common::{release, release_detail, scope, FakeSource};
use relsync_ingest::entities::{self, TIMELINE_TREE};
use relsync_ingest::flatten::{flatten_page, flatten_tree, FlattenStrategy};
use relsync_ingest::source::{SourceClient, SourceRecord};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn test_timeline_phase_job_task_chain() {
    let environment = json!({
        "environments": [{
            "id": 55,
            "releaseId": 9,
            "deploySteps": [{
                "releaseDeployPhases": [{
                    "runPlanId": "P1",
                    "deploymentJobs": [{
                        "job": { "timelineRecordId": "J1" },
                        "tasks": [{ "timelineRecordId": "T1" }]
                    }]
                }]
            }]
        }]
    });

    let rows = flatten_tree(&scope(), &TIMELINE_TREE, &environment);
    assert_eq!(rows.len(), 3);

    let values: Vec<_> = rows.iter().map(|r| r.to_value()).collect();
    let phase = &values[0];
    let job = &values[1];
    let task = &values[2];

    assert_eq!(phase["Type"], "Phase");
    assert_eq!(phase["RowId"], "P1");
    assert!(phase.get("ParentId").is_none());
    assert!(phase.get("deploymentJobs").is_none());

    assert_eq!(job["Type"], "Job");
    assert_eq!(job["RowId"], "J1");
    assert_eq!(job["ParentId"], "P1");

    assert_eq!(task["Type"], "Task");
    assert_eq!(task["RowId"], "T1");
    assert_eq!(task["ParentId"], "J1");

    for row in &values {
        assert_eq!(row["ReleaseId"], 9);
        assert_eq!(row["ReleaseEnvironmentId"], 55);
        assert_eq!(row["ReleaseTimelineId"], "P1");
        assert_eq!(row["OrganizationName"], "contoso");
        assert_eq!(row["ProjectId"], "p-1");
    }
}

#[test]
fn test_timeline_without_deploy_steps_yields_nothing() {
    let detail = json!({ "environments": [{ "id": 1, "releaseId": 2 }] });
    assert!(flatten_tree(&scope(), &TIMELINE_TREE, &detail).is_empty());
}

#[test]
fn test_context_columns_win_over_payload_keys() {
    let detail = json!({
        "environments": [{
            "id": 1,
            "releaseId": 2,
            "deploySteps": [{
                "releaseDeployPhases": [{ "runPlanId": "P9", "ProjectId": "spoofed", "Type": "spoofed" }]
            }]
        }]
    });

    let rows = flatten_tree(&scope(), &TIMELINE_TREE, &detail);
    let value = rows[0].to_value();

    assert_eq!(value["ProjectId"], "p-1");
    assert_eq!(value["Type"], "Phase");
}

#[tokio::test]
async fn test_artifact_tree_from_list_records() {
    let descriptor = entities::find("ReleaseArtifact").unwrap();
    let records: Vec<_> = [release(3, "2024-01-01T00:00:00Z"), release(4, "2024-01-02T00:00:00Z")]
        .into_iter()
        .map(|r| SourceRecord::from_value(r).unwrap())
        .collect();
    let source: Arc<dyn SourceClient> = Arc::new(FakeSource::default());

    let rows = flatten_page(&descriptor.strategy, &scope(), &records, &source, 4)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let values: Vec<_> = rows.iter().map(|r| r.to_value()).collect();
    assert_eq!(values[0]["Type"], "ReleaseArtifact");
    assert_eq!(values[0]["RowId"], "src-3");
    assert_eq!(values[0]["ReleaseId"], 3);
    assert_eq!(values[1]["ReleaseId"], 4);
    assert_eq!(values[1]["alias"], "_app");
}

#[tokio::test]
async fn test_detail_rows_stay_grouped_per_release() {
    let ids: Vec<i64> = (1..=6).collect();
    let source = Arc::new(FakeSource {
        details: ids.iter().map(|id| (*id, release_detail(*id))).collect::<HashMap<_, _>>(),
        ..FakeSource::default()
    });
    let records: Vec<_> = ids
        .iter()
        .map(|id| SourceRecord::from_value(json!({ "id": id })).unwrap())
        .collect();
    let client: Arc<dyn SourceClient> = source.clone();

    let rows = flatten_page(&FlattenStrategy::Detail(TIMELINE_TREE), &scope(), &records, &client, 3)
        .await
        .unwrap();

    assert_eq!(source.detail_calls(), 6);
    assert_eq!(rows.len(), 24);

    // Each release contributes a contiguous Phase, Job, Task, Task run
    for chunk in rows.chunks(4) {
        let release_id = chunk[0].lineage["ReleaseId"].as_i64().unwrap();
        let tags: Vec<_> = chunk.iter().map(|r| r.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["Phase", "Job", "Task", "Task"]);
        assert!(chunk.iter().all(|r| r.lineage["ReleaseId"] == release_id));
    }
}

#[tokio::test]
async fn test_environment_rows_strip_nested_steps() {
    let descriptor = entities::find("ReleaseEnvironment").unwrap();
    let source = Arc::new(FakeSource {
        details: HashMap::from([(7, release_detail(7))]),
        ..FakeSource::default()
    });
    let client: Arc<dyn SourceClient> = source;
    let records = vec![SourceRecord::from_value(json!({ "id": 7 })).unwrap()];

    let rows = flatten_page(&descriptor.strategy, &scope(), &records, &client, 2)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let value = rows[0].to_value();
    assert_eq!(value["Type"], "ReleaseEnvironment");
    assert_eq!(value["RowId"], "70");
    assert_eq!(value["name"], "prod");
    assert!(value.get("deploySteps").is_none());
}

#[tokio::test]
async fn test_detail_flatten_runs_on_spawned_task() {
    let source = Arc::new(FakeSource {
        details: HashMap::from([(5, release_detail(5)), (6, release_detail(6))]),
        ..FakeSource::default()
    });
    let client: Arc<dyn SourceClient> = source.clone();
    let records = vec![
        SourceRecord::from_value(json!({ "id": 5 })).unwrap(),
        SourceRecord::from_value(json!({ "id": 6 })).unwrap(),
    ];

    let rows = tokio::spawn(async move {
        flatten_page(&FlattenStrategy::Detail(TIMELINE_TREE), &scope(), &records, &client, 2).await
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(source.detail_calls(), 2);
    assert_eq!(rows.len(), 8);
}
