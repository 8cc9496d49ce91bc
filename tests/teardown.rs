use std::fs;
use std::sync::Arc;

use kb_orchestrator::clients::Clients;
use kb_orchestrator::config::parse_config;
use kb_orchestrator::memory::{MemoryCloud, MEMORY_REGION};
use kb_orchestrator::models::StepOutcome;
use kb_orchestrator::progress::CollectingSteps;
use kb_orchestrator::retry::RecordingSleeper;
use kb_orchestrator::{Orchestrator, ProviderError, ResourceSpec, TeardownOptions};
use tempfile::TempDir;

const DEMO: &str = r#"
[knowledge_base]
name = "demo-kb"

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"

[[data_sources]]
type = "WEB_CRAWL"
seed_urls = ["https://docs.example.com/"]
"#;

async fn orchestrator(cloud: &Arc<MemoryCloud>) -> Orchestrator {
    orchestrator_for(cloud, DEMO).await
}

async fn orchestrator_for(cloud: &Arc<MemoryCloud>, src: &str) -> Orchestrator {
    let cfg = parse_config(src).unwrap();
    let spec = ResourceSpec::from_config(&cfg).unwrap();
    Orchestrator::with_clients(
        Clients::from_provider(cloud.clone()),
        MEMORY_REGION,
        &cfg,
        spec,
        Arc::new(RecordingSleeper::new()),
        Arc::new(CollectingSteps::new()),
    )
    .await
    .unwrap()
}

fn everything() -> TeardownOptions {
    TeardownOptions {
        delete_storage: true,
        delete_transform: true,
        ..TeardownOptions::default()
    }
}

#[tokio::test]
async fn second_teardown_finds_nothing_left() {
    let cloud = Arc::new(MemoryCloud::new());
    let orch = orchestrator(&cloud).await;
    orch.provision().await.unwrap();

    let first = orch.teardown(everything()).await;
    assert!(first.steps.iter().any(|s| s.outcome == StepOutcome::Deleted));

    let second = orch.teardown(everything()).await;
    assert_eq!(second.failures().count(), 0, "{:?}", second);
    assert!(!second
        .steps
        .iter()
        .any(|s| s.outcome == StepOutcome::Deleted));
}

#[tokio::test]
async fn full_teardown_removes_everything_in_order() {
    let cloud = Arc::new(MemoryCloud::new());
    let orch = orchestrator(&cloud).await;
    let deployment = orch.provision().await.unwrap();

    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("guide.md"), "# Guide").unwrap();
    orch.upload_documents(tmp.path(), None, &[], &[]).await.unwrap();
    cloud.clear_calls();

    let report = orch.teardown(everything()).await;
    assert_eq!(report.failures().count(), 0, "{:?}", report);

    let kb_id = &deployment.entity.id;
    let delete_kb = cloud
        .position(&format!("bedrock:DeleteKnowledgeBase {}", kb_id))
        .unwrap();
    for connector in &deployment.entity.connectors {
        let delete_ds = cloud
            .position(&format!("bedrock:DeleteDataSource {}", connector.id))
            .unwrap();
        assert!(delete_ds < delete_kb);
    }

    let calls = cloud.calls();
    let first_detach = calls
        .iter()
        .position(|c| c.starts_with("iam:DetachRolePolicy"))
        .unwrap();
    let delete_role = calls
        .iter()
        .position(|c| c.starts_with("iam:DeleteRole "))
        .unwrap();
    let delete_collection = calls
        .iter()
        .position(|c| c.starts_with("aoss:DeleteCollection"))
        .unwrap();
    assert!(delete_kb < delete_collection);
    assert!(first_detach < delete_role);

    assert!(cloud.knowledge_base_names().is_empty());
    assert!(cloud.data_source_names().is_empty());
    assert!(cloud.collection_names().is_empty());
    assert!(cloud.role_names().is_empty());
    assert!(cloud.bucket_names().is_empty());
    assert_eq!(cloud.resource_count(), 0);
}

#[tokio::test]
async fn buckets_survive_by_default() {
    let cloud = Arc::new(MemoryCloud::new());
    let orch = orchestrator(&cloud).await;
    orch.provision().await.unwrap();

    let report = orch.teardown(TeardownOptions::default()).await;
    assert_eq!(report.failures().count(), 0, "{:?}", report);
    assert_eq!(cloud.bucket_names(), vec!["demo-docs".to_string()]);
    assert!(cloud.knowledge_base_names().is_empty());
}

#[tokio::test]
async fn kept_index_and_identity_are_left_alone() {
    let cloud = Arc::new(MemoryCloud::new());
    let orch = orchestrator(&cloud).await;
    orch.provision().await.unwrap();
    let roles = cloud.role_names();
    cloud.clear_calls();

    let report = orch
        .teardown(TeardownOptions {
            delete_identity: false,
            delete_index: false,
            delete_log_group: false,
            ..TeardownOptions::default()
        })
        .await;
    assert_eq!(report.failures().count(), 0, "{:?}", report);
    assert!(cloud.knowledge_base_names().is_empty());
    assert_eq!(cloud.role_names(), roles);
    assert_eq!(cloud.collection_names().len(), 1);
    assert!(!cloud.calls().iter().any(|c| c.starts_with("logs:")));
}

#[tokio::test]
async fn failed_step_is_reported_and_rerun_finishes() {
    let cloud = Arc::new(MemoryCloud::new());
    let orch = orchestrator(&cloud).await;
    orch.provision().await.unwrap();
    cloud.fail_times("iam:DeleteRole", None, 1, || {
        ProviderError::Service {
            code: "DeleteConflict".into(),
            message: "role is in use".into(),
        }
    });

    let report = orch.teardown(everything()).await;
    assert_eq!(report.failures().count(), 1, "{:?}", report);
    // Later groups still ran.
    assert!(cloud.bucket_names().is_empty());
    assert_eq!(cloud.role_names().len(), 1);

    let rerun = orch.teardown(everything()).await;
    assert_eq!(rerun.failures().count(), 0, "{:?}", rerun);
    assert!(cloud.role_names().is_empty());
}

#[tokio::test]
async fn graph_protection_is_lifted_before_delete() {
    let cloud = Arc::new(MemoryCloud::new());
    let src = DEMO.replace("name = \"demo-kb\"", "name = \"demo-kb\"\nbackend = \"GRAPH\"");
    let orch = orchestrator_for(&cloud, &src).await;
    orch.provision().await.unwrap();
    assert_eq!(cloud.graph_names(), vec!["demo-kb-graph".to_string()]);
    cloud.clear_calls();

    let report = orch.teardown(everything()).await;
    assert_eq!(report.failures().count(), 0, "{:?}", report);
    assert_eq!(
        report.outcome_of("disable deletion protection on demo-kb-graph"),
        Some(&StepOutcome::Deleted)
    );
    assert_eq!(
        report.outcome_of("delete graph demo-kb-graph"),
        Some(&StepOutcome::Deleted)
    );

    let calls = cloud.calls();
    let unprotect = calls
        .iter()
        .position(|c| c.starts_with("neptune-graph:UpdateGraph"))
        .unwrap();
    let delete = calls
        .iter()
        .position(|c| c.starts_with("neptune-graph:DeleteGraph"))
        .unwrap();
    assert!(unprotect < delete);
    assert!(cloud.graph_names().is_empty());
    assert!(!calls.iter().any(|c| c.starts_with("aoss:")));
}
