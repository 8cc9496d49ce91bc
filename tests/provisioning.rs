use std::fs;
use std::sync::Arc;
use std::time::Duration;

use kb_orchestrator::clients::{Clients, IdentityApi};
use kb_orchestrator::config::{parse_config, Config};
use kb_orchestrator::memory::{MemoryCloud, MEMORY_REGION};
use kb_orchestrator::models::{IngestionStatus, StepOutcome};
use kb_orchestrator::policy_docs::PolicyKind;
use kb_orchestrator::progress::CollectingSteps;
use kb_orchestrator::retry::RecordingSleeper;
use kb_orchestrator::{KbError, Orchestrator, ProviderError, ResourceSpec};
use tempfile::TempDir;

const DEMO: &str = r#"
[knowledge_base]
name = "demo-kb"
description = "Demo documents"

[models]
embedding = "amazon.titan-embed-text-v2:0"

[chunking]
strategy = "FIXED_SIZE"
max_tokens = 300
overlap_percentage = 20

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"
"#;

const WITH_CRAWL: &str = r#"
[[data_sources]]
type = "WEB_CRAWL"
seed_urls = ["https://docs.example.com/"]
"#;

struct Harness {
    cloud: Arc<MemoryCloud>,
    sleeper: Arc<RecordingSleeper>,
    steps: Arc<CollectingSteps>,
    orchestrator: Orchestrator,
}

fn config(src: &str) -> (Config, ResourceSpec) {
    let cfg = parse_config(src).unwrap();
    let spec = ResourceSpec::from_config(&cfg).unwrap();
    (cfg, spec)
}

async fn harness(cloud: Arc<MemoryCloud>, src: &str) -> Harness {
    let (cfg, spec) = config(src);
    let sleeper = Arc::new(RecordingSleeper::new());
    let steps = Arc::new(CollectingSteps::new());
    let orchestrator = Orchestrator::with_clients(
        Clients::from_provider(cloud.clone()),
        MEMORY_REGION,
        &cfg,
        spec,
        sleeper.clone(),
        steps.clone(),
    )
    .await
    .unwrap();
    Harness {
        cloud,
        sleeper,
        steps,
        orchestrator,
    }
}

#[tokio::test]
async fn demo_docs_end_to_end() {
    let h = harness(Arc::new(MemoryCloud::new()), DEMO).await;
    h.cloud.set_ingestion(2, IngestionStatus::Complete);

    let deployment = h.orchestrator.provision().await.unwrap();
    assert!(deployment.warnings.is_empty(), "{:?}", deployment.warnings);
    assert_eq!(deployment.index.dimension, 1024);
    assert_eq!(deployment.buckets, vec!["demo-docs".to_string()]);
    assert_eq!(deployment.entity.connectors.len(), 1);
    assert_eq!(deployment.entity.connectors[0].name, "demo-kb-s3-0");

    let index = h.cloud.index_body("demo-kb-index").unwrap();
    assert_eq!(
        index["mappings"]["properties"]["vector"]["dimension"],
        1024
    );

    let ds = h.cloud.data_source_request("demo-kb-s3-0").unwrap();
    let ingestion = ds.vector_ingestion.unwrap();
    let chunking = &ingestion["chunkingConfiguration"];
    assert_eq!(chunking["chunkingStrategy"], "FIXED_SIZE");
    assert_eq!(chunking["fixedSizeChunkingConfiguration"]["maxTokens"], 300);

    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("guide.md"), "# Guide\n\nHow to reset the device.").unwrap();
    fs::create_dir_all(tmp.path().join("faq")).unwrap();
    fs::write(tmp.path().join("faq/returns.txt"), "Returns are accepted for 30 days.").unwrap();
    let uploaded = h
        .orchestrator
        .upload_documents(tmp.path(), None, &[], &[])
        .await
        .unwrap();
    assert_eq!(uploaded.bucket, "demo-docs");
    assert_eq!(uploaded.keys, vec!["faq/returns.txt", "guide.md"]);

    let results = h.orchestrator.run_ingestion().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, Some(IngestionStatus::Complete));
    assert!(results[0].error.is_none());

    let ids = h.orchestrator.get_identifier().await.unwrap();
    assert_eq!(ids.knowledge_base_id, deployment.entity.id);
    assert_eq!(ids.knowledge_base_arn, deployment.entity.arn);
    assert_eq!(ids.data_source_ids, vec![deployment.entity.connectors[0].id.clone()]);
}

#[tokio::test]
async fn second_provision_adopts_everything() {
    let cloud = Arc::new(MemoryCloud::new());
    let first = harness(cloud.clone(), DEMO).await;
    let deployment = first.orchestrator.provision().await.unwrap();
    let resources = cloud.resource_count();

    let second = harness(cloud.clone(), DEMO).await;
    let again = second.orchestrator.provision().await.unwrap();

    assert_eq!(again.entity.id, deployment.entity.id);
    assert_eq!(again.entity.connectors, deployment.entity.connectors);
    assert_eq!(again.identity.role_arn, deployment.identity.role_arn);
    assert_eq!(cloud.resource_count(), resources);
    let created: Vec<_> = second
        .steps
        .finished()
        .into_iter()
        .filter(|(_, outcome)| *outcome == StepOutcome::Created)
        .collect();
    assert!(created.is_empty(), "{:?}", created);
    // Nothing new was granted, so there is no propagation wait.
    assert!(!second.sleeper.calls().contains(&Duration::from_secs(60)));
}

#[tokio::test]
async fn invalid_model_fails_before_any_call() {
    let src = DEMO.replace(
        "[models]\n",
        "[models]\ngeneration = \"acme.chat-v9\"\n",
    );
    let err = ResourceSpec::from_config(&parse_config(&src).unwrap()).unwrap_err();
    assert!(matches!(err, KbError::Validation { .. }), "{}", err);
}

#[tokio::test]
async fn foreign_bucket_is_a_distinct_error() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.claim_foreign_bucket("demo-docs");
    let h = harness(cloud.clone(), DEMO).await;

    let err = h.orchestrator.provision().await.unwrap_err();
    match err {
        KbError::BucketNameUnavailable { bucket } => assert_eq!(bucket, "demo-docs"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(cloud.knowledge_base_names().is_empty());
}

#[tokio::test]
async fn knowledge_base_creation_retries_until_role_propagates() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_times("bedrock:CreateKnowledgeBase", None, 2, || {
        ProviderError::AccessDenied("role cannot be assumed yet".into())
    });
    let h = harness(cloud.clone(), DEMO).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    assert_eq!(cloud.knowledge_base_names(), vec!["demo-kb".to_string()]);
    assert!(!deployment.entity.id.is_empty());

    let backoffs = h
        .sleeper
        .calls()
        .into_iter()
        .filter(|d| *d >= Duration::from_millis(1000) && *d <= Duration::from_millis(2000))
        .count();
    assert_eq!(backoffs, 2);
}

#[tokio::test]
async fn knowledge_base_creation_retries_until_index_is_visible() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_times("bedrock:CreateKnowledgeBase", None, 1, || {
        ProviderError::Service {
            code: "ValidationException".into(),
            message: "The knowledge base storage configuration provided is invalid... no such index [demo-kb-index]".into(),
        }
    });
    let h = harness(cloud.clone(), DEMO).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    assert_eq!(cloud.knowledge_base_names(), vec!["demo-kb".to_string()]);
    assert!(!deployment.entity.id.is_empty());
    let attempts = cloud
        .calls()
        .iter()
        .filter(|c| c.starts_with("bedrock:CreateKnowledgeBase"))
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn knowledge_base_creation_gives_up_after_max_attempts() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_on("bedrock:CreateKnowledgeBase", None, || {
        ProviderError::Transient("throttled".into())
    });
    let src = format!("{}\n[orchestrator.retry]\nmax_attempts = 3\n", DEMO);
    let h = harness(cloud.clone(), &src).await;

    let err = h.orchestrator.provision().await.unwrap_err();
    assert!(err.is_retryable(), "{}", err);
    let attempts = cloud
        .calls()
        .iter()
        .filter(|c| c.starts_with("bedrock:CreateKnowledgeBase"))
        .count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn one_connector_failure_does_not_block_the_others() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_on("bedrock:CreateDataSource", Some("demo-kb-web-1"), || {
        ProviderError::Service {
            code: "ValidationException".into(),
            message: "seed URL unreachable".into(),
        }
    });
    let src = format!("{}{}", DEMO, WITH_CRAWL);
    let h = harness(cloud.clone(), &src).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    let names: Vec<_> = deployment.entity.connectors.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["demo-kb-s3-0"]);
    assert_eq!(deployment.entity.connector_failures.len(), 1);
    assert_eq!(deployment.entity.connector_failures[0].name, "demo-kb-web-1");
    assert!(deployment
        .warnings
        .iter()
        .any(|w| w.contains("demo-kb-web-1")));
}

#[tokio::test]
async fn identifiers_require_a_deployment() {
    let h = harness(Arc::new(MemoryCloud::new()), DEMO).await;
    let err = h.orchestrator.get_identifier().await.unwrap_err();
    assert!(matches!(err, KbError::NotProvisioned(_)), "{}", err);
    let err = h.orchestrator.run_ingestion().await.unwrap_err();
    assert!(matches!(err, KbError::NotProvisioned(_)), "{}", err);
}

#[tokio::test]
async fn failed_ingestion_is_reported_per_connector() {
    let h = harness(Arc::new(MemoryCloud::new()), DEMO).await;
    h.orchestrator.provision().await.unwrap();
    h.cloud.set_ingestion(1, IngestionStatus::Failed);

    let results = h.orchestrator.run_ingestion().await.unwrap();
    assert_eq!(results[0].status, Some(IngestionStatus::Failed));
    assert!(results[0].error.as_deref().unwrap().contains("FAILED"));
}

#[tokio::test]
async fn graph_backend_creates_graph_instead_of_collection() {
    let src = DEMO.replace(
        "description = \"Demo documents\"",
        "description = \"Demo documents\"\nbackend = \"GRAPH\"",
    );
    let h = harness(Arc::new(MemoryCloud::new()), &src).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    assert!(h.cloud.collection_names().is_empty());
    assert_eq!(h.cloud.graph_names(), vec!["demo-kb-graph".to_string()]);
    let request = h.cloud.knowledge_base_request("demo-kb").unwrap();
    assert_eq!(
        request.storage.unwrap()["type"],
        "NEPTUNE_ANALYTICS"
    );
    assert_eq!(deployment.index.dimension, 1024);
}

#[tokio::test]
async fn failing_permission_policy_is_a_warning() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_on("iam:CreatePolicy", None, || {
        ProviderError::LimitExceeded("policy quota reached".into())
    });
    let h = harness(cloud.clone(), DEMO).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    assert!(deployment
        .warnings
        .iter()
        .any(|w| w.starts_with("policy ")), "{:?}", deployment.warnings);
    assert!(deployment.identity.policies.is_empty());
    assert_eq!(cloud.role_names().len(), 1);
    assert_eq!(cloud.knowledge_base_names(), vec!["demo-kb".to_string()]);
}

#[tokio::test]
async fn failing_role_creation_aborts_the_run() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_on("iam:CreateRole", None, || {
        ProviderError::AccessDenied("iam:CreateRole not allowed".into())
    });
    let h = harness(cloud.clone(), DEMO).await;

    let err = h.orchestrator.provision().await.unwrap_err();
    assert!(matches!(err, KbError::Step { .. }), "{}", err);
    assert!(cloud.bucket_names().is_empty());
    assert!(cloud.collection_names().is_empty());
    assert!(cloud.knowledge_base_names().is_empty());
}

#[tokio::test]
async fn failing_log_group_is_a_warning() {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.fail_on("logs:CreateLogGroup", None, || {
        ProviderError::AccessDenied("logs:CreateLogGroup not allowed".into())
    });
    let h = harness(cloud.clone(), DEMO).await;

    let deployment = h.orchestrator.provision().await.unwrap();
    assert!(deployment
        .warnings
        .iter()
        .any(|w| w.starts_with("ensure log group")), "{:?}", deployment.warnings);
    assert_eq!(cloud.knowledge_base_names(), vec!["demo-kb".to_string()]);
    assert_eq!(deployment.entity.connectors.len(), 1);
    assert!(h
        .steps
        .finished()
        .iter()
        .any(|(step, outcome)| step.starts_with("ensure log group") && outcome.is_failure()));
}

#[tokio::test]
async fn recreated_vector_access_policy_waits_for_propagation() {
    let cloud = Arc::new(MemoryCloud::new());
    let first = harness(cloud.clone(), DEMO).await;
    let deployment = first.orchestrator.provision().await.unwrap();

    let ctx = first.orchestrator.context();
    let arn = ctx.policy_arn(&ctx.names.policy(PolicyKind::VectorAccess));
    let role = &deployment.identity.role_name;
    cloud.detach_role_policy(role, &arn).await.unwrap();
    cloud.delete_policy(&arn).await.unwrap();

    let second = harness(cloud.clone(), DEMO).await;
    second.orchestrator.provision().await.unwrap();
    assert!(second.sleeper.calls().contains(&Duration::from_secs(60)));
    assert!(cloud.attached_policy_arns(role).contains(&arn));
}
