//! Ingestion coordinator.
//!
//! One sync job per connector, started and polled at a fixed interval until
//! it reaches `COMPLETE`, `FAILED` or `STOPPED`. A connector whose job cannot
//! be started or polled gets an error in its result; the remaining
//! connectors still run.

use crate::context::ProvisionContext;
use crate::models::{
    DataSourceConnector, IngestionResult, IngestionStatus, KnowledgeServiceEntity, StepOutcome,
};

/// Ingest every connector of `entity`, in order.
pub async fn run_ingestion(
    ctx: &ProvisionContext,
    entity: &KnowledgeServiceEntity,
) -> Vec<IngestionResult> {
    let mut results = Vec::with_capacity(entity.connectors.len());
    for connector in &entity.connectors {
        results.push(ingest_connector(ctx, &entity.id, connector).await);
    }
    results
}

/// Start one job and wait for its terminal status.
pub async fn ingest_connector(
    ctx: &ProvisionContext,
    knowledge_base_id: &str,
    connector: &DataSourceConnector,
) -> IngestionResult {
    let step = format!("ingest {}", connector.name);
    ctx.started(&step);
    let mut result = IngestionResult {
        connector_id: connector.id.clone(),
        connector_name: connector.name.clone(),
        job_id: None,
        status: None,
        error: None,
    };

    match poll_job(ctx, &step, knowledge_base_id, connector, &mut result).await {
        Ok(status) => {
            result.status = Some(status);
            if status == IngestionStatus::Complete {
                ctx.finished(&step, StepOutcome::Updated);
            } else {
                let detail = format!("job ended {}", status);
                ctx.finished(&step, StepOutcome::Failed(detail.clone()));
                result.error = Some(detail);
            }
        }
        Err(message) => {
            ctx.finished(&step, StepOutcome::Failed(message.clone()));
            result.error = Some(message);
        }
    }
    tracing::info!(
        connector = %connector.name,
        job = result.job_id.as_deref().unwrap_or("-"),
        status = result.status.map(|s| s.as_str()).unwrap_or("-"),
        "ingestion finished"
    );
    result
}

async fn poll_job(
    ctx: &ProvisionContext,
    step: &str,
    knowledge_base_id: &str,
    connector: &DataSourceConnector,
    result: &mut IngestionResult,
) -> std::result::Result<IngestionStatus, String> {
    let knowledge = ctx.clients.knowledge.as_ref();
    let mut job = knowledge
        .start_ingestion_job(knowledge_base_id, &connector.id)
        .await
        .map_err(|e| format!("start ingestion job: {}", e))?;
    result.job_id = Some(job.id.clone());

    loop {
        let status = IngestionStatus::parse(&job.status)
            .ok_or_else(|| format!("unrecognized ingestion status '{}'", job.status))?;
        if status.is_terminal() {
            return Ok(status);
        }
        ctx.wait_on(step, status.as_str(), ctx.poll.ingestion).await;
        job = knowledge
            .get_ingestion_job(knowledge_base_id, &connector.id, &job.id)
            .await
            .map_err(|e| format!("get ingestion job: {}", e))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{DataSourceRequest, KnowledgeApi, KnowledgeBaseRequest};
    use crate::config::parse_config;
    use crate::context::in_memory;
    use crate::error::ProviderError;
    use crate::memory::MemoryCloud;
    use crate::spec::{ConnectorKind, ResourceSpec};
    use std::sync::Arc;
    use std::time::Duration;

    async fn seeded(cloud: &MemoryCloud, connectors: usize) -> KnowledgeServiceEntity {
        let kb = cloud
            .create_knowledge_base(&KnowledgeBaseRequest {
                name: "demo-kb".into(),
                description: "test".into(),
                role_arn: "arn:aws:iam::111122223333:role/r".into(),
                configuration: serde_json::json!({}),
                storage: None,
            })
            .await
            .unwrap();
        let mut entity = KnowledgeServiceEntity {
            id: kb.id.clone(),
            arn: kb.arn,
            name: kb.name,
            role_arn: kb.role_arn,
            connectors: Vec::new(),
            connector_failures: Vec::new(),
        };
        for i in 0..connectors {
            let ds = cloud
                .create_data_source(
                    &kb.id,
                    &DataSourceRequest {
                        name: format!("demo-kb-s3-{}", i),
                        description: "test".into(),
                        configuration: serde_json::json!({}),
                        vector_ingestion: None,
                    },
                )
                .await
                .unwrap();
            entity.connectors.push(DataSourceConnector {
                id: ds.id,
                name: ds.name,
                kind: ConnectorKind::ObjectStore,
            });
        }
        entity
    }

    fn spec() -> ResourceSpec {
        let config = parse_config(
            "[knowledge_base]\nname = \"demo-kb\"\n\n[[data_sources]]\ntype = \"OBJECT_STORE\"\nbucket_name = \"demo-docs\"\n",
        )
        .unwrap();
        ResourceSpec::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn polls_until_terminal_at_fixed_interval() {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.set_ingestion(3, IngestionStatus::Complete);
        let entity = seeded(&cloud, 1).await;
        let (ctx, sleeper, _) = in_memory(cloud.clone(), &spec());

        let results = run_ingestion(&ctx, &entity).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(IngestionStatus::Complete));
        assert!(results[0].error.is_none());
        // STARTING, then three IN_PROGRESS polls
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(10); 4]);
    }

    #[tokio::test]
    async fn failed_job_is_reported_not_raised() {
        let cloud = Arc::new(MemoryCloud::new());
        cloud.set_ingestion(0, IngestionStatus::Failed);
        let entity = seeded(&cloud, 1).await;
        let (ctx, _, _) = in_memory(cloud.clone(), &spec());

        let result = &run_ingestion(&ctx, &entity).await[0];
        assert_eq!(result.status, Some(IngestionStatus::Failed));
        assert!(result.error.as_deref().unwrap().contains("FAILED"));
    }

    #[tokio::test]
    async fn start_failure_is_isolated_per_connector() {
        let cloud = Arc::new(MemoryCloud::new());
        let entity = seeded(&cloud, 2).await;
        let first = entity.connectors[0].id.clone();
        cloud.fail_on("bedrock:StartIngestionJob", Some(&first), || {
            ProviderError::Service {
                code: "ConflictException".into(),
                message: "job already running".into(),
            }
        });
        let (ctx, _, _) = in_memory(cloud.clone(), &spec());

        let results = run_ingestion(&ctx, &entity).await;
        assert!(results[0].job_id.is_none());
        assert!(results[0].error.as_deref().unwrap().contains("start ingestion job"));
        assert_eq!(results[1].status, Some(IngestionStatus::Complete));
    }
}
