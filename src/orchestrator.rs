//! The public entry point: one [`Orchestrator`] per deployment.
//!
//! Drives the fixed provisioning pipeline
//!
//! ```text
//! Identity ─▶ Storage ─▶ Index ─▶ (Transform) ─▶ Knowledge service
//! ```
//!
//! and, on request, ingestion and teardown. Every step is idempotent:
//! resources are matched by deterministic name and adopted when they
//! already exist, so a failed run is fixed by running it again.

use std::path::Path;
use std::sync::Arc;

use crate::clients::Clients;
use crate::config::Config;
use crate::context::ProvisionContext;
use crate::error::{KbError, Result};
use crate::models::{
    Deployment, IngestionResult, KnowledgeBaseIds, KnowledgeServiceEntity, StepOutcome, TeardownReport,
};
use crate::naming::Names;
use crate::progress::StepReporter;
use crate::retry::Sleeper;
use crate::spec::ResourceSpec;
use crate::storage::{self, UploadSummary};
use crate::teardown::TeardownOptions;
use crate::{identity, index, ingestion, knowledge, teardown, transform};

pub struct Orchestrator {
    ctx: ProvisionContext,
    spec: ResourceSpec,
}

impl Orchestrator {
    /// Wrap an already-built context.
    pub fn new(ctx: ProvisionContext, spec: ResourceSpec) -> Self {
        Self { ctx, spec }
    }

    /// Build an orchestrator over `clients`, looking up the caller's
    /// account to derive resource names.
    pub async fn with_clients(
        clients: Clients,
        region: &str,
        config: &Config,
        spec: ResourceSpec,
        sleeper: Arc<dyn Sleeper>,
        reporter: Arc<dyn StepReporter>,
    ) -> Result<Self> {
        let caller = clients
            .account
            .caller_identity()
            .await
            .map_err(KbError::step("look up caller identity"))?;
        tracing::info!(account = %caller.account, region, caller = %caller.arn, "resolved caller");

        let names = Names::new(&spec, region, &caller.account);
        let ctx = ProvisionContext {
            clients,
            region: region.to_string(),
            account: caller.account,
            caller_arn: caller.arn,
            names,
            poll: config.orchestrator.poll_settings(),
            retry: config.orchestrator.retry_policy(),
            sleeper,
            reporter,
        };
        Ok(Self::new(ctx, spec))
    }

    /// Build an orchestrator against the real provider endpoints, with
    /// credentials from the environment.
    pub async fn connect(
        config: &Config,
        spec: ResourceSpec,
        reporter: Arc<dyn StepReporter>,
    ) -> Result<Self> {
        let provider = Arc::new(crate::aws::AwsProvider::from_env(&config.aws)?);
        let region = provider.region().to_string();
        Self::with_clients(
            Clients::from_provider(provider),
            &region,
            config,
            spec,
            Arc::new(crate::retry::TokioSleeper),
            reporter,
        )
        .await
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.ctx
    }

    pub fn names(&self) -> &Names {
        &self.ctx.names
    }

    /// Create or adopt every resource the deployment needs.
    ///
    /// # Errors
    ///
    /// Fails on the first required step that fails (role, bucket, index,
    /// knowledge base). Optional steps (individual policies, log wiring,
    /// connectors) are reported in [`Deployment::warnings`] and
    /// [`KnowledgeServiceEntity::connector_failures`] instead.
    pub async fn provision(&self) -> Result<Deployment> {
        let ctx = &self.ctx;
        let spec = &self.spec;
        tracing::info!(
            knowledge_base = ctx.names.knowledge_base(),
            backend = %spec.backend(),
            "provisioning"
        );

        let bucket_names = storage::required_buckets(spec, &ctx.names);
        let planned_transform = transform::function_arn(ctx, spec);
        let (identity, mut warnings) =
            identity::ensure_identity(ctx, spec, &bucket_names, planned_transform.as_deref()).await?;

        let buckets = storage::ensure_buckets(ctx, &bucket_names).await?;

        let (index, index_warnings) = index::ensure_index(ctx, spec, &identity).await?;
        warnings.extend(index_warnings);

        let transform_function_arn =
            transform::ensure_transform(ctx, spec, &ctx.names.intermediate_bucket()).await?;

        let (entity, kb_warnings) = knowledge::ensure_knowledge_service(
            ctx,
            spec,
            &identity,
            &index,
            transform_function_arn.as_deref(),
        )
        .await?;
        warnings.extend(kb_warnings);
        warnings.extend(
            entity
                .connector_failures
                .iter()
                .map(|f| format!("connector {}: {}", f.name, f.error)),
        );

        if warnings.is_empty() {
            tracing::info!(knowledge_base_id = %entity.id, "provisioning finished");
        } else {
            tracing::warn!(
                knowledge_base_id = %entity.id,
                warnings = warnings.len(),
                "provisioning finished with warnings"
            );
        }

        Ok(Deployment {
            identity,
            buckets,
            index,
            entity,
            transform_function_arn,
            warnings,
        })
    }

    /// Find the deployed knowledge base and its connectors without creating
    /// anything.
    pub async fn locate(&self) -> Result<Option<KnowledgeServiceEntity>> {
        knowledge::find_entity(&self.ctx, &self.spec).await
    }

    async fn require_entity(&self) -> Result<KnowledgeServiceEntity> {
        self.locate().await?.ok_or_else(|| {
            KbError::NotProvisioned(format!(
                "knowledge base '{}' does not exist; run provision first",
                self.ctx.names.knowledge_base()
            ))
        })
    }

    /// Run one ingestion job per connector, each to a terminal status.
    pub async fn run_ingestion(&self) -> Result<Vec<IngestionResult>> {
        let entity = self.require_entity().await?;
        Ok(ingestion::run_ingestion(&self.ctx, &entity).await)
    }

    /// Identifiers an external caller stores to reach the knowledge base.
    pub async fn get_identifier(&self) -> Result<KnowledgeBaseIds> {
        let entity = self.require_entity().await?;
        Ok(KnowledgeBaseIds {
            knowledge_base_id: entity.id,
            knowledge_base_arn: entity.arn,
            data_source_ids: entity.connectors.into_iter().map(|c| c.id).collect(),
            buckets: storage::required_buckets(&self.spec, &self.ctx.names),
        })
    }

    /// Upload a local directory into `bucket`, or into the first source
    /// bucket when none is given.
    pub async fn upload_documents(
        &self,
        root: &Path,
        bucket: Option<&str>,
        include: &[String],
        exclude: &[String],
    ) -> Result<UploadSummary> {
        let bucket = match bucket {
            Some(b) => b.to_string(),
            None => self.spec.source_buckets().into_iter().next().ok_or_else(|| {
                KbError::validation("no OBJECT_STORE data source; pass a bucket explicitly")
            })?,
        };
        let step = format!("upload documents to {}", bucket);
        self.ctx.started(&step);
        let result =
            storage::upload_directory(self.ctx.clients.storage.as_ref(), &bucket, root, include, exclude)
                .await;
        match &result {
            Ok(_) => self.ctx.finished(&step, StepOutcome::Updated),
            Err(e) => self.ctx.finished(&step, StepOutcome::Failed(e.to_string())),
        }
        result
    }

    /// Delete the deployment's resources in reverse dependency order.
    /// Never aborts early; failures are recorded in the report.
    pub async fn teardown(&self, options: TeardownOptions) -> TeardownReport {
        teardown::teardown(&self.ctx, &self.spec, options).await
    }
}
