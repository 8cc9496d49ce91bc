//! Teardown coordinator.
//!
//! Deletes a deployment in reverse dependency order: connectors, the
//! entity, log delivery, the index, the transform function, IAM, then
//! storage. Every step is best effort. A resource that is already gone
//! counts as success, and a failed step is recorded while later steps
//! still run, so a partial teardown can simply be repeated.
//!
//! Resources are matched by their deterministic names; anything with a
//! matching name is deleted whether or not this tool created it.

use std::future::Future;

use crate::clients::{IdentityApi, SecurityPolicyType};
use crate::context::ProvisionContext;
use crate::error::ProviderResult;
use crate::index;
use crate::knowledge;
use crate::models::{StepOutcome, TeardownReport};
use crate::policy_docs::PolicyKind;
use crate::spec::{IndexBackend, ResourceSpec, TransformSpec};
use crate::storage;

/// Which groups of resources a teardown removes. Connectors and the
/// entity are always removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownOptions {
    /// Empty and delete the source and intermediate buckets.
    pub delete_storage: bool,
    /// Delete the log group and the delivery source, destination and delivery.
    pub delete_log_group: bool,
    /// Delete the execution role and its policies.
    pub delete_identity: bool,
    /// Delete the collection and its policies, or the graph.
    pub delete_index: bool,
    /// Delete a packaged transform function and its role. Functions
    /// referenced by ARN are never deleted.
    pub delete_transform: bool,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self {
            delete_storage: false,
            delete_log_group: true,
            delete_identity: true,
            delete_index: true,
            delete_transform: false,
        }
    }
}

/// Tear down everything `spec` would have created, as selected by `options`.
pub async fn teardown(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    options: TeardownOptions,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    delete_entity(ctx, &mut report).await;
    if options.delete_log_group {
        delete_log_delivery(ctx, &mut report).await;
    }
    if options.delete_index {
        delete_index(ctx, spec, &mut report).await;
    }
    if options.delete_transform {
        if let Some(TransformSpec::Package { .. }) = spec.transform() {
            let name = ctx.names.transform_function();
            let functions = ctx.clients.functions.as_ref();
            attempt(
                ctx,
                &mut report,
                format!("delete transform function {}", name),
                functions.delete_function(&name),
            )
            .await;
            let policies = [ctx.policy_arn(&ctx.names.transform_storage_policy())];
            delete_role(ctx, &mut report, &ctx.names.transform_role(), &policies).await;
        }
    }
    if options.delete_identity {
        let policies: Vec<String> = PolicyKind::ALL
            .iter()
            .map(|kind| ctx.policy_arn(&ctx.names.policy(*kind)))
            .collect();
        delete_role(ctx, &mut report, &ctx.names.execution_role(), &policies).await;
    }
    if options.delete_storage {
        let storage = ctx.clients.storage.as_ref();
        for bucket in storage::required_buckets(spec, &ctx.names) {
            attempt(
                ctx,
                &mut report,
                format!("delete bucket {}", bucket),
                storage::empty_and_delete(storage, &bucket),
            )
            .await;
        }
    }

    let failures = report.failures().count();
    if failures == 0 {
        tracing::info!(steps = report.steps.len(), "teardown finished");
    } else {
        tracing::warn!(steps = report.steps.len(), failures, "teardown finished with failures");
    }
    report
}

/// Run one delete, reporting it and recording its outcome.
async fn attempt<F>(ctx: &ProvisionContext, report: &mut TeardownReport, step: String, fut: F)
where
    F: Future<Output = ProviderResult<()>>,
{
    ctx.started(&step);
    let outcome = match fut.await {
        Ok(()) => StepOutcome::Deleted,
        Err(e) if e.is_not_found() => StepOutcome::NotFound,
        Err(e) => StepOutcome::Failed(e.to_string()),
    };
    ctx.finished(&step, outcome.clone());
    report.record(step, outcome);
}

fn record_now(ctx: &ProvisionContext, report: &mut TeardownReport, step: String, outcome: StepOutcome) {
    ctx.started(&step);
    ctx.finished(&step, outcome.clone());
    report.record(step, outcome);
}

async fn delete_entity(ctx: &ProvisionContext, report: &mut TeardownReport) {
    let knowledge = ctx.clients.knowledge.as_ref();
    let name = ctx.names.knowledge_base();
    let step = format!("delete knowledge base {}", name);

    let kb = match knowledge::find_knowledge_base(knowledge, name).await {
        Ok(Some(kb)) => kb,
        Ok(None) => return record_now(ctx, report, step, StepOutcome::NotFound),
        Err(e) => return record_now(ctx, report, step, StepOutcome::Failed(e.to_string())),
    };

    match knowledge.list_data_sources(&kb.id).await {
        Ok(connectors) => {
            for ds in connectors {
                attempt(
                    ctx,
                    report,
                    format!("delete connector {}", ds.name),
                    knowledge.delete_data_source(&kb.id, &ds.id),
                )
                .await;
            }
        }
        Err(e) => record_now(
            ctx,
            report,
            format!("list connectors of {}", name),
            StepOutcome::Failed(e.to_string()),
        ),
    }

    attempt(ctx, report, step, knowledge.delete_knowledge_base(&kb.id)).await;
}

async fn delete_log_delivery(ctx: &ProvisionContext, report: &mut TeardownReport) {
    let logs = ctx.clients.logs.as_ref();
    let source = ctx.names.delivery_source();

    match logs.describe_deliveries().await {
        Ok(deliveries) => {
            for delivery in deliveries.into_iter().filter(|d| d.source_name == source) {
                attempt(
                    ctx,
                    report,
                    format!("delete delivery {}", delivery.id),
                    logs.delete_delivery(&delivery.id),
                )
                .await;
            }
        }
        Err(e) => record_now(
            ctx,
            report,
            format!("list deliveries of {}", source),
            StepOutcome::Failed(e.to_string()),
        ),
    }

    attempt(
        ctx,
        report,
        format!("delete delivery source {}", source),
        logs.delete_delivery_source(&source),
    )
    .await;
    let destination = ctx.names.delivery_destination();
    attempt(
        ctx,
        report,
        format!("delete delivery destination {}", destination),
        logs.delete_delivery_destination(&destination),
    )
    .await;
    let group = ctx.names.log_group();
    attempt(
        ctx,
        report,
        format!("delete log group {}", group),
        logs.delete_log_group(&group),
    )
    .await;
}

async fn delete_index(ctx: &ProvisionContext, spec: &ResourceSpec, report: &mut TeardownReport) {
    match spec.backend() {
        IndexBackend::VectorSearch => {
            let vector = ctx.clients.vector.as_ref();
            let collection = ctx.names.collection();
            let step = format!("delete collection {}", collection);
            match vector.batch_get_collection(&collection).await {
                Ok(Some(detail)) => {
                    attempt(ctx, report, step, vector.delete_collection(&detail.id)).await
                }
                Ok(None) => record_now(ctx, report, step, StepOutcome::NotFound),
                Err(e) => record_now(ctx, report, step, StepOutcome::Failed(e.to_string())),
            }

            let access = ctx.names.data_access_policy();
            attempt(
                ctx,
                report,
                format!("delete data access policy {}", access),
                vector.delete_access_policy(&access),
            )
            .await;
            for (kind, name) in [
                (SecurityPolicyType::Network, ctx.names.network_policy()),
                (SecurityPolicyType::Encryption, ctx.names.encryption_policy()),
            ] {
                attempt(
                    ctx,
                    report,
                    format!("delete {} policy {}", kind.as_str(), name),
                    vector.delete_security_policy(&name, kind),
                )
                .await;
            }
        }
        IndexBackend::Graph => {
            let graphs = ctx.clients.graph.as_ref();
            let name = ctx.names.graph();
            let step = format!("delete graph {}", name);
            let graph = match index::find_graph(ctx, &name).await {
                Ok(Some(graph)) => graph,
                Ok(None) => return record_now(ctx, report, step, StepOutcome::NotFound),
                Err(e) => return record_now(ctx, report, step, StepOutcome::Failed(e.to_string())),
            };
            if graph.deletion_protection {
                let unprotect = async {
                    graphs
                        .update_deletion_protection(&graph.id, false)
                        .await
                        .map(|_| ())
                };
                attempt(ctx, report, format!("disable deletion protection on {}", name), unprotect)
                    .await;
            }
            attempt(ctx, report, step, graphs.delete_graph(&graph.id, true)).await;
        }
        IndexBackend::Warehouse => record_now(
            ctx,
            report,
            "delete warehouse index".to_string(),
            StepOutcome::Skipped,
        ),
    }
}

/// Detach and delete a role's policies, then the role.
///
/// Provider-managed and service-role policies are detached but never
/// deleted. Every name in `owned_policies` is deleted even when it was not
/// attached, so policies left behind by an interrupted provision are still
/// cleaned up.
async fn delete_role(
    ctx: &ProvisionContext,
    report: &mut TeardownReport,
    role: &str,
    owned_policies: &[String],
) {
    let iam = ctx.clients.identity.as_ref();
    let mut customer_policies: Vec<String> = Vec::new();

    match iam.list_attached_role_policies(role).await {
        Ok(attached) => {
            for policy in attached {
                attempt(
                    ctx,
                    report,
                    format!("detach {} from {}", policy.name, role),
                    iam.detach_role_policy(role, &policy.arn),
                )
                .await;
                if !is_provider_managed(&policy.arn) {
                    customer_policies.push(policy.arn);
                }
            }
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => record_now(
            ctx,
            report,
            format!("list policies of {}", role),
            StepOutcome::Failed(e.to_string()),
        ),
    }

    match iam.list_role_policies(role).await {
        Ok(inline) => {
            for name in inline {
                attempt(
                    ctx,
                    report,
                    format!("delete inline policy {} of {}", name, role),
                    iam.delete_role_policy(role, &name),
                )
                .await;
            }
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => record_now(
            ctx,
            report,
            format!("list inline policies of {}", role),
            StepOutcome::Failed(e.to_string()),
        ),
    }

    attempt(ctx, report, format!("delete role {}", role), iam.delete_role(role)).await;

    for arn in owned_policies {
        if !customer_policies.contains(arn) {
            customer_policies.push(arn.clone());
        }
    }
    for arn in customer_policies {
        let name = arn.rsplit('/').next().unwrap_or(&arn).to_string();
        attempt(
            ctx,
            report,
            format!("delete policy {}", name),
            delete_policy(iam, &arn),
        )
        .await;
    }
}

/// Non-default versions have to go before the policy itself.
async fn delete_policy(iam: &dyn IdentityApi, arn: &str) -> ProviderResult<()> {
    for version in iam.list_policy_versions(arn).await? {
        if !version.is_default {
            iam.delete_policy_version(arn, &version.version_id).await?;
        }
    }
    iam.delete_policy(arn).await
}

/// Provider-managed policies, and any policy under a `service-role/` path,
/// are shared with other roles and only ever detached.
fn is_provider_managed(policy_arn: &str) -> bool {
    if policy_arn.starts_with("arn:aws:iam::aws:policy/") {
        return true;
    }
    let path = policy_arn
        .split_once(":policy/")
        .and_then(|(_, rest)| rest.rsplit_once('/'))
        .map_or("", |(path, _)| path);
    path.split('/').any(|segment| segment == "service-role")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::context::in_memory;
    use crate::memory::MemoryCloud;
    use std::sync::Arc;

    fn spec(extra: &str) -> ResourceSpec {
        let src = format!(
            "[knowledge_base]\nname = \"demo-kb\"\n{}\n[[data_sources]]\ntype = \"OBJECT_STORE\"\nbucket_name = \"demo-docs\"\n",
            extra
        );
        ResourceSpec::from_config(&parse_config(&src).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn never_created_deployment_is_all_not_found() {
        let cloud = Arc::new(MemoryCloud::new());
        let spec = spec("");
        let (ctx, _, _) = in_memory(cloud.clone(), &spec);
        let options = TeardownOptions {
            delete_storage: true,
            ..TeardownOptions::default()
        };

        let report = teardown(&ctx, &spec, options).await;
        assert_eq!(report.failures().count(), 0, "{:?}", report);
        assert!(!report.steps.is_empty());
        assert!(report
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::NotFound));
    }

    #[tokio::test]
    async fn role_is_deleted_after_detach_and_inline_cleanup() {
        let cloud = Arc::new(MemoryCloud::new());
        let spec = spec("");
        let (ctx, _, _) = in_memory(cloud.clone(), &spec);
        let role = ctx.names.execution_role();
        let iam = ctx.clients.identity.as_ref();
        iam.create_role(&role, "{}", "test").await.unwrap();
        let policy_name = ctx.names.policy(PolicyKind::Logs);
        let policy = iam.create_policy(&policy_name, "{}", "test").await.unwrap();
        iam.attach_role_policy(&role, &policy.arn).await.unwrap();
        iam.attach_role_policy(&role, "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole")
            .await
            .unwrap();
        cloud.put_inline_policy(&role, "legacy");

        let report = teardown(&ctx, &spec, TeardownOptions::default()).await;
        assert_eq!(report.failures().count(), 0, "{:?}", report);
        assert_eq!(
            report.outcome_of(&format!("delete role {}", role)),
            Some(&StepOutcome::Deleted)
        );
        assert_eq!(
            report.outcome_of(&format!("delete policy {}", policy_name)),
            Some(&StepOutcome::Deleted)
        );

        let detach = cloud
            .position(&format!("iam:DetachRolePolicy {} {}", role, policy.arn))
            .unwrap();
        let delete = cloud.position(&format!("iam:DeleteRole {}", role)).unwrap();
        assert!(detach < delete);
        assert!(cloud.role_names().is_empty());
        assert!(cloud.policy_names().is_empty());
    }

    #[tokio::test]
    async fn kept_groups_are_not_touched() {
        let cloud = Arc::new(MemoryCloud::new());
        let spec = spec("");
        let (ctx, _, _) = in_memory(cloud.clone(), &spec);
        let options = TeardownOptions {
            delete_storage: false,
            delete_log_group: false,
            delete_identity: false,
            delete_index: false,
            delete_transform: false,
        };

        let report = teardown(&ctx, &spec, options).await;
        assert_eq!(report.steps.len(), 1);
        assert!(!cloud.calls().iter().any(|c| c.starts_with("iam:")));
        assert!(!cloud.calls().iter().any(|c| c.starts_with("aoss:")));
    }

    #[test]
    fn provider_managed_policies_are_recognized() {
        assert!(is_provider_managed(
            "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
        ));
        assert!(!is_provider_managed("arn:aws:iam::111122223333:policy/demo-kb-fm"));
        assert!(is_provider_managed(
            "arn:aws:iam::111122223333:policy/service-role/AmazonBedrockFoundationModelPolicy"
        ));
        assert!(!is_provider_managed("arn:aws:iam::111122223333:policy/team/service-role-audit"));
    }
}
