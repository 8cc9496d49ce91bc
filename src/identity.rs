//! Identity & policy manager.
//!
//! Ensures the execution role and every customer-managed policy attached to
//! it. The role is required: failing to create or adopt it aborts the run.
//! Individual policies are best effort: a failure is logged, reported and
//! returned as a warning, and the remaining policies are still ensured.
//!
//! Policies are only ever widened. An adopted policy gets a new default
//! version with the current document; when the version cap is reached the
//! oldest non-default version is evicted first.

use serde_json::Value;

use crate::adopt::{create_or_adopt, found, Adoption};
use crate::clients::{IdentityApi, ManagedPolicy, Role};
use crate::context::ProvisionContext;
use crate::error::{KbError, ProviderResult, Result};
use crate::models::{AttachedPolicy, ExecutionIdentity, StepOutcome};
use crate::policy_docs::{self, PolicyKind, PolicyScope};
use crate::spec::ResourceSpec;

/// Managed policies keep at most this many versions.
pub const POLICY_VERSION_CAP: usize = 5;

const KNOWLEDGE_SERVICE_PRINCIPAL: &str = "bedrock.amazonaws.com";

/// Create or adopt the execution role and attach the policies `spec` needs.
///
/// Returns the identity and a warning per policy that could not be ensured.
pub async fn ensure_identity(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    buckets: &[String],
    transform_function_arn: Option<&str>,
) -> Result<(ExecutionIdentity, Vec<String>)> {
    let role_name = ctx.names.execution_role();
    let trust = policy_docs::assume_role(KNOWLEDGE_SERVICE_PRINCIPAL).to_string();

    let role = ensure_role(
        ctx,
        &role_name,
        &trust,
        "Knowledge base execution role",
    )
    .await?;

    let log_group = ctx.names.log_group();
    let secrets = spec.secret_arns();
    let scope = PolicyScope {
        region: &ctx.region,
        account: &ctx.account,
        buckets,
        secrets: &secrets,
        log_group: &log_group,
        transform_function_arn,
    };

    let mut policies = Vec::new();
    let mut warnings = Vec::new();
    for (kind, document) in policy_docs::required_policies(spec, &scope) {
        let name = ctx.names.policy(kind);
        match ensure_attached_policy(ctx, &role.name, &name, &document, kind.description()).await {
            Ok((policy, _)) => policies.push(policy),
            Err(e) => warnings.push(format!("policy {}: {}", name, e)),
        }
    }

    Ok((
        ExecutionIdentity {
            role_name: role.name,
            role_arn: role.arn,
            policies,
        },
        warnings,
    ))
}

/// Create or adopt a role trusted by the given document.
///
/// An adopted role has its trust policy refreshed (best effort). A freshly
/// created role is given time to propagate before anything assumes it.
pub async fn ensure_role(
    ctx: &ProvisionContext,
    role_name: &str,
    trust_policy: &str,
    description: &str,
) -> Result<Role> {
    let identity = ctx.clients.identity.as_ref();
    let step = format!("ensure role {}", role_name);
    ctx.started(&step);

    let result = create_or_adopt(
        "create execution role",
        role_name,
        || identity.create_role(role_name, trust_policy, description),
        || async { found(identity.get_role(role_name).await) },
    )
    .await;

    let role = match result {
        Ok(r) => r,
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            return Err(e);
        }
    };

    match &role {
        Adoption::Adopted(r) => {
            if let Err(e) = identity.update_assume_role_policy(&r.name, trust_policy).await {
                tracing::warn!(role = %r.name, error = %e, "could not refresh trust policy");
            }
        }
        Adoption::Created(_) => ctx.pause(ctx.poll.role_propagation).await,
    }

    ctx.finished(&step, role.outcome());
    Ok(role.into_inner())
}

/// Create-or-update a managed policy by name and attach it to `role`.
/// Returns the policy with the outcome of the create-or-update.
pub async fn ensure_attached_policy(
    ctx: &ProvisionContext,
    role: &str,
    policy_name: &str,
    document: &Value,
    description: &str,
) -> Result<(AttachedPolicy, StepOutcome)> {
    let step = format!("ensure policy {}", policy_name);
    ctx.started(&step);
    let result = ensure_attached_policy_inner(ctx, role, policy_name, document, description).await;
    match &result {
        Ok((_, outcome)) => ctx.finished(&step, outcome.clone()),
        Err(e) => ctx.finished(&step, StepOutcome::Failed(e.to_string())),
    }
    result
}

async fn ensure_attached_policy_inner(
    ctx: &ProvisionContext,
    role: &str,
    policy_name: &str,
    document: &Value,
    description: &str,
) -> Result<(AttachedPolicy, StepOutcome)> {
    let identity = ctx.clients.identity.as_ref();
    let body = document.to_string();
    let arn = ctx.policy_arn(policy_name);

    let policy = create_or_adopt(
        "create policy",
        policy_name,
        || identity.create_policy(policy_name, &body, description),
        || async {
            Ok(Some(ManagedPolicy {
                name: policy_name.to_string(),
                arn: arn.clone(),
            }))
        },
    )
    .await?;

    let outcome = match &policy {
        Adoption::Created(_) => StepOutcome::Created,
        Adoption::Adopted(p) => match replace_document(identity, &p.arn, &body).await {
            Ok(()) => StepOutcome::Updated,
            Err(e) => {
                tracing::warn!(policy = policy_name, error = %e, "could not update policy document");
                StepOutcome::Adopted
            }
        },
    };

    let policy = policy.into_inner();
    identity
        .attach_role_policy(role, &policy.arn)
        .await
        .map_err(KbError::step("attach policy"))?;

    Ok((
        AttachedPolicy {
            name: policy.name,
            arn: policy.arn,
        },
        outcome,
    ))
}

/// Publish `document` as the new default version of `policy_arn`, evicting
/// the oldest non-default version if the cap is reached.
pub async fn replace_document(
    identity: &dyn IdentityApi,
    policy_arn: &str,
    document: &str,
) -> ProviderResult<()> {
    match identity.list_policy_versions(policy_arn).await {
        Ok(mut versions) if versions.len() >= POLICY_VERSION_CAP => {
            versions.sort_by(|a, b| a.created.cmp(&b.created));
            if let Some(oldest) = versions.iter().find(|v| !v.is_default) {
                tracing::debug!(policy = policy_arn, version = %oldest.version_id, "evicting policy version");
                identity
                    .delete_policy_version(policy_arn, &oldest.version_id)
                    .await?;
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(policy = policy_arn, error = %e, "could not list policy versions");
        }
    }
    identity
        .create_policy_version(policy_arn, document, true)
        .await
}

/// Grant the execution role data-plane access to one vector collection.
pub async fn ensure_vector_access(
    ctx: &ProvisionContext,
    identity: &ExecutionIdentity,
    collection_id: &str,
) -> Result<(AttachedPolicy, StepOutcome)> {
    let name = ctx.names.policy(PolicyKind::VectorAccess);
    let document = policy_docs::vector_access(&ctx.region, &ctx.account, collection_id);
    ensure_attached_policy(
        ctx,
        &identity.role_name,
        &name,
        &document,
        PolicyKind::VectorAccess.description(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::PolicyVersion;
    use crate::memory::MemoryCloud;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn version_cap_evicts_oldest_non_default() {
        let cloud = MemoryCloud::new();
        let policy = cloud
            .create_policy("p", "{\"v\":0}", "test")
            .await
            .unwrap();
        for i in 1..POLICY_VERSION_CAP {
            cloud
                .create_policy_version(&policy.arn, &format!("{{\"v\":{}}}", i), true)
                .await
                .unwrap();
        }
        assert_eq!(
            cloud.list_policy_versions(&policy.arn).await.unwrap().len(),
            POLICY_VERSION_CAP
        );

        replace_document(&cloud, &policy.arn, "{\"v\":99}").await.unwrap();

        let versions: Vec<PolicyVersion> = cloud.list_policy_versions(&policy.arn).await.unwrap();
        assert_eq!(versions.len(), POLICY_VERSION_CAP);
        assert!(!versions.iter().any(|v| v.version_id == "v1"));
        let default = versions.iter().find(|v| v.is_default).unwrap();
        assert_eq!(cloud.policy_document(&policy.arn).unwrap(), "{\"v\":99}");
        assert_eq!(default.version_id, "v6");
    }

    #[test]
    fn versions_sort_oldest_first() {
        let mut versions = vec![
            PolicyVersion {
                version_id: "v2".into(),
                is_default: false,
                created: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            },
            PolicyVersion {
                version_id: "v1".into(),
                is_default: false,
                created: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            },
        ];
        versions.sort_by(|a, b| a.created.cmp(&b.created));
        assert_eq!(versions[0].version_id, "v1");
    }
}
