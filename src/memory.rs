//! In-memory provider implementing every facade trait.
//!
//! Used by the test suite and by `kbctl --dry-run`. State lives in one
//! `Mutex`; every call is appended to a trace so tests can assert ordering.
//! Long-running resources (collections, graphs, ingestion jobs) report a
//! transitional status for a configurable number of polls before settling.
//!
//! Conflicts behave like the real services: creating a named resource twice
//! returns [`ProviderError::AlreadyExists`], deleting a role with attached
//! policies or a policy that is still attached returns a `DeleteConflict`,
//! and a bucket with objects cannot be deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clients::*;
use crate::error::{ProviderError, ProviderResult};
use crate::models::IngestionStatus;

pub const MEMORY_ACCOUNT: &str = "111122223333";
pub const MEMORY_REGION: &str = "us-east-1";

type ErrorFactory = Box<dyn Fn() -> ProviderError + Send + Sync>;

struct Fault {
    op: String,
    target: Option<String>,
    /// `None` fails forever.
    remaining: Option<usize>,
    make: ErrorFactory,
}

struct StoredObject {
    key: String,
    version_id: String,
}

struct StoredRole {
    arn: String,
    trust: String,
    attached: Vec<String>,
    inline: Vec<String>,
}

struct StoredVersion {
    id: String,
    document: String,
    is_default: bool,
    created: DateTime<Utc>,
}

struct StoredPolicy {
    name: String,
    versions: Vec<StoredVersion>,
    next_version: u32,
}

struct Pending<T> {
    detail: T,
    polls_left: u32,
}

struct StoredJob {
    data_source_id: String,
    polls_left: u32,
    outcome: IngestionStatus,
}

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, Vec<StoredObject>>,
    foreign_buckets: BTreeSet<String>,
    roles: BTreeMap<String, StoredRole>,
    policies: BTreeMap<String, StoredPolicy>,
    security_policies: BTreeMap<(String, String), String>,
    access_policies: BTreeMap<String, String>,
    collections: BTreeMap<String, Pending<CollectionDetail>>,
    indexes: BTreeMap<(String, String), Value>,
    graphs: BTreeMap<String, Pending<GraphDetail>>,
    knowledge_bases: BTreeMap<String, KnowledgeBaseDetail>,
    kb_requests: BTreeMap<String, KnowledgeBaseRequest>,
    data_sources: BTreeMap<String, DataSourceDetail>,
    ds_requests: BTreeMap<String, DataSourceRequest>,
    jobs: BTreeMap<String, StoredJob>,
    log_groups: BTreeMap<String, Option<u32>>,
    delivery_sources: BTreeMap<String, DeliveryEndpoint>,
    delivery_destinations: BTreeMap<String, DeliveryEndpoint>,
    deliveries: BTreeMap<String, Delivery>,
    functions: BTreeMap<String, FunctionRequest>,
    calls: Vec<String>,
    faults: Vec<Fault>,
    counter: u64,
    settle_polls: u32,
    ingestion_polls: u32,
    ingestion_outcome: Option<IngestionStatus>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// A whole cloud account held in memory.
pub struct MemoryCloud {
    state: Mutex<State>,
    account: String,
    region: String,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                settle_polls: 1,
                ingestion_polls: 1,
                ..State::default()
            }),
            account: MEMORY_ACCOUNT.to_string(),
            region: MEMORY_REGION.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and apply any matching fault.
    fn enter(&self, op: &str, target: &str) -> ProviderResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", op, target));
        let hit = state.faults.iter_mut().find(|f| {
            f.op == op
                && f.target.as_deref().map_or(true, |t| t == target)
                && f.remaining != Some(0)
        });
        if let Some(fault) = hit {
            if let Some(n) = fault.remaining.as_mut() {
                *n -= 1;
            }
            return Err((fault.make)());
        }
        Ok(state)
    }

    // ── Test controls ────────────────────────────────────────────────────

    /// Make every call to `op` (optionally only for `target`) fail.
    pub fn fail_on<F>(&self, op: &str, target: Option<&str>, make: F)
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.push_fault(op, target, None, Box::new(make));
    }

    /// Make the next `times` calls to `op` fail, then behave normally.
    pub fn fail_times<F>(&self, op: &str, target: Option<&str>, times: usize, make: F)
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.push_fault(op, target, Some(times), Box::new(make));
    }

    fn push_fault(&self, op: &str, target: Option<&str>, remaining: Option<usize>, make: ErrorFactory) {
        self.lock().faults.push(Fault {
            op: op.to_string(),
            target: target.map(str::to_string),
            remaining,
            make,
        });
    }

    /// Polls a collection or graph spends in `CREATING`.
    pub fn set_settle_polls(&self, polls: u32) {
        self.lock().settle_polls = polls;
    }

    /// Polls an ingestion job spends `IN_PROGRESS`, and how it ends.
    pub fn set_ingestion(&self, polls: u32, outcome: IngestionStatus) {
        let mut state = self.lock();
        state.ingestion_polls = polls;
        state.ingestion_outcome = Some(outcome);
    }

    /// Register a bucket name as held by another account.
    pub fn claim_foreign_bucket(&self, bucket: &str) {
        self.lock().foreign_buckets.insert(bucket.to_string());
    }

    /// Every call made so far, as `"<op> <target>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == call)
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of live resources of every kind.
    pub fn resource_count(&self) -> usize {
        let s = self.lock();
        s.buckets.len()
            + s.roles.len()
            + s.policies.len()
            + s.security_policies.len()
            + s.access_policies.len()
            + s.collections.len()
            + s.indexes.len()
            + s.graphs.len()
            + s.knowledge_bases.len()
            + s.data_sources.len()
            + s.log_groups.len()
            + s.delivery_sources.len()
            + s.delivery_destinations.len()
            + s.deliveries.len()
            + s.functions.len()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objs| objs.iter().map(|o| o.key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.lock().roles.keys().cloned().collect()
    }

    pub fn role_trust(&self, role: &str) -> Option<String> {
        self.lock().roles.get(role).map(|r| r.trust.clone())
    }

    pub fn attached_policy_arns(&self, role: &str) -> Vec<String> {
        self.lock()
            .roles
            .get(role)
            .map(|r| r.attached.clone())
            .unwrap_or_default()
    }

    pub fn put_inline_policy(&self, role: &str, name: &str) {
        if let Some(r) = self.lock().roles.get_mut(role) {
            r.inline.push(name.to_string());
        }
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.lock().policies.values().map(|p| p.name.clone()).collect()
    }

    /// The default version's document.
    pub fn policy_document(&self, arn: &str) -> Option<String> {
        self.lock().policies.get(arn).and_then(|p| {
            p.versions
                .iter()
                .find(|v| v.is_default)
                .map(|v| v.document.clone())
        })
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.lock().collections.keys().cloned().collect()
    }

    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.lock()
            .indexes
            .iter()
            .find(|((_, name), _)| name == index)
            .map(|(_, body)| body.clone())
    }

    pub fn graph_names(&self) -> Vec<String> {
        self.lock()
            .graphs
            .values()
            .map(|g| g.detail.name.clone())
            .collect()
    }

    pub fn knowledge_base_names(&self) -> Vec<String> {
        self.lock()
            .knowledge_bases
            .values()
            .map(|kb| kb.name.clone())
            .collect()
    }

    pub fn knowledge_base_request(&self, name: &str) -> Option<KnowledgeBaseRequest> {
        self.lock().kb_requests.get(name).cloned()
    }

    pub fn data_source_names(&self) -> Vec<String> {
        self.lock()
            .data_sources
            .values()
            .map(|ds| ds.name.clone())
            .collect()
    }

    pub fn data_source_request(&self, name: &str) -> Option<DataSourceRequest> {
        self.lock().ds_requests.get(name).cloned()
    }

    pub fn log_group_retention(&self, name: &str) -> Option<Option<u32>> {
        self.lock().log_groups.get(name).copied()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.lock().functions.keys().cloned().collect()
    }

    pub fn function_request(&self, name: &str) -> Option<FunctionRequest> {
        self.lock().functions.get(name).cloned()
    }

    fn role_arn(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account, name)
    }
}

fn not_found(what: &str) -> ProviderError {
    ProviderError::NotFound(what.to_string())
}

fn exists(what: &str) -> ProviderError {
    ProviderError::AlreadyExists(what.to_string())
}

fn delete_conflict(message: &str) -> ProviderError {
    ProviderError::Service {
        code: "DeleteConflict".into(),
        message: message.to_string(),
    }
}

fn timestamp(counter: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + counter as i64, 0).unwrap_or_default()
}

/// Advance a pending resource by one poll.
fn settle<T: Clone>(pending: &mut Pending<T>, status: impl Fn(&mut T) -> &mut String, done: &str) -> T {
    if pending.polls_left == 0 {
        let s = status(&mut pending.detail);
        if *s == "CREATING" {
            *s = done.to_string();
        }
    } else {
        pending.polls_left -= 1;
    }
    pending.detail.clone()
}

// ═══════════════════════════════════════════════════════════════════════
// Facade implementations
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl AccountApi for MemoryCloud {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity> {
        let _state = self.enter("sts:GetCallerIdentity", "")?;
        Ok(CallerIdentity {
            account: self.account.clone(),
            arn: format!("arn:aws:iam::{}:user/operator", self.account),
            user_id: "AIDAMEMORYOPERATOR".into(),
        })
    }
}

#[async_trait]
impl ObjectStoreApi for MemoryCloud {
    async fn head_bucket(&self, bucket: &str) -> ProviderResult<BucketProbe> {
        let state = self.enter("s3:HeadBucket", bucket)?;
        Ok(if state.foreign_buckets.contains(bucket) {
            BucketProbe::Forbidden
        } else if state.buckets.contains_key(bucket) {
            BucketProbe::Owned
        } else {
            BucketProbe::Missing
        })
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> ProviderResult<()> {
        let mut state = self.enter("s3:CreateBucket", bucket)?;
        if state.foreign_buckets.contains(bucket) {
            return Err(ProviderError::NameTaken(bucket.to_string()));
        }
        if state.buckets.contains_key(bucket) {
            return Err(exists(bucket));
        }
        state.buckets.insert(bucket.to_string(), Vec::new());
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _body: Vec<u8>,
        _content_type: &str,
    ) -> ProviderResult<()> {
        let mut state = self.enter("s3:PutObject", &format!("{}/{}", bucket, key))?;
        let id = state.next_id();
        let objects = state.buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        objects.push(StoredObject {
            key: key.to_string(),
            version_id: format!("ver{}", id),
        });
        Ok(())
    }

    async fn list_object_versions(&self, bucket: &str) -> ProviderResult<Vec<ObjectVersion>> {
        let state = self.enter("s3:ListObjectVersions", bucket)?;
        let objects = state.buckets.get(bucket).ok_or_else(|| not_found(bucket))?;
        Ok(objects
            .iter()
            .map(|o| ObjectVersion {
                key: o.key.clone(),
                version_id: Some(o.version_id.clone()),
            })
            .collect())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> ProviderResult<()> {
        let mut state = self.enter("s3:DeleteObject", &format!("{}/{}", bucket, key))?;
        let objects = state.buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        objects.retain(|o| o.key != key || version_id.is_some_and(|v| v != o.version_id));
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> ProviderResult<()> {
        let mut state = self.enter("s3:DeleteBucket", bucket)?;
        match state.buckets.get(bucket) {
            None => Err(not_found(bucket)),
            Some(objects) if !objects.is_empty() => Err(ProviderError::Service {
                code: "BucketNotEmpty".into(),
                message: bucket.to_string(),
            }),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl IdentityApi for MemoryCloud {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        _description: &str,
    ) -> ProviderResult<Role> {
        let mut state = self.enter("iam:CreateRole", name)?;
        if state.roles.contains_key(name) {
            return Err(exists(name));
        }
        let arn = self.role_arn(name);
        state.roles.insert(
            name.to_string(),
            StoredRole {
                arn: arn.clone(),
                trust: trust_policy.to_string(),
                attached: Vec::new(),
                inline: Vec::new(),
            },
        );
        Ok(Role {
            name: name.to_string(),
            arn,
        })
    }

    async fn get_role(&self, name: &str) -> ProviderResult<Role> {
        let state = self.enter("iam:GetRole", name)?;
        state
            .roles
            .get(name)
            .map(|r| Role {
                name: name.to_string(),
                arn: r.arn.clone(),
            })
            .ok_or_else(|| not_found(name))
    }

    async fn update_assume_role_policy(&self, name: &str, trust_policy: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:UpdateAssumeRolePolicy", name)?;
        let role = state.roles.get_mut(name).ok_or_else(|| not_found(name))?;
        role.trust = trust_policy.to_string();
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:DeleteRole", name)?;
        let role = state.roles.get(name).ok_or_else(|| not_found(name))?;
        if !role.attached.is_empty() || !role.inline.is_empty() {
            return Err(delete_conflict("role still has policies"));
        }
        state.roles.remove(name);
        Ok(())
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        _description: &str,
    ) -> ProviderResult<ManagedPolicy> {
        let mut state = self.enter("iam:CreatePolicy", name)?;
        let arn = format!("arn:aws:iam::{}:policy/{}", self.account, name);
        if state.policies.contains_key(&arn) {
            return Err(exists(name));
        }
        let id = state.next_id();
        state.policies.insert(
            arn.clone(),
            StoredPolicy {
                name: name.to_string(),
                versions: vec![StoredVersion {
                    id: "v1".into(),
                    document: document.to_string(),
                    is_default: true,
                    created: timestamp(id),
                }],
                next_version: 2,
            },
        );
        Ok(ManagedPolicy {
            name: name.to_string(),
            arn,
        })
    }

    async fn create_policy_version(
        &self,
        policy_arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ProviderResult<()> {
        let mut state = self.enter("iam:CreatePolicyVersion", policy_arn)?;
        let id = state.next_id();
        let policy = state
            .policies
            .get_mut(policy_arn)
            .ok_or_else(|| not_found(policy_arn))?;
        if policy.versions.len() >= 5 {
            return Err(ProviderError::LimitExceeded(policy_arn.to_string()));
        }
        if set_as_default {
            for v in &mut policy.versions {
                v.is_default = false;
            }
        }
        policy.versions.push(StoredVersion {
            id: format!("v{}", policy.next_version),
            document: document.to_string(),
            is_default: set_as_default,
            created: timestamp(id),
        });
        policy.next_version += 1;
        Ok(())
    }

    async fn list_policy_versions(&self, policy_arn: &str) -> ProviderResult<Vec<PolicyVersion>> {
        let state = self.enter("iam:ListPolicyVersions", policy_arn)?;
        let policy = state
            .policies
            .get(policy_arn)
            .ok_or_else(|| not_found(policy_arn))?;
        // Newest first, as the service returns them.
        Ok(policy
            .versions
            .iter()
            .rev()
            .map(|v| PolicyVersion {
                version_id: v.id.clone(),
                is_default: v.is_default,
                created: Some(v.created),
            })
            .collect())
    }

    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:DeletePolicyVersion", policy_arn)?;
        let policy = state
            .policies
            .get_mut(policy_arn)
            .ok_or_else(|| not_found(policy_arn))?;
        match policy.versions.iter().position(|v| v.id == version_id) {
            Some(i) if policy.versions[i].is_default => {
                Err(delete_conflict("cannot delete the default version"))
            }
            Some(i) => {
                policy.versions.remove(i);
                Ok(())
            }
            None => Err(not_found(version_id)),
        }
    }

    async fn delete_policy(&self, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:DeletePolicy", policy_arn)?;
        if !state.policies.contains_key(policy_arn) {
            return Err(not_found(policy_arn));
        }
        if state
            .roles
            .values()
            .any(|r| r.attached.iter().any(|a| a == policy_arn))
        {
            return Err(delete_conflict("policy is still attached"));
        }
        state.policies.remove(policy_arn);
        Ok(())
    }

    async fn attach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:AttachRolePolicy", &format!("{} {}", role, policy_arn))?;
        let customer = policy_arn.contains(&format!(":{}:", self.account));
        if customer && !state.policies.contains_key(policy_arn) {
            return Err(not_found(policy_arn));
        }
        let r = state.roles.get_mut(role).ok_or_else(|| not_found(role))?;
        if !r.attached.iter().any(|a| a == policy_arn) {
            r.attached.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:DetachRolePolicy", &format!("{} {}", role, policy_arn))?;
        let r = state.roles.get_mut(role).ok_or_else(|| not_found(role))?;
        let before = r.attached.len();
        r.attached.retain(|a| a != policy_arn);
        if r.attached.len() == before {
            return Err(not_found(policy_arn));
        }
        Ok(())
    }

    async fn list_attached_role_policies(&self, role: &str) -> ProviderResult<Vec<ManagedPolicy>> {
        let state = self.enter("iam:ListAttachedRolePolicies", role)?;
        let r = state.roles.get(role).ok_or_else(|| not_found(role))?;
        Ok(r.attached
            .iter()
            .map(|arn| ManagedPolicy {
                name: arn.rsplit('/').next().unwrap_or(arn).to_string(),
                arn: arn.clone(),
            })
            .collect())
    }

    async fn list_role_policies(&self, role: &str) -> ProviderResult<Vec<String>> {
        let state = self.enter("iam:ListRolePolicies", role)?;
        let r = state.roles.get(role).ok_or_else(|| not_found(role))?;
        Ok(r.inline.clone())
    }

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> ProviderResult<()> {
        let mut state = self.enter("iam:DeleteRolePolicy", &format!("{} {}", role, policy_name))?;
        let r = state.roles.get_mut(role).ok_or_else(|| not_found(role))?;
        r.inline.retain(|p| p != policy_name);
        Ok(())
    }
}

#[async_trait]
impl VectorSearchApi for MemoryCloud {
    async fn create_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
        policy: &str,
    ) -> ProviderResult<PolicySummary> {
        let mut state = self.enter("aoss:CreateSecurityPolicy", name)?;
        let key = (kind.as_str().to_string(), name.to_string());
        if state.security_policies.contains_key(&key) {
            return Err(exists(name));
        }
        state.security_policies.insert(key, policy.to_string());
        Ok(PolicySummary {
            name: name.to_string(),
            version: "1".into(),
        })
    }

    async fn get_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
    ) -> ProviderResult<PolicySummary> {
        let state = self.enter("aoss:GetSecurityPolicy", name)?;
        let key = (kind.as_str().to_string(), name.to_string());
        if !state.security_policies.contains_key(&key) {
            return Err(not_found(name));
        }
        Ok(PolicySummary {
            name: name.to_string(),
            version: "1".into(),
        })
    }

    async fn delete_security_policy(&self, name: &str, kind: SecurityPolicyType) -> ProviderResult<()> {
        let mut state = self.enter("aoss:DeleteSecurityPolicy", name)?;
        let key = (kind.as_str().to_string(), name.to_string());
        state
            .security_policies
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn create_access_policy(&self, name: &str, policy: &str) -> ProviderResult<PolicySummary> {
        let mut state = self.enter("aoss:CreateAccessPolicy", name)?;
        if state.access_policies.contains_key(name) {
            return Err(exists(name));
        }
        state.access_policies.insert(name.to_string(), policy.to_string());
        Ok(PolicySummary {
            name: name.to_string(),
            version: "1".into(),
        })
    }

    async fn get_access_policy(&self, name: &str) -> ProviderResult<PolicySummary> {
        let state = self.enter("aoss:GetAccessPolicy", name)?;
        if !state.access_policies.contains_key(name) {
            return Err(not_found(name));
        }
        Ok(PolicySummary {
            name: name.to_string(),
            version: "1".into(),
        })
    }

    async fn delete_access_policy(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("aoss:DeleteAccessPolicy", name)?;
        state
            .access_policies
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn create_collection(&self, name: &str) -> ProviderResult<CollectionDetail> {
        let mut state = self.enter("aoss:CreateCollection", name)?;
        if state.collections.contains_key(name) {
            return Err(exists(name));
        }
        let id = format!("coll{:016}", state.next_id());
        let detail = CollectionDetail {
            arn: format!("arn:aws:aoss:{}:{}:collection/{}", self.region, self.account, id),
            id,
            name: name.to_string(),
            status: "CREATING".into(),
        };
        let polls_left = state.settle_polls;
        state.collections.insert(
            name.to_string(),
            Pending {
                detail: detail.clone(),
                polls_left,
            },
        );
        Ok(detail)
    }

    async fn batch_get_collection(&self, name: &str) -> ProviderResult<Option<CollectionDetail>> {
        let mut state = self.enter("aoss:BatchGetCollection", name)?;
        Ok(state
            .collections
            .get_mut(name)
            .map(|p| settle(p, |d| &mut d.status, "ACTIVE")))
    }

    async fn delete_collection(&self, id: &str) -> ProviderResult<()> {
        let mut state = self.enter("aoss:DeleteCollection", id)?;
        let name = state
            .collections
            .iter()
            .find(|(_, p)| p.detail.id == id)
            .map(|(n, _)| n.clone())
            .ok_or_else(|| not_found(id))?;
        state.collections.remove(&name);
        state.indexes.retain(|(endpoint, _), _| !endpoint.contains(id));
        Ok(())
    }

    async fn create_index(&self, endpoint: &str, index: &str, body: &Value) -> ProviderResult<()> {
        let mut state = self.enter("aoss:CreateIndex", index)?;
        let key = (endpoint.to_string(), index.to_string());
        if state.indexes.contains_key(&key) {
            return Err(exists(index));
        }
        state.indexes.insert(key, body.clone());
        Ok(())
    }
}

#[async_trait]
impl GraphApi for MemoryCloud {
    async fn create_graph(&self, request: &GraphRequest) -> ProviderResult<GraphDetail> {
        let mut state = self.enter("neptune-graph:CreateGraph", &request.name)?;
        if state.graphs.values().any(|g| g.detail.name == request.name) {
            return Err(exists(&request.name));
        }
        let id = format!("g-{:010}", state.next_id());
        let detail = GraphDetail {
            arn: format!("arn:aws:neptune-graph:{}:{}:graph/{}", self.region, self.account, id),
            id: id.clone(),
            name: request.name.clone(),
            status: "CREATING".into(),
            deletion_protection: request.deletion_protection,
        };
        let polls_left = state.settle_polls;
        state.graphs.insert(
            id,
            Pending {
                detail: detail.clone(),
                polls_left,
            },
        );
        Ok(detail)
    }

    async fn get_graph(&self, id: &str) -> ProviderResult<GraphDetail> {
        let mut state = self.enter("neptune-graph:GetGraph", id)?;
        state
            .graphs
            .get_mut(id)
            .map(|p| settle(p, |d| &mut d.status, "AVAILABLE"))
            .ok_or_else(|| not_found(id))
    }

    async fn list_graphs(&self) -> ProviderResult<Vec<GraphDetail>> {
        let state = self.enter("neptune-graph:ListGraphs", "")?;
        Ok(state.graphs.values().map(|p| p.detail.clone()).collect())
    }

    async fn update_deletion_protection(&self, id: &str, enabled: bool) -> ProviderResult<GraphDetail> {
        let mut state = self.enter("neptune-graph:UpdateGraph", id)?;
        let graph = state.graphs.get_mut(id).ok_or_else(|| not_found(id))?;
        graph.detail.deletion_protection = enabled;
        Ok(graph.detail.clone())
    }

    async fn delete_graph(&self, id: &str, _skip_snapshot: bool) -> ProviderResult<()> {
        let mut state = self.enter("neptune-graph:DeleteGraph", id)?;
        let graph = state.graphs.get(id).ok_or_else(|| not_found(id))?;
        if graph.detail.deletion_protection {
            return Err(ProviderError::Service {
                code: "ValidationException".into(),
                message: "deletion protection is enabled".into(),
            });
        }
        state.graphs.remove(id);
        Ok(())
    }
}

#[async_trait]
impl KnowledgeApi for MemoryCloud {
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
    ) -> ProviderResult<KnowledgeBaseDetail> {
        let mut state = self.enter("bedrock:CreateKnowledgeBase", &request.name)?;
        if state.knowledge_bases.values().any(|kb| kb.name == request.name) {
            return Err(exists(&request.name));
        }
        let id = format!("KB{:08}", state.next_id());
        let detail = KnowledgeBaseDetail {
            arn: format!(
                "arn:aws:bedrock:{}:{}:knowledge-base/{}",
                self.region, self.account, id
            ),
            id: id.clone(),
            name: request.name.clone(),
            status: "ACTIVE".into(),
            role_arn: request.role_arn.clone(),
        };
        state.knowledge_bases.insert(id, detail.clone());
        state.kb_requests.insert(request.name.clone(), request.clone());
        Ok(detail)
    }

    async fn get_knowledge_base(&self, id: &str) -> ProviderResult<KnowledgeBaseDetail> {
        let state = self.enter("bedrock:GetKnowledgeBase", id)?;
        state
            .knowledge_bases
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list_knowledge_bases(&self) -> ProviderResult<Vec<KnowledgeBaseDetail>> {
        let state = self.enter("bedrock:ListKnowledgeBases", "")?;
        // Summaries, as the real listing returns them.
        Ok(state
            .knowledge_bases
            .values()
            .map(|kb| KnowledgeBaseDetail {
                arn: String::new(),
                role_arn: String::new(),
                ..kb.clone()
            })
            .collect())
    }

    async fn delete_knowledge_base(&self, id: &str) -> ProviderResult<()> {
        let mut state = self.enter("bedrock:DeleteKnowledgeBase", id)?;
        if !state.knowledge_bases.contains_key(id) {
            return Err(not_found(id));
        }
        if state.data_sources.values().any(|ds| ds.knowledge_base_id == id) {
            return Err(ProviderError::Service {
                code: "ValidationException".into(),
                message: "knowledge base still has data sources".into(),
            });
        }
        if let Some(kb) = state.knowledge_bases.remove(id) {
            state.kb_requests.remove(&kb.name);
        }
        Ok(())
    }

    async fn create_data_source(
        &self,
        knowledge_base_id: &str,
        request: &DataSourceRequest,
    ) -> ProviderResult<DataSourceDetail> {
        let mut state = self.enter("bedrock:CreateDataSource", &request.name)?;
        if !state.knowledge_bases.contains_key(knowledge_base_id) {
            return Err(not_found(knowledge_base_id));
        }
        if state
            .data_sources
            .values()
            .any(|ds| ds.knowledge_base_id == knowledge_base_id && ds.name == request.name)
        {
            return Err(exists(&request.name));
        }
        let id = format!("DS{:08}", state.next_id());
        let detail = DataSourceDetail {
            id: id.clone(),
            name: request.name.clone(),
            knowledge_base_id: knowledge_base_id.to_string(),
            status: "AVAILABLE".into(),
        };
        state.data_sources.insert(id, detail.clone());
        state.ds_requests.insert(request.name.clone(), request.clone());
        Ok(detail)
    }

    async fn list_data_sources(&self, knowledge_base_id: &str) -> ProviderResult<Vec<DataSourceDetail>> {
        let state = self.enter("bedrock:ListDataSources", knowledge_base_id)?;
        if !state.knowledge_bases.contains_key(knowledge_base_id) {
            return Err(not_found(knowledge_base_id));
        }
        Ok(state
            .data_sources
            .values()
            .filter(|ds| ds.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect())
    }

    async fn delete_data_source(&self, knowledge_base_id: &str, id: &str) -> ProviderResult<()> {
        let mut state = self.enter("bedrock:DeleteDataSource", id)?;
        let owned = state
            .data_sources
            .get(id)
            .is_some_and(|ds| ds.knowledge_base_id == knowledge_base_id);
        if !owned {
            return Err(not_found(id));
        }
        if let Some(ds) = state.data_sources.remove(id) {
            state.ds_requests.remove(&ds.name);
        }
        Ok(())
    }

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> ProviderResult<IngestionJob> {
        let mut state = self.enter("bedrock:StartIngestionJob", data_source_id)?;
        let owned = state
            .data_sources
            .get(data_source_id)
            .is_some_and(|ds| ds.knowledge_base_id == knowledge_base_id);
        if !owned {
            return Err(not_found(data_source_id));
        }
        let id = format!("JOB{:07}", state.next_id());
        let job = StoredJob {
            data_source_id: data_source_id.to_string(),
            polls_left: state.ingestion_polls,
            outcome: state.ingestion_outcome.unwrap_or(IngestionStatus::Complete),
        };
        state.jobs.insert(id.clone(), job);
        Ok(IngestionJob {
            id,
            status: IngestionStatus::Starting.as_str().into(),
        })
    }

    async fn get_ingestion_job(
        &self,
        _knowledge_base_id: &str,
        data_source_id: &str,
        job_id: &str,
    ) -> ProviderResult<IngestionJob> {
        let mut state = self.enter("bedrock:GetIngestionJob", job_id)?;
        let job = state
            .jobs
            .get_mut(job_id)
            .filter(|j| j.data_source_id == data_source_id)
            .ok_or_else(|| not_found(job_id))?;
        let status = if job.polls_left > 0 {
            job.polls_left -= 1;
            IngestionStatus::InProgress
        } else {
            job.outcome
        };
        Ok(IngestionJob {
            id: job_id.to_string(),
            status: status.as_str().into(),
        })
    }
}

#[async_trait]
impl LogDeliveryApi for MemoryCloud {
    async fn create_log_group(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("logs:CreateLogGroup", name)?;
        if state.log_groups.contains_key(name) {
            return Err(exists(name));
        }
        state.log_groups.insert(name.to_string(), None);
        Ok(())
    }

    async fn put_retention_policy(&self, name: &str, days: u32) -> ProviderResult<()> {
        let mut state = self.enter("logs:PutRetentionPolicy", name)?;
        let group = state.log_groups.get_mut(name).ok_or_else(|| not_found(name))?;
        *group = Some(days);
        Ok(())
    }

    async fn delete_log_group(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("logs:DeleteLogGroup", name)?;
        state
            .log_groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn put_delivery_source(
        &self,
        name: &str,
        _resource_arn: &str,
        _log_type: &str,
    ) -> ProviderResult<DeliveryEndpoint> {
        let mut state = self.enter("logs:PutDeliverySource", name)?;
        let endpoint = DeliveryEndpoint {
            name: name.to_string(),
            arn: format!(
                "arn:aws:logs:{}:{}:delivery-source:{}",
                self.region, self.account, name
            ),
        };
        state.delivery_sources.insert(name.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    async fn get_delivery_source(&self, name: &str) -> ProviderResult<DeliveryEndpoint> {
        let state = self.enter("logs:GetDeliverySource", name)?;
        state
            .delivery_sources
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn delete_delivery_source(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("logs:DeleteDeliverySource", name)?;
        if state.deliveries.values().any(|d| d.source_name == name) {
            return Err(ProviderError::Service {
                code: "ValidationException".into(),
                message: "delivery source is in use".into(),
            });
        }
        state
            .delivery_sources
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn put_delivery_destination(
        &self,
        name: &str,
        _target_arn: &str,
    ) -> ProviderResult<DeliveryEndpoint> {
        let mut state = self.enter("logs:PutDeliveryDestination", name)?;
        let endpoint = DeliveryEndpoint {
            name: name.to_string(),
            arn: format!(
                "arn:aws:logs:{}:{}:delivery-destination:{}",
                self.region, self.account, name
            ),
        };
        state
            .delivery_destinations
            .insert(name.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    async fn get_delivery_destination(&self, name: &str) -> ProviderResult<DeliveryEndpoint> {
        let state = self.enter("logs:GetDeliveryDestination", name)?;
        state
            .delivery_destinations
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn delete_delivery_destination(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("logs:DeleteDeliveryDestination", name)?;
        state
            .delivery_destinations
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn create_delivery(
        &self,
        source_name: &str,
        destination_arn: &str,
    ) -> ProviderResult<Delivery> {
        let mut state = self.enter("logs:CreateDelivery", source_name)?;
        if state
            .deliveries
            .values()
            .any(|d| d.source_name == source_name && d.destination_arn == destination_arn)
        {
            return Err(exists(source_name));
        }
        if !state.delivery_sources.contains_key(source_name) {
            return Err(not_found(source_name));
        }
        let id = format!("dlv{:08}", state.next_id());
        let delivery = Delivery {
            id: id.clone(),
            source_name: source_name.to_string(),
            destination_arn: destination_arn.to_string(),
        };
        state.deliveries.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn describe_deliveries(&self) -> ProviderResult<Vec<Delivery>> {
        let state = self.enter("logs:DescribeDeliveries", "")?;
        Ok(state.deliveries.values().cloned().collect())
    }

    async fn delete_delivery(&self, id: &str) -> ProviderResult<()> {
        let mut state = self.enter("logs:DeleteDelivery", id)?;
        state
            .deliveries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl FunctionApi for MemoryCloud {
    async fn create_function(&self, request: &FunctionRequest) -> ProviderResult<FunctionDetail> {
        let mut state = self.enter("lambda:CreateFunction", &request.name)?;
        if state.functions.contains_key(&request.name) {
            return Err(exists(&request.name));
        }
        state.functions.insert(request.name.clone(), request.clone());
        Ok(FunctionDetail {
            name: request.name.clone(),
            arn: format!(
                "arn:aws:lambda:{}:{}:function:{}",
                self.region, self.account, request.name
            ),
        })
    }

    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDetail> {
        let state = self.enter("lambda:GetFunction", name)?;
        if !state.functions.contains_key(name) {
            return Err(not_found(name));
        }
        Ok(FunctionDetail {
            name: name.to_string(),
            arn: format!(
                "arn:aws:lambda:{}:{}:function:{}",
                self.region, self.account, name
            ),
        })
    }

    async fn delete_function(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.enter("lambda:DeleteFunction", name)?;
        state
            .functions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }
}
