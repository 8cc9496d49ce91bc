//! Resource client facade.
//!
//! One async trait per external provider. Methods map one-to-one onto
//! provider requests and carry no orchestration logic: no retries, no
//! adoption, no polling. Errors are folded into [`ProviderError`] so that
//! callers branch on meaning rather than service-specific codes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Clients                     │
//! │  account · storage · identity · vector ·     │
//! │  graph · knowledge · logs · functions        │
//! └──────────────┬───────────────────────────────┘
//!        ┌───────┴────────┐
//!        ▼                ▼
//!   aws::AwsProvider  memory::MemoryCloud
//!   (SigV4 + HTTP)    (in-process fake)
//! ```
//!
//! [`Clients`] is built once per orchestrator and handed to every
//! provisioner; there is no process-wide client state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ProviderResult;

// ═══════════════════════════════════════════════════════════════════════
// Account
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity>;
}

// ═══════════════════════════════════════════════════════════════════════
// Object storage
// ═══════════════════════════════════════════════════════════════════════

/// Result of probing a bucket name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketProbe {
    /// Exists and the caller can use it.
    Owned,
    Missing,
    /// Exists but belongs to someone else (or the caller lacks access).
    Forbidden,
}

/// One object version or delete marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: Option<String>,
}

#[async_trait]
pub trait ObjectStoreApi: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> ProviderResult<BucketProbe>;

    /// Create a bucket. `us-east-1` takes no location constraint.
    async fn create_bucket(&self, bucket: &str, region: &str) -> ProviderResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> ProviderResult<()>;

    /// Every object version and delete marker in the bucket, across pages.
    async fn list_object_versions(&self, bucket: &str) -> ProviderResult<Vec<ObjectVersion>>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> ProviderResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Identity and access
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPolicy {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVersion {
    pub version_id: String,
    pub is_default: bool,
    pub created: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> ProviderResult<Role>;
    async fn get_role(&self, name: &str) -> ProviderResult<Role>;
    async fn update_assume_role_policy(&self, name: &str, trust_policy: &str) -> ProviderResult<()>;
    async fn delete_role(&self, name: &str) -> ProviderResult<()>;

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: &str,
    ) -> ProviderResult<ManagedPolicy>;
    async fn create_policy_version(
        &self,
        policy_arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ProviderResult<()>;
    async fn list_policy_versions(&self, policy_arn: &str) -> ProviderResult<Vec<PolicyVersion>>;
    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> ProviderResult<()>;
    async fn delete_policy(&self, policy_arn: &str) -> ProviderResult<()>;

    /// Attaching an already-attached policy succeeds.
    async fn attach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()>;
    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()>;
    async fn list_attached_role_policies(&self, role: &str) -> ProviderResult<Vec<ManagedPolicy>>;

    /// Names of inline policies embedded in the role.
    async fn list_role_policies(&self, role: &str) -> ProviderResult<Vec<String>>;
    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Vector search
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicyType {
    Encryption,
    Network,
}

impl SecurityPolicyType {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityPolicyType::Encryption => "encryption",
            SecurityPolicyType::Network => "network",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySummary {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDetail {
    pub id: String,
    pub name: String,
    pub arn: String,
    /// `CREATING`, `ACTIVE`, `FAILED` or `DELETING`.
    pub status: String,
}

#[async_trait]
pub trait VectorSearchApi: Send + Sync {
    async fn create_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
        policy: &str,
    ) -> ProviderResult<PolicySummary>;
    async fn get_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
    ) -> ProviderResult<PolicySummary>;
    async fn delete_security_policy(&self, name: &str, kind: SecurityPolicyType) -> ProviderResult<()>;

    async fn create_access_policy(&self, name: &str, policy: &str) -> ProviderResult<PolicySummary>;
    async fn get_access_policy(&self, name: &str) -> ProviderResult<PolicySummary>;
    async fn delete_access_policy(&self, name: &str) -> ProviderResult<()>;

    async fn create_collection(&self, name: &str) -> ProviderResult<CollectionDetail>;
    /// Look a collection up by name. `None` when it does not exist.
    async fn batch_get_collection(&self, name: &str) -> ProviderResult<Option<CollectionDetail>>;
    async fn delete_collection(&self, id: &str) -> ProviderResult<()>;

    /// Create an index on the collection's data-plane endpoint.
    async fn create_index(&self, endpoint: &str, index: &str, body: &Value) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Graph
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    pub name: String,
    pub dimension: u32,
    pub provisioned_memory: u32,
    pub replica_count: u32,
    pub public_connectivity: bool,
    pub deletion_protection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDetail {
    pub id: String,
    pub name: String,
    pub arn: String,
    /// `CREATING`, `AVAILABLE`, `FAILED`, `DELETING`, ...
    pub status: String,
    pub deletion_protection: bool,
}

#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn create_graph(&self, request: &GraphRequest) -> ProviderResult<GraphDetail>;
    async fn get_graph(&self, id: &str) -> ProviderResult<GraphDetail>;
    async fn list_graphs(&self) -> ProviderResult<Vec<GraphDetail>>;
    async fn update_deletion_protection(&self, id: &str, enabled: bool) -> ProviderResult<GraphDetail>;
    async fn delete_graph(&self, id: &str, skip_snapshot: bool) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Knowledge service
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseRequest {
    pub name: String,
    pub description: String,
    pub role_arn: String,
    pub configuration: Value,
    /// Absent for structured (warehouse) knowledge bases.
    pub storage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseDetail {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub status: String,
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceRequest {
    pub name: String,
    pub description: String,
    pub configuration: Value,
    pub vector_ingestion: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceDetail {
    pub id: String,
    pub name: String,
    pub knowledge_base_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJob {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
    ) -> ProviderResult<KnowledgeBaseDetail>;
    async fn get_knowledge_base(&self, id: &str) -> ProviderResult<KnowledgeBaseDetail>;
    /// All knowledge bases in the account and region, across pages.
    /// Summaries may leave `arn` and `role_arn` empty.
    async fn list_knowledge_bases(&self) -> ProviderResult<Vec<KnowledgeBaseDetail>>;
    async fn delete_knowledge_base(&self, id: &str) -> ProviderResult<()>;

    async fn create_data_source(
        &self,
        knowledge_base_id: &str,
        request: &DataSourceRequest,
    ) -> ProviderResult<DataSourceDetail>;
    async fn list_data_sources(&self, knowledge_base_id: &str) -> ProviderResult<Vec<DataSourceDetail>>;
    async fn delete_data_source(&self, knowledge_base_id: &str, id: &str) -> ProviderResult<()>;

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> ProviderResult<IngestionJob>;
    async fn get_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        job_id: &str,
    ) -> ProviderResult<IngestionJob>;
}

// ═══════════════════════════════════════════════════════════════════════
// Log delivery
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEndpoint {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub source_name: String,
    pub destination_arn: String,
}

#[async_trait]
pub trait LogDeliveryApi: Send + Sync {
    async fn create_log_group(&self, name: &str) -> ProviderResult<()>;
    async fn put_retention_policy(&self, name: &str, days: u32) -> ProviderResult<()>;
    async fn delete_log_group(&self, name: &str) -> ProviderResult<()>;

    async fn put_delivery_source(
        &self,
        name: &str,
        resource_arn: &str,
        log_type: &str,
    ) -> ProviderResult<DeliveryEndpoint>;
    async fn get_delivery_source(&self, name: &str) -> ProviderResult<DeliveryEndpoint>;
    async fn delete_delivery_source(&self, name: &str) -> ProviderResult<()>;

    async fn put_delivery_destination(
        &self,
        name: &str,
        target_arn: &str,
    ) -> ProviderResult<DeliveryEndpoint>;
    async fn get_delivery_destination(&self, name: &str) -> ProviderResult<DeliveryEndpoint>;
    async fn delete_delivery_destination(&self, name: &str) -> ProviderResult<()>;

    async fn create_delivery(
        &self,
        source_name: &str,
        destination_arn: &str,
    ) -> ProviderResult<Delivery>;
    async fn describe_deliveries(&self) -> ProviderResult<Vec<Delivery>>;
    async fn delete_delivery(&self, id: &str) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRequest {
    pub name: String,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: u32,
    /// Deployment package.
    pub zip: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDetail {
    pub name: String,
    pub arn: String,
}

#[async_trait]
pub trait FunctionApi: Send + Sync {
    async fn create_function(&self, request: &FunctionRequest) -> ProviderResult<FunctionDetail>;
    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDetail>;
    async fn delete_function(&self, name: &str) -> ProviderResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════

/// The set of provider clients one orchestrator instance works with.
#[derive(Clone)]
pub struct Clients {
    pub account: Arc<dyn AccountApi>,
    pub storage: Arc<dyn ObjectStoreApi>,
    pub identity: Arc<dyn IdentityApi>,
    pub vector: Arc<dyn VectorSearchApi>,
    pub graph: Arc<dyn GraphApi>,
    pub knowledge: Arc<dyn KnowledgeApi>,
    pub logs: Arc<dyn LogDeliveryApi>,
    pub functions: Arc<dyn FunctionApi>,
}

impl Clients {
    /// Use one value that implements every facade trait for all of them.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: AccountApi
            + ObjectStoreApi
            + IdentityApi
            + VectorSearchApi
            + GraphApi
            + KnowledgeApi
            + LogDeliveryApi
            + FunctionApi
            + 'static,
    {
        Self {
            account: provider.clone(),
            storage: provider.clone(),
            identity: provider.clone(),
            vector: provider.clone(),
            graph: provider.clone(),
            knowledge: provider.clone(),
            logs: provider.clone(),
            functions: provider,
        }
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}
