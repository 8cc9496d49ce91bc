//! The caller-supplied description of a knowledge base deployment.
//!
//! Raw configuration arrives through [`crate::config`] and is turned into a
//! [`ResourceSpec`] by [`ResourceSpec::from_config`], which performs every
//! validation up front. Nothing remote is touched until a spec exists, so a
//! bad model id or a malformed data-source descriptor never leaves a
//! half-built deployment behind.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::{self, ModelRole};
use crate::config::{Config, TransformConfig};
use crate::error::{KbError, Result};

// ═══════════════════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════════════════

/// Which index technology backs retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexBackend {
    /// Serverless vector collection with a k-NN index.
    #[default]
    VectorSearch,
    /// Analytics graph with vector search enabled.
    Graph,
    /// Structured knowledge base answered by a warehouse query engine.
    Warehouse,
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IndexBackend::VectorSearch => "VECTOR_SEARCH",
            IndexBackend::Graph => "GRAPH",
            IndexBackend::Warehouse => "WAREHOUSE",
        })
    }
}

/// Parser used for multimodal documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ParserKind {
    /// A generation model reads each page.
    #[default]
    #[serde(rename = "BEDROCK_FOUNDATION_MODEL")]
    FoundationModel,
    /// The managed multimodal parsing service.
    #[serde(rename = "BEDROCK_DATA_AUTOMATION")]
    DataAutomation,
}

/// How documents are split before embedding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkingStrategy {
    /// Each document is one chunk.
    None,
    FixedSize {
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
        #[serde(default = "default_overlap_percentage")]
        overlap_percentage: u32,
    },
    Hierarchical {
        #[serde(default = "default_parent_max_tokens")]
        parent_max_tokens: u32,
        #[serde(default = "default_max_tokens")]
        child_max_tokens: u32,
        #[serde(default = "default_overlap_tokens")]
        overlap_tokens: u32,
    },
    Semantic {
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
        #[serde(default = "default_buffer_size")]
        buffer_size: u32,
        #[serde(default = "default_breakpoint_percentile")]
        breakpoint_percentile_threshold: u32,
    },
    /// Entity extraction by a generation model; graph backend only.
    GraphContext,
    /// Post-chunking transform function reading and writing the intermediate bucket.
    Custom,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        ChunkingStrategy::FixedSize {
            max_tokens: default_max_tokens(),
            overlap_percentage: default_overlap_percentage(),
        }
    }
}

impl ChunkingStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkingStrategy::None => "NONE",
            ChunkingStrategy::FixedSize { .. } => "FIXED_SIZE",
            ChunkingStrategy::Hierarchical { .. } => "HIERARCHICAL",
            ChunkingStrategy::Semantic { .. } => "SEMANTIC",
            ChunkingStrategy::GraphContext => "GRAPH_CONTEXT",
            ChunkingStrategy::Custom => "CUSTOM",
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            ChunkingStrategy::FixedSize {
                max_tokens,
                overlap_percentage,
            } => {
                require(max_tokens > 0, "chunking.max_tokens must be > 0")?;
                require(
                    (1..=99).contains(&overlap_percentage),
                    "chunking.overlap_percentage must be in [1, 99]",
                )
            }
            ChunkingStrategy::Hierarchical {
                parent_max_tokens,
                child_max_tokens,
                overlap_tokens,
            } => {
                require(child_max_tokens > 0, "chunking.child_max_tokens must be > 0")?;
                require(
                    parent_max_tokens > child_max_tokens,
                    "chunking.parent_max_tokens must exceed chunking.child_max_tokens",
                )?;
                require(
                    overlap_tokens < child_max_tokens,
                    "chunking.overlap_tokens must be smaller than chunking.child_max_tokens",
                )
            }
            ChunkingStrategy::Semantic {
                max_tokens,
                buffer_size,
                breakpoint_percentile_threshold,
            } => {
                require(max_tokens > 0, "chunking.max_tokens must be > 0")?;
                require(buffer_size <= 1, "chunking.buffer_size must be 0 or 1")?;
                require(
                    (50..=99).contains(&breakpoint_percentile_threshold),
                    "chunking.breakpoint_percentile_threshold must be in [50, 99]",
                )
            }
            ChunkingStrategy::None | ChunkingStrategy::GraphContext | ChunkingStrategy::Custom => {
                Ok(())
            }
        }
    }
}

fn default_max_tokens() -> u32 {
    300
}
fn default_overlap_percentage() -> u32 {
    20
}
fn default_parent_max_tokens() -> u32 {
    1500
}
fn default_overlap_tokens() -> u32 {
    60
}
fn default_buffer_size() -> u32 {
    1
}
fn default_breakpoint_percentile() -> u32 {
    95
}

// ═══════════════════════════════════════════════════════════════════════
// Data source descriptors
// ═══════════════════════════════════════════════════════════════════════

/// Credential style for SaaS connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    Basic,
    #[serde(rename = "OAUTH2_CLIENT_CREDENTIALS")]
    OAuth2ClientCredentials,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::Basic => "BASIC",
            AuthType::OAuth2ClientCredentials => "OAUTH2_CLIENT_CREDENTIALS",
        }
    }
}

/// How far a web crawl may wander from its seed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlScope {
    #[default]
    HostOnly,
    Subdomains,
    Default,
}

impl CrawlScope {
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlScope::HostOnly => "HOST_ONLY",
            CrawlScope::Subdomains => "SUBDOMAINS",
            CrawlScope::Default => "DEFAULT",
        }
    }
}

/// Regex include/exclude filters for one SaaS object type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PatternFilter {
    pub object_type: String,
    #[serde(default)]
    pub inclusion_filters: Vec<String>,
    #[serde(default)]
    pub exclusion_filters: Vec<String>,
}

fn default_saas_filters() -> Vec<PatternFilter> {
    vec![PatternFilter {
        object_type: "Attachment".to_string(),
        inclusion_filters: vec![r".*\.pdf".to_string()],
        exclusion_filters: vec![r".*private.*\.pdf".to_string()],
    }]
}

fn default_rate_limit() -> u32 {
    50
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreSource {
    pub bucket_name: String,
    #[serde(default)]
    pub inclusion_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfluenceSource {
    pub host_url: String,
    pub auth_type: AuthType,
    pub credentials_secret_arn: String,
    #[serde(default = "default_saas_filters")]
    pub filters: Vec<PatternFilter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SharePointSource {
    pub tenant_id: String,
    pub domain: String,
    pub site_urls: Vec<String>,
    pub auth_type: AuthType,
    pub credentials_secret_arn: String,
    #[serde(default = "default_saas_filters")]
    pub filters: Vec<PatternFilter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SalesforceSource {
    pub host_url: String,
    pub auth_type: AuthType,
    pub credentials_secret_arn: String,
    #[serde(default = "default_saas_filters")]
    pub filters: Vec<PatternFilter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebCrawlSource {
    pub seed_urls: Vec<String>,
    #[serde(default)]
    pub inclusion_filters: Vec<String>,
    #[serde(default)]
    pub exclusion_filters: Vec<String>,
    #[serde(default)]
    pub scope: CrawlScope,
    /// Pages per minute per host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseSource {
    pub workgroup_arn: String,
    pub database_name: String,
    /// When absent the execution role authenticates with IAM credentials.
    #[serde(default)]
    pub credentials_secret_arn: Option<String>,
}

/// Where one connector pulls its content from.
///
/// Each variant carries exactly the fields its kind needs; unknown fields
/// are rejected while parsing and empty ones during validation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceDescriptor {
    ObjectStore(ObjectStoreSource),
    #[serde(rename = "SAAS_CONFLUENCE")]
    Confluence(ConfluenceSource),
    #[serde(rename = "SAAS_SHAREPOINT")]
    SharePoint(SharePointSource),
    #[serde(rename = "SAAS_SALESFORCE")]
    Salesforce(SalesforceSource),
    WebCrawl(WebCrawlSource),
    WarehouseMetadata(WarehouseSource),
}

/// The kind of a [`DataSourceDescriptor`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorKind {
    ObjectStore,
    #[serde(rename = "SAAS_CONFLUENCE")]
    Confluence,
    #[serde(rename = "SAAS_SHAREPOINT")]
    SharePoint,
    #[serde(rename = "SAAS_SALESFORCE")]
    Salesforce,
    WebCrawl,
    WarehouseMetadata,
}

impl ConnectorKind {
    /// Short form used in connector names.
    pub fn slug(self) -> &'static str {
        match self {
            ConnectorKind::ObjectStore => "s3",
            ConnectorKind::Confluence => "confluence",
            ConnectorKind::SharePoint => "sharepoint",
            ConnectorKind::Salesforce => "salesforce",
            ConnectorKind::WebCrawl => "web",
            ConnectorKind::WarehouseMetadata => "warehouse",
        }
    }
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectorKind::ObjectStore => "OBJECT_STORE",
            ConnectorKind::Confluence => "SAAS_CONFLUENCE",
            ConnectorKind::SharePoint => "SAAS_SHAREPOINT",
            ConnectorKind::Salesforce => "SAAS_SALESFORCE",
            ConnectorKind::WebCrawl => "WEB_CRAWL",
            ConnectorKind::WarehouseMetadata => "WAREHOUSE_METADATA",
        })
    }
}

impl DataSourceDescriptor {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            DataSourceDescriptor::ObjectStore(_) => ConnectorKind::ObjectStore,
            DataSourceDescriptor::Confluence(_) => ConnectorKind::Confluence,
            DataSourceDescriptor::SharePoint(_) => ConnectorKind::SharePoint,
            DataSourceDescriptor::Salesforce(_) => ConnectorKind::Salesforce,
            DataSourceDescriptor::WebCrawl(_) => ConnectorKind::WebCrawl,
            DataSourceDescriptor::WarehouseMetadata(_) => ConnectorKind::WarehouseMetadata,
        }
    }

    /// Secret holding SaaS or warehouse credentials, if the kind uses one.
    pub fn secret_arn(&self) -> Option<&str> {
        match self {
            DataSourceDescriptor::Confluence(s) => Some(&s.credentials_secret_arn),
            DataSourceDescriptor::SharePoint(s) => Some(&s.credentials_secret_arn),
            DataSourceDescriptor::Salesforce(s) => Some(&s.credentials_secret_arn),
            DataSourceDescriptor::WarehouseMetadata(s) => s.credentials_secret_arn.as_deref(),
            DataSourceDescriptor::ObjectStore(_) | DataSourceDescriptor::WebCrawl(_) => None,
        }
    }

    fn validate(&self, position: usize) -> Result<()> {
        let at = |field: &str| format!("data_sources[{}].{}", position, field);
        match self {
            DataSourceDescriptor::ObjectStore(s) => validate_bucket_name(&s.bucket_name)
                .map_err(|e| KbError::validation(format!("{}: {}", at("bucket_name"), e))),
            DataSourceDescriptor::Confluence(s) => {
                require_url(&s.host_url, &at("host_url"))?;
                require_arn(&s.credentials_secret_arn, &at("credentials_secret_arn"))?;
                validate_filters(&s.filters, &at("filters"))
            }
            DataSourceDescriptor::SharePoint(s) => {
                require_non_empty(&s.tenant_id, &at("tenant_id"))?;
                require_non_empty(&s.domain, &at("domain"))?;
                require(
                    !s.site_urls.is_empty(),
                    &format!("{} must list at least one site", at("site_urls")),
                )?;
                for url in &s.site_urls {
                    require_url(url, &at("site_urls"))?;
                }
                require_arn(&s.credentials_secret_arn, &at("credentials_secret_arn"))?;
                validate_filters(&s.filters, &at("filters"))
            }
            DataSourceDescriptor::Salesforce(s) => {
                require_url(&s.host_url, &at("host_url"))?;
                require_arn(&s.credentials_secret_arn, &at("credentials_secret_arn"))?;
                validate_filters(&s.filters, &at("filters"))
            }
            DataSourceDescriptor::WebCrawl(s) => {
                require(
                    !s.seed_urls.is_empty(),
                    &format!("{} must list at least one URL", at("seed_urls")),
                )?;
                for url in &s.seed_urls {
                    require_url(url, &at("seed_urls"))?;
                }
                require(
                    (1..=300).contains(&s.rate_limit),
                    &format!("{} must be in [1, 300]", at("rate_limit")),
                )
            }
            DataSourceDescriptor::WarehouseMetadata(s) => {
                require_arn(&s.workgroup_arn, &at("workgroup_arn"))?;
                require_non_empty(&s.database_name, &at("database_name"))?;
                if let Some(secret) = &s.credentials_secret_arn {
                    require_arn(secret, &at("credentials_secret_arn"))?;
                }
                Ok(())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Transform reference
// ═══════════════════════════════════════════════════════════════════════

/// The function applied after chunking when the strategy is `CUSTOM`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformSpec {
    /// An existing function, referenced by ARN. Never created or deleted.
    Existing { function_arn: String },
    /// A local handler file packaged and deployed by the orchestrator.
    Package {
        function_name: Option<String>,
        source: PathBuf,
        handler: String,
        runtime: String,
        timeout_secs: u32,
    },
}

impl TransformSpec {
    fn from_config(config: &TransformConfig) -> Result<Self> {
        match (&config.function_arn, &config.source) {
            (Some(arn), None) => {
                require_arn(arn, "transform.function_arn")?;
                Ok(TransformSpec::Existing {
                    function_arn: arn.clone(),
                })
            }
            (None, Some(source)) => {
                require(
                    source.exists(),
                    &format!("transform.source does not exist: {}", source.display()),
                )?;
                require_non_empty(&config.handler, "transform.handler")?;
                require_non_empty(&config.runtime, "transform.runtime")?;
                require(
                    (1..=900).contains(&config.timeout_secs),
                    "transform.timeout_secs must be in [1, 900]",
                )?;
                Ok(TransformSpec::Package {
                    function_name: config.function_name.clone(),
                    source: source.clone(),
                    handler: config.handler.clone(),
                    runtime: config.runtime.clone(),
                    timeout_secs: config.timeout_secs,
                })
            }
            (Some(_), Some(_)) => Err(KbError::validation(
                "transform: set either function_arn or source, not both",
            )),
            (None, None) => Err(KbError::validation(
                "transform: one of function_arn or source is required",
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ResourceSpec
// ═══════════════════════════════════════════════════════════════════════

/// Validated, immutable description of one deployment.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    name: String,
    description: String,
    suffix: Option<String>,
    backend: IndexBackend,
    multimodal: bool,
    parser: ParserKind,
    embedding_model: String,
    generation_model: String,
    reranking_model: String,
    enrichment_model: String,
    chunking: ChunkingStrategy,
    data_sources: Vec<DataSourceDescriptor>,
    transform: Option<TransformSpec>,
    intermediate_bucket: Option<String>,
    dimension: u32,
}

impl ResourceSpec {
    /// Validate a parsed configuration.
    ///
    /// # Errors
    ///
    /// [`KbError::Validation`] for unknown model ids, incompatible
    /// multimodal pairings, malformed descriptors or inconsistent backend,
    /// chunking and transform settings; [`KbError::Config`] when the
    /// embedding model has no dimension entry.
    pub fn from_config(config: &Config) -> Result<Self> {
        let kb = &config.knowledge_base;
        let models = &config.models;

        validate_kb_name(&kb.name)?;
        if let Some(suffix) = &kb.suffix {
            require(
                !suffix.is_empty()
                    && suffix
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-'),
                "knowledge_base.suffix may contain only letters, digits and '-'",
            )?;
        }

        catalog::ensure_allowed(ModelRole::Embedding, &models.embedding)?;
        catalog::ensure_allowed(ModelRole::Generation, &models.generation)?;
        catalog::ensure_allowed(ModelRole::Reranking, &models.reranking)?;
        let enrichment_model = models
            .enrichment
            .clone()
            .unwrap_or_else(|| models.generation.clone());
        catalog::ensure_allowed(ModelRole::Generation, &enrichment_model)?;

        if kb.multimodal && !catalog::is_multimodal_compatible(&models.embedding) {
            return Err(KbError::validation(format!(
                "multimodal mode requires a multimodal-compatible embedding model; '{}' is not one of: {}",
                models.embedding,
                catalog::MULTIMODAL_EMBEDDING_MODELS.join(", ")
            )));
        }
        let dimension = catalog::dimension(&models.embedding, kb.multimodal)?;

        config.chunking.validate()?;
        if config.chunking == ChunkingStrategy::GraphContext && kb.backend != IndexBackend::Graph {
            return Err(KbError::validation(
                "GRAPH_CONTEXT chunking requires the GRAPH backend",
            ));
        }

        let transform = match (&config.chunking, &config.transform) {
            (ChunkingStrategy::Custom, Some(t)) => Some(TransformSpec::from_config(t)?),
            (ChunkingStrategy::Custom, None) => {
                return Err(KbError::validation(
                    "CUSTOM chunking requires a [transform] section",
                ))
            }
            (_, Some(_)) => {
                return Err(KbError::validation(
                    "[transform] is only used with CUSTOM chunking",
                ))
            }
            (_, None) => None,
        };

        if config.data_sources.is_empty() {
            return Err(KbError::validation(
                "at least one [[data_sources]] entry is required",
            ));
        }
        for (i, ds) in config.data_sources.iter().enumerate() {
            ds.validate(i)?;
        }
        validate_backend_sources(kb.backend, &config.data_sources)?;

        if let Some(bucket) = &kb.intermediate_bucket {
            validate_bucket_name(bucket).map_err(|e| {
                KbError::validation(format!("knowledge_base.intermediate_bucket: {}", e))
            })?;
        }

        Ok(Self {
            name: kb.name.clone(),
            description: kb.description.clone(),
            suffix: kb.suffix.clone(),
            backend: kb.backend,
            multimodal: kb.multimodal,
            parser: kb.parser.unwrap_or_default(),
            embedding_model: models.embedding.clone(),
            generation_model: models.generation.clone(),
            reranking_model: models.reranking.clone(),
            enrichment_model,
            chunking: config.chunking.clone(),
            data_sources: config.data_sources.clone(),
            transform,
            intermediate_bucket: kb.intermediate_bucket.clone(),
            dimension,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
    pub fn backend(&self) -> IndexBackend {
        self.backend
    }
    pub fn multimodal(&self) -> bool {
        self.multimodal
    }
    pub fn parser(&self) -> ParserKind {
        self.parser
    }
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }
    pub fn reranking_model(&self) -> &str {
        &self.reranking_model
    }
    pub fn enrichment_model(&self) -> &str {
        &self.enrichment_model
    }
    pub fn chunking(&self) -> &ChunkingStrategy {
        &self.chunking
    }
    pub fn data_sources(&self) -> &[DataSourceDescriptor] {
        &self.data_sources
    }
    pub fn transform(&self) -> Option<&TransformSpec> {
        self.transform.as_ref()
    }
    pub fn intermediate_bucket_override(&self) -> Option<&str> {
        self.intermediate_bucket.as_deref()
    }

    /// Vector width from the model table.
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Multimodal parsing and custom transforms both stage files in an
    /// intermediate bucket.
    pub fn needs_intermediate_bucket(&self) -> bool {
        self.multimodal || self.chunking == ChunkingStrategy::Custom
    }

    /// Buckets named by object-store descriptors, deduplicated, in order.
    pub fn source_buckets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ds in &self.data_sources {
            if let DataSourceDescriptor::ObjectStore(s) = ds {
                if !out.contains(&s.bucket_name) {
                    out.push(s.bucket_name.clone());
                }
            }
        }
        out
    }

    /// Secrets referenced by SaaS and warehouse descriptors, deduplicated.
    pub fn secret_arns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for arn in self.data_sources.iter().filter_map(|ds| ds.secret_arn()) {
            if !out.iter().any(|a| a == arn) {
                out.push(arn.to_string());
            }
        }
        out
    }

    /// The warehouse descriptor of a `WAREHOUSE` deployment.
    pub fn warehouse(&self) -> Option<&WarehouseSource> {
        self.data_sources.iter().find_map(|ds| match ds {
            DataSourceDescriptor::WarehouseMetadata(w) => Some(w),
            _ => None,
        })
    }
}

fn validate_backend_sources(backend: IndexBackend, sources: &[DataSourceDescriptor]) -> Result<()> {
    let warehouse_count = sources
        .iter()
        .filter(|ds| ds.kind() == ConnectorKind::WarehouseMetadata)
        .count();
    match backend {
        IndexBackend::Warehouse => require(
            warehouse_count == 1 && sources.len() == 1,
            "the WAREHOUSE backend takes exactly one WAREHOUSE_METADATA data source",
        ),
        IndexBackend::VectorSearch | IndexBackend::Graph => require(
            warehouse_count == 0,
            "WAREHOUSE_METADATA data sources require the WAREHOUSE backend",
        ),
    }
}

fn validate_kb_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 100
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    require(
        valid,
        "knowledge_base.name must be 1-100 characters of letters, digits, '-' or '_', starting with a letter or digit",
    )
}

/// Bucket naming rules: 3-63 characters, lowercase letters, digits, '-' and '.',
/// starting and ending with a letter or digit.
pub(crate) fn validate_bucket_name(name: &str) -> std::result::Result<(), String> {
    if !(3..=63).contains(&name.len()) {
        return Err(format!("bucket name '{}' must be 3-63 characters", name));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(format!(
            "bucket name '{}' may contain only lowercase letters, digits, '-' and '.'",
            name
        ));
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(format!(
            "bucket name '{}' must start and end with a letter or digit",
            name
        ));
    }
    Ok(())
}

fn validate_filters(filters: &[PatternFilter], field: &str) -> Result<()> {
    for filter in filters {
        require_non_empty(&filter.object_type, &format!("{}.object_type", field))?;
    }
    Ok(())
}

fn require(cond: bool, message: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(KbError::validation(message))
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    require(!value.trim().is_empty(), &format!("{} must not be empty", field))
}

fn require_url(value: &str, field: &str) -> Result<()> {
    require(
        value.starts_with("https://") || value.starts_with("http://"),
        &format!("{} must be an http(s) URL, got '{}'", field, value),
    )
}

fn require_arn(value: &str, field: &str) -> Result<()> {
    require(
        value.starts_with("arn:") && value.split(':').count() >= 6,
        &format!("{} must be an ARN, got '{}'", field, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).expect("test config parses")
    }

    const BASE: &str = r#"
[knowledge_base]
name = "demo-kb"

[models]
embedding = "amazon.titan-embed-text-v2:0"
generation = "amazon.nova-pro-v1:0"
reranking = "amazon.rerank-v1:0"

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"
"#;

    #[test]
    fn base_config_validates() {
        let spec = ResourceSpec::from_config(&parse(BASE)).unwrap();
        assert_eq!(spec.dimension(), 1024);
        assert_eq!(spec.backend(), IndexBackend::VectorSearch);
        assert_eq!(spec.chunking().label(), "FIXED_SIZE");
        assert_eq!(spec.source_buckets(), vec!["demo-docs".to_string()]);
        assert!(!spec.needs_intermediate_bucket());
    }

    #[test]
    fn unknown_generation_model_is_rejected() {
        let src = BASE.replace("amazon.nova-pro-v1:0", "acme.chat-v9");
        let err = ResourceSpec::from_config(&parse(&src)).unwrap_err();
        assert!(matches!(err, KbError::Validation { .. }));
        assert!(err.to_string().contains("generation"));
    }

    #[test]
    fn multimodal_needs_compatible_embedding() {
        let src = BASE.replace("name = \"demo-kb\"", "name = \"demo-kb\"\nmultimodal = true");
        let err = ResourceSpec::from_config(&parse(&src)).unwrap_err();
        assert!(err.to_string().contains("multimodal"));

        let ok = src.replace("amazon.titan-embed-text-v2:0", "cohere.embed-v4:0");
        let spec = ResourceSpec::from_config(&parse(&ok)).unwrap();
        assert!(spec.needs_intermediate_bucket());
        assert_eq!(spec.parser(), ParserKind::FoundationModel);
    }

    #[test]
    fn descriptor_fields_are_checked() {
        let src = BASE.replace("demo-docs", "");
        let err = ResourceSpec::from_config(&parse(&src)).unwrap_err();
        assert!(err.to_string().contains("data_sources[0].bucket_name"));
    }

    #[test]
    fn descriptor_rejects_foreign_fields() {
        let src = format!("{}seed_urls = [\"https://example.com\"]\n", BASE);
        assert!(toml::from_str::<Config>(&src).is_err());
    }

    #[test]
    fn saas_descriptor_gets_default_filters() {
        let src = format!(
            "{}\n[[data_sources]]\ntype = \"SAAS_CONFLUENCE\"\nhost_url = \"https://acme.atlassian.net\"\nauth_type = \"BASIC\"\ncredentials_secret_arn = \"arn:aws:secretsmanager:us-east-1:111122223333:secret:conf\"\n",
            BASE
        );
        let spec = ResourceSpec::from_config(&parse(&src)).unwrap();
        match &spec.data_sources()[1] {
            DataSourceDescriptor::Confluence(c) => assert_eq!(c.filters[0].object_type, "Attachment"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(spec.secret_arns().len(), 1);
    }

    #[test]
    fn custom_chunking_requires_transform() {
        let src = format!("{}\n[chunking]\nstrategy = \"CUSTOM\"\n", BASE);
        let err = ResourceSpec::from_config(&parse(&src)).unwrap_err();
        assert!(err.to_string().contains("[transform]"));

        let with_fn = format!(
            "{}\n[transform]\nfunction_arn = \"arn:aws:lambda:us-east-1:111122223333:function:chunker\"\n",
            src
        );
        let spec = ResourceSpec::from_config(&parse(&with_fn)).unwrap();
        assert!(matches!(spec.transform(), Some(TransformSpec::Existing { .. })));
    }

    #[test]
    fn packaged_transform_source_must_exist() {
        let src = format!(
            "{}\n[chunking]\nstrategy = \"CUSTOM\"\n\n[transform]\nsource = \"/no/such/handler.py\"\n",
            BASE
        );
        let err = ResourceSpec::from_config(&parse(&src)).unwrap_err();
        assert!(matches!(err, KbError::Validation { .. }));
        assert!(err.to_string().contains("transform.source"));

        let tmp = tempfile::TempDir::new().unwrap();
        let handler = tmp.path().join("lambda_function.py");
        std::fs::write(&handler, "def lambda_handler(event, context):\n    return event\n").unwrap();
        let src = src.replace("/no/such/handler.py", &handler.display().to_string());
        let spec = ResourceSpec::from_config(&parse(&src)).unwrap();
        match spec.transform() {
            Some(TransformSpec::Package { source, .. }) => assert_eq!(source, &handler),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn graph_context_needs_graph_backend() {
        let src = format!("{}\n[chunking]\nstrategy = \"GRAPH_CONTEXT\"\n", BASE);
        assert!(ResourceSpec::from_config(&parse(&src)).is_err());

        let graph = src.replace("name = \"demo-kb\"", "name = \"demo-kb\"\nbackend = \"GRAPH\"");
        let spec = ResourceSpec::from_config(&parse(&graph)).unwrap();
        assert_eq!(spec.enrichment_model(), "amazon.nova-pro-v1:0");
    }

    #[test]
    fn warehouse_backend_takes_one_metadata_source() {
        let src = r#"
[knowledge_base]
name = "sales-kb"
backend = "WAREHOUSE"

[[data_sources]]
type = "WAREHOUSE_METADATA"
workgroup_arn = "arn:aws:redshift-serverless:us-east-1:111122223333:workgroup/abc"
database_name = "dev"
"#;
        let spec = ResourceSpec::from_config(&parse(src)).unwrap();
        assert_eq!(spec.warehouse().unwrap().database_name, "dev");

        let mixed = format!("{}\n[[data_sources]]\ntype = \"OBJECT_STORE\"\nbucket_name = \"demo-docs\"\n", src);
        assert!(ResourceSpec::from_config(&parse(&mixed)).is_err());
    }

    #[test]
    fn chunking_parameters_are_bounded() {
        let src = format!(
            "{}\n[chunking]\nstrategy = \"HIERARCHICAL\"\nparent_max_tokens = 200\nchild_max_tokens = 300\n",
            BASE
        );
        assert!(ResourceSpec::from_config(&parse(&src)).is_err());
    }
}
