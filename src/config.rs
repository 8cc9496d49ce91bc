use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::spec::{ChunkingStrategy, DataSourceDescriptor, IndexBackend, ParserKind};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub chunking: ChunkingStrategy,
    #[serde(default)]
    pub transform: Option<TransformConfig>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceDescriptor>,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    /// Appended to derived resource names. Defaults to `<region>-<account>`.
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default)]
    pub multimodal: bool,
    #[serde(default)]
    pub parser: Option<ParserKind>,
    #[serde(default)]
    pub intermediate_bucket: Option<String>,
}

fn default_description() -> String {
    "Knowledge base provisioned by kbctl".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding: String,
    #[serde(default = "default_generation_model")]
    pub generation: String,
    #[serde(default = "default_reranking_model")]
    pub reranking: String,
    /// Model used for graph context enrichment and multimodal parsing.
    /// Falls back to `generation`.
    #[serde(default)]
    pub enrichment: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            embedding: default_embedding_model(),
            generation: default_generation_model(),
            reranking: default_reranking_model(),
            enrichment: None,
        }
    }
}

fn default_embedding_model() -> String {
    "amazon.titan-embed-text-v2:0".to_string()
}
fn default_generation_model() -> String {
    "global.anthropic.claude-haiku-4-5-20251001-v1:0".to_string()
}
fn default_reranking_model() -> String {
    "cohere.rerank-v3-5:0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransformConfig {
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub function_arn: Option<String>,
    /// Handler file packaged into the deployment archive.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_transform_timeout")]
    pub timeout_secs: u32,
}

fn default_handler() -> String {
    "lambda_function.lambda_handler".to_string()
}
fn default_runtime() -> String {
    "python3.12".to_string()
}
fn default_transform_timeout() -> u32 {
    300
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsConfig {
    /// Overrides `AWS_REGION` / `AWS_DEFAULT_REGION`.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

/// Per-service base URLs, for LocalStack and similar.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EndpointOverrides {
    pub s3: Option<String>,
    pub iam: Option<String>,
    pub sts: Option<String>,
    pub aoss: Option<String>,
    pub neptune_graph: Option<String>,
    pub bedrock_agent: Option<String>,
    pub logs: Option<String>,
    pub lambda: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    #[serde(default = "default_collection_poll")]
    pub collection_poll_secs: u64,
    #[serde(default = "default_graph_poll")]
    pub graph_poll_secs: u64,
    #[serde(default = "default_ingestion_poll")]
    pub ingestion_poll_secs: u64,
    /// Wait after granting data access before creating the index.
    #[serde(default = "default_access_propagation")]
    pub access_propagation_secs: u64,
    /// Wait after creating a role before handing it to another service.
    #[serde(default = "default_role_propagation")]
    pub role_propagation_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collection_poll_secs: default_collection_poll(),
            graph_poll_secs: default_graph_poll(),
            ingestion_poll_secs: default_ingestion_poll(),
            access_propagation_secs: default_access_propagation(),
            role_propagation_secs: default_role_propagation(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_collection_poll() -> u64 {
    30
}
fn default_graph_poll() -> u64 {
    90
}
fn default_ingestion_poll() -> u64 {
    10
}
fn default_access_propagation() -> u64 {
    60
}
fn default_role_propagation() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    7
}
fn default_min_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    2000
}

/// Fixed waits used by the polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub collection: Duration,
    pub graph: Duration,
    pub ingestion: Duration,
    pub access_propagation: Duration,
    pub role_propagation: Duration,
}

impl OrchestratorConfig {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            collection: Duration::from_secs(self.collection_poll_secs),
            graph: Duration::from_secs(self.graph_poll_secs),
            ingestion: Duration::from_secs(self.ingestion_poll_secs),
            access_propagation: Duration::from_secs(self.access_propagation_secs),
            role_propagation: Duration::from_secs(self.role_propagation_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.min_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        OrchestratorConfig::default().poll_settings()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate orchestrator timings; everything else is checked by ResourceSpec.
    if config.orchestrator.retry.max_attempts == 0 {
        anyhow::bail!("orchestrator.retry.max_attempts must be >= 1");
    }
    if config.orchestrator.retry.min_backoff_ms > config.orchestrator.retry.max_backoff_ms {
        anyhow::bail!("orchestrator.retry.min_backoff_ms must not exceed max_backoff_ms");
    }
    if config.orchestrator.collection_poll_secs == 0
        || config.orchestrator.graph_poll_secs == 0
        || config.orchestrator.ingestion_poll_secs == 0
    {
        anyhow::bail!("orchestrator poll intervals must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse_config(
            r#"
[knowledge_base]
name = "demo-kb"

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"
"#,
        )
        .unwrap();
        assert_eq!(config.models.embedding, "amazon.titan-embed-text-v2:0");
        assert_eq!(config.orchestrator.collection_poll_secs, 30);
        assert_eq!(config.orchestrator.graph_poll_secs, 90);
        assert_eq!(config.orchestrator.retry.max_attempts, 7);
        assert_eq!(config.knowledge_base.backend, IndexBackend::VectorSearch);
        assert!(config.transform.is_none());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/kb.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[knowledge_base]\nname = \"disk-kb\"\n\n[orchestrator]\ningestion_poll_secs = 2\n"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.knowledge_base.name, "disk-kb");
        assert_eq!(
            config.orchestrator.poll_settings().ingestion,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let err = parse_config(
            "[knowledge_base]\nname = \"x\"\n[orchestrator.retry]\nmin_backoff_ms = 5000\nmax_backoff_ms = 10\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_backoff_ms"));
    }
}
