//! Core data models produced by provisioning, ingestion and teardown.
//!
//! These types are the orchestrator's outputs: handles to the remote
//! resources that exist after a run, and the per-step reports an operator
//! reads to decide whether to re-run.

use serde::Serialize;

use crate::spec::ConnectorKind;

/// The role services assume on the knowledge base's behalf, plus the
/// customer-managed policies attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionIdentity {
    pub role_name: String,
    pub role_arn: String,
    /// Attached policies, in the order they were ensured.
    pub policies: Vec<AttachedPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedPolicy {
    pub name: String,
    pub arn: String,
}

/// Backend-specific locator for the retrieval index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexLocator {
    VectorSearch {
        collection_name: String,
        collection_id: String,
        collection_arn: String,
        endpoint: String,
        index_name: String,
    },
    Graph {
        graph_id: String,
        graph_arn: String,
        graph_name: String,
    },
    /// Structured knowledge bases query the warehouse directly.
    Warehouse {
        workgroup_arn: String,
        database_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHandle {
    pub locator: IndexLocator,
    /// Vector width from the embedding model table.
    pub dimension: u32,
}

/// The registered knowledge base and its connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeServiceEntity {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub role_arn: String,
    pub connectors: Vec<DataSourceConnector>,
    /// Descriptors whose connector could not be created.
    pub connector_failures: Vec<ConnectorFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceConnector {
    pub id: String,
    pub name: String,
    pub kind: ConnectorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorFailure {
    pub name: String,
    pub kind: ConnectorKind,
    pub error: String,
}

/// Ingestion job status as reported by the knowledge service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionStatus {
    Starting,
    InProgress,
    Stopping,
    Complete,
    Failed,
    Stopped,
}

impl IngestionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTING" => Some(Self::Starting),
            "IN_PROGRESS" => Some(Self::InProgress),
            "STOPPING" => Some(Self::Stopping),
            "COMPLETE" => Some(Self::Complete),
            "FAILED" => Some(Self::Failed),
            "STOPPED" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::InProgress => "IN_PROGRESS",
            Self::Stopping => "STOPPING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }

    /// `COMPLETE`, `FAILED` and `STOPPED` end a job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of ingesting one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub connector_id: String,
    pub connector_name: String,
    pub job_id: Option<String>,
    /// Terminal status, or `None` when the job could not be started or polled.
    pub status: Option<IngestionStatus>,
    pub error: Option<String>,
}

/// Everything `provision()` produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub identity: ExecutionIdentity,
    pub buckets: Vec<String>,
    pub index: IndexHandle,
    pub entity: KnowledgeServiceEntity,
    /// ARN of the custom transform function, when one is used.
    pub transform_function_arn: Option<String>,
    /// Best-effort steps that failed without aborting the run.
    pub warnings: Vec<String>,
}

/// Identifiers an external caller hands to other processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeBaseIds {
    pub knowledge_base_id: String,
    pub knowledge_base_arn: String,
    pub data_source_ids: Vec<String>,
    pub buckets: Vec<String>,
}

/// Result of a single provisioning or teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum StepOutcome {
    Created,
    Adopted,
    Updated,
    Deleted,
    NotFound,
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Created => "created",
            StepOutcome::Adopted => "adopted",
            StepOutcome::Updated => "updated",
            StepOutcome::Deleted => "deleted",
            StepOutcome::NotFound => "not-found",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Per-step results of a teardown. Teardown never aborts early, so every
/// attempted step appears here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub steps: Vec<StepRecord>,
}

impl TeardownReport {
    pub fn record(&mut self, step: impl Into<String>, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            step: step.into(),
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for s in ["COMPLETE", "FAILED", "STOPPED"] {
            assert!(IngestionStatus::parse(s).unwrap().is_terminal());
        }
        for s in ["STARTING", "IN_PROGRESS", "STOPPING"] {
            assert!(!IngestionStatus::parse(s).unwrap().is_terminal());
        }
        assert!(IngestionStatus::parse("EXPLODED").is_none());
    }

    #[test]
    fn step_record_serializes_flat() {
        let record = StepRecord {
            step: "delete role".into(),
            outcome: StepOutcome::Failed("DeleteConflict".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["step"], "delete role");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["detail"], "DeleteConflict");
    }
}
