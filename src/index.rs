//! Index provisioner.
//!
//! Brings the retrieval index to a queryable state:
//!
//! - **Vector search**: encryption, network and data-access policies, then
//!   the collection, then (once `ACTIVE`) the collection-scoped role policy
//!   and the k-NN index itself.
//! - **Graph**: one analytics graph with vector search sized to the
//!   embedding dimension.
//! - **Warehouse**: nothing to create; the handle carries the workgroup.
//!
//! Status polling runs at a fixed interval with no internal timeout. A
//! `FAILED` status is fatal.

use serde_json::{json, Value};

use crate::adopt::{create_or_adopt, found};
use crate::clients::{CollectionDetail, GraphDetail, GraphRequest, SecurityPolicyType};
use crate::context::ProvisionContext;
use crate::error::{KbError, Result};
use crate::identity;
use crate::models::{ExecutionIdentity, IndexHandle, IndexLocator, StepOutcome};
use crate::policy_docs;
use crate::spec::{IndexBackend, ResourceSpec};

/// Field names shared by the index mapping and the storage configuration.
pub const VECTOR_FIELD: &str = "vector";
pub const TEXT_FIELD: &str = "text";
pub const METADATA_FIELD: &str = "text-metadata";

const GRAPH_MEMORY_UNITS: u32 = 16;
const GRAPH_REPLICAS: u32 = 1;

/// Create or adopt the index for `spec.backend()`.
///
/// Returns the handle and any best-effort warnings.
pub async fn ensure_index(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    identity: &ExecutionIdentity,
) -> Result<(IndexHandle, Vec<String>)> {
    let (locator, warnings) = match spec.backend() {
        IndexBackend::VectorSearch => ensure_vector_index(ctx, spec, identity).await?,
        IndexBackend::Graph => (ensure_graph(ctx, spec).await?, Vec::new()),
        IndexBackend::Warehouse => {
            let warehouse = spec.warehouse().ok_or_else(|| {
                KbError::validation("the WAREHOUSE backend requires a WAREHOUSE_METADATA data source")
            })?;
            ctx.started("ensure warehouse index");
            ctx.finished("ensure warehouse index", StepOutcome::Skipped);
            (
                IndexLocator::Warehouse {
                    workgroup_arn: warehouse.workgroup_arn.clone(),
                    database_name: warehouse.database_name.clone(),
                },
                Vec::new(),
            )
        }
    };
    Ok((
        IndexHandle {
            locator,
            dimension: spec.dimension(),
        },
        warnings,
    ))
}

/// Mapping for the k-NN index: HNSW on FAISS with L2 distance.
pub fn vector_index_body(dimension: u32) -> Value {
    json!({
        "settings": {
            "index.knn": "true",
            "number_of_shards": 1,
            "knn.algo_param.ef_search": 512,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                VECTOR_FIELD: {
                    "type": "knn_vector",
                    "dimension": dimension,
                    "method": {
                        "name": "hnsw",
                        "engine": "faiss",
                        "space_type": "l2"
                    }
                },
                TEXT_FIELD: { "type": "text" },
                METADATA_FIELD: { "type": "text" }
            }
        }
    })
}

/// Data-plane endpoint of a serverless collection.
pub fn collection_endpoint(collection_id: &str, region: &str) -> String {
    format!("https://{}.{}.aoss.amazonaws.com", collection_id, region)
}

// ═══════════════════════════════════════════════════════════════════════
// Vector search
// ═══════════════════════════════════════════════════════════════════════

async fn ensure_vector_index(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    identity: &ExecutionIdentity,
) -> Result<(IndexLocator, Vec<String>)> {
    let vector = ctx.clients.vector.as_ref();
    let collection_name = ctx.names.collection();
    let mut warnings = Vec::new();
    let mut created_any = false;

    for kind in [SecurityPolicyType::Encryption, SecurityPolicyType::Network] {
        let (name, document) = match kind {
            SecurityPolicyType::Encryption => (
                ctx.names.encryption_policy(),
                policy_docs::encryption_policy(&collection_name),
            ),
            SecurityPolicyType::Network => (
                ctx.names.network_policy(),
                policy_docs::network_policy(&collection_name),
            ),
        };
        let step = format!("ensure {} policy {}", kind.as_str(), name);
        let body = document.to_string();
        let result = reported(
            ctx,
            &step,
            create_or_adopt(
                "create security policy",
                &name,
                || vector.create_security_policy(&name, kind, &body),
                || async { found(vector.get_security_policy(&name, kind).await) },
            ),
        )
        .await?;
        created_any |= result.is_created();
    }

    let access_name = ctx.names.data_access_policy();
    let principals = [ctx.caller_arn.as_str(), identity.role_arn.as_str()];
    let access_body = policy_docs::data_access_policy(&collection_name, &principals).to_string();
    let access = reported(
        ctx,
        &format!("ensure data access policy {}", access_name),
        create_or_adopt(
            "create data access policy",
            &access_name,
            || vector.create_access_policy(&access_name, &access_body),
            || async { found(vector.get_access_policy(&access_name).await) },
        ),
    )
    .await?;
    created_any |= access.is_created();

    let collection = reported(
        ctx,
        &format!("ensure collection {}", collection_name),
        create_or_adopt(
            "create collection",
            &collection_name,
            || vector.create_collection(&collection_name),
            || vector.batch_get_collection(&collection_name),
        ),
    )
    .await?;
    created_any |= collection.is_created();
    let collection = wait_for_collection(ctx, &collection_name).await?;

    match identity::ensure_vector_access(ctx, identity, &collection.id).await {
        Ok((_, outcome)) => created_any |= outcome == StepOutcome::Created,
        Err(e) => warnings.push(format!("vector access policy: {}", e)),
    }

    if created_any {
        tracing::info!(
            collection = %collection.name,
            wait_secs = ctx.poll.access_propagation.as_secs(),
            "waiting for access policies to propagate"
        );
        ctx.pause(ctx.poll.access_propagation).await;
    }

    let endpoint = collection_endpoint(&collection.id, &ctx.region);
    let index_name = ctx.names.vector_index();
    let step = format!("create vector index {}", index_name);
    ctx.started(&step);
    let body = vector_index_body(spec.dimension());
    match vector.create_index(&endpoint, &index_name, &body).await {
        Ok(()) => ctx.finished(&step, StepOutcome::Created),
        Err(e) if e.is_already_exists() => ctx.finished(&step, StepOutcome::Adopted),
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            return Err(KbError::step("create vector index")(e));
        }
    }

    Ok((
        IndexLocator::VectorSearch {
            collection_name: collection.name,
            collection_id: collection.id,
            collection_arn: collection.arn,
            endpoint,
            index_name,
        },
        warnings,
    ))
}

async fn wait_for_collection(ctx: &ProvisionContext, name: &str) -> Result<CollectionDetail> {
    let step = format!("wait for collection {}", name);
    loop {
        let detail = ctx
            .clients
            .vector
            .batch_get_collection(name)
            .await
            .map_err(KbError::step("describe collection"))?
            .ok_or_else(|| KbError::NotProvisioned(format!("collection {}", name)))?;
        match detail.status.as_str() {
            "ACTIVE" => return Ok(detail),
            "FAILED" => {
                return Err(KbError::ResourceFailed {
                    kind: "collection",
                    name: name.to_string(),
                    status: detail.status,
                })
            }
            status => ctx.wait_on(&step, status, ctx.poll.collection).await,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Graph
// ═══════════════════════════════════════════════════════════════════════

async fn ensure_graph(ctx: &ProvisionContext, spec: &ResourceSpec) -> Result<IndexLocator> {
    let graphs = ctx.clients.graph.as_ref();
    let name = ctx.names.graph();
    let request = GraphRequest {
        name: name.clone(),
        dimension: spec.dimension(),
        provisioned_memory: GRAPH_MEMORY_UNITS,
        replica_count: GRAPH_REPLICAS,
        public_connectivity: true,
        deletion_protection: true,
    };

    let graph = reported(
        ctx,
        &format!("ensure graph {}", name),
        create_or_adopt(
            "create graph",
            &name,
            || graphs.create_graph(&request),
            || async { find_graph(ctx, &name).await },
        ),
    )
    .await?
    .into_inner();

    let graph = wait_for_graph(ctx, graph).await?;
    Ok(IndexLocator::Graph {
        graph_id: graph.id,
        graph_arn: graph.arn,
        graph_name: graph.name,
    })
}

/// Look a graph up by name.
pub async fn find_graph(
    ctx: &ProvisionContext,
    name: &str,
) -> crate::error::ProviderResult<Option<GraphDetail>> {
    Ok(ctx
        .clients
        .graph
        .list_graphs()
        .await?
        .into_iter()
        .find(|g| g.name == name))
}

async fn wait_for_graph(ctx: &ProvisionContext, mut graph: GraphDetail) -> Result<GraphDetail> {
    let step = format!("wait for graph {}", graph.name);
    loop {
        match graph.status.as_str() {
            "AVAILABLE" => return Ok(graph),
            "FAILED" => {
                return Err(KbError::ResourceFailed {
                    kind: "graph",
                    name: graph.name,
                    status: graph.status,
                })
            }
            status => ctx.wait_on(&step, status, ctx.poll.graph).await,
        }
        graph = ctx
            .clients
            .graph
            .get_graph(&graph.id)
            .await
            .map_err(KbError::step("describe graph"))?;
    }
}

/// Run a create-or-adopt future between `started` and `finished` lines.
async fn reported<T>(
    ctx: &ProvisionContext,
    step: &str,
    fut: impl std::future::Future<Output = Result<crate::adopt::Adoption<T>>>,
) -> Result<crate::adopt::Adoption<T>> {
    ctx.started(step);
    match fut.await {
        Ok(adoption) => {
            ctx.finished(step, adoption.outcome());
            Ok(adoption)
        }
        Err(e) => {
            ctx.finished(step, StepOutcome::Failed(e.to_string()));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_body_uses_dimension_and_hnsw() {
        let body = vector_index_body(1024);
        let vector = &body["mappings"]["properties"]["vector"];
        assert_eq!(vector["dimension"], 1024);
        assert_eq!(vector["method"]["engine"], "faiss");
        assert_eq!(vector["method"]["space_type"], "l2");
        assert_eq!(body["settings"]["index.knn"], "true");
        assert_eq!(body["mappings"]["properties"]["text-metadata"]["type"], "text");
    }

    #[test]
    fn endpoint_is_regional() {
        assert_eq!(
            collection_endpoint("abc123", "eu-west-1"),
            "https://abc123.eu-west-1.aoss.amazonaws.com"
        );
    }
}
