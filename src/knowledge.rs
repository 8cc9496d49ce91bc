//! Knowledge service provisioner.
//!
//! Registers the knowledge base entity against the execution role and the
//! index, wires its application logs to a log group, then attaches one
//! connector per data-source descriptor.
//!
//! Entity creation is the one step that retries: the execution role and
//! index permissions are eventually consistent, and the service rejects
//! the request until they have propagated.

use serde_json::{json, Value};

use crate::adopt::{create_or_adopt, found};
use crate::catalog;
use crate::clients::{DataSourceRequest, KnowledgeApi, KnowledgeBaseDetail, KnowledgeBaseRequest};
use crate::context::ProvisionContext;
use crate::error::{KbError, ProviderResult, Result};
use crate::index::{METADATA_FIELD, TEXT_FIELD, VECTOR_FIELD};
use crate::models::{
    ConnectorFailure, DataSourceConnector, ExecutionIdentity, IndexHandle, IndexLocator,
    KnowledgeServiceEntity, StepOutcome,
};
use crate::spec::{
    ChunkingStrategy, DataSourceDescriptor, IndexBackend, ParserKind, PatternFilter, ResourceSpec,
};

/// Retention for the knowledge base's application log group.
pub const LOG_RETENTION_DAYS: u32 = 1;
pub const LOG_TYPE: &str = "APPLICATION_LOGS";

/// Register the entity, wire logging and attach connectors.
///
/// Returns the entity and the warnings from best-effort log wiring.
/// Connector failures are recorded on the entity rather than returned as
/// errors.
pub async fn ensure_knowledge_service(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    identity: &ExecutionIdentity,
    index: &IndexHandle,
    transform_function_arn: Option<&str>,
) -> Result<(KnowledgeServiceEntity, Vec<String>)> {
    let intermediate = spec
        .needs_intermediate_bucket()
        .then(|| ctx.names.intermediate_bucket());
    let configuration =
        knowledge_base_configuration(spec, &ctx.region, &ctx.account, intermediate.as_deref())?;
    let request = KnowledgeBaseRequest {
        name: ctx.names.knowledge_base().to_string(),
        description: spec.description().to_string(),
        role_arn: identity.role_arn.clone(),
        configuration,
        storage: storage_configuration(&index.locator),
    };

    let kb = ensure_entity(ctx, &request).await?;
    let warnings = wire_logs(ctx, &kb.arn).await;

    let ingestion = vector_ingestion_configuration(
        spec,
        &ctx.region,
        &ctx.account,
        intermediate.as_deref(),
        transform_function_arn,
    )?;

    let mut connectors = Vec::new();
    let mut connector_failures = Vec::new();
    for (ordinal, descriptor) in spec.data_sources().iter().enumerate() {
        let kind = descriptor.kind();
        let name = ctx.names.connector(kind, ordinal);
        let request = DataSourceRequest {
            name: name.clone(),
            description: spec.description().to_string(),
            configuration: connector_configuration(descriptor),
            vector_ingestion: match descriptor {
                DataSourceDescriptor::WarehouseMetadata(_) => None,
                _ => ingestion.clone(),
            },
        };
        match ensure_connector(ctx, &kb.id, &request).await {
            Ok(id) => connectors.push(DataSourceConnector { id, name, kind }),
            Err(e) => connector_failures.push(ConnectorFailure {
                name,
                kind,
                error: e.to_string(),
            }),
        }
    }

    Ok((
        KnowledgeServiceEntity {
            id: kb.id,
            arn: kb.arn,
            name: kb.name,
            role_arn: kb.role_arn,
            connectors,
            connector_failures,
        },
        warnings,
    ))
}

async fn ensure_entity(
    ctx: &ProvisionContext,
    request: &KnowledgeBaseRequest,
) -> Result<KnowledgeBaseDetail> {
    let knowledge = ctx.clients.knowledge.as_ref();
    let step = format!("ensure knowledge base {}", request.name);
    ctx.started(&step);
    let result = ctx
        .retry
        .run(ctx.sleeper.as_ref(), "create knowledge base", |attempt| async move {
            if attempt > 1 {
                tracing::debug!(attempt, name = %request.name, "retrying knowledge base creation");
            }
            create_or_adopt(
                "create knowledge base",
                &request.name,
                || knowledge.create_knowledge_base(request),
                || find_knowledge_base(knowledge, &request.name),
            )
            .await
        })
        .await;
    match result {
        Ok(kb) => {
            ctx.finished(&step, kb.outcome());
            Ok(kb.into_inner())
        }
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            Err(e)
        }
    }
}

/// Look a knowledge base up by name.
pub async fn find_knowledge_base(
    knowledge: &dyn KnowledgeApi,
    name: &str,
) -> ProviderResult<Option<KnowledgeBaseDetail>> {
    let summary = knowledge
        .list_knowledge_bases()
        .await?
        .into_iter()
        .find(|kb| kb.name == name);
    match summary {
        // Listings omit the ARN and role; read the full record.
        Some(kb) => found(knowledge.get_knowledge_base(&kb.id).await),
        None => Ok(None),
    }
}

async fn ensure_connector(
    ctx: &ProvisionContext,
    knowledge_base_id: &str,
    request: &DataSourceRequest,
) -> Result<String> {
    let knowledge = ctx.clients.knowledge.as_ref();
    let step = format!("ensure connector {}", request.name);
    ctx.started(&step);
    let result = create_or_adopt(
        "create connector",
        &request.name,
        || knowledge.create_data_source(knowledge_base_id, request),
        || async {
            Ok(knowledge
                .list_data_sources(knowledge_base_id)
                .await?
                .into_iter()
                .find(|ds| ds.name == request.name))
        },
    )
    .await;
    match result {
        Ok(ds) => {
            ctx.finished(&step, ds.outcome());
            Ok(ds.into_inner().id)
        }
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            Err(e)
        }
    }
}

/// Log group, delivery source, destination and delivery. Each piece is
/// independently idempotent; a failure is logged and returned as a warning.
async fn wire_logs(ctx: &ProvisionContext, knowledge_base_arn: &str) -> Vec<String> {
    let logs = ctx.clients.logs.as_ref();
    let group = ctx.names.log_group();
    let mut warnings = Vec::new();
    let mut warn = |step: &str, e: &dyn std::fmt::Display| {
        ctx.finished(step, StepOutcome::Failed(e.to_string()));
        warnings.push(format!("{}: {}", step, e));
    };

    let step = format!("ensure log group {}", group);
    ctx.started(&step);
    let created = match logs.create_log_group(&group).await {
        Ok(()) => Some(StepOutcome::Created),
        Err(e) if e.is_already_exists() => Some(StepOutcome::Adopted),
        Err(e) => {
            warn(step.as_str(), &e);
            None
        }
    };
    if let Some(outcome) = created {
        match logs.put_retention_policy(&group, LOG_RETENTION_DAYS).await {
            Ok(()) => ctx.finished(&step, outcome),
            Err(e) => warn(step.as_str(), &e),
        }
    }

    let source_name = ctx.names.delivery_source();
    let step = format!("ensure delivery source {}", source_name);
    ctx.started(&step);
    let source = match logs
        .put_delivery_source(&source_name, knowledge_base_arn, LOG_TYPE)
        .await
    {
        Ok(s) => {
            ctx.finished(&step, StepOutcome::Updated);
            Some(s)
        }
        Err(e) => {
            warn(step.as_str(), &e);
            None
        }
    };

    let destination_name = ctx.names.delivery_destination();
    let step = format!("ensure delivery destination {}", destination_name);
    ctx.started(&step);
    let target = format!(
        "arn:aws:logs:{}:{}:log-group:{}",
        ctx.region, ctx.account, group
    );
    let destination = match logs.put_delivery_destination(&destination_name, &target).await {
        Ok(d) => {
            ctx.finished(&step, StepOutcome::Updated);
            Some(d)
        }
        Err(e) => {
            warn(step.as_str(), &e);
            None
        }
    };

    if let (Some(source), Some(destination)) = (source, destination) {
        let step = format!("ensure delivery {}", source.name);
        ctx.started(&step);
        match logs.create_delivery(&source.name, &destination.arn).await {
            Ok(_) => ctx.finished(&step, StepOutcome::Created),
            Err(e) if e.is_already_exists() => ctx.finished(&step, StepOutcome::Adopted),
            Err(e) => warn(step.as_str(), &e),
        }
    }

    warnings
}

/// Find an existing entity and the connectors `spec` would create, without
/// creating anything. Connectors that do not exist are left out.
pub async fn find_entity(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
) -> Result<Option<KnowledgeServiceEntity>> {
    let knowledge = ctx.clients.knowledge.as_ref();
    let kb = match find_knowledge_base(knowledge, ctx.names.knowledge_base())
        .await
        .map_err(KbError::step("find knowledge base"))?
    {
        Some(kb) => kb,
        None => return Ok(None),
    };
    let existing = knowledge
        .list_data_sources(&kb.id)
        .await
        .map_err(KbError::step("list connectors"))?;
    let connectors = spec
        .data_sources()
        .iter()
        .enumerate()
        .filter_map(|(ordinal, ds)| {
            let name = ctx.names.connector(ds.kind(), ordinal);
            existing.iter().find(|d| d.name == name).map(|d| DataSourceConnector {
                id: d.id.clone(),
                name,
                kind: ds.kind(),
            })
        })
        .collect();
    Ok(Some(KnowledgeServiceEntity {
        id: kb.id,
        arn: kb.arn,
        name: kb.name,
        role_arn: kb.role_arn,
        connectors,
        connector_failures: Vec::new(),
    }))
}

// ═══════════════════════════════════════════════════════════════════════
// Request documents
// ═══════════════════════════════════════════════════════════════════════

/// The entity's knowledge base configuration block.
pub fn knowledge_base_configuration(
    spec: &ResourceSpec,
    region: &str,
    account: &str,
    intermediate_bucket: Option<&str>,
) -> Result<Value> {
    if let Some(warehouse) = spec.warehouse() {
        let auth = match &warehouse.credentials_secret_arn {
            Some(secret) => json!({
                "type": "USERNAME_PASSWORD",
                "usernamePasswordSecretArn": secret
            }),
            None => json!({ "type": "IAM" }),
        };
        return Ok(json!({
            "type": "SQL",
            "sqlKnowledgeBaseConfiguration": {
                "type": "REDSHIFT",
                "redshiftConfiguration": {
                    "queryEngineConfiguration": {
                        "type": "SERVERLESS",
                        "serverlessConfiguration": {
                            "workgroupArn": warehouse.workgroup_arn,
                            "authConfiguration": auth
                        }
                    },
                    "storageConfigurations": [{
                        "type": "REDSHIFT",
                        "redshiftConfiguration": { "databaseName": warehouse.database_name }
                    }]
                }
            }
        }));
    }

    let mut vector = json!({
        "embeddingModelArn": catalog::model_arn(spec.embedding_model(), region, account)
    });
    if spec.multimodal() {
        let bucket = intermediate_bucket
            .ok_or_else(|| KbError::config("multimodal mode needs an intermediate bucket"))?;
        vector["supplementalDataStorageConfiguration"] = json!({
            "storageLocations": [{
                "s3Location": { "uri": format!("s3://{}", bucket) },
                "type": "S3"
            }]
        });
    }
    Ok(json!({
        "type": "VECTOR",
        "vectorKnowledgeBaseConfiguration": vector
    }))
}

/// Storage block pointing the entity at its index. Structured knowledge
/// bases have none.
pub fn storage_configuration(locator: &IndexLocator) -> Option<Value> {
    match locator {
        IndexLocator::VectorSearch {
            collection_arn,
            index_name,
            ..
        } => Some(json!({
            "type": "OPENSEARCH_SERVERLESS",
            "opensearchServerlessConfiguration": {
                "collectionArn": collection_arn,
                "vectorIndexName": index_name,
                "fieldMapping": {
                    "vectorField": VECTOR_FIELD,
                    "textField": TEXT_FIELD,
                    "metadataField": METADATA_FIELD
                }
            }
        })),
        IndexLocator::Graph { graph_arn, .. } => Some(json!({
            "type": "NEPTUNE_ANALYTICS",
            "neptuneAnalyticsConfiguration": {
                "graphArn": graph_arn,
                "fieldMapping": {
                    "textField": TEXT_FIELD,
                    "metadataField": METADATA_FIELD
                }
            }
        })),
        IndexLocator::Warehouse { .. } => None,
    }
}

/// The kind-specific connector configuration block.
pub fn connector_configuration(descriptor: &DataSourceDescriptor) -> Value {
    match descriptor {
        DataSourceDescriptor::ObjectStore(s) => {
            let mut s3 = json!({ "bucketArn": format!("arn:aws:s3:::{}", s.bucket_name) });
            if !s.inclusion_prefixes.is_empty() {
                s3["inclusionPrefixes"] = json!(s.inclusion_prefixes);
            }
            json!({ "type": "S3", "s3Configuration": s3 })
        }
        DataSourceDescriptor::Confluence(s) => json!({
            "type": "CONFLUENCE",
            "confluenceConfiguration": {
                "sourceConfiguration": {
                    "hostUrl": s.host_url,
                    "hostType": "SAAS",
                    "authType": s.auth_type.as_str(),
                    "credentialsSecretArn": s.credentials_secret_arn
                },
                "crawlerConfiguration": crawler_filters(&s.filters)
            }
        }),
        DataSourceDescriptor::SharePoint(s) => json!({
            "type": "SHAREPOINT",
            "sharePointConfiguration": {
                "sourceConfiguration": {
                    "tenantId": s.tenant_id,
                    "hostType": "ONLINE",
                    "domain": s.domain,
                    "siteUrls": s.site_urls,
                    "authType": s.auth_type.as_str(),
                    "credentialsSecretArn": s.credentials_secret_arn
                },
                "crawlerConfiguration": crawler_filters(&s.filters)
            }
        }),
        DataSourceDescriptor::Salesforce(s) => json!({
            "type": "SALESFORCE",
            "salesforceConfiguration": {
                "sourceConfiguration": {
                    "hostUrl": s.host_url,
                    "authType": s.auth_type.as_str(),
                    "credentialsSecretArn": s.credentials_secret_arn
                },
                "crawlerConfiguration": crawler_filters(&s.filters)
            }
        }),
        DataSourceDescriptor::WebCrawl(s) => {
            let seeds: Vec<Value> = s.seed_urls.iter().map(|u| json!({ "url": u })).collect();
            json!({
                "type": "WEB",
                "webConfiguration": {
                    "sourceConfiguration": { "urlConfiguration": { "seedUrls": seeds } },
                    "crawlerConfiguration": {
                        "crawlerLimits": { "rateLimit": s.rate_limit },
                        "scope": s.scope.as_str(),
                        "inclusionFilters": s.inclusion_filters,
                        "exclusionFilters": s.exclusion_filters
                    }
                }
            })
        }
        DataSourceDescriptor::WarehouseMetadata(_) => json!({ "type": "REDSHIFT_METADATA" }),
    }
}

fn crawler_filters(filters: &[PatternFilter]) -> Value {
    if filters.is_empty() {
        return json!({});
    }
    let filters: Vec<Value> = filters
        .iter()
        .map(|f| {
            json!({
                "objectType": f.object_type,
                "inclusionFilters": f.inclusion_filters,
                "exclusionFilters": f.exclusion_filters
            })
        })
        .collect();
    json!({
        "filterConfiguration": {
            "type": "PATTERN",
            "patternObjectFilter": { "filters": filters }
        }
    })
}

/// Chunking, transform and parsing settings shared by every connector.
/// `None` for structured knowledge bases.
pub fn vector_ingestion_configuration(
    spec: &ResourceSpec,
    region: &str,
    account: &str,
    intermediate_bucket: Option<&str>,
    transform_function_arn: Option<&str>,
) -> Result<Option<Value>> {
    if spec.backend() == IndexBackend::Warehouse {
        return Ok(None);
    }
    let chunking = |strategy: &str, key: Option<(&str, Value)>| {
        let mut c = json!({ "chunkingStrategy": strategy });
        if let Some((k, v)) = key {
            c[k] = v;
        }
        c
    };

    let mut config = match *spec.chunking() {
        ChunkingStrategy::None => json!({ "chunkingConfiguration": chunking("NONE", None) }),
        ChunkingStrategy::FixedSize {
            max_tokens,
            overlap_percentage,
        } => json!({
            "chunkingConfiguration": chunking("FIXED_SIZE", Some((
                "fixedSizeChunkingConfiguration",
                json!({ "maxTokens": max_tokens, "overlapPercentage": overlap_percentage }),
            )))
        }),
        ChunkingStrategy::Hierarchical {
            parent_max_tokens,
            child_max_tokens,
            overlap_tokens,
        } => json!({
            "chunkingConfiguration": chunking("HIERARCHICAL", Some((
                "hierarchicalChunkingConfiguration",
                json!({
                    "levelConfigurations": [
                        { "maxTokens": parent_max_tokens },
                        { "maxTokens": child_max_tokens }
                    ],
                    "overlapTokens": overlap_tokens
                }),
            )))
        }),
        ChunkingStrategy::Semantic {
            max_tokens,
            buffer_size,
            breakpoint_percentile_threshold,
        } => json!({
            "chunkingConfiguration": chunking("SEMANTIC", Some((
                "semanticChunkingConfiguration",
                json!({
                    "maxTokens": max_tokens,
                    "bufferSize": buffer_size,
                    "breakpointPercentileThreshold": breakpoint_percentile_threshold
                }),
            )))
        }),
        ChunkingStrategy::GraphContext => json!({
            "contextEnrichmentConfiguration": {
                "type": "BEDROCK_FOUNDATION_MODEL",
                "bedrockFoundationModelConfiguration": {
                    "enrichmentStrategyConfiguration": { "method": "CHUNK_ENTITY_EXTRACTION" },
                    "modelArn": catalog::model_arn(spec.enrichment_model(), region, account)
                }
            }
        }),
        ChunkingStrategy::Custom => {
            let bucket = intermediate_bucket
                .ok_or_else(|| KbError::config("custom chunking needs an intermediate bucket"))?;
            let function = transform_function_arn
                .ok_or_else(|| KbError::config("custom chunking needs a transform function"))?;
            json!({
                "customTransformationConfiguration": {
                    "intermediateStorage": {
                        "s3Location": { "uri": format!("s3://{}/", bucket) }
                    },
                    "transformations": [{
                        "transformationFunction": {
                            "transformationLambdaConfiguration": { "lambdaArn": function }
                        },
                        "stepToApply": "POST_CHUNKING"
                    }]
                },
                "chunkingConfiguration": chunking("NONE", None)
            })
        }
    };

    if spec.multimodal() {
        config["parsingConfiguration"] = match spec.parser() {
            ParserKind::FoundationModel => json!({
                "parsingStrategy": "BEDROCK_FOUNDATION_MODEL",
                "bedrockFoundationModelConfiguration": {
                    "parsingModality": "MULTIMODAL",
                    "modelArn": catalog::model_arn(spec.generation_model(), region, account)
                }
            }),
            ParserKind::DataAutomation => json!({
                "parsingStrategy": "BEDROCK_DATA_AUTOMATION",
                "bedrockDataAutomationConfiguration": { "parsingModality": "MULTIMODAL" }
            }),
        };
    }
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const BASE: &str = r#"
[knowledge_base]
name = "demo-kb"

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"
"#;

    fn spec(src: &str) -> ResourceSpec {
        ResourceSpec::from_config(&parse_config(src).unwrap()).unwrap()
    }

    #[test]
    fn fixed_size_is_the_default_ingestion() {
        let cfg = vector_ingestion_configuration(&spec(BASE), "us-east-1", "111122223333", None, None)
            .unwrap()
            .unwrap();
        let chunking = &cfg["chunkingConfiguration"];
        assert_eq!(chunking["chunkingStrategy"], "FIXED_SIZE");
        assert_eq!(chunking["fixedSizeChunkingConfiguration"]["maxTokens"], 300);
        assert_eq!(chunking["fixedSizeChunkingConfiguration"]["overlapPercentage"], 20);
        assert!(cfg.get("parsingConfiguration").is_none());
    }

    #[test]
    fn custom_chunking_routes_through_intermediate_bucket() {
        let src = format!(
            "{}\n[chunking]\nstrategy = \"CUSTOM\"\n\n[transform]\nfunction_arn = \"arn:aws:lambda:us-east-1:111122223333:function:chunker\"\n",
            BASE
        );
        let cfg = vector_ingestion_configuration(
            &spec(&src),
            "us-east-1",
            "111122223333",
            Some("demo-kb-intermediate"),
            Some("arn:aws:lambda:us-east-1:111122223333:function:chunker"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(cfg["chunkingConfiguration"]["chunkingStrategy"], "NONE");
        let custom = &cfg["customTransformationConfiguration"];
        assert_eq!(
            custom["intermediateStorage"]["s3Location"]["uri"],
            "s3://demo-kb-intermediate/"
        );
        assert_eq!(custom["transformations"][0]["stepToApply"], "POST_CHUNKING");
    }

    #[test]
    fn multimodal_adds_parser_and_supplemental_storage() {
        let src = BASE.replace("name = \"demo-kb\"", "name = \"demo-kb\"\nmultimodal = true")
            + "\n[models]\nembedding = \"cohere.embed-v4:0\"\n";
        let s = spec(&src);
        let kb = knowledge_base_configuration(&s, "us-east-1", "111122223333", Some("stage")).unwrap();
        assert_eq!(
            kb["vectorKnowledgeBaseConfiguration"]["supplementalDataStorageConfiguration"]
                ["storageLocations"][0]["s3Location"]["uri"],
            "s3://stage"
        );
        let ingest = vector_ingestion_configuration(&s, "us-east-1", "111122223333", Some("stage"), None)
            .unwrap()
            .unwrap();
        assert_eq!(ingest["parsingConfiguration"]["parsingStrategy"], "BEDROCK_FOUNDATION_MODEL");
    }

    #[test]
    fn saas_connector_carries_pattern_filters() {
        let src = format!(
            "{}\n[[data_sources]]\ntype = \"SAAS_SHAREPOINT\"\ntenant_id = \"t-1\"\ndomain = \"acme\"\nsite_urls = [\"https://acme.sharepoint.com/sites/docs\"]\nauth_type = \"OAUTH2_CLIENT_CREDENTIALS\"\ncredentials_secret_arn = \"arn:aws:secretsmanager:us-east-1:111122223333:secret:sp\"\n",
            BASE
        );
        let s = spec(&src);
        let cfg = connector_configuration(&s.data_sources()[1]);
        assert_eq!(cfg["type"], "SHAREPOINT");
        let sp = &cfg["sharePointConfiguration"];
        assert_eq!(sp["sourceConfiguration"]["hostType"], "ONLINE");
        assert_eq!(sp["sourceConfiguration"]["authType"], "OAUTH2_CLIENT_CREDENTIALS");
        assert_eq!(
            sp["crawlerConfiguration"]["filterConfiguration"]["patternObjectFilter"]["filters"][0]
                ["objectType"],
            "Attachment"
        );
    }

    #[test]
    fn web_connector_wraps_seed_urls() {
        let src = format!(
            "{}\n[[data_sources]]\ntype = \"WEB_CRAWL\"\nseed_urls = [\"https://docs.example.com\"]\n",
            BASE
        );
        let cfg = connector_configuration(&spec(&src).data_sources()[1]);
        let web = &cfg["webConfiguration"];
        assert_eq!(
            web["sourceConfiguration"]["urlConfiguration"]["seedUrls"][0]["url"],
            "https://docs.example.com"
        );
        assert_eq!(web["crawlerConfiguration"]["crawlerLimits"]["rateLimit"], 50);
        assert_eq!(web["crawlerConfiguration"]["scope"], "HOST_ONLY");
    }

    #[test]
    fn warehouse_is_an_sql_knowledge_base_without_storage() {
        let src = r#"
[knowledge_base]
name = "sales-kb"
backend = "WAREHOUSE"

[[data_sources]]
type = "WAREHOUSE_METADATA"
workgroup_arn = "arn:aws:redshift-serverless:us-east-1:111122223333:workgroup/abc"
database_name = "dev"
"#;
        let s = spec(src);
        let kb = knowledge_base_configuration(&s, "us-east-1", "111122223333", None).unwrap();
        assert_eq!(kb["type"], "SQL");
        let serverless = &kb["sqlKnowledgeBaseConfiguration"]["redshiftConfiguration"]
            ["queryEngineConfiguration"]["serverlessConfiguration"];
        assert_eq!(serverless["authConfiguration"]["type"], "IAM");
        assert!(vector_ingestion_configuration(&s, "us-east-1", "111122223333", None, None)
            .unwrap()
            .is_none());
        assert_eq!(
            connector_configuration(&s.data_sources()[0]),
            json!({ "type": "REDSHIFT_METADATA" })
        );
        assert!(storage_configuration(&IndexLocator::Warehouse {
            workgroup_arn: "w".into(),
            database_name: "dev".into(),
        })
        .is_none());
    }
}
