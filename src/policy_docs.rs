//! Permission documents for the execution role and the vector collection.
//!
//! Builders here are pure: they take names and ARNs and return JSON
//! documents. Which documents a deployment needs is decided by
//! [`required_policies`].

use serde_json::{json, Value};

use crate::spec::{ChunkingStrategy, IndexBackend, ResourceSpec, WarehouseSource};

/// One customer-managed policy attached to the execution role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    FoundationModel,
    Storage,
    Logs,
    Secrets,
    Transform,
    DataAutomation,
    Graph,
    /// Data-plane access to one vector collection. Ensured by the index
    /// provisioner once the collection id is known.
    VectorAccess,
    Warehouse,
}

impl PolicyKind {
    /// Every kind, in the order the identity step ensures them.
    pub const ALL: [PolicyKind; 9] = [
        PolicyKind::FoundationModel,
        PolicyKind::Storage,
        PolicyKind::Logs,
        PolicyKind::Secrets,
        PolicyKind::Transform,
        PolicyKind::DataAutomation,
        PolicyKind::Graph,
        PolicyKind::VectorAccess,
        PolicyKind::Warehouse,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            PolicyKind::FoundationModel => "fm",
            PolicyKind::Storage => "s3",
            PolicyKind::Logs => "logs",
            PolicyKind::Secrets => "secrets",
            PolicyKind::Transform => "transform",
            PolicyKind::DataAutomation => "bda",
            PolicyKind::Graph => "graph",
            PolicyKind::VectorAccess => "aoss",
            PolicyKind::Warehouse => "warehouse",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PolicyKind::FoundationModel => "Invoke embedding and generation models",
            PolicyKind::Storage => "Read and write knowledge base documents",
            PolicyKind::Logs => "Write knowledge base logs",
            PolicyKind::Secrets => "Read data source credentials",
            PolicyKind::Transform => "Invoke the custom transform function",
            PolicyKind::DataAutomation => "Use the managed multimodal parser",
            PolicyKind::Graph => "Access the analytics graph",
            PolicyKind::VectorAccess => "Access the vector collection",
            PolicyKind::Warehouse => "Query the warehouse workgroup",
        }
    }
}

/// Account, region and resource names the documents are scoped to.
#[derive(Debug, Clone)]
pub struct PolicyScope<'a> {
    pub region: &'a str,
    pub account: &'a str,
    pub buckets: &'a [String],
    pub secrets: &'a [String],
    pub log_group: &'a str,
    /// ARN of the transform function, when chunking is `CUSTOM`.
    pub transform_function_arn: Option<&'a str>,
}

/// Documents the execution role needs for `spec`, in attachment order.
///
/// Foundation-model and log access are always present; the rest depend on
/// the backend, data sources and chunking strategy.
pub fn required_policies(spec: &ResourceSpec, scope: &PolicyScope<'_>) -> Vec<(PolicyKind, Value)> {
    let mut out = Vec::new();
    if let Some(warehouse) = spec.warehouse() {
        out.push((PolicyKind::Warehouse, warehouse_access(warehouse)));
    } else {
        out.push((PolicyKind::FoundationModel, foundation_model()));
    }
    out.push((PolicyKind::Logs, log_delivery(scope)));
    if !scope.buckets.is_empty() {
        out.push((PolicyKind::Storage, storage(scope.buckets, scope.account)));
    }
    if !scope.secrets.is_empty() && spec.backend() != IndexBackend::Warehouse {
        out.push((PolicyKind::Secrets, secrets(scope.secrets)));
    }
    if *spec.chunking() == ChunkingStrategy::Custom {
        if let Some(arn) = scope.transform_function_arn {
            out.push((PolicyKind::Transform, transform_invoke(arn, scope.account)));
        }
    }
    if spec.multimodal() {
        out.push((PolicyKind::DataAutomation, data_automation(scope.region, scope.account)));
    }
    if spec.backend() == IndexBackend::Graph {
        out.push((PolicyKind::Graph, graph_access(scope.region, scope.account)));
    }
    out
}

/// Trust policy letting `service` assume the role.
pub fn assume_role(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole"
        }]
    })
}

pub fn foundation_model() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "bedrock:ListFoundationModels",
                    "bedrock:GetInferenceProfile",
                    "bedrock:ListCustomModels",
                    "bedrock:InvokeModel",
                    "bedrock:InvokeModelWithResponseStream",
                    "bedrock:RetrieveAndGenerate",
                    "bedrock:Retrieve"
                ],
                "Resource": ["*"]
            },
            {
                "Sid": "MarketplaceOperationsFromBedrockFor3pModels",
                "Effect": "Allow",
                "Action": [
                    "aws-marketplace:Subscribe",
                    "aws-marketplace:ViewSubscriptions",
                    "aws-marketplace:Unsubscribe"
                ],
                "Resource": "*",
                "Condition": {
                    "StringEquals": { "aws:CalledViaLast": "bedrock.amazonaws.com" }
                }
            }
        ]
    })
}

pub fn storage(buckets: &[String], account: &str) -> Value {
    let resources: Vec<String> = buckets
        .iter()
        .flat_map(|b| [format!("arn:aws:s3:::{}", b), format!("arn:aws:s3:::{}/*", b)])
        .collect();
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["s3:GetObject", "s3:ListBucket", "s3:PutObject", "s3:DeleteObject"],
            "Resource": resources,
            "Condition": {
                "StringEquals": { "aws:ResourceAccount": account }
            }
        }]
    })
}

pub fn log_delivery(scope: &PolicyScope<'_>) -> Value {
    let (region, account, group) = (scope.region, scope.account, scope.log_group);
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                    "logs:DescribeLogStreams",
                    "logs:DescribeLogGroups"
                ],
                "Resource": [
                    "arn:aws:logs:*:*:log-group:/aws/bedrock/invokemodel:*",
                    format!("arn:aws:logs:{region}:{account}:log-group:{group}"),
                    format!("arn:aws:logs:{region}:{account}:log-group:{group}:*")
                ]
            },
            {
                "Effect": "Allow",
                "Action": [
                    "logs:CreateDelivery",
                    "logs:PutDeliverySource",
                    "logs:PutDeliveryDestination",
                    "logs:DescribeDeliveries",
                    "logs:DescribeDeliverySources",
                    "logs:DescribeDeliveryDestinations",
                    "logs:GetDelivery",
                    "logs:GetDeliverySource",
                    "logs:GetDeliveryDestination"
                ],
                "Resource": [
                    format!("arn:aws:logs:{region}:{account}:delivery-source:*"),
                    format!("arn:aws:logs:{region}:{account}:delivery:*"),
                    format!("arn:aws:logs:{region}:{account}:delivery-destination:*")
                ]
            }
        ]
    })
}

pub fn secrets(arns: &[String]) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["secretsmanager:GetSecretValue", "secretsmanager:PutSecretValue"],
            "Resource": arns
        }]
    })
}

pub fn transform_invoke(function_arn: &str, account: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "LambdaInvokeFunctionStatement",
            "Effect": "Allow",
            "Action": ["lambda:InvokeFunction"],
            "Resource": [function_arn, format!("{}:*", function_arn)],
            "Condition": {
                "StringEquals": { "aws:ResourceAccount": account }
            }
        }]
    })
}

pub fn data_automation(region: &str, account: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "BDAGetStatement",
                "Effect": "Allow",
                "Action": ["bedrock:GetDataAutomationStatus"],
                "Resource": format!("arn:aws:bedrock:{region}:{account}:data-automation-invocation/*")
            },
            {
                "Sid": "BDAInvokeStatement",
                "Effect": "Allow",
                "Action": ["bedrock:InvokeDataAutomationAsync"],
                "Resource": format!("arn:aws:bedrock:{region}:aws:data-automation-project/public-rag-default")
            }
        ]
    })
}

pub fn graph_access(region: &str, account: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "NeptuneAnalyticsAccess",
            "Effect": "Allow",
            "Action": ["neptune-graph:*"],
            "Resource": format!("arn:aws:neptune-graph:{region}:{account}:graph/*")
        }]
    })
}

pub fn vector_access(region: &str, account: &str, collection_id: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["aoss:APIAccessAll"],
            "Resource": [format!("arn:aws:aoss:{region}:{account}:collection/{collection_id}")]
        }]
    })
}

/// Query grant for a structured knowledge base. With a secret the role
/// reads database credentials from it; without one it asks the serverless
/// workgroup for temporary credentials.
pub fn warehouse_access(warehouse: &WarehouseSource) -> Value {
    let mut statements = vec![
        json!({
            "Sid": "RedshiftDataAPIStatementPermissions",
            "Effect": "Allow",
            "Action": [
                "redshift-data:GetStatementResult",
                "redshift-data:DescribeStatement",
                "redshift-data:CancelStatement"
            ],
            "Resource": ["*"],
            "Condition": {
                "StringEquals": { "redshift-data:statement-owner-iam-userid": "${aws:userid}" }
            }
        }),
        json!({
            "Sid": "RedshiftDataAPIExecutePermissions",
            "Effect": "Allow",
            "Action": ["redshift-data:ExecuteStatement"],
            "Resource": [warehouse.workgroup_arn]
        }),
        json!({
            "Sid": "SqlWorkbenchAccess",
            "Effect": "Allow",
            "Action": [
                "sqlworkbench:GetSqlRecommendations",
                "sqlworkbench:PutSqlGenerationContext",
                "sqlworkbench:GetSqlGenerationContext",
                "sqlworkbench:DeleteSqlGenerationContext"
            ],
            "Resource": "*"
        }),
        json!({
            "Sid": "KbAccess",
            "Effect": "Allow",
            "Action": ["bedrock:GenerateQuery"],
            "Resource": "*"
        }),
    ];
    match &warehouse.credentials_secret_arn {
        Some(secret) => statements.push(json!({
            "Sid": "GetSecretPermissions",
            "Effect": "Allow",
            "Action": ["secretsmanager:GetSecretValue"],
            "Resource": [secret]
        })),
        None => statements.push(json!({
            "Sid": "RedshiftServerlessGetCredentials",
            "Effect": "Allow",
            "Action": "redshift-serverless:GetCredentials",
            "Resource": [warehouse.workgroup_arn]
        })),
    }
    json!({ "Version": "2012-10-17", "Statement": statements })
}

// ═══════════════════════════════════════════════════════════════════════
// Collection security and access policies
// ═══════════════════════════════════════════════════════════════════════

pub fn encryption_policy(collection: &str) -> Value {
    json!({
        "Rules": [{
            "Resource": [format!("collection/{}", collection)],
            "ResourceType": "collection"
        }],
        "AWSOwnedKey": true
    })
}

pub fn network_policy(collection: &str) -> Value {
    json!([{
        "Rules": [{
            "Resource": [format!("collection/{}", collection)],
            "ResourceType": "collection"
        }],
        "AllowFromPublic": true
    }])
}

/// Data-access rules for the collection and its indexes, granted to the
/// caller (so it can create the index) and the execution role.
pub fn data_access_policy(collection: &str, principals: &[&str]) -> Value {
    json!([{
        "Rules": [
            {
                "Resource": [format!("collection/{}", collection)],
                "Permission": [
                    "aoss:CreateCollectionItems",
                    "aoss:DeleteCollectionItems",
                    "aoss:UpdateCollectionItems",
                    "aoss:DescribeCollectionItems"
                ],
                "ResourceType": "collection"
            },
            {
                "Resource": [format!("index/{}/*", collection)],
                "Permission": [
                    "aoss:CreateIndex",
                    "aoss:DeleteIndex",
                    "aoss:UpdateIndex",
                    "aoss:DescribeIndex",
                    "aoss:ReadDocument",
                    "aoss:WriteDocument"
                ],
                "ResourceType": "index"
            }
        ],
        "Principal": principals,
        "Description": "Knowledge base data access"
    }])
}

/// Bucket access for the transform function's own role.
pub fn transform_storage(bucket: &str, account: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["s3:GetObject", "s3:ListBucket", "s3:PutObject"],
            "Resource": [format!("arn:aws:s3:::{}", bucket), format!("arn:aws:s3:::{}/*", bucket)],
            "Condition": {
                "StringEquals": { "aws:ResourceAccount": account }
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn scope<'a>(buckets: &'a [String], secrets: &'a [String]) -> PolicyScope<'a> {
        PolicyScope {
            region: "us-east-1",
            account: "111122223333",
            buckets,
            secrets,
            log_group: "/aws/bedrock/knowledgebase/demo-kb",
            transform_function_arn: None,
        }
    }

    #[test]
    fn storage_document_covers_bucket_and_objects() {
        let doc = storage(&["demo-docs".to_string()], "111122223333");
        let resources = doc["Statement"][0]["Resource"].as_array().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1], "arn:aws:s3:::demo-docs/*");
    }

    #[test]
    fn warehouse_grant_depends_on_secret() {
        let mut source = WarehouseSource {
            workgroup_arn: "arn:aws:redshift-serverless:us-east-1:111122223333:workgroup/w".into(),
            database_name: "dev".into(),
            credentials_secret_arn: None,
        };
        let doc = warehouse_access(&source);
        assert!(doc.to_string().contains("redshift-serverless:GetCredentials"));

        source.credentials_secret_arn = Some("arn:aws:secretsmanager:us-east-1:111122223333:secret:db".into());
        let doc = warehouse_access(&source);
        assert!(doc.to_string().contains("GetSecretPermissions"));
        assert!(!doc.to_string().contains("GetCredentials"));
    }

    #[test]
    fn required_policies_follow_configuration() {
        let config = parse_config(
            r#"
[knowledge_base]
name = "demo-kb"
backend = "GRAPH"

[[data_sources]]
type = "OBJECT_STORE"
bucket_name = "demo-docs"
"#,
        )
        .unwrap();
        let spec = ResourceSpec::from_config(&config).unwrap();
        let buckets = spec.source_buckets();
        let kinds: Vec<PolicyKind> = required_policies(&spec, &scope(&buckets, &[]))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                PolicyKind::FoundationModel,
                PolicyKind::Logs,
                PolicyKind::Storage,
                PolicyKind::Graph
            ]
        );
    }

    #[test]
    fn data_access_lists_principals() {
        let doc = data_access_policy("kb-demo", &["arn:aws:iam::1:user/me", "arn:aws:iam::1:role/r"]);
        assert_eq!(doc[0]["Principal"].as_array().unwrap().len(), 2);
    }
}
