//! Serverless vector collections: control plane over JSON 1.0, index
//! creation over the collection's own REST endpoint.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{AwsProvider, Call, Service};
use crate::clients::{CollectionDetail, PolicySummary, SecurityPolicyType, VectorSearchApi};
use crate::error::ProviderResult;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyDetail {
    name: String,
    #[serde(default)]
    policy_version: String,
}

impl From<PolicyDetail> for PolicySummary {
    fn from(d: PolicyDetail) -> Self {
        PolicySummary {
            name: d.name,
            version: d.policy_version,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecurityPolicyReply {
    security_policy_detail: PolicyDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessPolicyReply {
    access_policy_detail: PolicyDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Collection {
    id: String,
    name: String,
    #[serde(default)]
    arn: String,
    #[serde(default)]
    status: String,
}

impl From<Collection> for CollectionDetail {
    fn from(c: Collection) -> Self {
        CollectionDetail {
            id: c.id,
            name: c.name,
            arn: c.arn,
            status: c.status,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionReply {
    create_collection_detail: Collection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetReply {
    #[serde(default)]
    collection_details: Vec<Collection>,
}

impl AwsProvider {
    async fn aoss<T: serde::de::DeserializeOwned>(&self, op: &str, body: Value) -> ProviderResult<T> {
        let target = format!("OpenSearchServerless.{}", op);
        self.json_rpc(Service::Aoss, CONTENT_TYPE, &target, &body).await
    }
}

#[async_trait]
impl VectorSearchApi for AwsProvider {
    async fn create_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
        policy: &str,
    ) -> ProviderResult<PolicySummary> {
        let reply: SecurityPolicyReply = self
            .aoss(
                "CreateSecurityPolicy",
                json!({
                    "name": name,
                    "type": kind.as_str(),
                    "policy": policy,
                    "clientToken": Uuid::new_v4().to_string(),
                }),
            )
            .await?;
        Ok(reply.security_policy_detail.into())
    }

    async fn get_security_policy(
        &self,
        name: &str,
        kind: SecurityPolicyType,
    ) -> ProviderResult<PolicySummary> {
        let reply: SecurityPolicyReply = self
            .aoss(
                "GetSecurityPolicy",
                json!({ "name": name, "type": kind.as_str() }),
            )
            .await?;
        Ok(reply.security_policy_detail.into())
    }

    async fn delete_security_policy(&self, name: &str, kind: SecurityPolicyType) -> ProviderResult<()> {
        let _: Value = self
            .aoss(
                "DeleteSecurityPolicy",
                json!({
                    "name": name,
                    "type": kind.as_str(),
                    "clientToken": Uuid::new_v4().to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_access_policy(&self, name: &str, policy: &str) -> ProviderResult<PolicySummary> {
        let reply: AccessPolicyReply = self
            .aoss(
                "CreateAccessPolicy",
                json!({
                    "name": name,
                    "type": "data",
                    "policy": policy,
                    "clientToken": Uuid::new_v4().to_string(),
                }),
            )
            .await?;
        Ok(reply.access_policy_detail.into())
    }

    async fn get_access_policy(&self, name: &str) -> ProviderResult<PolicySummary> {
        let reply: AccessPolicyReply = self
            .aoss("GetAccessPolicy", json!({ "name": name, "type": "data" }))
            .await?;
        Ok(reply.access_policy_detail.into())
    }

    async fn delete_access_policy(&self, name: &str) -> ProviderResult<()> {
        let _: Value = self
            .aoss(
                "DeleteAccessPolicy",
                json!({
                    "name": name,
                    "type": "data",
                    "clientToken": Uuid::new_v4().to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> ProviderResult<CollectionDetail> {
        let reply: CreateCollectionReply = self
            .aoss(
                "CreateCollection",
                json!({
                    "name": name,
                    "type": "VECTORSEARCH",
                    "clientToken": Uuid::new_v4().to_string(),
                }),
            )
            .await?;
        Ok(reply.create_collection_detail.into())
    }

    async fn batch_get_collection(&self, name: &str) -> ProviderResult<Option<CollectionDetail>> {
        let reply: BatchGetReply = self
            .aoss("BatchGetCollection", json!({ "names": [name] }))
            .await?;
        Ok(reply
            .collection_details
            .into_iter()
            .find(|c| c.name == name)
            .map(Into::into))
    }

    async fn delete_collection(&self, id: &str) -> ProviderResult<()> {
        let _: Value = self
            .aoss(
                "DeleteCollection",
                json!({ "id": id, "clientToken": Uuid::new_v4().to_string() }),
            )
            .await?;
        Ok(())
    }

    async fn create_index(&self, endpoint: &str, index: &str, body: &Value) -> ProviderResult<()> {
        let endpoint = self.endpoint_at(endpoint, "aoss")?;
        let call = Call::new(Method::PUT, format!("/{}", index)).json(body);
        self.send(&endpoint, call).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_get_reply_tolerates_missing_fields() {
        let reply: BatchGetReply = serde_json::from_str(
            r#"{"collectionDetails":[{"id":"abc123","name":"kb-demo","status":"CREATING"}],"collectionErrorDetails":[]}"#,
        )
        .unwrap();
        let detail: CollectionDetail = reply.collection_details.into_iter().next().unwrap().into();
        assert_eq!(detail.id, "abc123");
        assert_eq!(detail.arn, "");
        assert_eq!(detail.status, "CREATING");
    }

    #[test]
    fn empty_batch_get_means_absent() {
        let reply: BatchGetReply = serde_json::from_str("{}").unwrap();
        assert!(reply.collection_details.is_empty());
    }
}
