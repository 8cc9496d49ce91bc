//! Knowledge bases, connectors and ingestion jobs over the agent REST API.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{AwsProvider, Call, Service};
use crate::clients::{
    DataSourceDetail, DataSourceRequest, IngestionJob, KnowledgeApi, KnowledgeBaseDetail,
    KnowledgeBaseRequest,
};
use crate::error::ProviderResult;

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBase {
    knowledge_base_id: String,
    #[serde(default)]
    knowledge_base_arn: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    role_arn: String,
}

impl From<KnowledgeBase> for KnowledgeBaseDetail {
    fn from(kb: KnowledgeBase) -> Self {
        KnowledgeBaseDetail {
            id: kb.knowledge_base_id,
            arn: kb.knowledge_base_arn,
            name: kb.name,
            status: kb.status,
            role_arn: kb.role_arn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseReply {
    knowledge_base: KnowledgeBase,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBasePage {
    #[serde(default)]
    knowledge_base_summaries: Vec<KnowledgeBase>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSource {
    data_source_id: String,
    name: String,
    #[serde(default)]
    knowledge_base_id: String,
    #[serde(default)]
    status: String,
}

impl DataSource {
    fn into_detail(self, knowledge_base_id: &str) -> DataSourceDetail {
        DataSourceDetail {
            id: self.data_source_id,
            name: self.name,
            knowledge_base_id: if self.knowledge_base_id.is_empty() {
                knowledge_base_id.to_string()
            } else {
                self.knowledge_base_id
            },
            status: self.status,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceReply {
    data_source: DataSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourcePage {
    #[serde(default)]
    data_source_summaries: Vec<DataSource>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    ingestion_job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReply {
    ingestion_job: Job,
}

impl From<JobReply> for IngestionJob {
    fn from(r: JobReply) -> Self {
        IngestionJob {
            id: r.ingestion_job.ingestion_job_id,
            status: r.ingestion_job.status,
        }
    }
}

pub(crate) fn knowledge_base_body(request: &KnowledgeBaseRequest, client_token: &str) -> Value {
    let mut body = Map::new();
    body.insert("clientToken".into(), json!(client_token));
    body.insert("name".into(), json!(request.name));
    body.insert("description".into(), json!(request.description));
    body.insert("roleArn".into(), json!(request.role_arn));
    body.insert(
        "knowledgeBaseConfiguration".into(),
        request.configuration.clone(),
    );
    if let Some(storage) = &request.storage {
        body.insert("storageConfiguration".into(), storage.clone());
    }
    Value::Object(body)
}

pub(crate) fn data_source_body(request: &DataSourceRequest, client_token: &str) -> Value {
    let mut body = Map::new();
    body.insert("clientToken".into(), json!(client_token));
    body.insert("name".into(), json!(request.name));
    body.insert("description".into(), json!(request.description));
    body.insert(
        "dataSourceConfiguration".into(),
        request.configuration.clone(),
    );
    if let Some(ingestion) = &request.vector_ingestion {
        body.insert("vectorIngestionConfiguration".into(), ingestion.clone());
    }
    Value::Object(body)
}

fn page_body(token: &Option<String>) -> Value {
    match token {
        Some(t) => json!({ "maxResults": PAGE_SIZE, "nextToken": t }),
        None => json!({ "maxResults": PAGE_SIZE }),
    }
}

fn more(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

#[async_trait]
impl KnowledgeApi for AwsProvider {
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
    ) -> ProviderResult<KnowledgeBaseDetail> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let body = knowledge_base_body(request, &Uuid::new_v4().to_string());
        let call = Call::new(Method::PUT, "/knowledgebases/").json(&body);
        let reply: KnowledgeBaseReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.knowledge_base.into())
    }

    async fn get_knowledge_base(&self, id: &str) -> ProviderResult<KnowledgeBaseDetail> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let call = Call::new(Method::GET, format!("/knowledgebases/{}", id));
        let reply: KnowledgeBaseReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.knowledge_base.into())
    }

    async fn list_knowledge_bases(&self) -> ProviderResult<Vec<KnowledgeBaseDetail>> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let mut out = Vec::new();
        let mut token = None;
        loop {
            let call = Call::new(Method::POST, "/knowledgebases/").json(&page_body(&token));
            let page: KnowledgeBasePage = self.send(&endpoint, call).await?.json()?;
            out.extend(page.knowledge_base_summaries.into_iter().map(Into::into));
            token = more(page.next_token);
            if token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn delete_knowledge_base(&self, id: &str) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        self.send(
            &endpoint,
            Call::new(Method::DELETE, format!("/knowledgebases/{}", id)),
        )
        .await?;
        Ok(())
    }

    async fn create_data_source(
        &self,
        knowledge_base_id: &str,
        request: &DataSourceRequest,
    ) -> ProviderResult<DataSourceDetail> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let body = data_source_body(request, &Uuid::new_v4().to_string());
        let call = Call::new(
            Method::PUT,
            format!("/knowledgebases/{}/datasources/", knowledge_base_id),
        )
        .json(&body);
        let reply: DataSourceReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.data_source.into_detail(knowledge_base_id))
    }

    async fn list_data_sources(&self, knowledge_base_id: &str) -> ProviderResult<Vec<DataSourceDetail>> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let path = format!("/knowledgebases/{}/datasources/", knowledge_base_id);
        let mut out = Vec::new();
        let mut token = None;
        loop {
            let call = Call::new(Method::POST, path.clone()).json(&page_body(&token));
            let page: DataSourcePage = self.send(&endpoint, call).await?.json()?;
            out.extend(
                page.data_source_summaries
                    .into_iter()
                    .map(|ds| ds.into_detail(knowledge_base_id)),
            );
            token = more(page.next_token);
            if token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn delete_data_source(&self, knowledge_base_id: &str, id: &str) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let call = Call::new(
            Method::DELETE,
            format!("/knowledgebases/{}/datasources/{}", knowledge_base_id, id),
        );
        self.send(&endpoint, call).await?;
        Ok(())
    }

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> ProviderResult<IngestionJob> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let call = Call::new(
            Method::PUT,
            format!(
                "/knowledgebases/{}/datasources/{}/ingestionjobs/",
                knowledge_base_id, data_source_id
            ),
        )
        .json(&json!({ "clientToken": Uuid::new_v4().to_string() }));
        let reply: JobReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.into())
    }

    async fn get_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        job_id: &str,
    ) -> ProviderResult<IngestionJob> {
        let endpoint = self.endpoint(Service::BedrockAgent)?;
        let call = Call::new(
            Method::GET,
            format!(
                "/knowledgebases/{}/datasources/{}/ingestionjobs/{}",
                knowledge_base_id, data_source_id, job_id
            ),
        );
        let reply: JobReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warehouse_request_has_no_storage_section() {
        let body = knowledge_base_body(
            &KnowledgeBaseRequest {
                name: "kb-demo".into(),
                description: "demo".into(),
                role_arn: "arn:aws:iam::111122223333:role/kb-demo-execution-role".into(),
                configuration: json!({ "type": "SQL" }),
                storage: None,
            },
            "token-1",
        );
        assert_eq!(body["clientToken"], "token-1");
        assert!(body.get("storageConfiguration").is_none());
    }

    #[test]
    fn summaries_leave_arn_and_role_empty() {
        let page: KnowledgeBasePage = serde_json::from_str(
            r#"{"knowledgeBaseSummaries":[{"knowledgeBaseId":"KB123","name":"kb-demo","status":"ACTIVE","updatedAt":"2025-01-01T00:00:00Z"}],"nextToken":""}"#,
        )
        .unwrap();
        assert!(more(page.next_token).is_none());
        let detail: KnowledgeBaseDetail = page.knowledge_base_summaries.into_iter().next().unwrap().into();
        assert_eq!(detail.id, "KB123");
        assert!(detail.arn.is_empty());
        assert!(detail.role_arn.is_empty());
    }

    #[test]
    fn data_source_summary_inherits_parent_id() {
        let ds: DataSource =
            serde_json::from_str(r#"{"dataSourceId":"DS1","name":"docs","status":"AVAILABLE"}"#).unwrap();
        assert_eq!(ds.into_detail("KB123").knowledge_base_id, "KB123");
    }
}
