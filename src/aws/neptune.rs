//! Analytics graphs over the graph service REST API.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::{AwsProvider, Call, Service};
use crate::clients::{GraphApi, GraphDetail, GraphRequest};
use crate::error::ProviderResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Graph {
    id: String,
    name: String,
    #[serde(default)]
    arn: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    deletion_protection: bool,
}

impl From<Graph> for GraphDetail {
    fn from(g: Graph) -> Self {
        GraphDetail {
            id: g.id,
            name: g.name,
            arn: g.arn,
            status: g.status,
            deletion_protection: g.deletion_protection,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListGraphsReply {
    #[serde(default)]
    graphs: Vec<Graph>,
    next_token: Option<String>,
}

pub(crate) fn create_body(request: &GraphRequest) -> serde_json::Value {
    json!({
        "graphName": request.name,
        "vectorSearchConfiguration": { "dimension": request.dimension },
        "provisionedMemory": request.provisioned_memory,
        "replicaCount": request.replica_count,
        "publicConnectivity": request.public_connectivity,
        "deletionProtection": request.deletion_protection,
    })
}

#[async_trait]
impl GraphApi for AwsProvider {
    async fn create_graph(&self, request: &GraphRequest) -> ProviderResult<GraphDetail> {
        let endpoint = self.endpoint(Service::NeptuneGraph)?;
        let call = Call::new(Method::POST, "/graphs").json(&create_body(request));
        let graph: Graph = self.send(&endpoint, call).await?.json()?;
        Ok(graph.into())
    }

    async fn get_graph(&self, id: &str) -> ProviderResult<GraphDetail> {
        let endpoint = self.endpoint(Service::NeptuneGraph)?;
        let call = Call::new(Method::GET, format!("/graphs/{}", id));
        let graph: Graph = self.send(&endpoint, call).await?.json()?;
        Ok(graph.into())
    }

    async fn list_graphs(&self) -> ProviderResult<Vec<GraphDetail>> {
        let endpoint = self.endpoint(Service::NeptuneGraph)?;
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut call = Call::new(Method::GET, "/graphs");
            if let Some(t) = &token {
                call = call.query("nextToken", t.clone());
            }
            let page: ListGraphsReply = self.send(&endpoint, call).await?.json()?;
            out.extend(page.graphs.into_iter().map(GraphDetail::from));
            match page.next_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn update_deletion_protection(&self, id: &str, enabled: bool) -> ProviderResult<GraphDetail> {
        let endpoint = self.endpoint(Service::NeptuneGraph)?;
        let call = Call::new(Method::PATCH, format!("/graphs/{}", id))
            .json(&json!({ "deletionProtection": enabled }));
        let graph: Graph = self.send(&endpoint, call).await?.json()?;
        Ok(graph.into())
    }

    async fn delete_graph(&self, id: &str, skip_snapshot: bool) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::NeptuneGraph)?;
        let call = Call::new(Method::DELETE, format!("/graphs/{}", id))
            .query("skipSnapshot", skip_snapshot.to_string());
        self.send(&endpoint, call).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_carries_vector_dimension() {
        let body = create_body(&GraphRequest {
            name: "kb-demo-graph".into(),
            dimension: 1024,
            provisioned_memory: 16,
            replica_count: 0,
            public_connectivity: false,
            deletion_protection: false,
        });
        assert_eq!(body["graphName"], "kb-demo-graph");
        assert_eq!(body["vectorSearchConfiguration"]["dimension"], 1024);
        assert_eq!(body["replicaCount"], 0);
    }

    #[test]
    fn list_reply_without_token_is_last_page() {
        let page: ListGraphsReply = serde_json::from_str(
            r#"{"graphs":[{"id":"g-1","name":"kb-demo-graph","arn":"arn:aws:neptune-graph:us-east-1:111122223333:graph/g-1","status":"AVAILABLE","deletionProtection":true}]}"#,
        )
        .unwrap();
        assert!(page.next_token.is_none());
        let detail = GraphDetail::from(page.graphs.into_iter().next().unwrap());
        assert!(detail.deletion_protection);
        assert_eq!(detail.status, "AVAILABLE");
    }
}
