//! Log groups and vended log delivery over JSON 1.1.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AwsProvider, Service};
use crate::clients::{Delivery, DeliveryEndpoint, LogDeliveryApi};
use crate::error::ProviderResult;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Deserialize)]
struct NamedArn {
    name: String,
    #[serde(default)]
    arn: String,
}

impl From<NamedArn> for DeliveryEndpoint {
    fn from(n: NamedArn) -> Self {
        DeliveryEndpoint {
            name: n.name,
            arn: n.arn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceReply {
    delivery_source: NamedArn,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationReply {
    delivery_destination: NamedArn,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryShape {
    id: String,
    #[serde(default)]
    delivery_source_name: String,
    #[serde(default)]
    delivery_destination_arn: String,
}

impl From<DeliveryShape> for Delivery {
    fn from(d: DeliveryShape) -> Self {
        Delivery {
            id: d.id,
            source_name: d.delivery_source_name,
            destination_arn: d.delivery_destination_arn,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateDeliveryReply {
    delivery: DeliveryShape,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryPage {
    #[serde(default)]
    deliveries: Vec<DeliveryShape>,
    next_token: Option<String>,
}

impl AwsProvider {
    async fn logs<T: DeserializeOwned>(&self, op: &str, body: Value) -> ProviderResult<T> {
        let target = format!("Logs_20140328.{}", op);
        self.json_rpc(Service::Logs, CONTENT_TYPE, &target, &body).await
    }
}

#[async_trait]
impl LogDeliveryApi for AwsProvider {
    async fn create_log_group(&self, name: &str) -> ProviderResult<()> {
        let _: Value = self
            .logs("CreateLogGroup", json!({ "logGroupName": name }))
            .await?;
        Ok(())
    }

    async fn put_retention_policy(&self, name: &str, days: u32) -> ProviderResult<()> {
        let _: Value = self
            .logs(
                "PutRetentionPolicy",
                json!({ "logGroupName": name, "retentionInDays": days }),
            )
            .await?;
        Ok(())
    }

    async fn delete_log_group(&self, name: &str) -> ProviderResult<()> {
        let _: Value = self
            .logs("DeleteLogGroup", json!({ "logGroupName": name }))
            .await?;
        Ok(())
    }

    async fn put_delivery_source(
        &self,
        name: &str,
        resource_arn: &str,
        log_type: &str,
    ) -> ProviderResult<DeliveryEndpoint> {
        let reply: SourceReply = self
            .logs(
                "PutDeliverySource",
                json!({ "name": name, "resourceArn": resource_arn, "logType": log_type }),
            )
            .await?;
        Ok(reply.delivery_source.into())
    }

    async fn get_delivery_source(&self, name: &str) -> ProviderResult<DeliveryEndpoint> {
        let reply: SourceReply = self
            .logs("GetDeliverySource", json!({ "name": name }))
            .await?;
        Ok(reply.delivery_source.into())
    }

    async fn delete_delivery_source(&self, name: &str) -> ProviderResult<()> {
        let _: Value = self
            .logs("DeleteDeliverySource", json!({ "name": name }))
            .await?;
        Ok(())
    }

    async fn put_delivery_destination(
        &self,
        name: &str,
        target_arn: &str,
    ) -> ProviderResult<DeliveryEndpoint> {
        let reply: DestinationReply = self
            .logs(
                "PutDeliveryDestination",
                json!({
                    "name": name,
                    "deliveryDestinationConfiguration": { "destinationResourceArn": target_arn },
                }),
            )
            .await?;
        Ok(reply.delivery_destination.into())
    }

    async fn get_delivery_destination(&self, name: &str) -> ProviderResult<DeliveryEndpoint> {
        let reply: DestinationReply = self
            .logs("GetDeliveryDestination", json!({ "name": name }))
            .await?;
        Ok(reply.delivery_destination.into())
    }

    async fn delete_delivery_destination(&self, name: &str) -> ProviderResult<()> {
        let _: Value = self
            .logs("DeleteDeliveryDestination", json!({ "name": name }))
            .await?;
        Ok(())
    }

    async fn create_delivery(
        &self,
        source_name: &str,
        destination_arn: &str,
    ) -> ProviderResult<Delivery> {
        let reply: CreateDeliveryReply = self
            .logs(
                "CreateDelivery",
                json!({
                    "deliverySourceName": source_name,
                    "deliveryDestinationArn": destination_arn,
                }),
            )
            .await?;
        Ok(reply.delivery.into())
    }

    async fn describe_deliveries(&self) -> ProviderResult<Vec<Delivery>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let body = match &token {
                Some(t) => json!({ "nextToken": t }),
                None => json!({}),
            };
            let page: DeliveryPage = self.logs("DescribeDeliveries", body).await?;
            out.extend(page.deliveries.into_iter().map(Delivery::from));
            match page.next_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn delete_delivery(&self, id: &str) -> ProviderResult<()> {
        let _: Value = self.logs("DeleteDelivery", json!({ "id": id })).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_page_maps_source_and_destination() {
        let page: DeliveryPage = serde_json::from_str(
            r#"{"deliveries":[{"id":"d-1","deliverySourceName":"kb-demo-logs-source","deliveryDestinationArn":"arn:aws:logs:us-east-1:111122223333:delivery-destination:kb-demo-logs-destination","deliveryDestinationType":"CWL"}]}"#,
        )
        .unwrap();
        assert!(page.next_token.is_none());
        let delivery = Delivery::from(page.deliveries.into_iter().next().unwrap());
        assert_eq!(delivery.source_name, "kb-demo-logs-source");
        assert!(delivery.destination_arn.ends_with("kb-demo-logs-destination"));
    }
}
