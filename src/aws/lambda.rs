//! Transform functions over the functions REST API.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AwsProvider, Call, Service};
use crate::clients::{FunctionApi, FunctionDetail, FunctionRequest};
use crate::error::ProviderResult;

const API: &str = "/2015-03-31/functions";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Configuration {
    function_name: String,
    function_arn: String,
}

impl From<Configuration> for FunctionDetail {
    fn from(c: Configuration) -> Self {
        FunctionDetail {
            name: c.function_name,
            arn: c.function_arn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetFunctionReply {
    configuration: Configuration,
}

pub(crate) fn create_body(request: &FunctionRequest) -> Value {
    json!({
        "FunctionName": request.name,
        "Role": request.role_arn,
        "Runtime": request.runtime,
        "Handler": request.handler,
        "Timeout": request.timeout_secs,
        "PackageType": "Zip",
        "Code": {
            "ZipFile": base64::engine::general_purpose::STANDARD.encode(&request.zip),
        },
    })
}

#[async_trait]
impl FunctionApi for AwsProvider {
    async fn create_function(&self, request: &FunctionRequest) -> ProviderResult<FunctionDetail> {
        let endpoint = self.endpoint(Service::Lambda)?;
        let call = Call::new(Method::POST, API).json(&create_body(request));
        let config: Configuration = self.send(&endpoint, call).await?.json()?;
        Ok(config.into())
    }

    async fn get_function(&self, name: &str) -> ProviderResult<FunctionDetail> {
        let endpoint = self.endpoint(Service::Lambda)?;
        let call = Call::new(Method::GET, format!("{}/{}", API, name));
        let reply: GetFunctionReply = self.send(&endpoint, call).await?.json()?;
        Ok(reply.configuration.into())
    }

    async fn delete_function(&self, name: &str) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::Lambda)?;
        self.send(
            &endpoint,
            Call::new(Method::DELETE, format!("{}/{}", API, name)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_is_base64_encoded() {
        let body = create_body(&FunctionRequest {
            name: "kb-demo-transform".into(),
            role_arn: "arn:aws:iam::111122223333:role/kb-demo-transform-role".into(),
            runtime: "python3.12".into(),
            handler: "index.handler".into(),
            timeout_secs: 300,
            zip: b"PK".to_vec(),
        });
        assert_eq!(body["Code"]["ZipFile"], "UEs=");
        assert_eq!(body["PackageType"], "Zip");
    }

    #[test]
    fn get_function_reads_configuration() {
        let reply: GetFunctionReply = serde_json::from_str(
            r#"{"Configuration":{"FunctionName":"kb-demo-transform","FunctionArn":"arn:aws:lambda:us-east-1:111122223333:function:kb-demo-transform","Runtime":"python3.12"},"Code":{}}"#,
        )
        .unwrap();
        let detail = FunctionDetail::from(reply.configuration);
        assert!(detail.arn.ends_with(":function:kb-demo-transform"));
    }
}
