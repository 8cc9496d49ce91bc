//! Caller identity over the STS query API.

use async_trait::async_trait;

use super::{AwsProvider, Service};
use crate::clients::{AccountApi, CallerIdentity};
use crate::error::{ProviderError, ProviderResult};

#[async_trait]
impl AccountApi for AwsProvider {
    async fn caller_identity(&self) -> ProviderResult<CallerIdentity> {
        let doc = self
            .query(Service::Sts, "2011-06-15", "GetCallerIdentity", &[])
            .await?;
        let field = |name: &str| {
            doc.find_text(name)
                .map(str::to_string)
                .ok_or_else(|| ProviderError::Decode(format!("GetCallerIdentity has no {}", name)))
        };
        Ok(CallerIdentity {
            account: field("Account")?,
            arn: field("Arn")?,
            user_id: field("UserId")?,
        })
    }
}
