//! Object storage over the S3 REST API (path-style addressing).

use async_trait::async_trait;
use reqwest::Method;

use super::{AwsProvider, Call, Service};
use crate::clients::{BucketProbe, ObjectStoreApi, ObjectVersion};
use crate::error::{ProviderError, ProviderResult};
use crate::xml::Element;

fn bucket_path(bucket: &str) -> String {
    format!("/{}", bucket)
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("/{}/{}", bucket, key)
}

/// `CreateBucket` body. `us-east-1` is the implicit location and must not
/// be named.
pub(crate) fn location_constraint(region: &str) -> Option<String> {
    if region == "us-east-1" {
        None
    } else {
        Some(format!(
            "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
            region
        ))
    }
}

/// Versions and delete markers from one `ListObjectVersions` page, plus the
/// markers for the next page when truncated.
pub(crate) fn parse_versions(doc: &Element) -> (Vec<ObjectVersion>, Option<(String, String)>) {
    let versions = doc
        .children
        .iter()
        .filter(|c| c.name == "Version" || c.name == "DeleteMarker")
        .filter_map(|c| {
            Some(ObjectVersion {
                key: c.child_text("Key")?.to_string(),
                version_id: c
                    .child_text("VersionId")
                    .filter(|v| !v.is_empty() && *v != "null")
                    .map(str::to_string),
            })
        })
        .collect();
    let next = if doc.child_text("IsTruncated") == Some("true") {
        Some((
            doc.child_text("NextKeyMarker").unwrap_or_default().to_string(),
            doc.child_text("NextVersionIdMarker")
                .unwrap_or_default()
                .to_string(),
        ))
    } else {
        None
    };
    (versions, next)
}

#[async_trait]
impl ObjectStoreApi for AwsProvider {
    async fn head_bucket(&self, bucket: &str) -> ProviderResult<BucketProbe> {
        let endpoint = self.endpoint(Service::S3)?;
        let reply = self
            .send_raw(&endpoint, Call::new(Method::HEAD, bucket_path(bucket)))
            .await?;
        match reply.status {
            200..=299 => Ok(BucketProbe::Owned),
            404 => Ok(BucketProbe::Missing),
            403 => Ok(BucketProbe::Forbidden),
            _ => Err(reply.into_error()),
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::S3)?;
        let mut call = Call::new(Method::PUT, bucket_path(bucket));
        if let Some(body) = location_constraint(region) {
            call = call
                .header("content-type", "application/xml")
                .body(body.into_bytes());
        }
        self.send(&endpoint, call).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::S3)?;
        let call = Call::new(Method::PUT, object_path(bucket, key))
            .header("content-type", content_type)
            .body(body);
        self.send(&endpoint, call).await?;
        Ok(())
    }

    async fn list_object_versions(&self, bucket: &str) -> ProviderResult<Vec<ObjectVersion>> {
        let endpoint = self.endpoint(Service::S3)?;
        let mut out = Vec::new();
        let mut markers: Option<(String, String)> = None;
        loop {
            let mut call = Call::new(Method::GET, bucket_path(bucket)).query("versions", "");
            if let Some((key, version)) = &markers {
                call = call.query("key-marker", key.clone());
                if !version.is_empty() {
                    call = call.query("version-id-marker", version.clone());
                }
            }
            let doc = self.send(&endpoint, call).await?.xml()?;
            let (page, next) = parse_versions(&doc);
            out.extend(page);
            match next {
                Some(next) if Some(&next) != markers.as_ref() => markers = Some(next),
                Some(_) => {
                    return Err(ProviderError::Decode(
                        "ListObjectVersions did not advance its markers".into(),
                    ))
                }
                None => break,
            }
        }
        Ok(out)
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::S3)?;
        let mut call = Call::new(Method::DELETE, object_path(bucket, key));
        if let Some(version) = version_id {
            call = call.query("versionId", version);
        }
        self.send(&endpoint, call).await?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> ProviderResult<()> {
        let endpoint = self.endpoint(Service::S3)?;
        self.send(&endpoint, Call::new(Method::DELETE, bucket_path(bucket)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn us_east_1_omits_location() {
        assert!(location_constraint("us-east-1").is_none());
        let body = location_constraint("eu-west-1").unwrap();
        assert!(body.contains("<LocationConstraint>eu-west-1</LocationConstraint>"));
    }

    #[test]
    fn versions_page_includes_delete_markers() {
        let doc = parse(
            r#"<ListVersionsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>demo-docs</Name>
  <IsTruncated>true</IsTruncated>
  <NextKeyMarker>b.txt</NextKeyMarker>
  <NextVersionIdMarker>v9</NextVersionIdMarker>
  <Version><Key>a.txt</Key><VersionId>v1</VersionId><IsLatest>true</IsLatest></Version>
  <DeleteMarker><Key>b.txt</Key><VersionId>v2</VersionId></DeleteMarker>
  <Version><Key>c.txt</Key><VersionId>null</VersionId></Version>
</ListVersionsResult>"#,
        )
        .unwrap();
        let (versions, next) = parse_versions(&doc);
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[1].key, "b.txt");
        assert_eq!(versions[1].version_id.as_deref(), Some("v2"));
        assert_eq!(versions[2].version_id, None);
        assert_eq!(next, Some(("b.txt".into(), "v9".into())));
    }
}
