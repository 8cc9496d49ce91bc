//! Identity and access over the IAM query API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AwsProvider, Service};
use crate::clients::{IdentityApi, ManagedPolicy, PolicyVersion, Role};
use crate::error::{ProviderError, ProviderResult};
use crate::xml::Element;

const VERSION: &str = "2010-05-08";

fn missing(what: &str) -> ProviderError {
    ProviderError::Decode(format!("IAM response has no {}", what))
}

fn role_from(doc: &Element) -> ProviderResult<Role> {
    let role = doc.find("Role").ok_or_else(|| missing("Role"))?;
    Ok(Role {
        name: role.child_text("RoleName").ok_or_else(|| missing("RoleName"))?.to_string(),
        arn: role.child_text("Arn").ok_or_else(|| missing("Arn"))?.to_string(),
    })
}

/// The `Marker` to send for the next page, if the listing was truncated.
fn next_marker(doc: &Element) -> Option<String> {
    if doc.find_text("IsTruncated") == Some("true") {
        doc.find_text("Marker").map(str::to_string)
    } else {
        None
    }
}

pub(crate) fn parse_versions(doc: &Element) -> Vec<PolicyVersion> {
    doc.find("Versions")
        .map(|versions| {
            versions
                .children_named("member")
                .filter_map(|m| {
                    Some(PolicyVersion {
                        version_id: m.child_text("VersionId")?.to_string(),
                        is_default: m.child_text("IsDefaultVersion") == Some("true"),
                        created: m
                            .child_text("CreateDate")
                            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                            .map(|d| d.with_timezone(&Utc)),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl AwsProvider {
    async fn iam(&self, action: &str, params: &[(&str, &str)]) -> ProviderResult<Element> {
        self.query(Service::Iam, VERSION, action, params).await
    }

    /// Run a marker-paginated IAM listing, collecting every page.
    async fn iam_pages<T>(
        &self,
        action: &str,
        params: &[(&str, &str)],
        extract: impl Fn(&Element) -> Vec<T>,
    ) -> ProviderResult<Vec<T>> {
        let mut out = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut p: Vec<(&str, &str)> = params.to_vec();
            if let Some(m) = &marker {
                p.push(("Marker", m.as_str()));
            }
            let doc = self.iam(action, &p).await?;
            out.extend(extract(&doc));
            match next_marker(&doc) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl IdentityApi for AwsProvider {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> ProviderResult<Role> {
        let doc = self
            .iam(
                "CreateRole",
                &[
                    ("RoleName", name),
                    ("AssumeRolePolicyDocument", trust_policy),
                    ("Description", description),
                ],
            )
            .await?;
        role_from(&doc)
    }

    async fn get_role(&self, name: &str) -> ProviderResult<Role> {
        let doc = self.iam("GetRole", &[("RoleName", name)]).await?;
        role_from(&doc)
    }

    async fn update_assume_role_policy(&self, name: &str, trust_policy: &str) -> ProviderResult<()> {
        self.iam(
            "UpdateAssumeRolePolicy",
            &[("RoleName", name), ("PolicyDocument", trust_policy)],
        )
        .await?;
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ProviderResult<()> {
        self.iam("DeleteRole", &[("RoleName", name)]).await?;
        Ok(())
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: &str,
    ) -> ProviderResult<ManagedPolicy> {
        let doc = self
            .iam(
                "CreatePolicy",
                &[
                    ("PolicyName", name),
                    ("PolicyDocument", document),
                    ("Description", description),
                ],
            )
            .await?;
        let policy = doc.find("Policy").ok_or_else(|| missing("Policy"))?;
        Ok(ManagedPolicy {
            name: policy
                .child_text("PolicyName")
                .ok_or_else(|| missing("PolicyName"))?
                .to_string(),
            arn: policy.child_text("Arn").ok_or_else(|| missing("Arn"))?.to_string(),
        })
    }

    async fn create_policy_version(
        &self,
        policy_arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ProviderResult<()> {
        let default = if set_as_default { "true" } else { "false" };
        self.iam(
            "CreatePolicyVersion",
            &[
                ("PolicyArn", policy_arn),
                ("PolicyDocument", document),
                ("SetAsDefault", default),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_policy_versions(&self, policy_arn: &str) -> ProviderResult<Vec<PolicyVersion>> {
        self.iam_pages("ListPolicyVersions", &[("PolicyArn", policy_arn)], parse_versions)
            .await
    }

    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> ProviderResult<()> {
        self.iam(
            "DeletePolicyVersion",
            &[("PolicyArn", policy_arn), ("VersionId", version_id)],
        )
        .await?;
        Ok(())
    }

    async fn delete_policy(&self, policy_arn: &str) -> ProviderResult<()> {
        self.iam("DeletePolicy", &[("PolicyArn", policy_arn)]).await?;
        Ok(())
    }

    async fn attach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam(
            "AttachRolePolicy",
            &[("RoleName", role), ("PolicyArn", policy_arn)],
        )
        .await?;
        Ok(())
    }

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam(
            "DetachRolePolicy",
            &[("RoleName", role), ("PolicyArn", policy_arn)],
        )
        .await?;
        Ok(())
    }

    async fn list_attached_role_policies(&self, role: &str) -> ProviderResult<Vec<ManagedPolicy>> {
        self.iam_pages("ListAttachedRolePolicies", &[("RoleName", role)], |doc| {
            doc.find("AttachedPolicies")
                .map(|list| {
                    list.children_named("member")
                        .filter_map(|m| {
                            Some(ManagedPolicy {
                                name: m.child_text("PolicyName")?.to_string(),
                                arn: m.child_text("PolicyArn")?.to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .await
    }

    async fn list_role_policies(&self, role: &str) -> ProviderResult<Vec<String>> {
        self.iam_pages("ListRolePolicies", &[("RoleName", role)], |doc| {
            doc.find("PolicyNames")
                .map(|list| {
                    list.children_named("member")
                        .map(|m| m.text.clone())
                        .collect()
                })
                .unwrap_or_default()
        })
        .await
    }

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> ProviderResult<()> {
        self.iam(
            "DeleteRolePolicy",
            &[("RoleName", role), ("PolicyName", policy_name)],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn policy_versions_parse_with_dates() {
        let doc = parse(
            r#"<ListPolicyVersionsResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
  <ListPolicyVersionsResult>
    <Versions>
      <member><VersionId>v3</VersionId><IsDefaultVersion>true</IsDefaultVersion><CreateDate>2025-03-01T10:00:00Z</CreateDate></member>
      <member><VersionId>v2</VersionId><IsDefaultVersion>false</IsDefaultVersion><CreateDate>2025-02-01T10:00:00Z</CreateDate></member>
    </Versions>
    <IsTruncated>false</IsTruncated>
  </ListPolicyVersionsResult>
</ListPolicyVersionsResponse>"#,
        )
        .unwrap();
        let versions = parse_versions(&doc);
        assert_eq!(versions.len(), 2);
        assert!(versions[0].is_default);
        assert!(versions[1].created.unwrap() < versions[0].created.unwrap());
        assert!(next_marker(&doc).is_none());
    }

    #[test]
    fn role_is_read_from_nested_result() {
        let doc = parse(
            r#"<CreateRoleResponse><CreateRoleResult><Role><RoleName>demo-kb-execution-role</RoleName><Arn>arn:aws:iam::111122223333:role/demo-kb-execution-role</Arn></Role></CreateRoleResult></CreateRoleResponse>"#,
        )
        .unwrap();
        let role = role_from(&doc).unwrap();
        assert_eq!(role.name, "demo-kb-execution-role");
        assert!(role.arn.ends_with(":role/demo-kb-execution-role"));
    }
}
