//! Deterministic resource names.
//!
//! Every remote name is a pure function of the knowledge base name and the
//! deployment suffix, so a re-run with the same configuration lands on the
//! same names and adopts instead of duplicating. Names that would exceed a
//! provider's length limit are shortened with a digest of the full name.

use sha2::{Digest, Sha256};

use crate::policy_docs::PolicyKind;
use crate::spec::{ConnectorKind, ResourceSpec};

const ROLE_NAME_MAX: usize = 64;
const POLICY_NAME_MAX: usize = 128;
const BUCKET_NAME_MAX: usize = 63;
const FUNCTION_NAME_MAX: usize = 64;
const GRAPH_NAME_MAX: usize = 63;
const DELIVERY_NAME_MAX: usize = 60;

/// All names derived for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    kb: String,
    suffix: String,
    digest: String,
    intermediate_bucket_override: Option<String>,
    transform_function_override: Option<String>,
}

impl Names {
    /// Derive names for `spec`. The suffix defaults to `<region>-<account>`.
    pub fn new(spec: &ResourceSpec, region: &str, account: &str) -> Self {
        let suffix = spec
            .suffix()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", region, account));
        let transform_function_override = match spec.transform() {
            Some(crate::spec::TransformSpec::Package { function_name, .. }) => {
                function_name.clone()
            }
            _ => None,
        };
        Self::from_parts(
            spec.name(),
            &suffix,
            spec.intermediate_bucket_override().map(str::to_string),
            transform_function_override,
        )
    }

    pub(crate) fn from_parts(
        kb: &str,
        suffix: &str,
        intermediate_bucket_override: Option<String>,
        transform_function_override: Option<String>,
    ) -> Self {
        Self {
            kb: kb.to_string(),
            suffix: suffix.to_string(),
            digest: short_digest(&format!("{}/{}", kb, suffix), 10),
            intermediate_bucket_override,
            transform_function_override,
        }
    }

    pub fn knowledge_base(&self) -> &str {
        &self.kb
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn execution_role(&self) -> String {
        fit(
            &format!("{}-execution-role-{}", self.kb, self.suffix),
            ROLE_NAME_MAX,
        )
    }

    pub fn policy(&self, kind: PolicyKind) -> String {
        fit(
            &format!("{}-{}-policy-{}", self.kb, kind.slug(), self.suffix),
            POLICY_NAME_MAX,
        )
    }

    /// Collection names are capped at 32 characters and must start with a
    /// lowercase letter.
    pub fn collection(&self) -> String {
        let prefix: String = lower_dns(&self.kb).chars().take(16).collect();
        let prefix = prefix.trim_end_matches('-');
        format!("kb-{}-{}", prefix, self.digest)
            .replace("--", "-")
    }

    pub fn encryption_policy(&self) -> String {
        format!("kb-enc-{}", self.digest)
    }

    pub fn network_policy(&self) -> String {
        format!("kb-net-{}", self.digest)
    }

    pub fn data_access_policy(&self) -> String {
        format!("kb-data-{}", self.digest)
    }

    pub fn vector_index(&self) -> String {
        format!("{}-index", lower_dns(&self.kb))
    }

    pub fn graph(&self) -> String {
        let base = lower_dns(&self.kb);
        let base = if base.starts_with(|c: char| c.is_ascii_lowercase()) {
            base
        } else {
            format!("g-{}", base)
        };
        fit(&format!("{}-graph", base), GRAPH_NAME_MAX)
    }

    pub fn log_group(&self) -> String {
        format!("/aws/bedrock/knowledgebase/{}", self.kb)
    }

    pub fn delivery_source(&self) -> String {
        fit(&format!("kb-{}-source", self.kb), DELIVERY_NAME_MAX)
    }

    pub fn delivery_destination(&self) -> String {
        fit(&format!("kb-{}-destination", self.kb), DELIVERY_NAME_MAX)
    }

    /// Connector names are unique within their knowledge base.
    pub fn connector(&self, kind: ConnectorKind, ordinal: usize) -> String {
        format!("{}-{}-{}", self.kb, kind.slug(), ordinal)
    }

    pub fn intermediate_bucket(&self) -> String {
        if let Some(name) = &self.intermediate_bucket_override {
            return name.clone();
        }
        let name = format!("{}-intermediate-{}", lower_dns(&self.kb), self.suffix.to_lowercase());
        fit(&name, BUCKET_NAME_MAX)
    }

    pub fn transform_function(&self) -> String {
        if let Some(name) = &self.transform_function_override {
            return name.clone();
        }
        fit(
            &format!("{}-transform-{}", self.kb, self.suffix),
            FUNCTION_NAME_MAX,
        )
    }

    pub fn transform_role(&self) -> String {
        fit(
            &format!("{}-transform-role-{}", self.kb, self.suffix),
            ROLE_NAME_MAX,
        )
    }

    pub fn transform_storage_policy(&self) -> String {
        fit(
            &format!("{}-transform-s3-policy-{}", self.kb, self.suffix),
            POLICY_NAME_MAX,
        )
    }
}

/// Lowercase, with anything outside `[a-z0-9-]` replaced by `-`.
fn lower_dns(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn short_digest(input: &str, len: usize) -> String {
    let hash = hex::encode(Sha256::digest(input.as_bytes()));
    hash[..len].to_string()
}

/// Shorten `name` to `max` characters, keeping it unique by replacing the
/// tail with a digest of the full name.
fn fit(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let digest = short_digest(name, 8);
    let head: String = name.chars().take(max - digest.len() - 1).collect();
    format!("{}-{}", head.trim_end_matches(['-', '_', '.']), digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Names {
        Names::from_parts("demo-kb", "us-east-1-111122223333", None, None)
    }

    #[test]
    fn names_are_deterministic() {
        assert_eq!(names(), names());
        assert_eq!(names().collection(), names().collection());
        assert_eq!(
            names().execution_role(),
            "demo-kb-execution-role-us-east-1-111122223333"
        );
        assert_eq!(names().connector(ConnectorKind::ObjectStore, 0), "demo-kb-s3-0");
        assert_eq!(names().log_group(), "/aws/bedrock/knowledgebase/demo-kb");
    }

    #[test]
    fn collection_and_policy_names_fit_limits() {
        let long = Names::from_parts(
            "A_Very_Long_Knowledge_Base_Name_For_Testing",
            "eu-central-1-999988887777",
            None,
            None,
        );
        for name in [
            long.collection(),
            long.encryption_policy(),
            long.network_policy(),
            long.data_access_policy(),
        ] {
            assert!(name.len() <= 32, "{name} is {} chars", name.len());
            assert!(name.starts_with(|c: char| c.is_ascii_lowercase()));
        }
        assert!(long.execution_role().len() <= 64);
        assert!(long.intermediate_bucket().len() <= 63);
        assert!(long.graph().starts_with("a-very-long"));
    }

    #[test]
    fn different_suffixes_do_not_collide() {
        let a = Names::from_parts("demo-kb", "one", None, None);
        let b = Names::from_parts("demo-kb", "two", None, None);
        assert_ne!(a.collection(), b.collection());
        assert_ne!(a.execution_role(), b.execution_role());
    }

    #[test]
    fn fit_keeps_short_names() {
        assert_eq!(fit("short", 10), "short");
        let fitted = fit(&"x".repeat(80), 64);
        assert_eq!(fitted.len(), 64);
    }

    #[test]
    fn overrides_win() {
        let n = Names::from_parts("kb", "s", Some("my-staging".into()), Some("chunker".into()));
        assert_eq!(n.intermediate_bucket(), "my-staging");
        assert_eq!(n.transform_function(), "chunker");
    }
}
