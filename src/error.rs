//! Error types for the orchestrator.
//!
//! Two layers, both built on `thiserror`:
//!
//! - [`ProviderError`]: what a facade call (see [`crate::clients`]) returns.
//!   Provider error codes are folded into a small taxonomy so that callers can
//!   branch on *meaning* (already exists, not found, name taken, transient)
//!   instead of on service-specific strings.
//! - [`KbError`]: what the orchestrator's public operations return.
//!
//! The `kbctl` binary wraps both in `anyhow` at the top level.

use std::path::PathBuf;

/// Error returned by a single provider request.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The resource (or its name) already exists and belongs to the caller.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A globally unique name is held by a different account.
    #[error("name unavailable: {0}")]
    NameTaken(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A provider quota (e.g. policy version count) has been reached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Throttling, 5xx responses, or eventual-consistency lag.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Any other error code returned by the provider.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// Network-level failure before a response was received.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response could not be decoded.
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Convenience alias used by every facade method.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Classify a provider error code into the taxonomy.
    ///
    /// Codes come from the XML `<Code>` element (IAM, STS, S3), the JSON
    /// `__type` field (collections, log delivery), the `x-amzn-ErrorType`
    /// header (REST services) or the search engine's `error.type`.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "EntityAlreadyExists"
            | "ConflictException"
            | "ResourceAlreadyExistsException"
            | "ResourceConflictException"
            | "BucketAlreadyOwnedByYou"
            | "resource_already_exists_exception" => Self::AlreadyExists(message),
            "NoSuchEntity"
            | "NoSuchBucket"
            | "NoSuchKey"
            | "NotFound"
            | "ResourceNotFoundException"
            | "index_not_found_exception" => Self::NotFound(message),
            "BucketAlreadyExists" => Self::NameTaken(message),
            "AccessDenied" | "AccessDeniedException" | "Forbidden" => Self::AccessDenied(message),
            "LimitExceeded" | "ServiceQuotaExceededException" => Self::LimitExceeded(message),
            "Throttling"
            | "ThrottlingException"
            | "TooManyRequestsException"
            | "SlowDown"
            | "ServiceUnavailable"
            | "ServiceUnavailableException"
            | "InternalFailure"
            | "InternalServerException"
            | "InternalError" => Self::Transient(message),
            other => Self::Service {
                code: other.to_string(),
                message,
            },
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Error returned by the orchestrator's operations.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// The configuration is invalid. Raised before any remote call.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A lookup into a fixed configuration table failed.
    #[error("config error: {message}")]
    Config { message: String },

    /// The bucket name is taken by a different account. Retrying cannot help.
    #[error("bucket name '{bucket}' is already taken globally; choose a different name")]
    BucketNameUnavailable { bucket: String },

    /// A remote step failed.
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: ProviderError,
    },

    /// Creation reported a conflict but no resource with the name was found.
    #[error("{kind} '{name}' reported a conflict but no existing resource matched")]
    AdoptionMiss { kind: &'static str, name: String },

    /// A long-running resource settled in a failed state.
    #[error("{kind} '{name}' entered status {status}")]
    ResourceFailed {
        kind: &'static str,
        name: String,
        status: String,
    },

    /// The requested deployment does not exist yet.
    #[error("not provisioned: {0}")]
    NotProvisioned(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KbError>;

impl KbError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Attach the failing step's name to a provider error.
    pub fn step(step: &'static str) -> impl FnOnce(ProviderError) -> Self {
        move |source| Self::Step { step, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the knowledge-service creation retry loop should try again.
    ///
    /// Besides transient errors this covers the lag after the role and the
    /// index were created: the role is not yet assumable (access denied) or
    /// the index is not yet visible (a `ValidationException` on the storage
    /// configuration).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AdoptionMiss { .. } => true,
            Self::Step { source, .. } => match source {
                ProviderError::AccessDenied(_) => true,
                ProviderError::Service { code, .. } => code == "ValidationException",
                other => other.is_transient(),
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_taxonomy() {
        assert!(ProviderError::from_code("EntityAlreadyExists", "role").is_already_exists());
        assert!(ProviderError::from_code("ConflictException", "kb").is_already_exists());
        assert!(ProviderError::from_code("NoSuchEntity", "role").is_not_found());
        assert!(ProviderError::from_code("ThrottlingException", "slow").is_transient());
        assert!(matches!(
            ProviderError::from_code("BucketAlreadyExists", "b"),
            ProviderError::NameTaken(_)
        ));
        match ProviderError::from_code("DeleteConflict", "attached") {
            ProviderError::Service { code, .. } => assert_eq!(code, "DeleteConflict"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bucket_collision_is_not_retryable() {
        let err = KbError::BucketNameUnavailable {
            bucket: "demo-docs".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("demo-docs"));
    }

    #[test]
    fn index_lag_is_retryable_but_other_service_errors_are_not() {
        let lag = KbError::step("create knowledge base")(ProviderError::Service {
            code: "ValidationException".into(),
            message: "no such index [demo-kb-index]".into(),
        });
        assert!(lag.is_retryable());

        let quota = KbError::step("create knowledge base")(ProviderError::Service {
            code: "ServiceQuotaExceededException".into(),
            message: "too many knowledge bases".into(),
        });
        assert!(!quota.is_retryable());
    }

    #[test]
    fn step_errors_keep_their_source() {
        let err = KbError::step("create knowledge base")(ProviderError::Transient("503".into()));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "create knowledge base failed: transient provider error: 503"
        );
    }
}
