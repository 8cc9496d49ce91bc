//! Model catalog: per-role allow-lists, the embedding dimension table and
//! model ARN construction.
//!
//! | Role | Table |
//! |------|-------|
//! | Embedding | [`EMBEDDING_MODELS`] (dimensions in [`EMBEDDING_DIMENSIONS`]) |
//! | Generation | [`GENERATION_MODELS`] |
//! | Reranking | [`RERANKING_MODELS`] |
//! | Multimodal embedding | [`MULTIMODAL_EMBEDDING_MODELS`] |

use crate::error::{KbError, Result};

/// Embedding models a knowledge base may be created with.
pub const EMBEDDING_MODELS: &[&str] = &[
    "cohere.embed-v4:0",
    "cohere.embed-multilingual-v3",
    "cohere.embed-english-v3",
    "us.cohere.embed-v4:0",
    "global.cohere.embed-v4:0",
    "amazon.titan-embed-text-v1",
    "amazon.titan-embed-text-v2:0",
    "amazon.titan-embed-g1-text-02",
    "amazon.titan-embed-image-v1",
    "amazon.nova-2-multimodal-embeddings-v1:0",
];

/// Generation models usable for answering, multimodal parsing and graph
/// context enrichment.
pub const GENERATION_MODELS: &[&str] = &[
    "us.anthropic.claude-sonnet-4-20250514-v1:0",
    "us.anthropic.claude-sonnet-4-5-20250929-v1:0",
    "us.anthropic.claude-haiku-4-5-20251001-v1:0",
    "global.anthropic.claude-sonnet-4-20250514-v1:0",
    "global.anthropic.claude-sonnet-4-5-20250929-v1:0",
    "global.anthropic.claude-haiku-4-5-20251001-v1:0",
    "amazon.nova-micro-v1:0",
    "amazon.nova-lite-v1:0",
    "amazon.nova-pro-v1:0",
    "amazon.nova-premier-v1:0",
];

pub const RERANKING_MODELS: &[&str] = &["cohere.rerank-v3-5:0", "amazon.rerank-v1:0"];

/// Embedding models that accept image input.
pub const MULTIMODAL_EMBEDDING_MODELS: &[&str] = &[
    "cohere.embed-v4:0",
    "us.cohere.embed-v4:0",
    "global.cohere.embed-v4:0",
    "amazon.titan-embed-image-v1",
];

/// Vector width produced by each embedding model.
pub const EMBEDDING_DIMENSIONS: &[(&str, u32)] = &[
    ("cohere.embed-v4:0", 1024),
    ("cohere.embed-multilingual-v3", 1024),
    ("cohere.embed-english-v3", 1024),
    ("us.cohere.embed-v4:0", 1024),
    ("global.cohere.embed-v4:0", 1024),
    ("amazon.titan-embed-text-v1", 1536),
    ("amazon.titan-embed-text-v2:0", 1024),
    ("amazon.titan-embed-g1-text-02", 1024),
    ("amazon.titan-embed-image-v1", 1024),
    ("amazon.nova-2-multimodal-embeddings-v1:0", 3072),
];

/// Models whose multimodal output width differs from the table entry.
const MULTIMODAL_DIMENSION_OVERRIDES: &[(&str, u32)] = &[
    ("cohere.embed-v4:0", 1024),
    ("us.cohere.embed-v4:0", 1024),
    ("global.cohere.embed-v4:0", 1024),
];

/// Prefixes that mark a cross-region inference profile rather than a
/// foundation model.
const INFERENCE_PROFILE_PREFIXES: &[&str] =
    &["us.", "us-gov.", "eu.", "apac.", "au.", "ca.", "global."];

/// Which allow-list a model id is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Embedding,
    Generation,
    Reranking,
}

impl ModelRole {
    fn allowed(self) -> &'static [&'static str] {
        match self {
            ModelRole::Embedding => EMBEDDING_MODELS,
            ModelRole::Generation => GENERATION_MODELS,
            ModelRole::Reranking => RERANKING_MODELS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ModelRole::Embedding => "embedding",
            ModelRole::Generation => "generation",
            ModelRole::Reranking => "reranking",
        }
    }
}

/// Fail with a validation error unless `model` is allow-listed for `role`.
pub fn ensure_allowed(role: ModelRole, model: &str) -> Result<()> {
    if role.allowed().contains(&model) {
        return Ok(());
    }
    Err(KbError::validation(format!(
        "unknown {} model '{}'; expected one of: {}",
        role.label(),
        model,
        role.allowed().join(", ")
    )))
}

pub fn is_multimodal_compatible(model: &str) -> bool {
    MULTIMODAL_EMBEDDING_MODELS.contains(&model)
}

/// Vector width for an embedding model.
///
/// Unknown models are a configuration error; there is no fallback width.
pub fn dimension(model: &str, multimodal: bool) -> Result<u32> {
    let base = EMBEDDING_DIMENSIONS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, dims)| *dims)
        .ok_or_else(|| {
            KbError::config(format!("no dimension defined for embedding model '{}'", model))
        })?;

    if multimodal {
        if let Some((_, dims)) = MULTIMODAL_DIMENSION_OVERRIDES
            .iter()
            .find(|(id, _)| *id == model)
        {
            return Ok(*dims);
        }
    }
    Ok(base)
}

/// ARN for a model id, distinguishing inference profiles (account scoped)
/// from foundation models (region scoped, no account).
pub fn model_arn(model: &str, region: &str, account: &str) -> String {
    if INFERENCE_PROFILE_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
    {
        format!("arn:aws:bedrock:{region}:{account}:inference-profile/{model}")
    } else {
        format!("arn:aws:bedrock:{region}::foundation-model/{model}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_embedding_model_has_a_dimension() {
        for model in EMBEDDING_MODELS {
            let dims = dimension(model, false).unwrap();
            assert!(
                EMBEDDING_DIMENSIONS.contains(&(*model, dims)),
                "{model} resolved to {dims}, not its table entry"
            );
        }
    }

    #[test]
    fn unknown_model_is_config_error() {
        let err = dimension("acme.embed-9000", false).unwrap_err();
        assert!(matches!(err, KbError::Config { .. }));
    }

    #[test]
    fn multimodal_override_applies_to_cohere_v4() {
        assert_eq!(dimension("global.cohere.embed-v4:0", true).unwrap(), 1024);
        assert_eq!(dimension("amazon.titan-embed-text-v1", true).unwrap(), 1536);
    }

    #[test]
    fn allow_lists_are_per_role() {
        assert!(ensure_allowed(ModelRole::Generation, "amazon.nova-pro-v1:0").is_ok());
        assert!(ensure_allowed(ModelRole::Embedding, "amazon.nova-pro-v1:0").is_err());
        assert!(ensure_allowed(ModelRole::Reranking, "amazon.rerank-v1:0").is_ok());
    }

    #[test]
    fn inference_profiles_get_account_scoped_arns() {
        assert_eq!(
            model_arn("global.anthropic.claude-haiku-4-5-20251001-v1:0", "us-west-2", "111122223333"),
            "arn:aws:bedrock:us-west-2:111122223333:inference-profile/global.anthropic.claude-haiku-4-5-20251001-v1:0"
        );
        assert_eq!(
            model_arn("amazon.titan-embed-text-v2:0", "us-west-2", "111122223333"),
            "arn:aws:bedrock:us-west-2::foundation-model/amazon.titan-embed-text-v2:0"
        );
    }
}
