//! Create-or-adopt: the one place conflicts are turned into reuse.
//!
//! Every resource kind with a deterministic name goes through
//! [`create_or_adopt`]. Creation is attempted first; an "already exists"
//! answer triggers a lookup by name and the existing resource is returned
//! instead.
//!
//! # Concurrent runs
//!
//! Two orchestrators with the same configuration can both attempt creation
//! at once. Convergence relies on the loser's conflict-then-lookup path,
//! which is best effort: if the winner's resource is not yet visible to the
//! lookup, the loser fails with [`KbError::AdoptionMiss`]. Nothing here
//! serializes the two runs. A distributed lock around this function is the
//! place to add one.

use std::future::Future;

use crate::error::{KbError, ProviderResult, Result};
use crate::models::StepOutcome;

/// Whether a resource was made by this call or found in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adoption<T> {
    Created(T),
    Adopted(T),
}

impl<T> Adoption<T> {
    pub fn into_inner(self) -> T {
        match self {
            Adoption::Created(v) | Adoption::Adopted(v) => v,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Adoption::Created(v) | Adoption::Adopted(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Adoption::Created(_))
    }

    pub fn outcome(&self) -> StepOutcome {
        match self {
            Adoption::Created(_) => StepOutcome::Created,
            Adoption::Adopted(_) => StepOutcome::Adopted,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Adoption<U> {
        match self {
            Adoption::Created(v) => Adoption::Created(f(v)),
            Adoption::Adopted(v) => Adoption::Adopted(f(v)),
        }
    }
}

/// Create `name`, or adopt the existing resource when creation conflicts.
///
/// `find` returns `Ok(None)` when no resource with the name exists; that
/// combined with a conflict is reported as [`KbError::AdoptionMiss`], which
/// the knowledge-service retry loop treats as retryable. Other creation
/// errors are wrapped as [`KbError::Step`] under `kind`.
pub async fn create_or_adopt<T, C, CF, F, FF>(
    kind: &'static str,
    name: &str,
    create: C,
    find: F,
) -> Result<Adoption<T>>
where
    C: FnOnce() -> CF,
    CF: Future<Output = ProviderResult<T>>,
    F: FnOnce() -> FF,
    FF: Future<Output = ProviderResult<Option<T>>>,
{
    match create().await {
        Ok(created) => {
            tracing::debug!(kind, name, "created");
            Ok(Adoption::Created(created))
        }
        Err(e) if e.is_already_exists() => {
            tracing::debug!(kind, name, "already exists, adopting");
            match find().await.map_err(KbError::step(kind))? {
                Some(existing) => Ok(Adoption::Adopted(existing)),
                None => Err(KbError::AdoptionMiss {
                    kind,
                    name: name.to_string(),
                }),
            }
        }
        Err(e) => Err(KbError::Step { step: kind, source: e }),
    }
}

/// Map a by-name lookup's `NotFound` to `None`.
pub fn found<T>(result: ProviderResult<T>) -> ProviderResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[tokio::test]
    async fn created_when_no_conflict() {
        let out = create_or_adopt(
            "role",
            "r",
            || async { Ok::<_, ProviderError>(1) },
            || async { Ok::<_, ProviderError>(Some(2)) },
        )
        .await
        .unwrap();
        assert_eq!(out, Adoption::Created(1));
    }

    #[tokio::test]
    async fn adopted_on_conflict() {
        let out = create_or_adopt(
            "role",
            "r",
            || async { Err::<i32, _>(ProviderError::AlreadyExists("r".into())) },
            || async { Ok::<_, ProviderError>(Some(2)) },
        )
        .await
        .unwrap();
        assert_eq!(out, Adoption::Adopted(2));
        assert_eq!(out.outcome(), StepOutcome::Adopted);
    }

    #[tokio::test]
    async fn conflict_without_match_is_adoption_miss() {
        let err = create_or_adopt(
            "knowledge base",
            "kb",
            || async { Err::<i32, _>(ProviderError::AlreadyExists("kb".into())) },
            || async { Ok::<Option<i32>, ProviderError>(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KbError::AdoptionMiss { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn other_errors_propagate_without_lookup() {
        let err = create_or_adopt(
            "role",
            "r",
            || async { Err::<i32, _>(ProviderError::AccessDenied("no".into())) },
            || async { Err::<Option<i32>, _>(ProviderError::Decode("lookup ran".into())) },
        )
        .await
        .unwrap_err();
        match err {
            KbError::Step { step, source } => {
                assert_eq!(step, "role");
                assert!(matches!(source, ProviderError::AccessDenied(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn found_maps_not_found() {
        assert_eq!(found::<i32>(Err(ProviderError::NotFound("x".into()))).unwrap(), None);
        assert_eq!(found(Ok(3)).unwrap(), Some(3));
    }
}
