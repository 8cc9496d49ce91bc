//! Storage provisioner: buckets, document upload and bucket removal.
//!
//! Bucket names are global. A name we already own is adopted; a name owned
//! by another account is fatal and reported as
//! [`KbError::BucketNameUnavailable`] so the operator knows to pick another.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::clients::{BucketProbe, ObjectStoreApi};
use crate::context::ProvisionContext;
use crate::error::{KbError, ProviderError, ProviderResult, Result};
use crate::models::StepOutcome;
use crate::naming::Names;
use crate::spec::ResourceSpec;

/// Buckets a deployment uses: source buckets, then the intermediate bucket
/// when multimodal parsing or a custom transform needs one.
pub fn required_buckets(spec: &ResourceSpec, names: &Names) -> Vec<String> {
    let mut buckets = spec.source_buckets();
    if spec.needs_intermediate_bucket() {
        let intermediate = names.intermediate_bucket();
        if !buckets.contains(&intermediate) {
            buckets.push(intermediate);
        }
    }
    buckets
}

/// Create or adopt every bucket in `buckets`, in order.
///
/// # Errors
///
/// [`KbError::BucketNameUnavailable`] when a name is held by another
/// account; [`KbError::Step`] for any other provider failure.
pub async fn ensure_buckets(ctx: &ProvisionContext, buckets: &[String]) -> Result<Vec<String>> {
    let mut ready = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let step = format!("ensure bucket {}", bucket);
        ctx.started(&step);
        match ensure_bucket(ctx, bucket).await {
            Ok(outcome) => {
                ctx.finished(&step, outcome);
                ready.push(bucket.clone());
            }
            Err(e) => {
                ctx.finished(&step, StepOutcome::Failed(e.to_string()));
                return Err(e);
            }
        }
    }
    Ok(ready)
}

async fn ensure_bucket(ctx: &ProvisionContext, bucket: &str) -> Result<StepOutcome> {
    let storage = ctx.clients.storage.as_ref();
    let probe = storage
        .head_bucket(bucket)
        .await
        .map_err(KbError::step("probe bucket"))?;
    if probe == BucketProbe::Owned {
        return Ok(StepOutcome::Adopted);
    }

    // A forbidden probe usually means another account owns the name; the
    // create call is what tells the two cases apart.
    match storage.create_bucket(bucket, &ctx.region).await {
        Ok(()) => Ok(StepOutcome::Created),
        Err(e) if e.is_already_exists() => Ok(StepOutcome::Adopted),
        Err(ProviderError::NameTaken(_)) => Err(KbError::BucketNameUnavailable {
            bucket: bucket.to_string(),
        }),
        Err(e) => Err(KbError::step("create bucket")(e)),
    }
}

/// Files put into a bucket by [`upload_directory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct UploadSummary {
    pub bucket: String,
    pub keys: Vec<String>,
}

/// Put every file under `root` matching `include` (and not `exclude`) into
/// `bucket`, keyed by its path relative to `root`.
pub async fn upload_directory(
    storage: &dyn ObjectStoreApi,
    bucket: &str,
    root: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<UploadSummary> {
    if !root.is_dir() {
        return Err(KbError::validation(format!(
            "upload root is not a directory: {}",
            root.display()
        )));
    }

    let include_set = if include.is_empty() {
        build_globset(&["**/*".to_string()])?
    } else {
        build_globset(include)?
    };
    let mut excludes = vec!["**/.git/**".to_string(), "**/.DS_Store".to_string()];
    excludes.extend(exclude.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            KbError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if exclude_set.is_match(&key) || !include_set.is_match(&key) {
            continue;
        }
        files.push((key, entry.path().to_path_buf()));
    }

    // Sort for deterministic ordering
    files.sort();

    let mut summary = UploadSummary {
        bucket: bucket.to_string(),
        keys: Vec::with_capacity(files.len()),
    };
    for (key, path) in files {
        let body = std::fs::read(&path).map_err(|e| KbError::io(&path, e))?;
        storage
            .put_object(bucket, &key, body, content_type(&key))
            .await
            .map_err(KbError::step("upload document"))?;
        tracing::debug!(bucket, key = %key, "uploaded");
        summary.keys.push(key);
    }
    tracing::info!(bucket, files = summary.keys.len(), "upload finished");
    Ok(summary)
}

/// Remove every object version and delete marker from `bucket`.
/// Returns how many were deleted.
pub async fn empty_bucket(storage: &dyn ObjectStoreApi, bucket: &str) -> ProviderResult<usize> {
    let versions = storage.list_object_versions(bucket).await?;
    for v in &versions {
        storage
            .delete_object(bucket, &v.key, v.version_id.as_deref())
            .await?;
    }
    Ok(versions.len())
}

/// Empty `bucket`, then delete it.
pub async fn empty_and_delete(storage: &dyn ObjectStoreApi, bucket: &str) -> ProviderResult<()> {
    let removed = empty_bucket(storage, bucket).await?;
    tracing::debug!(bucket, removed, "bucket emptied");
    storage.delete_bucket(bucket).await
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| KbError::validation(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| KbError::validation(format!("invalid glob set: {}", e)))
}

fn content_type(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
