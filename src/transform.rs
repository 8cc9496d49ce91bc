//! Custom chunking transform function.
//!
//! With `CUSTOM` chunking the knowledge service hands each batch of chunks
//! to a function through the intermediate bucket. The function is either
//! referenced by ARN (and left alone) or packaged from a local handler and
//! created here together with its own role.

use std::io::{Cursor, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::adopt::{create_or_adopt, found};
use crate::clients::FunctionRequest;
use crate::context::ProvisionContext;
use crate::error::{KbError, Result};
use crate::identity;
use crate::models::StepOutcome;
use crate::policy_docs;
use crate::spec::{ResourceSpec, TransformSpec};

/// Provider-managed policy that lets a function write its own logs.
pub const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

const FUNCTION_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

/// ARN the transform function has (or will have) for `spec`.
///
/// Function ARNs are deterministic, so the execution role's invoke grant can
/// be written before the function exists.
pub fn function_arn(ctx: &ProvisionContext, spec: &ResourceSpec) -> Option<String> {
    match spec.transform()? {
        TransformSpec::Existing { function_arn } => Some(function_arn.clone()),
        TransformSpec::Package { .. } => Some(format!(
            "arn:aws:lambda:{}:{}:function:{}",
            ctx.region,
            ctx.account,
            ctx.names.transform_function()
        )),
    }
}

/// Ensure the transform function exists. Returns its ARN, or `None` when the
/// chunking strategy does not use one.
pub async fn ensure_transform(
    ctx: &ProvisionContext,
    spec: &ResourceSpec,
    intermediate_bucket: &str,
) -> Result<Option<String>> {
    let (source, handler, runtime, timeout_secs) = match spec.transform() {
        None => return Ok(None),
        Some(TransformSpec::Existing { function_arn }) => {
            let step = "use existing transform function";
            ctx.started(step);
            ctx.finished(step, StepOutcome::Skipped);
            return Ok(Some(function_arn.clone()));
        }
        Some(TransformSpec::Package {
            source,
            handler,
            runtime,
            timeout_secs,
            ..
        }) => (source, handler, runtime, *timeout_secs),
    };

    let role_name = ctx.names.transform_role();
    let trust = policy_docs::assume_role(FUNCTION_SERVICE_PRINCIPAL).to_string();
    let role = identity::ensure_role(ctx, &role_name, &trust, "Knowledge base transform function role").await?;

    ctx.clients
        .identity
        .attach_role_policy(&role.name, BASIC_EXECUTION_POLICY)
        .await
        .map_err(KbError::step("attach basic execution policy"))?;

    let storage_policy = policy_docs::transform_storage(intermediate_bucket, &ctx.account);
    identity::ensure_attached_policy(
        ctx,
        &role.name,
        &ctx.names.transform_storage_policy(),
        &storage_policy,
        "Transform function access to the intermediate bucket",
    )
    .await?;

    let name = ctx.names.transform_function();
    let step = format!("ensure transform function {}", name);
    ctx.started(&step);
    let zip = match package(source) {
        Ok(zip) => zip,
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            return Err(e);
        }
    };
    let request = FunctionRequest {
        name: name.clone(),
        role_arn: role.arn,
        runtime: runtime.clone(),
        handler: handler.clone(),
        timeout_secs,
        zip,
    };
    let functions = ctx.clients.functions.as_ref();
    let result = create_or_adopt(
        "create transform function",
        &name,
        || functions.create_function(&request),
        || async { found(functions.get_function(&name).await) },
    )
    .await;
    match result {
        Ok(function) => {
            ctx.finished(&step, function.outcome());
            Ok(Some(function.into_inner().arn))
        }
        Err(e) => {
            ctx.finished(&step, StepOutcome::Failed(e.to_string()));
            Err(e)
        }
    }
}

/// Zip a handler file, or every file under a handler directory, with paths
/// relative to the source.
pub fn package(source: &Path) -> Result<Vec<u8>> {
    let mut files = Vec::new();
    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| KbError::validation(format!("bad handler path {}", source.display())))?;
        files.push((name, source.to_path_buf()));
    } else if source.is_dir() {
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| KbError::io(source, std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, entry.path().to_path_buf()));
        }
        files.sort();
    } else {
        return Err(KbError::validation(format!(
            "transform.source does not exist: {}",
            source.display()
        )));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| KbError::io(source, std::io::Error::other(e));
    for (name, path) in files {
        let body = std::fs::read(&path).map_err(|e| KbError::io(&path, e))?;
        writer.start_file(name, options).map_err(zip_err)?;
        writer.write_all(&body).map_err(|e| KbError::io(&path, e))?;
    }
    let cursor = writer.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn packages_single_handler() {
        let tmp = TempDir::new().unwrap();
        let handler = tmp.path().join("lambda_function.py");
        fs::write(&handler, "def lambda_handler(event, context):\n    return event\n").unwrap();

        let bytes = package(&handler).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut file = archive.by_name("lambda_function.py").unwrap();
        let mut body = String::new();
        file.read_to_string(&mut body).unwrap();
        assert!(body.contains("lambda_handler"));
    }

    #[test]
    fn packages_directory_with_relative_paths() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("lib")).unwrap();
        fs::write(tmp.path().join("lambda_function.py"), "x = 1").unwrap();
        fs::write(tmp.path().join("lib/helpers.py"), "y = 2").unwrap();

        let bytes = package(tmp.path()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["lambda_function.py", "lib/helpers.py"]);
    }

    #[test]
    fn missing_source_is_a_validation_error() {
        let err = package(Path::new("/no/such/handler.py")).unwrap_err();
        assert!(matches!(err, KbError::Validation { .. }));
    }
}
