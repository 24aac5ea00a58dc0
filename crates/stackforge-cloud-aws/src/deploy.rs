//! Artifact deployment onto an already provisioned topology

use crate::error::provider_error;
use crate::functions::{FUNCTIONS, read_artifact};
use aws_sdk_s3::primitives::ByteStream;
use stackforge_cloud::{CloudError, ProjectSettings, Result, StepName, TopologyState};
use std::path::{Path, PathBuf};

const RESOURCE: &str = "deploy";

/// Content type for a frontend asset, by extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Every regular file under `root`, paired with its `/`-separated key
pub async fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            let key = path
                .strip_prefix(root)
                .map_err(|e| CloudError::provider(RESOURCE, e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((path, key));
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// What a deployment touched
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub uploaded: Vec<String>,
    pub functions: Vec<String>,
}

/// Uploads the frontend bundle and refreshes function code
pub struct ArtifactDeployer {
    s3: aws_sdk_s3::Client,
    lambda: aws_sdk_lambda::Client,
    settings: ProjectSettings,
}

impl ArtifactDeployer {
    pub fn new(
        s3: aws_sdk_s3::Client,
        lambda: aws_sdk_lambda::Client,
        settings: ProjectSettings,
    ) -> Self {
        Self {
            s3,
            lambda,
            settings,
        }
    }

    pub async fn deploy(&self, state: &TopologyState) -> Result<DeployReport> {
        let bucket = state
            .get(StepName::FrontendBucket)
            .and_then(|d| d.get("bucket"))
            .ok_or_else(|| CloudError::MissingInput {
                step: RESOURCE.to_string(),
                key: "frontend-bucket.bucket".to_string(),
            })?;
        if !state.contains(StepName::ComputeFunctions) {
            return Err(CloudError::MissingInput {
                step: RESOURCE.to_string(),
                key: StepName::ComputeFunctions.to_string(),
            });
        }

        let mut report = DeployReport::default();

        let frontend = self.settings.artifacts_dir.join("frontend");
        if frontend.is_dir() {
            for (path, key) in collect_files(&frontend).await? {
                let body = ByteStream::from_path(&path)
                    .await
                    .map_err(|e| provider_error(RESOURCE, e))?;

                self.s3
                    .put_object()
                    .bucket(bucket)
                    .key(&key)
                    .content_type(content_type(&path))
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| provider_error(RESOURCE, e))?;

                tracing::info!("Uploaded {} to {}", key, bucket);
                report.uploaded.push(key);
            }
        } else {
            tracing::warn!("No frontend bundle at {}", frontend.display());
        }

        for function in &FUNCTIONS {
            let name = function.function_name(&self.settings);
            let code = read_artifact(function, &self.settings).await?;

            self.lambda
                .update_function_code()
                .function_name(&name)
                .zip_file(code)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;

            tracing::info!("Updated code of {}", name);
            report.functions.push(name);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(Path::new("index.html")), "text/html");
        assert_eq!(content_type(Path::new("assets/app.JS")), "application/javascript");
        assert_eq!(content_type(Path::new("style.css")), "text/css");
        assert_eq!(content_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("favicon.ico")), "image/x-icon");
        assert_eq!(content_type(Path::new("font.woff2")), "application/octet-stream");
        assert_eq!(content_type(Path::new("LICENSE")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_collect_files_uses_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/img")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "").unwrap();
        std::fs::write(dir.path().join("assets/img/logo.png"), [0u8; 4]).unwrap();

        let files = collect_files(dir.path()).await.unwrap();
        let keys: Vec<&str> = files.iter().map(|(_, key)| key.as_str()).collect();

        assert_eq!(keys, vec!["assets/app.js", "assets/img/logo.png", "index.html"]);
    }
}
