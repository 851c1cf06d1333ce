//! Artifact location and storage naming.

use crate::error::DeployError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory the packager writes build output to.
pub const BUILD_OUTPUT_DIR: &str = ".serverless";

/// Files the OS drops into directories that never belong in storage.
pub const HOUSEKEEPING_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Where to look for the packaged artifact.
///
/// Precedence: explicit path, then the artifact a prior build recorded,
/// then `.serverless/{service}.zip`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactLocator {
    pub explicit: Option<PathBuf>,
    pub packaged: Option<PathBuf>,
    pub service: String,
}

impl ArtifactLocator {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn with_packaged(mut self, path: impl Into<PathBuf>) -> Self {
        self.packaged = Some(path.into());
        self
    }

    pub fn resolve(&self) -> PathBuf {
        self.explicit
            .clone()
            .or_else(|| self.packaged.clone())
            .unwrap_or_else(|| conventional_artifact_path(&self.service))
    }
}

pub fn conventional_artifact_path(service: &str) -> PathBuf {
    Path::new(BUILD_OUTPUT_DIR).join(format!("{}.zip", service))
}

/// `{app}-deployment-{unix_ts}`
pub fn deployment_name(function_app: &str, timestamp: u64) -> String {
    format!("{}-deployment-{}", function_app, timestamp)
}

/// Object name the artifact of a deployment is stored under.
pub fn artifact_blob_name(deployment_name: &str) -> String {
    format!("{}.zip", deployment_name)
}

/// Fail unless `path` is an existing regular file.
pub async fn ensure_artifact_exists(path: &Path) -> Result<(), DeployError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(DeployError::ArtifactMissing(path.to_path_buf())),
    }
}

/// One file of a local tree and the object key it is archived under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub local: PathBuf,
    pub key: String,
}

/// Files under `root` keyed by their root-relative, `/`-separated path.
///
/// Housekeeping files are skipped. Entries come back sorted by key.
pub fn archive_entries(root: &Path) -> Result<Vec<ArchiveEntry>, DeployError> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            DeployError::Storage(format!("failed to walk {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if HOUSEKEEPING_FILES.iter().any(|h| file_name == *h) {
            continue;
        }

        let relative = entry.path().strip_prefix(root).map_err(|e| {
            DeployError::Storage(format!("{} escapes {}: {}", entry.path().display(), root.display(), e))
        })?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(ArchiveEntry {
            local: entry.path().to_path_buf(),
            key,
        });
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}
