//! Artifact upload strategies.
//!
//! - **External package**: store the artifact, point the
//!   `WEBSITE_RUN_FROM_PACKAGE` setting at a signed URL for it, then sync
//!   triggers. Storage upload, settings write and sync run strictly in
//!   that order.
//! - **Direct push**: stream the artifact to the SCM deployment endpoint
//!   while archiving it to storage concurrently.

use crate::artifact::{archive_entries, ensure_artifact_exists};
use crate::backend::FunctionAppBackend;
use crate::error::DeployError;
use crate::registry::FunctionRegistry;
use crate::retry::RetryPolicy;
use crate::types::Site;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Setting the host reads to run straight from a package URL.
pub const RUN_FROM_PACKAGE_SETTING: &str = "WEBSITE_RUN_FROM_PACKAGE";

/// Default container artifacts are archived in.
pub const DEFAULT_CONTAINER: &str = "deployment-artifacts";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    #[default]
    DirectPush,
    ExternalPackage,
}

impl UploadStrategy {
    pub fn from_external_flag(external: bool) -> Self {
        if external {
            Self::ExternalPackage
        } else {
            Self::DirectPush
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectPush => "direct_push",
            Self::ExternalPackage => "external_package",
        }
    }
}

pub struct ArtifactUploader<'a, B: FunctionAppBackend> {
    backend: &'a B,
    registry: FunctionRegistry<'a, B>,
    container: String,
}

impl<'a, B: FunctionAppBackend> ArtifactUploader<'a, B> {
    pub fn new(backend: &'a B, policy: RetryPolicy, container: impl Into<String>) -> Self {
        Self {
            backend,
            registry: FunctionRegistry::new(backend, policy),
            container: container.into(),
        }
    }

    /// Upload `artifact` to `site`, archiving it as `blob_name`.
    pub async fn upload(
        &self,
        strategy: UploadStrategy,
        site: &Site,
        artifact: &Path,
        blob_name: &str,
    ) -> Result<(), DeployError> {
        info!(
            site = %site.name,
            artifact = %artifact.display(),
            strategy = strategy.name(),
            "uploading artifact"
        );
        match strategy {
            UploadStrategy::ExternalPackage => self.upload_external(site, artifact, blob_name).await,
            UploadStrategy::DirectPush => self.upload_direct(site, artifact, blob_name).await,
        }
    }

    async fn upload_external(
        &self,
        site: &Site,
        artifact: &Path,
        blob_name: &str,
    ) -> Result<(), DeployError> {
        ensure_artifact_exists(artifact).await?;
        self.archive(artifact, blob_name).await?;

        let url = self.backend.blob_sas_url(&self.container, blob_name).await?;
        let settings = self
            .registry
            .update_app_setting(site, RUN_FROM_PACKAGE_SETTING, &url)
            .await?;
        self.registry.sync_triggers(site, &settings).await?;
        Ok(())
    }

    async fn upload_direct(
        &self,
        site: &Site,
        artifact: &Path,
        blob_name: &str,
    ) -> Result<(), DeployError> {
        ensure_artifact_exists(artifact).await?;
        let scm_host = site.scm_host_name()?;

        let (pushed, archived) =
            futures::join!(self.push(scm_host, artifact), self.archive(artifact, blob_name));
        pushed?;
        archived
    }

    async fn push(&self, scm_host: &str, artifact: &Path) -> Result<(), DeployError> {
        info!(scm_host, "pushing package");
        self.backend
            .push_package(scm_host, artifact)
            .await?
            .error_for_status(&format!("push package to {}", scm_host))?;
        info!(scm_host, "package pushed");
        Ok(())
    }

    async fn archive(&self, artifact: &Path, blob_name: &str) -> Result<(), DeployError> {
        info!(container = %self.container, blob = blob_name, "archiving artifact");
        self.backend
            .upload_blob(artifact, &self.container, blob_name)
            .await
    }

    /// Archive every file under `root`, keyed by its root-relative path.
    ///
    /// All uploads are attempted; the first failure is reported after
    /// the rest finish. Returns the number of files archived.
    pub async fn archive_tree(&self, root: &Path) -> Result<usize, DeployError> {
        let entries = archive_entries(root)?;
        info!(root = %root.display(), files = entries.len(), "archiving tree");

        let results = join_all(
            entries
                .iter()
                .map(|e| self.backend.upload_blob(&e.local, &self.container, &e.key)),
        )
        .await;

        let mut first = None;
        for (entry, result) in entries.iter().zip(results) {
            if let Err(e) = result {
                warn!(key = %entry.key, error = %e, "failed to archive file");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(entries.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_flag() {
        assert_eq!(UploadStrategy::from_external_flag(true), UploadStrategy::ExternalPackage);
        assert_eq!(UploadStrategy::from_external_flag(false), UploadStrategy::DirectPush);
        assert_eq!(UploadStrategy::default(), UploadStrategy::DirectPush);
    }

    #[test]
    fn test_strategy_serde() {
        let s: UploadStrategy = serde_yaml::from_str("external_package").unwrap();
        assert_eq!(s, UploadStrategy::ExternalPackage);
        assert_eq!(s.name(), "external_package");
    }
}
