//! Object storage for deployment artifacts.
//!
//! The client archives packages and supporting files through the
//! [`ObjectStorage`] trait so callers can point it at any store that can
//! hand out signed read URLs. A blob-container implementation over plain
//! HTTP is provided via the `default-client` feature.

use crate::error::DeployError;
use async_trait::async_trait;
use std::path::Path;

/// Named-object store with signed read URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file. Overwrites an existing object of the same name.
    async fn upload_file(
        &self,
        local: &Path,
        container: &str,
        blob_name: &str,
    ) -> Result<(), DeployError>;

    /// URL the host can read the object from without other credentials.
    async fn signed_url(&self, container: &str, blob_name: &str) -> Result<String, DeployError>;
}

#[cfg(feature = "default-client")]
pub use blob::BlobContainerStorage;

#[cfg(feature = "default-client")]
mod blob {
    use super::*;
    use tokio_util::io::ReaderStream;
    use tracing::debug;

    /// Blob service account addressed with a shared access signature.
    ///
    /// Objects live at `{account_url}/{container}/{blob}`; the SAS query
    /// string authorizes both the upload and the URL handed to the host.
    #[derive(Clone)]
    pub struct BlobContainerStorage {
        account_url: String,
        sas_token: String,
        http: reqwest::Client,
    }

    impl BlobContainerStorage {
        pub fn new(account_url: impl Into<String>, sas_token: impl Into<String>) -> Self {
            Self::with_client(account_url, sas_token, reqwest::Client::new())
        }

        pub fn with_client(
            account_url: impl Into<String>,
            sas_token: impl Into<String>,
            http: reqwest::Client,
        ) -> Self {
            Self {
                account_url: account_url.into().trim_end_matches('/').to_string(),
                sas_token: sas_token.into().trim_start_matches('?').to_string(),
                http,
            }
        }

        /// Reads `AZFUNC_STORAGE_URL` and `AZFUNC_STORAGE_SAS`.
        pub fn from_env() -> Result<Self, DeployError> {
            dotenvy::dotenv().ok();
            let url = std::env::var("AZFUNC_STORAGE_URL")
                .map_err(|_| DeployError::Config("AZFUNC_STORAGE_URL is not set".into()))?;
            let sas = std::env::var("AZFUNC_STORAGE_SAS")
                .map_err(|_| DeployError::Config("AZFUNC_STORAGE_SAS is not set".into()))?;
            Ok(Self::new(url, sas))
        }

        fn object_url(&self, container: &str, blob_name: &str) -> String {
            format!(
                "{}/{}/{}?{}",
                self.account_url,
                container.trim_matches('/'),
                blob_name.trim_start_matches('/'),
                self.sas_token
            )
        }
    }

    impl std::fmt::Debug for BlobContainerStorage {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BlobContainerStorage")
                .field("account_url", &self.account_url)
                .finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl ObjectStorage for BlobContainerStorage {
        async fn upload_file(
            &self,
            local: &Path,
            container: &str,
            blob_name: &str,
        ) -> Result<(), DeployError> {
            let file = tokio::fs::File::open(local)
                .await
                .map_err(|e| DeployError::Storage(format!("failed to open {}: {}", local.display(), e)))?;
            let len = file
                .metadata()
                .await
                .map_err(|e| DeployError::Storage(format!("failed to stat {}: {}", local.display(), e)))?
                .len();

            debug!(container, blob = blob_name, bytes = len, "uploading blob");
            let response = self
                .http
                .put(self.object_url(container, blob_name))
                .header("x-ms-blob-type", "BlockBlob")
                .header(reqwest::header::CONTENT_LENGTH, len)
                .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
                .send()
                .await
                .map_err(|e| DeployError::Storage(format!("failed to upload {}: {}", blob_name, e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unable to read response".to_string());
                return Err(DeployError::Storage(format!(
                    "upload of {} rejected ({}): {}",
                    blob_name, status, body
                )));
            }
            Ok(())
        }

        async fn signed_url(&self, container: &str, blob_name: &str) -> Result<String, DeployError> {
            if self.sas_token.is_empty() {
                return Err(DeployError::Config("storage SAS token is empty".into()));
            }
            Ok(self.object_url(container, blob_name))
        }
    }

}
