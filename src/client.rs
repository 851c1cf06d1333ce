//! Default function app client over the management REST API.
//!
//! Implements [`FunctionAppBackend`] with `reqwest`: management calls go to
//! `management.azure.com` with a bearer token from a [`TokenProvider`],
//! package pushes and admin tokens go to the site's SCM host, and
//! artifacts are archived through an [`ObjectStorage`].
//!
//! # Quick Start
//!
//! ```ignore
//! use azfunc_deploy_rs::{DeployConfig, DeploymentWorkflow, FunctionAppClient};
//!
//! let config = DeployConfig::load("deploy.yaml").await?;
//! let client = FunctionAppClient::from_env()?;
//!
//! let workflow = DeploymentWorkflow::new(&client, config.workflow_config());
//! let mut state = config.initial_state("my-app")?;
//! workflow.run_to_completion(&mut state).await?;
//! ```
//!
//! # Custom Storage
//!
//! ```ignore
//! struct MyStorage { /* ... */ }
//!
//! #[async_trait]
//! impl ObjectStorage for MyStorage {
//!     // Implement trait methods
//! }
//!
//! let client = FunctionAppClient::with_storage(config, StaticToken::new(token), MyStorage::new());
//! ```

use crate::auth::{StaticToken, TokenProvider};
use crate::backend::FunctionAppBackend;
use crate::error::DeployError;
use crate::retry::{RetryPoller, RetryPolicy};
use crate::storage::{BlobContainerStorage, ObjectStorage};
use crate::types::*;

use reqwest::Method;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_WEB_API_VERSION: &str = "2016-08-01";
pub const DEFAULT_RESOURCE_API_VERSION: &str = "2021-04-01";

/// Settings of the default client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub subscription_id: String,
    pub management_endpoint: String,
    /// `Microsoft.Web` API version.
    pub web_api_version: String,
    /// `Microsoft.Resources` API version, used for template deployments.
    pub resource_api_version: String,
    /// Directory holding named templates as `{name}.json`.
    pub templates_dir: PathBuf,
    /// Scheme for SCM and runtime host calls.
    pub host_scheme: String,
    /// Blob service URL artifacts are archived under.
    pub storage_url: String,
    /// Shared access signature for the blob service.
    pub storage_sas: String,
    /// Budget for waiting on a template deployment.
    pub deployment_poll: RetryPolicy,
}

impl ClientConfig {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            web_api_version: DEFAULT_WEB_API_VERSION.to_string(),
            resource_api_version: DEFAULT_RESOURCE_API_VERSION.to_string(),
            templates_dir: PathBuf::from("templates"),
            host_scheme: "https".to_string(),
            storage_url: String::new(),
            storage_sas: String::new(),
            deployment_poll: RetryPolicy::new(60, 10),
        }
    }

    /// Reads `AZURE_SUBSCRIPTION_ID` (required), `AZFUNC_MANAGEMENT_ENDPOINT`,
    /// `AZFUNC_TEMPLATES_DIR`, `AZFUNC_STORAGE_URL` and `AZFUNC_STORAGE_SAS`.
    pub fn from_env() -> Result<Self, DeployError> {
        dotenvy::dotenv().ok();
        let subscription_id = std::env::var("AZURE_SUBSCRIPTION_ID")
            .map_err(|_| DeployError::Config("AZURE_SUBSCRIPTION_ID is not set".into()))?;

        let mut config = Self::new(subscription_id);
        if let Ok(endpoint) = std::env::var("AZFUNC_MANAGEMENT_ENDPOINT") {
            config.management_endpoint = endpoint;
        }
        if let Ok(dir) = std::env::var("AZFUNC_TEMPLATES_DIR") {
            config.templates_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("AZFUNC_STORAGE_URL") {
            config.storage_url = url;
        }
        if let Ok(sas) = std::env::var("AZFUNC_STORAGE_SAS") {
            config.storage_sas = sas;
        }
        Ok(config)
    }

    /// Path to a template file.
    pub fn template_path(&self, source: &TemplateSource) -> PathBuf {
        match source {
            TemplateSource::File(path) => path.clone(),
            TemplateSource::Named(name) => self.templates_dir.join(format!("{}.json", name)),
        }
    }
}

/// Function app client with integrated management, SCM and storage access.
///
/// # Type Parameters
///
/// - `S`: Storage implementation (defaults to `BlobContainerStorage`)
pub struct FunctionAppClient<S: ObjectStorage = BlobContainerStorage> {
    config: ClientConfig,
    http: reqwest::Client,
    token: Box<dyn TokenProvider>,
    storage: S,
}

impl FunctionAppClient<BlobContainerStorage> {
    /// Client archiving to the blob service named in `config`.
    pub fn new(config: ClientConfig, token: impl TokenProvider + 'static) -> Self {
        let http = reqwest::Client::new();
        let storage = BlobContainerStorage::with_client(
            config.storage_url.clone(),
            config.storage_sas.clone(),
            http.clone(),
        );
        Self {
            config,
            http,
            token: Box::new(token),
            storage,
        }
    }

    /// [`ClientConfig::from_env`] plus a static token from `AZURE_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, DeployError> {
        let config = ClientConfig::from_env()?;
        if config.storage_url.is_empty() {
            return Err(DeployError::Config("AZFUNC_STORAGE_URL is not set".into()));
        }
        Ok(Self::new(config, StaticToken::from_env()?))
    }
}

impl<S: ObjectStorage> FunctionAppClient<S> {
    /// Create a client with a custom storage implementation.
    pub fn with_storage(config: ClientConfig, token: impl TokenProvider + 'static, storage: S) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token: Box::new(token),
            storage,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn site_id(&self, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
            self.config.subscription_id, resource_group, name
        )
    }

    fn deployment_id(&self, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}",
            self.config.subscription_id, resource_group, name
        )
    }

    fn management_url(&self, resource_id: &str, api_version: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.management_endpoint.trim_end_matches('/'),
            resource_id,
            api_version
        )
    }

    fn host_url(&self, host: &str, path: &str) -> String {
        format!("{}://{}/{}", self.config.host_scheme, host, path)
    }

    /// Call a `Microsoft.Web` resource.
    async fn web(
        &self,
        method: Method,
        resource_id: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, DeployError> {
        let url = self.management_url(resource_id, &self.config.web_api_version);
        self.management(method, url, body).await
    }

    async fn management(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<ApiResponse, DeployError> {
        let token = self.token.bearer_token().await?;
        debug!(%method, %url, "management request");

        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        send(request, &url).await
    }

    async fn load_template(&self, source: &TemplateSource) -> Result<(Value, Value), DeployError> {
        let path = self.config.template_path(source);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DeployError::Provisioning(format!("failed to read template {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            DeployError::Provisioning(format!("invalid template {}: {}", path.display(), e))
        })?;
        Ok(split_template(value))
    }
}

/// A template file is either a bare template or `{template, parameters}`.
fn split_template(value: Value) -> (Value, Value) {
    match value {
        Value::Object(mut map) if map.contains_key("template") && !map.contains_key("$schema") => {
            let template = map.remove("template").unwrap_or(Value::Null);
            let parameters = map.remove("parameters").unwrap_or_else(|| json!({}));
            (template, parameters)
        }
        other => (other, json!({})),
    }
}

/// Send a request and capture status and body. Only a failure to get any
/// response at all is an error.
async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<ApiResponse, DeployError> {
    let response = request
        .send()
        .await
        .map_err(|e| DeployError::Transport(format!("request to {} failed: {}", url, e)))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| DeployError::Transport(format!("failed to read response from {}: {}", url, e)))?;
    debug!(status, url, "response");
    Ok(ApiResponse::new(status, body))
}

fn provisioning_state(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .pointer("/properties/provisioningState")?
        .as_str()
        .map(str::to_string)
}

impl<S: ObjectStorage> FunctionAppBackend for FunctionAppClient<S> {
    // ═══════════════════════════════════════════════════════════════
    // PROVISIONING
    // ═══════════════════════════════════════════════════════════════

    async fn create_arm_deployment(
        &self,
        name: &str,
        source: &TemplateSource,
    ) -> Result<ArmDeployment, DeployError> {
        let (template, parameters) = self.load_template(source).await?;
        Ok(ArmDeployment {
            name: name.to_string(),
            template,
            parameters,
        })
    }

    async fn apply_arm_deployment(
        &self,
        resource_group: &str,
        deployment: &ArmDeployment,
    ) -> Result<(), DeployError> {
        let url = self.management_url(
            &self.deployment_id(resource_group, &deployment.name),
            &self.config.resource_api_version,
        );
        let body = json!({
            "properties": {
                "mode": "Incremental",
                "template": deployment.template,
                "parameters": deployment.parameters,
            }
        });

        info!(resource_group, deployment = %deployment.name, "submitting template deployment");
        let resp = self.management(Method::PUT, url.clone(), Some(body)).await?;
        if !resp.is_success() {
            return Err(DeployError::Provisioning(format!(
                "deployment {} rejected ({}): {}",
                deployment.name, resp.status, resp.body
            )));
        }

        let this = self;
        let url = url.as_str();
        RetryPoller::new(self.config.deployment_poll)
            .poll("template deployment", move |_| async move {
                let resp = this.management(Method::GET, url.to_string(), None).await?;
                match provisioning_state(&resp.body).as_deref() {
                    Some("Succeeded") => Ok(()),
                    Some(state @ ("Failed" | "Canceled")) => Err(DeployError::Provisioning(
                        format!("deployment {}: {}", state, resp.body),
                    )),
                    _ => Err(DeployError::NotReady(resp.body)),
                }
            })
            .await?
            .into_result("template deployment")
    }

    // ═══════════════════════════════════════════════════════════════
    // MANAGEMENT API
    // ═══════════════════════════════════════════════════════════════

    async fn get_site(&self, resource_group: &str, name: &str) -> Result<ApiResponse, DeployError> {
        self.web(Method::GET, &self.site_id(resource_group, name), None)
            .await
    }

    async fn list_functions(&self, site: &Site) -> Result<ApiResponse, DeployError> {
        self.web(Method::GET, &format!("{}/functions", site.id), None)
            .await
    }

    async fn get_function(&self, site: &Site, name: &str) -> Result<ApiResponse, DeployError> {
        self.web(Method::GET, &format!("{}/functions/{}", site.id, name), None)
            .await
    }

    async fn delete_function(&self, site: &Site, name: &str) -> Result<ApiResponse, DeployError> {
        self.web(Method::DELETE, &format!("{}/functions/{}", site.id, name), None)
            .await
    }

    async fn sync_triggers(
        &self,
        site: &Site,
        settings: &AppSettings,
    ) -> Result<ApiResponse, DeployError> {
        self.web(
            Method::POST,
            &format!("{}/syncfunctiontriggers", site.id),
            Some(settings.to_arm_json()),
        )
        .await
    }

    async fn list_app_settings(&self, site: &Site) -> Result<ApiResponse, DeployError> {
        self.web(Method::POST, &format!("{}/config/appsettings/list", site.id), None)
            .await
    }

    async fn update_app_settings(
        &self,
        site: &Site,
        settings: &AppSettings,
    ) -> Result<ApiResponse, DeployError> {
        self.web(
            Method::PUT,
            &format!("{}/config/appsettings", site.id),
            Some(settings.to_arm_json()),
        )
        .await
    }

    // ═══════════════════════════════════════════════════════════════
    // SCM / HOST RUNTIME
    // ═══════════════════════════════════════════════════════════════

    async fn push_package(&self, scm_host: &str, artifact: &Path) -> Result<ApiResponse, DeployError> {
        let file = tokio::fs::File::open(artifact)
            .await
            .map_err(|_| DeployError::ArtifactMissing(artifact.to_path_buf()))?;
        let token = self.token.bearer_token().await?;
        let url = self.host_url(scm_host, "api/zipdeploy");

        let request = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
        send(request, &url).await
    }

    async fn get_admin_token(&self, scm_host: &str) -> Result<ApiResponse, DeployError> {
        let token = self.token.bearer_token().await?;
        let url = self.host_url(scm_host, "api/functions/admin/token");
        send(self.http.get(&url).bearer_auth(token), &url).await
    }

    async fn get_master_key(
        &self,
        default_host_name: &str,
        admin_token: &str,
    ) -> Result<ApiResponse, DeployError> {
        let url = self.host_url(default_host_name, "admin/host/systemkeys/_master");
        send(self.http.get(&url).bearer_auth(admin_token), &url).await
    }

    // ═══════════════════════════════════════════════════════════════
    // OBJECT STORAGE
    // ═══════════════════════════════════════════════════════════════

    async fn upload_blob(
        &self,
        local: &Path,
        container: &str,
        blob_name: &str,
    ) -> Result<(), DeployError> {
        self.storage.upload_file(local, container, blob_name).await
    }

    async fn blob_sas_url(&self, container: &str, blob_name: &str) -> Result<String, DeployError> {
        self.storage.signed_url(container, blob_name).await
    }
}
