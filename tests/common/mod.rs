//! In-memory backend for driving the workflow without a network.

#![allow(dead_code)]

use azfunc_deploy_rs::{
    ApiResponse, AppSettings, ArmDeployment, Binding, DeployError, FunctionAppBackend,
    FunctionEnvelope, Site, TemplateSource,
};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::Barrier;

pub const SITE_ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Web/sites/app";

pub fn site() -> Site {
    Site {
        id: SITE_ID.to_string(),
        name: "app".to_string(),
        resource_group: "rg".to_string(),
        default_host_name: "app.azurewebsites.net".to_string(),
        enabled_host_names: vec![
            "app.azurewebsites.net".to_string(),
            "app.scm.azurewebsites.net".to_string(),
        ],
    }
}

pub fn http_function(name: &str) -> FunctionEnvelope {
    let mut trigger = Binding::new("httpTrigger");
    trigger.direction = Some("in".to_string());
    trigger.auth_level = Some("function".to_string());
    trigger.methods = Some(vec!["get".to_string(), "post".to_string()]);
    FunctionEnvelope::new(name, vec![trigger])
}

pub fn listing_body(functions: &[FunctionEnvelope]) -> String {
    let value: Vec<_> = functions
        .iter()
        .map(|f| {
            json!({
                "name": format!("app/{}", f.name),
                "properties": { "name": f.name, "config": { "bindings": f.bindings } }
            })
        })
        .collect();
    json!({ "value": value }).to_string()
}

pub const EMPTY_LISTING: &str = r#"{"value":[]}"#;

/// Scriptable backend that records every call by name.
pub struct MockBackend {
    pub site: Mutex<Option<Site>>,
    pub deployed: Mutex<Vec<FunctionEnvelope>>,
    /// Responses served by `list_functions` before falling back to `deployed`.
    pub scripted_listings: Mutex<VecDeque<ApiResponse>>,
    pub settings: Mutex<AppSettings>,
    pub failing_deletes: HashSet<String>,
    pub fail_provisioning: bool,
    pub fail_storage: bool,
    pub push_status: u16,
    /// `error.code` served with every 404.
    pub not_found_code: &'static str,
    /// Body returned by `update_app_settings` instead of the written map.
    pub settings_echo: Option<String>,
    /// Settings passed to the last `sync_triggers`.
    pub synced: Mutex<Option<AppSettings>>,
    /// When set, `push_package` and `upload_blob` each wait for the other.
    pub rendezvous: Option<Barrier>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            site: Mutex::new(Some(site())),
            deployed: Mutex::new(Vec::new()),
            scripted_listings: Mutex::new(VecDeque::new()),
            settings: Mutex::new(AppSettings::default()),
            failing_deletes: HashSet::new(),
            fail_provisioning: false,
            fail_storage: false,
            push_status: 200,
            not_found_code: "ResourceNotFound",
            settings_echo: None,
            synced: Mutex::new(None),
            rendezvous: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockBackend {
    pub fn with_deployed(names: &[&str]) -> Self {
        let backend = Self::default();
        *backend.deployed.lock().unwrap() = names.iter().map(|n| http_function(n)).collect();
        backend
    }

    /// Serve `count` empty listings before the real one.
    pub fn with_empty_listings(self, count: usize) -> Self {
        self.scripted_listings
            .lock()
            .unwrap()
            .extend((0..count).map(|_| ApiResponse::ok(EMPTY_LISTING)));
        self
    }

    pub fn without_site(self) -> Self {
        *self.site.lock().unwrap() = None;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn deployed_names(&self) -> Vec<String> {
        self.deployed
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn not_found(&self) -> ApiResponse {
        ApiResponse::new(
            404,
            json!({ "error": { "code": self.not_found_code, "message": "not found" } }).to_string(),
        )
    }

    async fn meet(&self) {
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
    }
}

impl FunctionAppBackend for MockBackend {
    async fn create_arm_deployment(
        &self,
        name: &str,
        _source: &TemplateSource,
    ) -> Result<ArmDeployment, DeployError> {
        self.record(format!("create_arm_deployment:{}", name));
        Ok(ArmDeployment {
            name: name.to_string(),
            template: json!({ "resources": [] }),
            parameters: json!({}),
        })
    }

    async fn apply_arm_deployment(
        &self,
        resource_group: &str,
        _deployment: &ArmDeployment,
    ) -> Result<(), DeployError> {
        self.record(format!("apply_arm_deployment:{}", resource_group));
        if self.fail_provisioning {
            return Err(DeployError::Provisioning("quota exceeded".into()));
        }
        Ok(())
    }

    async fn get_site(&self, resource_group: &str, name: &str) -> Result<ApiResponse, DeployError> {
        self.record(format!("get_site:{}/{}", resource_group, name));
        let site = self.site.lock().unwrap().clone();
        Ok(match site {
            Some(site) => ApiResponse::ok(
                json!({
                    "id": site.id,
                    "name": site.name,
                    "properties": {
                        "defaultHostName": site.default_host_name,
                        "enabledHostNames": site.enabled_host_names,
                        "resourceGroup": site.resource_group,
                    }
                })
                .to_string(),
            ),
            None => self.not_found(),
        })
    }

    async fn list_functions(&self, _site: &Site) -> Result<ApiResponse, DeployError> {
        self.record("list_functions");
        if let Some(scripted) = self.scripted_listings.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(ApiResponse::ok(listing_body(&self.deployed.lock().unwrap())))
    }

    async fn get_function(&self, _site: &Site, name: &str) -> Result<ApiResponse, DeployError> {
        self.record(format!("get_function:{}", name));
        let deployed = self.deployed.lock().unwrap();
        Ok(match deployed.iter().find(|f| f.name == name) {
            Some(f) => ApiResponse::ok(
                json!({
                    "name": format!("app/{}", f.name),
                    "properties": { "name": f.name, "config": { "bindings": f.bindings } }
                })
                .to_string(),
            ),
            None => ApiResponse::new(404, ""),
        })
    }

    async fn delete_function(&self, _site: &Site, name: &str) -> Result<ApiResponse, DeployError> {
        self.record(format!("delete_function:{}", name));
        if self.failing_deletes.contains(name) {
            return Ok(ApiResponse::new(500, "internal error"));
        }
        let mut deployed = self.deployed.lock().unwrap();
        let before = deployed.len();
        deployed.retain(|f| f.name != name);
        Ok(if deployed.len() < before {
            ApiResponse::ok("")
        } else {
            self.not_found()
        })
    }

    async fn sync_triggers(
        &self,
        _site: &Site,
        settings: &AppSettings,
    ) -> Result<ApiResponse, DeployError> {
        self.record("sync_triggers");
        *self.synced.lock().unwrap() = Some(settings.clone());
        Ok(ApiResponse::ok(""))
    }

    async fn list_app_settings(&self, _site: &Site) -> Result<ApiResponse, DeployError> {
        self.record("list_app_settings");
        Ok(ApiResponse::ok(
            self.settings.lock().unwrap().to_arm_json().to_string(),
        ))
    }

    async fn update_app_settings(
        &self,
        _site: &Site,
        settings: &AppSettings,
    ) -> Result<ApiResponse, DeployError> {
        self.record("update_app_settings");
        *self.settings.lock().unwrap() = settings.clone();
        let echo = match &self.settings_echo {
            Some(body) => body.clone(),
            None => settings.to_arm_json().to_string(),
        };
        Ok(ApiResponse::ok(echo))
    }

    async fn push_package(&self, scm_host: &str, _artifact: &Path) -> Result<ApiResponse, DeployError> {
        self.record(format!("push_package:{}", scm_host));
        self.meet().await;
        Ok(ApiResponse::new(self.push_status, ""))
    }

    async fn get_admin_token(&self, scm_host: &str) -> Result<ApiResponse, DeployError> {
        self.record(format!("get_admin_token:{}", scm_host));
        Ok(ApiResponse::ok("\"admin-token\""))
    }

    async fn get_master_key(
        &self,
        default_host_name: &str,
        admin_token: &str,
    ) -> Result<ApiResponse, DeployError> {
        self.record(format!("get_master_key:{}:{}", default_host_name, admin_token));
        Ok(ApiResponse::ok(r#"{"name":"_master","value":"secret"}"#))
    }

    async fn upload_blob(
        &self,
        _local: &Path,
        container: &str,
        blob_name: &str,
    ) -> Result<(), DeployError> {
        self.record(format!("upload_blob:{}/{}", container, blob_name));
        self.meet().await;
        if self.fail_storage {
            return Err(DeployError::Storage("container unavailable".into()));
        }
        Ok(())
    }

    async fn blob_sas_url(&self, container: &str, blob_name: &str) -> Result<String, DeployError> {
        self.record("blob_sas_url");
        Ok(format!(
            "https://acct.blob.core.windows.net/{}/{}?sig=x",
            container, blob_name
        ))
    }
}
