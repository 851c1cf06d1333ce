//! Minimal domain types for the function app deployment workflow.
//!
//! These are the types the workflow engine needs. Wire shapes of the
//! management API stay private to this module; everything public is the
//! projection the workflow actually branches on.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Marker of the management (SCM) host among a site's host names.
pub const SCM_MARKER: &str = ".scm.";

/// Public DNS suffix of hosted sites.
pub const PLATFORM_SUFFIX: &str = ".azurewebsites.net";

/// Error codes the management API uses for "does not exist (yet)".
const NOT_FOUND_CODES: &[&str] = &["ResourceGroupNotFound", "ResourceNotFound", "NotFound"];

/// Raw outcome of one management/SCM API call.
///
/// Transport failures never get this far; they surface as
/// [`DeployError::Transport`] from the backend. Everything that produced a
/// status line is an `ApiResponse`, and callers branch on `status` and
/// `error_code` rather than on the shape of `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    /// `error.code` from the management error envelope, when present.
    pub error_code: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
}

impl ApiResponse {
    /// Build a response, extracting the error code from the body if it is
    /// a management error envelope.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let error_code = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .map(|e| e.error.code);
        Self {
            status,
            body,
            error_code,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Resource group or resource does not exist. Any 404 counts,
    /// whatever code its envelope carries.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
            || self
                .error_code
                .as_deref()
                .is_some_and(|code| NOT_FOUND_CODES.contains(&code))
    }

    /// Turn a non-success response into a transport error naming the call.
    pub fn error_for_status(self, what: &str) -> Result<Self, DeployError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(DeployError::Transport(format!(
            "{} returned {}: {}",
            what, self.status, self.body
        )))
    }
}

/// The provisioned compute host (`Site` in the management API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    /// Public DNS name, e.g. `myapp.azurewebsites.net`.
    pub default_host_name: String,
    /// Includes the SCM (management) host name.
    pub enabled_host_names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSite {
    id: String,
    name: String,
    #[serde(default)]
    properties: ArmSiteProperties,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSiteProperties {
    #[serde(default)]
    default_host_name: String,
    #[serde(default)]
    enabled_host_names: Vec<String>,
    #[serde(default)]
    resource_group: String,
}

impl Site {
    /// Parse a site descriptor as returned by the management API.
    pub fn from_arm_json(body: &str) -> Result<Self, DeployError> {
        let site: ArmSite = serde_json::from_str(body)
            .map_err(|e| DeployError::Transport(format!("invalid site descriptor: {}", e)))?;
        Ok(Self {
            id: site.id,
            name: site.name,
            resource_group: site.properties.resource_group,
            default_host_name: site.properties.default_host_name,
            enabled_host_names: site.properties.enabled_host_names,
        })
    }

    /// The SCM host name, e.g. `myapp.scm.azurewebsites.net`.
    ///
    /// A site without one was provisioned wrong; this is not transient.
    pub fn scm_host_name(&self) -> Result<&str, DeployError> {
        self.enabled_host_names
            .iter()
            .find(|h| h.contains(SCM_MARKER) && h.ends_with(PLATFORM_SUFFIX))
            .map(String::as_str)
            .ok_or_else(|| {
                DeployError::Config(format!("site {} has no SCM host name", self.name))
            })
    }
}

/// One binding of a deployed function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
}

impl Binding {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            direction: None,
            route: None,
            auth_level: None,
            methods: None,
        }
    }
}

/// A deployed function (`FunctionEnvelope` in the management API).
///
/// Owned by the host. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEnvelope {
    pub name: String,
    pub bindings: Vec<Binding>,
}

#[derive(Deserialize)]
struct ArmList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ArmFunction {
    name: String,
    #[serde(default)]
    properties: ArmFunctionProperties,
}

#[derive(Default, Deserialize)]
struct ArmFunctionProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    config: ArmFunctionConfig,
}

#[derive(Default, Deserialize)]
struct ArmFunctionConfig {
    #[serde(default)]
    bindings: Vec<Binding>,
}

impl From<ArmFunction> for FunctionEnvelope {
    fn from(f: ArmFunction) -> Self {
        // Top-level name is "{site}/{function}".
        let name = f.properties.name.unwrap_or_else(|| {
            f.name
                .rsplit('/')
                .next()
                .unwrap_or(f.name.as_str())
                .to_string()
        });
        Self {
            name,
            bindings: f.properties.config.bindings,
        }
    }
}

impl FunctionEnvelope {
    pub fn new(name: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self {
            name: name.into(),
            bindings,
        }
    }

    /// Parse a single function envelope.
    pub fn from_arm_json(body: &str) -> Result<Self, DeployError> {
        let f: ArmFunction = serde_json::from_str(body)
            .map_err(|e| DeployError::Transport(format!("invalid function envelope: {}", e)))?;
        Ok(f.into())
    }

    /// Parse a `{ "value": [...] }` function listing.
    pub fn list_from_arm_json(body: &str) -> Result<Vec<Self>, DeployError> {
        let list: ArmList<ArmFunction> = serde_json::from_str(body)
            .map_err(|e| DeployError::Transport(format!("invalid function listing: {}", e)))?;
        Ok(list.value.into_iter().map(Into::into).collect())
    }
}

/// HTTP invocation metadata derived from a function's bindings.
///
/// Recomputed from a fresh listing every time; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpTriggerConfig {
    pub name: String,
    pub route: String,
    pub url: String,
    pub methods: Vec<String>,
    pub auth_level: Option<String>,
}

/// Application settings of a site. The host only accepts whole-map writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings(pub BTreeMap<String, String>);

#[derive(Serialize, Deserialize)]
struct ArmSettings {
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl AppSettings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn from_arm_json(body: &str) -> Result<Self, DeployError> {
        let s: ArmSettings = serde_json::from_str(body)
            .map_err(|e| DeployError::Transport(format!("invalid app settings: {}", e)))?;
        Ok(Self(s.properties))
    }

    /// `{ "properties": { ... } }` body for settings writes and trigger sync.
    pub fn to_arm_json(&self) -> serde_json::Value {
        serde_json::json!({ "properties": self.0 })
    }
}

/// Host master key (`admin/host/systemkeys/_master`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey {
    pub name: String,
    pub value: String,
}

/// Where the infrastructure template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateSource {
    /// Explicit template file.
    File(PathBuf),
    /// Named built-in template, e.g. `consumption`.
    Named(String),
}

impl Default for TemplateSource {
    fn default() -> Self {
        Self::Named("consumption".to_string())
    }
}

/// Opaque deployment handle realized by the provisioning collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmDeployment {
    pub name: String,
    pub template: serde_json::Value,
    pub parameters: serde_json::Value,
}
