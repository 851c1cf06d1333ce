//! Deployment configuration.
//!
//! Loaded from a YAML document, then overridden from the environment
//! (`.env` is honoured):
//!
//! | Variable | Field |
//! |---|---|
//! | `AZFUNC_RESOURCE_GROUP` | `resource_group` |
//! | `AZFUNC_APP` | `function_app` |
//! | `AZFUNC_ARTIFACT` | `artifact` |
//! | `AZFUNC_EXTERNAL` | `deployment.external` |
//! | `AZFUNC_RETRY_ATTEMPTS` | `retry.max_attempts` |
//! | `AZFUNC_RETRY_DELAY_SECS` | `retry.delay_secs` |

use crate::artifact::ArtifactLocator;
use crate::error::DeployError;
use crate::retry::RetryPolicy;
use crate::state::DeploymentState;
use crate::types::TemplateSource;
use crate::upload::{UploadStrategy, DEFAULT_CONTAINER};
use crate::workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Service name; names the conventional artifact.
    pub service: String,
    pub resource_group: String,
    pub function_app: String,
    /// Explicit infrastructure template file.
    pub template: Option<PathBuf>,
    /// Named template used when no explicit one is given.
    pub template_type: String,
    /// Explicit artifact path.
    pub artifact: Option<PathBuf>,
    /// Artifact recorded by a previous packaging run.
    pub package_artifact: Option<PathBuf>,
    pub declared_functions: Vec<String>,
    pub deployment: DeploymentOptions,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Run from an external package instead of pushing to the host.
    pub external: bool,
    pub container: String,
    pub archive_dirs: Vec<PathBuf>,
    pub remove_stale_functions: bool,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            external: false,
            container: DEFAULT_CONTAINER.to_string(),
            archive_dirs: Vec::new(),
            remove_stale_functions: true,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            resource_group: String::new(),
            function_app: String::new(),
            template: None,
            template_type: "consumption".to_string(),
            artifact: None,
            package_artifact: None,
            declared_functions: Vec::new(),
            deployment: DeploymentOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DeployConfig {
    pub fn from_yaml(content: &str) -> Result<Self, DeployError> {
        serde_yaml::from_str(content)
            .map_err(|e| DeployError::Config(format!("invalid config: {}", e)))
    }

    /// Load a YAML file and apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DeployError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)?.with_env()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, DeployError> {
        Self::default().with_env()
    }

    /// Apply overrides from the process environment, loading `.env` first.
    pub fn with_env(self) -> Result<Self, DeployError> {
        dotenvy::dotenv().ok();
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AZFUNC_RESOURCE_GROUP") {
            self.resource_group = v;
        }
        if let Some(v) = lookup("AZFUNC_APP") {
            self.function_app = v;
        }
        if let Some(v) = lookup("AZFUNC_ARTIFACT") {
            self.artifact = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AZFUNC_EXTERNAL") {
            self.deployment.external = parse_env("AZFUNC_EXTERNAL", &v)?;
        }
        if let Some(v) = lookup("AZFUNC_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_env("AZFUNC_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("AZFUNC_RETRY_DELAY_SECS") {
            self.retry.delay_secs = parse_env("AZFUNC_RETRY_DELAY_SECS", &v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.resource_group.is_empty() {
            return Err(DeployError::Config("resource_group is required".into()));
        }
        if self.function_app.is_empty() {
            return Err(DeployError::Config("function_app is required".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(DeployError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn template_source(&self) -> TemplateSource {
        match &self.template {
            Some(path) => TemplateSource::File(path.clone()),
            None => TemplateSource::Named(self.template_type.clone()),
        }
    }

    pub fn artifact_locator(&self) -> ArtifactLocator {
        ArtifactLocator {
            explicit: self.artifact.clone(),
            packaged: self.package_artifact.clone(),
            service: self.service.clone(),
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            strategy: UploadStrategy::from_external_flag(self.deployment.external),
            container: self.deployment.container.clone(),
            retry: self.retry,
            archive_dirs: self.deployment.archive_dirs.clone(),
            remove_stale_functions: self.deployment.remove_stale_functions,
        }
    }

    /// Fresh workflow state for one deployment run.
    pub fn initial_state(&self, session_id: impl Into<String>) -> Result<DeploymentState, DeployError> {
        self.validate()?;
        Ok(
            DeploymentState::new(session_id, &self.resource_group, &self.function_app)
                .with_template(self.template_source())
                .with_artifact(self.artifact_locator().resolve())
                .with_declared_functions(self.declared_functions.iter().cloned()),
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DeployError> {
    value
        .trim()
        .parse()
        .map_err(|_| DeployError::Config(format!("invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONFIG: &str = r#"
service: widgets
resource_group: widgets-rg
function_app: widgets-app
declared_functions: [hello, goodbye]
deployment:
  external: true
  archive_dirs: [config]
retry:
  max_attempts: 5
"#;

    #[test]
    fn test_from_yaml() {
        let config = DeployConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.service, "widgets");
        assert_eq!(config.declared_functions, vec!["hello", "goodbye"]);
        assert!(config.deployment.external);
        assert_eq!(config.deployment.container, "deployment-artifacts");
        assert!(config.deployment.remove_stale_functions);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_secs, 30);
        assert_eq!(config.template_type, "consumption");
    }

    #[test]
    fn test_invalid_yaml() {
        let err = DeployConfig::from_yaml("retry: [oops").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("AZFUNC_APP", "other-app"),
            ("AZFUNC_EXTERNAL", "false"),
            ("AZFUNC_RETRY_DELAY_SECS", "2"),
        ]
        .into_iter()
        .collect();

        let config = DeployConfig::from_yaml(CONFIG)
            .unwrap()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.function_app, "other-app");
        assert_eq!(config.resource_group, "widgets-rg");
        assert!(!config.deployment.external);
        assert_eq!(config.retry.delay_secs, 2);

        let err = DeployConfig::default()
            .with_overrides(|k| (k == "AZFUNC_RETRY_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("AZFUNC_RETRY_ATTEMPTS"));
    }

    #[test]
    fn test_derived_settings() {
        let config = DeployConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.template_source(), TemplateSource::Named("consumption".into()));
        assert_eq!(config.workflow_config().strategy, UploadStrategy::ExternalPackage);

        let state = config.initial_state("s1").unwrap();
        assert_eq!(state.artifact, Some(PathBuf::from(".serverless/widgets.zip")));
        assert_eq!(state.declared_functions, vec!["hello", "goodbye"]);

        let mut explicit = config.clone();
        explicit.template = Some(PathBuf::from("infra/custom.json"));
        assert_eq!(
            explicit.template_source(),
            TemplateSource::File(PathBuf::from("infra/custom.json"))
        );
    }

    #[test]
    fn test_validate() {
        assert!(DeployConfig::default().validate().is_err());
        assert!(DeployConfig::default().initial_state("s").is_err());
        assert!(DeployConfig::from_yaml(CONFIG).unwrap().validate().is_ok());
    }
}
