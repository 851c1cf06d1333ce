//! Deployment Workflow Engine
//!
//! The state machine that drives deployments: provision, resolve host,
//! upload, report, clean up. It's dumb. It transitions between steps and
//! calls the backend. No transport, no credentials. Just logic.

use crate::backend::FunctionAppBackend;
use crate::error::DeployError;
use crate::registry::FunctionRegistry;
use crate::retry::RetryPolicy;
use crate::state::{DeploymentState, Step};
use crate::trigger::http_trigger;
use crate::types::{HttpTriggerConfig, Site};
use crate::upload::{ArtifactUploader, UploadStrategy, DEFAULT_CONTAINER};
use std::path::PathBuf;
use tracing::{info, warn};

/// Workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub strategy: UploadStrategy,
    /// Storage container artifacts are archived in.
    pub container: String,
    /// Budget for every convergence poll.
    pub retry: RetryPolicy,
    /// Extra local trees archived after the upload.
    pub archive_dirs: Vec<PathBuf>,
    /// Delete deployed functions that are no longer declared.
    pub remove_stale_functions: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            strategy: UploadStrategy::DirectPush,
            container: DEFAULT_CONTAINER.to_string(),
            retry: RetryPolicy::default(),
            archive_dirs: Vec::new(),
            remove_stale_functions: true,
        }
    }
}

/// Result of advancing one step.
#[derive(Debug)]
pub enum StepResult {
    /// Keep going, call advance() again.
    Continue,
    /// Workflow needs input from caller.
    NeedsInput(InputRequired),
    /// Done successfully.
    Complete,
    /// Failed.
    Failed(String),
}

/// What input the workflow needs.
#[derive(Debug)]
pub enum InputRequired {
    /// No artifact path has been resolved.
    ProvideArtifact,
}

/// The deployment workflow engine.
///
/// Parameterized by the backend; you provide the implementation.
pub struct DeploymentWorkflow<'a, B: FunctionAppBackend> {
    backend: &'a B,
    config: WorkflowConfig,
}

impl<'a, B: FunctionAppBackend> DeploymentWorkflow<'a, B> {
    /// Create a new workflow engine.
    pub fn new(backend: &'a B, config: WorkflowConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn registry(&self) -> FunctionRegistry<'a, B> {
        FunctionRegistry::new(self.backend, self.config.retry)
    }

    /// Advance the workflow by one step.
    ///
    /// An error marks the state failed before it is returned; nothing
    /// after the failing stage runs.
    pub async fn advance(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        let step = state.step.clone();
        let result = match &step {
            Step::Init => self.step_init(state).await,
            Step::Provision => self.step_provision(state).await,
            Step::ResolveHost => self.step_resolve_host(state).await,
            Step::Upload => self.step_upload(state).await,
            Step::Report => self.step_report(state).await,
            Step::CleanUp => self.step_clean_up(state).await,
            Step::Complete => return Ok(StepResult::Complete),
            Step::Failed { reason, .. } => return Ok(StepResult::Failed(reason.clone())),
        };

        if let Err(e) = &result {
            warn!(step = step.name(), error = %e, "deployment step failed");
            state.fail(e.to_string(), e.is_recoverable());
        }
        result
    }

    /// Run until completion or until input is needed.
    pub async fn run_to_completion(
        &self,
        state: &mut DeploymentState,
    ) -> Result<StepResult, DeployError> {
        loop {
            match self.advance(state).await? {
                StepResult::Continue => continue,
                other => return Ok(other),
            }
        }
    }

    /// Trigger configs of the declared functions, recomputed from a fresh
    /// listing.
    pub async fn endpoints(
        &self,
        state: &DeploymentState,
    ) -> Result<Vec<HttpTriggerConfig>, DeployError> {
        let site = require_site(state, "endpoints")?;
        self.registry()
            .http_endpoints(site, &state.declared_functions)
            .await
    }

    // ═══════════════════════════════════════════════════════════════
    // STEP IMPLEMENTATIONS
    // ═══════════════════════════════════════════════════════════════

    async fn step_init(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        if state.artifact.is_none() {
            return Ok(StepResult::NeedsInput(InputRequired::ProvideArtifact));
        }
        if state.resource_group.is_empty() || state.function_app.is_empty() {
            return Err(DeployError::Precondition(
                "resource group and function app name are required".into(),
            ));
        }

        state.transition(Step::Provision);
        Ok(StepResult::Continue)
    }

    async fn step_provision(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        info!(
            resource_group = %state.resource_group,
            deployment = %state.deployment_name,
            template = ?state.template,
            "creating deployment"
        );

        let deployment = self
            .backend
            .create_arm_deployment(&state.deployment_name, &state.template)
            .await?;
        self.backend
            .apply_arm_deployment(&state.resource_group, &deployment)
            .await?;

        info!(deployment = %deployment.name, "deployment applied");
        state.transition(Step::ResolveHost);
        Ok(StepResult::Continue)
    }

    async fn step_resolve_host(
        &self,
        state: &mut DeploymentState,
    ) -> Result<StepResult, DeployError> {
        let site = self
            .registry()
            .get_site(&state.resource_group, &state.function_app)
            .await?;

        let Some(site) = site else {
            let reason = format!(
                "function app {} not found in {} after provisioning",
                state.function_app, state.resource_group
            );
            state.fail(reason.clone(), true);
            return Ok(StepResult::Failed(reason));
        };

        info!(site = %site.name, host = %site.default_host_name, "resolved function app");
        state.site = Some(site);
        state.transition(Step::Upload);
        Ok(StepResult::Continue)
    }

    async fn step_upload(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        let site = require_site(state, "Upload")?;
        let artifact = state.artifact.as_ref().ok_or_else(|| {
            DeployError::InvalidState("artifact missing at Upload".into())
        })?;

        let uploader =
            ArtifactUploader::new(self.backend, self.config.retry, self.config.container.clone());
        uploader
            .upload(self.config.strategy, site, artifact, &state.artifact_blob_name())
            .await?;

        for dir in &self.config.archive_dirs {
            uploader.archive_tree(dir).await?;
        }

        state.transition(Step::Report);
        Ok(StepResult::Continue)
    }

    async fn step_report(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        let site = require_site(state, "Report")?;
        let deployed = self.registry().list(site).await?;

        let mut reported = Vec::new();
        for function in deployed
            .iter()
            .filter(|f| state.declared_functions.contains(&f.name))
        {
            match http_trigger(function, &site.default_host_name) {
                Some(trigger) => info!(
                    function = %trigger.name,
                    url = %trigger.url,
                    methods = %trigger.methods.join(","),
                    auth_level = trigger.auth_level.as_deref().unwrap_or("-"),
                    "http function deployed"
                ),
                None => info!(function = %function.name, "function deployed"),
            }
            reported.push(function.name.clone());
        }

        state.reported_functions = reported;
        if self.config.remove_stale_functions {
            state.transition(Step::CleanUp);
            Ok(StepResult::Continue)
        } else {
            state.transition(Step::Complete);
            Ok(StepResult::Complete)
        }
    }

    async fn step_clean_up(&self, state: &mut DeploymentState) -> Result<StepResult, DeployError> {
        let site = require_site(state, "CleanUp")?;
        let removed = self
            .registry()
            .reconcile(site, &state.declared_functions)
            .await?;

        state.removed_functions = removed;
        state.transition(Step::Complete);
        Ok(StepResult::Complete)
    }

    // ═══════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════

    /// Provide the artifact path.
    pub fn provide_artifact(state: &mut DeploymentState, artifact: impl Into<PathBuf>) {
        state.artifact = Some(artifact.into());
    }
}

fn require_site<'s>(state: &'s DeploymentState, at: &str) -> Result<&'s Site, DeployError> {
    state
        .site
        .as_ref()
        .ok_or_else(|| DeployError::InvalidState(format!("site missing at {}", at)))
}
