//! Deployment state machine definition.
//!
//! The state is the complete snapshot of one deployment run. Steps only
//! move forward; a failed run is retried by starting a fresh state.

use crate::artifact::{artifact_blob_name, deployment_name};
use crate::types::{Site, TemplateSource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workflow steps, the nodes of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Starting point.
    Init,
    /// Realize and apply the infrastructure template.
    Provision,
    /// Fetch the site descriptor.
    ResolveHost,
    /// Push the artifact with the configured strategy.
    Upload,
    /// List deployed functions and report HTTP triggers.
    Report,
    /// Delete deployed functions that are no longer declared.
    CleanUp,
    /// Done.
    Complete,
    /// Failed, possibly recoverable by re-running.
    Failed { reason: String, recoverable: bool },
}

impl Step {
    /// Human-readable step name for logging/display.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Provision => "provision",
            Step::ResolveHost => "resolve_host",
            Step::Upload => "upload",
            Step::Report => "report",
            Step::CleanUp => "clean_up",
            Step::Complete => "complete",
            Step::Failed { .. } => "failed",
        }
    }
}

/// Full workflow state. Serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Unique session identifier.
    pub session_id: String,
    /// Current step in the workflow.
    pub step: Step,
    pub resource_group: String,
    /// Site name.
    pub function_app: String,
    /// Name of the infrastructure deployment; also names the archived artifact.
    pub deployment_name: String,
    pub template: TemplateSource,
    /// Local packaged artifact.
    pub artifact: Option<PathBuf>,
    /// Function names the service declares, in declaration order.
    pub declared_functions: Vec<String>,

    // Populated as workflow progresses
    /// Site descriptor, fetched after provisioning.
    pub site: Option<Site>,
    /// Declared functions seen deployed at report time.
    pub reported_functions: Vec<String>,
    /// Stale functions deleted during clean-up.
    pub removed_functions: Vec<String>,

    // Audit
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Unix timestamp of last update.
    pub updated_at: u64,
}

impl DeploymentState {
    /// Create a new deployment state.
    pub fn new(
        session_id: impl Into<String>,
        resource_group: impl Into<String>,
        function_app: impl Into<String>,
    ) -> Self {
        let now = current_unix_time();
        let function_app = function_app.into();

        Self {
            session_id: session_id.into(),
            step: Step::Init,
            resource_group: resource_group.into(),
            deployment_name: deployment_name(&function_app, now),
            function_app,
            template: TemplateSource::default(),
            artifact: None,
            declared_functions: Vec::new(),
            site: None,
            reported_functions: Vec::new(),
            removed_functions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = template;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_declared_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_functions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Object name the artifact is archived under.
    pub fn artifact_blob_name(&self) -> String {
        artifact_blob_name(&self.deployment_name)
    }

    /// Is this workflow in a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(self.step, Step::Complete | Step::Failed { .. })
    }

    /// Is this workflow failed?
    pub fn is_failed(&self) -> bool {
        matches!(self.step, Step::Failed { .. })
    }

    /// Is this workflow complete?
    pub fn is_complete(&self) -> bool {
        matches!(self.step, Step::Complete)
    }

    /// Transition to a new step.
    pub fn transition(&mut self, step: Step) {
        self.step = step;
        self.updated_at = current_unix_time();
    }

    /// Fail the workflow.
    pub fn fail(&mut self, reason: impl Into<String>, recoverable: bool) {
        self.step = Step::Failed {
            reason: reason.into(),
            recoverable,
        };
        self.updated_at = current_unix_time();
    }
}

fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
