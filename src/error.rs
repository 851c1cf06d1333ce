//! Error types for the function app deployment workflow.
//!
//! No `anyhow` leakage. Explicit, typed errors.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Control plane has not converged yet. Only ever produced inside a
    /// poll; callers see [`DeployError::ProvisioningTimeout`] instead.
    #[error("not ready: {0}")]
    NotReady(String),

    #[error("{operation} did not converge after {attempts} attempts; last response: {last_response}")]
    ProvisioningTimeout {
        operation: String,
        attempts: u32,
        last_response: String,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid workflow state: {0}")]
    InvalidState(String),

    #[error("{failed} function deletion(s) failed; first: {first}")]
    Reconcile { failed: usize, first: Box<DeployError> },
}

impl DeployError {
    /// Whether re-running the whole deployment might succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeployError::NotReady(_)
            | DeployError::ProvisioningTimeout { .. }
            | DeployError::Transport(_)
            | DeployError::Storage(_) => true,
            DeployError::Reconcile { first, .. } => first.is_recoverable(),
            _ => false,
        }
    }

    /// Raw response body captured when a poll ran out of attempts.
    pub fn last_response(&self) -> Option<&str> {
        match self {
            DeployError::ProvisioningTimeout { last_response, .. } => Some(last_response),
            _ => None,
        }
    }
}
