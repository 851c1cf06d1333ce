//! Function App Deploy Library
//!
//! Standalone, trait-based deployment workflow for serverless function
//! apps.
//!
//! # Design
//!
//! This library provides the deployment workflow logic without coupling to
//! any specific transport, credential or storage implementation. You
//! implement the [`FunctionAppBackend`] trait with your infrastructure, and
//! the workflow engine handles the state machine: provision, resolve the
//! host, upload, wait for the control plane to converge, report, and
//! remove functions that are no longer declared.
//!
//! # Usage
//!
//! ```ignore
//! use azfunc_deploy_rs::{
//!     DeploymentState, DeploymentWorkflow, FunctionAppBackend, StepResult, WorkflowConfig,
//! };
//!
//! // Implement FunctionAppBackend for your infrastructure
//! struct MyBackend { /* ... */ }
//! impl FunctionAppBackend for MyBackend { /* ... */ }
//!
//! let backend = MyBackend::new();
//! let workflow = DeploymentWorkflow::new(&backend, WorkflowConfig::default());
//!
//! let mut state = DeploymentState::new("session-1", "my-rg", "my-app")
//!     .with_artifact(".serverless/my-service.zip")
//!     .with_declared_functions(["hello", "goodbye"]);
//!
//! match workflow.run_to_completion(&mut state).await? {
//!     StepResult::Complete => println!("Deployed!"),
//!     StepResult::NeedsInput(input) => { /* handle caller input */ },
//!     StepResult::Failed(reason) => println!("Failed: {}", reason),
//!     _ => {}
//! }
//! ```

pub mod artifact;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod state;
pub mod storage;
pub mod trigger;
pub mod types;
pub mod upload;
pub mod workflow;

#[cfg(feature = "default-client")]
pub mod client;

// Re-export the main types at crate root for convenience
pub use artifact::{ArchiveEntry, ArtifactLocator};
pub use auth::{StaticToken, TokenProvider};
pub use backend::FunctionAppBackend;
pub use config::{DeployConfig, DeploymentOptions};
pub use error::DeployError;
pub use registry::FunctionRegistry;
pub use retry::{Polled, RetryPoller, RetryPolicy};
pub use state::{DeploymentState, Step};
pub use storage::ObjectStorage;
pub use trigger::http_trigger;
pub use types::*;
pub use upload::{ArtifactUploader, UploadStrategy};
pub use workflow::{DeploymentWorkflow, InputRequired, StepResult, WorkflowConfig};

#[cfg(feature = "default-client")]
pub use client::{ClientConfig, FunctionAppClient};
#[cfg(feature = "default-client")]
pub use storage::BlobContainerStorage;
