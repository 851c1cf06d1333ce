//! End-to-end deployment example.
//!
//! Provisions the function app, uploads the packaged service and prints
//! the HTTP endpoints it exposes.
//!
//! Usage:
//!   cargo run --example deploy -- [deploy.yaml]
//!
//! Environment:
//!   AZURE_SUBSCRIPTION_ID  - subscription (required)
//!   AZURE_ACCESS_TOKEN     - management bearer token (required)
//!   AZFUNC_STORAGE_URL     - blob service URL (required)
//!   AZFUNC_STORAGE_SAS     - blob SAS token
//!   AZFUNC_RESOURCE_GROUP, AZFUNC_APP, AZFUNC_ARTIFACT, AZFUNC_EXTERNAL
//!   RUST_LOG               - log filter (default: info)

use azfunc_deploy_rs::{
    DeployConfig, DeploymentWorkflow, FunctionAppClient, InputRequired, Step, StepResult,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DeployConfig::load(path).await?,
        None => DeployConfig::from_env()?,
    };
    let client = FunctionAppClient::from_env()?;
    let workflow = DeploymentWorkflow::new(&client, config.workflow_config());

    let session_id = format!("{}-{}", config.function_app, std::process::id());
    let mut state = config.initial_state(session_id)?;

    println!("Deploying {} to {}", state.function_app, state.resource_group);
    println!("  deployment: {}", state.deployment_name);
    println!("  strategy:   {}", workflow.config().strategy.name());
    println!();

    match workflow.run_to_completion(&mut state).await {
        Ok(StepResult::Complete) => {}
        Ok(StepResult::NeedsInput(InputRequired::ProvideArtifact)) => {
            eprintln!("No artifact found. Package the service or set AZFUNC_ARTIFACT.");
            std::process::exit(2);
        }
        Ok(StepResult::Failed(reason)) => {
            let retry = matches!(state.step, Step::Failed { recoverable: true, .. });
            eprintln!("Deployment failed: {}", reason);
            if retry {
                eprintln!("This looks transient; re-running the deployment may succeed.");
            }
            std::process::exit(1);
        }
        Ok(StepResult::Continue) => unreachable!("run_to_completion never stops on Continue"),
        Err(e) => {
            eprintln!("Deployment failed: {}", e);
            if let Some(last) = e.last_response() {
                eprintln!("Last response: {}", last);
            }
            if e.is_recoverable() {
                eprintln!("This looks transient; re-running the deployment may succeed.");
            }
            std::process::exit(1);
        }
    }

    println!("Deployed {} function(s)", state.reported_functions.len());
    for name in &state.removed_functions {
        println!("  removed stale function {}", name);
    }

    let endpoints = workflow.endpoints(&state).await?;
    if !endpoints.is_empty() {
        println!();
        println!("Endpoints:");
        for endpoint in endpoints {
            println!(
                "  {:<20} {} https://{} (auth: {})",
                endpoint.name,
                endpoint.methods.join("|"),
                endpoint.url,
                endpoint.auth_level.as_deref().unwrap_or("function")
            );
        }
    }
    Ok(())
}
