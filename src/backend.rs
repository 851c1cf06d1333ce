//! The One Trait: FunctionAppBackend
//!
//! This is the single abstraction point for all external dependencies.
//! The workflow engine is pure logic. It doesn't know about REST,
//! credentials or blob storage SDKs; the implementation of this trait
//! does.
//!
//! Host API calls return [`ApiResponse`] rather than parsed values: the
//! engine decides what "not ready yet" means, the backend only reports
//! what the control plane said. A backend returns `Err` only when no
//! response was obtained at all.

use crate::error::DeployError;
use crate::types::*;
use std::future::Future;
use std::path::Path;

/// The single trait consumers implement to use the deployment workflow.
///
/// Abstracts:
/// - Infrastructure provisioning (template realization and apply)
/// - Management API (site, functions, settings, trigger sync)
/// - SCM host (package push, admin token) and host runtime keys
/// - Object storage (artifact upload, signed URLs)
pub trait FunctionAppBackend: Send + Sync {
    // ═══════════════════════════════════════════════════════════════
    // PROVISIONING
    // ═══════════════════════════════════════════════════════════════

    /// Realize a deployment descriptor from an explicit or named template.
    fn create_arm_deployment(
        &self,
        name: &str,
        source: &TemplateSource,
    ) -> impl Future<Output = Result<ArmDeployment, DeployError>> + Send;

    /// Apply a deployment descriptor to the resource group and wait for it.
    fn apply_arm_deployment(
        &self,
        resource_group: &str,
        deployment: &ArmDeployment,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // MANAGEMENT API
    // ═══════════════════════════════════════════════════════════════

    /// Fetch the site descriptor.
    fn get_site(
        &self,
        resource_group: &str,
        name: &str,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// List deployed functions.
    fn list_functions(
        &self,
        site: &Site,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Fetch one deployed function.
    fn get_function(
        &self,
        site: &Site,
        name: &str,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Delete one deployed function.
    fn delete_function(
        &self,
        site: &Site,
        name: &str,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Post settings to the trigger sync endpoint.
    fn sync_triggers(
        &self,
        site: &Site,
        settings: &AppSettings,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Fetch the full application settings map.
    fn list_app_settings(
        &self,
        site: &Site,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Replace the full application settings map.
    fn update_app_settings(
        &self,
        site: &Site,
        settings: &AppSettings,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // SCM / HOST RUNTIME
    // ═══════════════════════════════════════════════════════════════

    /// Stream a package straight to the SCM deployment endpoint.
    fn push_package(
        &self,
        scm_host: &str,
        artifact: &Path,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Fetch a short-lived admin token from the SCM host.
    fn get_admin_token(
        &self,
        scm_host: &str,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    /// Fetch the host master key using an admin token.
    fn get_master_key(
        &self,
        default_host_name: &str,
        admin_token: &str,
    ) -> impl Future<Output = Result<ApiResponse, DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // OBJECT STORAGE
    // ═══════════════════════════════════════════════════════════════

    /// Upload a local file. Overwrites by name.
    fn upload_blob(
        &self,
        local: &Path,
        container: &str,
        blob_name: &str,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Time-limited signed URL for a stored object.
    fn blob_sas_url(
        &self,
        container: &str,
        blob_name: &str,
    ) -> impl Future<Output = Result<String, DeployError>> + Send;
}
