//! Function registry: the deployed-functions view of a site.
//!
//! The listing endpoint is eventually consistent. An empty listing right
//! after a deploy usually means "not converged yet", so `list` polls until
//! it sees at least one function.
//!
//! Caveat: a site that genuinely hosts zero functions is indistinguishable
//! from one that has not converged, and `list` will run out its whole
//! budget before reporting [`DeployError::ProvisioningTimeout`].

use crate::backend::FunctionAppBackend;
use crate::error::DeployError;
use crate::retry::{Polled, RetryPoller, RetryPolicy};
use crate::trigger::http_trigger;
use crate::types::{AppSettings, ApiResponse, FunctionEnvelope, HttpTriggerConfig, MasterKey, Site};
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Read/write access to a site's functions, settings and keys.
pub struct FunctionRegistry<'a, B: FunctionAppBackend> {
    backend: &'a B,
    poller: RetryPoller,
}

impl<'a, B: FunctionAppBackend> FunctionRegistry<'a, B> {
    pub fn new(backend: &'a B, policy: RetryPolicy) -> Self {
        Self {
            backend,
            poller: RetryPoller::new(policy),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // SITE
    // ═══════════════════════════════════════════════════════════════

    /// Fetch the site descriptor. `None` if the site or its resource
    /// group does not exist.
    pub async fn get_site(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<Site>, DeployError> {
        let resp = self.backend.get_site(resource_group, name).await?;

        if resp.is_success() {
            return Site::from_arm_json(&resp.body).map(Some);
        }
        if resp.is_not_found() {
            debug!(resource_group, name, code = ?resp.error_code, "site not found");
            return Ok(None);
        }
        resp.error_for_status("get site").map(|_| None)
    }

    // ═══════════════════════════════════════════════════════════════
    // FUNCTIONS
    // ═══════════════════════════════════════════════════════════════

    /// List deployed functions, waiting until the listing is non-empty.
    pub async fn list(&self, site: &Site) -> Result<Vec<FunctionEnvelope>, DeployError> {
        let backend = self.backend;
        info!(
            site = %site.name,
            budget_secs = self.poller.policy().budget().as_secs(),
            "listing deployed functions"
        );

        let polled = self
            .poller
            .poll("list functions", move |_| async move {
                let resp = backend.list_functions(site).await?;
                if !resp.is_success() {
                    return Err(not_ready(resp));
                }
                let functions = FunctionEnvelope::list_from_arm_json(&resp.body)?;
                if functions.is_empty() {
                    return Err(not_ready(resp));
                }
                Ok(functions)
            })
            .await?;

        debug!(site = %site.name, attempts = polled.attempts(), "listing polled");
        polled.into_result("list functions")
    }

    /// Fetch one function. `None` if it never showed up within the budget.
    pub async fn get(
        &self,
        site: &Site,
        name: &str,
    ) -> Result<Option<FunctionEnvelope>, DeployError> {
        require_name(name)?;
        let backend = self.backend;

        let polled = self
            .poller
            .poll("get function", move |_| async move {
                let resp = backend.get_function(site, name).await?;
                if !resp.is_success() {
                    return Err(not_ready(resp));
                }
                FunctionEnvelope::from_arm_json(&resp.body)
            })
            .await?;

        if let Polled::Exhausted { attempts, .. } = &polled {
            warn!(site = %site.name, function = name, attempts, "function never appeared");
        }
        Ok(polled.ready())
    }

    /// Delete one function. Deleting a function that is already gone
    /// succeeds.
    pub async fn delete(&self, site: &Site, name: &str) -> Result<(), DeployError> {
        require_site(site)?;
        require_name(name)?;

        info!(site = %site.name, function = name, "deleting function");
        let resp = self.backend.delete_function(site, name).await?;
        if resp.is_success() || resp.is_not_found() {
            return Ok(());
        }
        resp.error_for_status(&format!("delete function {}", name))
            .map(|_| ())
    }

    /// Ask the host to re-read binding metadata using `settings`.
    ///
    /// Not retried: a failed sync is a failed call, not a convergence delay.
    pub async fn sync_triggers(
        &self,
        site: &Site,
        settings: &AppSettings,
    ) -> Result<ApiResponse, DeployError> {
        require_site(site)?;
        info!(site = %site.name, "syncing triggers");

        self.backend
            .sync_triggers(site, settings)
            .await
            .map_err(|e| {
                DeployError::Transport(format!("failed to sync triggers for {}: {}", site.name, e))
            })?
            .error_for_status(&format!("sync triggers for {}", site.name))
    }

    /// Delete every deployed function not in `declared`.
    ///
    /// All deletions are issued concurrently and all are attempted; if any
    /// fails the call fails after the rest have finished. Returns the names
    /// removed.
    pub async fn reconcile(
        &self,
        site: &Site,
        declared: &[String],
    ) -> Result<Vec<String>, DeployError> {
        let deployed = self.list(site).await?;
        let stale = stale_functions(&deployed, declared);

        if stale.is_empty() {
            info!(site = %site.name, "no stale functions");
            return Ok(stale);
        }

        info!(site = %site.name, count = stale.len(), "removing stale functions");
        let results = join_all(stale.iter().map(|name| self.delete(site, name))).await;

        let mut failures = Vec::new();
        for (name, result) in stale.iter().zip(results) {
            if let Err(e) = result {
                warn!(function = %name, error = %e, "failed to delete function");
                failures.push(e);
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            Some(first) => Err(DeployError::Reconcile {
                failed,
                first: Box::new(first),
            }),
            None => Ok(stale),
        }
    }

    /// HTTP trigger configs of the declared functions, from a fresh listing.
    pub async fn http_endpoints(
        &self,
        site: &Site,
        declared: &[String],
    ) -> Result<Vec<HttpTriggerConfig>, DeployError> {
        let deployed = self.list(site).await?;
        Ok(deployed
            .iter()
            .filter(|f| declared.contains(&f.name))
            .filter_map(|f| http_trigger(f, &site.default_host_name))
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════
    // SETTINGS
    // ═══════════════════════════════════════════════════════════════

    pub async fn app_settings(&self, site: &Site) -> Result<AppSettings, DeployError> {
        let resp = self
            .backend
            .list_app_settings(site)
            .await?
            .error_for_status(&format!("list app settings for {}", site.name))?;
        AppSettings::from_arm_json(&resp.body)
    }

    /// Set one application setting and return the full map written.
    ///
    /// Fetch-whole, set one key, write-whole-back. Not atomic: a concurrent
    /// writer between the fetch and the write loses its update.
    pub async fn update_app_setting(
        &self,
        site: &Site,
        key: &str,
        value: &str,
    ) -> Result<AppSettings, DeployError> {
        require_site(site)?;
        let mut settings = self.app_settings(site).await?;
        settings.set(key, value);

        info!(site = %site.name, setting = key, "updating app setting");
        self.backend
            .update_app_settings(site, &settings)
            .await
            .map_err(|e| {
                DeployError::Transport(format!("failed to update {} on {}: {}", key, site.name, e))
            })?
            .error_for_status(&format!("update app settings for {}", site.name))?;

        // The echo is not guaranteed to carry `properties`.
        Ok(settings)
    }

    // ═══════════════════════════════════════════════════════════════
    // KEYS
    // ═══════════════════════════════════════════════════════════════

    /// Short-lived admin token from the SCM host.
    pub async fn admin_token(&self, site: &Site) -> Result<String, DeployError> {
        let scm_host = site.scm_host_name()?;
        let resp = self
            .backend
            .get_admin_token(scm_host)
            .await?
            .error_for_status("get admin token")?;
        Ok(unquote(&resp.body).to_string())
    }

    /// Host master key. Needs an admin token first.
    pub async fn master_key(&self, site: &Site) -> Result<MasterKey, DeployError> {
        let token = self.admin_token(site).await?;
        let resp = self
            .backend
            .get_master_key(&site.default_host_name, &token)
            .await?
            .error_for_status("get master key")?;
        serde_json::from_str(&resp.body)
            .map_err(|e| DeployError::Transport(format!("invalid master key response: {}", e)))
    }
}

/// Deployed function names not in `declared`, in listing order.
pub fn stale_functions(deployed: &[FunctionEnvelope], declared: &[String]) -> Vec<String> {
    deployed
        .iter()
        .filter(|f| !declared.contains(&f.name))
        .map(|f| f.name.clone())
        .collect()
}

fn not_ready(resp: ApiResponse) -> DeployError {
    DeployError::NotReady(resp.body)
}

fn require_site(site: &Site) -> Result<(), DeployError> {
    if site.id.is_empty() || site.name.is_empty() {
        return Err(DeployError::Precondition("site is required".into()));
    }
    Ok(())
}

fn require_name(name: &str) -> Result<(), DeployError> {
    if name.trim().is_empty() {
        return Err(DeployError::Precondition("function name is required".into()));
    }
    Ok(())
}

/// Tokens come back as a JSON string literal.
fn unquote(body: &str) -> &str {
    body.trim().trim_matches('"')
}
