//! HTTP trigger extraction from function bindings.

use crate::types::{Binding, FunctionEnvelope, HttpTriggerConfig};

/// Binding type that marks an HTTP entry point.
pub const HTTP_TRIGGER: &str = "httpTrigger";

/// Path prefix the host serves HTTP functions under.
pub const API_PREFIX: &str = "api";

/// Derive the HTTP trigger config of a function, if it has one.
///
/// Only the first `httpTrigger` binding counts. Functions without one
/// (timers, queues, ...) yield `None`.
pub fn http_trigger(function: &FunctionEnvelope, default_host_name: &str) -> Option<HttpTriggerConfig> {
    let binding = function.bindings.iter().find(|b| is_http_trigger(b))?;

    let route = binding
        .route
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(function.name.as_str())
        .trim_start_matches('/')
        .to_string();

    let methods = match &binding.methods {
        Some(methods) if !methods.is_empty() => {
            methods.iter().map(|m| m.to_ascii_uppercase()).collect()
        }
        _ => vec!["*".to_string()],
    };

    Some(HttpTriggerConfig {
        name: function.name.clone(),
        url: format!("{}/{}/{}", default_host_name, API_PREFIX, route),
        route,
        methods,
        auth_level: binding.auth_level.clone(),
    })
}

fn is_http_trigger(binding: &Binding) -> bool {
    binding.kind.eq_ignore_ascii_case(HTTP_TRIGGER)
}
