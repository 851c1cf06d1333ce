mod common;

use azfunc_deploy_rs::{ApiResponse, DeployError, FunctionRegistry, RetryPolicy};
use common::{site, MockBackend, EMPTY_LISTING};
use std::time::Duration;

fn declared(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════
// CONVERGENCE
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_list_converges_after_empty_listings() {
    let backend = MockBackend::with_deployed(&["hello"]).with_empty_listings(3);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let functions = registry.list(&site()).await.unwrap();

    assert_eq!(functions.len(), 1);
    assert_eq!(backend.count("list_functions"), 4);
    // three fixed 30s delays, none after the successful attempt
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(90) && elapsed < Duration::from_secs(91));
}

#[tokio::test(start_paused = true)]
async fn test_list_converges_on_last_attempt() {
    let backend = MockBackend::with_deployed(&["hello"]).with_empty_listings(29);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    registry.list(&site()).await.unwrap();
    assert_eq!(backend.count("list_functions"), 30);
}

#[tokio::test(start_paused = true)]
async fn test_list_times_out_with_last_response() {
    let backend = MockBackend::with_deployed(&["hello"]).with_empty_listings(30);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let err = registry.list(&site()).await.unwrap_err();
    match &err {
        DeployError::ProvisioningTimeout {
            operation,
            attempts,
            last_response,
        } => {
            assert_eq!(operation, "list functions");
            assert_eq!(*attempts, 30);
            assert_eq!(last_response, EMPTY_LISTING);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(err.is_recoverable());
    assert_eq!(backend.count("list_functions"), 30);
}

#[tokio::test(start_paused = true)]
async fn test_list_retries_non_success_status() {
    let backend = MockBackend::with_deployed(&["hello"]);
    backend
        .scripted_listings
        .lock()
        .unwrap()
        .push_back(ApiResponse::new(503, "warming up"));
    let registry = FunctionRegistry::new(&backend, RetryPolicy::new(5, 1));

    assert_eq!(registry.list(&site()).await.unwrap().len(), 1);
    assert_eq!(backend.count("list_functions"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_get_missing_function_is_none() {
    let backend = MockBackend::with_deployed(&["hello"]);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::new(3, 1));

    assert!(registry.get(&site(), "hello").await.unwrap().is_some());
    assert!(registry.get(&site(), "nope").await.unwrap().is_none());
    assert_eq!(backend.count("get_function:nope"), 3);
}

// ═══════════════════════════════════════════════════════════════════
// DELETION AND RECONCILIATION
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_delete_is_idempotent() {
    let backend = MockBackend::with_deployed(&["a", "b"]);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    registry.delete(&site(), "a").await.unwrap();
    registry.delete(&site(), "a").await.unwrap();
    assert_eq!(backend.deployed_names(), vec!["b"]);
}

#[tokio::test]
async fn test_delete_missing_function_with_plain_not_found_code() {
    let backend = MockBackend {
        not_found_code: "NotFound",
        ..MockBackend::with_deployed(&["a"])
    };
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    registry.delete(&site(), "ghost").await.unwrap();
    assert_eq!(backend.deployed_names(), vec!["a"]);
}

#[tokio::test]
async fn test_delete_preconditions() {
    let backend = MockBackend::default();
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let err = registry.delete(&site(), "").await.unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));

    let mut blank = site();
    blank.id.clear();
    let err = registry.delete(&blank, "a").await.unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_reconcile_removes_only_undeclared() {
    let backend = MockBackend::with_deployed(&["a", "b", "c"]);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let removed = registry.reconcile(&site(), &declared(&["a", "b"])).await.unwrap();

    assert_eq!(removed, vec!["c"]);
    assert_eq!(backend.deployed_names(), vec!["a", "b"]);
    assert_eq!(backend.count("delete_function"), 1);
}

#[tokio::test]
async fn test_reconcile_with_superset_declared_deletes_nothing() {
    let backend = MockBackend::with_deployed(&["a", "b"]);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let removed = registry
        .reconcile(&site(), &declared(&["a", "b", "c"]))
        .await
        .unwrap();
    assert!(removed.is_empty());
    assert_eq!(backend.count("delete_function"), 0);
}

#[tokio::test]
async fn test_reconcile_attempts_every_deletion() {
    let mut backend = MockBackend::with_deployed(&["a", "b", "c", "d"]);
    backend.failing_deletes.insert("c".to_string());
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let err = registry.reconcile(&site(), &declared(&["a"])).await.unwrap_err();

    match &err {
        DeployError::Reconcile { failed, first } => {
            assert_eq!(*failed, 1);
            assert!(first.to_string().contains("delete function c"));
        }
        other => panic!("expected reconcile failure, got {:?}", other),
    }
    // b and d are gone even though c failed
    assert_eq!(backend.deployed_names(), vec!["a", "c"]);
    assert_eq!(backend.count("delete_function"), 3);
}

// ═══════════════════════════════════════════════════════════════════
// HOST, SETTINGS, KEYS
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_get_site_absent_is_none() {
    let backend = MockBackend::default().without_site();
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());
    assert!(registry.get_site("rg", "app").await.unwrap().is_none());

    let backend = MockBackend::default();
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());
    let found = registry.get_site("rg", "app").await.unwrap().unwrap();
    assert_eq!(found, site());
}

#[tokio::test]
async fn test_get_site_absent_with_plain_not_found_code() {
    let backend = MockBackend {
        not_found_code: "NotFound",
        ..MockBackend::default()
    }
    .without_site();
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    assert!(registry.get_site("rg", "app").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_app_setting_ignores_echo_without_properties() {
    let backend = MockBackend {
        settings_echo: Some(r#"{"id":"/sites/app/config/appsettings","name":"appsettings"}"#.into()),
        ..MockBackend::default()
    };
    backend
        .settings
        .lock()
        .unwrap()
        .set("FUNCTIONS_WORKER_RUNTIME", "node");
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let written = registry
        .update_app_setting(&site(), "WEBSITE_RUN_FROM_PACKAGE", "https://x?sig=1")
        .await
        .unwrap();

    assert_eq!(written.get("FUNCTIONS_WORKER_RUNTIME"), Some("node"));
    assert_eq!(written.get("WEBSITE_RUN_FROM_PACKAGE"), Some("https://x?sig=1"));
}

#[tokio::test]
async fn test_update_app_setting_preserves_others() {
    let backend = MockBackend::default();
    backend
        .settings
        .lock()
        .unwrap()
        .set("FUNCTIONS_WORKER_RUNTIME", "node");
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let written = registry
        .update_app_setting(&site(), "WEBSITE_RUN_FROM_PACKAGE", "https://x")
        .await
        .unwrap();

    assert_eq!(written.get("FUNCTIONS_WORKER_RUNTIME"), Some("node"));
    assert_eq!(written.get("WEBSITE_RUN_FROM_PACKAGE"), Some("https://x"));
    assert_eq!(backend.calls(), vec!["list_app_settings", "update_app_settings"]);
}

#[tokio::test]
async fn test_master_key_fetches_admin_token_first() {
    let backend = MockBackend::default();
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let key = registry.master_key(&site()).await.unwrap();
    assert_eq!(key.value, "secret");
    assert_eq!(
        backend.calls(),
        vec![
            "get_admin_token:app.scm.azurewebsites.net",
            "get_master_key:app.azurewebsites.net:admin-token",
        ]
    );
}

#[tokio::test]
async fn test_http_endpoints_for_declared_functions() {
    let backend = MockBackend::with_deployed(&["hello", "internal"]);
    let registry = FunctionRegistry::new(&backend, RetryPolicy::default());

    let endpoints = registry
        .http_endpoints(&site(), &declared(&["hello"]))
        .await
        .unwrap();

    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].url, "app.azurewebsites.net/api/hello");
    assert_eq!(endpoints[0].methods, vec!["GET", "POST"]);
}
