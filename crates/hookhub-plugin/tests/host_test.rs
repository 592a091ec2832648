//! Integration tests for dispatch through the plugin host.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use hookhub_core::config::AppConfig;
use hookhub_plugin::CircuitState;
use hookhub_plugin::prelude::*;
use tokio_util::sync::CancellationToken;

use common::{Counters, host, tagger_manifest, trail, write_manifest};

#[derive(Debug)]
struct Stamp;

#[async_trait]
impl Plugin for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn hooks(&self) -> Vec<String> {
        hook_names![HookPoint::OnStartup, HookPoint::OnShutdown]
    }

    async fn initialize(&self, _config: PluginConfig) -> PluginResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn call_hook(&self, hook: &str, context: HookContext) -> PluginResult<HookContext> {
        Ok(context.with_string("last_hook", hook))
    }
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_skips_and_recovers_through_host() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_manifest(temp.path(), "a.toml", &tagger_manifest("flaky", 10, "f"));

    let counters = Arc::new(Counters::default());
    let host = host(&AppConfig::default(), counters.clone());
    host.load_plugins(temp.path()).await.expect("load");

    counters.fail_hooks.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        let outcome = host
            .execute_hook("before_request", HookContext::new())
            .await
            .expect("ready");
        assert_eq!(outcome.failures.len(), 1);
        assert!(trail(&outcome.context).is_empty());
    }

    let circuit = host.registry().circuit("flaky").await.expect("circuit");
    assert_eq!(circuit.state, CircuitState::Open);

    tokio::time::advance(Duration::from_secs(5)).await;
    let calls_before = counters.calls.load(Ordering::SeqCst);
    let outcome = host
        .execute_hook("before_request", HookContext::new())
        .await
        .expect("ready");
    assert!(outcome.invoked.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(counters.calls.load(Ordering::SeqCst), calls_before);

    tokio::time::advance(Duration::from_secs(6)).await;
    counters.fail_hooks.store(false, Ordering::SeqCst);
    let outcome = host
        .execute_hook("before_request", HookContext::new())
        .await
        .expect("ready");
    assert_eq!(outcome.invoked, vec!["flaky"]);
    assert!(outcome.is_clean());

    let circuit = host.registry().circuit("flaky").await.expect("circuit");
    assert_eq!(circuit.state, CircuitState::Closed);
    assert_eq!(circuit.consecutive_failures, 0);
}

#[tokio::test]
async fn test_install_makes_host_ready_and_fires_lifecycle_hooks() {
    let host = host(&AppConfig::default(), Arc::new(Counters::default()));
    host.install("stamp", Arc::new(Stamp), 5, PluginConfig::default())
        .await
        .expect("install");

    let outcome = host
        .fire(HookPoint::OnStartup, HookContext::new())
        .await
        .expect("ready");
    assert_eq!(outcome.invoked, vec!["stamp"]);
    assert_eq!(outcome.context.get_str("last_hook"), Some("on_startup"));

    // Not subscribed to before_request: context passes through untouched.
    let outcome = host
        .execute_hook("before_request", HookContext::new().with_int("n", 1))
        .await
        .expect("ready");
    assert!(outcome.invoked.is_empty());
    assert_eq!(outcome.context.get_i64("n"), Some(1));
}

/// Never finishes shutting down.
#[derive(Debug)]
struct Stuck;

#[async_trait]
impl Plugin for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn hooks(&self) -> Vec<String> {
        hook_names![HookPoint::OnStartup]
    }

    async fn initialize(&self, _config: PluginConfig) -> PluginResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        std::future::pending().await
    }

    async fn call_hook(&self, _hook: &str, context: HookContext) -> PluginResult<HookContext> {
        Ok(context)
    }
}

#[tokio::test]
async fn test_install_rejects_duplicate_name() {
    let host = host(&AppConfig::default(), Arc::new(Counters::default()));
    host.install("stamp", Arc::new(Stamp), 5, PluginConfig::default())
        .await
        .expect("install");
    let again = host
        .install("stamp", Arc::new(Stamp), 1, PluginConfig::default())
        .await;
    assert!(matches!(again, Err(PluginError::DuplicateName(_))));
    assert_eq!(host.list_plugins().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_install_bounds_shutdown_of_the_loser() {
    let host = host(&AppConfig::default(), Arc::new(Counters::default()));
    host.install("stamp", Arc::new(Stamp), 5, PluginConfig::default())
        .await
        .expect("install");

    let again = tokio::time::timeout(
        Duration::from_secs(60),
        host.install("stamp", Arc::new(Stuck), 1, PluginConfig::default()),
    )
    .await
    .expect("install returns once the lifecycle timeout expires");

    assert!(matches!(again, Err(PluginError::DuplicateName(_))));
    assert_eq!(host.list_plugins().await.len(), 1);
}

#[tokio::test]
async fn test_disable_enable_and_priority_change_reorder_chain() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_manifest(temp.path(), "a.toml", &tagger_manifest("alpha", 10, "a"));
    write_manifest(temp.path(), "b.toml", &tagger_manifest("bravo", 20, "b"));

    let host = host(&AppConfig::default(), Arc::new(Counters::default()));
    host.load_plugins(temp.path()).await.expect("load");

    host.disable("alpha").await.expect("disable");
    let outcome = host
        .execute_hook("after_request", HookContext::new())
        .await
        .expect("ready");
    assert_eq!(outcome.invoked, vec!["bravo"]);

    host.enable("alpha").await.expect("enable");
    host.set_priority("alpha", 30).await.expect("priority");
    let outcome = host
        .execute_hook("after_request", HookContext::new())
        .await
        .expect("ready");
    assert_eq!(outcome.invoked, vec!["bravo", "alpha"]);
    assert_eq!(trail(&outcome.context), vec!["b#1", "a#0"]);
}

#[tokio::test]
async fn test_cancelled_dispatch_returns_input_context() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_manifest(temp.path(), "a.toml", &tagger_manifest("alpha", 10, "a"));

    let host = host(&AppConfig::default(), Arc::new(Counters::default()));
    host.load_plugins(temp.path()).await.expect("load");

    let token = CancellationToken::new();
    token.cancel();
    let outcome = host
        .execute_hook_with_cancel(
            "before_request",
            HookContext::new().with_string("path", "/x"),
            &token,
        )
        .await
        .expect("ready");

    assert!(outcome.cancelled);
    assert!(outcome.invoked.is_empty());
    assert_eq!(outcome.context.get_str("path"), Some("/x"));
    assert!(trail(&outcome.context).is_empty());
}

#[tokio::test]
async fn test_unload_all_shuts_down_every_plugin() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_manifest(temp.path(), "a.toml", &tagger_manifest("alpha", 10, "a"));
    write_manifest(temp.path(), "b.toml", &tagger_manifest("bravo", 20, "b"));

    let counters = Arc::new(Counters::default());
    let host = host(&AppConfig::default(), counters.clone());
    host.load_plugins(temp.path()).await.expect("load");

    let errors = host.unload_all().await;
    assert!(errors.is_empty());
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 2);
    assert!(host.list_plugins().await.is_empty());
}
