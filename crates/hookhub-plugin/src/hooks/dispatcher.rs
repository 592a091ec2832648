//! Hook dispatcher: threads a context through the plugin chain.
//!
//! Plugins run strictly one after another in registry order. Each call is
//! bounded by a timeout and guarded by the plugin's circuit breaker:
//! - An Open circuit skips the plugin without counting a failure.
//! - A failure, panic, timeout or context-contract violation is recorded
//!   against the circuit and the context is left as it was before that
//!   plugin.
//! - One plugin's failure never stops the chain.
//! - A plugin reloaded after the chain was snapshotted is called through its
//!   new instance; one unloaded meanwhile is skipped.
//!
//! Cancellation drops the in-flight call, runs no further plugins and
//! returns the last successfully produced context.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::OwnedRwLockReadGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hookhub_core::config::DispatchConfig;

use super::definitions::{HookContext, HookPoint};
use crate::circuit::{Admission, TrialSlot};
use crate::error::PluginError;
use crate::registry::{HookTarget, PluginRegistry};

/// Why a plugin was not invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The plugin's circuit is open (or its single trial is already running).
    CircuitOpen,
    /// The dispatch was cancelled before or during this plugin's call.
    Cancelled,
    /// The plugin was unloaded after the chain was snapshotted.
    Unloaded,
}

/// A plugin skipped during dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPlugin {
    /// Plugin name.
    pub plugin: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A plugin failure captured during dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct HookFailure {
    /// Plugin name.
    pub plugin: String,
    /// The captured error.
    pub error: PluginError,
}

/// Result of running one hook chain.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Hook that was dispatched.
    pub hook: String,
    /// The context after all eligible plugins ran.
    pub context: HookContext,
    /// Plugins invoked, in order, including those that failed.
    pub invoked: Vec<String>,
    /// Plugins not invoked.
    pub skipped: Vec<SkippedPlugin>,
    /// Failures recorded against circuits.
    pub failures: Vec<HookFailure>,
    /// Whether the dispatch was cancelled.
    pub cancelled: bool,
}

impl DispatchOutcome {
    fn empty(hook: &str, context: HookContext) -> Self {
        Self {
            hook: hook.to_string(),
            context,
            invoked: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Whether every eligible plugin ran successfully.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Dispatches hooks to registered plugins.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Per-call timeout when the descriptor has no override.
    default_timeout: Duration,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<PluginRegistry>, config: &DispatchConfig) -> Self {
        Self {
            registry,
            default_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Runs `hook` across all eligible plugins.
    pub async fn execute_hook(&self, hook: &str, context: HookContext) -> DispatchOutcome {
        self.execute_hook_with_cancel(hook, context, &CancellationToken::new())
            .await
    }

    /// Runs a well-known hook point.
    pub async fn fire(&self, point: HookPoint, context: HookContext) -> DispatchOutcome {
        self.execute_hook(point.as_str(), context).await
    }

    /// Runs `hook`, stopping early when `cancel` fires.
    pub async fn execute_hook_with_cancel(
        &self,
        hook: &str,
        context: HookContext,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let targets = self.registry.list_by_hook(hook).await;
        let mut outcome = DispatchOutcome::empty(hook, context);

        if targets.is_empty() {
            return outcome;
        }

        debug!(hook = %hook, plugin_count = targets.len(), "Dispatching hook");

        for (index, snapshot) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.mark_cancelled(&targets[index..]);
                break;
            }

            let Some((target, _in_flight)) = self.enter(hook, snapshot).await else {
                debug!(hook = %hook, plugin = %snapshot.name, "Plugin unloaded, skipping");
                outcome.skipped.push(SkippedPlugin {
                    plugin: snapshot.name.clone(),
                    reason: SkipReason::Unloaded,
                });
                continue;
            };

            let admission = target.circuit.lock().admit(Instant::now());
            if admission == Admission::Rejected {
                debug!(hook = %hook, plugin = %target.name, "Circuit open, skipping plugin");
                outcome.skipped.push(SkippedPlugin {
                    plugin: target.name.clone(),
                    reason: SkipReason::CircuitOpen,
                });
                continue;
            }
            let trial = (admission == Admission::Trial)
                .then(|| TrialSlot::new(target.circuit.clone()));

            let timeout = target.timeout.unwrap_or(self.default_timeout);
            let call = AssertUnwindSafe(target.instance.call_hook(hook, outcome.context.clone()))
                .catch_unwind();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(timeout, call) => Some(result),
            };

            // Dropping `trial` here hands the slot back.
            let Some(result) = result else {
                info!(hook = %hook, plugin = %target.name, "Dispatch cancelled mid-call");
                outcome.mark_cancelled(&targets[index..]);
                break;
            };

            outcome.invoked.push(target.name.clone());

            let failure = match result {
                Ok(Ok(Ok(next))) => match next.check_contract(hook) {
                    Ok(()) => {
                        target.circuit.lock().record_success();
                        if let Some(trial) = trial {
                            trial.settle();
                        }
                        outcome.context = next;
                        debug!(hook = %hook, plugin = %target.name, "Plugin completed");
                        continue;
                    }
                    Err(reason) => PluginError::ContextContract {
                        plugin: target.name.clone(),
                        hook: hook.to_string(),
                        reason,
                    },
                },
                Ok(Ok(Err(e))) => match e {
                    e @ PluginError::HookInvocation { .. } => e,
                    other => PluginError::hook(&target.name, hook, other.to_string()),
                },
                Ok(Err(panic)) => PluginError::hook(
                    &target.name,
                    hook,
                    format!("panicked: {}", panic_message(panic.as_ref())),
                ),
                Err(_) => PluginError::Timeout {
                    plugin: target.name.clone(),
                    hook: hook.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                },
            };

            target.circuit.lock().record_failure(Instant::now());
            if let Some(trial) = trial {
                trial.settle();
            }
            warn!(
                hook = %hook,
                plugin = %target.name,
                error = %failure,
                "Plugin failed, continuing with unchanged context"
            );
            outcome.failures.push(HookFailure {
                plugin: target.name.clone(),
                error: failure,
            });
        }

        outcome
    }

    /// Holds the target's call gate for one call. A target retired since the
    /// snapshot is re-resolved to its current instance, if any.
    async fn enter(
        &self,
        hook: &str,
        snapshot: &HookTarget,
    ) -> Option<(HookTarget, OwnedRwLockReadGuard<bool>)> {
        let gate = snapshot.gate.clone().read_owned().await;
        if !*gate {
            return Some((snapshot.clone(), gate));
        }
        drop(gate);

        let current = self.registry.target(&snapshot.name, hook).await?;
        let gate = current.gate.clone().read_owned().await;
        (!*gate).then_some((current, gate))
    }

    /// Returns a reference to the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl DispatchOutcome {
    fn mark_cancelled(&mut self, remaining: &[HookTarget]) {
        self.cancelled = true;
        self.skipped.extend(remaining.iter().map(|target| SkippedPlugin {
            plugin: target.name.clone(),
            reason: SkipReason::Cancelled,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitState;
    use crate::contract::{Plugin, PluginConfig};
    use crate::error::PluginResult;
    use crate::registry::PluginDescriptor;
    use async_trait::async_trait;
    use hookhub_core::config::CircuitConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Scripted {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Option<Duration>,
        bad_output: bool,
        panics: bool,
        in_call: AtomicBool,
        shutdowns: AtomicUsize,
        shut_down_mid_call: AtomicBool,
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn hooks(&self) -> Vec<String> {
            vec!["before_request".to_string()]
        }

        async fn initialize(&self, _config: PluginConfig) -> PluginResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> PluginResult<()> {
            if self.in_call.load(Ordering::SeqCst) {
                self.shut_down_mid_call.store(true, Ordering::SeqCst);
            }
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn call_hook(&self, hook: &str, context: HookContext) -> PluginResult<HookContext> {
            if self.shutdowns.load(Ordering::SeqCst) > 0 {
                return Err(PluginError::hook("scripted", hook, "called after shutdown"));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.in_call.store(true, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_call.store(false, Ordering::SeqCst);
            if self.panics {
                panic!("scripted panic");
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(PluginError::hook("scripted", hook, "scripted failure"));
            }
            if self.bad_output {
                return Ok(context.with_int("path", 7));
            }
            let mut trail = context
                .get("trail")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            trail.push(json!(n));
            Ok(context.with_data("trail", json!(trail)))
        }
    }

    struct Harness {
        registry: Arc<PluginRegistry>,
        dispatcher: HookDispatcher,
    }

    fn harness() -> Harness {
        let circuit = CircuitConfig {
            failure_threshold: 3,
            cooldown_seconds: 10,
        };
        let dispatch = DispatchConfig {
            timeout_ms: 1_000,
            ..Default::default()
        };
        let registry = Arc::new(PluginRegistry::new(&circuit, &dispatch));
        let dispatcher = HookDispatcher::new(registry.clone(), &dispatch);
        Harness {
            registry,
            dispatcher,
        }
    }

    async fn add(h: &Harness, name: &str, priority: i32, plugin: Arc<Scripted>) {
        let descriptor =
            PluginDescriptor::new(name, "1.0.0", vec!["before_request".to_string()])
                .with_priority(priority);
        h.registry
            .register(descriptor, plugin)
            .await
            .expect("register");
    }

    fn slow(millis: u64) -> Arc<Scripted> {
        Arc::new(Scripted {
            delay: Some(Duration::from_millis(millis)),
            ..Default::default()
        })
    }

    fn trail_len(outcome: &DispatchOutcome) -> usize {
        outcome
            .context
            .get("trail")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_chain_threads_context_in_priority_order() {
        let h = harness();
        add(&h, "second", 20, Arc::new(Scripted::default())).await;
        add(&h, "first", 10, Arc::new(Scripted::default())).await;

        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new().with_string("path", "/"))
            .await;

        assert_eq!(outcome.invoked, vec!["first", "second"]);
        assert_eq!(trail_len(&outcome), 2);
        assert_eq!(outcome.context.get_str("path"), Some("/"));
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_failure_mid_chain_keeps_context_and_continues() {
        let h = harness();
        let broken = Arc::new(Scripted::default());
        broken.failing.store(true, Ordering::SeqCst);
        add(&h, "a", 1, Arc::new(Scripted::default())).await;
        add(&h, "broken", 2, broken).await;
        add(&h, "c", 3, Arc::new(Scripted::default())).await;

        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;

        assert_eq!(outcome.invoked, vec!["a", "broken", "c"]);
        assert_eq!(trail_len(&outcome), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].plugin, "broken");
    }

    #[tokio::test]
    async fn test_contract_violation_counts_as_failure() {
        let h = harness();
        let sloppy = Arc::new(Scripted {
            bad_output: true,
            ..Default::default()
        });
        add(&h, "sloppy", 1, sloppy).await;

        let initial = HookContext::new().with_string("path", "/ok");
        let outcome = h
            .dispatcher
            .execute_hook("before_request", initial.clone())
            .await;

        assert_eq!(outcome.context, initial);
        assert!(matches!(
            outcome.failures[0].error,
            PluginError::ContextContract { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_skips_then_recovers() {
        let h = harness();
        let flaky = Arc::new(Scripted::default());
        flaky.failing.store(true, Ordering::SeqCst);
        add(&h, "flaky", 1, flaky.clone()).await;

        for _ in 0..3 {
            h.dispatcher
                .execute_hook("before_request", HookContext::new())
                .await;
        }
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        let snapshot = h.registry.circuit("flaky").await.expect("circuit");
        assert_eq!(snapshot.state, CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;
        assert!(outcome.invoked.is_empty());
        assert_eq!(outcome.skipped[0].reason, SkipReason::CircuitOpen);
        assert!(outcome.failures.is_empty());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_secs(6)).await;
        flaky.failing.store(false, Ordering::SeqCst);
        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;
        assert_eq!(outcome.invoked, vec!["flaky"]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
        let snapshot = h.registry.circuit("flaky").await.expect("circuit");
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let h = harness();
        let slow = Arc::new(Scripted {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        add(&h, "slow", 1, slow).await;
        add(&h, "fast", 2, Arc::new(Scripted::default())).await;

        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;

        assert!(matches!(
            outcome.failures[0].error,
            PluginError::Timeout { timeout_ms: 1_000, .. }
        ));
        assert_eq!(outcome.invoked, vec!["slow", "fast"]);
        assert_eq!(trail_len(&outcome), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_last_good_context() {
        let h = harness();
        let slow = Arc::new(Scripted {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let after = Arc::new(Scripted::default());
        add(&h, "quick", 1, Arc::new(Scripted::default())).await;
        add(&h, "slow", 2, slow).await;
        add(&h, "after", 3, after.clone()).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = h
            .dispatcher
            .execute_hook_with_cancel("before_request", HookContext::new(), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.invoked, vec!["quick"]);
        assert_eq!(trail_len(&outcome), 1);
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_call_frees_the_slot() {
        let h = harness();
        let flaky = slow(500);
        flaky.failing.store(true, Ordering::SeqCst);
        add(&h, "flaky", 1, flaky.clone()).await;

        for _ in 0..3 {
            h.dispatcher
                .execute_hook("before_request", HookContext::new())
                .await;
        }
        tokio::time::advance(Duration::from_secs(11)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            h.dispatcher.execute_hook("before_request", HookContext::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
        let snapshot = h.registry.circuit("flaky").await.expect("circuit");
        assert_eq!(snapshot.state, CircuitState::HalfOpen);

        flaky.failing.store(false, Ordering::SeqCst);
        let outcome = h
            .dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;
        assert_eq!(outcome.invoked, vec!["flaky"]);
        assert!(outcome.is_clean());
        let snapshot = h.registry.circuit("flaky").await.expect("circuit");
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_panicking_plugin_is_a_failure() {
        let h = harness();
        let after = Arc::new(Scripted::default());
        add(
            &h,
            "panicky",
            1,
            Arc::new(Scripted {
                panics: true,
                ..Default::default()
            }),
        )
        .await;
        add(&h, "after", 2, after.clone()).await;

        let initial = HookContext::new().with_string("path", "/");
        let outcome = h
            .dispatcher
            .execute_hook("before_request", initial)
            .await;

        assert_eq!(outcome.invoked, vec!["panicky", "after"]);
        assert_eq!(after.calls.load(Ordering::SeqCst), 1);
        assert_eq!(trail_len(&outcome), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].plugin, "panicky");
        match &outcome.failures[0].error {
            PluginError::HookInvocation { reason, .. } => {
                assert!(reason.contains("scripted panic"))
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        let snapshot = h.registry.circuit("panicky").await.expect("circuit");
        assert_eq!(snapshot.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_waits_for_in_flight_call() {
        let h = harness();
        let old = slow(500);
        add(&h, "a", 1, old.clone()).await;
        let fresh = Arc::new(Scripted::default());
        let replacement = fresh.clone();

        let (outcome, swapped) = tokio::join!(
            h.dispatcher.execute_hook("before_request", HookContext::new()),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                h.registry
                    .swap("a", |descriptor| async move {
                        Ok::<_, PluginError>((descriptor, replacement as Arc<dyn Plugin>))
                    })
                    .await
            }
        );

        swapped.expect("swap");
        assert!(outcome.is_clean());
        assert_eq!(outcome.invoked, vec!["a"]);
        assert_eq!(old.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!old.shut_down_mid_call.load(Ordering::SeqCst));

        h.dispatcher
            .execute_hook("before_request", HookContext::new())
            .await;
        assert_eq!(old.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fresh.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugin_swapped_mid_chain_runs_new_instance() {
        let h = harness();
        let old = Arc::new(Scripted::default());
        add(&h, "a", 1, slow(500)).await;
        add(&h, "b", 2, old.clone()).await;
        let fresh = Arc::new(Scripted::default());
        let replacement = fresh.clone();

        let (outcome, swapped) = tokio::join!(
            h.dispatcher.execute_hook("before_request", HookContext::new()),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                h.registry
                    .swap("b", |descriptor| async move {
                        Ok::<_, PluginError>((descriptor, replacement as Arc<dyn Plugin>))
                    })
                    .await
            }
        );

        swapped.expect("swap");
        assert!(outcome.is_clean());
        assert_eq!(outcome.invoked, vec!["a", "b"]);
        assert_eq!(old.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fresh.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugin_unloaded_mid_chain_is_skipped() {
        let h = harness();
        let gone = Arc::new(Scripted::default());
        add(&h, "a", 1, slow(500)).await;
        add(&h, "b", 2, gone.clone()).await;

        let (outcome, removed) = tokio::join!(
            h.dispatcher.execute_hook("before_request", HookContext::new()),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                h.registry.unregister("b").await
            }
        );

        removed.expect("unregister");
        assert_eq!(outcome.invoked, vec!["a"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].plugin, "b");
        assert_eq!(outcome.skipped[0].reason, SkipReason::Unloaded);
        assert_eq!(gone.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_hook_returns_context_untouched() {
        let h = harness();
        add(&h, "a", 1, Arc::new(Scripted::default())).await;

        let initial = HookContext::new().with_bool("flag", true);
        let outcome = h
            .dispatcher
            .execute_hook("nobody_listens", initial.clone())
            .await;
        assert_eq!(outcome.context, initial);
        assert!(outcome.invoked.is_empty());
    }
}
