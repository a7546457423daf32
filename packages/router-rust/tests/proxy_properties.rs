//! End-to-end behavior of `InvocationProxy`: selection, fallback policies,
//! deadlines, cancellation, scope lifetime, and telemetry.

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use support::{
    catalog, modes_selecting, registration, Behavior, CountingScopes, GreetError, Greeter, Recorder,
};
use switchyard_core::{
    modes, InMemoryConfiguration, InMemoryFlags, ManualClock, OnErrorPolicy, SelectionContext, SelectionError,
    SelectionModeProvider, SelectionModeRegistry, TimeoutAction, TimeoutPolicy, TimeoutScope, TrialRegistration,
};
use switchyard_router::{
    CircuitBreakerConfig, CircuitBreakerFactory, ImplementationCatalog, InvocationProxy,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const ADA: &str = "Ada";

fn proxy(
    registration: TrialRegistration,
    selected: &str,
    catalog: ImplementationCatalog<dyn Greeter>,
    recorder: &Recorder,
) -> InvocationProxy<dyn Greeter> {
    InvocationProxy::<dyn Greeter>::builder(registration, modes_selecting(selected), Arc::new(catalog))
        .telemetry(recorder.clone())
        .build()
}

// ---------------------------------------------------------------------------
// On-error policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn throw_surfaces_implementation_error_verbatim() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Fail)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::Throw)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Failed("B".into()));
    assert_eq!(*log.lock(), vec!["B"]);
    assert_eq!(
        recorder.events(),
        vec![
            "variant b provider",
            "attempt_failure b implementation",
            "failure implementation",
            "dispose",
        ]
    );
}

#[tokio::test]
async fn redirect_to_default_invokes_default_once() {
    let (catalog, log) = catalog(&[("A", Behavior::Fail), ("B", Behavior::Fail)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::RedirectToDefault)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Failed("A".into()));
    assert_eq!(*log.lock(), vec!["B", "A"]);
    assert_eq!(recorder.fallbacks(), vec!["a"]);
}

#[tokio::test]
async fn redirect_to_default_does_not_retry_a_failing_default() {
    let (catalog, log) = catalog(&[("A", Behavior::Fail), ("B", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::RedirectToDefault)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "a", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Failed("A".into()));
    assert_eq!(*log.lock(), vec!["A"]);
    assert!(recorder.fallbacks().is_empty());
}

#[tokio::test]
async fn redirect_to_specific_recovers() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Fail), ("C", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b", "c"])
        .on_error(OnErrorPolicy::RedirectToSpecific("c".into()))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let greeting = proxy.greet(ADA.to_string()).await.unwrap();

    assert_eq!(greeting, "C greets Ada");
    assert_eq!(*log.lock(), vec!["B", "C"]);
    assert_eq!(recorder.fallbacks(), vec!["c"]);
    assert!(recorder.events().contains(&"success".to_string()));
}

#[tokio::test]
async fn redirect_ordered_walks_the_list_once() {
    let (catalog, log) = catalog(&[
        ("A", Behavior::Succeed),
        ("B", Behavior::Fail),
        ("C", Behavior::Fail),
        ("D", Behavior::Fail),
    ]);
    let registration = registration("a", &["a", "b", "c", "d"])
        .on_error(OnErrorPolicy::RedirectOrdered(vec!["c".into(), "d".into()]))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Failed("D".into()));
    assert_eq!(*log.lock(), vec!["B", "C", "D"]);
    assert_eq!(recorder.fallbacks(), vec!["c", "d"]);
}

#[tokio::test]
async fn redirect_ordered_stops_at_the_first_success() {
    let (catalog, log) = catalog(&[
        ("A", Behavior::Succeed),
        ("B", Behavior::Fail),
        ("C", Behavior::Fail),
        ("D", Behavior::Succeed),
    ]);
    let registration = registration("a", &["a", "b", "c", "d"])
        .on_error(OnErrorPolicy::RedirectOrdered(vec!["c".into(), "d".into()]))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let greeting = proxy.greet(ADA.to_string()).await.unwrap();

    assert_eq!(greeting, "D greets Ada");
    assert_eq!(*log.lock(), vec!["B", "C", "D"]);
    assert_eq!(recorder.fallbacks(), vec!["c", "d"]);
    assert_eq!(recorder.events().last().map(String::as_str), Some("dispose"));
    assert!(recorder.events().contains(&"success".to_string()));
}

#[tokio::test]
async fn redirect_ordered_skips_the_failed_key() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Fail), ("C", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b", "c"])
        .on_error(OnErrorPolicy::RedirectOrdered(vec!["b".into(), "c".into()]))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let greeting = proxy.greet(ADA.to_string()).await.unwrap();

    assert_eq!(greeting, "C greets Ada");
    assert_eq!(*log.lock(), vec!["B", "C"]);
}

#[tokio::test]
async fn redirect_to_any_returns_the_last_error() {
    let (catalog, log) = catalog(&[("A", Behavior::Fail), ("B", Behavior::Fail), ("C", Behavior::Fail)]);
    let registration = registration("a", &["a", "b", "c"])
        .on_error(OnErrorPolicy::RedirectToAny)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Failed("C".into()));
    assert_eq!(*log.lock(), vec!["B", "A", "C"]);
    assert_eq!(recorder.fallbacks(), vec!["a", "c"]);
}

#[tokio::test]
async fn resolution_failure_follows_the_error_policy() {
    // "B" is registered in the trial but missing from the catalog.
    let (catalog, log) = catalog(&[("A", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::RedirectToDefault)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let greeting = proxy.greet(ADA.to_string()).await.unwrap();

    assert_eq!(greeting, "A greets Ada");
    assert_eq!(*log.lock(), vec!["A"]);
    assert!(recorder
        .events()
        .contains(&"attempt_failure b resolution".to_string()));
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boolean_flag_selects_by_flag_state() {
    let (catalog, log) = catalog(&[("Classic", Behavior::Succeed), ("Friendly", Behavior::Succeed)]);
    let registration = TrialRegistration::builder("greeter")
        .mode(modes::BOOLEAN_FLAG, "new-greeting")
        .default_trial("false", "Classic")
        .trial("true", "Friendly")
        .build()
        .unwrap();
    let flags = Arc::new(InMemoryFlags::new());
    let modes = Arc::new(SelectionModeRegistry::with_defaults(
        flags.clone(),
        Arc::new(InMemoryConfiguration::new()),
    ));
    let proxy = InvocationProxy::<dyn Greeter>::builder(registration, modes, Arc::new(catalog)).build();

    flags.set("new-greeting", true);
    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "Friendly greets Ada");

    flags.set("new-greeting", false);
    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "Classic greets Ada");

    flags.remove("new-greeting");
    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "Classic greets Ada");

    assert_eq!(*log.lock(), vec!["Friendly", "Classic", "Classic"]);
}

#[tokio::test]
async fn unknown_selected_key_uses_default() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b"]).build().unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "zzz", catalog, &recorder);

    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "A greets Ada");
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(recorder.events()[0], "variant a default");
}

struct PanickingMode;

#[async_trait]
impl SelectionModeProvider for PanickingMode {
    async fn select_key(&self, _ctx: &SelectionContext<'_>) -> Result<Option<String>, SelectionError> {
        panic!("selection mode consulted for an inactive trial");
    }
}

#[tokio::test]
async fn inactive_window_never_consults_the_mode() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Succeed)]);
    let registration = TrialRegistration::builder("greeter")
        .mode("panicking", "greeter")
        .default_trial("a", "A")
        .trial("b", "B")
        .active_until(1_000)
        .build()
        .unwrap();
    let modes = SelectionModeRegistry::new();
    modes.register("panicking", PanickingMode);
    let recorder = Recorder::default();
    let proxy = InvocationProxy::<dyn Greeter>::builder(registration, Arc::new(modes), Arc::new(catalog))
        .clock(Arc::new(ManualClock::new(5_000)))
        .telemetry(recorder.clone())
        .build();

    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "A greets Ada");
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(recorder.events()[0], "variant a inactive (after_end)");
}

#[tokio::test]
async fn rejecting_predicate_uses_default() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Succeed)]);
    let registration = registration("a", &["a", "b"])
        .activation_predicate(|_ctx| false)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "A greets Ada");
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(recorder.events()[0], "variant a inactive (predicate_rejected)");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_keep_their_own_arguments() {
    let (catalog, _log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Succeed), ("C", Behavior::Succeed)]);
    let registration = TrialRegistration::builder("greeter")
        .mode(modes::RANDOM, "greeter")
        .default_trial("a", "A")
        .trial("b", "B")
        .trial("c", "C")
        .build()
        .unwrap();
    let scopes = Arc::new(CountingScopes::new(catalog));
    let proxy = Arc::new(
        InvocationProxy::<dyn Greeter>::builder(registration, modes_selecting("a"), scopes.clone()).build(),
    );

    let mut handles = Vec::new();
    for caller in 0..100 {
        let proxy = Arc::clone(&proxy);
        handles.push(tokio::spawn(async move {
            let marker = format!("caller-{caller}");
            let greeting = proxy.greet(marker.clone()).await.unwrap();
            (marker, greeting)
        }));
    }
    for handle in handles {
        let (marker, greeting) = handle.await.unwrap();
        assert!(greeting.ends_with(&format!(" greets {marker}")), "{greeting}");
    }

    assert_eq!(scopes.created(), 100);
    assert_eq!(scopes.disposed(), 100);
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_falls_back_to_default_within_budget() {
    let (catalog, log) = catalog(&[("A", Behavior::Delay(Duration::from_millis(10))), ("B", Behavior::Hang)]);
    let registration = registration("a", &["a", "b"])
        .timeout(TimeoutPolicy::new(Duration::from_millis(50), TimeoutAction::FallbackToDefault))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let started = Instant::now();
    let greeting = proxy.greet(ADA.to_string()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(greeting, "A greets Ada");
    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(100), "{elapsed:?}");
    assert_eq!(*log.lock(), vec!["B", "A"]);
    assert_eq!(
        recorder.events(),
        vec![
            "variant b provider",
            "attempt_failure b timeout",
            "fallback a",
            "success",
            "dispose",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_with_throw_action_fails_the_call() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Hang)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::RedirectToDefault)
        .timeout(TimeoutPolicy::new(Duration::from_millis(50), TimeoutAction::Throw))
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = proxy(registration, "b", catalog, &recorder);

    let error = proxy.greet(ADA.to_string()).await.unwrap_err();

    assert_eq!(error, GreetError::Routing("attempt on `b` timed out after 50ms".into()));
    assert_eq!(*log.lock(), vec!["B"]);
}

fn deadline_scope_registration(scope: TimeoutScope) -> TrialRegistration {
    registration("a", &["a", "b", "c"])
        .on_error(OnErrorPolicy::RedirectToSpecific("c".into()))
        .timeout(
            TimeoutPolicy::new(Duration::from_millis(50), TimeoutAction::FallbackToDefault).with_scope(scope),
        )
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn whole_sequence_deadline_covers_fallbacks() {
    let (catalog, log) = catalog(&[
        ("A", Behavior::Succeed),
        ("B", Behavior::Fail),
        ("C", Behavior::Delay(Duration::from_millis(80))),
    ]);
    let recorder = Recorder::default();
    let proxy = proxy(deadline_scope_registration(TimeoutScope::WholeSequence), "b", catalog, &recorder);

    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "A greets Ada");
    assert_eq!(*log.lock(), vec!["B", "C", "A"]);
    assert_eq!(recorder.fallbacks(), vec!["c", "a"]);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_deadline_leaves_fallbacks_unbounded() {
    let (catalog, log) = catalog(&[
        ("A", Behavior::Succeed),
        ("B", Behavior::Fail),
        ("C", Behavior::Delay(Duration::from_millis(80))),
    ]);
    let recorder = Recorder::default();
    let proxy = proxy(deadline_scope_registration(TimeoutScope::FirstAttempt), "b", catalog, &recorder);

    assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "C greets Ada");
    assert_eq!(*log.lock(), vec!["B", "C"]);
}

// ---------------------------------------------------------------------------
// Cancellation and scope lifetime
// ---------------------------------------------------------------------------

fn counted_proxy(
    behaviors: &[(&'static str, Behavior)],
    policy: OnErrorPolicy,
    recorder: &Recorder,
) -> (InvocationProxy<dyn Greeter>, Arc<CountingScopes>, support::CallLog) {
    let (catalog, log) = catalog(behaviors);
    let registration = registration("a", &["a", "b"]).on_error(policy).build().unwrap();
    let scopes = Arc::new(CountingScopes::new(catalog));
    let proxy = InvocationProxy::<dyn Greeter>::builder(registration, modes_selecting("b"), scopes.clone())
        .telemetry(recorder.clone())
        .build();
    (proxy, scopes, log)
}

#[tokio::test]
async fn every_scope_is_disposed_on_success_and_failure() {
    let recorder = Recorder::default();
    let (proxy, scopes, _log) = counted_proxy(
        &[("A", Behavior::Succeed), ("B", Behavior::Fail)],
        OnErrorPolicy::RedirectToDefault,
        &recorder,
    );
    proxy.greet(ADA.to_string()).await.unwrap();
    assert_eq!((scopes.created(), scopes.disposed()), (2, 2));

    let (proxy, scopes, _log) = counted_proxy(
        &[("A", Behavior::Fail), ("B", Behavior::Fail)],
        OnErrorPolicy::RedirectToDefault,
        &recorder,
    );
    proxy.greet(ADA.to_string()).await.unwrap_err();
    assert_eq!((scopes.created(), scopes.disposed()), (2, 2));
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_stops_without_fallback() {
    let recorder = Recorder::default();
    let (proxy, scopes, log) = counted_proxy(
        &[("A", Behavior::Succeed), ("B", Behavior::Hang)],
        OnErrorPolicy::RedirectToDefault,
        &recorder,
    );
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result: Result<String, GreetError> = proxy
        .invoke_with_cancellation("greet", token, |greeter: Arc<dyn Greeter>, _token| async move {
            greeter.greet(ADA.to_string()).await
        })
        .await;

    assert_eq!(result.unwrap_err(), GreetError::Routing("invocation cancelled".into()));
    assert_eq!(*log.lock(), vec!["B"]);
    assert_eq!((scopes.created(), scopes.disposed()), (1, 1));
    assert_eq!(recorder.events().last().map(String::as_str), Some("dispose"));
    assert!(recorder.events().contains(&"failure cancelled".to_string()));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_call_disposes_its_scope() {
    let recorder = Recorder::default();
    let (proxy, scopes, _log) = counted_proxy(
        &[("A", Behavior::Succeed), ("B", Behavior::Hang)],
        OnErrorPolicy::RedirectToDefault,
        &recorder,
    );

    let abandoned = tokio::time::timeout(Duration::from_millis(10), proxy.greet(ADA.to_string())).await;

    assert!(abandoned.is_err());
    assert_eq!((scopes.created(), scopes.disposed()), (1, 1));
    assert_eq!(recorder.events(), vec!["variant b provider", "dispose"]);
}

#[tokio::test]
async fn pre_cancelled_call_touches_nothing() {
    let recorder = Recorder::default();
    let (proxy, scopes, log) = counted_proxy(
        &[("A", Behavior::Succeed), ("B", Behavior::Succeed)],
        OnErrorPolicy::RedirectToDefault,
        &recorder,
    );
    let token = CancellationToken::new();
    token.cancel();

    let result: Result<String, GreetError> = proxy
        .invoke_with_cancellation("greet", token, |greeter: Arc<dyn Greeter>, _token| async move {
            greeter.greet(ADA.to_string()).await
        })
        .await;

    assert_eq!(result.unwrap_err(), GreetError::Routing("invocation cancelled".into()));
    assert!(log.lock().is_empty());
    assert_eq!(scopes.created(), 0);
    assert!(recorder.events().is_empty());
}

// ---------------------------------------------------------------------------
// Decorators in the loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_circuit_is_redirected_to_default() {
    let (catalog, log) = catalog(&[("A", Behavior::Succeed), ("B", Behavior::Fail)]);
    let registration = registration("a", &["a", "b"])
        .on_error(OnErrorPolicy::RedirectToDefault)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    let proxy = InvocationProxy::<dyn Greeter>::builder(registration, modes_selecting("b"), Arc::new(catalog))
        .decorator(CircuitBreakerFactory::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }))
        .telemetry(recorder.clone())
        .build();

    for _ in 0..3 {
        assert_eq!(proxy.greet(ADA.to_string()).await.unwrap(), "A greets Ada");
    }

    assert_eq!(*log.lock(), vec!["B", "A", "B", "A", "A"]);
    assert!(recorder
        .events()
        .contains(&"attempt_failure b circuit_open".to_string()));
}
