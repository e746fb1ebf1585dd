//! Behaviour of the engine: dispatch, continuation order, error channel,
//! nested effects and the built-in performers.

use crate::continuation::lock;
use crate::{
    base_dispatcher, builtin_dispatcher, delay, parallel, perform, sync_perform, ConstantIntent,
    Dispatcher, DispatcherRef, Effect, EffectError, ErrorIntent, Failure, FuncIntent, Intent,
    PerformError, PerformerRef, ResultBox, Scheduler, TypeDispatcher,
};
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test intents and dispatchers
// ============================================================================

#[derive(Debug, PartialEq)]
struct Foo;

#[derive(Debug, Clone, PartialEq)]
struct Echo(Value);

#[derive(Debug, Clone, PartialEq)]
struct Deferred(&'static str);

/// Parks every `Deferred` result box so a test can complete it later.
#[derive(Clone, Default)]
struct Parked {
    boxes: Arc<Mutex<Vec<(&'static str, ResultBox)>>>,
}

impl Parked {
    fn dispatcher(&self) -> TypeDispatcher {
        let parked = self.clone();
        base_dispatcher()
            .on_sync::<Echo, _>(|_, echo| Ok(echo.0.clone()))
            .on::<Deferred, _>(move |_, intent, result| {
                lock(&parked.boxes).push((intent.0, result));
            })
    }

    fn take(&self, name: &str) -> ResultBox {
        let mut boxes = lock(&self.boxes);
        let index = boxes
            .iter()
            .position(|(n, _)| *n == name)
            .expect("no parked box with that name");
        boxes.remove(index).1
    }

    fn len(&self) -> usize {
        lock(&self.boxes).len()
    }
}

/// Counts dispatch calls and never finds a performer.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

impl Dispatcher for Counting {
    fn dispatch(&self, _intent: &dyn Intent) -> Option<PerformerRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

fn echo_dispatcher() -> DispatcherRef {
    Parked::default().dispatcher().shared()
}

fn echo(value: Value) -> Effect {
    Effect::new(Echo(value))
}

fn add(n: i64) -> impl Fn(Value) -> Result<Value, EffectError> + Send + Sync + 'static {
    move |v| Ok(json!(v.as_i64().unwrap_or_default() + n))
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn pure_effect_with_empty_chain_skips_the_dispatcher() {
    let counting = Arc::new(Counting::default());
    let dispatcher: DispatcherRef = counting.clone();

    assert_eq!(sync_perform(Effect::pure(json!("v")), &dispatcher), Ok(json!("v")));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_intent_is_a_no_performer_error_outcome() {
    let dispatcher = TypeDispatcher::new().shared();

    let outcome = sync_perform(Effect::new(Foo), &dispatcher);
    assert_eq!(
        outcome,
        Err(PerformError::Effect(EffectError::NoPerformerFound(Arc::new(Foo))))
    );
}

#[test]
fn no_performer_error_can_be_recovered() {
    let dispatcher = TypeDispatcher::new().shared();
    let effect = Effect::new(Foo).on_error(|err| {
        assert!(err.is_no_performer());
        Ok(json!("recovered"))
    });

    assert_eq!(sync_perform(effect, &dispatcher), Ok(json!("recovered")));
}

// ============================================================================
// Continuation chain
// ============================================================================

#[test]
fn links_run_in_registration_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut effect = echo(json!(0));
    for i in 0..5 {
        let seen = Arc::clone(&seen);
        effect = effect.on_success(move |v| {
            lock(&seen).push(i);
            Ok(v)
        });
    }

    assert_eq!(sync_perform(effect, &echo_dispatcher()), Ok(json!(0)));
    assert_eq!(*lock(&seen), vec![0, 1, 2, 3, 4]);
}

#[test]
fn errors_skip_success_links_until_handled() {
    let skipped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&skipped);

    let effect = Effect::new(ErrorIntent(Failure::new("boom", "first")))
        .on_success(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        })
        .on_error(|err| {
            assert_eq!(err, EffectError::failure("boom", "first"));
            Ok(json!(1))
        })
        .on_success(add(1));

    assert_eq!(sync_perform(effect, &echo_dispatcher()), Ok(json!(2)));
    assert_eq!(skipped.load(Ordering::SeqCst), 0);
}

#[test]
fn unhandled_error_reaches_the_caller() {
    let effect = echo(json!(1))
        .on_success(|_| Err::<Value, _>(EffectError::failure("ValueError", "bad")))
        .on_success(add(1));

    let outcome = sync_perform(effect, &echo_dispatcher());
    assert_eq!(
        outcome,
        Err(PerformError::Effect(EffectError::failure("ValueError", "bad")))
    );
}

#[test]
fn success_passes_through_error_only_links() {
    let effect = echo(json!(3))
        .on_error(|_| Ok(json!("unreachable")))
        .on_success(add(1));

    assert_eq!(sync_perform(effect, &echo_dispatcher()), Ok(json!(4)));
}

#[test]
fn error_handler_can_fail_again() {
    let effect = Effect::new(ErrorIntent(Failure::new("a", 1)))
        .on_error(|_| Err::<Value, _>(EffectError::failure("b", 2)))
        .on_error(|err| Ok(json!(err.into_failure().kind)));

    assert_eq!(sync_perform(effect, &echo_dispatcher()), Ok(json!("b")));
}

#[test]
fn both_sided_link_picks_the_matching_side() {
    let link = |effect: Effect| {
        effect.on(
            |v| Ok(json!({ "ok": v })),
            |err| Ok(json!({ "err": err.into_failure().kind })),
        )
    };

    let dispatcher = echo_dispatcher();
    assert_eq!(
        sync_perform(link(echo(json!(1))), &dispatcher),
        Ok(json!({ "ok": 1 }))
    );
    assert_eq!(
        sync_perform(link(Effect::new(ErrorIntent(Failure::new("E", 0)))), &dispatcher),
        Ok(json!({ "err": "E" }))
    );
}

// ============================================================================
// Nested effects and sequencing
// ============================================================================

#[test]
fn returned_effect_runs_before_the_rest_of_the_chain() {
    let effect = echo(json!(1))
        .on_success(|v| Ok(echo(json!([v, 2])).on_success(|v| Ok(json!([v, 3])))))
        .on_success(|v| Ok(json!([v, 4])));

    assert_eq!(
        sync_perform(effect, &echo_dispatcher()),
        Ok(json!([[[1, 2], 3], 4]))
    );
}

#[test]
fn nested_effect_error_flows_into_outer_error_handler() {
    let effect = echo(json!(1))
        .on_success(|_| Ok(Effect::new(ErrorIntent(Failure::new("inner", "x")))))
        .on_success(|_| Ok(json!("skipped")))
        .on_error(|err| Ok(json!(err.into_failure().kind)));

    assert_eq!(sync_perform(effect, &echo_dispatcher()), Ok(json!("inner")));
}

#[test]
fn sequencing_with_a_value_continuation() {
    let dispatcher = echo_dispatcher();
    let f = add(10);

    let chained = sync_perform(echo(json!(5)).on_success(add(10)), &dispatcher);
    let stepwise = f(sync_perform(echo(json!(5)), &dispatcher).expect("first step"));

    assert_eq!(chained, stepwise.map_err(PerformError::from));
    assert_eq!(chained, Ok(json!(15)));
}

#[test]
fn sequencing_with_an_effect_continuation() {
    let dispatcher = echo_dispatcher();
    let g = |v: Value| Ok::<_, EffectError>(echo(json!({ "wrapped": v })));

    let chained = sync_perform(echo(json!(5)).on_success(g), &dispatcher);

    let first = sync_perform(echo(json!(5)), &dispatcher).expect("first step");
    let inner = g(first).expect("continuation");
    let stepwise = sync_perform(inner, &dispatcher);

    assert_eq!(chained, stepwise);
    assert_eq!(chained, Ok(json!({ "wrapped": 5 })));
}

// ============================================================================
// Asynchronous completion
// ============================================================================

#[test]
fn late_completion_resumes_the_chain() {
    let parked = Parked::default();
    let dispatcher = parked.dispatcher().shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let effect = Effect::new(Deferred("later"))
        .on_success(add(1))
        .on_success(move |v| {
            *lock(&sink) = Some(v.clone());
            Ok(v)
        });
    perform(effect, &dispatcher);
    assert_eq!(*lock(&seen), None);

    parked.take("later").succeed(json!(41));
    assert_eq!(*lock(&seen), Some(json!(42)));
}

#[test]
fn sync_perform_reports_pending_effects() {
    let parked = Parked::default();
    let dispatcher = parked.dispatcher().shared();

    let outcome = sync_perform(Effect::new(Deferred("never")), &dispatcher);
    assert!(matches!(outcome, Err(PerformError::NotSynchronous(_))));
    assert_eq!(parked.len(), 1);
    parked.take("never").succeed(Value::Null);
}

#[test]
fn dropped_box_abandons_the_performance() {
    let dispatcher = TypeDispatcher::new()
        .on::<Foo, _>(|_, _, result| drop(result))
        .shared();

    assert_eq!(
        sync_perform(Effect::new(Foo), &dispatcher),
        Err(PerformError::Abandoned)
    );
}

#[test]
fn completion_from_another_thread_is_never_reported_as_abandoned() {
    let workers = Arc::new(Mutex::new(Vec::new()));
    let spawned = Arc::clone(&workers);
    let dispatcher = TypeDispatcher::new()
        .on::<Foo, _>(move |_, _, result| {
            let worker = std::thread::spawn(move || result.succeed(json!("done")));
            lock(&spawned).push(worker);
        })
        .shared();

    for _ in 0..200 {
        let outcome = sync_perform(Effect::new(Foo), &dispatcher);
        assert!(
            matches!(outcome, Ok(_) | Err(PerformError::NotSynchronous(_))),
            "unexpected outcome {:?}",
            outcome
        );
    }
    for worker in lock(&workers).drain(..) {
        worker.join().expect("worker");
    }
}

#[test]
fn a_panicking_step_does_not_wedge_the_performance() {
    let parked = Parked::default();
    let stash = parked.clone();
    let dispatcher = parked
        .dispatcher()
        .on::<Foo, _>(move |_, _, result| {
            lock(&stash.boxes).push(("stashed", result));
            panic!("performer failed after parking its box");
        })
        .shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let effect = Effect::new(Foo).on_success(move |v| {
        *lock(&sink) = Some(v.clone());
        Ok(v)
    });
    let unwound = std::panic::catch_unwind(AssertUnwindSafe(|| perform(effect, &dispatcher)));
    assert!(unwound.is_err());

    parked.take("stashed").succeed(json!("late"));
    assert_eq!(*lock(&seen), Some(json!("late")));
}

#[test]
fn performers_can_perform_sub_effects() {
    let dispatcher = base_dispatcher()
        .on_sync::<Echo, _>(|_, echo| Ok(echo.0.clone()))
        .on::<Foo, _>(|dispatcher, _, result| {
            let inner = echo(json!("from inner"));
            result.complete(sync_perform(inner, dispatcher).map_err(|err| {
                err.effect_error()
                    .cloned()
                    .unwrap_or_else(|| EffectError::failure("Pending", err.to_string()))
            }));
        })
        .shared();

    assert_eq!(sync_perform(Effect::new(Foo), &dispatcher), Ok(json!("from inner")));
}

// ============================================================================
// Base intents
// ============================================================================

#[test]
fn base_intents_perform_as_described() {
    let dispatcher = base_dispatcher().shared();

    assert_eq!(
        sync_perform(Effect::new(ConstantIntent(json!([1, 2]))), &dispatcher),
        Ok(json!([1, 2]))
    );
    assert_eq!(
        sync_perform(Effect::new(ErrorIntent(Failure::new("Oops", "no"))), &dispatcher),
        Err(PerformError::Effect(EffectError::failure("Oops", "no")))
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let func = FuncIntent::new(move || Ok(json!(counter.fetch_add(1, Ordering::SeqCst))));
    assert_eq!(sync_perform(Effect::new(func.clone()), &dispatcher), Ok(json!(0)));
    assert_eq!(sync_perform(Effect::new(func), &dispatcher), Ok(json!(1)));
}

// ============================================================================
// ParallelEffects
// ============================================================================

#[test]
fn parallel_results_follow_input_order_not_completion_order() {
    let parked = Parked::default();
    let dispatcher = parked.dispatcher().shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let effect = parallel([Effect::new(Deferred("a")), Effect::new(Deferred("b"))]).on_success(
        move |v| {
            *lock(&sink) = Some(v.clone());
            Ok(v)
        },
    );
    perform(effect, &dispatcher);
    assert_eq!(parked.len(), 2);

    parked.take("b").succeed(json!("result of b"));
    assert_eq!(*lock(&seen), None);
    parked.take("a").succeed(json!("result of a"));

    assert_eq!(*lock(&seen), Some(json!(["result of a", "result of b"])));
}

#[test]
fn parallel_waits_for_all_and_reports_the_lowest_index_failure() {
    let parked = Parked::default();
    let dispatcher = parked.dispatcher().shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let effect = parallel([
        Effect::new(Deferred("a")),
        Effect::new(Deferred("b")),
        Effect::new(Deferred("c")),
    ])
    .on_error(move |err| {
        *lock(&sink) = Some(err.clone());
        Err::<Value, _>(err)
    });
    perform(effect, &dispatcher);

    parked.take("c").fail(Failure::new("late", "c"));
    parked.take("b").fail(Failure::new("early", "b"));
    assert_eq!(*lock(&seen), None);

    parked.take("a").succeed(json!("a"));
    assert_eq!(*lock(&seen), Some(EffectError::failure("early", "b")));
}

#[test]
fn parallel_of_nothing_is_an_empty_array() {
    let dispatcher = base_dispatcher().shared();
    assert_eq!(sync_perform(parallel(Vec::new()), &dispatcher), Ok(json!([])));
}

#[test]
fn parallel_sub_effects_keep_their_own_chains() {
    let dispatcher = echo_dispatcher();
    let effect = parallel([
        echo(json!(1)).on_success(add(100)),
        Effect::new(Foo).on_error(|_| Ok(json!("missing"))),
        Effect::pure(json!(3)),
    ]);

    assert_eq!(
        sync_perform(effect, &dispatcher),
        Ok(json!([101, "missing", 3]))
    );
}

#[test]
fn parallel_member_with_a_dropped_box_settles_as_abandoned() {
    let dispatcher = Parked::default()
        .dispatcher()
        .on::<Foo, _>(|_, _, result| drop(result))
        .shared();
    let effect = parallel([echo(json!(1)), Effect::new(Foo)]).on(
        |v| Ok(json!({ "ok": v })),
        |err| Ok(json!({ "err": err.into_failure().kind })),
    );

    assert_eq!(
        sync_perform(effect, &dispatcher),
        Ok(json!({ "err": "Abandoned" }))
    );
}

#[test]
fn parallel_waits_for_live_members_when_another_is_abandoned() {
    let parked = Parked::default();
    let dispatcher = parked
        .dispatcher()
        .on::<Foo, _>(|_, _, result| drop(result))
        .shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let effect = parallel([Effect::new(Deferred("a")), Effect::new(Foo)]).on_error(move |err| {
        *lock(&sink) = Some(err.clone());
        Err::<Value, _>(err)
    });
    perform(effect, &dispatcher);
    assert_eq!(*lock(&seen), None);

    parked.take("a").succeed(json!("a"));
    let err = lock(&seen).clone().expect("parallel settled");
    assert_eq!(err.as_failure().map(|f| f.kind.as_str()), Some("Abandoned"));
}

// ============================================================================
// Delay
// ============================================================================

/// Collects scheduled callbacks so tests can fire them by hand.
#[derive(Clone, Default)]
struct Collecting {
    scheduled: Arc<Mutex<Vec<(Duration, Box<dyn FnOnce() + Send>)>>>,
}

impl Scheduler for Collecting {
    fn call_later(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        lock(&self.scheduled).push((delay, callback));
    }
}

#[test]
fn delay_completes_with_null_when_the_scheduler_fires() {
    let scheduler = Collecting::default();
    let dispatcher = builtin_dispatcher(scheduler.clone()).shared();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    perform(
        delay(Duration::from_millis(250)).on_success(move |v| {
            *lock(&sink) = Some(v.clone());
            Ok(v)
        }),
        &dispatcher,
    );
    assert_eq!(*lock(&seen), None);

    let (after, callback) = lock(&scheduler.scheduled).pop().expect("delay was scheduled");
    assert_eq!(after, Duration::from_millis(250));
    callback();

    assert_eq!(*lock(&seen), Some(Value::Null));
}
