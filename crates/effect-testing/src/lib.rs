//! Testing utilities for effect-core.
//!
//! - [`CannedDispatcher`] replays an expected sequence of intents and feeds
//!   back canned outcomes, failing the test on the first surprise.
//! - [`ManualScheduler`] is a clock that only moves when the test says so,
//!   for driving [`Delay`](effect_core::Delay) deterministically.

use effect_core::{
    Dispatcher, DispatcherRef, EffectError, Intent, IntentRef, Performer, PerformerRef,
    ResultBox, Scheduler,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Canned dispatcher
// ============================================================================

#[derive(Debug)]
struct Expectation {
    intent: IntentRef,
    outcome: Result<Value, EffectError>,
}

/// A dispatcher that expects an exact, ordered sequence of intents.
///
/// Every intent is routed to the canned performer. It pops the next
/// expectation, panics with "unexpected intent" if the performed intent is not
/// equal to it, and otherwise completes the box with the canned outcome.
/// Performing an intent when nothing is expected is a test setup defect and
/// panics too.
///
/// Clones share the same queue, so keep one to add expectations or check
/// [`remaining`](Self::remaining) after handing another to the engine.
///
/// ```
/// use effect_core::{sync_perform, Dispatcher, Effect};
/// use effect_testing::CannedDispatcher;
/// use serde_json::json;
///
/// #[derive(Debug, PartialEq)]
/// struct ReadConfig;
///
/// let canned = CannedDispatcher::new();
/// canned.add_success(ReadConfig, json!("ok"));
///
/// let outcome = sync_perform(Effect::new(ReadConfig), &canned.clone().shared());
/// assert_eq!(outcome, Ok(json!("ok")));
/// canned.assert_exhausted();
/// ```
#[derive(Clone, Default)]
pub struct CannedDispatcher {
    expected: Arc<Mutex<VecDeque<Expectation>>>,
}

impl CannedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `intent` next and succeed it with `result`.
    pub fn add_success(&self, intent: impl Intent, result: impl Into<Value>) -> &Self {
        self.push(Arc::new(intent), Ok(result.into()))
    }

    /// Expect `intent` next and fail it with `error`.
    pub fn add_failure(&self, intent: impl Intent, error: impl Into<EffectError>) -> &Self {
        self.push(Arc::new(intent), Err(error.into()))
    }

    fn push(&self, intent: IntentRef, outcome: Result<Value, EffectError>) -> &Self {
        lock(&self.expected).push_back(Expectation { intent, outcome });
        self
    }

    /// Expectations not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.expected).len()
    }

    /// Panic if any expectation was never performed.
    pub fn assert_exhausted(&self) {
        let expected = lock(&self.expected);
        assert!(
            expected.is_empty(),
            "{} expected intent(s) never performed, next: {:?}",
            expected.len(),
            expected.front().map(|e| &e.intent)
        );
    }
}

impl Dispatcher for CannedDispatcher {
    fn dispatch(&self, _intent: &dyn Intent) -> Option<PerformerRef> {
        Some(Arc::new(CannedPerformer {
            expected: Arc::clone(&self.expected),
        }))
    }
}

impl fmt::Debug for CannedDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CannedDispatcher")
            .field("remaining", &self.remaining())
            .finish()
    }
}

struct CannedPerformer {
    expected: Arc<Mutex<VecDeque<Expectation>>>,
}

impl Performer for CannedPerformer {
    fn perform(&self, _dispatcher: &DispatcherRef, intent: IntentRef, result: ResultBox) {
        let next = lock(&self.expected).pop_front();
        let Some(Expectation {
            intent: expected,
            outcome,
        }) = next
        else {
            panic!("unexpected intent {:?}: no more intents were expected", intent);
        };

        assert!(
            expected.intent_eq(&*intent),
            "unexpected intent: expected {:?}, got {:?}",
            expected,
            intent
        );
        tracing::trace!(kind = intent.kind_name(), ok = outcome.is_ok(), "canned outcome");
        result.complete(outcome);
    }
}

// ============================================================================
// Manual scheduler
// ============================================================================

struct Scheduled {
    due: Duration,
    seq: u64,
    callback: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    pending: Vec<Scheduled>,
}

/// A deterministic [`Scheduler`]: callbacks fire only inside
/// [`advance`](Self::advance), in due-time order (ties in scheduling order).
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        lock(&self.clock).now
    }

    /// Callbacks scheduled but not yet fired.
    pub fn pending(&self) -> usize {
        lock(&self.clock).pending.len()
    }

    /// Move time forward by `by`, firing every callback that falls due.
    ///
    /// Callbacks scheduled while advancing fire too if they fall due within
    /// the same window.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.clock).now.saturating_add(by);
        loop {
            let due = {
                let mut clock = lock(&self.clock);
                let next = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.due <= target)
                    .min_by_key(|(_, s)| (s.due, s.seq))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let scheduled = clock.pending.swap_remove(index);
                        clock.now = scheduled.due;
                        scheduled
                    }
                    None => {
                        clock.now = target;
                        return;
                    }
                }
            };
            (due.callback)();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn call_later(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        let mut clock = lock(&self.clock);
        let scheduled = Scheduled {
            due: clock.now.saturating_add(delay),
            seq: clock.next_seq,
            callback,
        };
        clock.next_seq += 1;
        clock.pending.push(scheduled);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = lock(&self.clock);
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("pending", &clock.pending.len())
            .finish()
    }
}
