//! One-shot result boxes and the per-performance trampoline behind them.

use crate::dispatch::DispatcherRef;
use crate::effect::Chain;
use crate::engine::{self, Work};
use crate::error::EffectError;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Identifies one end-to-end drive of an effect in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerformanceId(Uuid);

impl PerformanceId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct BounceState {
    work: Option<Work>,
    running: bool,
}

/// Drives one performance step by step.
///
/// Steps bounced while the trampoline is running are picked up by the running
/// loop once the current step returns, so synchronous chains of any length run
/// in constant stack. A step bounced while nothing is running (an async
/// completion) starts the loop on the calling thread.
#[derive(Clone)]
pub(crate) struct Bouncer {
    state: Arc<Mutex<BounceState>>,
    pub(crate) dispatcher: DispatcherRef,
    pub(crate) id: PerformanceId,
}

impl Bouncer {
    pub(crate) fn new(dispatcher: DispatcherRef) -> Self {
        Self {
            state: Arc::default(),
            dispatcher,
            id: PerformanceId::new(),
        }
    }

    pub(crate) fn bounce(&self, work: Work) {
        {
            let mut state = lock(&self.state);
            assert!(
                state.work.is_none(),
                "protocol violation: performance {} already has a pending step",
                self.id
            );
            state.work = Some(work);
            if state.running {
                return;
            }
            state.running = true;
        }

        let running = Running {
            state: &self.state,
            id: self.id,
        };
        loop {
            let next = {
                let mut state = lock(&self.state);
                match state.work.take() {
                    Some(work) => work,
                    None => {
                        state.running = false;
                        drop(state);
                        running.disarm();
                        return;
                    }
                }
            };
            engine::step(self, next);
        }
    }
}

/// Stops the trampoline if a step unwinds, so the performance is not left
/// marked as running forever.
struct Running<'a> {
    state: &'a Mutex<BounceState>,
    id: PerformanceId,
}

impl Running<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.running = false;
        if state.work.take().is_some() {
            tracing::error!(
                performance = %self.id,
                "step panicked; discarding the step queued behind it"
            );
        }
    }
}

struct Pending {
    bouncer: Bouncer,
    chain: Chain,
}

/// The one-shot continuation handed to a performer.
///
/// A performer must eventually call exactly one of [`succeed`](Self::succeed),
/// [`fail`](Self::fail) or [`complete`](Self::complete). Each consumes the
/// box, so completing it twice is rejected at compile time:
///
/// ```compile_fail
/// use effect_core::ResultBox;
/// use serde_json::json;
///
/// fn perform_twice(result: ResultBox) {
///     result.succeed(json!(1));
///     result.succeed(json!(2));
/// }
/// ```
///
/// Dropping a box without completing it abandons the performance; this is
/// logged as an error and the chain never runs.
#[must_use = "a result box must be completed exactly once"]
pub struct ResultBox {
    pending: Option<Pending>,
}

impl ResultBox {
    pub(crate) fn new(bouncer: Bouncer, chain: Chain) -> Self {
        Self {
            pending: Some(Pending { bouncer, chain }),
        }
    }

    /// The performance this box belongs to.
    pub fn performance(&self) -> Option<PerformanceId> {
        self.pending.as_ref().map(|pending| pending.bouncer.id)
    }

    /// The effect succeeded with `value`.
    pub fn succeed(self, value: impl Into<Value>) {
        self.complete(Ok(value.into()))
    }

    /// The effect failed with `error`.
    pub fn fail(self, error: impl Into<EffectError>) {
        self.complete(Err(error.into()))
    }

    /// Deliver an outcome computed elsewhere.
    pub fn complete(mut self, outcome: Result<Value, EffectError>) {
        let Some(Pending { bouncer, chain }) = self.pending.take() else {
            unreachable!("result box completed after consumption");
        };
        tracing::trace!(
            performance = %bouncer.id,
            ok = outcome.is_ok(),
            "result box completed"
        );
        bouncer.bounce(Work::Resume { chain, outcome });
    }
}

impl Drop for ResultBox {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::error!(
                performance = %pending.bouncer.id,
                "result box dropped without being completed; performance abandoned"
            );
        }
    }
}

impl fmt::Debug for ResultBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBox")
            .field("performance", &self.performance())
            .finish()
    }
}
