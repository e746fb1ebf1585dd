//! Built-in intents: parallel fan-out/fan-in, timed delays and the base
//! constant/error/function intents, with runtime-agnostic performers.

use crate::continuation::{lock, ResultBox};
use crate::dispatch::{DispatcherRef, TypeDispatcher};
use crate::effect::Effect;
use crate::engine::perform;
use crate::error::{EffectError, PerformError};
use crate::intent::{ConstantIntent, ErrorIntent, FuncIntent};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Run several effects independently and gather their results in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelEffects {
    pub effects: Vec<Effect>,
}

/// Wait for `delay`, then succeed with `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Delay {
    pub delay: Duration,
}

/// One effect whose result is the array of results of `effects`, in order.
pub fn parallel(effects: impl IntoIterator<Item = Effect>) -> Effect {
    Effect::new(ParallelEffects {
        effects: effects.into_iter().collect(),
    })
}

pub fn delay(delay: Duration) -> Effect {
    Effect::new(Delay { delay })
}

/// Capability to run a callback once a duration has elapsed.
pub trait Scheduler: Send + Sync {
    fn call_later(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn call_later(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        (**self).call_later(delay, callback)
    }
}

struct Gather {
    slots: Vec<Option<Result<Value, EffectError>>>,
    remaining: usize,
    result: Option<ResultBox>,
}

impl Gather {
    fn settle(gather: &Mutex<Gather>, index: usize, outcome: Result<Value, EffectError>) {
        let finished = {
            let mut state = lock(gather);
            state.slots[index] = Some(outcome);
            state.remaining -= 1;
            if state.remaining > 0 {
                return;
            }
            state
                .result
                .take()
                .map(|result| (result, std::mem::take(&mut state.slots)))
        };

        if let Some((result, slots)) = finished {
            result.complete(slots.into_iter().flatten().collect());
        }
    }
}

/// One sub-effect's claim on a [`Gather`] slot.
///
/// Held by the link appended to the sub-effect. If that chain is dropped
/// before either side runs, the slot settles as abandoned.
struct Member {
    gather: Arc<Mutex<Gather>>,
    index: usize,
    settled: AtomicBool,
}

impl Member {
    fn settle(&self, outcome: Result<Value, EffectError>) {
        if !self.settled.swap(true, Ordering::AcqRel) {
            Gather::settle(&self.gather, self.index, outcome);
        }
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        if !*self.settled.get_mut() {
            tracing::debug!(index = self.index, "parallel member abandoned");
            Gather::settle(
                &self.gather,
                self.index,
                Err(PerformError::Abandoned.into_effect_error()),
            );
        }
    }
}

/// Performs each sub-effect as its own performance and completes once all of
/// them have settled.
///
/// Concurrency comes from the sub-effects' performers. With synchronous
/// performers this degrades to running them one after another. On failure the
/// error of the lowest-index failing sub-effect is reported; the other
/// outcomes are discarded. A sub-effect whose result box is dropped counts as
/// failed with an `"Abandoned"` failure.
pub fn perform_parallel(dispatcher: &DispatcherRef, intent: &ParallelEffects, result: ResultBox) {
    let total = intent.effects.len();
    if total == 0 {
        result.succeed(Value::Array(Vec::new()));
        return;
    }

    let gather = Arc::new(Mutex::new(Gather {
        slots: vec![None; total],
        remaining: total,
        result: Some(result),
    }));

    for (index, effect) in intent.effects.iter().cloned().enumerate() {
        let on_success = Arc::new(Member {
            gather: Arc::clone(&gather),
            index,
            settled: AtomicBool::new(false),
        });
        let on_error = Arc::clone(&on_success);
        let effect = effect.on(
            move |value| {
                on_success.settle(Ok(value));
                Ok(Value::Null)
            },
            move |err| {
                on_error.settle(Err(err));
                Ok(Value::Null)
            },
        );
        perform(effect, dispatcher);
    }
}

/// Performer for [`Delay`] backed by a [`Scheduler`].
pub fn delay_performer<S>(scheduler: S) -> impl Fn(&DispatcherRef, &Delay, ResultBox) + Send + Sync
where
    S: Scheduler + 'static,
{
    move |_: &DispatcherRef, intent: &Delay, result: ResultBox| {
        tracing::trace!(delay = ?intent.delay, "scheduling delay");
        scheduler.call_later(intent.delay, Box::new(move || result.succeed(Value::Null)));
    }
}

/// Handles [`ConstantIntent`], [`ErrorIntent`], [`FuncIntent`] and
/// [`ParallelEffects`].
pub fn base_dispatcher() -> TypeDispatcher {
    TypeDispatcher::new()
        .on_sync::<ConstantIntent, _>(|_, intent| Ok(intent.0.clone()))
        .on_sync::<ErrorIntent, _>(|_, intent| Err(EffectError::Failed(intent.0.clone())))
        .on_sync::<FuncIntent, _>(|_, intent| intent.call())
        .on::<ParallelEffects, _>(perform_parallel)
}

/// [`base_dispatcher`] plus [`Delay`] on the given scheduler.
pub fn builtin_dispatcher(scheduler: impl Scheduler + 'static) -> TypeDispatcher {
    base_dispatcher().on::<Delay, _>(delay_performer(scheduler))
}
