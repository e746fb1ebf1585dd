//! The engine: drives an effect's intent through a dispatcher and its
//! outcome through the continuation chain.

use crate::continuation::{lock, Bouncer, ResultBox};
use crate::dispatch::DispatcherRef;
use crate::effect::{Chain, Current, Effect, Next};
use crate::error::{EffectError, PerformError};
use serde_json::Value;
use std::sync::atomic::{fence, Ordering};
use std::sync::{Arc, Mutex};

/// A unit of work for a performance's trampoline.
pub(crate) enum Work {
    /// Dispatch an effect's intent (or take its value) and run its chain.
    Perform(Effect),
    /// Feed an outcome into the remaining chain.
    Resume {
        chain: Chain,
        outcome: Result<Value, EffectError>,
    },
}

/// Start performing `effect` against `dispatcher`.
///
/// Returns as soon as the engine has nothing left to do synchronously; an
/// async performer finishes the performance later from whichever thread
/// completes its [`ResultBox`]. Results are only observable through the
/// effect's own continuations. Use [`sync_perform`] or an async bridge to get
/// the terminal outcome back.
pub fn perform(effect: Effect, dispatcher: &DispatcherRef) {
    let bouncer = Bouncer::new(Arc::clone(dispatcher));
    tracing::trace!(performance = %bouncer.id, ?effect, "performance started");
    bouncer.bounce(Work::Perform(effect));
}

/// Perform `effect` and return its terminal outcome.
///
/// Every performer involved must complete its box before returning. If one
/// does not, this returns [`PerformError::NotSynchronous`]. If the chain was
/// dropped without ever completing, it returns [`PerformError::Abandoned`].
pub fn sync_perform(effect: Effect, dispatcher: &DispatcherRef) -> Result<Value, PerformError> {
    let description = format!("{:?}", effect);
    let slot: Arc<Mutex<Option<Result<Value, EffectError>>>> = Arc::default();

    let on_success = Arc::clone(&slot);
    let on_error = Arc::clone(&slot);
    let effect = effect.on(
        move |value| {
            *lock(&on_success) = Some(Ok(value));
            Ok(Value::Null)
        },
        move |err| {
            *lock(&on_error) = Some(Err(err));
            Ok(Value::Null)
        },
    );
    perform(effect, dispatcher);

    // Once only our own handle is left the chain holding the callbacks is
    // gone, so an empty slot read after that can never be filled.
    let chain_dropped = Arc::strong_count(&slot) == 1;
    fence(Ordering::Acquire);
    let outcome = lock(&slot).take();
    match outcome {
        Some(outcome) => outcome.map_err(PerformError::from),
        None if chain_dropped => Err(PerformError::Abandoned),
        None => Err(PerformError::NotSynchronous(description)),
    }
}

pub(crate) fn step(bouncer: &Bouncer, work: Work) {
    match work {
        Work::Perform(effect) => {
            let Effect { current, callbacks } = effect;
            match current {
                Current::Value(value) => bouncer.bounce(Work::Resume {
                    chain: callbacks,
                    outcome: Ok(value),
                }),
                Current::Intent(intent) => match bouncer.dispatcher.dispatch(&*intent) {
                    Some(performer) => {
                        tracing::trace!(
                            performance = %bouncer.id,
                            kind = intent.kind_name(),
                            "dispatching intent"
                        );
                        let result = ResultBox::new(bouncer.clone(), callbacks);
                        performer.perform(&bouncer.dispatcher, intent, result);
                    }
                    None => {
                        tracing::debug!(
                            performance = %bouncer.id,
                            kind = intent.kind_name(),
                            "no performer found for intent"
                        );
                        bouncer.bounce(Work::Resume {
                            chain: callbacks,
                            outcome: Err(EffectError::NoPerformerFound(intent)),
                        });
                    }
                },
            }
        }
        Work::Resume { chain, outcome } => run_callbacks(bouncer, chain, outcome),
    }
}

fn run_callbacks(bouncer: &Bouncer, chain: Chain, mut outcome: Result<Value, EffectError>) {
    let mut links = chain.into_iter();

    while let Some(link) = links.next() {
        let next = match outcome {
            Ok(value) => match &link.success {
                Some(on_success) => on_success(value),
                None => Ok(Next::Value(value)),
            },
            Err(err) => match &link.error {
                Some(on_error) => on_error(err),
                None => Err(err),
            },
        };

        outcome = match next {
            Ok(Next::Value(value)) => Ok(value),
            Ok(Next::Effect(effect)) => {
                // The nested effect runs first, then whatever is left of ours.
                bouncer.bounce(Work::Perform(effect.then_chain(links)));
                return;
            }
            Err(err) => Err(err),
        };
    }

    if let Err(err) = &outcome {
        tracing::debug!(performance = %bouncer.id, error = %err, "performance ended in error");
    }
}
