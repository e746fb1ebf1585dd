//! # Effect Tokio
//!
//! Tokio bridge for effect-core.
//!
//! - [`resolve_future`] lets a performer finish its [`ResultBox`] from a future
//! - [`perform`] awaits the terminal outcome of an effect
//! - [`TokioScheduler`] backs [`Delay`] with `tokio::time::sleep`
//! - [`AsyncPerformer`] writes performers as `async fn` with a typed error
//!
//! ## Example
//!
//! ```
//! use effect_core::{ComposedDispatcher, Dispatcher, DispatcherRef, Effect, TypeDispatcher, Value};
//! use effect_tokio::{async_trait, perform, tokio_dispatcher, AsyncPerformer, TypeDispatcherExt};
//! use serde_json::json;
//! use tokio::runtime::Handle;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct FetchUser { id: u64 }
//!
//! struct UserStore;
//!
//! #[async_trait]
//! impl AsyncPerformer<FetchUser> for UserStore {
//!     type Error = anyhow::Error;
//!
//!     async fn perform(&self, _: DispatcherRef, intent: FetchUser) -> anyhow::Result<Value> {
//!         Ok(json!({ "id": intent.id, "name": "ada" }))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handle = Handle::current();
//! let app = TypeDispatcher::new().on_async::<FetchUser, _>(&handle, UserStore);
//! let dispatcher = ComposedDispatcher::new([app.shared(), tokio_dispatcher(handle).shared()]).shared();
//!
//! let name = Effect::new(FetchUser { id: 1 }).on_success(|user| Ok(user["name"].clone()));
//! assert_eq!(perform(name, &dispatcher).await, Ok(json!("ada")));
//! # }
//! ```

use effect_core::{
    delay_performer, Delay, DispatcherRef, Effect, EffectError, Intent, ParallelEffects,
    PerformError, ResultBox, Scheduler, TypeDispatcher, Value,
};
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Futures as performers
// ============================================================================

/// Spawn `future` on `handle` and complete `result` with its output.
///
/// Errors are captured into a structured [`Failure`](effect_core::Failure)
/// (type name, message, cause chain). If the future panics or the runtime
/// shuts down first, the box is dropped and the performance is abandoned.
pub fn resolve_future<F, E>(handle: &Handle, future: F, result: ResultBox)
where
    F: Future<Output = Result<Value, E>> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    tracing::trace!(performance = ?result.performance(), "resolving future");
    handle.spawn(async move {
        match future.await {
            Ok(value) => result.succeed(value),
            Err(err) => result.fail(EffectError::capture(err)),
        }
    });
}

/// Perform `effect` and wait for its terminal outcome.
///
/// Resolves to [`PerformError::Abandoned`] if the chain is dropped before it
/// finishes.
pub async fn perform(effect: Effect, dispatcher: &DispatcherRef) -> Result<Value, PerformError> {
    let (tx, rx) = oneshot::channel();
    let on_success = Arc::new(Mutex::new(Some(tx)));
    let on_error = Arc::clone(&on_success);

    let effect = effect.on(
        move |value| {
            deliver(&on_success, Ok(value));
            Ok(Value::Null)
        },
        move |err| {
            deliver(&on_error, Err(err));
            Ok(Value::Null)
        },
    );
    effect_core::perform(effect, dispatcher);

    match rx.await {
        Ok(outcome) => outcome.map_err(PerformError::from),
        Err(_) => Err(PerformError::Abandoned),
    }
}

type Outcome = Result<Value, EffectError>;

fn deliver(tx: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    if let Some(tx) = lock(tx).take() {
        // The receiver is gone only when the awaiting caller was cancelled.
        let _ = tx.send(outcome);
    }
}

// ============================================================================
// Built-in performers
// ============================================================================

/// Runs [`Delay`] callbacks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on.
    ///
    /// Panics outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn call_later(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}

/// Performer for [`ParallelEffects`] that awaits every sub-effect concurrently
/// on `handle`.
///
/// Results keep input order. If any sub-effect fails, the error of the
/// lowest-index failure is reported once all of them have settled.
pub fn parallel_performer(
    handle: Handle,
) -> impl Fn(&DispatcherRef, &ParallelEffects, ResultBox) + Send + Sync {
    move |dispatcher: &DispatcherRef, intent: &ParallelEffects, result: ResultBox| {
        let dispatcher = Arc::clone(dispatcher);
        let effects = intent.effects.clone();
        tracing::trace!(count = effects.len(), "performing in parallel");

        let gathered = async move {
            let outcomes = join_all(effects.into_iter().map(|effect| {
                let dispatcher = Arc::clone(&dispatcher);
                async move { perform(effect, &dispatcher).await }
            }))
            .await;

            outcomes
                .into_iter()
                .map(|outcome| outcome.map_err(PerformError::into_effect_error))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        };
        resolve_future(&handle, gathered, result);
    }
}

/// Handles [`ParallelEffects`] and [`Delay`] on the given runtime.
pub fn tokio_dispatcher(handle: Handle) -> TypeDispatcher {
    TypeDispatcher::new()
        .on::<ParallelEffects, _>(parallel_performer(handle.clone()))
        .on::<Delay, _>(delay_performer(TokioScheduler::new(handle)))
}

// ============================================================================
// Async performers
// ============================================================================

/// A performer written as an `async fn`.
///
/// The intent is cloned out of the effect so the future can own it. An error
/// is captured as a [`Failure`](effect_core::Failure) whose `kind` is the type
/// name of [`Error`](Self::Error), so a concrete error type keeps its identity
/// across the bridge. Use `anyhow::Error` when the kind does not matter.
#[async_trait]
pub trait AsyncPerformer<T: Intent + Clone>: Send + Sync + 'static {
    type Error: Into<anyhow::Error> + Send + 'static;

    async fn perform(&self, dispatcher: DispatcherRef, intent: T) -> Result<Value, Self::Error>;
}

/// Registration of [`AsyncPerformer`]s on a [`TypeDispatcher`].
pub trait TypeDispatcherExt {
    /// Register `performer` for intents of type `T`, spawning each
    /// performance on `handle`.
    fn on_async<T, P>(self, handle: &Handle, performer: P) -> Self
    where
        T: Intent + Clone,
        P: AsyncPerformer<T>;
}

impl TypeDispatcherExt for TypeDispatcher {
    fn on_async<T, P>(self, handle: &Handle, performer: P) -> Self
    where
        T: Intent + Clone,
        P: AsyncPerformer<T>,
    {
        let handle = handle.clone();
        let performer = Arc::new(performer);
        self.on::<T, _>(move |dispatcher: &DispatcherRef, intent: &T, result: ResultBox| {
            let performer = Arc::clone(&performer);
            let dispatcher = Arc::clone(dispatcher);
            let intent = intent.clone();
            resolve_future(
                &handle,
                async move { performer.perform(dispatcher, intent).await },
                result,
            );
        })
    }
}
