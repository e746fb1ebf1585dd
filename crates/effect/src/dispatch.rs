//! Dispatchers resolve intents to performers.

use crate::continuation::ResultBox;
use crate::error::EffectError;
use crate::intent::{Intent, IntentRef};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Fulfils intents of one kind.
///
/// A performer receives the dispatcher it was found through (so it can perform
/// sub-effects), the intent, and a [`ResultBox`] it must eventually complete
/// exactly once. Closures with the matching signature are performers.
pub trait Performer: Send + Sync {
    fn perform(&self, dispatcher: &DispatcherRef, intent: IntentRef, result: ResultBox);
}

impl<F> Performer for F
where
    F: Fn(&DispatcherRef, IntentRef, ResultBox) + Send + Sync,
{
    fn perform(&self, dispatcher: &DispatcherRef, intent: IntentRef, result: ResultBox) {
        self(dispatcher, intent, result)
    }
}

pub type PerformerRef = Arc<dyn Performer>;

/// Resolves an intent to the performer that handles it.
///
/// Returning `None` is not an error at this layer; the engine turns it into
/// [`EffectError::NoPerformerFound`].
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, intent: &dyn Intent) -> Option<PerformerRef>;

    /// Move this dispatcher behind a shareable handle.
    fn shared(self) -> DispatcherRef
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

pub type DispatcherRef = Arc<dyn Dispatcher>;

/// Adapts a closure over the concrete intent type into a [`Performer`].
struct TypedPerformer<T, F> {
    f: F,
    _intent: PhantomData<fn(&T)>,
}

impl<T, F> Performer for TypedPerformer<T, F>
where
    T: Intent,
    F: Fn(&DispatcherRef, &T, ResultBox) + Send + Sync,
{
    fn perform(&self, dispatcher: &DispatcherRef, intent: IntentRef, result: ResultBox) {
        match intent.downcast_ref::<T>() {
            Some(typed) => (self.f)(dispatcher, typed, result),
            // Only reachable if the performer was registered under the wrong kind.
            None => result.fail(EffectError::NoPerformerFound(Arc::clone(&intent))),
        }
    }
}

/// Dispatches on the exact concrete type of the intent.
///
/// ```
/// use effect_core::{sync_perform, Dispatcher, Effect, TypeDispatcher};
/// use serde_json::json;
///
/// #[derive(Debug, PartialEq)]
/// struct Greet(&'static str);
///
/// let dispatcher = TypeDispatcher::new()
///     .on_sync::<Greet, _>(|_, greet| Ok(json!(format!("hello, {}", greet.0))))
///     .shared();
///
/// let greeting = sync_perform(Effect::new(Greet("world")), &dispatcher);
/// assert_eq!(greeting, Ok(json!("hello, world")));
/// ```
#[derive(Clone, Default)]
pub struct TypeDispatcher {
    performers: HashMap<TypeId, (&'static str, PerformerRef)>,
}

impl TypeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `performer` for intents of type `T`, replacing any previous one.
    pub fn with_performer<T: Intent>(mut self, performer: impl Performer + 'static) -> Self {
        self.performers.insert(
            TypeId::of::<T>(),
            (std::any::type_name::<T>(), Arc::new(performer)),
        );
        self
    }

    /// Register a performer closure over the concrete intent type.
    pub fn on<T, F>(self, f: F) -> Self
    where
        T: Intent,
        F: Fn(&DispatcherRef, &T, ResultBox) + Send + Sync + 'static,
    {
        self.with_performer::<T>(TypedPerformer {
            f,
            _intent: PhantomData,
        })
    }

    /// Register a function whose return value completes the box.
    pub fn on_sync<T, F>(self, f: F) -> Self
    where
        T: Intent,
        F: Fn(&DispatcherRef, &T) -> Result<Value, EffectError> + Send + Sync + 'static,
    {
        self.on::<T, _>(move |dispatcher: &DispatcherRef, intent: &T, result: ResultBox| {
            result.complete(f(dispatcher, intent))
        })
    }

    pub fn handles<T: Intent>(&self) -> bool {
        self.performers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.performers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.performers.is_empty()
    }
}

impl Dispatcher for TypeDispatcher {
    fn dispatch(&self, intent: &dyn Intent) -> Option<PerformerRef> {
        self.performers
            .get(&intent.kind())
            .map(|(_, performer)| Arc::clone(performer))
    }
}

impl fmt::Debug for TypeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.performers.values().map(|(name, _)| *name).collect();
        kinds.sort_unstable();
        f.debug_struct("TypeDispatcher").field("kinds", &kinds).finish()
    }
}

/// Tries each child dispatcher in order; the first performer found wins.
#[derive(Clone, Default)]
pub struct ComposedDispatcher {
    dispatchers: Vec<DispatcherRef>,
}

impl ComposedDispatcher {
    pub fn new(dispatchers: impl IntoIterator<Item = DispatcherRef>) -> Self {
        Self {
            dispatchers: dispatchers.into_iter().collect(),
        }
    }

    /// Append a lower-priority dispatcher.
    pub fn with(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatchers.push(Arc::new(dispatcher));
        self
    }
}

impl Dispatcher for ComposedDispatcher {
    fn dispatch(&self, intent: &dyn Intent) -> Option<PerformerRef> {
        self.dispatchers
            .iter()
            .find_map(|dispatcher| dispatcher.dispatch(intent))
    }
}

impl fmt::Debug for ComposedDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedDispatcher")
            .field("dispatchers", &self.dispatchers.len())
            .finish()
    }
}
