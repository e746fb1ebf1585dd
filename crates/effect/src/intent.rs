//! Intents: inert descriptions of effects.

use crate::error::{EffectError, Failure};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An inert, equality-comparable description of an effect.
///
/// Implemented automatically for every `'static` type that is
/// `PartialEq + Debug + Send + Sync`; there is nothing to implement by hand.
/// The kind of an intent is its concrete type, which is what
/// [`TypeDispatcher`](crate::TypeDispatcher) keys on.
///
/// ```
/// use effect_core::Intent;
///
/// #[derive(Debug, PartialEq)]
/// struct ReadFile { path: String }
///
/// let a: &dyn Intent = &ReadFile { path: "a.txt".into() };
/// let b: &dyn Intent = &ReadFile { path: "a.txt".into() };
/// assert!(a.intent_eq(b));
/// assert!(a.is::<ReadFile>());
/// ```
pub trait Intent: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Value equality across intents: same concrete type and `==`.
    fn intent_eq(&self, other: &dyn Intent) -> bool;

    /// Type name of the intent, for diagnostics.
    fn kind_name(&self) -> &'static str;
}

impl<T> Intent for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn intent_eq(&self, other: &dyn Intent) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn kind_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn Intent {
    /// The kind tag used for dispatch.
    pub fn kind(&self) -> TypeId {
        Any::type_id(self.as_any())
    }

    pub fn is<T: Intent>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Intent>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Shared handle to a type-erased intent.
pub type IntentRef = Arc<dyn Intent>;

/// Succeeds with a fixed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantIntent(pub Value);

/// Fails with a fixed failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorIntent(pub Failure);

type IntentFn = dyn Fn() -> Result<Value, EffectError> + Send + Sync;

/// Calls an opaque function and uses its result.
///
/// This gives up what makes intents useful: it cannot be inspected by a test,
/// and nothing but calling it can perform it. Two `FuncIntent`s are equal only
/// when they share the same function.
#[derive(Clone)]
pub struct FuncIntent(Arc<IntentFn>);

impl FuncIntent {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> Result<Value, EffectError> + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    pub fn call(&self) -> Result<Value, EffectError> {
        (self.0)()
    }
}

impl PartialEq for FuncIntent {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FuncIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncIntent").finish_non_exhaustive()
    }
}
