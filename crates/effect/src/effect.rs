//! Effects: an intent plus the continuation chain that consumes its result.

use crate::error::EffectError;
use crate::intent::{Intent, IntentRef};
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

pub(crate) type SuccessFn = Arc<dyn Fn(Value) -> Result<Next, EffectError> + Send + Sync>;
pub(crate) type ErrorFn = Arc<dyn Fn(EffectError) -> Result<Next, EffectError> + Send + Sync>;

/// One link of a continuation chain. A missing side passes its outcome
/// through untouched.
#[derive(Clone)]
pub(crate) struct Callbacks {
    pub(crate) success: Option<SuccessFn>,
    pub(crate) error: Option<ErrorFn>,
}

impl PartialEq for Callbacks {
    fn eq(&self, other: &Self) -> bool {
        fn same<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        same(&self.success, &other.success) && same(&self.error, &other.error)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

pub(crate) type Chain = SmallVec<[Callbacks; 2]>;

/// What an effect starts from: an intent to dispatch, or a value that is
/// already known.
#[derive(Debug, Clone)]
pub(crate) enum Current {
    Intent(IntentRef),
    Value(Value),
}

impl PartialEq for Current {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Current::Intent(a), Current::Intent(b)) => a.intent_eq(&**b),
            (Current::Value(a), Current::Value(b)) => a == b,
            _ => false,
        }
    }
}

/// What a continuation hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// Continue the chain with this value.
    Value(Value),
    /// Perform this effect first; its outcome continues the chain.
    Effect(Effect),
}

impl From<Value> for Next {
    fn from(value: Value) -> Self {
        Next::Value(value)
    }
}

impl From<Effect> for Next {
    fn from(effect: Effect) -> Self {
        Next::Effect(effect)
    }
}

/// An intent paired with an ordered chain of success/error continuations.
///
/// Effects are persistent values: [`on`](Effect::on) returns a new effect and
/// clones share their callbacks. Nothing happens until the effect is handed
/// to [`perform`](crate::perform).
///
/// ```
/// use effect_core::{sync_perform, ConstantIntent, Effect, base_dispatcher, Dispatcher};
/// use serde_json::json;
///
/// let effect = Effect::new(ConstantIntent(json!(20)))
///     .on_success(|v| Ok(json!(v.as_i64().unwrap_or_default() + 1)))
///     .on_success(|v| Ok(json!(v.as_i64().unwrap_or_default() * 2)));
///
/// let dispatcher = base_dispatcher().shared();
/// assert_eq!(sync_perform(effect, &dispatcher), Ok(json!(42)));
/// ```
#[derive(Clone, PartialEq)]
pub struct Effect {
    pub(crate) current: Current,
    pub(crate) callbacks: Chain,
}

impl Effect {
    /// Wrap an intent with an empty chain.
    pub fn new(intent: impl Intent) -> Self {
        Self::from_intent(Arc::new(intent))
    }

    pub fn from_intent(intent: IntentRef) -> Self {
        Self {
            current: Current::Intent(intent),
            callbacks: Chain::new(),
        }
    }

    /// An effect that yields `value` without consulting any dispatcher.
    pub fn pure(value: impl Into<Value>) -> Self {
        Self {
            current: Current::Value(value.into()),
            callbacks: Chain::new(),
        }
    }

    /// The intent this effect will dispatch, if it has one.
    pub fn intent(&self) -> Option<&dyn Intent> {
        match &self.current {
            Current::Intent(intent) => Some(&**intent),
            Current::Value(_) => None,
        }
    }

    /// The value this effect starts from, if it is pure.
    pub fn value(&self) -> Option<&Value> {
        match &self.current {
            Current::Value(value) => Some(value),
            Current::Intent(_) => None,
        }
    }

    /// Number of links in the continuation chain.
    pub fn chain_len(&self) -> usize {
        self.callbacks.len()
    }

    /// Append a link handling both outcomes.
    pub fn on<S, E, SN, EN>(self, success: S, error: E) -> Self
    where
        S: Fn(Value) -> Result<SN, EffectError> + Send + Sync + 'static,
        E: Fn(EffectError) -> Result<EN, EffectError> + Send + Sync + 'static,
        SN: Into<Next>,
        EN: Into<Next>,
    {
        self.push(Callbacks {
            success: Some(success_fn(success)),
            error: Some(error_fn(error)),
        })
    }

    /// Append a link that only handles success; errors pass through it.
    pub fn on_success<S, N>(self, success: S) -> Self
    where
        S: Fn(Value) -> Result<N, EffectError> + Send + Sync + 'static,
        N: Into<Next>,
    {
        self.push(Callbacks {
            success: Some(success_fn(success)),
            error: None,
        })
    }

    /// Append a link that only handles errors; values pass through it.
    pub fn on_error<E, N>(self, error: E) -> Self
    where
        E: Fn(EffectError) -> Result<N, EffectError> + Send + Sync + 'static,
        N: Into<Next>,
    {
        self.push(Callbacks {
            success: None,
            error: Some(error_fn(error)),
        })
    }

    fn push(mut self, link: Callbacks) -> Self {
        self.callbacks.push(link);
        self
    }

    /// Append the rest of an enclosing chain after this effect's own links.
    pub(crate) fn then_chain(mut self, rest: impl IntoIterator<Item = Callbacks>) -> Self {
        self.callbacks.extend(rest);
        self
    }
}

fn success_fn<S, N>(f: S) -> SuccessFn
where
    S: Fn(Value) -> Result<N, EffectError> + Send + Sync + 'static,
    N: Into<Next>,
{
    Arc::new(move |value| f(value).map(Into::into))
}

fn error_fn<E, N>(f: E) -> ErrorFn
where
    E: Fn(EffectError) -> Result<N, EffectError> + Send + Sync + 'static,
    N: Into<Next>,
{
    Arc::new(move |err| f(err).map(Into::into))
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Effect");
        match &self.current {
            Current::Intent(intent) => s.field("intent", intent),
            Current::Value(value) => s.field("value", value),
        };
        s.field("callbacks", &self.callbacks.len()).finish()
    }
}
