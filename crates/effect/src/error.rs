//! Error types for effect performances.
//!
//! Two layers:
//! - [`EffectError`] travels through an effect's error channel and can be
//!   recovered by any `on_error` continuation.
//! - [`PerformError`] is what a caller of [`sync_perform`](crate::sync_perform)
//!   sees. It wraps the terminal [`EffectError`] or reports that the
//!   performance never reached a terminal outcome.
//!
//! Protocol violations (a result box completed twice, a trampoline asked to
//! hold two steps) are never values of either type. They panic.

use crate::intent::IntentRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Structured, serializable description of a failed effect.
///
/// `kind` names the error type, `value` carries its payload and `context`
/// records the chain of causes, outermost first. This is the form in which
/// errors cross a runtime boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {}", render_value(.value))]
pub struct Failure {
    pub kind: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Failure {
    /// Create a failure with no recorded context.
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            context: Vec::new(),
        }
    }

    /// Append one entry to the cause chain.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }
}

/// Error outcome flowing through an effect's continuation chain.
#[derive(Debug, Clone, Error)]
pub enum EffectError {
    /// The dispatcher had no performer for this intent.
    #[error("no performer found for intent {0:?}")]
    NoPerformerFound(IntentRef),

    /// A performer or continuation reported a failure.
    #[error(transparent)]
    Failed(#[from] Failure),
}

impl EffectError {
    /// Shorthand for `EffectError::Failed(Failure::new(kind, value))`.
    pub fn failure(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        EffectError::Failed(Failure::new(kind, value))
    }

    /// Convert a native error into its structured form.
    ///
    /// `kind` is the type name of `E`, `value` the error message and `context`
    /// every cause below it. An `EffectError` or `Failure` that was wrapped
    /// into an `anyhow::Error` comes back out unchanged.
    pub fn capture<E>(err: E) -> Self
    where
        E: Into<anyhow::Error> + 'static,
    {
        let kind = std::any::type_name::<E>();
        let err: anyhow::Error = err.into();

        if let Some(effect_err) = err.downcast_ref::<EffectError>() {
            return effect_err.clone();
        }
        if let Some(failure) = err.downcast_ref::<Failure>() {
            return EffectError::Failed(failure.clone());
        }

        EffectError::Failed(Failure {
            kind: kind.to_string(),
            value: Value::String(err.to_string()),
            context: err.chain().skip(1).map(ToString::to_string).collect(),
        })
    }

    /// True when no performer was found for the intent.
    pub fn is_no_performer(&self) -> bool {
        matches!(self, EffectError::NoPerformerFound(_))
    }

    /// The failure payload, if this is a performer or continuation failure.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            EffectError::Failed(failure) => Some(failure),
            EffectError::NoPerformerFound(_) => None,
        }
    }

    /// Flatten into the serializable [`Failure`] triple.
    pub fn into_failure(self) -> Failure {
        match self {
            EffectError::Failed(failure) => failure,
            EffectError::NoPerformerFound(intent) => Failure::new(
                "NoPerformerFound",
                Value::String(format!("{:?}", intent)),
            )
            .with_context(intent.kind_name()),
        }
    }
}

impl PartialEq for EffectError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EffectError::NoPerformerFound(a), EffectError::NoPerformerFound(b)) => {
                a.intent_eq(&**b)
            }
            (EffectError::Failed(a), EffectError::Failed(b)) => a == b,
            _ => false,
        }
    }
}

impl From<anyhow::Error> for EffectError {
    fn from(err: anyhow::Error) -> Self {
        EffectError::capture(err)
    }
}

/// Why a performance did not yield a value to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerformError {
    /// The chain ended in its error channel.
    #[error(transparent)]
    Effect(#[from] EffectError),

    /// A performer did not complete before `sync_perform` returned.
    #[error("performing {0} did not complete synchronously")]
    NotSynchronous(String),

    /// A result box was dropped without being completed.
    #[error("performance abandoned: a result box was dropped without being completed")]
    Abandoned,
}

impl PerformError {
    /// The terminal effect error, if the chain ran to completion.
    pub fn effect_error(&self) -> Option<&EffectError> {
        match self {
            PerformError::Effect(err) => Some(err),
            _ => None,
        }
    }

    /// Fold back into the error channel of an enclosing effect.
    ///
    /// `NotSynchronous` and `Abandoned` become failures of kind
    /// `"NotSynchronous"` and `"Abandoned"`.
    pub fn into_effect_error(self) -> EffectError {
        match self {
            PerformError::Effect(err) => err,
            other @ PerformError::NotSynchronous(_) => {
                EffectError::failure("NotSynchronous", other.to_string())
            }
            other @ PerformError::Abandoned => EffectError::failure("Abandoned", other.to_string()),
        }
    }
}
