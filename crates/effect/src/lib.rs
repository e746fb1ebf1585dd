//! # Effect
//!
//! Describe side effects as inert values, and decide separately how they are
//! performed.
//!
//! ## Core Concepts
//!
//! - [`Intent`] = what should happen (plain data, compared by value)
//! - [`Performer`] = how one kind of intent actually happens
//! - [`Dispatcher`] = which performer handles a given intent
//! - [`Effect`] = an intent plus the continuations that consume its result
//! - [`ResultBox`] = the one-shot channel a performer completes
//!
//! Application code builds effects and never performs IO itself. Tests swap
//! the dispatcher and check the intents instead of mocking the world.
//!
//! ## Architecture
//!
//! ```text
//! Effect(intent, [(ok, err), ...])
//!     │
//!     ▼ perform()
//! Engine ──► Dispatcher.dispatch(intent) ──► None ──► Err(NoPerformerFound)
//!     │                 │                                   │
//!     │                 ▼ Some(performer)                   │
//!     │        Performer.perform(dispatcher, intent, box)   │
//!     │                 │                                   │
//!     │                 ▼ box.succeed(v) / box.fail(e)      │
//!     │                 │   (now, or later from a task)     │
//!     ▼                 ▼                                   ▼
//! Continuation chain: link 1 ─► link 2 ─► ... ─► terminal outcome
//!                        │
//!                        └─► returns Effect? perform it, then continue
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Intents are data** - Immutable, compared by value, no behaviour
//! 2. **One intent = one outcome** - A [`ResultBox`] is consumed by completing it
//! 3. **Chains run in order** - Each link sees exactly one outcome and produces one
//! 4. **Errors are sticky** - An error skips links until an `on_error` handles it
//! 5. **Dispatchers are read-only** - Built once, shared freely across performances
//!
//! ## Example
//!
//! ```
//! use effect_core::{sync_perform, ComposedDispatcher, Dispatcher, Effect, TypeDispatcher,
//!     base_dispatcher, parallel};
//! use serde_json::json;
//!
//! #[derive(Debug, PartialEq)]
//! struct Lookup { key: String }
//!
//! let app = TypeDispatcher::new()
//!     .on_sync::<Lookup, _>(|_, lookup| Ok(json!(lookup.key.len())));
//!
//! let dispatcher = ComposedDispatcher::new([app.shared(), base_dispatcher().shared()]).shared();
//!
//! let lookups = ["a", "bb", "ccc"].map(|key| Effect::new(Lookup { key: key.into() }));
//! let total = parallel(lookups).on_success(|lengths| {
//!     let sum: i64 = lengths
//!         .as_array()
//!         .into_iter()
//!         .flatten()
//!         .filter_map(|v| v.as_i64())
//!         .sum();
//!     Ok(json!(sum))
//! });
//!
//! assert_eq!(sync_perform(total, &dispatcher), Ok(json!(6)));
//! ```
//!
//! ## What This Is Not
//!
//! Not a coroutine runtime: effects resolve through explicit continuations.
//! Real concurrency and timers belong to the host runtime. See the
//! `effect-tokio` crate for the tokio bridge and `effect-testing` for canned
//! dispatchers.

// Core modules
mod builtins;
mod continuation;
mod dispatch;
mod dispatcher_macro;
mod effect;
mod engine;
mod error;
mod intent;

// Engine behaviour tests (test-only)
#[cfg(test)]
mod engine_tests;



// Re-export intent types
pub use intent::{ConstantIntent, ErrorIntent, FuncIntent, Intent, IntentRef};

// Re-export effect types
pub use effect::{Effect, Next};

// Re-export continuation types
pub use continuation::{PerformanceId, ResultBox};

// Re-export dispatcher types
pub use dispatch::{
    ComposedDispatcher, Dispatcher, DispatcherRef, Performer, PerformerRef, TypeDispatcher,
};

// Re-export engine entry points
pub use engine::{perform, sync_perform};

// Re-export built-in intents and performers
pub use builtins::{
    base_dispatcher, builtin_dispatcher, delay, delay_performer, parallel, perform_parallel,
    Delay, ParallelEffects, Scheduler,
};

// Re-export error types
pub use error::{EffectError, Failure, PerformError};

// Re-export commonly used external types
pub use serde_json::Value;
