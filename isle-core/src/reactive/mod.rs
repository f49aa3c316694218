//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and
//! effects. The state layer builds reactive cells out of them, and every
//! element render and watch callback is an effect.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change, such as re-rendering one element's directives.
//!
//! ## Batches
//!
//! Writes inside `batch` update values immediately but defer effect runs
//! until the outermost batch closes, so dependents see one consistent
//! snapshot and run at most once per wave.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record an edge in the dependency graph.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use context::{untrack, ReactiveContext};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{batch, Reactive, ReactiveHandle, Runtime, MAX_FLUSH_ITERATIONS};
pub use signal::Signal;
