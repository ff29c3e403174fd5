//! Macro model and directive-level preprocessor for cinder.
//!
//! The [`Preprocessor`] walks a source file line by line, maintains the
//! conditional-compilation state, expands object- and function-like macros,
//! and reports everything it learns to a [`Client`]: macro definitions and
//! uses, skipped `#if 0` regions, include guards, and — crucially — every
//! `#include` directive, which the client satisfies synchronously before
//! scanning continues. That synchronous callback is how the indexing
//! orchestrator recurses into nested headers.

mod client;
mod environment;
mod expr;
mod macros;
mod preprocessor;

pub use client::{CancelChecker, Cancelled, Client, IncludeKind, MacroArgumentReference};
pub use environment::Environment;
pub use macros::Macro;
pub use preprocessor::Preprocessor;
