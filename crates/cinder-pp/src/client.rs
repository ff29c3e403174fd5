use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::macros::Macro;

/// Cooperative cancellation predicate, polled by the preprocessor while it runs.
pub type CancelChecker = Arc<dyn Fn() -> bool + Send + Sync>;

/// Preprocessing was cancelled via the configured [`CancelChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("preprocessing was cancelled")]
pub struct Cancelled;

/// How an include directive was spelled, governing search-path semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncludeKind {
    /// `#include "x.h"`
    Local,
    /// `#include <x.h>`
    Global,
    /// `#include_next "x.h"` or `#include_next <x.h>`
    Next,
}

/// Location of an actual argument at a function-like macro call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroArgumentReference {
    pub bytes_offset: usize,
    pub bytes_length: usize,
    pub utf16_offset: usize,
    pub utf16_length: usize,
}

/// Receiver for everything the preprocessor learns while scanning a file.
///
/// All callbacks are invoked synchronously, in source order. `source_needed`
/// must fully satisfy the include (typically by recursing into the
/// orchestrator) before it returns; the preprocessor does not continue past
/// the directive until then.
pub trait Client {
    /// The shared macro environment the preprocessor defines into and
    /// resolves from. Borrows are transient; the preprocessor never holds
    /// this across another callback.
    fn env(&mut self) -> &mut Environment;

    /// A `#define` or `#undef` was processed (`#undef` arrives as a hidden macro).
    fn macro_added(&mut self, mac: &Macro);

    /// A `#ifdef`-style check or `defined(X)` found `X` defined.
    fn passed_macro_definition_check(
        &mut self,
        bytes_offset: usize,
        utf16_offset: usize,
        line: u32,
        mac: &Macro,
    );

    /// A `#ifdef`-style check or `defined(X)` found `X` not defined.
    fn failed_macro_definition_check(&mut self, bytes_offset: usize, utf16_offset: usize, name: &str);

    /// A macro was referenced without being expanded (e.g. in a `#if` expression).
    fn notify_macro_reference(&mut self, bytes_offset: usize, utf16_offset: usize, line: u32, mac: &Macro);

    /// A macro expansion begins at the given call site. `actuals` is empty
    /// for object-like macros.
    fn start_expanding_macro(
        &mut self,
        bytes_offset: usize,
        utf16_offset: usize,
        line: u32,
        mac: &Macro,
        actuals: &[MacroArgumentReference],
    );

    /// The expansion started by the matching `start_expanding_macro` ended.
    fn stop_expanding_macro(&mut self, bytes_offset: usize, mac: &Macro);

    /// The file is wrapped in a classic `#ifndef`/`#define` include guard.
    fn mark_as_include_guard(&mut self, macro_name: &str);

    /// An inactive conditional region begins at the given UTF-16 offset.
    fn start_skipping_blocks(&mut self, utf16_offset: usize);

    /// The inactive region started by `start_skipping_blocks` ended.
    fn stop_skipping_blocks(&mut self, utf16_offset: usize);

    /// An `#include` directive needs its target processed before scanning
    /// continues past this line.
    fn source_needed(&mut self, line: u32, spelling: &str, kind: IncludeKind) -> Result<(), Cancelled>;
}
