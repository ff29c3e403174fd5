//! File access layer for cinder.
//!
//! Responsibilities:
//! - Reading source files from the OS file system as UTF-8, with CRLF
//!   normalization.
//! - Holding the [`WorkingCopy`]: in-memory overrides for unsaved editor
//!   buffers that take precedence over disk.

mod fs;
mod working_copy;

pub use fs::{FileSystem, LocalFs};
pub use working_copy::WorkingCopy;
