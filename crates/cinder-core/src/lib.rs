//! Core shared helpers for cinder.
//!
//! This crate is intentionally small and dependency-free.

mod path;
mod text;

pub use path::{clean_dir_path, normalize_path};
pub use text::normalize_newlines;
