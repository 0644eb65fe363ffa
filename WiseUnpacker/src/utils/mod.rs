//! Utility functions

pub mod path;

pub use path::{normalize_path, sanitize_relative, strip_placeholders, strip_wildcard};
