//! Utility functions and helpers.
//!
//! Common functionality used across multiple npmcdn crates.

pub mod file;
pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use file::{format_time, get_content_type, FileType};
pub use hash::blake3_hash;
pub use path::{is_safe_path, normalize_path, resolve_in_package};
