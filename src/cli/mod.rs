//! CLI-specific utilities for parafetch
//!
//! Event-bus consumers used by the command-line interface, kept apart from
//! the core library.

pub mod json;
pub mod progress;

pub use json::attach_json_lines;
pub use progress::ProgressManager;
