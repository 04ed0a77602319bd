//! Core library modules for parafetch
//!
//! Size discovery, range planning, chunk fetching and the orchestrator that
//! ties them together, over pluggable transport and output seams.

pub mod config;
pub mod discovery;
pub mod downloader;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod output;
pub mod planner;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for internal use
pub use config::resolve_output_filename;
