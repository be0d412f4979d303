//! Checkpoint-driven MediaWiki change synchronization.
//!
//! Lists pages changed since the last checkpoint, diffs each against its
//! revision at the checkpoint, and writes a styled diff document plus the
//! full page text into a per-run output directory.

pub mod changes;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod diff;
pub mod output;
pub mod render;
pub mod revisions;
pub mod sync;
