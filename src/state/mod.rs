//! State management module
//!
//! This module handles all durable library state, including:
//! - Database connections and queries (library.rs)
//! - Shared data structures (data.rs)
//! - Merging scans and pruning missing entries (reconcile.rs)
//! - The tag hierarchy and forest assembly (tags.rs)
//! - Read-only projections for the presentation layer (query.rs)
//! - The "last library source" setting (settings.rs)

pub mod data;
pub mod library;
pub mod query;
pub mod reconcile;
pub mod settings;
pub mod tags;

use crate::error::{LibraryError, Result};

/// Run blocking SQLite or filesystem work off the async executor.
///
/// Once started, the closure always runs to completion even if the caller
/// stops awaiting, so a transaction is never cut off halfway.
pub(crate) async fn run_blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LibraryError::Task(format!("Task join error: {}", e)))?
}
