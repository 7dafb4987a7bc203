//! Repository module
//!
//! Data access layer: each repository handles the store operations for one
//! domain entity. All writes are driven through the caller's retry policy;
//! the functions here are single attempts.

pub mod execution;
pub mod notification;
pub mod pipeline;
pub mod schedule;

/// Splits a comma-joined tag column.
fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins tags for storage.
fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}
