//! History indexing and the survivorship filter.
//!
//! `index_history` turns the sentinel-delimited log stream into a map from
//! file path to the commits that touched it; `retain_tracked` keeps the
//! entries a caller cares about: files still present in the current tree
//! with more than one commit of history.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::git::provider::{COMMIT_SENTINEL, HistoryStream};

/// File path → commits that touched it, in stream order.
///
/// Per-file order is meaningful and preserved; duplicates within one list are
/// allowed (a commit can list the same path twice, e.g. across a rename).
pub type FileHistoryIndex = HashMap<String, Vec<String>>;

/// Consume the history stream exactly once, one line at a time, and build
/// the index. Only the index is held in memory; the log itself is never
/// materialized.
///
/// A file line arriving before any sentinel has no commit to attach to; it
/// is skipped with a warning rather than failing the request.
pub async fn index_history(mut stream: HistoryStream) -> Result<FileHistoryIndex> {
    let mut index = FileHistoryIndex::new();
    let mut current_commit: Option<String> = None;

    while let Some(line) = stream.next_line().await? {
        if let Some(id) = line.strip_prefix(COMMIT_SENTINEL) {
            current_commit = Some(id.to_string());
        } else if !line.is_empty() {
            match &current_commit {
                Some(commit) => {
                    index.entry(line).or_default().push(commit.clone());
                }
                None => {
                    tracing::warn!("history line before any commit sentinel, skipping: {line}");
                }
            }
        }
    }

    stream.finish().await?;
    Ok(index)
}

/// Drop entries for files that are gone from the current tree or were only
/// ever touched by a single commit. Surviving commit lists are untouched.
pub fn retain_tracked(index: &mut FileHistoryIndex, current_files: &HashSet<String>) {
    index.retain(|path, commits| current_files.contains(path) && commits.len() > 1);
}
