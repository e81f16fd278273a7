//! churnmap - per-file commit churn for remote git repositories.
//!
//! Clones a repository, walks its full history once, and reports every file
//! still present in the current tree that was modified in more than one
//! commit, together with the commits that touched it. Results are cached on
//! disk keyed by the repository URL, with time-based expiry.

pub mod error;
pub mod git;
pub mod routes;
