pub mod cache;
pub mod flight;
pub mod history;
pub mod provider;

pub use cache::ResultCache;
pub use provider::{GitCommandProvider, RepositorySnapshot, SnapshotProvider};
