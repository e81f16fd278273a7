//! Snapshot acquisition via the `git` binary.
//!
//! `GitCommandProvider` clones the requested URL into a temporary directory
//! (`--no-checkout`: the object database is enough for both reads) and hands
//! back a `GitSnapshot` that can stream full history and list the current
//! tree. The temp directory is owned by the snapshot, so it is removed when
//! the snapshot drops, on every exit path.
//!
//! The history wire format is the sentinel-line protocol produced by
//! `git log --pretty=format:__commit__:%H --name-only`: each commit record
//! starts with a `__commit__:<hash>` line, followed by the paths it touched,
//! one per line, with blank lines between records.

use std::collections::HashSet;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::error::{AppError, Result};

/// Sentinel prefix marking a commit record in the history stream.
pub const COMMIT_SENTINEL: &str = "__commit__:";

/// A lazily consumed, line-oriented history log in the sentinel format.
///
/// Wraps the producing subprocess (if any) so a non-zero exit observed after
/// the stream ends surfaces as an error instead of a silently truncated
/// index.
pub struct HistoryStream {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    child: Option<Child>,
    buf: String,
}

impl HistoryStream {
    fn new(reader: impl AsyncRead + Send + Unpin + 'static, child: Option<Child>) -> Self {
        Self {
            reader: Box::new(BufReader::new(reader)),
            child,
            buf: String::new(),
        }
    }

    /// Stream over an in-memory log with no backing process.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::new(reader, None)
    }

    /// Next line without its terminator, or `None` once the log is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self
            .reader
            .read_line(&mut self.buf)
            .await
            .map_err(|e| AppError::HistoryFailed(e.to_string()))?;

        if n == 0 {
            return Ok(None);
        }

        while self.buf.ends_with('\n') || self.buf.ends_with('\r') {
            self.buf.pop();
        }

        Ok(Some(std::mem::take(&mut self.buf)))
    }

    /// Reap the producing process after the stream is exhausted.
    pub async fn finish(mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .await
                .map_err(|e| AppError::HistoryFailed(e.to_string()))?;

            if !status.success() {
                return Err(AppError::HistoryFailed(format!(
                    "git log exited with {status}"
                )));
            }
        }
        Ok(())
    }
}

/// A materialized local copy of a repository, readable two ways.
#[async_trait]
pub trait RepositorySnapshot: Send + Sync {
    /// Stream all (commit, file) records across full history.
    async fn history(&self) -> Result<HistoryStream>;

    /// List all file paths in the current checked-out tree.
    async fn current_files(&self) -> Result<HashSet<String>>;
}

/// Turns a repository URL into a local snapshot.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn acquire(&self, url: &str) -> Result<Box<dyn RepositorySnapshot>>;
}

/// Production provider: shells out to the `git` binary.
pub struct GitCommandProvider;

#[async_trait]
impl SnapshotProvider for GitCommandProvider {
    async fn acquire(&self, url: &str) -> Result<Box<dyn RepositorySnapshot>> {
        let dir = TempDir::with_prefix("repo-")
            .map_err(|e| AppError::CloneFailed(format!("failed to create temp dir: {e}")))?;

        let output = Command::new("git")
            .arg("clone")
            .arg("--no-checkout")
            .arg(url)
            .arg(dir.path())
            .output()
            .await
            .map_err(|e| AppError::CloneFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::CloneFailed(stderr.trim().to_string()));
        }

        Ok(Box::new(GitSnapshot { dir }))
    }
}

/// A cloned working copy; the backing directory lives exactly as long as
/// this value.
pub struct GitSnapshot {
    dir: TempDir,
}

impl GitSnapshot {
    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(self.dir.path());
        cmd
    }
}

#[async_trait]
impl RepositorySnapshot for GitSnapshot {
    async fn history(&self) -> Result<HistoryStream> {
        let mut child = self
            .git()
            .arg("log")
            .arg(format!("--pretty=format:{COMMIT_SENTINEL}%H"))
            .arg("--name-only")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::HistoryFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::HistoryFailed("no stdout pipe".to_string()))?;

        Ok(HistoryStream::new(stdout, Some(child)))
    }

    async fn current_files(&self) -> Result<HashSet<String>> {
        let output = self
            .git()
            .args(["ls-tree", "-r", "HEAD", "--name-only"])
            .output()
            .await
            .map_err(|e| AppError::TreeListFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::TreeListFailed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}
