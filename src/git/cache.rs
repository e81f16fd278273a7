//! Disk-backed result cache.
//!
//! One file per cached URL: the name is the hex SHA-256 of the URL, the
//! content is the exact JSON bytes served. Lookup ignores age; expiry is the
//! sweep's job, driven purely by file modification time. Writes go through a
//! temporary sibling plus rename so a concurrent reader never observes a
//! torn entry.
//!
//! Cache failures never fail a request: a broken read is a miss, a broken
//! write is logged and swallowed by the caller.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

/// Handle to the cache directory, constructed once at startup and shared
/// through router state.
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    /// Open the cache at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Derive the cache key for a request URL. Pure and deterministic.
    pub fn key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Stored bytes for `key`, however old. I/O errors degrade to a miss.
    pub fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("cache read failed for {key}: {e}");
                None
            }
        }
    }

    /// Write `bytes` under `key`, replacing any previous entry.
    pub fn store(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.dir.join(format!("{key}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.entry_path(key))
    }

    /// Delete every entry whose mtime is older than `max_age`. Returns the
    /// number of entries removed. Per-entry failures are logged and skipped.
    pub fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("cache sweep: unreadable entry: {e}");
                    continue;
                }
            };

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok());

            if let Some(age) = age {
                if age > max_age {
                    match fs::remove_file(entry.path()) {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            tracing::warn!("cache sweep: failed to remove {:?}: {e}", entry.path())
                        }
                    }
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn open_cache(dir: &tempfile::TempDir) -> ResultCache {
        ResultCache::open(dir.path()).expect("cache open")
    }

    fn age_entry(cache: &ResultCache, key: &str, age: Duration) {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(cache.entry_path(key))
            .expect("open entry");
        file.set_modified(SystemTime::now() - age).expect("set mtime");
    }

    #[test]
    fn key_is_stable_and_distinct() {
        let a = ResultCache::key("https://example.com/a.git");
        let b = ResultCache::key("https://example.com/b.git");

        assert_eq!(a, ResultCache::key("https://example.com/a.git"));
        assert_ne!(a, b);
        // hex-encoded SHA-256
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        let key = ResultCache::key("https://example.com/repo.git");

        cache.store(&key, b"{\"a\":[\"c1\",\"c2\"]}").unwrap();

        assert_eq!(
            cache.lookup(&key).as_deref(),
            Some(&b"{\"a\":[\"c1\",\"c2\"]}"[..])
        );
    }

    #[test]
    fn store_overwrites_prior_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.store("k", b"old").unwrap();
        cache.store("k", b"new").unwrap();

        assert_eq!(cache.lookup("k").as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn lookup_of_absent_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert_eq!(cache.lookup("missing"), None);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.store("old", b"stale").unwrap();
        age_entry(&cache, "old", WEEK + Duration::from_secs(3600));

        assert_eq!(cache.sweep(WEEK).unwrap(), 1);
        assert_eq!(cache.lookup("old"), None);
    }

    #[test]
    fn sweep_retains_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.store("fresh", b"bytes").unwrap();

        assert_eq!(cache.sweep(WEEK).unwrap(), 0);
        assert_eq!(cache.lookup("fresh").as_deref(), Some(&b"bytes"[..]));
    }

    #[test]
    fn lookup_serves_stale_entries_until_swept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.store("stale", b"bytes").unwrap();
        age_entry(&cache, "stale", WEEK + Duration::from_secs(3600));

        // age is enforced only by the sweep, not by lookup
        assert_eq!(cache.lookup("stale").as_deref(), Some(&b"bytes"[..]));
    }
}
