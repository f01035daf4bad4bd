//! Seen-check store
//!
//! A persistent set of URLs already handed to the frontier. Keys are the
//! decimal FNV-1a (64-bit) hash of the serialized URL, values are the URL
//! kind tag (`seed` or `asset`).

use crate::util::fnv1a64;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors raised by the seen-check store
#[derive(Debug, Error)]
pub enum SeenCheckError {
    #[error("Seen-check storage error: {0}")]
    Storage(#[from] sled::Error),
}

/// Kind tag stored with every admitted URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenKind {
    Seed,
    Asset,
}

impl SeenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeenKind::Seed => "seed",
            SeenKind::Asset => "asset",
        }
    }
}

impl fmt::Display for SeenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrent-safe admission store backed by sled
pub struct SeenCheck {
    db: sled::Db,
    admitted: AtomicU64,
}

impl SeenCheck {
    /// Open the store at `path`, or a temporary one that is removed on drop
    pub fn open(path: Option<&Path>) -> Result<Self, SeenCheckError> {
        let db = match path {
            Some(path) => sled::open(path)?,
            None => sled::Config::new().temporary(true).open()?,
        };
        debug!(path = ?path, entries = db.len(), "Opened seen-check store");
        Ok(Self {
            db,
            admitted: AtomicU64::new(0),
        })
    }

    /// Store key of a URL
    pub fn key(url: &Url) -> String {
        fnv1a64(url.as_str().as_bytes()).to_string()
    }

    /// Admit `url` if it was never seen; returns whether it was admitted
    pub fn admit(&self, url: &Url, kind: SeenKind) -> Result<bool, SeenCheckError> {
        let key = Self::key(url);
        let swapped = self
            .db
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(kind.as_str().as_bytes()))?;
        if swapped.is_ok() {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Tag recorded for `url`, if seen
    pub fn get(&self, url: &Url) -> Result<Option<SeenKind>, SeenCheckError> {
        let value = self.db.get(Self::key(url).as_bytes())?;
        Ok(value.and_then(|v| match v.as_ref() {
            b"seed" => Some(SeenKind::Seed),
            b"asset" => Some(SeenKind::Asset),
            _ => None,
        }))
    }

    /// Number of URLs admitted since the store was opened
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Number of entries on disk, including earlier runs
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<(), SeenCheckError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_only_once() {
        let store = SeenCheck::open(None).unwrap();
        let url = Url::parse("https://example.com/a.css").unwrap();

        assert!(store.admit(&url, SeenKind::Asset).unwrap());
        assert!(!store.admit(&url, SeenKind::Asset).unwrap());
        assert!(!store.admit(&url, SeenKind::Seed).unwrap());
        assert_eq!(store.admitted(), 1);
        assert_eq!(store.get(&url).unwrap(), Some(SeenKind::Asset));
    }

    #[test]
    fn test_key_is_decimal_fnv() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(
            SeenCheck::key(&url),
            fnv1a64(b"https://example.com/").to_string()
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("seencheck");
        let url = Url::parse("https://example.com/page").unwrap();
        {
            let store = SeenCheck::open(Some(&path)).unwrap();
            assert!(store.admit(&url, SeenKind::Seed).unwrap());
            store.flush().unwrap();
        }
        let store = SeenCheck::open(Some(&path)).unwrap();
        assert!(!store.admit(&url, SeenKind::Seed).unwrap());
        assert_eq!(store.admitted(), 0);
        assert_eq!(store.len(), 1);
    }
}
