//! Duplicate suppression.
//!
//! A file is reduced to a CRC-32 according to the dupcheck flags (name,
//! name without suffix, name and size, content, content and name) and
//! remembered per directory or job until its timeout passes. Scanner
//! threads share one [`DupcheckStore`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use dashmap::DashMap;
use status::dupcheck::{
    DC_FILE_CONT_NAME, DC_FILE_CONTENT, DC_FILENAME_AND_SIZE, DC_NAME_NO_SUFFIX,
};

/// What becomes of a file the store has seen before.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DupAction {
    /// Remove the file.
    Delete,
    /// Move the file to the store directory.
    Store,
    /// Keep the file, only log it.
    Warn,
}

impl DupAction {
    /// Action selected by `flags`, deletion when none is given.
    #[must_use]
    pub const fn from_flags(flags: u64) -> Self {
        if status::dupcheck::stores(flags) {
            Self::Store
        } else if status::dupcheck::deletes(flags) {
            Self::Delete
        } else if status::dupcheck::warns(flags) {
            Self::Warn
        } else {
            Self::Delete
        }
    }
}

/// The file being checked.
#[derive(Clone, Copy, Debug)]
pub struct DupFile<'a> {
    /// Name in the source directory.
    pub name: &'a str,
    /// Size in bytes.
    pub size: u64,
    /// Where the content can be read.
    pub path: &'a Path,
}

/// Remembered checksums with their expiry, keyed by `(scope, crc)`.
#[derive(Debug, Default)]
pub struct DupcheckStore {
    seen: DashMap<(u32, u32), i64>,
}

impl DupcheckStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path` under `scope` and reports whether it is a duplicate.
    ///
    /// `scope` is the directory id for directory-level checks and the job
    /// id for job-level ones. A duplicate refreshes the expiry.
    pub fn check(
        &self,
        scope: u32,
        flags: u64,
        timeout: i64,
        file: DupFile<'_>,
        now: i64,
    ) -> io::Result<bool> {
        let (crc, duplicate) = self.lookup(scope, flags, file, now)?;
        self.remember(scope, crc, timeout, now);
        Ok(duplicate)
    }

    /// Checksum of `file` and whether it is remembered under `scope`,
    /// without recording it.
    pub fn lookup(&self, scope: u32, flags: u64, file: DupFile<'_>, now: i64) -> io::Result<(u32, bool)> {
        let crc = checksum(flags, file.name, file.size, file.path)?;
        let duplicate = self.seen.get(&(scope, crc)).is_some_and(|expiry| *expiry > now);
        Ok((crc, duplicate))
    }

    /// Remembers `crc` under `scope` until `now + timeout`.
    pub fn remember(&self, scope: u32, crc: u32, timeout: i64, now: i64) {
        self.seen.insert((scope, crc), now.saturating_add(timeout.max(0)));
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge(&self, now: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expiry| *expiry > now);
        before - self.seen.len()
    }

    /// Forgets everything remembered under `scope`.
    pub fn forget(&self, scope: u32) {
        self.seen.retain(|(owner, _), _| *owner != scope);
    }

    /// Number of remembered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// CRC-32 identifying a file under `flags`.
pub fn checksum(flags: u64, name: &str, size: u64, path: &Path) -> io::Result<u32> {
    if flags & (DC_FILE_CONTENT | DC_FILE_CONT_NAME) != 0 {
        let mut hasher = crc32fast::Hasher::new();
        let mut file = File::open(path)?;
        let mut buffer = vec![0_u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        if flags & DC_FILE_CONT_NAME != 0 {
            hasher.update(name.as_bytes());
        }
        return Ok(hasher.finalize());
    }
    if flags & DC_NAME_NO_SUFFIX != 0 {
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        return Ok(checksums::crc32(stem.as_bytes()));
    }
    if flags & DC_FILENAME_AND_SIZE != 0 {
        let mut hasher = checksums::IdHasher::new();
        hasher.field(name.as_bytes()).field(&size.to_le_bytes());
        return Ok(hasher.finish());
    }
    Ok(checksums::crc32(name.as_bytes()))
}

#[cfg(test)]
mod tests {
    use status::dupcheck::{DC_DELETE, DC_FILENAME_ONLY, DC_STORE_WARN, DC_WARN};

    use super::*;

    fn file(name: &str) -> DupFile<'_> {
        DupFile {
            name,
            size: 4,
            path: Path::new("/unused"),
        }
    }

    #[test]
    fn second_sighting_within_timeout_is_a_duplicate() {
        let store = DupcheckStore::new();
        assert!(!store.check(1, DC_FILENAME_ONLY, 60, file("y.dat"), 100).unwrap());
        assert!(store.check(1, DC_FILENAME_ONLY, 60, file("y.dat"), 130).unwrap());
        // Another scope does not see it.
        assert!(!store.check(2, DC_FILENAME_ONLY, 60, file("y.dat"), 130).unwrap());
    }

    #[test]
    fn lookup_does_not_record() {
        let store = DupcheckStore::new();
        let (crc, duplicate) = store.lookup(1, DC_FILENAME_ONLY, file("y.dat"), 100).unwrap();
        assert!(!duplicate);
        assert!(store.is_empty());
        store.remember(1, crc, 60, 100);
        assert!(store.lookup(1, DC_FILENAME_ONLY, file("y.dat"), 130).unwrap().1);
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let store = DupcheckStore::new();
        store.check(1, DC_FILENAME_ONLY, 60, file("y.dat"), 100).unwrap();
        assert!(!store.check(1, DC_FILENAME_ONLY, 60, file("y.dat"), 161).unwrap());
        assert_eq!(store.purge(1_000), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn content_checks_read_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        assert_eq!(
            checksum(DC_FILE_CONTENT, "a", 4, &a).unwrap(),
            checksum(DC_FILE_CONTENT, "b", 4, &b).unwrap()
        );
        assert_ne!(
            checksum(DC_FILE_CONT_NAME, "a", 4, &a).unwrap(),
            checksum(DC_FILE_CONT_NAME, "b", 4, &b).unwrap()
        );
    }

    #[test]
    fn suffix_and_size_variants() {
        let path = Path::new("/unused");
        assert_eq!(
            checksum(DC_NAME_NO_SUFFIX, "obs.1", 0, path).unwrap(),
            checksum(DC_NAME_NO_SUFFIX, "obs.2", 0, path).unwrap()
        );
        assert_ne!(
            checksum(DC_FILENAME_AND_SIZE, "obs", 1, path).unwrap(),
            checksum(DC_FILENAME_AND_SIZE, "obs", 2, path).unwrap()
        );
    }

    #[test]
    fn action_follows_flags() {
        assert_eq!(DupAction::from_flags(DC_DELETE), DupAction::Delete);
        assert_eq!(DupAction::from_flags(DC_STORE_WARN), DupAction::Store);
        assert_eq!(DupAction::from_flags(DC_WARN), DupAction::Warn);
    }
}
