#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` derives the 32-bit identifiers that tie the distribution
//! engine's shared state together. Every identifier is a CRC-32 (IEEE
//! polynomial) over a canonical byte string, so the same configuration
//! produces the same ids across restarts and across processes that map the
//! status arrays.
//!
//! # Design
//!
//! - [`crc32`] hashes a single byte slice; [`IdHasher`] feeds several fields
//!   into one checksum with an unambiguous field separator.
//! - [`host_id`], [`dir_id`] and [`file_mask_id`] cover the simple ids.
//! - [`JobKey`] captures the 5-tuple that identifies a job and exposes
//!   [`JobKey::job_id`]. The trailing `salt` byte is appended to the option
//!   string; the configuration loader bumps it to resolve collisions.
//!
//! # Invariants
//!
//! - Identifiers depend only on their inputs. No process-local state is mixed
//!   in.
//! - Fields are separated by a NUL byte so `("ab", "c")` and `("a", "bc")`
//!   never collide by construction.
//!
//! # Examples
//!
//! ```
//! use checksums::{JobKey, host_id};
//!
//! let key = JobKey {
//!     dir_id: 0x1234,
//!     file_mask_id: 0x99,
//!     recipient: "ftp://user@host/dir",
//!     options: "priority 5",
//!     host_alias: "host",
//!     salt: 0,
//! };
//! assert_eq!(key.job_id(), key.job_id());
//! assert_ne!(host_id("a"), host_id("b"));
//! ```

/// Returns the CRC-32 of `bytes`.
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Incremental CRC-32 over a sequence of separated fields.
#[derive(Clone, Debug, Default)]
pub struct IdHasher {
    inner: crc32fast::Hasher,
    fields: usize,
}

impl IdHasher {
    /// Creates an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. Fields after the first are preceded by a NUL byte.
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        if self.fields > 0 {
            self.inner.update(&[0]);
        }
        self.inner.update(bytes);
        self.fields += 1;
        self
    }

    /// Appends a `u32` field in little-endian order.
    pub fn field_u32(&mut self, value: u32) -> &mut Self {
        self.field(&value.to_le_bytes())
    }

    /// Consumes the hasher and returns the checksum.
    #[must_use]
    pub fn finish(self) -> u32 {
        self.inner.finalize()
    }
}

/// Identifier of a host, derived from its alias.
#[must_use]
pub fn host_id(host_alias: &str) -> u32 {
    crc32(host_alias.as_bytes())
}

/// Identifier of a source directory, derived from its path or URL.
#[must_use]
pub fn dir_id(directory: &str) -> u32 {
    crc32(directory.as_bytes())
}

/// Identifier of the DIR_CONFIG file a job was read from.
#[must_use]
pub fn dir_config_id(path: &str) -> u32 {
    crc32(path.as_bytes())
}

/// Identifier of an ordered file-mask list.
///
/// Order matters: the first matching mask decides, so `["*", "!a"]` and
/// `["!a", "*"]` select different files and must hash differently.
#[must_use]
pub fn file_mask_id<S: AsRef<str>>(masks: &[S]) -> u32 {
    let mut hasher = IdHasher::new();
    for mask in masks {
        hasher.field(mask.as_ref().as_bytes());
    }
    hasher.finish()
}

/// Canonical tuple hashed into a job id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobKey<'a> {
    /// Source directory id.
    pub dir_id: u32,
    /// Id of the file-mask group the job belongs to.
    pub file_mask_id: u32,
    /// Canonicalised recipient URL.
    pub recipient: &'a str,
    /// Option string, one option per line joined by `'\n'`.
    pub options: &'a str,
    /// Host alias the recipient resolves to.
    pub host_alias: &'a str,
    /// Collision salt occupying the reserved last byte of the option string.
    pub salt: u8,
}

impl JobKey<'_> {
    /// Computes the job id for this tuple.
    #[must_use]
    pub fn job_id(&self) -> u32 {
        let mut options = Vec::with_capacity(self.options.len() + 1);
        options.extend_from_slice(self.options.as_bytes());
        options.push(self.salt);

        let mut hasher = IdHasher::new();
        hasher
            .field(self.recipient.as_bytes())
            .field_u32(self.file_mask_id)
            .field_u32(self.dir_id)
            .field(&options)
            .field(self.host_alias.as_bytes());
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key<'a>(recipient: &'a str, options: &'a str) -> JobKey<'a> {
        JobKey {
            dir_id: dir_id("/in/a"),
            file_mask_id: file_mask_id(&["*"]),
            recipient,
            options,
            host_alias: "h1",
            salt: 0,
        }
    }

    #[test]
    fn crc32_matches_reference_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn field_separator_prevents_concatenation_collisions() {
        let mut a = IdHasher::new();
        a.field(b"ab").field(b"c");
        let mut b = IdHasher::new();
        b.field(b"a").field(b"bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn mask_order_changes_id() {
        assert_ne!(file_mask_id(&["*", "!a"]), file_mask_id(&["!a", "*"]));
    }

    #[test]
    fn salt_changes_job_id() {
        let base = key("file:///out", "");
        let salted = JobKey { salt: 1, ..base };
        assert_ne!(base.job_id(), salted.job_id());
    }

    proptest! {
        #[test]
        fn job_id_is_deterministic(recipient in "[a-z:/@.]{1,40}", options in "[a-z0-9 \n]{0,40}") {
            let first = key(&recipient, &options).job_id();
            let second = key(&recipient, &options).job_id();
            prop_assert_eq!(first, second);
        }
    }
}
