//! Dupcheck flag word shared by HSA and DSA records.
//!
//! The flag word is 64 bits wide; the warn variants sit above bit 31.

/// Compare file names only.
pub const DC_FILENAME_ONLY: u64 = 1;
/// Compare file contents.
pub const DC_FILE_CONTENT: u64 = 2;
/// Compare file contents and name.
pub const DC_FILE_CONT_NAME: u64 = 4;
/// Compare names with the last suffix removed.
pub const DC_NAME_NO_SUFFIX: u64 = 8;
/// Compare name and size.
pub const DC_FILENAME_AND_SIZE: u64 = 16;
/// CRC-32 checksum (the only supported hash).
pub const DC_CRC32: u64 = 1 << 16;
/// Delete duplicates.
pub const DC_DELETE: u64 = 1 << 24;
/// Move duplicates to the store directory.
pub const DC_STORE: u64 = 1 << 25;
/// Only warn about duplicates.
pub const DC_WARN: u64 = 1 << 26;
/// Delete duplicates and warn.
pub const DC_DELETE_WARN: u64 = 1 << 33;
/// Store duplicates and warn.
pub const DC_STORE_WARN: u64 = 1 << 34;

/// Bits selecting what a duplicate is compared by.
pub const DC_CHECK_MASK: u64 =
    DC_FILENAME_ONLY | DC_FILE_CONTENT | DC_FILE_CONT_NAME | DC_NAME_NO_SUFFIX | DC_FILENAME_AND_SIZE;

/// Bits selecting what happens to a duplicate.
pub const DC_ACTION_MASK: u64 = DC_DELETE | DC_STORE | DC_WARN | DC_DELETE_WARN | DC_STORE_WARN;

/// Whether `flags` deletes duplicates.
#[must_use]
pub const fn deletes(flags: u64) -> bool {
    flags & (DC_DELETE | DC_DELETE_WARN) != 0
}

/// Whether `flags` moves duplicates to the store directory.
#[must_use]
pub const fn stores(flags: u64) -> bool {
    flags & (DC_STORE | DC_STORE_WARN) != 0
}

/// Whether `flags` logs a warning for each duplicate.
#[must_use]
pub const fn warns(flags: u64) -> bool {
    flags & (DC_WARN | DC_DELETE_WARN | DC_STORE_WARN) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_bits_need_sixty_four_bits() {
        assert!(DC_DELETE_WARN > u64::from(u32::MAX));
        assert!(deletes(DC_DELETE_WARN) && warns(DC_DELETE_WARN));
        assert!(stores(DC_STORE_WARN) && !deletes(DC_STORE_WARN));
        assert!(!warns(DC_DELETE));
    }
}
