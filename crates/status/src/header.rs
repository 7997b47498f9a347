use crate::codec::{get_i32, get_u32, put_i32, put_u32};

/// Size of the header that precedes the records of every status file.
pub const AFD_WORD_OFFSET: usize = 16;

/// Header flag: the file was replaced by a rebuild; reopen it by path.
pub const STALE: u8 = 0x01;

/// Decoded status-file header.
///
/// | bytes | field |
/// |---|---|
/// | `0..4` | record count |
/// | `4` | feature flags |
/// | `7` | version |
/// | `8..12` | page size |
/// | `12..16` | generation |
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    /// Number of records following the header.
    pub count: usize,
    /// Feature flags such as [`STALE`].
    pub flags: u8,
    /// Layout version of the records.
    pub version: u8,
    /// Page size of the writer.
    pub pagesize: u32,
    /// Bumped on every rebuild.
    pub generation: u32,
}

impl Header {
    /// Decodes the first [`AFD_WORD_OFFSET`] bytes of `buf`.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            count: get_i32(buf, 0).max(0) as usize,
            flags: buf[4],
            version: buf[7],
            pagesize: get_u32(buf, 8),
            generation: get_u32(buf, 12),
        }
    }

    /// Encodes into the first [`AFD_WORD_OFFSET`] bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        put_i32(buf, 0, self.count as i32);
        buf[4] = self.flags;
        buf[5] = 0;
        buf[6] = 0;
        buf[7] = self.version;
        put_u32(buf, 8, self.pagesize);
        put_u32(buf, 12, self.generation);
    }

    /// Whether the [`STALE`] flag is set.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.flags & STALE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_sit_at_fixed_offsets() {
        let header = Header {
            count: 3,
            flags: STALE,
            version: 7,
            pagesize: 4096,
            generation: 9,
        };
        let mut buf = [0_u8; AFD_WORD_OFFSET];
        header.encode(&mut buf);
        assert_eq!(&buf[..4], &3_i32.to_le_bytes());
        assert_eq!(buf[4], STALE);
        assert_eq!(buf[7], 7);
        assert_eq!(&buf[8..12], &4096_u32.to_le_bytes());
        assert_eq!(Header::decode(&buf), header);
        assert!(header.is_stale());
    }
}
