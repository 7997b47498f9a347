//! Little-endian field access for fixed-size records.

macro_rules! scalar {
    ($get:ident, $put:ident, $ty:ty) => {
        #[inline]
        pub(crate) fn $get(buf: &[u8], offset: usize) -> $ty {
            let mut raw = [0_u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(&buf[offset..offset + std::mem::size_of::<$ty>()]);
            <$ty>::from_le_bytes(raw)
        }

        #[inline]
        pub(crate) fn $put(buf: &mut [u8], offset: usize, value: $ty) {
            buf[offset..offset + std::mem::size_of::<$ty>()].copy_from_slice(&value.to_le_bytes());
        }
    };
}

scalar!(get_u16, put_u16, u16);
scalar!(get_u32, put_u32, u32);
scalar!(get_i32, put_i32, i32);
scalar!(get_u64, put_u64, u64);
scalar!(get_i64, put_i64, i64);

#[inline]
pub(crate) fn get_u8(buf: &[u8], offset: usize) -> u8 {
    buf[offset]
}

#[inline]
pub(crate) fn put_u8(buf: &mut [u8], offset: usize, value: u8) {
    buf[offset] = value;
}

#[inline]
pub(crate) fn get_i8(buf: &[u8], offset: usize) -> i8 {
    buf[offset] as i8
}

#[inline]
pub(crate) fn put_i8(buf: &mut [u8], offset: usize, value: i8) {
    buf[offset] = value as u8;
}

/// Reads a NUL-terminated string stored in a `len`-byte field.
pub(crate) fn get_str(buf: &[u8], offset: usize, len: usize) -> String {
    let field = &buf[offset..offset + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Stores `value` in a `len`-byte field, truncated on a character boundary
/// so at least one NUL byte remains.
pub(crate) fn put_str(buf: &mut [u8], offset: usize, len: usize, value: &str) {
    let field = &mut buf[offset..offset + len];
    field.fill(0);
    let mut end = value.len().min(len.saturating_sub(1));
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&value.as_bytes()[..end]);
}
