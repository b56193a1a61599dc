//! On-disk byte layouts
//!
//! Pure encode/decode; no I/O and no staleness decisions. All multi-byte
//! integers are big-endian so encoded keys sort the way their logical
//! counterparts do.

pub mod meta;
pub mod strings;
pub mod subkey;

use byteordered::byteorder::{BigEndian, ByteOrder};

#[inline]
pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    let mut raw = [0u8; 4];
    BigEndian::write_u32(&mut raw, v);
    buf.extend_from_slice(&raw);
}

#[inline]
pub(crate) fn put_i32(buf: &mut Vec<u8>, v: i32) {
    let mut raw = [0u8; 4];
    BigEndian::write_i32(&mut raw, v);
    buf.extend_from_slice(&raw);
}

#[inline]
pub(crate) fn put_i64(buf: &mut Vec<u8>, v: i64) {
    let mut raw = [0u8; 8];
    BigEndian::write_i64(&mut raw, v);
    buf.extend_from_slice(&raw);
}

#[inline]
pub(crate) fn read_u32(buf: &[u8]) -> u32 {
    BigEndian::read_u32(buf)
}

#[inline]
pub(crate) fn read_i32(buf: &[u8]) -> i32 {
    BigEndian::read_i32(buf)
}

#[inline]
pub(crate) fn read_i64(buf: &[u8]) -> i64 {
    BigEndian::read_i64(buf)
}

#[inline]
pub(crate) fn write_u32_at(buf: &mut [u8], offset: usize, v: u32) {
    BigEndian::write_u32(&mut buf[offset..offset + 4], v);
}

#[inline]
pub(crate) fn write_i32_at(buf: &mut [u8], offset: usize, v: i32) {
    BigEndian::write_i32(&mut buf[offset..offset + 4], v);
}

#[inline]
pub(crate) fn write_i64_at(buf: &mut [u8], offset: usize, v: i64) {
    BigEndian::write_i64(&mut buf[offset..offset + 8], v);
}

// ==================== Numeric payloads ====================
//
// Incrby/Hincrby and friends reinterpret a stored payload as a number.
// A payload that fails to parse is corruption from the command's point
// of view, not an invalid argument.

pub(crate) fn parse_i64_payload(payload: &[u8]) -> crate::error::Result<i64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| crate::error::StoreError::corruption("value is not an integer"))
}

pub(crate) fn parse_f64_payload(payload: &[u8]) -> crate::error::Result<f64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| crate::error::StoreError::corruption("value is not a valid float"))
}

/// Render a float the way Redis does: shortest representation that
/// round-trips, no trailing zeros, integral values without a dot.
pub(crate) fn format_f64_payload(v: f64) -> Vec<u8> {
    format!("{}", v).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 0xDEAD_BEEF);
        assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(read_u32(&buf), 0xDEAD_BEEF);
    }

    #[test]
    fn test_i64_round_trip() {
        let mut buf = Vec::new();
        put_i64(&mut buf, -42);
        assert_eq!(read_i64(&buf), -42);
    }

    #[test]
    fn test_big_endian_sorts_numerically() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        put_i64(&mut a, 1);
        put_i64(&mut b, 256);
        assert!(a < b);
    }

    #[test]
    fn test_write_at() {
        let mut buf = vec![0u8; 8];
        write_u32_at(&mut buf, 4, 7);
        assert_eq!(read_u32(&buf[4..]), 7);
    }

    #[test]
    fn test_parse_i64_payload() {
        assert_eq!(parse_i64_payload(b"42").unwrap(), 42);
        assert_eq!(parse_i64_payload(b"-7").unwrap(), -7);
        assert!(parse_i64_payload(b"4.2").is_err());
        assert!(parse_i64_payload(b"forty").is_err());
        assert!(parse_i64_payload(b" 1").is_err());
    }

    #[test]
    fn test_parse_f64_payload() {
        assert_eq!(parse_f64_payload(b"3.5").unwrap(), 3.5);
        assert!(parse_f64_payload(b"nan").is_err());
        assert!(parse_f64_payload(b"inf").is_err());
        assert!(parse_f64_payload(b"pi").is_err());
    }

    #[test]
    fn test_format_f64_payload() {
        assert_eq!(format_f64_payload(3.5), b"3.5");
        assert_eq!(format_f64_payload(3.0), b"3");
        assert_eq!(format_f64_payload(-0.25), b"-0.25");
    }
}
