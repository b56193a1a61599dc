//! Strings value layout: `payload_bytes || expire_u32`
//!
//! Strings have no subentries, so there is no count and no version; the
//! whole value is rewritten on every successful write.

use crate::codec::{put_u32, read_u32, write_u32_at};
use crate::error::{Result, StoreError};
use crate::version::now_secs;

/// Width of the expire suffix
pub const STRINGS_SUFFIX_LEN: usize = 4;

/// Encode a payload with an absolute expire timestamp (0 = no expiry)
pub fn encode_strings_value(payload: &[u8], expire: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + STRINGS_SUFFIX_LEN);
    buf.extend_from_slice(payload);
    put_u32(&mut buf, expire);
    buf
}

/// Borrowed view over an encoded strings value
#[derive(Debug, Clone, Copy)]
pub struct ParsedStringsValue<'a> {
    payload: &'a [u8],
    expire: u32,
}

impl<'a> ParsedStringsValue<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < STRINGS_SUFFIX_LEN {
            return Err(StoreError::corruption("strings value too short"));
        }
        let split = data.len() - STRINGS_SUFFIX_LEN;
        Ok(ParsedStringsValue {
            payload: &data[..split],
            expire: read_u32(&data[split..]),
        })
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn expire(&self) -> u32 {
        self.expire
    }

    pub fn is_stale(&self) -> bool {
        self.expire != 0 && self.expire <= now_secs()
    }
}

/// Drop the expire suffix, leaving just the payload in the buffer
pub fn strip_suffix(buf: &mut Vec<u8>) {
    let len = buf.len().saturating_sub(STRINGS_SUFFIX_LEN);
    buf.truncate(len);
}

/// Rewrite the expire suffix of an already-encoded value in place
pub fn set_expire(buf: &mut [u8], expire: u32) {
    let offset = buf.len() - STRINGS_SUFFIX_LEN;
    write_u32_at(buf, offset, expire);
}

/// Rewrite the expire suffix as `now + ttl`
pub fn set_relative_expire(buf: &mut [u8], ttl: i64) {
    set_expire(buf, now_secs().saturating_add(ttl.max(0) as u32));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let encoded = encode_strings_value(b"HELLO", 12345);
        let parsed = ParsedStringsValue::parse(&encoded).unwrap();
        assert_eq!(parsed.payload(), b"HELLO");
        assert_eq!(parsed.expire(), 12345);
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode_strings_value(b"", 0);
        assert_eq!(encoded.len(), STRINGS_SUFFIX_LEN);
        let parsed = ParsedStringsValue::parse(&encoded).unwrap();
        assert_eq!(parsed.payload(), b"");
        assert_eq!(parsed.expire(), 0);
    }

    #[test]
    fn test_truncated_is_corruption() {
        assert!(ParsedStringsValue::parse(b"ab").is_err());
    }

    #[test]
    fn test_staleness() {
        let live = encode_strings_value(b"v", 0);
        assert!(!ParsedStringsValue::parse(&live).unwrap().is_stale());

        let future = encode_strings_value(b"v", now_secs() + 100);
        assert!(!ParsedStringsValue::parse(&future).unwrap().is_stale());

        let past = encode_strings_value(b"v", 1);
        assert!(ParsedStringsValue::parse(&past).unwrap().is_stale());
    }

    #[test]
    fn test_strip_suffix() {
        let mut encoded = encode_strings_value(b"HELLO", 99);
        strip_suffix(&mut encoded);
        assert_eq!(encoded, b"HELLO");
    }

    #[test]
    fn test_set_expire_in_place() {
        let mut encoded = encode_strings_value(b"HELLO", 0);
        set_expire(&mut encoded, 777);
        let parsed = ParsedStringsValue::parse(&encoded).unwrap();
        assert_eq!(parsed.payload(), b"HELLO");
        assert_eq!(parsed.expire(), 777);
    }

    #[test]
    fn test_set_relative_expire() {
        let mut encoded = encode_strings_value(b"HELLO", 0);
        set_relative_expire(&mut encoded, 60);
        let parsed = ParsedStringsValue::parse(&encoded).unwrap();
        assert!(parsed.expire() >= now_secs() + 59);
    }
}
