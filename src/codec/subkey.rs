//! Subentry key layouts
//!
//! Hash fields, set members, and list nodes all share one shape:
//!
//! `len(user_key)_u32 || user_key || version_u32 || suffix`
//!
//! The length prefix keeps all subentries of one user key contiguous in
//! the column family regardless of what the suffix contains, and the
//! embedded version makes subentries from an older epoch inert without
//! touching them. For list nodes the suffix is the node's absolute index,
//! big-endian so nodes iterate in list order.

use crate::codec::{put_i64, put_u32, read_i64, read_u32};
use crate::error::{Result, StoreError};

/// Bytes before the suffix: length prefix plus user key plus version
#[inline]
fn header_len(user_key_len: usize) -> usize {
    4 + user_key_len + 4
}

/// Encode `len || user_key || version || suffix`
pub fn encode_subkey(user_key: &[u8], version: u32, suffix: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header_len(user_key.len()) + suffix.len());
    put_u32(&mut buf, user_key.len() as u32);
    buf.extend_from_slice(user_key);
    put_u32(&mut buf, version);
    buf.extend_from_slice(suffix);
    buf
}

/// Encode just `len || user_key || version`, the seek prefix shared by
/// every subentry of one (key, version) pair
pub fn encode_subkey_prefix(user_key: &[u8], version: u32) -> Vec<u8> {
    encode_subkey(user_key, version, &[])
}

/// Encode a list node key; the suffix is the absolute node index
pub fn encode_list_node_key(user_key: &[u8], version: u32, index: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header_len(user_key.len()) + 8);
    put_u32(&mut buf, user_key.len() as u32);
    buf.extend_from_slice(user_key);
    put_u32(&mut buf, version);
    put_i64(&mut buf, index);
    buf
}

/// Borrowed view over an encoded subentry key
///
/// Binds to the engine-handed byte region; nothing is copied out.
#[derive(Debug, Clone, Copy)]
pub struct SubKeyRef<'a> {
    user_key: &'a [u8],
    version: u32,
    suffix: &'a [u8],
}

impl<'a> SubKeyRef<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(StoreError::corruption("subkey too short"));
        }
        let key_len = read_u32(data) as usize;
        let header = header_len(key_len);
        if data.len() < header {
            return Err(StoreError::corruption("subkey shorter than its header"));
        }
        Ok(SubKeyRef {
            user_key: &data[4..4 + key_len],
            version: read_u32(&data[4 + key_len..]),
            suffix: &data[header..],
        })
    }

    pub fn user_key(&self) -> &'a [u8] {
        self.user_key
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn suffix(&self) -> &'a [u8] {
        self.suffix
    }

    /// Interpret the suffix as a list node index
    pub fn index(&self) -> Result<i64> {
        if self.suffix.len() != 8 {
            return Err(StoreError::corruption("list node key without index"));
        }
        Ok(read_i64(self.suffix))
    }
}
