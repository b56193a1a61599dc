//! Meta record layouts for the collection types
//!
//! Hash/set meta value: `count_i32 || version_u32 || expire_u32`.
//! List meta value: `count_i64 || version_u32 || expire_u32 || left_i64 || right_i64`.
//!
//! A meta is stale iff its count is zero or its expire has passed. The
//! mutable views rewrite fields inside the buffer that was read from the
//! engine, so the same allocation goes straight back out as the next
//! written value.

use crate::codec::{
    put_i32, put_i64, put_u32, read_i32, read_i64, read_u32, write_i32_at, write_i64_at,
    write_u32_at,
};
use crate::error::{Result, StoreError};
use crate::version::{now_secs, VersionGenerator};

pub const COLLECTION_META_LEN: usize = 12;
pub const LIST_META_LEN: usize = 32;

/// Fresh lists start both cursors at a fixed mid-point so they can grow
/// symmetrically on either end without rebalancing.
pub const INITIAL_LEFT_INDEX: i64 = i64::MAX / 2;
pub const INITIAL_RIGHT_INDEX: i64 = INITIAL_LEFT_INDEX + 1;

// field offsets, collection meta
const C_COUNT: usize = 0;
const C_VERSION: usize = 4;
const C_EXPIRE: usize = 8;

// field offsets, list meta
const L_COUNT: usize = 0;
const L_VERSION: usize = 8;
const L_EXPIRE: usize = 12;
const L_LEFT: usize = 16;
const L_RIGHT: usize = 24;

#[inline]
fn stale(count_is_zero: bool, expire: u32) -> bool {
    count_is_zero || (expire != 0 && expire <= now_secs())
}

/// Encode a hash/set meta record
pub fn encode_collection_meta(count: i32, version: u32, expire: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(COLLECTION_META_LEN);
    put_i32(&mut buf, count);
    put_u32(&mut buf, version);
    put_u32(&mut buf, expire);
    buf
}

/// Encode a list meta record
pub fn encode_list_meta(count: i64, version: u32, expire: u32, left: i64, right: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LIST_META_LEN);
    put_i64(&mut buf, count);
    put_u32(&mut buf, version);
    put_u32(&mut buf, expire);
    put_i64(&mut buf, left);
    put_i64(&mut buf, right);
    buf
}

/// Encode an empty list meta with fresh cursors
pub fn fresh_list_meta(version: u32) -> Vec<u8> {
    encode_list_meta(0, version, 0, INITIAL_LEFT_INDEX, INITIAL_RIGHT_INDEX)
}

// ==================== Read-only views ====================

/// Borrowed view over a hash/set meta, used by filters and plain reads
#[derive(Debug, Clone, Copy)]
pub struct CollectionMetaRef<'a> {
    data: &'a [u8],
}

impl<'a> CollectionMetaRef<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() != COLLECTION_META_LEN {
            return Err(StoreError::corruption("bad collection meta length"));
        }
        Ok(CollectionMetaRef { data })
    }

    pub fn count(&self) -> i32 {
        read_i32(&self.data[C_COUNT..])
    }

    pub fn version(&self) -> u32 {
        read_u32(&self.data[C_VERSION..])
    }

    pub fn expire(&self) -> u32 {
        read_u32(&self.data[C_EXPIRE..])
    }

    pub fn is_stale(&self) -> bool {
        stale(self.count() <= 0, self.expire())
    }
}

/// Borrowed view over a list meta
#[derive(Debug, Clone, Copy)]
pub struct ListMetaRef<'a> {
    data: &'a [u8],
}

impl<'a> ListMetaRef<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() != LIST_META_LEN {
            return Err(StoreError::corruption("bad list meta length"));
        }
        Ok(ListMetaRef { data })
    }

    pub fn count(&self) -> i64 {
        read_i64(&self.data[L_COUNT..])
    }

    pub fn version(&self) -> u32 {
        read_u32(&self.data[L_VERSION..])
    }

    pub fn expire(&self) -> u32 {
        read_u32(&self.data[L_EXPIRE..])
    }

    pub fn left(&self) -> i64 {
        read_i64(&self.data[L_LEFT..])
    }

    pub fn right(&self) -> i64 {
        read_i64(&self.data[L_RIGHT..])
    }

    pub fn is_stale(&self) -> bool {
        stale(self.count() <= 0, self.expire())
    }
}

// ==================== Mutable views ====================

/// Mutable view over a hash/set meta read from the engine
///
/// Field writers patch the underlying buffer, which the caller then puts
/// back as the new meta value.
pub struct CollectionMeta<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> CollectionMeta<'a> {
    pub fn parse(buf: &'a mut Vec<u8>) -> Result<Self> {
        if buf.len() != COLLECTION_META_LEN {
            return Err(StoreError::corruption("bad collection meta length"));
        }
        Ok(CollectionMeta { buf })
    }

    pub fn count(&self) -> i32 {
        read_i32(&self.buf[C_COUNT..])
    }

    pub fn version(&self) -> u32 {
        read_u32(&self.buf[C_VERSION..])
    }

    pub fn expire(&self) -> u32 {
        read_u32(&self.buf[C_EXPIRE..])
    }

    pub fn is_stale(&self) -> bool {
        stale(self.count() <= 0, self.expire())
    }

    pub fn set_count(&mut self, count: i32) {
        write_i32_at(self.buf, C_COUNT, count);
    }

    /// Adjust count by a signed delta
    pub fn modify_count(&mut self, delta: i32) {
        self.set_count(self.count() + delta);
    }

    pub fn set_expire(&mut self, expire: u32) {
        write_u32_at(self.buf, C_EXPIRE, expire);
    }

    pub fn set_relative_expire(&mut self, ttl: i64) {
        self.set_expire(now_secs().saturating_add(ttl.max(0) as u32));
    }

    /// Assign a fresh version and return it
    pub fn update_version(&mut self, versions: &VersionGenerator) -> u32 {
        let version = versions.next();
        write_u32_at(self.buf, C_VERSION, version);
        version
    }

    /// Reset to the logically-deleted state: zero count, fresh version,
    /// no expiry. Old subentries become orphans for the filter.
    pub fn mark_stale(&mut self, versions: &VersionGenerator) -> u32 {
        self.set_count(0);
        self.set_expire(0);
        self.update_version(versions)
    }
}

/// Mutable view over a list meta read from the engine
pub struct ListMeta<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> ListMeta<'a> {
    pub fn parse(buf: &'a mut Vec<u8>) -> Result<Self> {
        if buf.len() != LIST_META_LEN {
            return Err(StoreError::corruption("bad list meta length"));
        }
        Ok(ListMeta { buf })
    }

    pub fn count(&self) -> i64 {
        read_i64(&self.buf[L_COUNT..])
    }

    pub fn version(&self) -> u32 {
        read_u32(&self.buf[L_VERSION..])
    }

    pub fn expire(&self) -> u32 {
        read_u32(&self.buf[L_EXPIRE..])
    }

    pub fn left(&self) -> i64 {
        read_i64(&self.buf[L_LEFT..])
    }

    pub fn right(&self) -> i64 {
        read_i64(&self.buf[L_RIGHT..])
    }

    pub fn is_stale(&self) -> bool {
        stale(self.count() <= 0, self.expire())
    }

    pub fn set_count(&mut self, count: i64) {
        write_i64_at(self.buf, L_COUNT, count);
    }

    pub fn set_expire(&mut self, expire: u32) {
        write_u32_at(self.buf, L_EXPIRE, expire);
    }

    pub fn set_relative_expire(&mut self, ttl: i64) {
        self.set_expire(now_secs().saturating_add(ttl.max(0) as u32));
    }

    pub fn set_left(&mut self, left: i64) {
        write_i64_at(self.buf, L_LEFT, left);
    }

    pub fn set_right(&mut self, right: i64) {
        write_i64_at(self.buf, L_RIGHT, right);
    }

    pub fn update_version(&mut self, versions: &VersionGenerator) -> u32 {
        let version = versions.next();
        write_u32_at(self.buf, L_VERSION, version);
        version
    }

    /// Reset to the logically-deleted state and re-seed the cursors
    pub fn mark_stale(&mut self, versions: &VersionGenerator) -> u32 {
        self.set_count(0);
        self.set_expire(0);
        self.set_left(INITIAL_LEFT_INDEX);
        self.set_right(INITIAL_RIGHT_INDEX);
        self.update_version(versions)
    }
}
