//! Strings store
//!
//! Single column family. Every successful write replaces the whole
//! encoded value (`payload || expire`), which means read-modify-write
//! commands like Append and Setrange re-encode with `expire = 0`: a
//! mutated string loses its timeout. Reads treat an expired value as
//! absent; the compaction filter physically drops it later.

use std::path::Path;

use log::info;
use rocksdb::{IteratorMode, DB};

use crate::codec::strings::{
    encode_strings_value, set_expire, set_relative_expire, strip_suffix, ParsedStringsValue,
};
use crate::codec::{format_f64_payload, parse_f64_payload, parse_i64_payload};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::strings_compaction_filter;
use crate::glob::glob_match;
use crate::lock::LockManager;
use crate::types::{BitOpType, KeyValue};
use crate::version::now_secs;

/// Total string length cap for Setrange/SetBit growth (512 MB)
const MAX_STRING_LEN: i64 = 1 << 29;

/// Bits set per byte value
const BITS_IN_BYTE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
};

pub struct StringsStore {
    db: DB,
    locks: LockManager,
}

impl StringsStore {
    pub(crate) fn open(config: &StoreConfig, path: &Path) -> Result<Self> {
        let mut opts = config.engine_options();
        opts.set_compaction_filter("strata-strings-filter", strings_compaction_filter);

        let db = DB::open(&opts, path)?;
        info!("strings database opened at {}", path.display());

        Ok(StringsStore {
            db,
            locks: LockManager::new(),
        })
    }

    /// Read the raw encoded value if it exists and is not stale
    fn read_live(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.db.get(key)? {
            None => Ok(None),
            Some(value) => {
                let parsed = ParsedStringsValue::parse(&value)?;
                if parsed.is_stale() {
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    /// Live payload bytes, with the suffix already stripped
    fn read_live_payload(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read_live(key)?.map(|mut value| {
            strip_suffix(&mut value);
            value
        }))
    }

    // ==================== Basic commands ====================

    /// Overwrite the value under `key`, clearing any expiry
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        self.db.put(key, encode_strings_value(value, 0))?;
        Ok(())
    }

    /// Set with a relative timeout in seconds
    pub fn setex(&self, key: &[u8], value: &[u8], ttl: i64) -> Result<()> {
        if ttl <= 0 {
            return Err(StoreError::invalid_argument("invalid expire time"));
        }
        let expire = now_secs().saturating_add(ttl as u32);
        let _lock = self.locks.acquire(key);
        self.db.put(key, encode_strings_value(value, expire))?;
        Ok(())
    }

    /// Set only if the key holds no live value. Returns 1 if written.
    pub fn setnx(&self, key: &[u8], value: &[u8]) -> Result<i32> {
        let _lock = self.locks.acquire(key);
        if self.read_live(key)?.is_some() {
            return Ok(0);
        }
        self.db.put(key, encode_strings_value(value, 0))?;
        Ok(1)
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.read_live_payload(key)?.ok_or(StoreError::NotFound)
    }

    /// Write the new value and return the previous live payload, if any
    pub fn get_set(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        let _lock = self.locks.acquire(key);
        let old = self.read_live_payload(key)?;
        self.db.put(key, encode_strings_value(value, 0))?;
        Ok(old)
    }

    pub fn strlen(&self, key: &[u8]) -> Result<i64> {
        Ok(self.get(key)?.len() as i64)
    }

    /// Concatenate onto the existing payload (or create it). The expiry
    /// is cleared: an appended value is a new value.
    pub fn append(&self, key: &[u8], value: &[u8]) -> Result<i64> {
        let _lock = self.locks.acquire(key);
        let new_payload = match self.read_live_payload(key)? {
            Some(mut payload) => {
                payload.extend_from_slice(value);
                payload
            }
            None => value.to_vec(),
        };
        let len = new_payload.len() as i64;
        self.db.put(key, encode_strings_value(&new_payload, 0))?;
        Ok(len)
    }

    /// Overwrite `value` at byte `offset`, padding any gap with NULs.
    /// Returns the new length. An empty `value` writes nothing and
    /// reports the current length.
    pub fn setrange(&self, key: &[u8], offset: i64, value: &[u8]) -> Result<i64> {
        if offset < 0 {
            return Err(StoreError::invalid_argument("offset < 0"));
        }
        if offset + value.len() as i64 > MAX_STRING_LEN {
            return Err(StoreError::invalid_argument(
                "string exceeds maximum allowed size",
            ));
        }

        let _lock = self.locks.acquire(key);
        let mut payload = self.read_live_payload(key)?.unwrap_or_default();
        if value.is_empty() {
            return Ok(payload.len() as i64);
        }

        let offset = offset as usize;
        let end = offset + value.len();
        if payload.len() < end {
            payload.resize(end, 0);
        }
        payload[offset..end].copy_from_slice(value);

        let len = payload.len() as i64;
        self.db.put(key, encode_strings_value(&payload, 0))?;
        Ok(len)
    }

    // ==================== Batch commands ====================

    /// Overwrite several keys atomically
    pub fn mset(&self, kvs: &[KeyValue]) -> Result<()> {
        let keys: Vec<&[u8]> = kvs.iter().map(|kv| kv.key.as_slice()).collect();
        let _locks = self.locks.acquire_multi(&keys);

        let mut batch = rocksdb::WriteBatch::default();
        for kv in kvs {
            batch.put(&kv.key, encode_strings_value(&kv.value, 0));
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Per-key reads; stale or absent keys yield `None`
    pub fn mget(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.read_live_payload(key)).collect()
    }

    /// Write all pairs, or none if any key already holds a live value.
    /// Returns 1 when the batch was applied.
    pub fn msetnx(&self, kvs: &[KeyValue]) -> Result<i32> {
        let keys: Vec<&[u8]> = kvs.iter().map(|kv| kv.key.as_slice()).collect();
        let _locks = self.locks.acquire_multi(&keys);

        for kv in kvs {
            if self.read_live(&kv.key)?.is_some() {
                return Ok(0);
            }
        }
        let mut batch = rocksdb::WriteBatch::default();
        for kv in kvs {
            batch.put(&kv.key, encode_strings_value(&kv.value, 0));
        }
        self.db.write(batch)?;
        Ok(1)
    }

    // ==================== Numeric commands ====================

    fn incr_decr(&self, key: &[u8], delta: i64) -> Result<i64> {
        let _lock = self.locks.acquire(key);
        let current = match self.read_live_payload(key)? {
            Some(payload) => parse_i64_payload(&payload)?,
            None => 0,
        };
        let result = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::invalid_argument("increment or decrement would overflow"))?;
        self.db
            .put(key, encode_strings_value(result.to_string().as_bytes(), 0))?;
        Ok(result)
    }

    pub fn incrby(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.incr_decr(key, delta)
    }

    pub fn decrby(&self, key: &[u8], delta: i64) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| StoreError::invalid_argument("increment or decrement would overflow"))?;
        self.incr_decr(key, delta)
    }

    /// Add a float delta; the stored representation drops trailing zeros
    pub fn incrbyfloat(&self, key: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        let delta = parse_f64_payload(delta)
            .map_err(|_| StoreError::invalid_argument("value is not a valid float"))?;

        let _lock = self.locks.acquire(key);
        let current = match self.read_live_payload(key)? {
            Some(payload) => parse_f64_payload(&payload)?,
            None => 0.0,
        };
        let result = current + delta;
        if !result.is_finite() {
            return Err(StoreError::invalid_argument(
                "increment would produce NaN or Infinity",
            ));
        }
        let rendered = format_f64_payload(result);
        self.db.put(key, encode_strings_value(&rendered, 0))?;
        Ok(rendered)
    }

    // ==================== Bit commands ====================

    /// Set the bit at `offset` to `bit` (0 or 1), returning the old bit
    pub fn setbit(&self, key: &[u8], offset: i64, bit: i32) -> Result<i32> {
        if offset < 0 || offset >= MAX_STRING_LEN * 8 {
            return Err(StoreError::invalid_argument("bit offset out of range"));
        }
        if bit != 0 && bit != 1 {
            return Err(StoreError::invalid_argument("bit is not 0 or 1"));
        }

        let byte_pos = (offset >> 3) as usize;
        let bit_mask = 1u8 << (7 - (offset & 0x7));

        let _lock = self.locks.acquire(key);
        let mut payload = self.read_live_payload(key)?.unwrap_or_default();
        if payload.len() <= byte_pos {
            payload.resize(byte_pos + 1, 0);
        }

        let old = i32::from(payload[byte_pos] & bit_mask != 0);
        if bit == 1 {
            payload[byte_pos] |= bit_mask;
        } else {
            payload[byte_pos] &= !bit_mask;
        }
        self.db.put(key, encode_strings_value(&payload, 0))?;
        Ok(old)
    }

    /// Read the bit at `offset`; bits past the end are 0
    pub fn getbit(&self, key: &[u8], offset: i64) -> Result<i32> {
        if offset < 0 {
            return Err(StoreError::invalid_argument("bit offset out of range"));
        }
        let payload = match self.read_live_payload(key)? {
            Some(payload) => payload,
            None => return Ok(0),
        };
        let byte_pos = (offset >> 3) as usize;
        if byte_pos >= payload.len() {
            return Ok(0);
        }
        Ok(i32::from(payload[byte_pos] & (1 << (7 - (offset & 0x7))) != 0))
    }

    /// Count set bits, optionally within a byte range. Negative bounds
    /// count from the end; the range is clamped to the payload.
    pub fn bitcount(&self, key: &[u8], range: Option<(i64, i64)>) -> Result<i64> {
        let payload = self.read_live_payload(key)?.ok_or(StoreError::NotFound)?;
        let len = payload.len() as i64;

        let (start, end) = match range {
            None => (0, len - 1),
            Some((mut start, mut end)) => {
                if start < 0 {
                    start += len;
                }
                if end < 0 {
                    end += len;
                }
                start = start.max(0);
                end = end.max(0).min(len - 1);
                if start > end {
                    return Ok(0);
                }
                (start, end)
            }
        };

        if len == 0 {
            return Ok(0);
        }
        let mut bits = 0i64;
        for &byte in &payload[start as usize..=end as usize] {
            bits += i64::from(BITS_IN_BYTE[byte as usize]);
        }
        Ok(bits)
    }

    /// Combine source payloads bitwise into `dest`; missing sources act
    /// as empty. Returns the length of the stored result.
    pub fn bitop(&self, op: BitOpType, dest: &[u8], src_keys: &[&[u8]]) -> Result<i64> {
        if src_keys.is_empty() {
            return Err(StoreError::invalid_argument("BitOp needs a source key"));
        }
        if op == BitOpType::Not && src_keys.len() != 1 {
            return Err(StoreError::invalid_argument(
                "BitOp Not must be called with a single source key",
            ));
        }

        let mut sources = Vec::with_capacity(src_keys.len());
        for key in src_keys {
            sources.push(self.read_live_payload(key)?.unwrap_or_default());
        }

        let max_len = sources.iter().map(Vec::len).max().unwrap_or(0);
        let mut result = vec![0u8; max_len];
        match op {
            BitOpType::Not => {
                for (out, &byte) in result.iter_mut().zip(sources[0].iter()) {
                    *out = !byte;
                }
            }
            BitOpType::And | BitOpType::Or | BitOpType::Xor => {
                for (i, out) in result.iter_mut().enumerate() {
                    let mut acc = *sources[0].get(i).unwrap_or(&0);
                    for source in &sources[1..] {
                        let byte = *source.get(i).unwrap_or(&0);
                        acc = match op {
                            BitOpType::And => acc & byte,
                            BitOpType::Or => acc | byte,
                            _ => acc ^ byte,
                        };
                    }
                    *out = acc;
                }
            }
        }

        let len = result.len() as i64;
        let _lock = self.locks.acquire(dest);
        self.db.put(dest, encode_strings_value(&result, 0))?;
        Ok(len)
    }

    /// Position of the first bit equal to `bit`, searching the byte
    /// range `[start, end]` (defaults to the whole payload). A missing
    /// key acts as an empty string: -1 for a set bit, 0 for a clear one.
    pub fn bitpos(&self, key: &[u8], bit: i32, range: Option<(i64, Option<i64>)>) -> Result<i64> {
        if bit != 0 && bit != 1 {
            return Err(StoreError::invalid_argument("bit is not 0 or 1"));
        }

        let payload = match self.read_live_payload(key)? {
            Some(payload) => payload,
            None => return Ok(if bit == 1 { -1 } else { 0 }),
        };
        let len = payload.len() as i64;
        let explicit_end = matches!(range, Some((_, Some(_))));

        let (mut start, mut end) = match range {
            None => (0, len - 1),
            Some((start, end)) => (start, end.unwrap_or(len - 1)),
        };
        if start < 0 {
            start += len;
        }
        if end < 0 {
            end += len;
        }
        start = start.max(0);
        end = end.max(0).min(len - 1);
        if start > end || len == 0 {
            return Ok(-1);
        }

        for byte_pos in start..=end {
            let byte = payload[byte_pos as usize];
            let looking_for_set = bit == 1;
            if (looking_for_set && byte != 0) || (!looking_for_set && byte != 0xFF) {
                for bit_pos in 0..8 {
                    let is_set = byte & (1 << (7 - bit_pos)) != 0;
                    if is_set == looking_for_set {
                        return Ok(byte_pos * 8 + bit_pos);
                    }
                }
            }
        }

        // Searching for 0 over an unbounded range hits the imaginary
        // zero just past the end of the string.
        if bit == 0 && !explicit_end {
            return Ok(len * 8);
        }
        Ok(-1)
    }

    // ==================== Lifecycle ====================

    /// `ttl > 0` rewrites the expiry in place; `ttl <= 0` deletes
    pub fn expire(&self, key: &[u8], ttl: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut value = self.read_live(key)?.ok_or(StoreError::NotFound)?;
        if ttl > 0 {
            set_relative_expire(&mut value, ttl);
            self.db.put(key, value)?;
        } else {
            self.db.delete(key)?;
        }
        Ok(())
    }

    /// Set an absolute expire timestamp; one in the past deletes
    pub fn expireat(&self, key: &[u8], timestamp: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut value = self.read_live(key)?.ok_or(StoreError::NotFound)?;
        if timestamp > i64::from(now_secs()) {
            set_expire(&mut value, timestamp as u32);
            self.db.put(key, value)?;
        } else {
            self.db.delete(key)?;
        }
        Ok(())
    }

    /// Clear the expiry. NotFound if the key is absent or has none.
    pub fn persist(&self, key: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut value = self.read_live(key)?.ok_or(StoreError::NotFound)?;
        let parsed = ParsedStringsValue::parse(&value)?;
        if parsed.expire() == 0 {
            return Err(StoreError::NotFound);
        }
        set_expire(&mut value, 0);
        self.db.put(key, value)?;
        Ok(())
    }

    /// Remaining TTL in seconds; -1 when the key has no expiry
    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        let value = self.read_live(key)?.ok_or(StoreError::NotFound)?;
        let parsed = ParsedStringsValue::parse(&value)?;
        if parsed.expire() == 0 {
            Ok(-1)
        } else {
            Ok(i64::from(parsed.expire()) - i64::from(now_secs()))
        }
    }

    pub fn del(&self, key: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        if self.read_live(key)?.is_none() {
            return Err(StoreError::NotFound);
        }
        self.db.delete(key)?;
        Ok(())
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.read_live(key)?.is_some())
    }

    /// Walk live keys from `start_key`, collecting pattern matches into
    /// `keys` until `count` live entries have been examined. Returns the
    /// key to resume from, or None when the type is exhausted.
    pub fn scan_keys(
        &self,
        start_key: &[u8],
        pattern: &[u8],
        count: &mut i64,
        keys: &mut Vec<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(start_key, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if *count <= 0 {
                return Ok(Some(key.into_vec()));
            }
            let parsed = ParsedStringsValue::parse(&value)?;
            if parsed.is_stale() {
                continue;
            }
            if glob_match(pattern, &key) {
                keys.push(key.into_vec());
            }
            *count -= 1;
        }
        Ok(None)
    }

    /// Force a full compaction so the filter reclaims stale values
    pub fn compact(&self) -> Result<()> {
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn open_store(dir: &tempfile::TempDir) -> StringsStore {
        StringsStore::open(&StoreConfig::create(), dir.path()).unwrap()
    }

    #[test]
    fn test_set_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"V").unwrap();
        assert_eq!(store.get(b"K").unwrap(), b"V");
        assert!(store.get(b"missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_setex_then_strlen() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.setex(b"K", b"HELLO", 60).unwrap();
        assert_eq!(store.strlen(b"K").unwrap(), 5);
        assert!(store.setex(b"K", b"HELLO", 0).unwrap_err().to_string().contains("expire"));
    }

    #[test]
    fn test_expire_then_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"V").unwrap();
        store.expire(b"K", 1).unwrap();
        assert_eq!(store.get(b"K").unwrap(), b"V");
        thread::sleep(Duration::from_secs(2));
        assert!(store.get(b"K").unwrap_err().is_not_found());
    }

    #[test]
    fn test_expire_non_positive_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"V").unwrap();
        store.expire(b"K", 0).unwrap();
        assert!(store.get(b"K").unwrap_err().is_not_found());
        assert!(store.expire(b"K", 10).unwrap_err().is_not_found());
    }

    #[test]
    fn test_setnx() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.setnx(b"K", b"first").unwrap(), 1);
        assert_eq!(store.setnx(b"K", b"second").unwrap(), 0);
        assert_eq!(store.get(b"K").unwrap(), b"first");

        // a stale value does not block setnx
        store.setex(b"E", b"v", 1).unwrap();
        thread::sleep(Duration::from_secs(2));
        assert_eq!(store.setnx(b"E", b"fresh").unwrap(), 1);
    }

    #[test]
    fn test_get_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.get_set(b"K", b"one").unwrap(), None);
        assert_eq!(store.get_set(b"K", b"two").unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get(b"K").unwrap(), b"two");
    }

    #[test]
    fn test_append_clears_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.setex(b"K", b"HELLO", 60).unwrap();
        assert_eq!(store.append(b"K", b" WORLD").unwrap(), 11);
        assert_eq!(store.get(b"K").unwrap(), b"HELLO WORLD");
        assert_eq!(store.ttl(b"K").unwrap(), -1);

        assert_eq!(store.append(b"fresh", b"abc").unwrap(), 3);
    }

    #[test]
    fn test_setrange() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"Hello World").unwrap();
        assert_eq!(store.setrange(b"K", 6, b"Redis").unwrap(), 11);
        assert_eq!(store.get(b"K").unwrap(), b"Hello Redis");

        // gap past the end is NUL-padded
        assert_eq!(store.setrange(b"P", 3, b"x").unwrap(), 4);
        assert_eq!(store.get(b"P").unwrap(), b"\0\0\0x");

        assert!(store.setrange(b"K", -1, b"x").unwrap_err().to_string().contains("offset"));

        // empty value reports length without creating anything
        assert_eq!(store.setrange(b"nothing", 5, b"").unwrap(), 0);
        assert!(store.get(b"nothing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_incr_decr() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.incrby(b"N", 5).unwrap(), 5);
        assert_eq!(store.incrby(b"N", 3).unwrap(), 8);
        assert_eq!(store.decrby(b"N", 10).unwrap(), -2);

        store.set(b"S", b"not a number").unwrap();
        assert!(matches!(
            store.incrby(b"S", 1),
            Err(StoreError::Corruption(_))
        ));

        store.set(b"M", i64::MAX.to_string().as_bytes()).unwrap();
        assert!(matches!(
            store.incrby(b"M", 1),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_incrbyfloat() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.incrbyfloat(b"F", b"10.5").unwrap(), b"10.5");
        assert_eq!(store.incrbyfloat(b"F", b"0.1").unwrap(), b"10.6");
        // trailing zeros are not rendered
        assert_eq!(store.incrbyfloat(b"F", b"0.4").unwrap(), b"11");

        assert!(matches!(
            store.incrbyfloat(b"F", b"nan"),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bits() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.setbit(b"B", 7, 1).unwrap(), 0);
        assert_eq!(store.getbit(b"B", 7).unwrap(), 1);
        assert_eq!(store.getbit(b"B", 6).unwrap(), 0);
        assert_eq!(store.getbit(b"B", 1000).unwrap(), 0);
        assert_eq!(store.get(b"B").unwrap(), b"\x01");

        store.set(b"C", b"foobar").unwrap();
        assert_eq!(store.bitcount(b"C", None).unwrap(), 26);
        assert_eq!(store.bitcount(b"C", Some((0, 0))).unwrap(), 4);
        assert_eq!(store.bitcount(b"C", Some((1, 1))).unwrap(), 6);
        assert_eq!(store.bitcount(b"C", Some((-2, -1))).unwrap(), 7);
    }

    #[test]
    fn test_bitop() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"a", b"abc").unwrap();
        store.set(b"b", b"ab").unwrap();

        assert_eq!(store.bitop(BitOpType::And, b"d", &[b"a", b"b"]).unwrap(), 3);
        assert_eq!(store.get(b"d").unwrap(), b"ab\0");

        assert_eq!(store.bitop(BitOpType::Xor, b"x", &[b"a", b"a"]).unwrap(), 3);
        assert_eq!(store.get(b"x").unwrap(), b"\0\0\0");

        assert!(store.bitop(BitOpType::Not, b"n", &[b"a", b"b"]).is_err());
        assert_eq!(store.bitop(BitOpType::Not, b"n", &[b"a"]).unwrap(), 3);
    }

    #[test]
    fn test_bitpos() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"B", b"\x00\x0f\x00").unwrap();
        assert_eq!(store.bitpos(b"B", 1, None).unwrap(), 12);
        assert_eq!(store.bitpos(b"B", 1, Some((2, None))).unwrap(), -1);
        assert_eq!(store.bitpos(b"B", 0, None).unwrap(), 0);

        store.set(b"ones", b"\xff\xff").unwrap();
        // without an explicit end the first 0 is just past the string
        assert_eq!(store.bitpos(b"ones", 0, None).unwrap(), 16);
        assert_eq!(store.bitpos(b"ones", 0, Some((0, Some(1)))).unwrap(), -1);

        assert_eq!(store.bitpos(b"missing", 1, None).unwrap(), -1);
        assert_eq!(store.bitpos(b"missing", 0, None).unwrap(), 0);
    }

    #[test]
    fn test_mset_mget_msetnx() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store
            .mset(&[
                KeyValue { key: b"k1".to_vec(), value: b"v1".to_vec() },
                KeyValue { key: b"k2".to_vec(), value: b"v2".to_vec() },
            ])
            .unwrap();
        let values = store.mget(&[b"k1", b"k2", b"k3"]).unwrap();
        assert_eq!(values[0], Some(b"v1".to_vec()));
        assert_eq!(values[1], Some(b"v2".to_vec()));
        assert_eq!(values[2], None);

        // msetnx is all-or-nothing
        let ret = store
            .msetnx(&[
                KeyValue { key: b"k3".to_vec(), value: b"v3".to_vec() },
                KeyValue { key: b"k1".to_vec(), value: b"clobber".to_vec() },
            ])
            .unwrap();
        assert_eq!(ret, 0);
        assert!(store.get(b"k3").unwrap_err().is_not_found());
        assert_eq!(store.get(b"k1").unwrap(), b"v1");
    }

    #[test]
    fn test_persist_and_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"V").unwrap();
        assert_eq!(store.ttl(b"K").unwrap(), -1);
        assert!(store.persist(b"K").unwrap_err().is_not_found());

        store.expire(b"K", 100).unwrap();
        let remaining = store.ttl(b"K").unwrap();
        assert!(remaining > 90 && remaining <= 100);

        store.persist(b"K").unwrap();
        assert_eq!(store.ttl(b"K").unwrap(), -1);
    }

    #[test]
    fn test_del_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set(b"K", b"V").unwrap();
        assert!(store.exists(b"K").unwrap());
        store.del(b"K").unwrap();
        assert!(!store.exists(b"K").unwrap());
        assert!(store.del(b"K").unwrap_err().is_not_found());
    }

    #[test]
    fn test_compaction_reclaims_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.setex(b"gone", b"V", 1).unwrap();
        store.set(b"kept", b"V").unwrap();
        thread::sleep(Duration::from_secs(2));
        store.compact().unwrap();

        // physically removed, not just hidden
        assert!(store.db.get(b"gone").unwrap().is_none());
        assert!(store.db.get(b"kept").unwrap().is_some());
    }

    #[test]
    fn test_scan_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        for i in 0..5 {
            store.set(format!("SCAN_KEY{}", i).as_bytes(), b"v").unwrap();
        }
        store.set(b"OTHER", b"v").unwrap();

        let mut keys = Vec::new();
        let mut count = 100;
        let next = store.scan_keys(b"", b"SCAN*", &mut count, &mut keys).unwrap();
        assert!(next.is_none());
        assert_eq!(keys.len(), 5);

        // resume after a small examine count
        let mut keys = Vec::new();
        let mut count = 2;
        let next = store.scan_keys(b"", b"*", &mut count, &mut keys).unwrap();
        let resume = next.unwrap();
        let mut count = 100;
        let mut rest = Vec::new();
        assert!(store.scan_keys(&resume, b"*", &mut count, &mut rest).unwrap().is_none());
        assert_eq!(keys.len() + rest.len(), 6);
    }
}
