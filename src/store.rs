//! Store façade
//!
//! One handle over four sub-databases, one per data type, living in
//! `strings/`, `hashes/`, `sets/` and `lists/` under the store path.
//! Type commands delegate straight to the owning store; the cross-type
//! lifecycle commands (expire, del, exists, scan, and friends) fan out
//! over every type in a fixed order and aggregate the per-type statuses
//! for the caller.

use std::fs;
use std::path::Path;

use log::info;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::hashes::HashesStore;
use crate::lists::ListsStore;
use crate::sets::SetsStore;
use crate::strings::StringsStore;
use crate::types::{
    BitOpType, DataType, FieldValue, InsertPosition, KeyValue, TypeStatusMap, DATA_TYPES,
};

pub struct Store {
    strings: StringsStore,
    hashes: HashesStore,
    sets: SetsStore,
    lists: ListsStore,
}

impl Store {
    /// Open (or create) the four sub-databases under `path`
    pub fn open<P: AsRef<Path>>(config: StoreConfig, path: P) -> Result<Self> {
        let path = path.as_ref();
        if config.create_if_missing {
            fs::create_dir_all(path).map_err(|e| {
                StoreError::invalid_argument(format!("cannot create store path: {}", e))
            })?;
        }

        let store = Store {
            strings: StringsStore::open(&config, &path.join("strings"))?,
            hashes: HashesStore::open(&config, &path.join("hashes"))?,
            sets: SetsStore::open(&config, &path.join("sets"))?,
            lists: ListsStore::open(&config, &path.join("lists"))?,
        };
        info!("store opened at {}", path.display());
        Ok(store)
    }

    /// Compact every column family of every type so the filters reclaim
    /// stale entries
    pub fn compact(&self) -> Result<()> {
        info!("manual compaction across all types");
        self.strings.compact()?;
        self.hashes.compact()?;
        self.sets.compact()?;
        self.lists.compact()
    }

    // ==================== Strings ====================

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.strings.set(key, value)
    }

    pub fn setex(&self, key: &[u8], value: &[u8], ttl: i64) -> Result<()> {
        self.strings.setex(key, value, ttl)
    }

    pub fn setnx(&self, key: &[u8], value: &[u8]) -> Result<i32> {
        self.strings.setnx(key, value)
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.strings.get(key)
    }

    pub fn get_set(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.strings.get_set(key, value)
    }

    pub fn strlen(&self, key: &[u8]) -> Result<i64> {
        self.strings.strlen(key)
    }

    pub fn append(&self, key: &[u8], value: &[u8]) -> Result<i64> {
        self.strings.append(key, value)
    }

    pub fn setrange(&self, key: &[u8], offset: i64, value: &[u8]) -> Result<i64> {
        self.strings.setrange(key, offset, value)
    }

    pub fn mset(&self, kvs: &[KeyValue]) -> Result<()> {
        self.strings.mset(kvs)
    }

    pub fn mget(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        self.strings.mget(keys)
    }

    pub fn msetnx(&self, kvs: &[KeyValue]) -> Result<i32> {
        self.strings.msetnx(kvs)
    }

    pub fn incrby(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.strings.incrby(key, delta)
    }

    pub fn decrby(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.strings.decrby(key, delta)
    }

    pub fn incrbyfloat(&self, key: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        self.strings.incrbyfloat(key, delta)
    }

    pub fn setbit(&self, key: &[u8], offset: i64, bit: i32) -> Result<i32> {
        self.strings.setbit(key, offset, bit)
    }

    pub fn getbit(&self, key: &[u8], offset: i64) -> Result<i32> {
        self.strings.getbit(key, offset)
    }

    pub fn bitcount(&self, key: &[u8], range: Option<(i64, i64)>) -> Result<i64> {
        self.strings.bitcount(key, range)
    }

    pub fn bitop(&self, op: BitOpType, dest: &[u8], src_keys: &[&[u8]]) -> Result<i64> {
        self.strings.bitop(op, dest, src_keys)
    }

    pub fn bitpos(&self, key: &[u8], bit: i32, range: Option<(i64, Option<i64>)>) -> Result<i64> {
        self.strings.bitpos(key, bit, range)
    }

    // ==================== Hashes ====================

    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<i32> {
        self.hashes.hset(key, field, value)
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Vec<u8>> {
        self.hashes.hget(key, field)
    }

    pub fn hmset(&self, key: &[u8], fvs: &[FieldValue]) -> Result<()> {
        self.hashes.hmset(key, fvs)
    }

    pub fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        self.hashes.hmget(key, fields)
    }

    pub fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> Result<i32> {
        self.hashes.hdel(key, fields)
    }

    pub fn hlen(&self, key: &[u8]) -> Result<i32> {
        self.hashes.hlen(key)
    }

    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> Result<i64> {
        self.hashes.hstrlen(key, field)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        self.hashes.hexists(key, field)
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.hashes.hkeys(key)
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.hashes.hvals(key)
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<FieldValue>> {
        self.hashes.hgetall(key)
    }

    pub fn hincrby(&self, key: &[u8], field: &[u8], delta: i64) -> Result<i64> {
        self.hashes.hincrby(key, field, delta)
    }

    pub fn hincrbyfloat(&self, key: &[u8], field: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        self.hashes.hincrbyfloat(key, field, delta)
    }

    pub fn hsetnx(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<i32> {
        self.hashes.hsetnx(key, field, value)
    }

    // ==================== Sets ====================

    pub fn sadd(&self, key: &[u8], members: &[&[u8]]) -> Result<i32> {
        self.sets.sadd(key, members)
    }

    pub fn srem(&self, key: &[u8], members: &[&[u8]]) -> Result<i32> {
        self.sets.srem(key, members)
    }

    pub fn scard(&self, key: &[u8]) -> Result<i32> {
        self.sets.scard(key)
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        self.sets.sismember(key, member)
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.sets.smembers(key)
    }

    // ==================== Lists ====================

    pub fn lpush(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.lists.lpush(key, values)
    }

    pub fn rpush(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.lists.rpush(key, values)
    }

    pub fn lpushx(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.lists.lpushx(key, values)
    }

    pub fn rpushx(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.lists.rpushx(key, values)
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lists.lpop(key)
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lists.rpop(key)
    }

    pub fn llen(&self, key: &[u8]) -> Result<i64> {
        self.lists.llen(key)
    }

    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Vec<u8>> {
        self.lists.lindex(key, index)
    }

    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.lists.lrange(key, start, stop)
    }

    pub fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        self.lists.lset(key, index, value)
    }

    pub fn linsert(
        &self,
        key: &[u8],
        position: InsertPosition,
        pivot: &[u8],
        value: &[u8],
    ) -> Result<i64> {
        self.lists.linsert(key, position, pivot, value)
    }

    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<i64> {
        self.lists.lrem(key, count, value)
    }

    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<()> {
        self.lists.ltrim(key, start, stop)
    }

    pub fn rpoplpush(&self, src: &[u8], dst: &[u8]) -> Result<Vec<u8>> {
        self.lists.rpoplpush(src, dst)
    }

    // ==================== Cross-type lifecycle ====================

    fn type_expire(&self, ty: DataType, key: &[u8], ttl: i64) -> Result<()> {
        match ty {
            DataType::Strings => self.strings.expire(key, ttl),
            DataType::Hashes => self.hashes.expire(key, ttl),
            DataType::Sets => self.sets.expire(key, ttl),
            DataType::Lists => self.lists.expire(key, ttl),
        }
    }

    fn type_expireat(&self, ty: DataType, key: &[u8], timestamp: i64) -> Result<()> {
        match ty {
            DataType::Strings => self.strings.expireat(key, timestamp),
            DataType::Hashes => self.hashes.expireat(key, timestamp),
            DataType::Sets => self.sets.expireat(key, timestamp),
            DataType::Lists => self.lists.expireat(key, timestamp),
        }
    }

    fn type_persist(&self, ty: DataType, key: &[u8]) -> Result<()> {
        match ty {
            DataType::Strings => self.strings.persist(key),
            DataType::Hashes => self.hashes.persist(key),
            DataType::Sets => self.sets.persist(key),
            DataType::Lists => self.lists.persist(key),
        }
    }

    fn type_ttl(&self, ty: DataType, key: &[u8]) -> Result<i64> {
        match ty {
            DataType::Strings => self.strings.ttl(key),
            DataType::Hashes => self.hashes.ttl(key),
            DataType::Sets => self.sets.ttl(key),
            DataType::Lists => self.lists.ttl(key),
        }
    }

    fn type_del(&self, ty: DataType, key: &[u8]) -> Result<()> {
        match ty {
            DataType::Strings => self.strings.del(key),
            DataType::Hashes => self.hashes.del(key),
            DataType::Sets => self.sets.del(key),
            DataType::Lists => self.lists.del(key),
        }
    }

    fn type_exists(&self, ty: DataType, key: &[u8]) -> Result<bool> {
        match ty {
            DataType::Strings => self.strings.exists(key),
            DataType::Hashes => self.hashes.exists(key),
            DataType::Sets => self.sets.exists(key),
            DataType::Lists => self.lists.exists(key),
        }
    }

    /// Apply a timeout to every type holding `key`. Returns how many
    /// types were updated, or -1 if any type failed with a real error;
    /// per-type statuses land in `type_status`.
    pub fn expire(&self, key: &[u8], ttl: i64, type_status: &mut TypeStatusMap) -> i64 {
        self.fan_out(type_status, |ty| self.type_expire(ty, key, ttl))
    }

    /// As `expire`, with an absolute timestamp
    pub fn expireat(&self, key: &[u8], timestamp: i64, type_status: &mut TypeStatusMap) -> i64 {
        self.fan_out(type_status, |ty| self.type_expireat(ty, key, timestamp))
    }

    /// Drop the timeout on every type holding `key`; a type without a
    /// timeout reports NotFound in the map
    pub fn persist(&self, key: &[u8], type_status: &mut TypeStatusMap) -> i64 {
        self.fan_out(type_status, |ty| self.type_persist(ty, key))
    }

    fn fan_out<F>(&self, type_status: &mut TypeStatusMap, op: F) -> i64
    where
        F: Fn(DataType) -> Result<()>,
    {
        let mut ok = 0i64;
        let mut failed = false;
        for ty in DATA_TYPES {
            match op(ty) {
                Ok(()) => {
                    ok += 1;
                    type_status.insert(ty, None);
                }
                Err(e) => {
                    if !e.is_not_found() {
                        failed = true;
                    }
                    type_status.insert(ty, Some(e));
                }
            }
        }
        if failed {
            -1
        } else {
            ok
        }
    }

    /// Remaining TTL per type: -2 when the type does not hold the key,
    /// -1 when it does without a timeout, seconds otherwise
    pub fn ttl(&self, key: &[u8]) -> Result<std::collections::HashMap<DataType, i64>> {
        let mut out = std::collections::HashMap::new();
        for ty in DATA_TYPES {
            match self.type_ttl(ty, key) {
                Ok(ttl) => {
                    out.insert(ty, ttl);
                }
                Err(StoreError::NotFound) => {
                    out.insert(ty, -2);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Delete `keys` from every type. A key counts as deleted when at
    /// least one type dropped it. Returns the count, or -1 on a real
    /// error; `type_status` holds the last key's per-type statuses.
    pub fn del(&self, keys: &[&[u8]], type_status: &mut TypeStatusMap) -> i64 {
        let mut deleted = 0i64;
        let mut failed = false;
        for key in keys {
            let mut key_deleted = false;
            for ty in DATA_TYPES {
                match self.type_del(ty, key) {
                    Ok(()) => {
                        key_deleted = true;
                        type_status.insert(ty, None);
                    }
                    Err(e) => {
                        if !e.is_not_found() {
                            failed = true;
                        }
                        type_status.insert(ty, Some(e));
                    }
                }
            }
            if key_deleted {
                deleted += 1;
            }
        }
        if failed {
            -1
        } else {
            deleted
        }
    }

    /// Count presences across types; a key held by two types counts
    /// twice
    pub fn exists(&self, keys: &[&[u8]]) -> Result<i64> {
        let mut present = 0i64;
        for key in keys {
            for ty in DATA_TYPES {
                if self.type_exists(ty, key)? {
                    present += 1;
                }
            }
        }
        Ok(present)
    }

    // ==================== Scan ====================

    /// Cursor-based iteration over live keys of every type, in the
    /// fixed type order. The cursor is opaque: one type tag byte plus
    /// the key to resume from. An empty cursor starts the scan; an
    /// empty returned cursor means it finished. `count` caps how many
    /// live entries are examined this call, not how many match.
    pub fn scan(
        &self,
        cursor: &[u8],
        pattern: &[u8],
        count: i64,
        keys: &mut Vec<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let (start_type, mut start_key) = if cursor.is_empty() {
            (0, Vec::new())
        } else {
            let ty = DataType::from_tag(cursor[0])
                .ok_or_else(|| StoreError::invalid_argument("bad scan cursor"))?;
            let position = DATA_TYPES.iter().position(|t| *t == ty).unwrap_or(0);
            (position, cursor[1..].to_vec())
        };

        let mut remaining = count.max(1);
        for ty in DATA_TYPES.iter().skip(start_type) {
            let next = match ty {
                DataType::Strings => {
                    self.strings
                        .scan_keys(&start_key, pattern, &mut remaining, keys)?
                }
                DataType::Hashes => {
                    self.hashes
                        .scan_keys(&start_key, pattern, &mut remaining, keys)?
                }
                DataType::Sets => self
                    .sets
                    .scan_keys(&start_key, pattern, &mut remaining, keys)?,
                DataType::Lists => {
                    self.lists
                        .scan_keys(&start_key, pattern, &mut remaining, keys)?
                }
            };
            if let Some(resume) = next {
                let mut cursor = Vec::with_capacity(1 + resume.len());
                cursor.push(ty.tag());
                cursor.extend_from_slice(&resume);
                return Ok(cursor);
            }
            // this type is exhausted; the next one starts at its head
            start_key.clear();
        }
        Ok(Vec::new())
    }
}
