//! Hashes store
//!
//! Two column families: meta (default) and `field_cf`. A hash's fields
//! live under composite keys carrying the meta's current version, so
//! resetting the hash (delete, expire) only rewrites the meta record;
//! the orphaned field entries stay on disk until the subentry filter
//! reclaims them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::info;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, WriteBatch, DB};

use crate::codec::meta::{encode_collection_meta, CollectionMeta, CollectionMetaRef};
use crate::codec::subkey::{encode_subkey, encode_subkey_prefix, SubKeyRef};
use crate::codec::{format_f64_payload, parse_f64_payload, parse_i64_payload};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{
    collection_meta_compaction_filter, MetaFormat, MetaLookup, SubentryFilterFactory,
};
use crate::glob::glob_match;
use crate::lock::LockManager;
use crate::types::FieldValue;
use crate::version::{now_secs, VersionGenerator};

const FIELD_CF: &str = "field_cf";

pub struct HashesStore {
    db: Arc<DB>,
    locks: LockManager,
    versions: VersionGenerator,
}

impl HashesStore {
    pub(crate) fn open(config: &StoreConfig, path: &Path) -> Result<Self> {
        let mut meta_opts = config.engine_options();
        meta_opts.set_compaction_filter("strata-hash-meta-filter", collection_meta_compaction_filter);

        let lookup = MetaLookup::new();
        let mut field_opts = config.engine_options();
        field_opts.set_compaction_filter_factory(SubentryFilterFactory::new(
            lookup.clone(),
            MetaFormat::Collection,
        ));

        let db_opts = config.engine_options();
        let db = Arc::new(DB::open_cf_descriptors(
            &db_opts,
            path,
            vec![
                ColumnFamilyDescriptor::new(rocksdb::DEFAULT_COLUMN_FAMILY_NAME, meta_opts),
                ColumnFamilyDescriptor::new(FIELD_CF, field_opts),
            ],
        )?);
        lookup.bind(&db);
        info!("hashes database opened at {}", path.display());

        Ok(HashesStore {
            db,
            locks: LockManager::new(),
            versions: VersionGenerator::new(),
        })
    }

    fn field_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(FIELD_CF)
            .ok_or_else(|| StoreError::corruption("field_cf handle missing"))
    }

    /// Read the meta buffer if present; staleness is the caller's call
    fn read_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    /// Version of the live meta, or None when absent/stale
    fn live_version(&self, key: &[u8]) -> Result<Option<u32>> {
        match self.read_meta(key)? {
            None => Ok(None),
            Some(buf) => {
                let meta = CollectionMetaRef::parse(&buf)?;
                if meta.is_stale() {
                    Ok(None)
                } else {
                    Ok(Some(meta.version()))
                }
            }
        }
    }

    /// Keep the last occurrence of each field, preserving first-seen order
    fn dedup_fields(fvs: &[FieldValue]) -> Vec<&FieldValue> {
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut filtered: Vec<&FieldValue> = Vec::with_capacity(fvs.len());
        for fv in fvs.iter().rev() {
            if seen.insert(&fv.field) {
                filtered.push(fv);
            }
        }
        filtered.reverse();
        filtered
    }

    // ==================== Field commands ====================

    /// Set one field. Returns 1 if the field was inserted, 0 if an
    /// existing field was overwritten.
    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<i32> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        match self.read_meta(key)? {
            Some(mut meta_buf) => {
                let mut meta = CollectionMeta::parse(&mut meta_buf)?;
                if meta.is_stale() {
                    let version = meta.update_version(&self.versions);
                    meta.set_count(1);
                    meta.set_expire(0);
                    batch.put(key, &meta_buf);
                    batch.put_cf(self.field_cf()?, encode_subkey(key, version, field), value);
                    self.db.write(batch)?;
                    Ok(1)
                } else {
                    let version = meta.version();
                    let field_key = encode_subkey(key, version, field);
                    let existed = snapshot.get_cf(self.field_cf()?, &field_key)?.is_some();
                    if !existed {
                        meta.modify_count(1);
                        batch.put(key, &meta_buf);
                    }
                    batch.put_cf(self.field_cf()?, field_key, value);
                    self.db.write(batch)?;
                    Ok(i32::from(!existed))
                }
            }
            None => {
                let version = self.versions.next();
                batch.put(key, encode_collection_meta(1, version, 0));
                batch.put_cf(self.field_cf()?, encode_subkey(key, version, field), value);
                self.db.write(batch)?;
                Ok(1)
            }
        }
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Vec<u8>> {
        let version = self.live_version(key)?.ok_or(StoreError::NotFound)?;
        self.db
            .get_cf(self.field_cf()?, encode_subkey(key, version, field))?
            .ok_or(StoreError::NotFound)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool> {
        match self.hget(key, field) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> Result<i64> {
        match self.hget(key, field) {
            Ok(value) => Ok(value.len() as i64),
            Err(StoreError::NotFound) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Set several fields atomically; later duplicates win
    pub fn hmset(&self, key: &[u8], fvs: &[FieldValue]) -> Result<()> {
        if fvs.is_empty() {
            return Err(StoreError::invalid_argument("no fields given"));
        }
        let filtered = Self::dedup_fields(fvs);

        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        match self.read_meta(key)? {
            Some(mut meta_buf) => {
                let mut meta = CollectionMeta::parse(&mut meta_buf)?;
                if meta.is_stale() {
                    let version = meta.update_version(&self.versions);
                    meta.set_count(filtered.len() as i32);
                    meta.set_expire(0);
                    batch.put(key, &meta_buf);
                    for fv in &filtered {
                        batch.put_cf(
                            self.field_cf()?,
                            encode_subkey(key, version, &fv.field),
                            &fv.value,
                        );
                    }
                } else {
                    let version = meta.version();
                    let mut inserted = 0;
                    for fv in &filtered {
                        let field_key = encode_subkey(key, version, &fv.field);
                        if snapshot.get_cf(self.field_cf()?, &field_key)?.is_none() {
                            inserted += 1;
                        }
                        batch.put_cf(self.field_cf()?, field_key, &fv.value);
                    }
                    if inserted > 0 {
                        meta.modify_count(inserted);
                        batch.put(key, &meta_buf);
                    }
                }
            }
            None => {
                let version = self.versions.next();
                batch.put(key, encode_collection_meta(filtered.len() as i32, version, 0));
                for fv in &filtered {
                    batch.put_cf(
                        self.field_cf()?,
                        encode_subkey(key, version, &fv.field),
                        &fv.value,
                    );
                }
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Per-field reads; a missing hash yields all `None`
    pub fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        let snapshot = self.db.snapshot();
        let version = match snapshot.get(key)? {
            None => None,
            Some(buf) => {
                let meta = CollectionMetaRef::parse(&buf)?;
                (!meta.is_stale()).then(|| meta.version())
            }
        };
        let Some(version) = version else {
            return Ok(vec![None; fields.len()]);
        };

        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            values.push(snapshot.get_cf(self.field_cf()?, encode_subkey(key, version, field))?);
        }
        Ok(values)
    }

    /// Delete fields; returns how many were present. Dropping the last
    /// field marks the hash stale instead of deleting subentries.
    pub fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> Result<i32> {
        let mut unique: Vec<&[u8]> = fields.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();

        let Some(mut meta_buf) = self.read_meta(key)? else {
            return Ok(0);
        };
        let mut meta = CollectionMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Ok(0);
        }

        let version = meta.version();
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for field in unique {
            let field_key = encode_subkey(key, version, field);
            if snapshot.get_cf(self.field_cf()?, &field_key)?.is_some() {
                removed += 1;
                batch.delete_cf(self.field_cf()?, field_key);
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        if meta.count() == removed {
            meta.mark_stale(&self.versions);
        } else {
            meta.modify_count(-removed);
        }
        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(removed)
    }

    pub fn hlen(&self, key: &[u8]) -> Result<i32> {
        match self.read_meta(key)? {
            None => Ok(0),
            Some(buf) => {
                let meta = CollectionMetaRef::parse(&buf)?;
                Ok(if meta.is_stale() { 0 } else { meta.count() })
            }
        }
    }

    // ==================== Iteration ====================

    /// All (field, value) pairs at the live version, in field byte order
    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<FieldValue>> {
        let snapshot = self.db.snapshot();
        let version = match snapshot.get(key)? {
            None => return Ok(Vec::new()),
            Some(buf) => {
                let meta = CollectionMetaRef::parse(&buf)?;
                if meta.is_stale() {
                    return Ok(Vec::new());
                }
                meta.version()
            }
        };

        let prefix = encode_subkey_prefix(key, version);
        let mut pairs = Vec::new();
        for item in snapshot.iterator_cf(
            self.field_cf()?,
            IteratorMode::From(&prefix, Direction::Forward),
        ) {
            let (raw_key, value) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            let subkey = SubKeyRef::parse(&raw_key)?;
            pairs.push(FieldValue {
                field: subkey.suffix().to_vec(),
                value: value.into_vec(),
            });
        }
        Ok(pairs)
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.hgetall(key)?.into_iter().map(|fv| fv.field).collect())
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.hgetall(key)?.into_iter().map(|fv| fv.value).collect())
    }

    // ==================== Numeric commands ====================

    pub fn hincrby(&self, key: &[u8], field: &[u8], delta: i64) -> Result<i64> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        let (version, current, fresh_meta) = self.read_field_for_update(&snapshot, key, field)?;
        let current_value = match &current {
            Some(payload) => parse_i64_payload(payload)?,
            None => 0,
        };
        let result = current_value
            .checked_add(delta)
            .ok_or_else(|| StoreError::invalid_argument("increment or decrement would overflow"))?;

        if let Some(meta_buf) = fresh_meta {
            batch.put(key, meta_buf);
        }
        batch.put_cf(
            self.field_cf()?,
            encode_subkey(key, version, field),
            result.to_string().as_bytes(),
        );
        self.db.write(batch)?;
        Ok(result)
    }

    pub fn hincrbyfloat(&self, key: &[u8], field: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        let delta = parse_f64_payload(delta)
            .map_err(|_| StoreError::invalid_argument("value is not a valid float"))?;

        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        let (version, current, fresh_meta) = self.read_field_for_update(&snapshot, key, field)?;
        let current_value = match &current {
            Some(payload) => parse_f64_payload(payload)?,
            None => 0.0,
        };
        let result = current_value + delta;
        if !result.is_finite() {
            return Err(StoreError::invalid_argument(
                "increment would produce NaN or Infinity",
            ));
        }

        if let Some(meta_buf) = fresh_meta {
            batch.put(key, meta_buf);
        }
        let rendered = format_f64_payload(result);
        batch.put_cf(self.field_cf()?, encode_subkey(key, version, field), &rendered);
        self.db.write(batch)?;
        Ok(rendered)
    }

    /// Set the field only if it does not exist. Returns 1 if written.
    pub fn hsetnx(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<i32> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        let (version, current, fresh_meta) = self.read_field_for_update(&snapshot, key, field)?;
        if current.is_some() {
            return Ok(0);
        }
        if let Some(meta_buf) = fresh_meta {
            batch.put(key, meta_buf);
        }
        batch.put_cf(self.field_cf()?, encode_subkey(key, version, field), value);
        self.db.write(batch)?;
        Ok(1)
    }

    /// Shared read-modify-write prelude: resolves the version to write
    /// under, the field's current value, and, when the hash is being
    /// (re)created or the field is new, the meta record to stage.
    /// Caller must hold the record lock.
    #[allow(clippy::type_complexity)]
    fn read_field_for_update(
        &self,
        snapshot: &rocksdb::Snapshot<'_>,
        key: &[u8],
        field: &[u8],
    ) -> Result<(u32, Option<Vec<u8>>, Option<Vec<u8>>)> {
        match self.read_meta(key)? {
            Some(mut meta_buf) => {
                let mut meta = CollectionMeta::parse(&mut meta_buf)?;
                if meta.is_stale() {
                    let version = meta.update_version(&self.versions);
                    meta.set_count(1);
                    meta.set_expire(0);
                    Ok((version, None, Some(meta_buf)))
                } else {
                    let version = meta.version();
                    let current =
                        snapshot.get_cf(self.field_cf()?, encode_subkey(key, version, field))?;
                    if current.is_none() {
                        meta.modify_count(1);
                        Ok((version, None, Some(meta_buf)))
                    } else {
                        Ok((version, current, None))
                    }
                }
            }
            None => {
                let version = self.versions.next();
                Ok((version, None, Some(encode_collection_meta(1, version, 0))))
            }
        }
    }

    // ==================== Lifecycle ====================

    /// `ttl > 0` sets the expiry; `ttl <= 0` marks the hash stale
    pub fn expire(&self, key: &[u8], ttl: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = CollectionMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }
        if ttl > 0 {
            meta.set_relative_expire(ttl);
        } else {
            meta.mark_stale(&self.versions);
        }
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn expireat(&self, key: &[u8], timestamp: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = CollectionMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }
        if timestamp > i64::from(now_secs()) {
            meta.set_expire(timestamp as u32);
        } else {
            meta.mark_stale(&self.versions);
        }
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn persist(&self, key: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = CollectionMeta::parse(&mut meta_buf)?;
        if meta.is_stale() || meta.expire() == 0 {
            return Err(StoreError::NotFound);
        }
        meta.set_expire(0);
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        let meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let meta = CollectionMetaRef::parse(&meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }
        if meta.expire() == 0 {
            Ok(-1)
        } else {
            Ok(i64::from(meta.expire()) - i64::from(now_secs()))
        }
    }

    pub fn del(&self, key: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = CollectionMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }
        meta.mark_stale(&self.versions);
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.live_version(key)?.is_some())
    }

    /// Walk live hashes from `start_key`; see `StringsStore::scan_keys`
    pub fn scan_keys(
        &self,
        start_key: &[u8],
        pattern: &[u8],
        count: &mut i64,
        keys: &mut Vec<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(start_key, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if *count <= 0 {
                return Ok(Some(key.into_vec()));
            }
            let meta = CollectionMetaRef::parse(&value)?;
            if meta.is_stale() {
                continue;
            }
            if glob_match(pattern, &key) {
                keys.push(key.into_vec());
            }
            *count -= 1;
        }
        Ok(None)
    }

    pub fn compact(&self) -> Result<()> {
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        self.db
            .compact_range_cf(self.field_cf()?, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn physical_field_count(&self, key: &[u8]) -> usize {
        let cf = self.field_cf().unwrap();
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .filter_map(|item| item.ok())
            .filter(|(raw_key, _)| {
                SubKeyRef::parse(raw_key)
                    .map(|sk| sk.user_key() == key)
                    .unwrap_or(false)
            })
            .count()
    }
}
