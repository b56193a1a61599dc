//! Sets store
//!
//! Two column families: meta (default) and `member_cf`. Members are
//! encoded entirely in the subentry key; the entry value is empty.
//! Same versioned-reset discipline as hashes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::info;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, WriteBatch, DB};

use crate::codec::meta::{encode_collection_meta, CollectionMeta, CollectionMetaRef};
use crate::codec::subkey::{encode_subkey, encode_subkey_prefix, SubKeyRef};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{
    collection_meta_compaction_filter, MetaFormat, MetaLookup, SubentryFilterFactory,
};
use crate::glob::glob_match;
use crate::lock::LockManager;
use crate::version::{now_secs, VersionGenerator};

const MEMBER_CF: &str = "member_cf";

pub struct SetsStore {
    db: Arc<DB>,
    locks: LockManager,
    versions: VersionGenerator,
}

impl SetsStore {
    pub(crate) fn open(config: &StoreConfig, path: &Path) -> Result<Self> {
        let mut meta_opts = config.engine_options();
        meta_opts.set_compaction_filter("strata-set-meta-filter", collection_meta_compaction_filter);

        let lookup = MetaLookup::new();
        let mut member_opts = config.engine_options();
        member_opts.set_compaction_filter_factory(SubentryFilterFactory::new(
            lookup.clone(),
            MetaFormat::Collection,
        ));

        let db_opts = config.engine_options();
        let db = Arc::new(DB::open_cf_descriptors(
            &db_opts,
            path,
            vec![
                ColumnFamilyDescriptor::new(rocksdb::DEFAULT_COLUMN_FAMILY_NAME, meta_opts),
                ColumnFamilyDescriptor::new(MEMBER_CF, member_opts),
            ],
        )?);
        lookup.bind(&db);
        info!("sets database opened at {}", path.display());

        Ok(SetsStore {
            db,
            locks: LockManager::new(),
            versions: VersionGenerator::new(),
        })
    }

    fn member_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(MEMBER_CF)
            .ok_or_else(|| StoreError::corruption("member_cf handle missing"))
    }

    fn read_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

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

    /// Keep the first occurrence of each member, preserving order
    fn dedup_members<'m>(members: &[&'m [u8]]) -> Vec<&'m [u8]> {
        let mut seen: HashSet<&[u8]> = HashSet::new();
        members
            .iter()
            .copied()
            .filter(|member| seen.insert(member))
            .collect()
    }

    // ==================== Member commands ====================

    /// Add members; duplicates in the input collapse to their first
    /// occurrence. Returns how many members were actually new.
    pub fn sadd(&self, key: &[u8], members: &[&[u8]]) -> Result<i32> {
        let filtered = Self::dedup_members(members);

        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        let added = match self.read_meta(key)? {
            Some(mut meta_buf) => {
                let mut meta = CollectionMeta::parse(&mut meta_buf)?;
                if meta.is_stale() {
                    let version = meta.update_version(&self.versions);
                    meta.set_count(filtered.len() as i32);
                    meta.set_expire(0);
                    batch.put(key, &meta_buf);
                    for member in &filtered {
                        batch.put_cf(self.member_cf()?, encode_subkey(key, version, member), b"");
                    }
                    filtered.len() as i32
                } else {
                    let version = meta.version();
                    let mut added = 0;
                    for member in &filtered {
                        let member_key = encode_subkey(key, version, member);
                        if snapshot.get_cf(self.member_cf()?, &member_key)?.is_none() {
                            added += 1;
                            batch.put_cf(self.member_cf()?, member_key, b"");
                        }
                    }
                    if added > 0 {
                        meta.modify_count(added);
                        batch.put(key, &meta_buf);
                    }
                    added
                }
            }
            None => {
                let version = self.versions.next();
                batch.put(key, encode_collection_meta(filtered.len() as i32, version, 0));
                for member in &filtered {
                    batch.put_cf(self.member_cf()?, encode_subkey(key, version, member), b"");
                }
                filtered.len() as i32
            }
        };

        self.db.write(batch)?;
        Ok(added)
    }

    /// Remove members; returns how many were present. Removing the last
    /// member marks the set stale.
    pub fn srem(&self, key: &[u8], members: &[&[u8]]) -> Result<i32> {
        let filtered = Self::dedup_members(members);

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
        for member in &filtered {
            let member_key = encode_subkey(key, version, member);
            if snapshot.get_cf(self.member_cf()?, &member_key)?.is_some() {
                removed += 1;
                batch.delete_cf(self.member_cf()?, member_key);
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

    pub fn scard(&self, key: &[u8]) -> Result<i32> {
        match self.read_meta(key)? {
            None => Ok(0),
            Some(buf) => {
                let meta = CollectionMetaRef::parse(&buf)?;
                Ok(if meta.is_stale() { 0 } else { meta.count() })
            }
        }
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let Some(version) = self.live_version(key)? else {
            return Ok(false);
        };
        Ok(self
            .db
            .get_cf(self.member_cf()?, encode_subkey(key, version, member))?
            .is_some())
    }

    /// All members at the live version, in byte order
    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
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
        let mut members = Vec::new();
        for item in snapshot.iterator_cf(
            self.member_cf()?,
            IteratorMode::From(&prefix, Direction::Forward),
        ) {
            let (raw_key, _) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            members.push(SubKeyRef::parse(&raw_key)?.suffix().to_vec());
        }
        Ok(members)
    }

    // ==================== Lifecycle ====================

    /// `ttl > 0` sets the expiry; `ttl <= 0` marks the set stale
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

    /// Walk live sets from `start_key`; see `StringsStore::scan_keys`
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
            .compact_range_cf(self.member_cf()?, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn physical_member_count(&self, key: &[u8]) -> usize {
        let cf = self.member_cf().unwrap();
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn open_store(dir: &tempfile::TempDir) -> SetsStore {
        SetsStore::open(&StoreConfig::create(), dir.path()).unwrap()
    }

    #[test]
    fn test_sadd_dedups_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let added = store.sadd(b"S", &[b"a", b"b", b"a", b"c"]).unwrap();
        assert_eq!(added, 3);
        assert_eq!(store.scard(b"S").unwrap(), 3);

        // re-adding counts only new members
        assert_eq!(store.sadd(b"S", &[b"a", b"d"]).unwrap(), 1);
        assert_eq!(store.scard(b"S").unwrap(), 4);
    }

    #[test]
    fn test_sismember_smembers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"b", b"a", b"c"]).unwrap();
        assert!(store.sismember(b"S", b"a").unwrap());
        assert!(!store.sismember(b"S", b"z").unwrap());
        assert!(!store.sismember(b"NONE", b"a").unwrap());

        assert_eq!(
            store.smembers(b"S").unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert!(store.smembers(b"NONE").unwrap().is_empty());
    }

    #[test]
    fn test_srem() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(store.srem(b"S", &[b"a", b"missing", b"a"]).unwrap(), 1);
        assert_eq!(store.scard(b"S").unwrap(), 2);

        // removing everything marks the set stale
        assert_eq!(store.srem(b"S", &[b"b", b"c"]).unwrap(), 2);
        assert_eq!(store.scard(b"S").unwrap(), 0);
        assert!(!store.exists(b"S").unwrap());
        assert_eq!(store.srem(b"S", &[b"a"]).unwrap(), 0);
    }

    #[test]
    fn test_expire_resets_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"a", b"b"]).unwrap();
        store.expire(b"S", 1).unwrap();
        assert!(store.sismember(b"S", b"a").unwrap());
        thread::sleep(Duration::from_secs(2));
        assert!(!store.sismember(b"S", b"a").unwrap());
        assert_eq!(store.scard(b"S").unwrap(), 0);

        // revive at a fresh version
        assert_eq!(store.sadd(b"S", &[b"x"]).unwrap(), 1);
        assert_eq!(store.smembers(b"S").unwrap(), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_expire_non_positive_marks_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"a"]).unwrap();
        store.expire(b"S", 0).unwrap();
        assert!(!store.exists(b"S").unwrap());
        assert!(store.expire(b"S", 5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_del_and_filter_reclaim() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"a", b"b", b"c"]).unwrap();
        store.del(b"S").unwrap();
        assert_eq!(store.physical_member_count(b"S"), 3);

        store.compact().unwrap();
        assert_eq!(store.physical_member_count(b"S"), 0);
    }

    #[test]
    fn test_version_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"S", &[b"old"]).unwrap();
        store.del(b"S").unwrap();
        store.sadd(b"S", &[b"new"]).unwrap();

        assert!(!store.sismember(b"S", b"old").unwrap());
        assert_eq!(store.smembers(b"S").unwrap(), vec![b"new".to_vec()]);
    }

    #[test]
    fn test_scan_keys_skips_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.sadd(b"alive", &[b"m"]).unwrap();
        store.sadd(b"dead", &[b"m"]).unwrap();
        store.del(b"dead").unwrap();

        let mut keys = Vec::new();
        let mut count = 10;
        let next = store.scan_keys(b"", b"*", &mut count, &mut keys).unwrap();
        assert!(next.is_none());
        assert_eq!(keys, vec![b"alive".to_vec()]);
        // the stale meta was not charged against the count
        assert_eq!(count, 9);
    }
}
