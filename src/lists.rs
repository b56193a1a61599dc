//! Lists store
//!
//! Two column families: meta (default) and `node_cf`. The meta carries
//! `left` and `right` cursors, the next free slot on each end; the list
//! occupies `[left+1, right-1]`. Fresh lists start both cursors at a
//! fixed mid-point so pushes on either end never collide. Node keys
//! embed the element's absolute index big-endian, so a prefix seek walks
//! the list in order.

use std::path::Path;
use std::sync::Arc;

use log::info;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Snapshot, WriteBatch, DB};

use crate::codec::meta::{
    fresh_list_meta, ListMeta, ListMetaRef, INITIAL_LEFT_INDEX, INITIAL_RIGHT_INDEX,
};
use crate::codec::subkey::{encode_list_node_key, encode_subkey_prefix, SubKeyRef};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{list_meta_compaction_filter, MetaFormat, MetaLookup, SubentryFilterFactory};
use crate::glob::glob_match;
use crate::lock::LockManager;
use crate::types::InsertPosition;
use crate::version::{now_secs, VersionGenerator};

const NODE_CF: &str = "node_cf";

pub struct ListsStore {
    db: Arc<DB>,
    locks: LockManager,
    versions: VersionGenerator,
}

impl ListsStore {
    pub(crate) fn open(config: &StoreConfig, path: &Path) -> Result<Self> {
        let mut meta_opts = config.engine_options();
        meta_opts.set_compaction_filter("strata-list-meta-filter", list_meta_compaction_filter);

        let lookup = MetaLookup::new();
        let mut node_opts = config.engine_options();
        node_opts.set_compaction_filter_factory(SubentryFilterFactory::new(
            lookup.clone(),
            MetaFormat::List,
        ));

        let db_opts = config.engine_options();
        let db = Arc::new(DB::open_cf_descriptors(
            &db_opts,
            path,
            vec![
                ColumnFamilyDescriptor::new(rocksdb::DEFAULT_COLUMN_FAMILY_NAME, meta_opts),
                ColumnFamilyDescriptor::new(NODE_CF, node_opts),
            ],
        )?);
        lookup.bind(&db);
        info!("lists database opened at {}", path.display());

        Ok(ListsStore {
            db,
            locks: LockManager::new(),
            versions: VersionGenerator::new(),
        })
    }

    fn node_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(NODE_CF)
            .ok_or_else(|| StoreError::corruption("node_cf handle missing"))
    }

    fn read_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    /// Read every node in `[from, to]` at one version, in index order
    fn read_node_range(
        &self,
        snapshot: &Snapshot<'_>,
        key: &[u8],
        version: u32,
        from: i64,
        to: i64,
    ) -> Result<Vec<(i64, Vec<u8>)>> {
        if from > to {
            return Ok(Vec::new());
        }
        let prefix = encode_subkey_prefix(key, version);
        let start = encode_list_node_key(key, version, from);
        let mut nodes = Vec::new();
        for item in snapshot.iterator_cf(
            self.node_cf()?,
            IteratorMode::From(&start, Direction::Forward),
        ) {
            let (raw_key, value) = item?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            let index = SubKeyRef::parse(&raw_key)?.index()?;
            if index > to {
                break;
            }
            nodes.push((index, value.into_vec()));
        }
        Ok(nodes)
    }

    // ==================== Push / pop ====================

    fn push(&self, key: &[u8], values: &[&[u8]], left_side: bool, only_existing: bool) -> Result<u64> {
        let _lock = self.locks.acquire(key);
        let mut batch = WriteBatch::default();

        let (mut meta_buf, reset) = match self.read_meta(key)? {
            Some(buf) => {
                let stale = ListMetaRef::parse(&buf)?.is_stale();
                (buf, stale)
            }
            None => (fresh_list_meta(0), true),
        };
        if reset && only_existing {
            return Ok(0);
        }

        let mut meta = ListMeta::parse(&mut meta_buf)?;
        let version = if reset {
            let version = meta.update_version(&self.versions);
            meta.set_count(0);
            meta.set_expire(0);
            meta.set_left(INITIAL_LEFT_INDEX);
            meta.set_right(INITIAL_RIGHT_INDEX);
            version
        } else {
            meta.version()
        };

        if left_side {
            let mut left = meta.left();
            for value in values {
                batch.put_cf(self.node_cf()?, encode_list_node_key(key, version, left), value);
                left -= 1;
            }
            meta.set_left(left);
        } else {
            let mut right = meta.right();
            for value in values {
                batch.put_cf(self.node_cf()?, encode_list_node_key(key, version, right), value);
                right += 1;
            }
            meta.set_right(right);
        }
        meta.set_count(meta.count() + values.len() as i64);
        let len = meta.count() as u64;

        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(len)
    }

    /// Push each value onto the left end in turn (the last value lands
    /// left-most). Returns the new length.
    pub fn lpush(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.push(key, values, true, false)
    }

    /// Append each value on the right end. Returns the new length.
    pub fn rpush(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.push(key, values, false, false)
    }

    /// As lpush, but only when the list already exists; otherwise 0
    pub fn lpushx(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.push(key, values, true, true)
    }

    /// As rpush, but only when the list already exists; otherwise 0
    pub fn rpushx(&self, key: &[u8], values: &[&[u8]]) -> Result<u64> {
        self.push(key, values, false, true)
    }

    fn pop(&self, key: &[u8], left_side: bool) -> Result<Vec<u8>> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();

        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let version = meta.version();
        let index = if left_side { meta.left() + 1 } else { meta.right() - 1 };
        let node_key = encode_list_node_key(key, version, index);
        let value = snapshot
            .get_cf(self.node_cf()?, &node_key)?
            .ok_or_else(|| StoreError::corruption("list node missing under live meta"))?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.node_cf()?, node_key);
        if meta.count() == 1 {
            meta.mark_stale(&self.versions);
        } else {
            meta.set_count(meta.count() - 1);
            if left_side {
                meta.set_left(index);
            } else {
                meta.set_right(index);
            }
        }
        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(value)
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.pop(key, true)
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.pop(key, false)
    }

    /// Pop from `src`'s right end, push onto `dst`'s left end, in one
    /// atomic batch. Locks are taken in key order; `src == dst` takes
    /// one lock and rotates the list.
    pub fn rpoplpush(&self, src: &[u8], dst: &[u8]) -> Result<Vec<u8>> {
        let _locks = self.locks.acquire_multi(&[src, dst]);
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        let mut src_buf = self.read_meta(src)?.ok_or(StoreError::NotFound)?;
        let mut src_meta = ListMeta::parse(&mut src_buf)?;
        if src_meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let src_version = src_meta.version();
        let pop_index = src_meta.right() - 1;
        let pop_key = encode_list_node_key(src, src_version, pop_index);
        let value = snapshot
            .get_cf(self.node_cf()?, &pop_key)?
            .ok_or_else(|| StoreError::corruption("list node missing under live meta"))?;

        batch.delete_cf(self.node_cf()?, pop_key);

        if src == dst {
            // rotate: the popped element re-enters on the left
            batch.put_cf(
                self.node_cf()?,
                encode_list_node_key(src, src_version, src_meta.left()),
                &value,
            );
            src_meta.set_left(src_meta.left() - 1);
            src_meta.set_right(pop_index);
            batch.put(src, &src_buf);
            self.db.write(batch)?;
            return Ok(value);
        }

        if src_meta.count() == 1 {
            src_meta.mark_stale(&self.versions);
        } else {
            src_meta.set_count(src_meta.count() - 1);
            src_meta.set_right(pop_index);
        }
        batch.put(src, &src_buf);

        let (mut dst_buf, dst_reset) = match self.read_meta(dst)? {
            Some(buf) => {
                let stale = ListMetaRef::parse(&buf)?.is_stale();
                (buf, stale)
            }
            None => (fresh_list_meta(0), true),
        };
        let mut dst_meta = ListMeta::parse(&mut dst_buf)?;
        let dst_version = if dst_reset {
            let version = dst_meta.update_version(&self.versions);
            dst_meta.set_count(0);
            dst_meta.set_expire(0);
            dst_meta.set_left(INITIAL_LEFT_INDEX);
            dst_meta.set_right(INITIAL_RIGHT_INDEX);
            version
        } else {
            dst_meta.version()
        };
        batch.put_cf(
            self.node_cf()?,
            encode_list_node_key(dst, dst_version, dst_meta.left()),
            &value,
        );
        dst_meta.set_left(dst_meta.left() - 1);
        dst_meta.set_count(dst_meta.count() + 1);
        batch.put(dst, &dst_buf);

        self.db.write(batch)?;
        Ok(value)
    }

    // ==================== Reads ====================

    pub fn llen(&self, key: &[u8]) -> Result<i64> {
        match self.read_meta(key)? {
            None => Ok(0),
            Some(buf) => {
                let meta = ListMetaRef::parse(&buf)?;
                Ok(if meta.is_stale() { 0 } else { meta.count() })
            }
        }
    }

    /// Element at `index`; negative indices count from the right
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Vec<u8>> {
        let snapshot = self.db.snapshot();
        let buf = snapshot.get(key)?.ok_or(StoreError::NotFound)?;
        let meta = ListMetaRef::parse(&buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let len = meta.count();
        let index = if index < 0 { index + len } else { index };
        if index < 0 || index >= len {
            return Err(StoreError::NotFound);
        }

        snapshot
            .get_cf(
                self.node_cf()?,
                encode_list_node_key(key, meta.version(), meta.left() + 1 + index),
            )?
            .ok_or(StoreError::NotFound)
    }

    /// Elements in `[start, stop]` after normalizing negative indices;
    /// an absent list yields an empty vec
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let snapshot = self.db.snapshot();
        let buf = match snapshot.get(key)? {
            Some(buf) => buf,
            None => return Ok(Vec::new()),
        };
        let meta = ListMetaRef::parse(&buf)?;
        if meta.is_stale() {
            return Ok(Vec::new());
        }

        let len = meta.count();
        let mut start = if start < 0 { start + len } else { start };
        let mut stop = if stop < 0 { stop + len } else { stop };
        start = start.max(0);
        stop = stop.min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }

        let nodes = self.read_node_range(
            &snapshot,
            key,
            meta.version(),
            meta.left() + 1 + start,
            meta.left() + 1 + stop,
        )?;
        Ok(nodes.into_iter().map(|(_, value)| value).collect())
    }

    // ==================== Mutation ====================

    /// Overwrite the element at `index`
    pub fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let meta = ListMetaRef::parse(&buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let len = meta.count();
        let index = if index < 0 { index + len } else { index };
        if index < 0 || index >= len {
            return Err(StoreError::invalid_argument("index out of range"));
        }

        self.db.put_cf(
            self.node_cf()?,
            encode_list_node_key(key, meta.version(), meta.left() + 1 + index),
            value,
        )?;
        Ok(())
    }

    /// Insert `value` before or after the first node equal to `pivot`,
    /// shifting whichever side of the list is shorter. Returns the new
    /// length, or -1 when the pivot is not present.
    pub fn linsert(
        &self,
        key: &[u8],
        position: InsertPosition,
        pivot: &[u8],
        value: &[u8],
    ) -> Result<i64> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();

        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let version = meta.version();
        let left = meta.left();
        let right = meta.right();

        // linear scan from the left end for the pivot
        let nodes = self.read_node_range(&snapshot, key, version, left + 1, right - 1)?;
        let pivot_index = match nodes.iter().find(|(_, v)| v == pivot) {
            Some((index, _)) => *index,
            None => return Ok(-1),
        };

        // the new element's slot if the right side moves, or slot - 1 if
        // the left side moves
        let gap = match position {
            InsertPosition::Before => pivot_index,
            InsertPosition::After => pivot_index + 1,
        };
        let left_len = gap - (left + 1);
        let right_len = right - gap;

        let mut batch = WriteBatch::default();
        if left_len <= right_len {
            // shift [left+1, gap-1] one slot left; an insert at the edge
            // shifts nothing and just consumes the left cursor
            for (index, node_value) in nodes.iter().take_while(|(index, _)| *index < gap) {
                batch.put_cf(
                    self.node_cf()?,
                    encode_list_node_key(key, version, index - 1),
                    node_value,
                );
            }
            batch.put_cf(
                self.node_cf()?,
                encode_list_node_key(key, version, gap - 1),
                value,
            );
            meta.set_left(left - 1);
        } else {
            // shift [gap, right-1] one slot right
            for (index, node_value) in nodes.iter().filter(|(index, _)| *index >= gap) {
                batch.put_cf(
                    self.node_cf()?,
                    encode_list_node_key(key, version, index + 1),
                    node_value,
                );
            }
            batch.put_cf(
                self.node_cf()?,
                encode_list_node_key(key, version, gap),
                value,
            );
            meta.set_right(right + 1);
        }
        meta.set_count(meta.count() + 1);
        let len = meta.count();
        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(len)
    }

    /// Remove up to `count` nodes equal to `value`: from the head when
    /// `count > 0`, from the tail when `count < 0`, all when zero.
    /// Survivors are re-packed against the untouched end. Returns the
    /// number removed.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<i64> {
        let _lock = self.locks.acquire(key);
        let snapshot = self.db.snapshot();

        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let version = meta.version();
        let left = meta.left();
        let right = meta.right();
        let nodes = self.read_node_range(&snapshot, key, version, left + 1, right - 1)?;

        let mut quota = if count == 0 { i64::MAX } else { count.abs() };
        let mut keep = vec![true; nodes.len()];
        let scan_left_to_right = count >= 0;
        let order: Box<dyn Iterator<Item = usize>> = if scan_left_to_right {
            Box::new(0..nodes.len())
        } else {
            Box::new((0..nodes.len()).rev())
        };
        let mut removed = 0i64;
        for i in order {
            if quota == 0 {
                break;
            }
            if nodes[i].1 == value {
                keep[i] = false;
                removed += 1;
                quota -= 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let survivors: Vec<&Vec<u8>> = nodes
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|((_, value), _)| value)
            .collect();

        let mut batch = WriteBatch::default();
        if survivors.is_empty() {
            meta.mark_stale(&self.versions);
            batch.put(key, &meta_buf);
            self.db.write(batch)?;
            return Ok(removed);
        }

        // rewrite the whole occupied range: clear, then re-pack against
        // the end the scan did not start from
        for (index, _) in &nodes {
            batch.delete_cf(self.node_cf()?, encode_list_node_key(key, version, *index));
        }
        let new_left;
        let new_right;
        if scan_left_to_right {
            new_left = left;
            new_right = left + 1 + survivors.len() as i64;
        } else {
            new_right = right;
            new_left = right - 1 - survivors.len() as i64;
        }
        for (offset, node_value) in survivors.iter().enumerate() {
            batch.put_cf(
                self.node_cf()?,
                encode_list_node_key(key, version, new_left + 1 + offset as i64),
                node_value,
            );
        }
        meta.set_left(new_left);
        meta.set_right(new_right);
        meta.set_count(survivors.len() as i64);
        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(removed)
    }

    /// Keep only `[start, stop]`; an empty retained range resets the key
    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);

        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }

        let len = meta.count();
        let left = meta.left();
        let right = meta.right();
        let mut start = if start < 0 { start + len } else { start };
        let mut stop = if stop < 0 { stop + len } else { stop };
        start = start.max(0);
        stop = stop.min(len - 1);

        let mut batch = WriteBatch::default();
        if start > stop {
            meta.mark_stale(&self.versions);
            batch.put(key, &meta_buf);
            self.db.write(batch)?;
            return Ok(());
        }

        let version = meta.version();
        for index in (left + 1)..(left + 1 + start) {
            batch.delete_cf(self.node_cf()?, encode_list_node_key(key, version, index));
        }
        for index in (left + 2 + stop)..right {
            batch.delete_cf(self.node_cf()?, encode_list_node_key(key, version, index));
        }
        meta.set_left(left + start);
        meta.set_right(left + stop + 2);
        meta.set_count(stop - start + 1);
        batch.put(key, &meta_buf);
        self.db.write(batch)?;
        Ok(())
    }

    // ==================== Lifecycle ====================

    /// `ttl > 0` sets the expiry; `ttl <= 0` marks the list stale
    pub fn expire(&self, key: &[u8], ttl: i64) -> Result<()> {
        let _lock = self.locks.acquire(key);
        let mut meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let mut meta = ListMeta::parse(&mut meta_buf)?;
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
        let mut meta = ListMeta::parse(&mut meta_buf)?;
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
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() || meta.expire() == 0 {
            return Err(StoreError::NotFound);
        }
        meta.set_expire(0);
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        let meta_buf = self.read_meta(key)?.ok_or(StoreError::NotFound)?;
        let meta = ListMetaRef::parse(&meta_buf)?;
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
        let mut meta = ListMeta::parse(&mut meta_buf)?;
        if meta.is_stale() {
            return Err(StoreError::NotFound);
        }
        meta.mark_stale(&self.versions);
        self.db.put(key, meta_buf)?;
        Ok(())
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        match self.read_meta(key)? {
            None => Ok(false),
            Some(buf) => Ok(!ListMetaRef::parse(&buf)?.is_stale()),
        }
    }

    /// Walk live lists from `start_key`; see `StringsStore::scan_keys`
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
            let meta = ListMetaRef::parse(&value)?;
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
            .compact_range_cf(self.node_cf()?, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn physical_node_count(&self, key: &[u8]) -> usize {
        let cf = self.node_cf().unwrap();
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

    fn open_store(dir: &tempfile::TempDir) -> ListsStore {
        ListsStore::open(&StoreConfig::create(), dir.path()).unwrap()
    }

    fn lrange_all(store: &ListsStore, key: &[u8]) -> Vec<Vec<u8>> {
        store.lrange(key, 0, -1).unwrap()
    }

    fn values(items: &[&[u8]]) -> Vec<Vec<u8>> {
        items.iter().map(|item| item.to_vec()).collect()
    }

    #[test]
    fn test_lpush_reverses_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let len = store.lpush(b"L", &[b"h", b"s", b"a", b"l", b"s"]).unwrap();
        assert_eq!(len, 5);
        assert_eq!(
            lrange_all(&store, b"L"),
            values(&[b"s", b"l", b"a", b"s", b"h"])
        );
    }

    #[test]
    fn test_rpush_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b"]).unwrap();
        let len = store.rpush(b"L", &[b"c"]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"b", b"c"]));
        assert_eq!(store.llen(b"L").unwrap(), 3);
    }

    #[test]
    fn test_pushx_requires_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.lpushx(b"L", &[b"x"]).unwrap(), 0);
        assert_eq!(store.rpushx(b"L", &[b"x"]).unwrap(), 0);
        assert_eq!(store.llen(b"L").unwrap(), 0);

        store.rpush(b"L", &[b"a"]).unwrap();
        assert_eq!(store.lpushx(b"L", &[b"x"]).unwrap(), 2);
        assert_eq!(store.rpushx(b"L", &[b"y"]).unwrap(), 3);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"x", b"a", b"y"]));
    }

    #[test]
    fn test_pop_both_ends() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(store.lpop(b"L").unwrap(), b"a");
        assert_eq!(store.rpop(b"L").unwrap(), b"c");
        assert_eq!(store.llen(b"L").unwrap(), 1);

        // popping the last element resets the key
        assert_eq!(store.lpop(b"L").unwrap(), b"b");
        assert_eq!(store.llen(b"L").unwrap(), 0);
        assert!(store.lpop(b"L").unwrap_err().is_not_found());
        assert!(!store.exists(b"L").unwrap());
    }

    #[test]
    fn test_lindex() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(store.lindex(b"L", 0).unwrap(), b"a");
        assert_eq!(store.lindex(b"L", 2).unwrap(), b"c");
        assert_eq!(store.lindex(b"L", -1).unwrap(), b"c");
        assert_eq!(store.lindex(b"L", -3).unwrap(), b"a");
        assert!(store.lindex(b"L", 3).unwrap_err().is_not_found());
        assert!(store.lindex(b"L", -4).unwrap_err().is_not_found());
        assert!(store.lindex(b"NONE", 0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_lrange_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c", b"d", b"e"]).unwrap();
        assert_eq!(store.lrange(b"L", 1, 3).unwrap(), values(&[b"b", b"c", b"d"]));
        assert_eq!(store.lrange(b"L", -2, -1).unwrap(), values(&[b"d", b"e"]));
        assert_eq!(store.lrange(b"L", -100, 100).unwrap().len(), 5);
        assert!(store.lrange(b"L", 3, 1).unwrap().is_empty());
        assert!(store.lrange(b"NONE", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_lset() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c"]).unwrap();
        store.lset(b"L", 1, b"B").unwrap();
        store.lset(b"L", -1, b"C").unwrap();
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"B", b"C"]));

        assert!(matches!(
            store.lset(b"L", 5, b"x"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.lset(b"NONE", 0, b"x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_linsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"d"]).unwrap();
        assert_eq!(
            store.linsert(b"L", InsertPosition::Before, b"d", b"c").unwrap(),
            4
        );
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"b", b"c", b"d"]));

        assert_eq!(
            store.linsert(b"L", InsertPosition::After, b"d", b"e").unwrap(),
            5
        );
        assert_eq!(
            lrange_all(&store, b"L"),
            values(&[b"a", b"b", b"c", b"d", b"e"])
        );

        assert_eq!(
            store.linsert(b"L", InsertPosition::Before, b"a", b"z").unwrap(),
            6
        );
        assert_eq!(
            lrange_all(&store, b"L"),
            values(&[b"z", b"a", b"b", b"c", b"d", b"e"])
        );

        assert_eq!(
            store
                .linsert(b"L", InsertPosition::Before, b"nope", b"x")
                .unwrap(),
            -1
        );
        assert_eq!(store.llen(b"L").unwrap(), 6);
        assert!(store
            .linsert(b"NONE", InsertPosition::Before, b"a", b"x")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_lrem() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store
            .rpush(b"L", &[b"x", b"a", b"x", b"b", b"x", b"c"])
            .unwrap();

        // from the head
        assert_eq!(store.lrem(b"L", 2, b"x").unwrap(), 2);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"b", b"x", b"c"]));

        // from the tail
        assert_eq!(store.lrem(b"L", -1, b"x").unwrap(), 1);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"b", b"c"]));

        // all occurrences
        store.rpush(b"L", &[b"a"]).unwrap();
        assert_eq!(store.lrem(b"L", 0, b"a").unwrap(), 2);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"b", b"c"]));

        assert_eq!(store.lrem(b"L", 0, b"nope").unwrap(), 0);

        // removing every element resets the key
        assert_eq!(store.lrem(b"L", 0, b"b").unwrap(), 1);
        assert_eq!(store.lrem(b"L", 0, b"c").unwrap(), 1);
        assert!(!store.exists(b"L").unwrap());
        assert!(store.lrem(b"L", 0, b"x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_ltrim() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c", b"d", b"e"]).unwrap();
        store.ltrim(b"L", 1, -2).unwrap();
        assert_eq!(lrange_all(&store, b"L"), values(&[b"b", b"c", b"d"]));
        assert_eq!(store.llen(b"L").unwrap(), 3);

        // empty retained range resets the key
        store.ltrim(b"L", 5, 10).unwrap();
        assert!(!store.exists(b"L").unwrap());
        assert!(store.ltrim(b"L", 0, -1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rpoplpush_two_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"src", &[b"a", b"b", b"c"]).unwrap();
        store.rpush(b"dst", &[b"x"]).unwrap();

        assert_eq!(store.rpoplpush(b"src", b"dst").unwrap(), b"c");
        assert_eq!(lrange_all(&store, b"src"), values(&[b"a", b"b"]));
        assert_eq!(lrange_all(&store, b"dst"), values(&[b"c", b"x"]));

        // into a list that does not exist yet
        assert_eq!(store.rpoplpush(b"src", b"fresh").unwrap(), b"b");
        assert_eq!(lrange_all(&store, b"fresh"), values(&[b"b"]));

        // draining the source resets it
        assert_eq!(store.rpoplpush(b"src", b"dst").unwrap(), b"a");
        assert!(!store.exists(b"src").unwrap());
        assert!(store.rpoplpush(b"src", b"dst").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rpoplpush_self_single_element() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"o"]).unwrap();
        assert_eq!(store.rpoplpush(b"L", b"L").unwrap(), b"o");
        assert_eq!(lrange_all(&store, b"L"), values(&[b"o"]));
        assert_eq!(store.llen(b"L").unwrap(), 1);
    }

    #[test]
    fn test_rpoplpush_self_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(store.rpoplpush(b"L", b"L").unwrap(), b"c");
        assert_eq!(lrange_all(&store, b"L"), values(&[b"c", b"a", b"b"]));
    }

    #[test]
    fn test_expire_resets_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a"]).unwrap();
        store.expire(b"L", 1).unwrap();
        thread::sleep(Duration::from_secs(2));
        assert_eq!(store.llen(b"L").unwrap(), 0);
        assert!(store.lpop(b"L").unwrap_err().is_not_found());

        // revive with fresh cursors; old node is invisible
        store.rpush(b"L", &[b"z"]).unwrap();
        assert_eq!(lrange_all(&store, b"L"), values(&[b"z"]));
    }

    #[test]
    fn test_del_and_filter_reclaim() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b", b"c"]).unwrap();
        store.del(b"L").unwrap();
        assert_eq!(store.physical_node_count(b"L"), 3);

        store.compact().unwrap();
        assert_eq!(store.physical_node_count(b"L"), 0);
    }

    #[test]
    fn test_llen_tracks_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.rpush(b"L", &[b"a", b"b"]).unwrap();
        store.lpush(b"L", &[b"c"]).unwrap();
        store.lpop(b"L").unwrap();
        store.rpush(b"L", &[b"d", b"e"]).unwrap();
        // survivors: a b d e
        assert_eq!(store.llen(b"L").unwrap(), 4);
        assert_eq!(lrange_all(&store, b"L"), values(&[b"a", b"b", b"d", b"e"]));
    }
}
