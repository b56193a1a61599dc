use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// Number of bucket tables (must be a power of 2 for efficient hashing)
const LOCK_SHARD_COUNT: usize = 64;

/// A per-key mutex plus the number of outstanding acquisitions
struct KeyLock {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

/// One bucket table guarding a slice of the key space
struct LockShard {
    entries: Mutex<HashMap<Vec<u8>, KeyLock>>,
}

/// Per-record lock manager
///
/// Serializes writers that touch the same user key. Acquisition takes the
/// bucket mutex, finds-or-inserts the key's mutex with a reference count,
/// releases the bucket, then blocks on the key mutex itself. Releasing
/// drops the refcount and removes the entry at zero, so the table only
/// ever holds keys somebody is actively locking.
///
/// Callers never re-acquire a key they already hold; the two-key case
/// (RPoplpush) orders acquisitions lexicographically instead.
pub struct LockManager {
    shards: Vec<LockShard>,
}

impl LockManager {
    pub fn new() -> Self {
        let shards = (0..LOCK_SHARD_COUNT)
            .map(|_| LockShard {
                entries: Mutex::new(HashMap::new()),
            })
            .collect();
        LockManager { shards }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (LOCK_SHARD_COUNT - 1)
    }

    /// Acquire the lock for `key`, blocking until it is free
    pub fn acquire(&self, key: &[u8]) -> RecordLock<'_> {
        let shard = &self.shards[self.shard_index(key)];

        let mutex = {
            let mut entries = shard.entries.lock();
            let entry = entries.entry(key.to_vec()).or_insert_with(|| KeyLock {
                mutex: Arc::new(Mutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.mutex)
        };

        // Block outside the bucket mutex so waiters on other keys in the
        // same bucket are not held up.
        let guard = mutex.lock_arc();

        RecordLock {
            manager: self,
            key: key.to_vec(),
            guard: Some(guard),
        }
    }

    /// Acquire locks for several keys at once, in lexicographic order
    ///
    /// Duplicates are locked once. The ordering makes concurrent
    /// multi-key writers deadlock-free against each other.
    pub fn acquire_multi(&self, keys: &[&[u8]]) -> Vec<RecordLock<'_>> {
        let mut sorted: Vec<&[u8]> = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.into_iter().map(|key| self.acquire(key)).collect()
    }

    fn release(&self, key: &[u8]) {
        let shard = &self.shards[self.shard_index(key)];
        let mut entries = shard.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped exclusive hold on one user key, released on drop
pub struct RecordLock<'a> {
    manager: &'a LockManager,
    key: Vec<u8>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        // Release the key mutex before unregistering, so a waiter that
        // wakes up still finds the table entry it is counted in.
        self.guard.take();
        self.manager.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_release_cleans_table() {
        let manager = LockManager::new();
        {
            let _lock = manager.acquire(b"key");
        }
        let shard = &manager.shards[manager.shard_index(b"key")];
        assert!(shard.entries.lock().is_empty());
    }

    #[test]
    fn test_mutual_exclusion_per_key() {
        let manager = Arc::new(LockManager::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _lock = manager.acquire(b"shared");
                    let seen = counter.load(Ordering::SeqCst);
                    thread::yield_now();
                    counter.store(seen + 1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let manager = Arc::new(LockManager::new());
        let _held = manager.acquire(b"a");

        let manager2 = Arc::clone(&manager);
        let other = thread::spawn(move || {
            let _lock = manager2.acquire(b"b");
        });
        thread::sleep(Duration::from_millis(50));
        other.join().unwrap();
    }

    #[test]
    fn test_acquire_multi_dedups() {
        let manager = LockManager::new();
        let locks = manager.acquire_multi(&[b"x".as_ref(), b"y".as_ref(), b"x".as_ref()]);
        assert_eq!(locks.len(), 2);
    }
}
