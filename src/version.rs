use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall clock in whole seconds since the Unix epoch
pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Per-store epoch source for collection versions
///
/// Versions must be strictly increasing per user key across resets, and
/// must not repeat across process restarts (a restart would otherwise
/// revive subentries written under an old epoch). Seeding from the wall
/// clock and skipping forward to `now` on every bump gives both, and a
/// clock that jumps backward degrades to plain monotonic increments.
pub struct VersionGenerator {
    counter: AtomicU32,
}

impl VersionGenerator {
    pub fn new() -> Self {
        VersionGenerator {
            counter: AtomicU32::new(now_secs()),
        }
    }

    /// Produce the next version
    pub fn next(&self) -> u32 {
        let now = now_secs();
        let mut current = self.counter.load(Ordering::Relaxed);
        loop {
            let next = std::cmp::max(current.wrapping_add(1), now);
            match self.counter.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for VersionGenerator {
    fn default() -> Self {
        Self::new()
    }
}
