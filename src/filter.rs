//! Compaction filters
//!
//! The engine invokes these while rewriting files in the background;
//! they are the reclamation half of lazy expiry. Strings and meta
//! filters are pure predicates over the entry's own value. The subentry
//! filter has to consult the owning database's meta column family, which
//! it does through a [`MetaLookup`] capability so the filter factory
//! never owns the database it filters.
//!
//! Filters run concurrently with foreground writes and must not touch
//! the record lock manager; monotonic versions keep them correct. They
//! see only committed state and always read the latest meta, never a
//! snapshot.

use std::ffi::CStr;
use std::sync::{Arc, OnceLock, Weak};

use log::debug;
use rocksdb::compaction_filter::{CompactionFilter, Decision};
use rocksdb::compaction_filter_factory::{CompactionFilterContext, CompactionFilterFactory};
use rocksdb::DB;

use crate::codec::meta::{CollectionMetaRef, ListMetaRef};
use crate::codec::strings::ParsedStringsValue;
use crate::codec::subkey::SubKeyRef;

/// Which meta layout the owning database uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetaFormat {
    Collection,
    List,
}

/// Read-only access to one database's meta column family
///
/// Holds a weak handle, bound right after the database opens. If the
/// handle is unbound or already dropped the filter keeps everything;
/// reclamation just waits for the next compaction.
#[derive(Clone)]
pub(crate) struct MetaLookup {
    db: Arc<OnceLock<Weak<DB>>>,
}

/// Outcome of a meta lookup, distinguishing "meta absent" from "cannot
/// tell right now"; only the former may drop subentries.
enum MetaRead {
    Found(Vec<u8>),
    Missing,
    Unavailable,
}

impl MetaLookup {
    pub fn new() -> Self {
        MetaLookup {
            db: Arc::new(OnceLock::new()),
        }
    }

    /// Bind to the database whose meta CF this capability reads
    pub fn bind(&self, db: &Arc<DB>) {
        let _ = self.db.set(Arc::downgrade(db));
    }

    fn get_meta(&self, user_key: &[u8]) -> MetaRead {
        let db = match self.db.get().and_then(Weak::upgrade) {
            Some(db) => db,
            None => return MetaRead::Unavailable,
        };
        // meta records live in the default CF
        match db.get(user_key) {
            Ok(Some(value)) => MetaRead::Found(value),
            Ok(None) => MetaRead::Missing,
            Err(_) => MetaRead::Unavailable,
        }
    }
}

// ==================== Value-only filters ====================

/// Strings CF: drop expired values
pub(crate) fn strings_compaction_filter(_level: u32, _key: &[u8], value: &[u8]) -> Decision {
    match ParsedStringsValue::parse(value) {
        Ok(parsed) if parsed.is_stale() => Decision::Remove,
        _ => Decision::Keep,
    }
}

/// Hash/set meta CF: drop stale metas
pub(crate) fn collection_meta_compaction_filter(
    _level: u32,
    _key: &[u8],
    value: &[u8],
) -> Decision {
    match CollectionMetaRef::parse(value) {
        Ok(meta) if meta.is_stale() => Decision::Remove,
        _ => Decision::Keep,
    }
}

/// List meta CF: drop stale metas
pub(crate) fn list_meta_compaction_filter(_level: u32, _key: &[u8], value: &[u8]) -> Decision {
    match ListMetaRef::parse(value) {
        Ok(meta) if meta.is_stale() => Decision::Remove,
        _ => Decision::Keep,
    }
}

// ==================== Subentry filter ====================

/// Liveness facts about one user key's meta
#[derive(Clone, Copy)]
enum MetaState {
    /// No meta record at all
    Absent,
    /// Meta present; either stale, or live at this version
    Present { is_stale: bool, version: u32 },
    /// Could not read or parse; keep everything under this key
    Unknown,
}

/// Filter for the field/member/node column families
///
/// A subentry survives only if its user key's meta exists, is live, and
/// carries the same version the subentry was written under. Subentries
/// for one user key are contiguous, so the last lookup is cached across
/// consecutive invocations.
pub(crate) struct SubentryFilter {
    lookup: MetaLookup,
    format: MetaFormat,
    cached: Option<(Vec<u8>, MetaState)>,
}

impl SubentryFilter {
    fn meta_state(&mut self, user_key: &[u8]) -> MetaState {
        if let Some((cached_key, state)) = &self.cached {
            if cached_key.as_slice() == user_key {
                return *state;
            }
        }

        let state = match self.lookup.get_meta(user_key) {
            MetaRead::Missing => MetaState::Absent,
            MetaRead::Unavailable => MetaState::Unknown,
            MetaRead::Found(value) => match self.format {
                MetaFormat::Collection => match CollectionMetaRef::parse(&value) {
                    Ok(meta) => MetaState::Present {
                        is_stale: meta.is_stale(),
                        version: meta.version(),
                    },
                    Err(_) => MetaState::Unknown,
                },
                MetaFormat::List => match ListMetaRef::parse(&value) {
                    Ok(meta) => MetaState::Present {
                        is_stale: meta.is_stale(),
                        version: meta.version(),
                    },
                    Err(_) => MetaState::Unknown,
                },
            },
        };

        self.cached = Some((user_key.to_vec(), state));
        state
    }
}

impl CompactionFilter for SubentryFilter {
    fn filter(&mut self, _level: u32, key: &[u8], _value: &[u8]) -> Decision {
        let subkey = match SubKeyRef::parse(key) {
            Ok(subkey) => subkey,
            Err(_) => return Decision::Keep,
        };

        match self.meta_state(subkey.user_key()) {
            MetaState::Absent => Decision::Remove,
            MetaState::Present { is_stale: true, .. } => Decision::Remove,
            MetaState::Present { version, .. } if version != subkey.version() => Decision::Remove,
            _ => Decision::Keep,
        }
    }

    fn name(&self) -> &CStr {
        c"strata-subentry-filter"
    }
}

/// Factory installed on the subentry column family options
pub(crate) struct SubentryFilterFactory {
    lookup: MetaLookup,
    format: MetaFormat,
}

impl SubentryFilterFactory {
    pub fn new(lookup: MetaLookup, format: MetaFormat) -> Self {
        SubentryFilterFactory { lookup, format }
    }
}

impl CompactionFilterFactory for SubentryFilterFactory {
    type Filter = SubentryFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> SubentryFilter {
        debug!("subentry filter spawned for {:?} compaction", self.format);
        SubentryFilter {
            lookup: self.lookup.clone(),
            format: self.format,
            cached: None,
        }
    }

    fn name(&self) -> &CStr {
        c"strata-subentry-filter-factory"
    }
}
