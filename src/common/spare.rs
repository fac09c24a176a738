// vim: tw=80

//! The global spare set (§9 Design Notes): process-wide state tracking
//! which leaf guids are known hot spares, on-disk or pending.  Protected by
//! the pool configuration writer lock, the same way the teacher's `IDML`
//! protects its transaction state with `futures_locks::RwLock`.

use crate::common::GuidT;
use std::collections::HashMap;
use std::sync::Mutex;

/// One entry in the spare set: the spare's guid and, if it's currently held
/// as an active spare by some pool, that pool's guid (0 if unheld).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpareEntry {
    pub held_by_pool: GuidT,
}

#[derive(Default)]
pub struct SpareSet {
    inner: Mutex<HashMap<GuidT, SpareEntry>>,
}

impl SpareSet {
    pub fn new() -> Self {
        SpareSet { inner: Mutex::new(HashMap::new()) }
    }

    /// Register `guid` as a spare, held by no pool (the on-disk-but-unused
    /// state C5 leaves a freshly `SPARE`-labeled leaf in).
    pub fn add(&self, guid: GuidT) {
        self.inner.lock().unwrap()
            .entry(guid)
            .or_insert(SpareEntry { held_by_pool: 0 });
    }

    /// True iff `guid` is known to this spare set at all (on-disk or
    /// pending).
    pub fn contains(&self, guid: GuidT) -> bool {
        self.inner.lock().unwrap().contains_key(&guid)
    }

    /// If `guid` is a known spare, return the pool it's currently held by
    /// (0 if it's free).
    pub fn held_by(&self, guid: GuidT) -> Option<GuidT> {
        self.inner.lock().unwrap().get(&guid).map(|e| e.held_by_pool)
    }

    /// Mark `guid` as actively held by `pool_guid` (used while a spare is
    /// standing in for a failed leaf).
    pub fn mark_held(&self, guid: GuidT, pool_guid: GuidT) {
        self.inner.lock().unwrap()
            .entry(guid)
            .and_modify(|e| e.held_by_pool = pool_guid)
            .or_insert(SpareEntry { held_by_pool: pool_guid });
    }

    pub fn mark_unheld(&self, guid: GuidT) {
        if let Some(e) = self.inner.lock().unwrap().get_mut(&guid) {
            e.held_by_pool = 0;
        }
    }
}
