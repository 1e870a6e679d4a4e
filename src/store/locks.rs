//! Synchronization for concurrent writers sharing one chunked array.

use crate::error::{Result, VolumeError};
use crate::types::Extent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One lock per chunk in use. An entry lives only while some caller holds
/// or waits for it.
#[derive(Debug, Default)]
pub(crate) struct ChunkLocks {
    locks: Mutex<HashMap<[usize; 3], Arc<Mutex<()>>>>,
}

impl ChunkLocks {
    /// Run `f` while holding the lock of chunk `index`. Wrap the whole
    /// read-modify-write of that chunk.
    pub fn with_lock<R>(&self, index: [usize; 3], f: impl FnOnce() -> R) -> R {
        let lock = self.locks.lock().entry(index).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // Only the map and `lock` are left.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&index);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Regions currently being written.
#[derive(Debug, Default)]
pub(crate) struct RegionRegistry {
    in_flight: Mutex<Vec<(u64, Extent)>>,
    next_id: AtomicU64,
}

impl RegionRegistry {
    /// Claim `extent` for writing. Fails with `WriteConflict` if it overlaps a
    /// region whose write has not finished. The claim is released on drop.
    pub fn claim(&self, extent: Extent) -> Result<RegionClaim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if let Some((_, other)) = in_flight.iter().find(|(_, other)| other.overlaps(&extent)) {
            return Err(VolumeError::WriteConflict(format!(
                "write to {} overlaps in-flight write to {}",
                extent, other
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        in_flight.push((id, extent));
        Ok(RegionClaim { registry: self, id })
    }
}

pub(crate) struct RegionClaim<'a> {
    registry: &'a RegionRegistry,
    id: u64,
}

impl Drop for RegionClaim<'_> {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}
