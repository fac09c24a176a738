// vim: tw=80

//! C7: Uberblock Syncer — write one uberblock to the appropriate ring cell
//! of every live leaf's four label slots (§4.7).

use crate::common::geometry::Slot;
use crate::common::uberblock::Uberblock;
use crate::common::vdev_tree::VdevNode;
use crate::common::writer;
use crate::common::{Error, TxgT};
use futures::future;
use futures::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type BoxFut<T> = Box<dyn Future<Item = T, Error = Error> + Send>;

/// How many of the resulting per-slot writes both succeeded and landed on a
/// leaf whose top vdev is committed (§4.7: an uncommitted top vdev's writes
/// don't count toward "at least one success"), and the last I/O error seen,
/// if any.
struct Batch {
    good: usize,
    last_err: Option<Error>,
}

/// Write `ub` to ring cell `txg mod N` of every label slot of every live
/// leaf under `subtree`, in parallel.
fn sync_uberblock(subtree: &VdevNode, ub: &Uberblock, txg: TxgT) -> BoxFut<Batch> {
    let n = txg % crate::common::VDEV_UBERBLOCK_RING_COUNT;
    let live_leaves = subtree.live_leaves();
    let good = Arc::new(AtomicUsize::new(0));
    let last_err: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    let mut writes = Vec::new();
    for leaf in live_leaves {
        let committed = leaf.metaslab_array.load(Ordering::Relaxed) != 0;
        for &slot in &Slot::ALL {
            let io = leaf.io.clone();
            let good = good.clone();
            let last_err = last_err.clone();
            let fut: BoxFut<()> = Box::new(
                writer::write_uberblock_cell(io, slot, n, ub).then(move |r| {
                    match r {
                        Ok(()) if committed => {
                            good.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(()) => {}
                        Err(e) => {
                            *last_err.lock().unwrap() = Some(e);
                        }
                    }
                    Ok(())
                }),
            );
            writes.push(fut);
        }
    }

    Box::new(future::join_all(writes).map(move |_| Batch {
        good: good.load(Ordering::Relaxed),
        last_err: last_err.lock().unwrap().take(),
    }))
}

/// Outcome of a full sync-and-evaluate pass (§4.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    Success,
    DeviceUnavailable,
}

/// Submit the batch from [`sync_uberblock`], await it, and translate the
/// good-write count into the three-way outcome named in §4.7:
/// - *success* if at least one good write landed, even if others failed;
/// - *device-unavailable* if there were zero good writes and no leaf was
///   even live to attempt one;
/// - the last observed I/O error otherwise.
pub fn sync_uberblock_tree(subtree: &VdevNode, ub: &Uberblock, txg: TxgT)
    -> BoxFut<SyncOutcome>
{
    Box::new(sync_uberblock(subtree, ub, txg).and_then(|batch| {
        if batch.good > 0 {
            return Ok(SyncOutcome::Success);
        }
        match batch.last_err {
            Some(e) => Err(e),
            None => Ok(SyncOutcome::DeviceUnavailable),
        }
    }))
}
