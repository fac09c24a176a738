// vim: tw=80

//! C8: Config Sync Orchestrator — the five-phase commit that atomically
//! advances the pool across a transaction-group boundary (§4.8).

use crate::common::geometry::Slot;
use crate::common::init::ConfigSource;
use crate::common::leaf_io::LeafIo;
use crate::common::proplist::PlValue;
use crate::common::syncer::{self, SyncOutcome};
use crate::common::uberblock::Uberblock;
use crate::common::vdev_tree::VdevNode;
use crate::common::writer;
use crate::common::{Error, TxgT};
use futures::future;
use futures::Future;
use futures_locks::RwLock;
use log::{debug, warn};
use std::ptr;
use std::sync::Arc;

type BoxFut<'a, T> = Box<dyn Future<Item = T, Error = Error> + Send + 'a>;

/// Everything one commit needs that this subsystem doesn't track on its own
/// (§1: device tree and commit driver are external collaborators).
pub struct SyncRequest<'a> {
    /// The overall pool root; Phase D's fallback commit root.
    pub rvd: &'a VdevNode,
    /// The requested commit root, usually (but not always) `rvd`.
    pub uvd: &'a VdevNode,
    /// Top vdevs whose configuration changed this txg.
    pub dirty: Vec<&'a VdevNode>,
    pub txg: TxgT,
    /// True iff the in-memory uberblock was itself advanced to `txg`.
    pub ub_advanced: bool,
    /// The uberblock to commit, already stamped with `txg`.
    pub ub: &'a Uberblock,
    pub config: &'a dyn ConfigSource,
    /// Leaves written during the previous completed txg window
    /// (`txg_clean_of(txg)`), flushed by Phase A before any label
    /// references them.
    pub prev_txg_leaves: Vec<Arc<dyn LeafIo>>,
}

/// A completed commit.  Every named early-out and every phase sequence that
/// runs to term converges here; only Phase B's exhausted retry and Phase
/// D's exhausted fallback return `Err` (§4.8 failure taxonomy).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommitOutcome;

pub struct ConfigSyncOrchestrator {
    freeze_txg: TxgT,
    final_txg: TxgT,
    /// Pool configuration reader/writer lock (§5): C8 holds it in writer
    /// mode for the duration of a commit.
    config_lock: RwLock<()>,
}

impl ConfigSyncOrchestrator {
    pub fn new(freeze_txg: TxgT, final_txg: TxgT) -> Self {
        ConfigSyncOrchestrator {
            freeze_txg,
            final_txg,
            config_lock: RwLock::new(()),
        }
    }

    /// Run one transaction group's commit (§4.8).
    pub fn sync<'a>(&self, req: SyncRequest<'a>) -> BoxFut<'a, CommitOutcome> {
        if req.txg.as_u64() > self.freeze_txg.as_u64() {
            debug!("txg {} is past freeze_txg {}, pool frozen for test",
                req.txg, self.freeze_txg);
            return Box::new(future::ok(CommitOutcome));
        }
        debug_assert!(req.txg.as_u64() <= self.final_txg.as_u64(),
            "txg {} exceeds final_txg {}", req.txg, self.final_txg);
        if req.dirty.is_empty() && !req.ub_advanced {
            return Box::new(future::ok(CommitOutcome));
        }

        let rvd = req.rvd;
        let uvd = req.uvd;
        let txg = req.txg;
        let config = req.config;
        let ub = req.ub;
        let dirty = req.dirty;

        Box::new(self.config_lock.write().map_err(|()| Error::EIO).and_then(move |guard| {
            flush_leaves(req.prev_txg_leaves)
                .then(move |_| phase_b(rvd, dirty, txg, config))
                .and_then(move |dirty| {
                    let leaves = collect_leaves(&dirty);
                    flush_leaves(leaves).map(move |()| dirty)
                })
                .and_then(move |dirty| phase_d(uvd, rvd, ub, txg).map(move |()| dirty))
                .and_then(move |dirty| phase_e(dirty, txg, config))
                .map(move |()| {
                    // Held for the whole commit; released once the last
                    // phase resolves.
                    drop(guard);
                    CommitOutcome
                })
        }))
    }
}

/// One top vdev's contribution to an even/odd label sync pass.
struct LeafSyncResult {
    good: usize,
    err: Option<Error>,
    is_log: bool,
}

/// Write an updated phys region, naming `txg`, to `slot` of every live leaf
/// under `vd` (§4.8 Phase B/E body).
fn sync_label<'a>(vd: &'a VdevNode, slot: Slot, txg: TxgT, config: &'a dyn ConfigSource)
    -> BoxFut<'a, LeafSyncResult>
{
    let is_log = vd.is_log;
    let mut writes = Vec::new();
    for leaf in vd.all_leaves() {
        if !leaf.io.is_live() {
            continue;
        }
        let mut pl = config.full_config(leaf);
        pl.insert("txg", PlValue::U64(txg.as_u64()));
        let io = leaf.io.clone();
        writes.push(writer::write_phys(io, slot, &pl)
            .then(|r| -> Result<Result<(), Error>, ()> { Ok(r) }));
    }
    Box::new(future::join_all(writes).map(move |results| {
        let mut good = 0;
        let mut err = None;
        for r in results {
            match r {
                Ok(()) => good += 1,
                Err(e) => err = Some(e),
            }
        }
        LeafSyncResult { good, err, is_log }
    }))
}

/// One pass of label syncing over every `(vdev, slot)` pair.  Returns the
/// phase-wide good-write count and the last non-log error seen; a failing
/// log vdev is logged and otherwise ignored (§4.8 partial success policy).
fn sync_pass<'a>(dirty: &[&'a VdevNode], txg: TxgT, config: &'a dyn ConfigSource,
    slots: &'static [Slot]) -> BoxFut<'a, (usize, Option<Error>)>
{
    let mut label_futs = Vec::new();
    for &vd in dirty {
        for &slot in slots {
            label_futs.push(sync_label(vd, slot, txg, config));
        }
    }
    Box::new(future::join_all(label_futs).map(|results| {
        let mut total_good = 0;
        let mut last_err = None;
        for r in results {
            total_good += r.good;
            match (r.is_log, r.err) {
                (true, Some(e)) => debug!("log vdev label write failed, demoted: {:?}", e),
                (false, Some(e)) => last_err = Some(e),
                (_, None) => {}
            }
        }
        (total_good, last_err)
    }))
}

/// Phase B: sync even labels (slots 0, 2) for the dirty list, retrying once
/// against the whole pool root on total failure (§4.8, §9 open question).
fn phase_b<'a>(rvd: &'a VdevNode, dirty: Vec<&'a VdevNode>, txg: TxgT,
    config: &'a dyn ConfigSource) -> BoxFut<'a, Vec<&'a VdevNode>>
{
    Box::new(sync_pass(&dirty, txg, config, &Slot::EVEN).and_then(move |(good, err)| {
        if good > 0 {
            return Box::new(future::ok(dirty)) as BoxFut<'a, Vec<&'a VdevNode>>;
        }
        warn!("phase B: zero good label writes for txg {}, retrying against pool root", txg);
        let retry_dirty: Vec<&'a VdevNode> = rvd.children().iter().collect();
        Box::new(sync_pass(&retry_dirty, txg, config, &Slot::EVEN).and_then(
            move |(good2, err2)| {
                if good2 > 0 {
                    Ok(retry_dirty)
                } else {
                    Err(err2.or(err).unwrap_or(Error::EIO))
                }
            },
        ))
    }))
}

/// Phase D: commit the new uberblock against `uvd`, falling back to `rvd`
/// once if `uvd` isn't the pool root (§4.8).
fn phase_d<'a>(uvd: &'a VdevNode, rvd: &'a VdevNode, ub: &'a Uberblock, txg: TxgT)
    -> BoxFut<'a, ()>
{
    Box::new(syncer::sync_uberblock_tree(uvd, ub, txg).then(move |r| -> BoxFut<'a, ()> {
        match r {
            // §4.8 Phase D: flush the committed uberblock's write cache
            // before Phase E can touch the odd labels that still reference
            // the previous durable uberblock (P4 crash safety).
            Ok(SyncOutcome::Success) => flush_leaves(collect_leaves(&[uvd])),
            (Ok(SyncOutcome::DeviceUnavailable) | Err(_)) if !ptr::eq(uvd, rvd) => {
                warn!("phase D: commit root failed for txg {}, falling back to pool root", txg);
                Box::new(syncer::sync_uberblock_tree(rvd, ub, txg).then(move |r2| -> BoxFut<'a, ()> {
                    match r2 {
                        Ok(SyncOutcome::Success) => flush_leaves(collect_leaves(&[rvd])),
                        Ok(SyncOutcome::DeviceUnavailable) => Box::new(future::err(Error::ENODEV)),
                        Err(e) => Box::new(future::err(e)),
                    }
                }))
            }
            Ok(SyncOutcome::DeviceUnavailable) => Box::new(future::err(Error::ENODEV)),
            Err(e) => Box::new(future::err(e)),
        }
    }))
}

/// Phase E: sync odd labels (slots 1, 3), then a final barrier.  Not fatal:
/// the pool is already durably advanced by Phase D (§4.8).
fn phase_e<'a>(dirty: Vec<&'a VdevNode>, txg: TxgT, config: &'a dyn ConfigSource)
    -> BoxFut<'a, ()>
{
    Box::new(sync_pass(&dirty, txg, config, &Slot::ODD).and_then(move |(good, _err)| {
        if good == 0 {
            warn!("phase E: zero good odd-label writes for txg {} (non-fatal)", txg);
        }
        let leaves = collect_leaves(&dirty);
        flush_leaves(leaves)
    }))
}

fn collect_leaves<'a>(dirty: &[&'a VdevNode]) -> Vec<Arc<dyn LeafIo>> {
    dirty.iter().flat_map(|vd| vd.all_leaves()).map(|l| l.io.clone()).collect()
}

/// Best-effort flush-and-wait barrier over a set of leaves.  Used for the
/// Phase A pre-barrier, the Phase C even-label barrier, and Phase E's final
/// flush: none of those are named as a fatal failure mode in §4.8.
fn flush_leaves<'a>(leaves: Vec<Arc<dyn LeafIo>>) -> BoxFut<'a, ()> {
    let flushes: Vec<_> = leaves.into_iter().map(writer::flush_best_effort).collect();
    Box::new(future::join_all(flushes).map(|_| ()))
}
