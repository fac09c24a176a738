// vim: tw=80

//! C5: Label Initializer — first-time labeling of a leaf for
//! create/replace/spare/remove (§4.5).

use crate::common::boot_header::BootHeader;
use crate::common::geometry::Slot;
use crate::common::inuse::{in_use, InUseResult, KnownPools};
use crate::common::proplist::{PlValue, PropertyList};
use crate::common::spare::SpareSet;
use crate::common::uberblock::Uberblock;
use crate::common::vdev_tree::{LeafVdev, VdevKind, VdevNode};
use crate::common::writer;
use crate::common::{
    Error, GuidT, LabelReason, TxgT, VDEV_BOOT_VERSION, VDEV_UBERBLOCK_RING_COUNT,
    VDEV_UBERBLOCK_SIZE,
};
use futures::future;
use futures::Future;
use log::warn;

type BoxFut<'a, T> = Box<dyn Future<Item = T, Error = Error> + Send + 'a>;

/// Supplies the full pool/vdev configuration for a leaf, as the config-sync
/// orchestrator would know it (pool name, pool guid, pool state, the
/// recursive `vdev_tree`, and so on).  C5 itself only ever adds
/// `create_txg`/`txg` on top (§4.5 step 4); building the rest is the
/// orchestrator's job.
pub trait ConfigSource: Send + Sync {
    fn full_config(&self, leaf: &LeafVdev) -> PropertyList;
}

/// Depth-first, left-to-right list of every leaf reachable from `node`,
/// paired with its ancestor chain (nearest parent last... no, root first,
/// nearest parent last is irrelevant here: order is outermost-first,
/// matching the order `rewrite_guid` wants to walk it).
fn flatten<'a>(node: &'a VdevNode, ancestors: &mut Vec<&'a VdevNode>,
    out: &mut Vec<(Vec<&'a VdevNode>, &'a VdevNode)>)
{
    match &node.kind {
        VdevKind::Leaf(_) => out.push((ancestors.clone(), node)),
        VdevKind::Interior(children) => {
            ancestors.push(node);
            for c in children {
                flatten(c, ancestors, out);
            }
            ancestors.pop();
        }
    }
}

fn spare_pl(guid: GuidT) -> PropertyList {
    let mut pl = PropertyList::new();
    pl.insert("version", PlValue::U64(VDEV_BOOT_VERSION));
    pl.insert("pool_state", PlValue::Str("SPARE".to_string()));
    pl.insert("vdev_guid", PlValue::Guid(guid));
    pl
}

fn process_leaf<'a>(ancestors: Vec<&'a VdevNode>, node: &'a VdevNode,
    create_txg: TxgT, reason: LabelReason, config: &'a dyn ConfigSource,
    template_ub: &'a Uberblock, pools: &'a dyn KnownPools, spares: &'a SpareSet)
    -> BoxFut<'a, ()>
{
    let leaf = node.as_leaf().expect("flatten only yields leaf nodes");

    // Step 1: a dead leaf fails immediately, before even probing it.
    if !leaf.io.is_live() {
        return Box::new(future::err(Error::EIO));
    }

    let io_write = leaf.io.clone();
    let probed = in_use(leaf.io.clone(), create_txg, reason, pools, spares)
        .then(|r: Result<InUseResult, ()>| -> Result<InUseResult, Error> {
            Ok(r.expect("in_use is infallible"))
        });

    Box::new(probed.and_then(move |probe| -> BoxFut<'a, ()> {
        // Step 2.
        if reason != LabelReason::Remove && probe.inuse {
            return Box::new(future::err(Error::EBUSY));
        }

        // Step 3.
        if probe.observed_spare_guid != 0 {
            node.rewrite_guid(probe.observed_spare_guid, &ancestors);
            if reason == LabelReason::Spare {
                return Box::new(future::ok(()));
            }
        }

        // Step 4.
        let is_spare_label = reason == LabelReason::Spare
            || (reason == LabelReason::Remove && probe.observed_spare_guid != 0);
        let pl = if is_spare_label {
            spare_pl(node.guid())
        } else {
            let mut pl = config.full_config(leaf);
            pl.insert("create_txg", PlValue::U64(create_txg.as_u64()));
            pl.insert("txg", PlValue::U64(0));
            pl
        };

        // Steps 5-6: the boot header and a ring uniformly filled with the
        // caller's current in-memory uberblock, pinned to txg 0 (the leaf
        // isn't part of any committed txg yet).  `write_label` (C3) surfaces
        // an oversized `pl` as `ENAMETOOLONG` when it encodes it.
        let hdr = BootHeader::new(VDEV_UBERBLOCK_RING_COUNT * VDEV_UBERBLOCK_SIZE);
        let ub0 = template_ub.with_txg(TxgT::from(0));
        let ubs: Vec<Uberblock> = (0..VDEV_UBERBLOCK_RING_COUNT).map(|_| ub0).collect();

        // Step 7: all four slots in parallel.
        let writes: Vec<_> = Slot::ALL.iter()
            .map(|&slot| writer::write_label(io_write.clone(), slot, &pl, &hdr, &ubs))
            .collect();

        let final_guid = node.guid();
        Box::new(future::join_all(writes).map(move |reports| {
            for r in &reports {
                if !r.all_good() {
                    warn!("leaf {}: only {}/{} label regions written",
                        final_guid, r.good, r.attempted);
                }
            }
            // Step 8.
            if is_spare_label {
                spares.add(final_guid);
            }
        }))
    }))
}

/// Label every leaf under `subtree_root` for `reason`, sequentially
/// (§4.5's closing rationale: a sequential descent is what catches a caller
/// presenting the same physical device twice under different logical
/// positions — the second visit observes the first's freshly-written
/// label and reports busy).
pub fn init_labels<'a>(subtree_root: &'a VdevNode, create_txg: TxgT,
    reason: LabelReason, config: &'a dyn ConfigSource, template_ub: &'a Uberblock,
    pools: &'a dyn KnownPools, spares: &'a SpareSet) -> BoxFut<'a, ()>
{
    let mut ancestors = Vec::new();
    let mut work = Vec::new();
    flatten(subtree_root, &mut ancestors, &mut work);

    Box::new(future::loop_fn(0usize, move |i| -> BoxFut<'a, future::Loop<(), usize>> {
        if i >= work.len() {
            return Box::new(future::ok(future::Loop::Break(())));
        }
        let (anc, node) = work[i].clone();
        Box::new(process_leaf(anc, node, create_txg, reason, config,
            template_ub, pools, spares)
            .map(move |()| future::Loop::Continue(i + 1)))
    }))
}
