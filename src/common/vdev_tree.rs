// vim: tw=80

//! A lightweight, local stand-in for the real parent/child vdev graph
//! (§1: out of scope, interfaced only).  The real device tree model also
//! tracks liveness transitions, RAID-Z parity layout, and spare attachment
//! points; this one carries only what C4-C8 need to recurse and to decide
//! "is this leaf part of a committed top vdev".
//!
//! Interior/leaf polymorphism is a tagged variant, dispatched on in every
//! recursive walk (§9 Design Notes), rather than a trait object: a vdev
//! tree has no dynamic ancestry, so there's nothing a `dyn` dispatch would
//! buy beyond what a `match` already gives for free.

use crate::common::leaf_io::LeafIo;
use crate::common::{GuidT, TxgT};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-leaf state tracked by this subsystem.
pub struct LeafVdev {
    pub top_guid: GuidT,
    /// Fixed at first-label-write and never mutated thereafter (I5).
    pub create_txg: TxgT,
    pub io: Arc<dyn LeafIo>,
    /// Non-zero once the top vdev this leaf belongs to has been committed
    /// to the pool's configuration.  C7 only credits a write to this
    /// counter toward "at least one success" once this is non-zero, so
    /// writes to a brand-new-but-uncommitted top vdev can't falsely
    /// satisfy the rule.
    pub metaslab_array: AtomicU64,
}

/// A node in the vdev tree: either a leaf device, or an interior node
/// (mirror, raidz, or the pool root) with children.
pub enum VdevKind {
    Leaf(LeafVdev),
    Interior(Vec<VdevNode>),
}

pub struct VdevNode {
    /// Atomic rather than a plain field so a spare-claim guid rewrite
    /// (§4.5 step 3) can be applied to a leaf via a shared reference while
    /// its ancestor chain (which owns it) is borrowed immutably too.
    guid: AtomicU64,
    /// True for a log vdev: write failures here are demoted to success
    /// (§4.8 Phase B/E partial-success policy).
    pub is_log: bool,
    /// Running sum of every descendant leaf's guid, used at pool open to
    /// verify all leaves are present.  Maintained by C5 when a spare's guid
    /// is rewritten (§4.5 step 3).
    pub guid_sum: AtomicU64,
    pub kind: VdevKind,
}

impl VdevNode {
    pub fn leaf(guid: GuidT, top_guid: GuidT, create_txg: TxgT,
                io: Arc<dyn LeafIo>, is_log: bool) -> Self
    {
        VdevNode {
            guid: AtomicU64::new(guid),
            is_log,
            guid_sum: AtomicU64::new(guid),
            kind: VdevKind::Leaf(LeafVdev {
                top_guid,
                create_txg,
                io,
                metaslab_array: AtomicU64::new(0),
            }),
        }
    }

    pub fn interior(guid: GuidT, is_log: bool, children: Vec<VdevNode>) -> Self {
        let guid_sum = children.iter()
            .fold(guid, |acc, c| acc.wrapping_add(c.guid_sum.load(Ordering::Relaxed)));
        VdevNode {
            guid: AtomicU64::new(guid),
            is_log,
            guid_sum: AtomicU64::new(guid_sum),
            kind: VdevKind::Interior(children),
        }
    }

    pub fn guid(&self) -> GuidT {
        self.guid.load(Ordering::Relaxed)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, VdevKind::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafVdev> {
        match &self.kind {
            VdevKind::Leaf(l) => Some(l),
            VdevKind::Interior(_) => None,
        }
    }

    pub fn children(&self) -> &[VdevNode] {
        match &self.kind {
            VdevKind::Leaf(_) => &[],
            VdevKind::Interior(c) => c,
        }
    }

    /// Mark this top vdev's leaves as belonging to a committed configuration
    /// (i.e. give it a non-zero metaslab array), so C7's good-write counter
    /// will credit writes to it.
    pub fn commit(&self) {
        match &self.kind {
            VdevKind::Leaf(l) => {
                l.metaslab_array.store(1, Ordering::Relaxed);
            }
            VdevKind::Interior(children) => {
                for c in children {
                    c.commit();
                }
            }
        }
    }

    /// Collect every live leaf reachable from this node, depth-first.
    pub fn live_leaves(&self) -> Vec<&LeafVdev> {
        let mut out = Vec::new();
        self.collect_live_leaves(&mut out);
        out
    }

    fn collect_live_leaves<'a>(&'a self, out: &mut Vec<&'a LeafVdev>) {
        match &self.kind {
            VdevKind::Leaf(l) => {
                if l.io.is_live() {
                    out.push(l);
                }
            }
            VdevKind::Interior(children) => {
                for c in children {
                    c.collect_live_leaves(out);
                }
            }
        }
    }

    /// Every leaf reachable from this node, live or not, in the order C5's
    /// sequential descent (§4.5) visits them.
    pub fn all_leaves(&self) -> Vec<&LeafVdev> {
        let mut out = Vec::new();
        self.collect_all_leaves(&mut out);
        out
    }

    fn collect_all_leaves<'a>(&'a self, out: &mut Vec<&'a LeafVdev>) {
        match &self.kind {
            VdevKind::Leaf(l) => out.push(l),
            VdevKind::Interior(children) => {
                for c in children {
                    c.collect_all_leaves(out);
                }
            }
        }
    }

    /// Apply a spare-claim guid rewrite (§4.5 step 3) to this leaf, and
    /// propagate the delta (new - old) to every node in `ancestors`, outermost
    /// last.  Takes `&self`, not `&mut self`: during C5's recursive descent
    /// this leaf is reached through a shared reference to its own ancestor
    /// chain, so both its own guid and the chain's guid sums are plain
    /// interior-mutable atomics.
    pub fn rewrite_guid(&self, new_guid: GuidT, ancestors: &[&VdevNode]) {
        let old_guid = self.guid.swap(new_guid, Ordering::Relaxed);
        self.guid_sum.store(new_guid, Ordering::Relaxed);
        for anc in ancestors {
            anc.guid_sum.fetch_update(Ordering::Relaxed, Ordering::Relaxed,
                |v| Some(v.wrapping_sub(old_guid).wrapping_add(new_guid)))
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::leaf_io::mem::MemLeaf;
    use crate::common::VDEV_LABEL_SIZE;
    use std::sync::Arc;

    fn leaf(guid: GuidT) -> VdevNode {
        let (_, node) = leaf_with_handle(guid);
        node
    }

    fn leaf_with_handle(guid: GuidT) -> (MemLeaf, VdevNode) {
        let mem = MemLeaf::new(VDEV_LABEL_SIZE * 4);
        let io: Arc<dyn LeafIo> = Arc::new(mem.clone());
        (mem, VdevNode::leaf(guid, 100, TxgT::from(0), io, false))
    }

    #[test]
    fn guid_sum_accumulates_over_children() {
        let mirror = VdevNode::interior(100, false, vec![leaf(1), leaf(2), leaf(3)]);
        assert_eq!(mirror.guid_sum.load(Ordering::Relaxed), 100u64 + 1 + 2 + 3);
    }

    #[test]
    fn commit_sets_metaslab_array_on_every_leaf() {
        let mirror = VdevNode::interior(100, false, vec![leaf(1), leaf(2)]);
        for l in mirror.all_leaves() {
            assert_eq!(l.metaslab_array.load(Ordering::Relaxed), 0);
        }
        mirror.commit();
        for l in mirror.all_leaves() {
            assert_ne!(l.metaslab_array.load(Ordering::Relaxed), 0);
        }
    }

    #[test]
    fn dead_leaves_excluded_from_live_leaves() {
        let l1 = leaf(1);
        let (mem2, l2) = leaf_with_handle(2);
        mem2.set_live(false);
        let mirror = VdevNode::interior(100, false, vec![l1, l2]);
        assert_eq!(mirror.live_leaves().len(), 1);
    }

    #[test]
    fn rewrite_guid_propagates_delta_to_ancestors() {
        let mirror = VdevNode::interior(100, false, vec![leaf(1), leaf(2)]);
        let root = VdevNode::interior(1000, false, vec![mirror]);
        let mirror = &root.children()[0];
        let leaf1 = &mirror.children()[0];

        leaf1.rewrite_guid(42, &[mirror, &root]);

        assert_eq!(leaf1.guid(), 42);
        assert_eq!(mirror.guid_sum.load(Ordering::Relaxed), 100 + 42 + 2);
        assert_eq!(root.guid_sum.load(Ordering::Relaxed), 1000 + 100 + 42 + 2);
    }
}
