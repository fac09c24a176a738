// vim: tw=80

//! C6: Uberblock Loader — scan every live leaf's uberblock ring and pick the
//! greatest valid uberblock under the total order (§4.6).

use crate::common::geometry;
use crate::common::leaf_io::LeafIo;
use crate::common::uberblock::Uberblock;
use crate::common::vdev_tree::VdevNode;
use crate::common::{ByteT, Error, VDEV_UBERBLOCK_RING_COUNT};
use divbuf::DivBufShared;
use futures::future;
use futures::Future;
use std::sync::{Arc, Mutex};

type BoxFut<T> = Box<dyn Future<Item = T, Error = Error> + Send>;

/// Read and verify one ring cell of one slot of one leaf.  Never fails: any
/// I/O error or invalid uberblock just isn't a candidate (most cells are
/// stale or unwritten by construction, not a device error).
fn read_cell(io: Arc<dyn LeafIo>, device_size: ByteT, slot: geometry::Slot, n: u64)
    -> Box<dyn Future<Item = Option<Uberblock>, Error = ()> + Send>
{
    let off = geometry::offset(device_size, slot, geometry::uberblock_cell_offset(n));
    let dbs = DivBufShared::from(vec![0u8; crate::common::VDEV_UBERBLOCK_SIZE as usize]);
    Box::new(io.read_at(off, dbs).then(|r| {
        let ub = r.ok()
            .and_then(|dbs| {
                let dbuf = dbs.try_const().unwrap();
                Uberblock::decode(&dbuf).ok()
            })
            .filter(Uberblock::is_valid);
        Ok(ub)
    }))
}

/// Offer `candidate` to the shared best-so-far slot; replaces it iff
/// strictly greater under the uberblock total order (§4.6: ties can't arise
/// from genuinely different writes, and if they did the payload is
/// equivalent by construction, so either survivor is correct).
fn offer(best: &Mutex<Option<Uberblock>>, candidate: Uberblock) {
    let mut guard = best.lock().unwrap();
    let replace = match &*guard {
        None => true,
        Some(cur) => candidate > *cur,
    };
    if replace {
        *guard = Some(candidate);
    }
}

/// Scan every live leaf of `tree` and return the greatest valid uberblock
/// found anywhere.  Fails with `ESTALE` if no live leaf carried one.
pub fn load_best_uberblock(tree: &VdevNode) -> BoxFut<Uberblock> {
    let best: Arc<Mutex<Option<Uberblock>>> = Arc::new(Mutex::new(None));
    let mut reads = Vec::new();

    for leaf in tree.live_leaves() {
        let device_size = leaf.io.size();
        for &slot in &geometry::Slot::ALL {
            for n in 0..VDEV_UBERBLOCK_RING_COUNT {
                let io = leaf.io.clone();
                let best = best.clone();
                reads.push(read_cell(io, device_size, slot, n).map(move |found| {
                    if let Some(ub) = found {
                        offer(&best, ub);
                    }
                }));
            }
        }
    }

    Box::new(future::join_all(reads).then(move |_| {
        match best.lock().unwrap().clone() {
            Some(ub) => Ok(ub),
            None => Err(Error::ESTALE),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::leaf_io::mem::MemLeaf;
    use crate::common::uberblock::RootPtr;
    use crate::common::{GuidT, TxgT, VDEV_LABEL_SIZE};
    use crate::common::writer;
    use futures::Future;

    fn leaf_node(guid: GuidT) -> (MemLeaf, VdevNode) {
        let mem = MemLeaf::new(VDEV_LABEL_SIZE * 4);
        let io: Arc<dyn LeafIo> = Arc::new(mem.clone());
        (mem, VdevNode::leaf(guid, guid, TxgT::from(0), io, false))
    }

    fn write_ub(io: Arc<dyn LeafIo>, slot: geometry::Slot, n: u64, ub: &Uberblock) {
        writer::write_uberblock_cell(io, slot, n, ub).wait().unwrap();
    }

    #[test]
    fn no_leaves_is_stale() {
        let tree = VdevNode::interior(1, false, vec![]);
        let err = load_best_uberblock(&tree).wait().unwrap_err();
        assert_eq!(err, Error::ESTALE);
    }

    #[test]
    fn blank_leaves_are_stale() {
        let (_mem, leaf) = leaf_node(1);
        let tree = VdevNode::interior(100, false, vec![leaf]);
        let err = load_best_uberblock(&tree).wait().unwrap_err();
        assert_eq!(err, Error::ESTALE);
    }

    #[test]
    fn finds_single_valid_uberblock() {
        let (_mem, leaf) = leaf_node(1);
        let io = leaf.as_leaf().unwrap().io.clone();
        let ub = Uberblock::new(1, TxgT::from(5), 1, 100, RootPtr::default());
        write_ub(io, geometry::Slot::new(0), 0, &ub);

        let tree = VdevNode::interior(100, false, vec![leaf]);
        let got = load_best_uberblock(&tree).wait().unwrap();
        assert_eq!(got, ub);
    }

    #[test]
    fn picks_greatest_txg_across_leaves() {
        let (_mem1, leaf1) = leaf_node(1);
        let io1 = leaf1.as_leaf().unwrap().io.clone();
        let (_mem2, leaf2) = leaf_node(2);
        let io2 = leaf2.as_leaf().unwrap().io.clone();

        let old_ub = Uberblock::new(1, TxgT::from(5), 3, 100, RootPtr::default());
        let new_ub = Uberblock::new(1, TxgT::from(7), 3, 50, RootPtr::default());
        write_ub(io1, geometry::Slot::new(0), 0, &old_ub);
        write_ub(io2, geometry::Slot::new(1), 0, &new_ub);

        let tree = VdevNode::interior(100, false, vec![leaf1, leaf2]);
        let got = load_best_uberblock(&tree).wait().unwrap();
        assert_eq!(got, new_ub);
    }

    #[test]
    fn same_txg_breaks_tie_on_later_timestamp() {
        let (_mem1, leaf1) = leaf_node(1);
        let io1 = leaf1.as_leaf().unwrap().io.clone();
        let (_mem2, leaf2) = leaf_node(2);
        let io2 = leaf2.as_leaf().unwrap().io.clone();

        let missed = Uberblock::new(1, TxgT::from(9), 3, 10, RootPtr::default());
        let resynced = Uberblock::new(1, TxgT::from(9), 3, 99, RootPtr::default());
        write_ub(io1, geometry::Slot::new(0), 0, &missed);
        write_ub(io2, geometry::Slot::new(0), 0, &resynced);

        let tree = VdevNode::interior(100, false, vec![leaf1, leaf2]);
        let got = load_best_uberblock(&tree).wait().unwrap();
        assert_eq!(got, resynced);
    }

    #[test]
    fn dead_leaves_are_skipped() {
        let (mem, leaf) = leaf_node(1);
        let io = leaf.as_leaf().unwrap().io.clone();
        let ub = Uberblock::new(1, TxgT::from(5), 1, 100, RootPtr::default());
        write_ub(io, geometry::Slot::new(0), 0, &ub);
        mem.set_live(false);

        let tree = VdevNode::interior(100, false, vec![leaf]);
        let err = load_best_uberblock(&tree).wait().unwrap_err();
        assert_eq!(err, Error::ESTALE);
    }

    #[test]
    fn corrupted_uberblock_is_not_a_candidate() {
        let (_mem, leaf) = leaf_node(1);
        let io = leaf.as_leaf().unwrap().io.clone();

        // A cell full of non-zero garbage decodes to something but never
        // passes is_valid() (wrong magic, checksum mismatch).
        let off = geometry::offset(io.size(), geometry::Slot::new(0),
            geometry::uberblock_cell_offset(0));
        let garbage = divbuf::DivBufShared::from(vec![0xffu8;
            crate::common::VDEV_UBERBLOCK_SIZE as usize]);
        io.write_at(off, garbage).wait().unwrap();

        let tree = VdevNode::interior(100, false, vec![leaf]);
        let err = load_best_uberblock(&tree).wait().unwrap_err();
        assert_eq!(err, Error::ESTALE);
    }
}
