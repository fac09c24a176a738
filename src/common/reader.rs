// vim: tw=80

//! C2: Label Reader — read and decode the property-list half of a leaf's
//! four labels.

use crate::common::framing;
use crate::common::geometry::{self, Slot};
use crate::common::leaf_io::LeafIo;
use crate::common::proplist::PropertyList;
use crate::common::{ByteT, VDEV_PHYS_SIZE};
use divbuf::DivBufShared;
use futures::future::{self, Loop};
use futures::Future;
use log::debug;
use std::sync::Arc;

type BoxFut<T> = Box<dyn Future<Item = T, Error = ()> + Send>;

/// Read and decode the property list of one slot.  Never fails: any I/O or
/// decode error is logged and folded into `None`, so a single bad slot can
/// never look like a device error to the caller (§4.2 speculative flag).
fn read_slot(io: Arc<dyn LeafIo>, device_size: ByteT, slot: Slot)
    -> BoxFut<Option<PropertyList>>
{
    let off = geometry::offset(device_size, slot, geometry::PHYS_OFFSET);
    let dbs = DivBufShared::from(vec![0u8; VDEV_PHYS_SIZE as usize]);
    Box::new(io.read_at(off, dbs).then(move |r| {
        let pl = r.ok().and_then(|dbs| {
            let dbuf = dbs.try_const().unwrap();
            framing::unframe(&dbuf).ok()
                .and_then(|payload| PropertyList::decode(payload).ok())
        });
        if pl.is_none() {
            debug!("label slot {} unreadable or undecodable", slot.idx());
        }
        Ok(pl)
    }))
}

/// Read slots 0, 1, 2, 3 in order; return the first one that decodes.
///
/// A dead leaf can't be read at all: this returns `None` immediately rather
/// than attempting four reads certain to fail.
pub fn read_label_config(io: Arc<dyn LeafIo>) -> BoxFut<Option<PropertyList>> {
    if !io.is_live() {
        return Box::new(future::ok(None));
    }
    let device_size = io.size();
    let slots = Slot::ALL.to_vec();
    Box::new(future::loop_fn((io, slots, device_size),
        |(io, mut slots, device_size)| -> BoxFut<Loop<Option<PropertyList>, _>>
    {
        if slots.is_empty() {
            return Box::new(future::ok(Loop::Break(None)));
        }
        let slot = slots.remove(0);
        let io2 = io.clone();
        Box::new(read_slot(io.clone(), device_size, slot).map(move |found| {
            match found {
                Some(pl) => Loop::Break(Some(pl)),
                None => Loop::Continue((io2, slots, device_size)),
            }
        }))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::leaf_io::mem::MemLeaf;
    use crate::common::proplist::PlValue;
    use crate::common::writer;
    use crate::common::VDEV_LABEL_SIZE;
    use futures::Future;

    fn blank_leaf() -> MemLeaf {
        MemLeaf::new(VDEV_LABEL_SIZE * 4)
    }

    #[test]
    fn blank_device_has_no_config() {
        let mem = blank_leaf();
        let io: Arc<dyn LeafIo> = Arc::new(mem);
        let got = read_label_config(io).wait().unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn finds_config_written_to_any_slot() {
        let mem = blank_leaf();
        let io: Arc<dyn LeafIo> = Arc::new(mem.clone());
        let mut pl = PropertyList::new();
        pl.insert("pool_guid", PlValue::Guid(99));
        writer::write_phys(io.clone(), Slot::new(2), &pl).wait().unwrap();

        let got = read_label_config(io).wait().unwrap().unwrap();
        assert_eq!(got, pl);
    }

    #[test]
    fn earlier_slot_wins_when_multiple_are_written() {
        let mem = blank_leaf();
        let io: Arc<dyn LeafIo> = Arc::new(mem.clone());
        let mut pl0 = PropertyList::new();
        pl0.insert("pool_guid", PlValue::Guid(1));
        let mut pl3 = PropertyList::new();
        pl3.insert("pool_guid", PlValue::Guid(2));
        writer::write_phys(io.clone(), Slot::new(0), &pl0).wait().unwrap();
        writer::write_phys(io.clone(), Slot::new(3), &pl3).wait().unwrap();

        let got = read_label_config(io).wait().unwrap().unwrap();
        assert_eq!(got, pl0);
    }

    #[test]
    fn dead_leaf_reads_as_no_config() {
        let mem = blank_leaf();
        mem.set_live(false);
        let io: Arc<dyn LeafIo> = Arc::new(mem);
        let got = read_label_config(io).wait().unwrap();
        assert!(got.is_none());
    }
}
