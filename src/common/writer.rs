// vim: tw=80

//! C3: Label Writer — encode and write the phys/boot-header/uberblock-ring
//! regions of one label slot.

use crate::common::boot_header::BootHeader;
use crate::common::framing;
use crate::common::geometry::{self, Slot};
use crate::common::leaf_io::LeafIo;
use crate::common::proplist::PropertyList;
use crate::common::uberblock::Uberblock;
use crate::common::{ByteT, Error, VDEV_BOOT_HEADER_SIZE, VDEV_PHYS_SIZE};
use divbuf::DivBufShared;
use futures::future;
use futures::Future;
use std::sync::Arc;

type BoxFut<T> = Box<dyn Future<Item = T, Error = Error> + Send>;

/// Report of how many of a slot's regions a `write_label` call actually
/// landed.  Per-region failures are "counted but do not abort sibling
/// writes" (§4.3): every region is attempted regardless of the others'
/// outcome, and the caller decides what an incomplete slot means.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegionWriteReport {
    pub attempted: usize,
    pub good: usize,
}

impl RegionWriteReport {
    pub fn all_good(&self) -> bool {
        self.attempted > 0 && self.good == self.attempted
    }

    pub fn any_good(&self) -> bool {
        self.good > 0
    }
}

/// Write just the property-list region of `slot` (used standalone by Phase
/// B/E of the config sync, and by this module's own tests).
pub fn write_phys(io: Arc<dyn LeafIo>, slot: Slot, phys: &PropertyList)
    -> BoxFut<()>
{
    let encoded = match phys.encode() {
        Ok(e) => e,
        Err(e) => return Box::new(future::err(e)),
    };
    let framed = match framing::frame(&encoded, VDEV_PHYS_SIZE) {
        Ok(f) => f,
        Err(e) => return Box::new(future::err(e)),
    };
    let device_size = io.size();
    let off = geometry::offset(device_size, slot, geometry::PHYS_OFFSET);
    let dbs = DivBufShared::from(framed);
    Box::new(io.write_at(off, dbs))
}

/// Write just the boot header of `slot`.
pub fn write_boot_header(io: Arc<dyn LeafIo>, slot: Slot, hdr: &BootHeader)
    -> BoxFut<()>
{
    let encoded = match hdr.encode() {
        Ok(e) => e,
        Err(e) => return Box::new(future::err(e)),
    };
    debug_assert_eq!(encoded.len() as ByteT, VDEV_BOOT_HEADER_SIZE);
    let device_size = io.size();
    let off = geometry::offset(device_size, slot, geometry::BOOT_HEADER_OFFSET);
    let dbs = DivBufShared::from(encoded.to_vec());
    Box::new(io.write_at(off, dbs))
}

/// Write uberblock `ub` to ring cell `n` of `slot`.  Used standalone by C7
/// (one cell, every slot) as well as by this module's full-slot `write_label`
/// (every cell, one slot).
pub fn write_uberblock_cell(io: Arc<dyn LeafIo>, slot: Slot, n: u64,
    ub: &Uberblock) -> BoxFut<()>
{
    let encoded = match ub.encode() {
        Ok(e) => e,
        Err(e) => return Box::new(future::err(e)),
    };
    let device_size = io.size();
    let off = geometry::offset(device_size, slot,
        geometry::uberblock_cell_offset(n));
    let dbs = DivBufShared::from(encoded.to_vec());
    Box::new(io.write_at(off, dbs))
}

/// Write phys, boot header, and every ring cell of `uberblocks` to `slot`,
/// in parallel, as C5 does when labeling a leaf for the first time
/// (§4.5 step 7).
///
/// All regions are submitted regardless of each other's outcome; the
/// returned report says how many of the `2 + uberblocks.len()` writes
/// actually succeeded.
pub fn write_label(io: Arc<dyn LeafIo>, slot: Slot, phys: &PropertyList,
    boot_hdr: &BootHeader, uberblocks: &[Uberblock])
    -> BoxFut<RegionWriteReport>
{
    let mut futs: Vec<BoxFut<()>> = Vec::with_capacity(2 + uberblocks.len());
    futs.push(write_phys(io.clone(), slot, phys));
    futs.push(write_boot_header(io.clone(), slot, boot_hdr));
    for (n, ub) in uberblocks.iter().enumerate() {
        futs.push(write_uberblock_cell(io.clone(), slot, n as u64, ub));
    }
    let attempted = futs.len();

    // Turn each fallible write into one that reports success as a `bool`
    // instead of propagating `Err`, so a single region's failure can't
    // short-circuit its siblings (§4.3): `join_all` only stops early on the
    // first `Err`, and none of these ever produce one.
    let counted: Vec<_> = futs.into_iter()
        .map(|f| -> BoxFut<bool> { Box::new(f.then(|r| Ok(r.is_ok()))) })
        .collect();

    Box::new(future::join_all(counted).map(move |results| {
        let good = results.into_iter().filter(|ok| *ok).count();
        RegionWriteReport { attempted, good }
    }))
}

/// Issue a cache-flush barrier on `io`, as every phase boundary of the
/// config sync does (§5 ordering guarantee 2).
pub fn flush(io: Arc<dyn LeafIo>) -> BoxFut<()> {
    if !io.is_live() {
        return Box::new(future::err(Error::EIO));
    }
    Box::new(io.flush())
}

/// Flush `io` if it's live; a dead leaf's flush is simply skipped rather
/// than counted as a phase failure (mirrors the "failures here are
/// non-fatal" posture callers take toward per-leaf barriers).
pub fn flush_best_effort(io: Arc<dyn LeafIo>) -> BoxFut<()> {
    if !io.is_live() {
        return Box::new(future::ok(()));
    }
    Box::new(io.flush().then(|_| Ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::leaf_io::mem::MemLeaf;
    use crate::common::proplist::PlValue;
    use crate::common::uberblock::RootPtr;
    use crate::common::{TxgT, VDEV_LABEL_SIZE, VDEV_UBERBLOCK_RING_COUNT};
    use futures::Future;

    fn leaf() -> Arc<dyn LeafIo> {
        Arc::new(MemLeaf::new(VDEV_LABEL_SIZE * 4))
    }

    fn sample_pl() -> PropertyList {
        let mut pl = PropertyList::new();
        pl.insert("pool_guid", PlValue::Guid(7));
        pl.insert("version", PlValue::U64(1));
        pl
    }

    #[test]
    fn write_phys_then_read_back_round_trips() {
        let io = leaf();
        let pl = sample_pl();
        write_phys(io.clone(), Slot::new(1), &pl).wait().unwrap();

        let device_size = io.size();
        let off = geometry::offset(device_size, Slot::new(1), geometry::PHYS_OFFSET);
        let dbs = DivBufShared::from(vec![0u8; VDEV_PHYS_SIZE as usize]);
        let back = io.read_at(off, dbs).wait().unwrap();
        let dbuf = back.try_const().unwrap();
        let payload = framing::unframe(&dbuf).unwrap();
        assert_eq!(PropertyList::decode(payload).unwrap(), pl);
    }

    #[test]
    fn oversized_phys_is_name_too_long() {
        let io = leaf();
        let mut pl = PropertyList::new();
        pl.insert("path", PlValue::Str("x".repeat(VDEV_PHYS_SIZE as usize)));
        let err = write_phys(io, Slot::new(0), &pl).wait().unwrap_err();
        assert_eq!(err, Error::ENAMETOOLONG);
    }

    #[test]
    fn write_label_writes_every_region() {
        let io = leaf();
        let pl = sample_pl();
        let hdr = BootHeader::new(VDEV_UBERBLOCK_RING_COUNT * crate::common::VDEV_UBERBLOCK_SIZE);
        let ubs: Vec<_> = (0..VDEV_UBERBLOCK_RING_COUNT)
            .map(|_| Uberblock::new(1, TxgT::from(0), 7, 0, RootPtr::default()))
            .collect();
        let report = write_label(io.clone(), Slot::new(0), &pl, &hdr, &ubs)
            .wait().unwrap();
        assert!(report.all_good());
        assert_eq!(report.attempted, 2 + ubs.len());
    }

    #[test]
    fn write_to_dead_leaf_fails_every_region() {
        let mem = MemLeaf::new(VDEV_LABEL_SIZE * 4);
        mem.set_live(false);
        let io: Arc<dyn LeafIo> = Arc::new(mem);
        let pl = sample_pl();
        let hdr = BootHeader::new(VDEV_UBERBLOCK_RING_COUNT * crate::common::VDEV_UBERBLOCK_SIZE);
        let ubs = vec![Uberblock::new(1, TxgT::from(0), 7, 0, RootPtr::default())];
        let report = write_label(io, Slot::new(0), &pl, &hdr, &ubs).wait().unwrap();
        assert!(!report.any_good());
    }
}
