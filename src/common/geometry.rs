// vim: tw=80

//! C1: Label Geometry — map (device size, label index, intra-label offset)
//! to an absolute physical byte offset.

use crate::common::*;

/// One of the four label slots on a leaf device.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Slot(u8);

impl Slot {
    /// All four slots, in ascending order.
    pub const ALL: [Slot; VDEV_LABELS] = [Slot(0), Slot(1), Slot(2), Slot(3)];

    /// The even slots {0, 2}, written in Phase B of the config sync.
    pub const EVEN: [Slot; 2] = [Slot(0), Slot(2)];

    /// The odd slots {1, 3}, written in Phase E of the config sync.
    pub const ODD: [Slot; 2] = [Slot(1), Slot(3)];

    /// Construct a `Slot` from its index.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= VDEV_LABELS`.  An out-of-range slot index is a
    /// programming error, not a runtime condition a caller can recover from.
    pub fn new(idx: usize) -> Self {
        assert!(idx < VDEV_LABELS, "slot index {} out of range", idx);
        Slot(idx as u8)
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }

    /// True for slots 0 and 2, written before the uberblock in a commit.
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

/// Compute the absolute byte offset of `offset_within_label` inside `slot`,
/// on a device of `device_size` bytes.
///
/// # Panics
///
/// Panics if `device_size` is not a positive multiple of `VDEV_LABEL_SIZE`,
/// or if `offset_within_label >= VDEV_LABEL_SIZE`.  Both are programming
/// errors (I2): geometry is computed from values this subsystem itself
/// derived, never from untrusted input.
pub fn offset(device_size: ByteT, slot: Slot, offset_within_label: ByteT) -> ByteT {
    assert!(device_size > 0 && device_size % VDEV_LABEL_SIZE == 0,
        "device_size {} is not a positive multiple of the label size",
        device_size);
    assert!(offset_within_label < VDEV_LABEL_SIZE,
        "offset_within_label {} exceeds the label size", offset_within_label);

    let base = if slot.idx() < VDEV_LABELS / 2 {
        slot.idx() as ByteT * VDEV_LABEL_SIZE
    } else {
        device_size - (VDEV_LABELS as ByteT - slot.idx() as ByteT) * VDEV_LABEL_SIZE
    };
    base + offset_within_label
}

/// Byte offset, within a label, of the property-list (vdev_phys) region.
pub const PHYS_OFFSET: ByteT = VDEV_PAD_SIZE;

/// Byte offset, within a label, of the boot header.
pub const BOOT_HEADER_OFFSET: ByteT = VDEV_PAD_SIZE + VDEV_PHYS_SIZE;

/// Byte offset, within a label, of the start of the uberblock ring.
pub const UBERBLOCK_RING_OFFSET: ByteT =
    VDEV_PAD_SIZE + VDEV_PHYS_SIZE + VDEV_BOOT_HEADER_SIZE;

/// Byte offset, within a label, of ring cell `n`.
///
/// # Panics
///
/// Panics if `n >= VDEV_UBERBLOCK_RING_COUNT`.
pub fn uberblock_cell_offset(n: u64) -> ByteT {
    assert!(n < VDEV_UBERBLOCK_RING_COUNT, "ring cell {} out of range", n);
    UBERBLOCK_RING_OFFSET + n * VDEV_UBERBLOCK_SIZE
}
