// vim: tw=80

//! Shared types and format constants for the label/uberblock subsystem.

use std::fmt;
use std::ops::{Add, Rem};

pub mod boot_header;
pub mod config_sync;
pub mod framing;
pub mod geometry;
pub mod init;
pub mod inuse;
pub mod leaf_io;
pub mod loader;
pub mod proplist;
pub mod reader;
pub mod spare;
pub mod syncer;
pub mod uberblock;
pub mod vdev_tree;
pub mod writer;

/// This subsystem's error type.
///
/// Rather than invent a bespoke enum, errors are represented as the same
/// POSIX errno values the on-disk format's reference implementation uses:
/// `EBUSY` for a device already in use, `ENAMETOOLONG` for an oversized
/// property list, `EIO` for an unrecoverable I/O failure, `ENODEV` for "no
/// good writes and no error", `ESTALE` for "no valid uberblock anywhere".
pub type Error = nix::errno::Errno;

/// A globally unique identifier for a pool or a vdev.  Zero is reserved to
/// mean "no guid" / "not yet assigned".
pub type GuidT = u64;

/// A byte offset or byte length.  Device sizes, label geometry, and region
/// sizes in this subsystem are all expressed in raw bytes rather than
/// logical block addresses, because the on-disk layout in §6 is defined in
/// bytes.
pub type ByteT = u64;

/// Transaction group number: a monotonically increasing integer identifying
/// one atomic commit of the pool.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq,
         PartialOrd, Serialize)]
pub struct TxgT(u64);

impl TxgT {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TxgT {
    fn from(t: u64) -> Self {
        TxgT(t)
    }
}

impl fmt::Display for TxgT {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add<u64> for TxgT {
    type Output = TxgT;

    fn add(self, rhs: u64) -> TxgT {
        TxgT(self.0 + rhs)
    }
}

impl Rem<u64> for TxgT {
    type Output = u64;

    /// Compute the ring-cell index for this txg: `txg mod N` (I3).
    fn rem(self, n: u64) -> u64 {
        self.0 % n
    }
}

/// Every leaf device carries exactly this many labels (I2, I3).
pub const VDEV_LABELS: usize = 4;

/// Legacy partition-table padding at the front of every label; ignored.
pub const VDEV_PAD_SIZE: ByteT = 8 * 1024;

/// Size of the property-list (vdev_phys) region of a label.
pub const VDEV_PHYS_SIZE: ByteT = 112 * 1024;

/// Size of the boot header region of a label.
pub const VDEV_BOOT_HEADER_SIZE: ByteT = 8 * 1024;

/// Size of a single uberblock ring cell.
pub const VDEV_UBERBLOCK_SIZE: ByteT = 1024;

/// Total size of one label slot (I2).  The device's usable size must be a
/// positive multiple of this.
pub const VDEV_LABEL_SIZE: ByteT = 256 * 1024;

/// Number of uberblock cells in the ring on each label slot (I3).
pub const VDEV_UBERBLOCK_RING_COUNT: u64 =
    (VDEV_LABEL_SIZE - VDEV_PAD_SIZE - VDEV_PHYS_SIZE - VDEV_BOOT_HEADER_SIZE)
    / VDEV_UBERBLOCK_SIZE;

/// Magic number stamped into every boot header.
pub const VDEV_BOOT_MAGIC: u64 = 0x2f5b_007b_10c_cafe;

/// On-disk format version understood by this subsystem.
pub const VDEV_BOOT_VERSION: u64 = 1;

/// Reason codes accepted by C4 (in-use probe) and C5 (label initializer).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LabelReason {
    Create,
    Replace,
    Spare,
    Remove,
}

/// Pool state, as carried in the label property list.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PoolState {
    Active,
    Exported,
    Destroyed,
    Spare,
    L2Cache,
    Uninitialized,
}
