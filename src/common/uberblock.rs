// vim: tw=80

//! The uberblock: the atomic commit record naming the root of the
//! copy-on-write tree for one transaction group (§3, §6).

use crate::common::{ByteT, Error, TxgT, VDEV_UBERBLOCK_SIZE};
use std::cmp::Ordering;

/// Magic number identifying a valid uberblock.
pub const UBERBLOCK_MAGIC: u64 = 0x00ba_b10c_7c54_3ff8;

/// A stand-in for the real root block pointer, whose codec belongs to the
/// data-management layer this subsystem sits underneath (§1).  It carries
/// just enough fields to be meaningfully compared and checksummed.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootPtr {
    pub pba: u64,
    pub lsize: u32,
    pub csize: u32,
    pub checksum: u64,
}

/// The pool's atomic commit record for one transaction group.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Uberblock {
    magic: u64,
    version: u64,
    txg: TxgT,
    /// XOR of every leaf's guid, used by open-path validation (not by this
    /// subsystem, which only carries it through).
    guid_sum: u64,
    /// Wall-clock seconds at commit; the tiebreak in the total order (I4).
    timestamp: u64,
    rootbp: RootPtr,
    /// The uberblock's own internal integrity check, independent of
    /// whatever region checksum the block-I/O engine applies around it.
    checksum: u64,
}

impl Uberblock {
    pub fn new(version: u64, txg: TxgT, guid_sum: u64, timestamp: u64,
               rootbp: RootPtr) -> Self
    {
        let mut ub = Uberblock {
            magic: UBERBLOCK_MAGIC,
            version,
            txg,
            guid_sum,
            timestamp,
            rootbp,
            checksum: 0,
        };
        ub.checksum = ub.compute_checksum();
        ub
    }

    pub fn txg(&self) -> TxgT {
        self.txg
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn rootbp(&self) -> RootPtr {
        self.rootbp
    }

    pub fn guid_sum(&self) -> u64 {
        self.guid_sum
    }

    /// Derive a copy of this uberblock for a new transaction group, as C5
    /// does when labeling a fresh leaf with `txg := 0`.
    pub fn with_txg(&self, txg: TxgT) -> Self {
        Uberblock::new(self.version, txg, self.guid_sum, self.timestamp,
            self.rootbp)
    }

    /// A two-word running checksum over every field but the checksum
    /// itself.  Not cryptographic; it only needs to catch torn writes, the
    /// same job ZFS's fletcher checksum does for the real uberblock.
    fn compute_checksum(&self) -> u64 {
        let words = [
            self.magic,
            self.version,
            self.txg.as_u64(),
            self.guid_sum,
            self.timestamp,
            self.rootbp.pba,
            u64::from(self.rootbp.lsize),
            u64::from(self.rootbp.csize),
            self.rootbp.checksum,
        ];
        let mut a: u64 = 0;
        let mut b: u64 = 0;
        for w in &words {
            a = a.wrapping_add(*w);
            b = b.wrapping_add(a);
        }
        a ^ b.rotate_left(32)
    }

    /// True iff the magic matches and the internal checksum verifies (§3).
    pub fn is_valid(&self) -> bool {
        self.magic == UBERBLOCK_MAGIC && self.checksum == self.compute_checksum()
    }

    /// Encode to a fixed-size, zero-padded buffer suitable for one ring
    /// cell.
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if the encoded form doesn't fit in a cell; this
    /// would indicate a format-constant mismatch, not a runtime condition.
    pub fn encode(&self) -> Result<[u8; VDEV_UBERBLOCK_SIZE as usize], Error> {
        let mut buf = [0u8; VDEV_UBERBLOCK_SIZE as usize];
        let packed = bincode::serialize(self).map_err(|_| Error::EINVAL)?;
        if packed.len() as ByteT > VDEV_UBERBLOCK_SIZE {
            return Err(Error::EINVAL);
        }
        buf[..packed.len()].copy_from_slice(&packed);
        Ok(buf)
    }

    /// Decode a ring cell previously produced by `encode`.  Does not itself
    /// check validity; callers should call `is_valid` before trusting the
    /// result (a zeroed or garbage cell decodes to *something*, just not a
    /// valid uberblock).
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(buf).map_err(|_| Error::EINVAL)
    }
}

impl PartialEq for Uberblock {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}
impl Eq for Uberblock {}

impl Uberblock {
    fn cmp_key(&self) -> (TxgT, u64) {
        (self.txg, self.timestamp)
    }
}

/// Total order over uberblocks: `(txg, timestamp)` ascending (I4).
///
/// Among uberblocks with equal `txg`, the later timestamp wins: a mirrored
/// leaf can miss the first write of txg *t*+1 due to a transient outage,
/// then receive a re-synced copy of the same txg later; the wall-clock
/// stamp picks out the newer one (§4.6 rationale).
impl Ord for Uberblock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl PartialOrd for Uberblock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
