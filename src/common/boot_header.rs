// vim: tw=80

//! The boot header: a tiny fixed-layout record identifying the on-disk
//! format version and locating the uberblock ring (§6).

use crate::common::{ByteT, Error, VDEV_BOOT_MAGIC, VDEV_BOOT_VERSION,
    VDEV_BOOT_HEADER_SIZE};
use crate::common::geometry::UBERBLOCK_RING_OFFSET;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BootHeader {
    magic: u64,
    version: u64,
    offset: ByteT,
    size: ByteT,
}

impl BootHeader {
    /// Build the boot header every label on a freshly initialized leaf
    /// carries (§4.5 step 6).
    pub fn new(ring_size: ByteT) -> Self {
        BootHeader {
            magic: VDEV_BOOT_MAGIC,
            version: VDEV_BOOT_VERSION,
            offset: UBERBLOCK_RING_OFFSET,
            size: ring_size,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == VDEV_BOOT_MAGIC
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn encode(&self) -> Result<[u8; VDEV_BOOT_HEADER_SIZE as usize], Error> {
        let mut buf = [0u8; VDEV_BOOT_HEADER_SIZE as usize];
        let packed = bincode::serialize(self).map_err(|_| Error::EINVAL)?;
        if packed.len() as ByteT > VDEV_BOOT_HEADER_SIZE {
            return Err(Error::EINVAL);
        }
        buf[..packed.len()].copy_from_slice(&packed);
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(buf).map_err(|_| Error::EINVAL)
    }
}
