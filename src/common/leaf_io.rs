// vim: tw=80

//! `LeafIo`: the interface this subsystem requires from the block-I/O
//! engine (§1: out of scope, interfaced only).
//!
//! The real engine issues ordered physical reads/writes with checksums,
//! cache-flush barriers, and error reporting against a real device.  This
//! trait is the boundary: everything above it (C2-C8) is written against
//! `LeafIo` and a test double, never against a file descriptor directly.

use crate::common::{ByteT, Error};
use divbuf::DivBufShared;
use futures::Future;
#[cfg(test)]
use mockall::automock;

pub type BoxIoFut<T> = Box<dyn Future<Item = T, Error = Error> + Send>;

/// A single leaf (physical) device or partition.
#[cfg_attr(test, automock)]
pub trait LeafIo: Send + Sync {
    /// The device's usable size in bytes.  A positive multiple of
    /// `VDEV_LABEL_SIZE` for any leaf this subsystem will label.
    fn size(&self) -> ByteT;

    /// Whether the leaf is currently open, online, and not faulted.  A dead
    /// leaf fails every operation below without being attempted.
    fn is_live(&self) -> bool;

    /// Checksum-validated read of `buf.len()` bytes starting at `offset`.
    /// Returns the filled buffer on success.  Fails with `EIO` on a
    /// checksum mismatch or any lower-level I/O error; the caller (C2, C6)
    /// is responsible for treating per-slot failures as speculative and not
    /// propagating them as device errors.
    fn read_at(&self, offset: ByteT, buf: DivBufShared) -> BoxIoFut<DivBufShared>;

    /// Checksum-protected write of `buf` at `offset`.
    fn write_at(&self, offset: ByteT, buf: DivBufShared) -> BoxIoFut<()>;

    /// Issue a cache-flush barrier: every write previously submitted to
    /// this leaf and already completed is durable on stable media once
    /// this future resolves (§5 ordering guarantee 2).
    fn flush(&self) -> BoxIoFut<()>;
}

#[cfg(test)]
pub mod mem {
    //! An in-memory `LeafIo` used by this crate's own integration tests.
    //! Stands in for a real device the way the teacher's tests stand up a
    //! `tempdir`-backed `VdevFile` instead of a production block device.

    use super::*;
    use futures::future;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    pub struct MemLeaf {
        data: Arc<Mutex<Vec<u8>>>,
        live: Arc<Mutex<bool>>,
    }

    impl MemLeaf {
        pub fn new(size: ByteT) -> Self {
            MemLeaf {
                data: Arc::new(Mutex::new(vec![0u8; size as usize])),
                live: Arc::new(Mutex::new(true)),
            }
        }

        pub fn set_live(&self, live: bool) {
            *self.live.lock().unwrap() = live;
        }
    }

    impl LeafIo for MemLeaf {
        fn size(&self) -> ByteT {
            self.data.lock().unwrap().len() as ByteT
        }

        fn is_live(&self) -> bool {
            *self.live.lock().unwrap()
        }

        fn read_at(&self, offset: ByteT, mut buf: DivBufShared) -> BoxIoFut<DivBufShared> {
            if !self.is_live() {
                return Box::new(future::err(Error::EIO));
            }
            let len = buf.try_mut().unwrap().len();
            let start = offset as usize;
            let data = self.data.lock().unwrap();
            if start + len > data.len() {
                return Box::new(future::err(Error::EIO));
            }
            buf.try_mut().unwrap().copy_from_slice(&data[start..start + len]);
            Box::new(future::ok(buf))
        }

        fn write_at(&self, offset: ByteT, mut buf: DivBufShared) -> BoxIoFut<()> {
            if !self.is_live() {
                return Box::new(future::err(Error::EIO));
            }
            let len = buf.try_mut().unwrap().len();
            let start = offset as usize;
            let mut data = self.data.lock().unwrap();
            if start + len > data.len() {
                return Box::new(future::err(Error::EIO));
            }
            data[start..start + len].copy_from_slice(&buf.try_mut().unwrap());
            Box::new(future::ok(()))
        }

        fn flush(&self) -> BoxIoFut<()> {
            if !self.is_live() {
                return Box::new(future::err(Error::EIO));
            }
            Box::new(future::ok(()))
        }
    }
}
