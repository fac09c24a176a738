//! On-disk label and uberblock subsystem for a copy-on-write storage pool.
//!
//! This crate owns the part of the pool that stamps every leaf device with
//! self-describing metadata, finds the freshest committed pool state after a
//! crash, and advances that state atomically across a fleet of devices each
//! transaction group.  It does not decide what data a transaction group
//! contains, manage free space, or provide any CLI surface; those are the
//! job of collaborating layers that sit above it.

#[macro_use]
extern crate serde_derive;

pub mod common;

#[macro_export]
macro_rules! boxfut {
    ( $v:expr ) => {
        Box::new($v) as Box<dyn Future<Item = _, Error = _> + Send>
    };
    ( $v:expr, $i:ty, $e:ty ) => {
        Box::new($v) as Box<dyn Future<Item = $i, Error = $e> + Send>
    };
}

pub use crate::common::{Error, GuidT, TxgT};
