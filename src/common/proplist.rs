// vim: tw=80

//! A minimal stand-in for the self-describing property-list codec this
//! subsystem sits on top of (§1: out of scope, interfaced only).
//!
//! The real codec is a collaborator's general-purpose name→typed-value
//! library; this module implements just enough of its contract — canonical
//! binary encoding, a handful of typed variants, and a recursive `Tree`
//! variant for `vdev_tree` — to carry the fields §3 requires.

use crate::common::{Error, GuidT};
use std::collections::BTreeMap;

/// A typed value in a property list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum PlValue {
    U64(u64),
    Bool(bool),
    Str(String),
    Guid(GuidT),
    /// A nested property list, used for the recursive `vdev_tree` field and
    /// for per-child vdev configuration.
    Tree(PropertyList),
    /// An array of nested property lists, used for a vdev's children.
    TreeArray(Vec<PropertyList>),
}

/// A name→typed-value map with canonical binary encoding (§3).
///
/// Encoding is canonical because `BTreeMap` iterates in sorted key order and
/// `serde_cbor` does not reorder it, so two property lists with the same
/// contents always encode to the same bytes (P2).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PropertyList(BTreeMap<String, PlValue>);

impl PropertyList {
    pub fn new() -> Self {
        PropertyList(BTreeMap::new())
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: PlValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PlValue> {
        self.0.get(name)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.0.get(name) {
            Some(PlValue::U64(v)) => Some(*v),
            Some(PlValue::Guid(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(PlValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(PlValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_tree(&self, name: &str) -> Option<&PropertyList> {
        match self.0.get(name) {
            Some(PlValue::Tree(v)) => Some(v),
            _ => None,
        }
    }

    /// Canonically encode this property list.
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` on any encoding failure (§7: *encoding-invalid*).
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_cbor::to_vec(self).map_err(|_| Error::EINVAL)
    }

    /// Decode a property list previously produced by `encode`.
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if `buf` is not a valid encoding.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        serde_cbor::from_slice(buf).map_err(|_| Error::EINVAL)
    }
}
