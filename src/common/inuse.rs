// vim: tw=80

//! C4: In-Use Probe — decide whether a candidate leaf already belongs to
//! some pool or spare set (§4.4).

use crate::common::leaf_io::LeafIo;
use crate::common::proplist::PropertyList;
use crate::common::reader;
use crate::common::spare::SpareSet;
use crate::common::{GuidT, LabelReason, PoolState, TxgT};
use futures::Future;
use std::sync::Arc;

/// A known live pool's membership, as seen by the caller of `in_use` (§4.4
/// step 3).  The real pool registry lives above this subsystem; this is the
/// minimal query surface C4 needs from it.
pub trait KnownPools: Send + Sync {
    /// True iff some live pool is known with this `(pool_guid, vdev_guid)`
    /// pair as a member leaf.
    fn has_member(&self, pool_guid: GuidT, vdev_guid: GuidT) -> bool;
}

/// The outcome of probing a candidate leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InUseResult {
    pub inuse: bool,
    pub observed_spare_guid: GuidT,
}

impl InUseResult {
    fn no() -> Self {
        InUseResult { inuse: false, observed_spare_guid: 0 }
    }
}

fn mandatory_fields(pl: &PropertyList)
    -> Option<(PoolState, GuidT, Option<GuidT>, Option<TxgT>, Option<TxgT>)>
{
    let state = match pl.get_str("pool_state")? {
        "ACTIVE" => PoolState::Active,
        "EXPORTED" => PoolState::Exported,
        "DESTROYED" => PoolState::Destroyed,
        "SPARE" => PoolState::Spare,
        "L2CACHE" => PoolState::L2Cache,
        "UNINITIALIZED" => PoolState::Uninitialized,
        _ => return None,
    };
    let vdev_guid = pl.get_u64("vdev_guid")?;
    if state == PoolState::Spare {
        return Some((state, vdev_guid, None, None, None));
    }
    let pool_guid = pl.get_u64("pool_guid")?;
    let txg = pl.get_u64("txg")?;
    let create_txg = pl.get_u64("create_txg")?;
    Some((state, vdev_guid, Some(pool_guid), Some(TxgT::from(txg)),
        Some(TxgT::from(create_txg))))
}

/// Probe `io` for prior pool or spare membership (§4.4).
///
/// `pools` answers "does some live pool already claim this leaf"; `spares`
/// is the process-wide global spare set (§9).
pub fn in_use<'a>(io: Arc<dyn LeafIo>, proposed_create_txg: TxgT,
    reason: LabelReason, pools: &'a dyn KnownPools, spares: &'a SpareSet)
    -> Box<dyn Future<Item = InUseResult, Error = ()> + Send + 'a>
{
    Box::new(reader::read_label_config(io).map(move |maybe_pl| {
        let pl = match maybe_pl {
            None => return InUseResult::no(),
            Some(pl) => pl,
        };
        let (state, vdev_guid, pool_guid, txg, create_txg) =
            match mandatory_fields(&pl) {
                None => return InUseResult::no(),
                Some(f) => f,
            };

        if state != PoolState::Spare {
            let pool_guid = pool_guid.unwrap();
            let known_live_member = pools.has_member(pool_guid, vdev_guid);
            let known_spare = spares.contains(vdev_guid);
            if !known_live_member && !known_spare {
                return InUseResult::no();
            }

            let txg = txg.unwrap();
            let create_txg = create_txg.unwrap();
            if txg.as_u64() == 0 && create_txg == proposed_create_txg {
                return InUseResult { inuse: true, observed_spare_guid: 0 };
            }
        }

        if spares.contains(vdev_guid) {
            let observed_spare_guid = vdev_guid;
            // Our spare set is a single process-wide table rather than
            // per-pool, so "is this guid already a declared spare of the
            // caller's own pool" (the original's `spa_has_spare`) and "is it
            // actively in use as a spare somewhere" (`spare_pool != 0`)
            // collapse onto the same `held_by` flag here.
            let held_by = spares.held_by(vdev_guid).unwrap_or(0);
            let inuse = match reason {
                LabelReason::Create => true,
                LabelReason::Replace => held_by != 0,
                LabelReason::Spare => held_by != 0,
                LabelReason::Remove => {
                    return InUseResult {
                        inuse: state == PoolState::Active,
                        observed_spare_guid,
                    };
                }
            };
            return InUseResult { inuse, observed_spare_guid };
        }

        InUseResult { inuse: state == PoolState::Active, observed_spare_guid: 0 }
    }))
}
