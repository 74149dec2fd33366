//! Fair drawer rotation.
//!
//! Each room keeps an undrawn set: active members who have not drawn in the
//! current cycle. A drawer is picked uniformly from the undrawn members, removed,
//! and the set is refilled with every active member only after a pick empties it.
//! With stable membership every member therefore draws exactly once per cycle.

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::ids::MemberId;

/// Outcome of a drawer selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerPick {
    pub drawer: MemberId,
    /// Undrawn set to persist for the next round.
    pub undrawn: BTreeSet<MemberId>,
}

/// Choose the next drawer.
///
/// `undrawn` members that are no longer active are ignored. When none of them is
/// active a fresh cycle starts from `active`. `last_drawer` is never picked twice
/// in a row unless they are the only candidate; it can only be a candidate right
/// after a refill, so this does not disturb per-cycle fairness.
///
/// Returns `None` when there are no active members.
pub fn select_drawer<R: Rng + ?Sized>(
    active: &[MemberId],
    undrawn: &BTreeSet<MemberId>,
    last_drawer: Option<MemberId>,
    rng: &mut R,
) -> Option<DrawerPick> {
    let active: BTreeSet<MemberId> = active.iter().copied().collect();
    if active.is_empty() {
        return None;
    }

    let mut pool: BTreeSet<MemberId> = undrawn.intersection(&active).copied().collect();
    if pool.is_empty() {
        pool = active.clone();
    }

    let drawer = {
        let mut candidates: Vec<MemberId> = pool.iter().copied().collect();
        if candidates.len() > 1
            && let Some(last) = last_drawer
        {
            candidates.retain(|id| *id != last);
        }
        candidates.into_iter().choose(rng)?
    };

    pool.remove(&drawer);
    if pool.is_empty() {
        pool = active;
    }

    Some(DrawerPick {
        drawer,
        undrawn: pool,
    })
}
