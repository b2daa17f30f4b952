//! Unit pool expansion
//!
//! A selection of `count` kits of a type becomes `count × multiplier` units
//! for each member part kind. Units are laid out selection by selection, with
//! members in ascending part kind order and each member's units contiguous.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use super::AllocationError;
use crate::core::identity::{KitTypeId, PartKindId};
use crate::ledger::{LedgerError, Selection, TypeMember};

/// One allocatable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Unit {
    pub part_kind_id: PartKindId,
    pub type_id: KitTypeId,
}

/// Largest pool a single run may expand to
///
/// Every unit becomes one recorded pick, so the pool is bounded before any
/// memory is reserved for it.
pub const MAX_POOL_SIZE: u64 = 1_000_000;

/// Expand selections into a flat unit sequence
///
/// `members` resolves a type to its membership rows and returns `None` for
/// an unknown type. A known type without members is rejected even when its
/// requested count is zero. Requests larger than [`MAX_POOL_SIZE`] are
/// rejected before the pool is built.
pub fn build_pool<F>(
    selections: &[Selection],
    mut members: F,
) -> Result<Vec<Unit>, AllocationError>
where
    F: FnMut(KitTypeId) -> Result<Option<Vec<TypeMember>>, LedgerError>,
{
    let mut resolved = Vec::with_capacity(selections.len());
    let mut requested: u64 = 0;
    for selection in selections {
        let mut rows =
            members(selection.type_id)?.ok_or(AllocationError::UnknownType(selection.type_id))?;
        if rows.is_empty() {
            return Err(AllocationError::EmptyType(selection.type_id));
        }
        rows.sort_by_key(|m| m.part_kind_id);
        for member in &rows {
            requested = u64::from(selection.count)
                .checked_mul(u64::from(member.multiplier))
                .and_then(|units| requested.checked_add(units))
                .unwrap_or(u64::MAX);
        }
        if requested > MAX_POOL_SIZE {
            return Err(AllocationError::PoolTooLarge {
                requested,
                limit: MAX_POOL_SIZE,
            });
        }
        resolved.push((selection, rows));
    }

    let mut pool = Vec::with_capacity(requested as usize);
    for (selection, rows) in resolved {
        for member in rows {
            let units = u64::from(selection.count) * u64::from(member.multiplier);
            let unit = Unit {
                part_kind_id: member.part_kind_id,
                type_id: selection.type_id,
            };
            pool.extend(std::iter::repeat(unit).take(units as usize));
        }
    }
    Ok(pool)
}

/// Remaining pool units grouped by part kind
///
/// Each queue keeps its units in pool order together with their original
/// position, so the front of a queue is that part kind's earliest unit.
#[derive(Debug, Clone, Default)]
pub struct PoolQueues {
    queues: BTreeMap<PartKindId, VecDeque<(usize, Unit)>>,
    len: usize,
}

impl PoolQueues {
    pub fn new(pool: Vec<Unit>) -> Self {
        let len = pool.len();
        let mut queues: BTreeMap<PartKindId, VecDeque<(usize, Unit)>> = BTreeMap::new();
        for (position, unit) in pool.into_iter().enumerate() {
            queues
                .entry(unit.part_kind_id)
                .or_default()
                .push_back((position, unit));
        }
        Self { queues, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Earliest remaining pool position of every part kind still available
    pub fn heads(&self) -> impl Iterator<Item = (usize, PartKindId)> + '_ {
        self.queues
            .iter()
            .filter_map(|(part, queue)| queue.front().map(|(position, _)| (*position, *part)))
    }

    /// Remove the earliest remaining unit of `part`
    pub fn take(&mut self, part: PartKindId) -> Option<Unit> {
        let queue = self.queues.get_mut(&part)?;
        let (_, unit) = queue.pop_front()?;
        if queue.is_empty() {
            self.queues.remove(&part);
        }
        self.len -= 1;
        Some(unit)
    }
}
