//! Round-robin unit assignment
//!
//! Pass `k` visits every participant in caller order and hands out one unit
//! to each participant whose target is not yet met. Interleaving keeps one
//! participant from draining a scarce part kind before the others get a turn.

use std::collections::HashMap;

use log::debug;

use super::plan::Plan;
use super::pool::{PoolQueues, Unit};
use super::preference::PreferenceModel;
use super::{Pick, PickSink};
use crate::core::identity::{DistributionId, ParticipantId};
use crate::ledger::LedgerError;

/// Hand out the pool according to `plan`, recording every pick in `sink`
///
/// Picks are recorded one at a time in pass-then-participant order and are
/// also returned in that order.
pub fn assign<K: PickSink + ?Sized>(
    distribution_id: DistributionId,
    order: &[ParticipantId],
    plan: &Plan,
    pool: Vec<Unit>,
    preferences: &mut PreferenceModel,
    sink: &mut K,
) -> Result<Vec<Pick>, LedgerError> {
    let mut remaining: HashMap<ParticipantId, u64> =
        order.iter().map(|p| (*p, plan.target(*p))).collect();
    let mut picks = Vec::with_capacity(pool.len());
    let mut pool = PoolQueues::new(pool);

    for pass in 0..plan.max_target() {
        for participant in order {
            if pool.is_empty() {
                break;
            }
            let left = remaining.entry(*participant).or_insert(0);
            if *left == 0 {
                continue;
            }
            let Some(unit) = preferences
                .least_owned_part(*participant, &pool)
                .and_then(|part| pool.take(part))
            else {
                break;
            };

            preferences.record(*participant, unit.part_kind_id);
            *left -= 1;

            let pick = Pick {
                participant_id: *participant,
                part_kind_id: unit.part_kind_id,
                type_id: unit.type_id,
            };
            sink.record_pick(distribution_id, &pick)?;
            debug!(
                "event=pick module=engine distribution_id={} pass={} participant_id={} part_kind_id={} type_id={}",
                distribution_id, pass, pick.participant_id, pick.part_kind_id, pick.type_id
            );
            picks.push(pick);
        }
    }

    Ok(picks)
}
