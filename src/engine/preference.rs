//! Run-scoped ownership counts used to choose which unit a participant gets

use std::collections::{BTreeSet, HashMap};

use super::history::{HistoricalTotals, PartCounts};
use super::pool::{PoolQueues, Unit};
use crate::core::identity::{ParticipantId, PartKindId};

/// Units of each pooled part kind a participant holds, history included
#[derive(Debug, Clone, Default)]
pub struct PreferenceModel {
    owned: HashMap<ParticipantId, PartCounts>,
}

impl PreferenceModel {
    /// Seed the model from history, limited to part kinds present in `pool`
    pub fn seed(history: &HistoricalTotals, participants: &[ParticipantId], pool: &[Unit]) -> Self {
        let pooled: BTreeSet<PartKindId> = pool.iter().map(|u| u.part_kind_id).collect();
        let owned = participants
            .iter()
            .map(|participant| {
                let mut counts = PartCounts::new();
                for part in &pooled {
                    let n = history.part_count(*participant, *part);
                    if n > 0 {
                        counts.add(*part, n);
                    }
                }
                (*participant, counts)
            })
            .collect();
        Self { owned }
    }

    pub fn owned(&self, participant: ParticipantId, part: PartKindId) -> u64 {
        self.owned
            .get(&participant)
            .map(|counts| counts.get(part))
            .unwrap_or(0)
    }

    pub fn record(&mut self, participant: ParticipantId, part: PartKindId) {
        self.owned.entry(participant).or_default().increment(part);
    }

    /// Part kind of the remaining unit the participant owns least
    ///
    /// Ties resolve to the earliest position in the pool. Only the head of
    /// each part kind's queue is inspected.
    pub fn least_owned_part(
        &self,
        participant: ParticipantId,
        pool: &PoolQueues,
    ) -> Option<PartKindId> {
        pool.heads()
            .min_by_key(|(position, part)| (self.owned(participant, *part), *position))
            .map(|(_, part)| part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::KitTypeId;

    fn unit(part: i64) -> Unit {
        Unit {
            part_kind_id: PartKindId(part),
            type_id: KitTypeId(1),
        }
    }

    #[test]
    fn test_seed_is_scoped_to_pool() {
        let mut history = HistoricalTotals::default();
        history.record(ParticipantId(1), PartKindId(10), 4);
        history.record(ParticipantId(1), PartKindId(99), 7);

        let model = PreferenceModel::seed(&history, &[ParticipantId(1)], &[unit(10), unit(11)]);
        assert_eq!(model.owned(ParticipantId(1), PartKindId(10)), 4);
        assert_eq!(model.owned(ParticipantId(1), PartKindId(99)), 0);
        assert_eq!(model.owned(ParticipantId(2), PartKindId(10)), 0);
    }

    #[test]
    fn test_least_owned_prefers_first_on_tie() {
        let mut model = PreferenceModel::default();
        let pool = PoolQueues::new(vec![unit(10), unit(11), unit(10), unit(12)]);
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(10)));

        model.record(ParticipantId(1), PartKindId(10));
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(11)));

        model.record(ParticipantId(1), PartKindId(11));
        model.record(ParticipantId(1), PartKindId(12));
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(10)));
    }

    #[test]
    fn test_least_owned_follows_earliest_remaining_unit() {
        let mut pool = PoolQueues::new(vec![unit(12), unit(10), unit(12), unit(10)]);
        let model = PreferenceModel::default();
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(12)));

        pool.take(PartKindId(12));
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(10)));
        pool.take(PartKindId(10));
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), Some(PartKindId(12)));
    }

    #[test]
    fn test_least_owned_empty_pool() {
        let model = PreferenceModel::default();
        let pool = PoolQueues::new(Vec::new());
        assert_eq!(model.least_owned_part(ParticipantId(1), &pool), None);
    }
}
