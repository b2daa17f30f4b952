//! Per-participant unit targets
//!
//! The plan decides how many units each participant receives, never which
//! ones. The sum of all targets always equals the pool size.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use rand::Rng;
use serde::Serialize;

use super::history::HistoricalTotals;
use super::AllocationError;
use crate::core::identity::ParticipantId;
use crate::core::policy::{Policy, PolicyKind};

/// Target unit count per participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Share rounds given before the leftover policy ran
    pub share_rounds: u64,
    pub targets: BTreeMap<ParticipantId, u64>,
}

impl Plan {
    /// Target of one participant (zero when absent)
    pub fn target(&self, participant: ParticipantId) -> u64 {
        self.targets.get(&participant).copied().unwrap_or(0)
    }

    /// Sum of all targets
    pub fn total(&self) -> u64 {
        self.targets.values().sum()
    }

    /// Largest single target, i.e. the number of assigner passes
    pub fn max_target(&self) -> u64 {
        self.targets.values().copied().max().unwrap_or(0)
    }

    fn give(&mut self, participant: ParticipantId, units: u64) {
        *self.targets.entry(participant).or_insert(0) += units;
    }
}

/// Running totals ordered by `(total, participant id)`
///
/// The first entry is always the participant that receives the next unit
/// under the least-loaded rule.
#[derive(Debug, Clone, Default)]
pub struct FairnessIndex {
    order: BTreeSet<(u64, ParticipantId)>,
    totals: HashMap<ParticipantId, u64>,
}

impl FairnessIndex {
    pub fn new(baseline: impl IntoIterator<Item = (ParticipantId, u64)>) -> Self {
        let mut index = Self::default();
        for (participant, total) in baseline {
            if let Some(old) = index.totals.insert(participant, total) {
                index.order.remove(&(old, participant));
            }
            index.order.insert((total, participant));
        }
        index
    }

    /// Give one unit to the least-loaded participant and return it
    pub fn give_to_least(&mut self) -> Option<ParticipantId> {
        let (total, participant) = self.order.pop_first()?;
        self.order.insert((total + 1, participant));
        self.totals.insert(participant, total + 1);
        Some(participant)
    }

    pub fn total(&self, participant: ParticipantId) -> u64 {
        self.totals.get(&participant).copied().unwrap_or(0)
    }
}

/// Compute the plan for `pool_size` units
///
/// `participants` must be free of duplicates. The random source is only
/// consulted by the random policies.
pub fn build_plan<R: Rng>(
    participants: &[ParticipantId],
    history: &HistoricalTotals,
    pool_size: u64,
    policy: &Policy,
    rng: &mut R,
) -> Result<Plan, AllocationError> {
    let mut plan = Plan::default();
    if participants.is_empty() {
        if pool_size > 0 {
            return Err(AllocationError::NoParticipants { pool_size });
        }
        return Ok(plan);
    }
    for participant in participants {
        plan.targets.insert(*participant, 0);
    }

    let rounds = policy.share_rounds(pool_size as usize, participants.len()) as u64;
    if rounds > 0 {
        for participant in participants {
            plan.give(*participant, rounds);
        }
        plan.share_rounds = rounds;
    }
    let leftover = pool_size - rounds * participants.len() as u64;

    match policy.kind {
        PolicyKind::Random | PolicyKind::ShareRandom => {
            for _ in 0..leftover {
                let pick = participants[rng.random_range(0..participants.len())];
                plan.give(pick, 1);
            }
        }
        PolicyKind::Less | PolicyKind::ShareLess => {
            let mut index = FairnessIndex::new(
                participants
                    .iter()
                    .map(|p| (*p, history.total(*p) + plan.target(*p))),
            );
            for _ in 0..leftover {
                if let Some(pick) = index.give_to_least() {
                    plan.give(pick, 1);
                }
            }
        }
    }

    debug!(
        "event=plan_built module=engine policy={} pool_size={} share_rounds={} participants={}",
        policy.kind,
        pool_size,
        plan.share_rounds,
        participants.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::PartKindId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids(raw: &[i64]) -> Vec<ParticipantId> {
        raw.iter().map(|n| ParticipantId(*n)).collect()
    }

    fn policy(kind: PolicyKind, count: i64) -> Policy {
        Policy::new(kind, count).unwrap()
    }

    #[test]
    fn test_fairness_index_ties_by_ascending_id() {
        let mut index = FairnessIndex::new(vec![
            (ParticipantId(3), 0),
            (ParticipantId(1), 0),
            (ParticipantId(2), 1),
        ]);
        assert_eq!(index.give_to_least(), Some(ParticipantId(1)));
        assert_eq!(index.give_to_least(), Some(ParticipantId(3)));
        assert_eq!(index.give_to_least(), Some(ParticipantId(1)));
        assert_eq!(index.total(ParticipantId(1)), 2);
        assert_eq!(FairnessIndex::default().give_to_least(), None);
    }

    #[test]
    fn test_less_spreads_evenly_without_history() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(
            &ids(&[1, 2, 3]),
            &HistoricalTotals::default(),
            6,
            &policy(PolicyKind::Less, 0),
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.targets.values().copied().collect::<Vec<_>>(), vec![2, 2, 2]);
        assert_eq!(plan.share_rounds, 0);
    }

    #[test]
    fn test_share_less_leftover_goes_to_lowest_id() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(
            &ids(&[1, 2, 3]),
            &HistoricalTotals::default(),
            7,
            &policy(PolicyKind::ShareLess, 0),
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.share_rounds, 2);
        assert_eq!(plan.target(ParticipantId(1)), 3);
        assert_eq!(plan.target(ParticipantId(2)), 2);
        assert_eq!(plan.target(ParticipantId(3)), 2);
    }

    #[test]
    fn test_less_favours_newcomers() {
        let mut history = HistoricalTotals::default();
        history.record(ParticipantId(1), PartKindId(1), 5);
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(
            &ids(&[1, 2, 3]),
            &history,
            3,
            &policy(PolicyKind::Less, 0),
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.target(ParticipantId(1)), 0);
        assert_eq!(plan.target(ParticipantId(2)) + plan.target(ParticipantId(3)), 3);
    }

    #[test]
    fn test_less_is_deterministic() {
        let mut history = HistoricalTotals::default();
        history.record(ParticipantId(2), PartKindId(1), 3);
        history.record(ParticipantId(4), PartKindId(1), 1);
        let participants = ids(&[4, 2, 9, 5]);

        let first = build_plan(
            &participants,
            &history,
            17,
            &policy(PolicyKind::Less, 0),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        let second = build_plan(
            &participants,
            &history,
            17,
            &policy(PolicyKind::Less, 0),
            &mut StdRng::seed_from_u64(99),
        )
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total(), 17);
    }

    #[test]
    fn test_share_divisible_pool_is_exact() {
        for kind in [PolicyKind::ShareLess, PolicyKind::ShareRandom] {
            let mut history = HistoricalTotals::default();
            history.record(ParticipantId(1), PartKindId(1), 40);
            let plan = build_plan(
                &ids(&[1, 2, 3, 4]),
                &history,
                12,
                &policy(kind, 0),
                &mut StdRng::seed_from_u64(7),
            )
            .unwrap();
            assert!(plan.targets.values().all(|t| *t == 3), "{kind}: {plan:?}");
        }
    }

    #[test]
    fn test_share_round_count_is_capped() {
        let plan = build_plan(
            &ids(&[1, 2]),
            &HistoricalTotals::default(),
            10,
            &policy(PolicyKind::ShareLess, 2),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        assert_eq!(plan.share_rounds, 2);
        assert_eq!(plan.total(), 10);
        assert_eq!(plan.target(ParticipantId(1)), 5);
    }

    #[test]
    fn test_share_less_baseline_includes_history() {
        let mut history = HistoricalTotals::default();
        history.record(ParticipantId(1), PartKindId(1), 10);
        let plan = build_plan(
            &ids(&[1, 2]),
            &history,
            5,
            &policy(PolicyKind::ShareLess, 1),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        assert_eq!(plan.target(ParticipantId(1)), 1);
        assert_eq!(plan.target(ParticipantId(2)), 4);
    }

    #[test]
    fn test_random_sums_to_pool_and_reaches_everyone() {
        let participants = ids(&[1, 2, 3, 4, 5]);
        let mut rng = StdRng::seed_from_u64(2024);
        let mut seen = HashMap::new();
        for _ in 0..200 {
            let plan = build_plan(
                &participants,
                &HistoricalTotals::default(),
                10,
                &policy(PolicyKind::Random, 0),
                &mut rng,
            )
            .unwrap();
            assert_eq!(plan.total(), 10);
            for (participant, target) in &plan.targets {
                *seen.entry(*participant).or_insert(0u64) += target;
            }
        }
        for participant in &participants {
            assert!(seen.get(participant).copied().unwrap_or(0) > 0);
        }
    }

    #[test]
    fn test_random_is_reproducible_with_seed() {
        let participants = ids(&[1, 2, 3]);
        let run = |seed| {
            build_plan(
                &participants,
                &HistoricalTotals::default(),
                25,
                &policy(PolicyKind::Random, 0),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_empty_participants() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(
            &[],
            &HistoricalTotals::default(),
            0,
            &policy(PolicyKind::Less, 0),
            &mut rng,
        )
        .unwrap();
        assert!(plan.targets.is_empty());

        let err = build_plan(
            &[],
            &HistoricalTotals::default(),
            4,
            &policy(PolicyKind::Less, 0),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::NoParticipants { pool_size: 4 }));
    }
}
