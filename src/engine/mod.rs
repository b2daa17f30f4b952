//! Fair distribution allocation engine
//!
//! An allocation run turns a distribution's selections into a unit pool,
//! plans how many units each participant receives, then hands out the units
//! one pick at a time:
//!
//! 1. [`pool::build_pool`] expands selections into units
//! 2. [`history::HistoricalTotals`] loads what participants already received
//! 3. [`plan::build_plan`] computes targets under the chosen policy
//! 4. [`preference::PreferenceModel`] tracks per-part ownership
//! 5. [`assigner::assign`] picks units round-robin and records each pick
//!
//! The engine reads the ledger through [`LedgerReader`] and writes through
//! [`PickSink`]. It never opens transactions itself; callers wrap a run in
//! one so that a failed run leaves nothing behind.

pub mod assigner;
pub mod history;
pub mod plan;
pub mod pool;
pub mod preference;

use std::collections::{BTreeSet, HashSet};

use log::{info, warn};
use miette::Diagnostic;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

pub use history::{HistoricalTotals, PartCounts};
pub use plan::{FairnessIndex, Plan};
pub use pool::{PoolQueues, Unit, MAX_POOL_SIZE};
pub use preference::PreferenceModel;

use crate::core::identity::{DistributionId, KitTypeId, ParticipantId, PartKindId};
use crate::core::policy::{Policy, PolicyError};
use crate::ledger::{LedgerError, Selection, TypeMember};

/// Read access the engine needs from the ledger
pub trait LedgerReader {
    /// Members of a type, `None` if the type does not exist
    fn type_members(&self, type_id: KitTypeId) -> Result<Option<Vec<TypeMember>>, LedgerError>;

    /// Assignment rows of a distribution, `None` if it does not exist
    fn assignment_count(&self, distribution_id: DistributionId)
        -> Result<Option<u64>, LedgerError>;

    /// Summed quantities per (participant, part kind) across all distributions
    fn assignment_sums(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<(ParticipantId, PartKindId, u64)>, LedgerError>;

    /// Ids from `participants` that are not known to the ledger
    fn missing_participants(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<ParticipantId>, LedgerError>;
}

/// Destination of individual picks
pub trait PickSink {
    /// Record one unit handed to a participant
    ///
    /// Repeated picks of the same (participant, part kind, type) within a
    /// distribution accumulate on a single row.
    fn record_pick(&mut self, distribution_id: DistributionId, pick: &Pick)
        -> Result<(), LedgerError>;
}

/// Sink that discards picks, for previews
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun;

impl PickSink for DryRun {
    fn record_pick(&mut self, _: DistributionId, _: &Pick) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// One unit given to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pick {
    pub participant_id: ParticipantId,
    pub part_kind_id: PartKindId,
    pub type_id: KitTypeId,
}

/// Errors that reject an allocation run
#[derive(Debug, Error, Diagnostic)]
pub enum AllocationError {
    #[error("cannot allocate {pool_size} unit(s) without participants")]
    #[diagnostic(
        code(kitshare::engine::no_participants),
        help("pass at least one participant with --participants")
    )]
    NoParticipants { pool_size: u64 },

    #[error("participant {0} is listed more than once")]
    #[diagnostic(code(kitshare::engine::duplicate_participant))]
    DuplicateParticipant(ParticipantId),

    #[error("unknown participant(s): {}", join_ids(.0))]
    #[diagnostic(
        code(kitshare::engine::unknown_participant),
        help("run 'kitshare participant list' to see known ids")
    )]
    UnknownParticipants(Vec<ParticipantId>),

    #[error("unknown type {0}")]
    #[diagnostic(
        code(kitshare::engine::unknown_type),
        help("run 'kitshare object list' to see known types")
    )]
    UnknownType(KitTypeId),

    #[error("type {0} has no parts")]
    #[diagnostic(
        code(kitshare::engine::empty_type),
        help("give the type at least one part with a positive quantity")
    )]
    EmptyType(KitTypeId),

    #[error("pool of {requested} unit(s) exceeds the limit of {limit}")]
    #[diagnostic(
        code(kitshare::engine::pool_too_large),
        help("lower the --select counts or split the request across several distributions")
    )]
    PoolTooLarge { requested: u64, limit: u64 },

    #[error("distribution {0} not found")]
    #[diagnostic(code(kitshare::engine::unknown_distribution))]
    UnknownDistribution(DistributionId),

    #[error("distribution {distribution_id} already has {rows} assignment row(s)")]
    #[diagnostic(
        code(kitshare::engine::already_allocated),
        help("cancel the distribution and create a new one")
    )]
    AlreadyAllocated {
        distribution_id: DistributionId,
        rows: u64,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),
}

fn join_ids(ids: &[ParticipantId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inputs of one allocation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub distribution_id: DistributionId,
    /// Participants in visiting order
    pub participants: Vec<ParticipantId>,
    pub selections: Vec<Selection>,
    pub policy: Policy,
}

/// Outcome of a run or a preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    /// `None` for previews
    pub distribution_id: Option<DistributionId>,
    pub policy: Policy,
    pub pool_size: u64,
    pub plan: Plan,
    /// Picks in the order they were made
    pub picks: Vec<Pick>,
    /// Distinct (participant, part kind, type) rows the picks produce
    pub rows: u64,
}

impl AllocationReport {
    fn new(
        distribution_id: Option<DistributionId>,
        policy: Policy,
        pool_size: u64,
        plan: Plan,
        picks: Vec<Pick>,
    ) -> Self {
        let rows = picks.iter().copied().collect::<HashSet<_>>().len() as u64;
        Self {
            distribution_id,
            policy,
            pool_size,
            plan,
            picks,
            rows,
        }
    }
}

/// Validated pool, history and plan for a run
struct Prepared {
    pool: Vec<Unit>,
    history: HistoricalTotals,
    plan: Plan,
}

fn prepare<S, R>(
    reader: &S,
    participants: &[ParticipantId],
    selections: &[Selection],
    policy: &Policy,
    rng: &mut R,
) -> Result<Prepared, AllocationError>
where
    S: LedgerReader + ?Sized,
    R: Rng,
{
    let mut seen = BTreeSet::new();
    for participant in participants {
        if !seen.insert(*participant) {
            return Err(AllocationError::DuplicateParticipant(*participant));
        }
    }
    let missing = reader.missing_participants(participants)?;
    if !missing.is_empty() {
        return Err(AllocationError::UnknownParticipants(missing));
    }

    let pool = pool::build_pool(selections, |type_id| reader.type_members(type_id))?;
    let pool_size = pool.len() as u64;
    if participants.is_empty() && pool_size > 0 {
        return Err(AllocationError::NoParticipants { pool_size });
    }

    let history = HistoricalTotals::load(reader, participants)?;
    let plan = plan::build_plan(participants, &history, pool_size, policy, rng)?;
    Ok(Prepared {
        pool,
        history,
        plan,
    })
}

/// Allocate the units requested for an existing, empty distribution
///
/// Every pick goes to `store` as it is made. On error some picks may already
/// have been recorded; the caller must discard them by rolling back.
pub fn allocate<S, R>(
    store: &mut S,
    request: &AllocationRequest,
    rng: &mut R,
) -> Result<AllocationReport, AllocationError>
where
    S: LedgerReader + PickSink + ?Sized,
    R: Rng,
{
    let distribution_id = request.distribution_id;
    info!(
        "event=allocate_start module=engine distribution_id={} policy={} participants={} selections={}",
        distribution_id,
        request.policy.kind,
        request.participants.len(),
        request.selections.len()
    );

    let result = run(store, request, rng);
    match &result {
        Ok(report) => info!(
            "event=allocate_done module=engine status=ok distribution_id={} pool_size={} rows={}",
            distribution_id, report.pool_size, report.rows
        ),
        Err(err) => warn!(
            "event=allocate_done module=engine status=error distribution_id={} error={}",
            distribution_id, err
        ),
    }
    result
}

fn run<S, R>(
    store: &mut S,
    request: &AllocationRequest,
    rng: &mut R,
) -> Result<AllocationReport, AllocationError>
where
    S: LedgerReader + PickSink + ?Sized,
    R: Rng,
{
    let distribution_id = request.distribution_id;
    match store.assignment_count(distribution_id)? {
        None => return Err(AllocationError::UnknownDistribution(distribution_id)),
        Some(0) => {}
        Some(rows) => {
            return Err(AllocationError::AlreadyAllocated {
                distribution_id,
                rows,
            })
        }
    }

    let prepared = prepare(
        &*store,
        &request.participants,
        &request.selections,
        &request.policy,
        rng,
    )?;
    let pool_size = prepared.pool.len() as u64;
    let mut preferences =
        PreferenceModel::seed(&prepared.history, &request.participants, &prepared.pool);
    let picks = assigner::assign(
        distribution_id,
        &request.participants,
        &prepared.plan,
        prepared.pool,
        &mut preferences,
        store,
    )?;

    Ok(AllocationReport::new(
        Some(distribution_id),
        request.policy,
        pool_size,
        prepared.plan,
        picks,
    ))
}

/// Plan and assign without recording anything
pub fn preview<S, R>(
    reader: &S,
    participants: &[ParticipantId],
    selections: &[Selection],
    policy: &Policy,
    rng: &mut R,
) -> Result<AllocationReport, AllocationError>
where
    S: LedgerReader + ?Sized,
    R: Rng,
{
    let prepared = prepare(reader, participants, selections, policy, rng)?;
    let pool_size = prepared.pool.len() as u64;
    let mut preferences = PreferenceModel::seed(&prepared.history, participants, &prepared.pool);
    let picks = assigner::assign(
        DistributionId(0),
        participants,
        &prepared.plan,
        prepared.pool,
        &mut preferences,
        &mut DryRun,
    )?;
    Ok(AllocationReport::new(
        None,
        *policy,
        pool_size,
        prepared.plan,
        picks,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::policy::PolicyKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashMap};

    type RowKey = (DistributionId, ParticipantId, PartKindId, KitTypeId);

    /// In-memory stand-in for the SQLite ledger
    #[derive(Debug, Default)]
    pub(crate) struct MemoryLedger {
        pub participants: BTreeSet<ParticipantId>,
        pub types: HashMap<KitTypeId, Vec<TypeMember>>,
        /// Rows from earlier distributions
        pub history: Vec<(ParticipantId, PartKindId, u64)>,
        pub distributions: BTreeSet<DistributionId>,
        pub rows: BTreeMap<RowKey, u64>,
    }

    impl MemoryLedger {
        pub fn with_participants(ids: &[i64]) -> Self {
            Self {
                participants: ids.iter().map(|n| ParticipantId(*n)).collect(),
                distributions: [DistributionId(1)].into_iter().collect(),
                ..Self::default()
            }
        }

        pub fn add_type(&mut self, id: i64, members: &[(i64, u32)]) {
            self.types.insert(
                KitTypeId(id),
                members
                    .iter()
                    .map(|(part, multiplier)| TypeMember {
                        part_kind_id: PartKindId(*part),
                        multiplier: *multiplier,
                    })
                    .collect(),
            );
        }

        fn received(&self, distribution: DistributionId, participant: i64) -> u64 {
            self.rows
                .iter()
                .filter(|((d, p, _, _), _)| *d == distribution && p.get() == participant)
                .map(|(_, n)| *n)
                .sum()
        }
    }

    impl LedgerReader for MemoryLedger {
        fn type_members(
            &self,
            type_id: KitTypeId,
        ) -> Result<Option<Vec<TypeMember>>, LedgerError> {
            Ok(self.types.get(&type_id).cloned())
        }

        fn assignment_count(
            &self,
            distribution_id: DistributionId,
        ) -> Result<Option<u64>, LedgerError> {
            if !self.distributions.contains(&distribution_id) {
                return Ok(None);
            }
            Ok(Some(
                self.rows
                    .keys()
                    .filter(|(d, _, _, _)| *d == distribution_id)
                    .count() as u64,
            ))
        }

        fn assignment_sums(
            &self,
            participants: &[ParticipantId],
        ) -> Result<Vec<(ParticipantId, PartKindId, u64)>, LedgerError> {
            let rows = self
                .rows
                .iter()
                .map(|((_, p, k, _), n)| (*p, *k, *n));
            Ok(self
                .history
                .iter()
                .copied()
                .chain(rows)
                .filter(|(p, _, _)| participants.contains(p))
                .collect())
        }

        fn missing_participants(
            &self,
            participants: &[ParticipantId],
        ) -> Result<Vec<ParticipantId>, LedgerError> {
            Ok(participants
                .iter()
                .filter(|p| !self.participants.contains(p))
                .copied()
                .collect())
        }
    }

    impl PickSink for MemoryLedger {
        fn record_pick(
            &mut self,
            distribution_id: DistributionId,
            pick: &Pick,
        ) -> Result<(), LedgerError> {
            *self
                .rows
                .entry((
                    distribution_id,
                    pick.participant_id,
                    pick.part_kind_id,
                    pick.type_id,
                ))
                .or_insert(0) += 1;
            Ok(())
        }
    }

    fn request(participants: &[i64], selections: &[(i64, u32)], kind: PolicyKind) -> AllocationRequest {
        AllocationRequest {
            distribution_id: DistributionId(1),
            participants: participants.iter().map(|n| ParticipantId(*n)).collect(),
            selections: selections
                .iter()
                .map(|(t, count)| Selection {
                    type_id: KitTypeId(*t),
                    count: *count,
                })
                .collect(),
            policy: Policy::new(kind, 0).unwrap(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_less_splits_six_units_evenly() {
        let mut ledger = MemoryLedger::with_participants(&[1, 2, 3]);
        ledger.add_type(1, &[(10, 1)]);
        let report = allocate(
            &mut ledger,
            &request(&[1, 2, 3], &[(1, 6)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap();

        assert_eq!(report.pool_size, 6);
        for participant in 1..=3 {
            assert_eq!(report.plan.target(ParticipantId(participant)), 2);
            assert_eq!(ledger.received(DistributionId(1), participant), 2);
        }
        // One row per participant, quantity collapsed
        assert_eq!(report.rows, 3);
        assert_eq!(ledger.rows.len(), 3);
    }

    #[test]
    fn test_share_less_gives_leftover_to_first() {
        let mut ledger = MemoryLedger::with_participants(&[1, 2, 3]);
        ledger.add_type(1, &[(10, 1)]);
        let report = allocate(
            &mut ledger,
            &request(&[1, 2, 3], &[(1, 7)], PolicyKind::ShareLess),
            &mut rng(),
        )
        .unwrap();

        assert_eq!(report.plan.share_rounds, 2);
        assert_eq!(ledger.received(DistributionId(1), 1), 3);
        assert_eq!(ledger.received(DistributionId(1), 2), 2);
        assert_eq!(ledger.received(DistributionId(1), 3), 2);
    }

    #[test]
    fn test_less_skips_participant_with_history() {
        let mut ledger = MemoryLedger::with_participants(&[1, 2, 3]);
        ledger.add_type(1, &[(10, 1)]);
        ledger.history.push((ParticipantId(1), PartKindId(10), 5));
        allocate(
            &mut ledger,
            &request(&[1, 2, 3], &[(1, 3)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap();

        assert_eq!(ledger.received(DistributionId(1), 1), 0);
        assert_eq!(
            ledger.received(DistributionId(1), 2) + ledger.received(DistributionId(1), 3),
            3
        );
    }

    #[test]
    fn test_quantities_sum_to_pool_for_every_policy() {
        for kind in [
            PolicyKind::Random,
            PolicyKind::Less,
            PolicyKind::ShareLess,
            PolicyKind::ShareRandom,
        ] {
            let mut ledger = MemoryLedger::with_participants(&[1, 2, 3, 4]);
            ledger.add_type(1, &[(10, 2), (11, 1)]);
            ledger.add_type(2, &[(20, 3)]);
            ledger.history.push((ParticipantId(2), PartKindId(11), 4));

            let report = allocate(
                &mut ledger,
                &request(&[4, 1, 3, 2], &[(1, 3), (2, 2)], kind),
                &mut rng(),
            )
            .unwrap();
            let total: u64 = ledger.rows.values().sum();
            assert_eq!(report.pool_size, 15, "{kind}");
            assert_eq!(total, 15, "{kind}");
            assert_eq!(report.rows, ledger.rows.len() as u64, "{kind}");
            for participant in [1, 2, 3, 4] {
                assert_eq!(
                    ledger.received(DistributionId(1), participant),
                    report.plan.target(ParticipantId(participant)),
                    "{kind}"
                );
            }
        }
    }

    #[test]
    fn test_parts_are_spread_across_participants() {
        // Two part kinds, two participants: each should get one of each
        let mut ledger = MemoryLedger::with_participants(&[1, 2]);
        ledger.add_type(1, &[(10, 1), (11, 1)]);
        allocate(
            &mut ledger,
            &request(&[1, 2], &[(1, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap();

        for participant in [1, 2] {
            for part in [10, 11] {
                let key = (
                    DistributionId(1),
                    ParticipantId(participant),
                    PartKindId(part),
                    KitTypeId(1),
                );
                assert_eq!(ledger.rows.get(&key), Some(&1));
            }
        }
    }

    #[test]
    fn test_preconditions_are_checked_before_writing() {
        let mut ledger = MemoryLedger::with_participants(&[1, 2]);
        ledger.add_type(1, &[(10, 1)]);
        ledger.add_type(2, &[]);

        let err = allocate(
            &mut ledger,
            &request(&[1, 1], &[(1, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::DuplicateParticipant(ParticipantId(1))));

        let err = allocate(
            &mut ledger,
            &request(&[1, 7], &[(1, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::UnknownParticipants(ref ids) if ids == &[ParticipantId(7)]));

        let err = allocate(
            &mut ledger,
            &request(&[1], &[(9, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::UnknownType(KitTypeId(9))));

        let err = allocate(
            &mut ledger,
            &request(&[1], &[(2, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::EmptyType(KitTypeId(2))));

        let err = allocate(
            &mut ledger,
            &request(&[], &[(1, 2)], PolicyKind::Less),
            &mut rng(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::NoParticipants { pool_size: 2 }));

        let mut missing = request(&[1], &[(1, 2)], PolicyKind::Less);
        missing.distribution_id = DistributionId(5);
        let err = allocate(&mut ledger, &missing, &mut rng()).unwrap_err();
        assert!(matches!(err, AllocationError::UnknownDistribution(DistributionId(5))));

        assert!(ledger.rows.is_empty());
    }

    #[test]
    fn test_distribution_cannot_be_allocated_twice() {
        let mut ledger = MemoryLedger::with_participants(&[1]);
        ledger.add_type(1, &[(10, 1)]);
        let req = request(&[1], &[(1, 2)], PolicyKind::Less);
        allocate(&mut ledger, &req, &mut rng()).unwrap();
        let err = allocate(&mut ledger, &req, &mut rng()).unwrap_err();
        assert!(matches!(err, AllocationError::AlreadyAllocated { rows: 1, .. }));
    }

    #[test]
    fn test_empty_run_is_allowed() {
        let mut ledger = MemoryLedger::with_participants(&[]);
        ledger.add_type(1, &[(10, 1)]);
        let report = allocate(
            &mut ledger,
            &request(&[], &[(1, 0)], PolicyKind::Random),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(report.pool_size, 0);
        assert!(report.picks.is_empty());
    }

    #[test]
    fn test_seeded_random_runs_repeat() {
        let run = || {
            let mut ledger = MemoryLedger::with_participants(&[1, 2, 3]);
            ledger.add_type(1, &[(10, 1), (11, 2)]);
            allocate(
                &mut ledger,
                &request(&[1, 2, 3], &[(1, 5)], PolicyKind::ShareRandom),
                &mut StdRng::seed_from_u64(11),
            )
            .unwrap()
            .picks
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_preview_records_nothing() {
        let mut ledger = MemoryLedger::with_participants(&[1, 2]);
        ledger.add_type(1, &[(10, 1)]);
        let report = preview(
            &ledger,
            &[ParticipantId(1), ParticipantId(2)],
            &[Selection {
                type_id: KitTypeId(1),
                count: 3,
            }],
            &Policy::default(),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(report.distribution_id, None);
        assert_eq!(report.picks.len(), 3);
        assert!(ledger.rows.is_empty());
    }
}
