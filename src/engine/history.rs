//! Historical totals loaded from the assignment ledger

use std::collections::HashMap;

use serde::Serialize;

use super::LedgerReader;
use crate::core::identity::{ParticipantId, PartKindId};
use crate::ledger::LedgerError;

/// Units per part kind; missing entries read as zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PartCounts(HashMap<PartKindId, u64>);

impl PartCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, part: PartKindId) -> u64 {
        self.0.get(&part).copied().unwrap_or(0)
    }

    pub fn add(&mut self, part: PartKindId, quantity: u64) {
        *self.0.entry(part).or_insert(0) += quantity;
    }

    pub fn increment(&mut self, part: PartKindId) {
        self.add(part, 1);
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartKindId, u64)> + '_ {
        self.0.iter().map(|(part, n)| (*part, *n))
    }
}

/// Quantities ever assigned to a set of participants, across all distributions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoricalTotals {
    totals: HashMap<ParticipantId, u64>,
    per_part: HashMap<ParticipantId, PartCounts>,
}

impl HistoricalTotals {
    /// Aggregate the ledger for `participants`
    ///
    /// Every requested participant is present in the result, with zero totals
    /// when the ledger holds nothing for them.
    pub fn load<S: LedgerReader + ?Sized>(
        reader: &S,
        participants: &[ParticipantId],
    ) -> Result<Self, LedgerError> {
        let mut history = Self::default();
        for id in participants {
            history.totals.entry(*id).or_insert(0);
            history.per_part.entry(*id).or_default();
        }
        if participants.is_empty() {
            return Ok(history);
        }

        for (participant, part, quantity) in reader.assignment_sums(participants)? {
            history.record(participant, part, quantity);
        }
        Ok(history)
    }

    /// Add `quantity` units of `part` to a participant's history
    pub fn record(&mut self, participant: ParticipantId, part: PartKindId, quantity: u64) {
        *self.totals.entry(participant).or_insert(0) += quantity;
        self.per_part
            .entry(participant)
            .or_default()
            .add(part, quantity);
    }

    /// Total units ever assigned to a participant
    pub fn total(&self, participant: ParticipantId) -> u64 {
        self.totals.get(&participant).copied().unwrap_or(0)
    }

    /// Units of one part kind ever assigned to a participant
    pub fn part_count(&self, participant: ParticipantId, part: PartKindId) -> u64 {
        self.per_part
            .get(&participant)
            .map(|counts| counts.get(part))
            .unwrap_or(0)
    }

    pub fn parts(&self, participant: ParticipantId) -> Option<&PartCounts> {
        self.per_part.get(&participant)
    }
}
