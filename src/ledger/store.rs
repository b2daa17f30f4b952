//! Engine access to a ledger connection
//!
//! `SqliteStore` borrows a connection, so it works on a plain connection for
//! reads and on an open transaction for allocation runs.

use rusqlite::Connection;

use super::{assignments, catalog, participants, LedgerError, TypeMember};
use crate::core::identity::{DistributionId, KitTypeId, ParticipantId, PartKindId};
use crate::engine::{LedgerReader, Pick, PickSink};

pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LedgerReader for SqliteStore<'_> {
    fn type_members(&self, type_id: KitTypeId) -> Result<Option<Vec<TypeMember>>, LedgerError> {
        catalog::type_members(self.conn, type_id)
    }

    fn assignment_count(
        &self,
        distribution_id: DistributionId,
    ) -> Result<Option<u64>, LedgerError> {
        assignments::assignment_count(self.conn, distribution_id)
    }

    fn assignment_sums(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<(ParticipantId, PartKindId, u64)>, LedgerError> {
        assignments::assignment_sums(self.conn, participants)
    }

    fn missing_participants(
        &self,
        ids: &[ParticipantId],
    ) -> Result<Vec<ParticipantId>, LedgerError> {
        participants::missing_participants(self.conn, ids)
    }
}

impl PickSink for SqliteStore<'_> {
    fn record_pick(
        &mut self,
        distribution_id: DistributionId,
        pick: &Pick,
    ) -> Result<(), LedgerError> {
        assignments::record_pick(self.conn, distribution_id, pick)
    }
}
