//! Assignment rows and historical aggregates

use rusqlite::{params, params_from_iter, Connection};

use super::{placeholders, Assignment, AssignmentDetail, Ledger, LedgerError, SqliteStore};
use crate::core::identity::{DistributionId, ParticipantId, PartKindId};
use crate::engine::{HistoricalTotals, Pick};

/// Participants per IN clause, well below SQLite's variable limit
const SUMS_CHUNK: usize = 500;

/// Add one unit to the row of `pick`, creating it with quantity 1 if absent
pub(super) fn record_pick(
    conn: &Connection,
    distribution_id: DistributionId,
    pick: &Pick,
) -> Result<(), LedgerError> {
    conn.prepare_cached(
        "INSERT INTO assignments (distribution_id, participant_id, part_kind_id, type_id, quantity)
         VALUES (?1, ?2, ?3, ?4, 1)
         ON CONFLICT (distribution_id, participant_id, part_kind_id, type_id)
         DO UPDATE SET quantity = quantity + 1",
    )?
    .execute(params![
        distribution_id,
        pick.participant_id,
        pick.part_kind_id,
        pick.type_id
    ])?;
    Ok(())
}

/// Assignment rows of a distribution, `None` when it does not exist
pub(super) fn assignment_count(
    conn: &Connection,
    distribution_id: DistributionId,
) -> Result<Option<u64>, LedgerError> {
    let exists = conn
        .prepare("SELECT 1 FROM distributions WHERE id = ?1")?
        .exists(params![distribution_id])?;
    if !exists {
        return Ok(None);
    }
    let rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assignments WHERE distribution_id = ?1",
        params![distribution_id],
        |row| row.get(0),
    )?;
    Ok(Some(rows as u64))
}

/// Quantities per (participant, part kind) summed over every distribution
pub(super) fn assignment_sums(
    conn: &Connection,
    participants: &[ParticipantId],
) -> Result<Vec<(ParticipantId, PartKindId, u64)>, LedgerError> {
    let mut sums = Vec::new();
    for chunk in participants.chunks(SUMS_CHUNK) {
        let sql = format!(
            "SELECT participant_id, part_kind_id, SUM(quantity) FROM assignments
             WHERE participant_id IN ({})
             GROUP BY participant_id, part_kind_id
             ORDER BY participant_id, part_kind_id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64))
        })?;
        for row in rows {
            sums.push(row?);
        }
    }
    Ok(sums)
}

impl Ledger {
    /// Raw assignment rows of a distribution
    pub fn list_assignments(
        &self,
        distribution_id: DistributionId,
    ) -> Result<Vec<Assignment>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT distribution_id, participant_id, part_kind_id, type_id, quantity
             FROM assignments WHERE distribution_id = ?1
             ORDER BY participant_id, type_id, part_kind_id",
        )?;
        let rows = stmt.query_map(params![distribution_id], |row| {
            Ok(Assignment {
                distribution_id: row.get(0)?,
                participant_id: row.get(1)?,
                part_kind_id: row.get(2)?,
                type_id: row.get(3)?,
                quantity: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Assignment rows of a distribution with participant, object, type and part names
    pub fn assignment_details(
        &self,
        distribution_id: DistributionId,
    ) -> Result<Vec<AssignmentDetail>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.participant_id,
                    TRIM(p.first_name || ' ' || p.last_name),
                    o.name, t.name, a.part_kind_id, k.name, a.quantity
             FROM assignments a
             JOIN participants p ON p.id = a.participant_id
             JOIN kit_types t ON t.id = a.type_id
             JOIN objects o ON o.id = t.object_id
             JOIN part_kinds k ON k.id = a.part_kind_id
             WHERE a.distribution_id = ?1
             ORDER BY a.participant_id, t.id, k.id",
        )?;
        let rows = stmt.query_map(params![distribution_id], |row| {
            Ok(AssignmentDetail {
                participant_id: row.get(0)?,
                participant_name: row.get(1)?,
                object_name: row.get(2)?,
                type_name: row.get(3)?,
                part_kind_id: row.get(4)?,
                part_name: row.get(5)?,
                quantity: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Historical totals of `participants` across all distributions
    pub fn historical_totals(
        &self,
        participants: &[ParticipantId],
    ) -> Result<HistoricalTotals, LedgerError> {
        HistoricalTotals::load(&SqliteStore::new(&self.conn), participants)
    }
}
