//! Distribution records and allocation runs

use log::info;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    now_timestamp, parse_datetime, Distribution, DistributionSummary, Ledger, LedgerError,
    Selection, SqliteStore,
};
use crate::core::identity::{DistributionId, ParticipantId, RecordKind};
use crate::core::policy::Policy;
use crate::engine::{self, AllocationError, AllocationReport, AllocationRequest};

/// Caller input for a new distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionDraft {
    pub name: String,
    /// Participants in visiting order
    pub participants: Vec<ParticipantId>,
    pub selections: Vec<Selection>,
    pub policy: Policy,
}

fn insert_distribution(conn: &Connection, name: &str) -> Result<DistributionId, LedgerError> {
    let created_at = now_timestamp();
    let name = if name.trim().is_empty() {
        format!("Distribution {}", &created_at[..10])
    } else {
        name.trim().to_string()
    };
    conn.execute(
        "INSERT INTO distributions (name, created_at) VALUES (?1, ?2)",
        params![name, created_at],
    )?;
    Ok(DistributionId(conn.last_insert_rowid()))
}

fn insert_roster(
    conn: &Connection,
    id: DistributionId,
    draft: &DistributionDraft,
) -> Result<(), LedgerError> {
    let mut stmt = conn.prepare(
        "INSERT INTO distribution_participants (distribution_id, participant_id, position)
         VALUES (?1, ?2, ?3)",
    )?;
    for (position, participant) in draft.participants.iter().enumerate() {
        stmt.execute(params![id, participant, position as i64])?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO selections (distribution_id, type_id, count) VALUES (?1, ?2, ?3)")?;
    for selection in &draft.selections {
        stmt.execute(params![id, selection.type_id, selection.count])?;
    }
    Ok(())
}

impl Ledger {
    /// Create a distribution and allocate its units in one transaction
    ///
    /// Nothing is written when any step fails.
    pub fn create_distribution<R: Rng>(
        &mut self,
        draft: &DistributionDraft,
        rng: &mut R,
    ) -> Result<(Distribution, AllocationReport), AllocationError> {
        let tx = self.conn.transaction().map_err(LedgerError::from)?;
        let id = insert_distribution(&tx, &draft.name)?;

        let request = AllocationRequest {
            distribution_id: id,
            participants: draft.participants.clone(),
            selections: draft.selections.clone(),
            policy: draft.policy,
        };
        let report = engine::allocate(&mut SqliteStore::new(&tx), &request, rng)?;
        insert_roster(&tx, id, draft)?;
        tx.commit().map_err(LedgerError::from)?;

        info!(
            "event=distribution_create module=ledger status=ok distribution_id={} participants={} units={}",
            id,
            draft.participants.len(),
            report.pool_size
        );
        Ok((self.get_distribution(id)?, report))
    }

    /// Plan and assign a draft without writing anything
    pub fn preview_distribution<R: Rng>(
        &self,
        draft: &DistributionDraft,
        rng: &mut R,
    ) -> Result<AllocationReport, AllocationError> {
        engine::preview(
            &SqliteStore::new(&self.conn),
            &draft.participants,
            &draft.selections,
            &draft.policy,
            rng,
        )
    }

    /// Get a distribution with its participants and selections
    pub fn get_distribution(&self, id: DistributionId) -> Result<Distribution, LedgerError> {
        let (name, created_at) = self
            .conn
            .query_row(
                "SELECT name, created_at FROM distributions WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(RecordKind::Distribution, id.get()))?;

        let participants = {
            let mut stmt = self.conn.prepare(
                "SELECT participant_id FROM distribution_participants
                 WHERE distribution_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let selections = {
            let mut stmt = self.conn.prepare(
                "SELECT type_id, count FROM selections WHERE distribution_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(Selection {
                    type_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(Distribution {
            id,
            name,
            created_at: parse_datetime(created_at),
            participants,
            selections,
        })
    }

    /// All distributions, most recent first
    pub fn list_distributions(&self) -> Result<Vec<DistributionSummary>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.name, d.created_at,
                    (SELECT COUNT(*) FROM distribution_participants dp WHERE dp.distribution_id = d.id),
                    (SELECT COALESCE(SUM(a.quantity), 0) FROM assignments a WHERE a.distribution_id = d.id)
             FROM distributions d
             ORDER BY d.created_at DESC, d.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DistributionSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(row.get::<_, String>(2)?),
                participant_count: row.get::<_, i64>(3)? as u64,
                unit_count: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a distribution with its roster, selections and assignments
    ///
    /// Returns the number of assignment rows removed.
    pub fn cancel_distribution(&self, id: DistributionId) -> Result<u64, LedgerError> {
        let rows: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM assignments WHERE distribution_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let deleted = self
            .conn
            .execute("DELETE FROM distributions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(LedgerError::not_found(RecordKind::Distribution, id.get()));
        }
        info!(
            "event=distribution_cancel module=ledger status=ok distribution_id={} rows={}",
            id, rows
        );
        Ok(rows as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::KitTypeId;
    use crate::core::policy::PolicyKind;
    use crate::ledger::{NewParticipant, ObjectDefinition, PartDefinition, TypeDefinition};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (Ledger, KitTypeId) {
        let mut ledger = Ledger::open_in_memory().unwrap();
        for name in ["Ada", "Grace", "Linus"] {
            ledger
                .add_participant(&NewParticipant::named(name, ""))
                .unwrap();
        }
        let object = ledger
            .add_object(&ObjectDefinition {
                name: "Seeds".to_string(),
                parts: vec![
                    PartDefinition {
                        name: "Tomato".to_string(),
                    },
                    PartDefinition {
                        name: "Basil".to_string(),
                    },
                ],
                types: vec![TypeDefinition {
                    name: "Garden".to_string(),
                    quantities: [("Tomato".to_string(), 2), ("Basil".to_string(), 1)]
                        .into_iter()
                        .collect(),
                }],
            })
            .unwrap();
        (ledger, object.types[0].id)
    }

    fn draft(type_id: KitTypeId, count: u32, kind: PolicyKind) -> DistributionDraft {
        DistributionDraft {
            name: "Spring".to_string(),
            participants: vec![ParticipantId(1), ParticipantId(2), ParticipantId(3)],
            selections: vec![Selection { type_id, count }],
            policy: Policy::new(kind, 0).unwrap(),
        }
    }

    fn count(ledger: &Ledger, table: &str) -> i64 {
        ledger
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_distribution_persists_everything() {
        let (mut ledger, type_id) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let (distribution, report) = ledger
            .create_distribution(&draft(type_id, 3, PolicyKind::ShareLess), &mut rng)
            .unwrap();

        assert_eq!(distribution.name, "Spring");
        assert_eq!(distribution.participants.len(), 3);
        assert_eq!(distribution.selections[0].count, 3);
        assert_eq!(report.pool_size, 9);

        let total: u32 = ledger
            .list_assignments(distribution.id)
            .unwrap()
            .iter()
            .map(|a| a.quantity)
            .sum();
        assert_eq!(total, 9);
        assert_eq!(
            ledger.list_assignments(distribution.id).unwrap().len() as u64,
            report.rows
        );
    }

    #[test]
    fn test_history_carries_into_next_run() {
        let (mut ledger, type_id) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let mut first = draft(type_id, 1, PolicyKind::Less);
        first.participants = vec![ParticipantId(1)];
        ledger.create_distribution(&first, &mut rng).unwrap();

        // Participant 1 now holds 3 units; 3 new units go to the others
        let (second, _) = ledger
            .create_distribution(&draft(type_id, 1, PolicyKind::Less), &mut rng)
            .unwrap();
        assert!(ledger
            .list_assignments(second.id)
            .unwrap()
            .iter()
            .all(|a| a.participant_id != ParticipantId(1)));
    }

    #[test]
    fn test_failed_run_leaves_nothing() {
        let (mut ledger, type_id) = setup();
        ledger
            .connection()
            .execute_batch(
                "CREATE TRIGGER fail_third_row BEFORE INSERT ON assignments
                 WHEN (SELECT COUNT(*) FROM assignments) >= 2
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let err = ledger
            .create_distribution(&draft(type_id, 1, PolicyKind::Less), &mut rng)
            .unwrap_err();
        assert!(matches!(err, AllocationError::Ledger(LedgerError::Sqlite(_))));
        assert_eq!(count(&ledger, "distributions"), 0);
        assert_eq!(count(&ledger, "assignments"), 0);
        assert_eq!(count(&ledger, "selections"), 0);
    }

    #[test]
    fn test_rejected_request_leaves_nothing() {
        let (mut ledger, type_id) = setup();
        let mut bad = draft(type_id, 1, PolicyKind::Less);
        bad.participants.push(ParticipantId(42));
        let mut rng = StdRng::seed_from_u64(3);
        let err = ledger.create_distribution(&bad, &mut rng).unwrap_err();
        assert!(matches!(err, AllocationError::UnknownParticipants(_)));
        assert_eq!(count(&ledger, "distributions"), 0);
    }

    #[test]
    fn test_preview_writes_nothing() {
        let (ledger, type_id) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let report = ledger
            .preview_distribution(&draft(type_id, 2, PolicyKind::Less), &mut rng)
            .unwrap();
        assert_eq!(report.pool_size, 6);
        assert_eq!(report.picks.len(), 6);
        assert_eq!(count(&ledger, "distributions"), 0);
    }

    #[test]
    fn test_list_and_cancel() {
        let (mut ledger, type_id) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let (first, _) = ledger
            .create_distribution(&draft(type_id, 1, PolicyKind::Less), &mut rng)
            .unwrap();
        let (second, _) = ledger
            .create_distribution(&draft(type_id, 2, PolicyKind::Less), &mut rng)
            .unwrap();

        let list = ledger.list_distributions().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[0].unit_count, 6);
        assert_eq!(list[1].participant_count, 3);

        assert!(ledger.cancel_distribution(first.id).unwrap() > 0);
        assert_eq!(ledger.list_distributions().unwrap().len(), 1);
        assert!(ledger.list_assignments(first.id).unwrap().is_empty());
        assert!(matches!(
            ledger.cancel_distribution(first.id),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_referenced_participant_cannot_be_removed() {
        let (mut ledger, type_id) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let (distribution, _) = ledger
            .create_distribution(&draft(type_id, 1, PolicyKind::Less), &mut rng)
            .unwrap();
        assert!(matches!(
            ledger.remove_participant(ParticipantId(1)),
            Err(LedgerError::InUse { .. })
        ));
        assert!(matches!(
            ledger.remove_object(crate::core::identity::ObjectId(1)),
            Err(LedgerError::InUse { .. })
        ));

        ledger.cancel_distribution(distribution.id).unwrap();
        ledger.remove_participant(ParticipantId(1)).unwrap();
    }
}
