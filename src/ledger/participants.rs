//! Participant records

use log::info;
use rusqlite::{params, OptionalExtension, Row};

use super::{now_timestamp, parse_datetime, Ledger, LedgerError, NewParticipant, Participant};
use crate::core::identity::{ParticipantId, RecordKind};

const PARTICIPANT_SELECT_SQL: &str =
    "SELECT id, first_name, last_name, email, phone, created_at FROM participants";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn validate(data: &NewParticipant) -> Result<(), LedgerError> {
    if data.first_name.trim().is_empty() && data.last_name.trim().is_empty() {
        return Err(LedgerError::Invalid(
            "a participant needs a first or last name".to_string(),
        ));
    }
    Ok(())
}

impl Ledger {
    /// Add a participant and return the stored record
    pub fn add_participant(&self, data: &NewParticipant) -> Result<Participant, LedgerError> {
        validate(data)?;
        self.conn.execute(
            "INSERT INTO participants (first_name, last_name, email, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                data.first_name.trim(),
                data.last_name.trim(),
                data.email.trim(),
                data.phone.trim(),
                now_timestamp()
            ],
        )?;
        let id = ParticipantId(self.conn.last_insert_rowid());
        info!("event=participant_add module=ledger status=ok participant_id={}", id);
        self.get_participant(id)
    }

    /// All participants, ordered by id
    pub fn list_participants(&self) -> Result<Vec<Participant>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PARTICIPANT_SELECT_SQL} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], participant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Get one participant
    pub fn get_participant(&self, id: ParticipantId) -> Result<Participant, LedgerError> {
        self.conn
            .query_row(
                &format!("{PARTICIPANT_SELECT_SQL} WHERE id = ?1"),
                params![id],
                participant_from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(RecordKind::Participant, id.get()))
    }

    /// Replace a participant's display attributes
    pub fn update_participant(
        &self,
        id: ParticipantId,
        data: &NewParticipant,
    ) -> Result<Participant, LedgerError> {
        validate(data)?;
        let changed = self.conn.execute(
            "UPDATE participants SET first_name = ?1, last_name = ?2, email = ?3, phone = ?4
             WHERE id = ?5",
            params![
                data.first_name.trim(),
                data.last_name.trim(),
                data.email.trim(),
                data.phone.trim(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(RecordKind::Participant, id.get()));
        }
        self.get_participant(id)
    }

    /// Delete a participant that no distribution references
    pub fn remove_participant(&self, id: ParticipantId) -> Result<(), LedgerError> {
        self.get_participant(id)?;
        let references: u64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM distribution_participants WHERE participant_id = ?1)
                  + (SELECT COUNT(*) FROM assignments WHERE participant_id = ?1)",
            params![id],
            |row| row.get::<_, i64>(0),
        )? as u64;
        if references > 0 {
            return Err(LedgerError::InUse {
                kind: RecordKind::Participant,
                id: id.get(),
                references,
            });
        }
        self.conn
            .execute("DELETE FROM participants WHERE id = ?1", params![id])?;
        info!("event=participant_remove module=ledger status=ok participant_id={}", id);
        Ok(())
    }

    /// Ids from `ids` that do not exist in the ledger
    pub fn missing_participants(
        &self,
        ids: &[ParticipantId],
    ) -> Result<Vec<ParticipantId>, LedgerError> {
        missing_participants(&self.conn, ids)
    }
}

pub(super) fn missing_participants(
    conn: &rusqlite::Connection,
    ids: &[ParticipantId],
) -> Result<Vec<ParticipantId>, LedgerError> {
    let mut stmt = conn.prepare("SELECT 1 FROM participants WHERE id = ?1")?;
    let mut missing = Vec::new();
    for id in ids {
        if !stmt.exists(params![id])? {
            missing.push(*id);
        }
    }
    Ok(missing)
}
