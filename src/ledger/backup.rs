//! JSON export and import of the whole ledger
//!
//! A dump holds every table verbatim, ids included. Import replaces the
//! ledger contents in one transaction; a dump that breaks a foreign key
//! leaves the ledger untouched.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::info;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{Ledger, LedgerError};

/// Dump format version written by this build
pub const DUMP_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub version: u32,
    #[serde(default)]
    pub exported_at: String,
    pub data: LedgerTables,
}

/// Rows of every ledger table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerTables {
    pub participants: Vec<ParticipantRow>,
    pub objects: Vec<ObjectRow>,
    pub part_kinds: Vec<CatalogRow>,
    pub types: Vec<CatalogRow>,
    pub type_members: Vec<TypeMemberRow>,
    pub distributions: Vec<DistributionRow>,
    pub distribution_participants: Vec<RosterRow>,
    pub selections: Vec<SelectionRow>,
    pub assignments: Vec<AssignmentRow>,
}

impl LedgerTables {
    pub fn row_count(&self) -> usize {
        self.participants.len()
            + self.objects.len()
            + self.part_kinds.len()
            + self.types.len()
            + self.type_members.len()
            + self.distributions.len()
            + self.distribution_participants.len()
            + self.selections.len()
            + self.assignments.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRow {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Row of `part_kinds` or `kit_types`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub object_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMemberRow {
    pub type_id: i64,
    pub part_kind_id: i64,
    pub multiplier: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRow {
    pub distribution_id: i64,
    pub participant_id: i64,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRow {
    pub id: i64,
    pub distribution_id: i64,
    pub type_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub id: i64,
    pub distribution_id: i64,
    pub participant_id: i64,
    pub part_kind_id: i64,
    pub type_id: i64,
    pub quantity: i64,
}

/// Run `sql` and map every row
fn read_rows<T>(
    conn: &Connection,
    sql: &str,
    map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, LedgerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn read_tables(conn: &Connection) -> Result<LedgerTables, LedgerError> {
    Ok(LedgerTables {
        participants: read_rows(
            conn,
            "SELECT id, first_name, last_name, email, phone, created_at FROM participants ORDER BY id",
            |row| {
                Ok(ParticipantRow {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                    phone: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )?,
        objects: read_rows(
            conn,
            "SELECT id, name, created_at FROM objects ORDER BY id",
            |row| {
                Ok(ObjectRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )?,
        part_kinds: read_rows(
            conn,
            "SELECT id, object_id, name FROM part_kinds ORDER BY id",
            catalog_row,
        )?,
        types: read_rows(
            conn,
            "SELECT id, object_id, name FROM kit_types ORDER BY id",
            catalog_row,
        )?,
        type_members: read_rows(
            conn,
            "SELECT type_id, part_kind_id, multiplier FROM type_members ORDER BY type_id, part_kind_id",
            |row| {
                Ok(TypeMemberRow {
                    type_id: row.get(0)?,
                    part_kind_id: row.get(1)?,
                    multiplier: row.get(2)?,
                })
            },
        )?,
        distributions: read_rows(
            conn,
            "SELECT id, name, created_at FROM distributions ORDER BY id",
            |row| {
                Ok(DistributionRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )?,
        distribution_participants: read_rows(
            conn,
            "SELECT distribution_id, participant_id, position FROM distribution_participants
             ORDER BY distribution_id, position",
            |row| {
                Ok(RosterRow {
                    distribution_id: row.get(0)?,
                    participant_id: row.get(1)?,
                    position: row.get(2)?,
                })
            },
        )?,
        selections: read_rows(
            conn,
            "SELECT id, distribution_id, type_id, count FROM selections ORDER BY id",
            |row| {
                Ok(SelectionRow {
                    id: row.get(0)?,
                    distribution_id: row.get(1)?,
                    type_id: row.get(2)?,
                    count: row.get(3)?,
                })
            },
        )?,
        assignments: read_rows(
            conn,
            "SELECT id, distribution_id, participant_id, part_kind_id, type_id, quantity
             FROM assignments ORDER BY id",
            |row| {
                Ok(AssignmentRow {
                    id: row.get(0)?,
                    distribution_id: row.get(1)?,
                    participant_id: row.get(2)?,
                    part_kind_id: row.get(3)?,
                    type_id: row.get(4)?,
                    quantity: row.get(5)?,
                })
            },
        )?,
    })
}

fn catalog_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogRow> {
    Ok(CatalogRow {
        id: row.get(0)?,
        object_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn write_tables(conn: &Connection, data: &LedgerTables) -> Result<(), LedgerError> {
    // Children first
    conn.execute_batch(
        "DELETE FROM assignments;
         DELETE FROM selections;
         DELETE FROM distribution_participants;
         DELETE FROM distributions;
         DELETE FROM type_members;
         DELETE FROM part_kinds;
         DELETE FROM kit_types;
         DELETE FROM objects;
         DELETE FROM participants;",
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO participants (id, first_name, last_name, email, phone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for p in &data.participants {
        stmt.execute(params![p.id, p.first_name, p.last_name, p.email, p.phone, p.created_at])?;
    }

    let mut stmt = conn.prepare("INSERT INTO objects (id, name, created_at) VALUES (?1, ?2, ?3)")?;
    for o in &data.objects {
        stmt.execute(params![o.id, o.name, o.created_at])?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO part_kinds (id, object_id, name) VALUES (?1, ?2, ?3)")?;
    for k in &data.part_kinds {
        stmt.execute(params![k.id, k.object_id, k.name])?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO kit_types (id, object_id, name) VALUES (?1, ?2, ?3)")?;
    for t in &data.types {
        stmt.execute(params![t.id, t.object_id, t.name])?;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO type_members (type_id, part_kind_id, multiplier) VALUES (?1, ?2, ?3)",
    )?;
    for m in &data.type_members {
        stmt.execute(params![m.type_id, m.part_kind_id, m.multiplier])?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO distributions (id, name, created_at) VALUES (?1, ?2, ?3)")?;
    for d in &data.distributions {
        stmt.execute(params![d.id, d.name, d.created_at])?;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO distribution_participants (distribution_id, participant_id, position)
         VALUES (?1, ?2, ?3)",
    )?;
    for r in &data.distribution_participants {
        stmt.execute(params![r.distribution_id, r.participant_id, r.position])?;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO selections (id, distribution_id, type_id, count) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for s in &data.selections {
        stmt.execute(params![s.id, s.distribution_id, s.type_id, s.count])?;
    }

    let mut stmt = conn.prepare(
        "INSERT INTO assignments (id, distribution_id, participant_id, part_kind_id, type_id, quantity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for a in &data.assignments {
        stmt.execute(params![
            a.id,
            a.distribution_id,
            a.participant_id,
            a.part_kind_id,
            a.type_id,
            a.quantity
        ])?;
    }

    Ok(())
}

/// Parse a dump, checking the envelope before the tables
pub fn parse_dump(contents: &str) -> Result<LedgerDump, LedgerError> {
    let value: serde_json::Value = serde_json::from_str(contents)
        .map_err(|e| LedgerError::Backup(format!("not valid JSON: {}", e)))?;

    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| LedgerError::Backup("missing 'version'".to_string()))?;
    if version != u64::from(DUMP_VERSION) {
        return Err(LedgerError::Backup(format!(
            "unsupported version {} (expected {})",
            version, DUMP_VERSION
        )));
    }
    if !value.get("data").is_some_and(|d| d.is_object()) {
        return Err(LedgerError::Backup("missing 'data'".to_string()));
    }

    serde_json::from_value(value).map_err(|e| LedgerError::Backup(e.to_string()))
}

impl Ledger {
    /// Snapshot every table
    pub fn export_dump(&self) -> Result<LedgerDump, LedgerError> {
        Ok(LedgerDump {
            version: DUMP_VERSION,
            exported_at: Utc::now().to_rfc3339(),
            data: read_tables(&self.conn)?,
        })
    }

    /// Write a pretty-printed dump to `path`
    pub fn export_to(&self, path: &Path) -> Result<LedgerDump, LedgerError> {
        let dump = self.export_dump()?;
        let json =
            serde_json::to_string_pretty(&dump).map_err(|e| LedgerError::Backup(e.to_string()))?;
        fs::write(path, json).map_err(|e| LedgerError::Io(format!("{}: {}", path.display(), e)))?;
        info!(
            "event=backup_export module=ledger status=ok rows={}",
            dump.data.row_count()
        );
        Ok(dump)
    }

    /// Replace the ledger contents with a dump
    pub fn import_dump(&mut self, dump: &LedgerDump) -> Result<usize, LedgerError> {
        if dump.version != DUMP_VERSION {
            return Err(LedgerError::Backup(format!(
                "unsupported version {} (expected {})",
                dump.version, DUMP_VERSION
            )));
        }
        let tx = self.conn.transaction()?;
        write_tables(&tx, &dump.data)?;
        tx.commit()?;

        let rows = dump.data.row_count();
        info!("event=backup_import module=ledger status=ok rows={}", rows);
        Ok(rows)
    }

    /// Read a dump file and import it
    pub fn import_from(&mut self, path: &Path) -> Result<usize, LedgerError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LedgerError::Io(format!("{}: {}", path.display(), e)))?;
        let dump = parse_dump(&contents)?;
        self.import_dump(&dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::ParticipantId;
    use crate::core::policy::Policy;
    use crate::ledger::distributions::DistributionDraft;
    use crate::ledger::{NewParticipant, ObjectDefinition, PartDefinition, Selection, TypeDefinition};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn populated() -> Ledger {
        let mut ledger = Ledger::open_in_memory().unwrap();
        ledger
            .add_participant(&NewParticipant::named("Ada", "Lovelace"))
            .unwrap();
        ledger
            .add_participant(&NewParticipant::named("Grace", "Hopper"))
            .unwrap();
        let object = ledger
            .add_object(&ObjectDefinition {
                name: "Books".to_string(),
                parts: vec![PartDefinition {
                    name: "Novel".to_string(),
                }],
                types: vec![TypeDefinition {
                    name: "Box".to_string(),
                    quantities: [("Novel".to_string(), 3)].into_iter().collect(),
                }],
            })
            .unwrap();
        ledger
            .create_distribution(
                &DistributionDraft {
                    name: "Winter".to_string(),
                    participants: vec![ParticipantId(1), ParticipantId(2)],
                    selections: vec![Selection {
                        type_id: object.types[0].id,
                        count: 1,
                    }],
                    policy: Policy::default(),
                },
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        ledger
    }

    #[test]
    fn test_export_then_import_restores_tables() {
        let source = populated();
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("backup.json");
        let dump = source.export_to(&path).unwrap();
        assert_eq!(dump.data.participants.len(), 2);
        assert_eq!(dump.data.assignments.iter().map(|a| a.quantity).sum::<i64>(), 3);

        let mut target = Ledger::open_in_memory().unwrap();
        target
            .add_participant(&NewParticipant::named("Stale", ""))
            .unwrap();
        let rows = target.import_from(&path).unwrap();
        assert_eq!(rows, dump.data.row_count());
        assert_eq!(target.export_dump().unwrap().data, dump.data);
    }

    #[test]
    fn test_parse_dump_checks_envelope() {
        assert!(matches!(parse_dump("not json"), Err(LedgerError::Backup(_))));
        assert!(matches!(
            parse_dump(r#"{"data": {}}"#),
            Err(LedgerError::Backup(_))
        ));
        assert!(matches!(
            parse_dump(r#"{"version": 2, "data": {}}"#),
            Err(LedgerError::Backup(_))
        ));
        assert!(matches!(
            parse_dump(r#"{"version": 1}"#),
            Err(LedgerError::Backup(_))
        ));
    }

    #[test]
    fn test_broken_dump_leaves_ledger_untouched() {
        let mut ledger = populated();
        let mut dump = ledger.export_dump().unwrap();
        // Assignment pointing at a participant that is not in the dump
        dump.data.assignments[0].participant_id = 99;

        assert!(ledger.import_dump(&dump).is_err());
        assert_eq!(ledger.list_participants().unwrap().len(), 2);
        assert_eq!(ledger.list_distributions().unwrap().len(), 1);
    }
}
