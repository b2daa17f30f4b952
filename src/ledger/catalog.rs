//! Catalog records: objects, part kinds, types and type membership
//!
//! The catalog is written only through object definitions. Editing an object
//! keeps the ids of parts and types whose names survive, so the assignment
//! history stays attached to them.

use std::collections::{BTreeSet, HashMap};

use log::info;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{
    now_timestamp, parse_datetime, CatalogObject, KitType, Ledger, LedgerError, ObjectDefinition,
    PartKind, TypeMember,
};
use crate::core::identity::{KitTypeId, ObjectId, PartKindId, RecordKind};

/// Validate names and multipliers of a definition before touching the database
fn validate(def: &ObjectDefinition) -> Result<(), LedgerError> {
    if def.name.trim().is_empty() {
        return Err(LedgerError::Invalid("object name must not be empty".to_string()));
    }

    let mut part_names = BTreeSet::new();
    for part in &def.parts {
        let name = part.name.trim();
        if name.is_empty() {
            return Err(LedgerError::Invalid(format!(
                "object '{}' has a part without a name",
                def.name
            )));
        }
        if !part_names.insert(name) {
            return Err(LedgerError::Invalid(format!("duplicate part name '{}'", name)));
        }
    }

    let mut type_names = BTreeSet::new();
    for kit in &def.types {
        let name = kit.name.trim();
        if name.is_empty() {
            return Err(LedgerError::Invalid(format!(
                "object '{}' has a type without a name",
                def.name
            )));
        }
        if !type_names.insert(name) {
            return Err(LedgerError::Invalid(format!("duplicate type name '{}'", name)));
        }
        for (part, quantity) in &kit.quantities {
            if !part_names.contains(part.trim()) {
                return Err(LedgerError::Invalid(format!(
                    "type '{}' references unknown part '{}'",
                    name, part
                )));
            }
            if *quantity > i64::from(u32::MAX) {
                return Err(LedgerError::Invalid(format!(
                    "multiplier {} for part '{}' in type '{}' is too large",
                    quantity, part, name
                )));
            }
        }
    }
    Ok(())
}

/// Rows referencing a part kind from the assignment history
fn part_references(conn: &Connection, id: PartKindId) -> Result<u64, LedgerError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assignments WHERE part_kind_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Rows referencing a type from selections or the assignment history
fn type_references(conn: &Connection, id: KitTypeId) -> Result<u64, LedgerError> {
    let n: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM selections WHERE type_id = ?1)
              + (SELECT COUNT(*) FROM assignments WHERE type_id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Insert or reconcile parts, types and memberships of `object_id` from `def`
fn write_definition(
    tx: &Transaction<'_>,
    object_id: ObjectId,
    def: &ObjectDefinition,
) -> Result<(), LedgerError> {
    // Parts: keep surviving names, add new ones, drop the rest
    let mut part_ids: HashMap<String, PartKindId> = HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT id, name FROM part_kinds WHERE object_id = ?1")?;
        let rows = stmt.query_map(params![object_id], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, PartKindId>(0)?))
        })?;
        for row in rows {
            let (name, id) = row?;
            part_ids.insert(name, id);
        }
    }
    let wanted: BTreeSet<&str> = def.parts.iter().map(|p| p.name.trim()).collect();
    for (name, id) in part_ids.clone() {
        if !wanted.contains(name.as_str()) {
            let references = part_references(tx, id)?;
            if references > 0 {
                return Err(LedgerError::InUse {
                    kind: RecordKind::PartKind,
                    id: id.get(),
                    references,
                });
            }
            tx.execute("DELETE FROM part_kinds WHERE id = ?1", params![id])?;
            part_ids.remove(&name);
        }
    }
    for part in &def.parts {
        let name = part.name.trim();
        if !part_ids.contains_key(name) {
            tx.execute(
                "INSERT INTO part_kinds (object_id, name) VALUES (?1, ?2)",
                params![object_id, name],
            )?;
            part_ids.insert(name.to_string(), PartKindId(tx.last_insert_rowid()));
        }
    }

    // Types: same reconciliation by name
    let mut type_ids: HashMap<String, KitTypeId> = HashMap::new();
    {
        let mut stmt = tx.prepare("SELECT id, name FROM kit_types WHERE object_id = ?1")?;
        let rows = stmt.query_map(params![object_id], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, KitTypeId>(0)?))
        })?;
        for row in rows {
            let (name, id) = row?;
            type_ids.insert(name, id);
        }
    }
    let wanted: BTreeSet<&str> = def.types.iter().map(|t| t.name.trim()).collect();
    for (name, id) in type_ids.clone() {
        if !wanted.contains(name.as_str()) {
            let references = type_references(tx, id)?;
            if references > 0 {
                return Err(LedgerError::InUse {
                    kind: RecordKind::KitType,
                    id: id.get(),
                    references,
                });
            }
            tx.execute("DELETE FROM kit_types WHERE id = ?1", params![id])?;
            type_ids.remove(&name);
        }
    }

    for kit in &def.types {
        let name = kit.name.trim();
        let type_id = match type_ids.get(name) {
            Some(id) => *id,
            None => {
                tx.execute(
                    "INSERT INTO kit_types (object_id, name) VALUES (?1, ?2)",
                    params![object_id, name],
                )?;
                let id = KitTypeId(tx.last_insert_rowid());
                type_ids.insert(name.to_string(), id);
                id
            }
        };

        tx.execute("DELETE FROM type_members WHERE type_id = ?1", params![type_id])?;
        for (part, quantity) in &kit.quantities {
            if *quantity <= 0 {
                continue;
            }
            let part_id = part_ids
                .get(part.trim())
                .copied()
                .ok_or_else(|| LedgerError::Invalid(format!("unknown part '{}'", part)))?;
            tx.execute(
                "INSERT INTO type_members (type_id, part_kind_id, multiplier) VALUES (?1, ?2, ?3)",
                params![type_id, part_id, quantity],
            )?;
        }
    }

    Ok(())
}

/// Members of a type ordered by part kind id; `None` when the type does not exist
pub(super) fn type_members(
    conn: &Connection,
    type_id: KitTypeId,
) -> Result<Option<Vec<TypeMember>>, LedgerError> {
    let exists = conn
        .prepare("SELECT 1 FROM kit_types WHERE id = ?1")?
        .exists(params![type_id])?;
    if !exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT part_kind_id, multiplier FROM type_members
         WHERE type_id = ?1 ORDER BY part_kind_id ASC",
    )?;
    let rows = stmt.query_map(params![type_id], |row| {
        Ok(TypeMember {
            part_kind_id: row.get(0)?,
            multiplier: row.get(1)?,
        })
    })?;
    Ok(Some(rows.collect::<rusqlite::Result<Vec<_>>>()?))
}

impl Ledger {
    /// Create an object with its parts and types
    pub fn add_object(&mut self, def: &ObjectDefinition) -> Result<CatalogObject, LedgerError> {
        validate(def)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO objects (name, created_at) VALUES (?1, ?2)",
            params![def.name.trim(), now_timestamp()],
        )?;
        let id = ObjectId(tx.last_insert_rowid());
        write_definition(&tx, id, def)?;
        tx.commit()?;

        info!(
            "event=object_add module=ledger status=ok object_id={} parts={} types={}",
            id,
            def.parts.len(),
            def.types.len()
        );
        self.get_object(id)
    }

    /// Replace an object's name, parts and types
    ///
    /// Parts and types are matched by name. Removing one that the history
    /// references fails with [`LedgerError::InUse`] and changes nothing.
    pub fn replace_object(
        &mut self,
        id: ObjectId,
        def: &ObjectDefinition,
    ) -> Result<CatalogObject, LedgerError> {
        validate(def)?;
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE objects SET name = ?1 WHERE id = ?2",
            params![def.name.trim(), id],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(RecordKind::Object, id.get()));
        }
        write_definition(&tx, id, def)?;
        tx.commit()?;

        info!("event=object_edit module=ledger status=ok object_id={}", id);
        self.get_object(id)
    }

    /// Delete an object whose parts and types nothing references
    pub fn remove_object(&mut self, id: ObjectId) -> Result<(), LedgerError> {
        let object = self.get_object(id)?;
        for part in &object.parts {
            let references = part_references(&self.conn, part.id)?;
            if references > 0 {
                return Err(LedgerError::InUse {
                    kind: RecordKind::PartKind,
                    id: part.id.get(),
                    references,
                });
            }
        }
        for kit in &object.types {
            let references = type_references(&self.conn, kit.id)?;
            if references > 0 {
                return Err(LedgerError::InUse {
                    kind: RecordKind::KitType,
                    id: kit.id.get(),
                    references,
                });
            }
        }
        self.conn
            .execute("DELETE FROM objects WHERE id = ?1", params![id])?;
        info!("event=object_remove module=ledger status=ok object_id={}", id);
        Ok(())
    }

    /// Get an object with its parts and types
    pub fn get_object(&self, id: ObjectId) -> Result<CatalogObject, LedgerError> {
        let (name, created_at) = self
            .conn
            .query_row(
                "SELECT name, created_at FROM objects WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(RecordKind::Object, id.get()))?;

        let parts = {
            let mut stmt = self.conn.prepare(
                "SELECT id, object_id, name FROM part_kinds WHERE object_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(PartKind {
                    id: row.get(0)?,
                    object_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let type_ids: Vec<KitTypeId> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM kit_types WHERE object_id = ?1 ORDER BY id ASC")?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let types = type_ids
            .into_iter()
            .map(|type_id| self.get_kit_type(type_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CatalogObject {
            id,
            name,
            created_at: parse_datetime(created_at),
            parts,
            types,
        })
    }

    /// All objects ordered by id
    pub fn list_objects(&self) -> Result<Vec<CatalogObject>, LedgerError> {
        let ids: Vec<ObjectId> = {
            let mut stmt = self.conn.prepare("SELECT id FROM objects ORDER BY id ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        ids.into_iter().map(|id| self.get_object(id)).collect()
    }

    /// Get a type with its members
    pub fn get_kit_type(&self, id: KitTypeId) -> Result<KitType, LedgerError> {
        let (object_id, name) = self
            .conn
            .query_row(
                "SELECT object_id, name FROM kit_types WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .ok_or_else(|| LedgerError::not_found(RecordKind::KitType, id.get()))?;
        let members = type_members(&self.conn, id)?.unwrap_or_default();
        Ok(KitType {
            id,
            object_id,
            name,
            members,
        })
    }

    /// Find a type by id or by `Object/Type` name
    pub fn resolve_kit_type(&self, reference: &str) -> Result<KitType, LedgerError> {
        if let Ok(id) = reference.parse::<KitTypeId>() {
            return self.get_kit_type(id);
        }

        let (object_name, type_name) = reference.split_once('/').ok_or_else(|| {
            LedgerError::Invalid(format!(
                "type reference '{}' is neither an id nor 'Object/Type'",
                reference
            ))
        })?;
        let id: KitTypeId = self
            .conn
            .query_row(
                "SELECT t.id FROM kit_types t JOIN objects o ON t.object_id = o.id
                 WHERE o.name = ?1 AND t.name = ?2 ORDER BY t.id LIMIT 1",
                params![object_name.trim(), type_name.trim()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                LedgerError::Invalid(format!("no type named '{}'", reference))
            })?;
        self.get_kit_type(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{PartDefinition, TypeDefinition};

    pub(crate) fn first_aid() -> ObjectDefinition {
        ObjectDefinition {
            name: "First aid".to_string(),
            parts: vec![
                PartDefinition { name: "Bandage".to_string() },
                PartDefinition { name: "Gloves".to_string() },
                PartDefinition { name: "Scissors".to_string() },
            ],
            types: vec![
                TypeDefinition {
                    name: "Small".to_string(),
                    quantities: [("Bandage".to_string(), 2), ("Gloves".to_string(), 1)]
                        .into_iter()
                        .collect(),
                },
                TypeDefinition {
                    name: "Large".to_string(),
                    quantities: [
                        ("Bandage".to_string(), 4),
                        ("Gloves".to_string(), 2),
                        ("Scissors".to_string(), 0),
                    ]
                    .into_iter()
                    .collect(),
                },
            ],
        }
    }

    #[test]
    fn test_add_object_creates_parts_and_types() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let object = ledger.add_object(&first_aid()).unwrap();
        assert_eq!(object.parts.len(), 3);
        assert_eq!(object.types.len(), 2);

        let small = &object.types[0];
        assert_eq!(small.name, "Small");
        assert_eq!(small.units_per_kit(), 3);

        // Zero multipliers produce no membership row
        let large = &object.types[1];
        assert_eq!(large.members.len(), 2);
        assert_eq!(large.units_per_kit(), 6);
    }

    #[test]
    fn test_add_object_rejects_unknown_part() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let mut def = first_aid();
        def.types[0].quantities.insert("Tape".to_string(), 1);
        let err = ledger.add_object(&def).unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(_)));
        assert!(ledger.list_objects().unwrap().is_empty());
    }

    #[test]
    fn test_add_object_rejects_duplicate_part() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let mut def = first_aid();
        def.parts.push(PartDefinition { name: "Gloves".to_string() });
        assert!(matches!(ledger.add_object(&def), Err(LedgerError::Invalid(_))));
    }

    #[test]
    fn test_replace_object_keeps_surviving_ids() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let object = ledger.add_object(&first_aid()).unwrap();
        let bandage = object.parts[0].id;
        let small = object.types[0].id;

        let mut def = first_aid();
        def.name = "First aid v2".to_string();
        def.parts.retain(|p| p.name != "Scissors");
        def.types.retain(|t| t.name == "Small");
        def.types[0].quantities.insert("Bandage".to_string(), 5);

        let updated = ledger.replace_object(object.id, &def).unwrap();
        assert_eq!(updated.name, "First aid v2");
        assert_eq!(updated.parts.len(), 2);
        assert_eq!(updated.parts[0].id, bandage);
        assert_eq!(updated.types.len(), 1);
        assert_eq!(updated.types[0].id, small);
        assert_eq!(updated.types[0].units_per_kit(), 6);
    }

    #[test]
    fn test_type_members_unknown_type() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert!(type_members(ledger.connection(), KitTypeId(4)).unwrap().is_none());
    }

    #[test]
    fn test_resolve_kit_type_by_name() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let object = ledger.add_object(&first_aid()).unwrap();
        let kit = ledger.resolve_kit_type("First aid/Large").unwrap();
        assert_eq!(kit.id, object.types[1].id);
        let kit = ledger.resolve_kit_type(&format!("T{}", object.types[0].id)).unwrap();
        assert_eq!(kit.name, "Small");
        assert!(ledger.resolve_kit_type("First aid/Huge").is_err());
    }

    #[test]
    fn test_remove_object_cascades_catalog() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let object = ledger.add_object(&first_aid()).unwrap();
        ledger.remove_object(object.id).unwrap();
        let parts: i64 = ledger
            .connection()
            .query_row("SELECT COUNT(*) FROM part_kinds", [], |row| row.get(0))
            .unwrap();
        assert_eq!(parts, 0);
        assert!(matches!(
            ledger.get_object(object.id),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stored_object_as_definition() {
        let mut ledger = Ledger::open_in_memory().unwrap();
        let object = ledger.add_object(&first_aid()).unwrap();
        let def = ObjectDefinition::from(&object);
        assert_eq!(def.name, "First aid");
        assert_eq!(def.parts.len(), 3);
        assert_eq!(def.types[0], first_aid().types[0]);
        // Zero multipliers were never stored
        assert!(!def.types[1].quantities.contains_key("Scissors"));

        let replaced = ledger.replace_object(object.id, &def).unwrap();
        assert_eq!(replaced, object);
    }
}
