//! Database schema initialization

use rusqlite::params;

use super::{Ledger, LedgerError, SCHEMA_VERSION};

impl Ledger {
    /// Initialize database schema
    pub(super) fn init_schema(&mut self) -> Result<(), LedgerError> {
        self.conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- People who receive parts
            CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            -- Organizational grouping of part kinds and types
            CREATE TABLE IF NOT EXISTS objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS part_kinds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE (object_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_part_kinds_object ON part_kinds(object_id);

            CREATE TABLE IF NOT EXISTS kit_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE (object_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_kit_types_object ON kit_types(object_id);

            -- Part kinds of a type with their per-kit multiplier
            CREATE TABLE IF NOT EXISTS type_members (
                type_id INTEGER NOT NULL REFERENCES kit_types(id) ON DELETE CASCADE,
                part_kind_id INTEGER NOT NULL REFERENCES part_kinds(id) ON DELETE CASCADE,
                multiplier INTEGER NOT NULL CHECK (multiplier > 0),
                PRIMARY KEY (type_id, part_kind_id)
            );

            -- One allocation run
            CREATE TABLE IF NOT EXISTS distributions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Invited participants, in the order the run visits them
            CREATE TABLE IF NOT EXISTS distribution_participants (
                distribution_id INTEGER NOT NULL REFERENCES distributions(id) ON DELETE CASCADE,
                participant_id INTEGER NOT NULL REFERENCES participants(id),
                position INTEGER NOT NULL,
                PRIMARY KEY (distribution_id, participant_id)
            );
            CREATE INDEX IF NOT EXISTS idx_distribution_participants_participant
                ON distribution_participants(participant_id);

            -- Requested kits
            CREATE TABLE IF NOT EXISTS selections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                distribution_id INTEGER NOT NULL REFERENCES distributions(id) ON DELETE CASCADE,
                type_id INTEGER NOT NULL REFERENCES kit_types(id),
                count INTEGER NOT NULL CHECK (count >= 0)
            );
            CREATE INDEX IF NOT EXISTS idx_selections_distribution ON selections(distribution_id);
            CREATE INDEX IF NOT EXISTS idx_selections_type ON selections(type_id);

            -- Assignment ledger: one row per (distribution, participant, part kind, type)
            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                distribution_id INTEGER NOT NULL REFERENCES distributions(id) ON DELETE CASCADE,
                participant_id INTEGER NOT NULL REFERENCES participants(id),
                part_kind_id INTEGER NOT NULL REFERENCES part_kinds(id),
                type_id INTEGER NOT NULL REFERENCES kit_types(id),
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                UNIQUE (distribution_id, participant_id, part_kind_id, type_id)
            );
            CREATE INDEX IF NOT EXISTS idx_assignments_participant ON assignments(participant_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_part_kind ON assignments(part_kind_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_type ON assignments(type_id);
            "#,
        )?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }
}
