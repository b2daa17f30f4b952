//! SQLite-backed ledger of participants, catalog, distributions and assignments
//!
//! The ledger is the only persistent state of a project. Unlike a cache it
//! cannot be rebuilt from anything else, so a schema version mismatch is an
//! error rather than a trigger to drop tables.
//!
//! Records referenced by the assignment history (participants, part kinds,
//! types) cannot be deleted while that history exists; cancelling a
//! distribution removes its selections, participant list and assignments.

mod assignments;
mod backup;
mod catalog;
mod distributions;
mod participants;
mod schema;
mod stats;
mod store;
mod types;

pub use backup::{parse_dump, LedgerDump, LedgerTables, DUMP_VERSION};
pub use distributions::DistributionDraft;
pub use stats::{equity_index, LedgerStatistics, ParticipantShare};
pub use store::SqliteStore;
pub use types::*;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use miette::Diagnostic;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::core::identity::RecordKind;
use crate::core::project::Project;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Errors raised by ledger operations
#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("database error: {0}")]
    #[diagnostic(code(kitshare::ledger::sqlite))]
    Sqlite(#[from] rusqlite::Error),

    #[error("{kind} {id} not found")]
    #[diagnostic(code(kitshare::ledger::not_found))]
    NotFound { kind: RecordKind, id: i64 },

    #[error("{kind} {id} is referenced by {references} ledger row(s)")]
    #[diagnostic(
        code(kitshare::ledger::in_use),
        help("cancel the distributions that reference it first")
    )]
    InUse {
        kind: RecordKind,
        id: i64,
        references: u64,
    },

    #[error("invalid input: {0}")]
    #[diagnostic(code(kitshare::ledger::invalid))]
    Invalid(String),

    #[error("ledger schema version {found} does not match supported version {expected}")]
    #[diagnostic(
        code(kitshare::ledger::schema),
        help("export the ledger with the kitshare version that created it, then import it here")
    )]
    SchemaMismatch { found: i32, expected: i32 },

    #[error("invalid backup: {0}")]
    #[diagnostic(code(kitshare::ledger::backup))]
    Backup(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl LedgerError {
    pub(crate) fn not_found(kind: RecordKind, id: i64) -> Self {
        LedgerError::NotFound { kind, id }
    }
}

/// The project ledger backed by SQLite
pub struct Ledger {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Ledger {
    /// Open or create the ledger of a project
    pub fn open(project: &Project) -> Result<Self, LedgerError> {
        Self::open_path(&project.ledger_path())
    }

    /// Open or create a ledger at an explicit path
    pub fn open_path(path: &Path) -> Result<Self, LedgerError> {
        let started_at = Instant::now();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        // WAL for concurrent readers while a run holds the write transaction
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let mut ledger = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        match ledger.bootstrap() {
            Ok(()) => {
                info!(
                    "event=ledger_open module=ledger status=ok mode=file duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(ledger)
            }
            Err(err) => {
                error!(
                    "event=ledger_open module=ledger status=error mode=file error={}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Open a fresh in-memory ledger
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let mut ledger = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        ledger.bootstrap()?;
        Ok(ledger)
    }

    fn bootstrap(&mut self) -> Result<(), LedgerError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.busy_timeout(Duration::from_secs(5))?;

        match self.schema_version()? {
            None => self.init_schema(),
            Some(found) if found == SCHEMA_VERSION => Ok(()),
            Some(found) => Err(LedgerError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            }),
        }
    }

    /// Stored schema version, `None` for a fresh database
    fn schema_version(&self) -> Result<Option<i32>, LedgerError> {
        let has_table: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;
        if !has_table {
            return Ok(None);
        }
        Ok(self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Location of the database file (`None` for in-memory ledgers)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read-only access to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Current time in the format stored in the ledger
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp, falling back to the epoch
pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// `?1, ?2, ... ?n` placeholder list for IN clauses
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert_eq!(ledger.schema_version().unwrap(), Some(SCHEMA_VERSION));
        assert!(ledger.path().is_none());
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ledger.db");
        {
            let ledger = Ledger::open_path(&path).unwrap();
            ledger
                .add_participant(&NewParticipant::named("Ada", "Lovelace"))
                .unwrap();
        }
        let ledger = Ledger::open_path(&path).unwrap();
        assert_eq!(ledger.list_participants().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_mismatch_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ledger.db");
        {
            let ledger = Ledger::open_path(&path).unwrap();
            ledger
                .connection()
                .execute("UPDATE schema_version SET version = 99", [])
                .unwrap();
        }
        let err = Ledger::open_path(&path).err().unwrap();
        assert!(matches!(
            err,
            LedgerError::SchemaMismatch {
                found: 99,
                expected: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
        assert_eq!(placeholders(1), "?1");
    }
}
