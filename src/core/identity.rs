//! Record identity: typed integer ids for every ledger table

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kinds of records that carry an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Participant,
    Object,
    PartKind,
    KitType,
    Distribution,
}

impl RecordKind {
    /// Get the display name used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Participant => "participant",
            RecordKind::Object => "object",
            RecordKind::PartKind => "part kind",
            RecordKind::KitType => "type",
            RecordKind::Distribution => "distribution",
        }
    }

    /// Short prefix accepted in front of ids on the command line (e.g. `P3`)
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::Participant => "P",
            RecordKind::Object => "O",
            RecordKind::PartKind => "K",
            RecordKind::KitType => "T",
            RecordKind::Distribution => "D",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur when parsing record ids
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid {kind} id: '{input}' (expected a positive integer, optionally prefixed with '{prefix}')")]
    Invalid {
        kind: RecordKind,
        prefix: &'static str,
        input: String,
    },
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const KIND: RecordKind = $kind;

            /// Raw database value
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let kind = Self::KIND;
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix(kind.prefix())
                    .or_else(|| trimmed.strip_prefix(&kind.prefix().to_lowercase()))
                    .unwrap_or(trimmed);
                match digits.parse::<i64>() {
                    Ok(n) if n > 0 => Ok(Self(n)),
                    _ => Err(IdParseError::Invalid {
                        kind,
                        prefix: kind.prefix(),
                        input: s.to_string(),
                    }),
                }
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

record_id!(
    /// Identifies a participant (a person who receives parts)
    ParticipantId,
    RecordKind::Participant
);
record_id!(
    /// Identifies an object (organizational grouping of parts and types)
    ObjectId,
    RecordKind::Object
);
record_id!(
    /// Identifies a part kind, the atomic distributable item type
    PartKindId,
    RecordKind::PartKind
);
record_id!(
    /// Identifies a kit type (named grouping of part kinds with multipliers)
    KitTypeId,
    RecordKind::KitType
);
record_id!(
    /// Identifies one distribution run
    DistributionId,
    RecordKind::Distribution
);
