//! Ledger record types
//!
//! All structs read from or written to the ledger tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{DistributionId, KitTypeId, ObjectId, ParticipantId, PartKindId};

// =========================================================================
// Participants
// =========================================================================

/// A person who receives parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    /// "First Last" for display
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields for creating or editing a participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl NewParticipant {
    pub fn named(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Self::default()
        }
    }
}

// =========================================================================
// Catalog
// =========================================================================

/// An atomic distributable item type declared on an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartKind {
    pub id: PartKindId,
    pub object_id: ObjectId,
    pub name: String,
}

/// A part kind's membership in a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMember {
    pub part_kind_id: PartKindId,
    /// Units of this part kind per requested kit
    pub multiplier: u32,
}

/// A named kit composed of part kinds with per-kit multipliers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitType {
    pub id: KitTypeId,
    pub object_id: ObjectId,
    pub name: String,
    /// Members ordered by part kind id
    pub members: Vec<TypeMember>,
}

impl KitType {
    /// Units produced by one kit of this type
    pub fn units_per_kit(&self) -> u64 {
        self.members.iter().map(|m| u64::from(m.multiplier)).sum()
    }
}

/// An object with its part kinds and types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    pub id: ObjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub parts: Vec<PartKind>,
    pub types: Vec<KitType>,
}

impl CatalogObject {
    /// Name of a part kind of this object
    pub fn part_name(&self, id: PartKindId) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
    }
}

/// YAML definition of an object, as accepted by `object add --file`
///
/// ```yaml
/// name: First aid kit
/// parts:
///   - name: Bandage
///   - name: Gloves
/// types:
///   - name: Small
///     quantities:
///       Bandage: 2
///       Gloves: 1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub name: String,
    #[serde(default)]
    pub parts: Vec<PartDefinition>,
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

impl From<&CatalogObject> for ObjectDefinition {
    /// Editable definition of a stored object
    fn from(object: &CatalogObject) -> Self {
        let types = object
            .types
            .iter()
            .map(|kit| TypeDefinition {
                name: kit.name.clone(),
                quantities: kit
                    .members
                    .iter()
                    .filter_map(|m| {
                        object
                            .part_name(m.part_kind_id)
                            .map(|name| (name.to_string(), i64::from(m.multiplier)))
                    })
                    .collect(),
            })
            .collect();
        Self {
            name: object.name.clone(),
            parts: object
                .parts
                .iter()
                .map(|p| PartDefinition {
                    name: p.name.clone(),
                })
                .collect(),
            types,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDefinition {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    /// Part name -> multiplier; entries <= 0 are skipped
    #[serde(default)]
    pub quantities: BTreeMap<String, i64>,
}

// =========================================================================
// Distributions
// =========================================================================

/// A caller request for `count` kits of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub type_id: KitTypeId,
    pub count: u32,
}

/// One allocation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: DistributionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Invited participants in visiting order
    pub participants: Vec<ParticipantId>,
    pub selections: Vec<Selection>,
}

/// Row of `distribution list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionSummary {
    pub id: DistributionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub participant_count: u64,
    pub unit_count: u64,
}

/// Persisted assignment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub distribution_id: DistributionId,
    pub participant_id: ParticipantId,
    pub part_kind_id: PartKindId,
    pub type_id: KitTypeId,
    pub quantity: u32,
}

/// Assignment joined with display names, for recaps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentDetail {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub object_name: String,
    pub type_name: String,
    pub part_kind_id: PartKindId,
    pub part_name: String,
    pub quantity: u32,
}
