//! Core module - fundamental types and utilities

pub mod config;
pub mod identity;
pub mod logging;
pub mod policy;
pub mod project;

pub use config::{Config, ConfigError};
pub use identity::{
    DistributionId, IdParseError, KitTypeId, ObjectId, ParticipantId, PartKindId, RecordKind,
};
pub use logging::{init_logging, logging_status};
pub use policy::{Policy, PolicyError, PolicyKind};
pub use project::{Project, ProjectError};
