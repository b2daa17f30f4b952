//! CLI command implementations

pub mod backup;
pub mod completions;
pub mod config;
pub mod distribution;
pub mod init;
pub mod object;
pub mod participant;
pub mod stats;
