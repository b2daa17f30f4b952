//! kitshare: fair distribution of shared kits
//!
//! Participants receive the parts of requested kits one unit at a time. A
//! persistent SQLite ledger records every assignment, so each run balances
//! against everything distributed before it.

pub mod cli;
pub mod core;
pub mod engine;
pub mod ledger;
