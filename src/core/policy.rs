//! Fairness policy selection for distribution runs

use clap::ValueEnum;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the Plan Builder decides how many units each participant receives
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Every unit goes to a uniformly random participant
    Random,
    /// Every unit goes to the participant with the lowest running total
    Less,
    /// Share rounds first, leftover units by lowest running total
    #[default]
    ShareLess,
    /// Share rounds first, leftover units at random
    ShareRandom,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Random => "random",
            PolicyKind::Less => "less",
            PolicyKind::ShareLess => "share_less",
            PolicyKind::ShareRandom => "share_random",
        }
    }

    /// Whether the policy starts with share rounds
    pub fn is_share(&self) -> bool {
        matches!(self, PolicyKind::ShareLess | PolicyKind::ShareRandom)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(PolicyKind::Random),
            "less" => Ok(PolicyKind::Less),
            "share_less" => Ok(PolicyKind::ShareLess),
            "share_random" => Ok(PolicyKind::ShareRandom),
            _ => Err(PolicyError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Errors raised while validating a policy
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown distribution policy: '{0}'")]
    #[diagnostic(
        code(kitshare::policy::unknown),
        help("valid policies: random, less, share_less, share_random")
    )]
    UnknownPolicy(String),

    #[error("share round count must not be negative (got {0})")]
    #[diagnostic(
        code(kitshare::policy::negative_count),
        help("use 0 to share as many rounds as the pool allows")
    )]
    NegativeCount(i64),
}

/// A validated policy: kind plus the share round limit
///
/// `rounds == 0` means "as many share rounds as the pool allows".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub kind: PolicyKind,
    pub rounds: u32,
}

impl Policy {
    /// Build a policy from raw caller values, rejecting negative counts
    pub fn new(kind: PolicyKind, count: i64) -> Result<Self, PolicyError> {
        if count < 0 {
            return Err(PolicyError::NegativeCount(count));
        }
        let rounds = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(Self { kind, rounds })
    }

    /// Parse a policy name and count as supplied by a caller
    pub fn parse(kind: &str, count: i64) -> Result<Self, PolicyError> {
        Self::new(kind.parse()?, count)
    }

    /// Number of share rounds to run for a pool of `pool_size` units
    ///
    /// Returns 0 for non-share policies and when there are no participants.
    pub fn share_rounds(&self, pool_size: usize, participants: usize) -> usize {
        if !self.kind.is_share() || participants == 0 {
            return 0;
        }
        let possible = pool_size / participants;
        if self.rounds == 0 {
            possible
        } else {
            possible.min(self.rounds as usize)
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_share() {
            if self.rounds == 0 {
                write!(f, "{} (max rounds)", self.kind)
            } else {
                write!(f, "{} ({} rounds)", self.kind, self.rounds)
            }
        } else {
            write!(f, "{}", self.kind)
        }
    }
}
