//! Ledger-wide statistics

use serde::Serialize;

use super::{Ledger, LedgerError};
use crate::core::identity::ParticipantId;

/// One participant's slice of everything distributed so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantShare {
    pub participant_id: ParticipantId,
    pub name: String,
    pub units: u64,
    /// Distributions the participant was invited to
    pub participated: u64,
    /// Percentage of all distributed units
    pub share_percent: f64,
    /// Percentage of all distributions the participant was invited to
    pub participation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStatistics {
    pub distributions: u64,
    pub total_units: u64,
    /// Distinct participants invited to at least one distribution
    pub unique_participants: u64,
    pub equity_index: f64,
    pub shares: Vec<ParticipantShare>,
}

/// Equity of a set of totals on a 0-100 scale
///
/// `100 - coefficient of variation × 100` using the population standard
/// deviation, clamped to `[0, 100]` and rounded to one decimal. A zero mean
/// (including no totals at all) scores 100.
pub fn equity_index(totals: &[u64]) -> f64 {
    if totals.is_empty() {
        return 100.0;
    }
    let n = totals.len() as f64;
    let mean = totals.iter().map(|v| *v as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return 100.0;
    }
    let variance = totals
        .iter()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let index = 100.0 - (variance.sqrt() / mean) * 100.0;
    round1(index).clamp(0.0, 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

impl Ledger {
    /// Compute statistics over every participant and distribution
    pub fn statistics(&self) -> Result<LedgerStatistics, LedgerError> {
        let distributions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM distributions", [], |row| row.get(0))?;
        let total_units: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM assignments",
            [],
            |row| row.get(0),
        )?;
        let unique_participants: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT participant_id) FROM distribution_participants",
            [],
            |row| row.get(0),
        )?;
        let (distributions, total_units) = (distributions as u64, total_units as u64);

        let mut stmt = self.conn.prepare(
            "SELECT p.id, TRIM(p.first_name || ' ' || p.last_name),
                    (SELECT COALESCE(SUM(a.quantity), 0) FROM assignments a WHERE a.participant_id = p.id),
                    (SELECT COUNT(*) FROM distribution_participants dp WHERE dp.participant_id = p.id)
             FROM participants p
             ORDER BY p.id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, ParticipantId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
            ))
        })?;

        let mut shares = Vec::new();
        for row in rows {
            let (participant_id, name, units, participated) = row?;
            shares.push(ParticipantShare {
                participant_id,
                name,
                units,
                participated,
                share_percent: percent(units, total_units),
                participation_rate: percent(participated, distributions),
            });
        }

        let totals: Vec<u64> = shares.iter().map(|s| s.units).collect();
        Ok(LedgerStatistics {
            distributions,
            total_units,
            unique_participants: unique_participants as u64,
            equity_index: equity_index(&totals),
            shares,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NewParticipant;

    #[test]
    fn test_equity_index_even_totals() {
        assert_eq!(equity_index(&[4, 4, 4]), 100.0);
        assert_eq!(equity_index(&[]), 100.0);
        assert_eq!(equity_index(&[0, 0]), 100.0);
    }

    #[test]
    fn test_equity_index_uneven_totals() {
        // mean 2, population stddev 2 -> 0
        assert_eq!(equity_index(&[0, 4]), 0.0);
        // mean 3, stddev 1 -> 66.666.. -> 66.7
        assert_eq!(equity_index(&[2, 4]), 66.7);
        // clamped at 0
        assert_eq!(equity_index(&[0, 0, 0, 9]), 0.0);
    }

    #[test]
    fn test_statistics_empty_ledger() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .add_participant(&NewParticipant::named("Ada", ""))
            .unwrap();
        let stats = ledger.statistics().unwrap();
        assert_eq!(stats.distributions, 0);
        assert_eq!(stats.total_units, 0);
        assert_eq!(stats.equity_index, 100.0);
        assert_eq!(stats.shares.len(), 1);
        assert_eq!(stats.shares[0].share_percent, 0.0);
    }
}
