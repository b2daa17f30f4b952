//! `kitshare stats` command - Distribution statistics and equity

use console::style;
use miette::Result;

use crate::cli::helpers::{print_structured, Session};
use crate::cli::table::{markdown_table, CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(clap::Args, Debug)]
pub struct StatsArgs {
    /// Only show the summary, not the per-participant table
    #[arg(long)]
    pub summary: bool,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "NAME", 32),
    ColumnDef::new("units", "UNITS", 8),
    ColumnDef::new("share", "SHARE", 8),
    ColumnDef::new("participated", "RUNS", 6),
    ColumnDef::new("rate", "RATE", 8),
];

pub fn run(args: StatsArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let stats = session.ledger.statistics()?;

    if print_structured(&stats, session.format)? {
        return Ok(());
    }

    if session.format != OutputFormat::Auto {
        let rows = stats.shares.iter().map(|s| {
            TableRow::new(s.participant_id.get())
                .cell("name", CellValue::Text(s.name.clone()))
                .cell("units", CellValue::Number(s.units))
                .cell("share", CellValue::Percent(s.share_percent))
                .cell("participated", CellValue::Number(s.participated))
                .cell("rate", CellValue::Percent(s.participation_rate))
        });
        return TableFormatter::new(COLUMNS, "participant")
            .without_summary()
            .output(rows, session.format);
    }

    let equity = if stats.equity_index >= 80.0 {
        style(format!("{:.1}", stats.equity_index)).green()
    } else if stats.equity_index >= 50.0 {
        style(format!("{:.1}", stats.equity_index)).yellow()
    } else {
        style(format!("{:.1}", stats.equity_index)).red()
    };

    println!("{}", style("Distribution statistics").bold());
    println!();
    println!(
        "{}",
        markdown_table(
            &["Metric", "Value"],
            vec![
                vec!["Distributions".to_string(), stats.distributions.to_string()],
                vec!["Units distributed".to_string(), stats.total_units.to_string()],
                vec![
                    "Participants served".to_string(),
                    stats.unique_participants.to_string(),
                ],
            ],
        )
    );
    println!();
    println!("{} {} / 100", style("Equity index:").bold(), equity);

    if args.summary || stats.shares.is_empty() {
        return Ok(());
    }

    println!();
    let records = stats.shares.iter().map(|s| {
        vec![
            s.participant_id.to_string(),
            s.name.clone(),
            s.units.to_string(),
            format!("{:.1}%", s.share_percent),
            s.participated.to_string(),
            format!("{:.1}%", s.participation_rate),
        ]
    });
    println!(
        "{}",
        markdown_table(
            &["ID", "Participant", "Units", "Share", "Runs", "Participation"],
            records
        )
    );
    Ok(())
}
