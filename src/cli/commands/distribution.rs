//! `kitshare distribution` command - Allocation runs and their recaps

use std::collections::{BTreeMap, HashMap};

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{build_rng, confirm, print_structured, success, truncate_str, Session};
use crate::cli::table::{markdown_table, CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::{DistributionId, KitTypeId, ParticipantId, PartKindId};
use crate::core::policy::{Policy, PolicyKind};
use crate::core::Config;
use crate::engine::AllocationReport;
use crate::ledger::{AssignmentDetail, Distribution, DistributionDraft, Ledger, Selection};

#[derive(Subcommand, Debug)]
pub enum DistributionCommands {
    /// Create a distribution and allocate its units
    Create(RunArgs),

    /// Show what a distribution would allocate without writing anything
    Preview(RunArgs),

    /// List distributions, most recent first
    List,

    /// Show the recap of a distribution
    Show(IdArgs),

    /// Delete a distribution with its selections and assignments
    Cancel(CancelArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Distribution name (default: "Distribution <date>")
    #[arg(long, short = 'n', default_value = "")]
    pub name: String,

    /// Participant ids in visiting order (comma separated)
    #[arg(
        long,
        short = 'p',
        value_delimiter = ',',
        required_unless_present = "all_participants"
    )]
    pub participants: Vec<ParticipantId>,

    /// Invite every registered participant, in id order
    #[arg(long, conflicts_with = "participants")]
    pub all_participants: bool,

    /// Kits to distribute as TYPE:COUNT, where TYPE is a type id or Object/Type
    #[arg(long, short = 's', value_name = "TYPE:COUNT")]
    pub select: Vec<String>,

    /// Policy (random, less, share_less, share_random); defaults to the configured one
    #[arg(long)]
    pub policy: Option<String>,

    /// Share rounds before the fallback policy (0 = as many as possible)
    #[arg(long, allow_hyphen_values = true)]
    pub count: Option<i64>,

    /// Seed for reproducible random choices
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct IdArgs {
    /// Distribution id (e.g. 4 or D4)
    pub id: DistributionId,
}

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Distribution id (e.g. 4 or D4)
    pub id: DistributionId,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

const LIST_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "NAME", 36),
    ColumnDef::new("created", "CREATED", 18),
    ColumnDef::new("participants", "PARTICIPANTS", 14),
    ColumnDef::new("units", "UNITS", 8),
];

const RECAP_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("participant", "PARTICIPANT", 28),
    ColumnDef::new("object", "OBJECT", 24),
    ColumnDef::new("type", "TYPE", 20),
    ColumnDef::new("part", "PART", 24),
    ColumnDef::new("quantity", "QTY", 6),
];

#[derive(Serialize)]
struct CreateOutput<'a> {
    distribution: &'a Distribution,
    report: &'a AllocationReport,
}

#[derive(Serialize)]
struct Recap {
    distribution: Distribution,
    assignments: Vec<AssignmentDetail>,
}

pub fn run(cmd: DistributionCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        DistributionCommands::Create(args) => run_create(args, global),
        DistributionCommands::Preview(args) => run_preview(args, global),
        DistributionCommands::List => run_list(global),
        DistributionCommands::Show(args) => run_show(args, global),
        DistributionCommands::Cancel(args) => run_cancel(args, global),
    }
}

/// Split `TYPE:COUNT` into the type reference and a non-negative count
fn parse_selection(input: &str) -> Result<(String, u32)> {
    let (reference, count) = input
        .rsplit_once(':')
        .ok_or_else(|| miette::miette!("invalid selection '{}': expected TYPE:COUNT", input))?;
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(miette::miette!("invalid selection '{}': missing type", input));
    }
    let count: i64 = count
        .trim()
        .parse()
        .map_err(|_| miette::miette!("invalid selection '{}': count is not a number", input))?;
    if count < 0 {
        return Err(miette::miette!(
            "invalid selection '{}': count must not be negative",
            input
        ));
    }
    let count = u32::try_from(count)
        .map_err(|_| miette::miette!("invalid selection '{}': count is too large", input))?;
    Ok((reference.to_string(), count))
}

/// Command-line policy and count, falling back to the configuration
fn resolve_policy(args: &RunArgs, config: &Config) -> Result<Policy> {
    let kind: PolicyKind = match (&args.policy, &config.algorithm.policy) {
        (Some(name), _) | (None, Some(name)) => name.parse()?,
        (None, None) => PolicyKind::default(),
    };
    let count = args.count.or(config.algorithm.count).unwrap_or(0);
    Ok(Policy::new(kind, count)?)
}

fn build_draft(args: &RunArgs, session: &Session) -> Result<DistributionDraft> {
    let participants = if args.all_participants {
        session
            .ledger
            .list_participants()?
            .into_iter()
            .map(|p| p.id)
            .collect()
    } else {
        args.participants.clone()
    };

    let mut selections = Vec::with_capacity(args.select.len());
    for input in &args.select {
        let (reference, count) = parse_selection(input)?;
        let kit = session.ledger.resolve_kit_type(&reference)?;
        selections.push(Selection {
            type_id: kit.id,
            count,
        });
    }

    Ok(DistributionDraft {
        name: args.name.clone(),
        participants,
        selections,
        policy: resolve_policy(args, &session.config)?,
    })
}

fn run_create(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let draft = build_draft(&args, &session)?;
    let mut rng = build_rng(args.seed.or(session.config.algorithm.seed));

    let (distribution, report) = session.ledger.create_distribution(&draft, &mut rng)?;

    if session.format == OutputFormat::Id {
        println!("{}", distribution.id);
        return Ok(());
    }
    let output = CreateOutput {
        distribution: &distribution,
        report: &report,
    };
    if print_structured(&output, session.format)? {
        return Ok(());
    }

    success(
        global,
        format_args!(
            "Created distribution {} {}: {} unit(s) to {} participant(s) with {}",
            style(distribution.id).cyan(),
            style(&distribution.name).yellow(),
            report.pool_size,
            distribution.participants.len(),
            style(report.policy.kind).green()
        ),
    );
    if !global.quiet {
        println!();
        print_recap(&session.ledger, &distribution)?;
    }
    Ok(())
}

fn run_preview(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let draft = build_draft(&args, &session)?;
    let mut rng = build_rng(args.seed.or(session.config.algorithm.seed));

    let report = session.ledger.preview_distribution(&draft, &mut rng)?;
    if print_structured(&report, session.format)? {
        return Ok(());
    }

    let names = participant_names(&session.ledger)?;
    let parts = part_names(&session.ledger)?;
    let history = session.ledger.historical_totals(&draft.participants)?;

    let mut received: HashMap<ParticipantId, BTreeMap<PartKindId, u32>> = HashMap::new();
    for pick in &report.picks {
        *received
            .entry(pick.participant_id)
            .or_default()
            .entry(pick.part_kind_id)
            .or_insert(0) += 1;
    }

    println!(
        "{} {} unit(s), {} participant(s), policy {}, {} share round(s)",
        style("Preview (nothing written):").bold(),
        report.pool_size,
        draft.participants.len(),
        style(report.policy.kind).green(),
        report.plan.share_rounds
    );
    println!();
    let records = draft.participants.iter().map(|participant| {
        let summary = received
            .get(participant)
            .map(|by_part| {
                by_part
                    .iter()
                    .map(|(part, n)| {
                        format!("{}× {}", n, parts.get(part).map_or("?", String::as_str))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        vec![
            participant.to_string(),
            names.get(participant).cloned().unwrap_or_default(),
            history.total(*participant).to_string(),
            report.plan.target(*participant).to_string(),
            summary,
        ]
    });
    println!(
        "{}",
        markdown_table(&["ID", "Participant", "History", "Units", "Parts"], records)
    );
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let distributions = session.ledger.list_distributions()?;

    if print_structured(&distributions, session.format)? {
        return Ok(());
    }
    if distributions.is_empty() && session.format == OutputFormat::Auto {
        if !global.quiet {
            println!("No distributions found.");
        }
        return Ok(());
    }

    let rows = distributions.iter().map(|d| {
        TableRow::new(d.id.get())
            .cell("name", CellValue::Text(d.name.clone()))
            .cell("created", CellValue::DateTime(d.created_at))
            .cell("participants", CellValue::Number(d.participant_count))
            .cell("units", CellValue::Number(d.unit_count))
    });
    let mut formatter = TableFormatter::new(LIST_COLUMNS, "distribution");
    if global.quiet {
        formatter = formatter.without_summary();
    }
    formatter.output(rows, session.format)
}

fn run_show(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let distribution = session.ledger.get_distribution(args.id)?;

    match session.format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let recap = Recap {
                assignments: session.ledger.assignment_details(distribution.id)?,
                distribution,
            };
            print_structured(&recap, session.format)?;
            Ok(())
        }
        OutputFormat::Id => {
            println!("{}", distribution.id);
            Ok(())
        }
        OutputFormat::Tsv | OutputFormat::Csv | OutputFormat::Md => {
            let details = session.ledger.assignment_details(distribution.id)?;
            let rows = details.into_iter().map(|a| {
                TableRow::new(a.participant_id.get())
                    .cell("participant", CellValue::Text(a.participant_name))
                    .cell("object", CellValue::Text(a.object_name))
                    .cell("type", CellValue::Text(a.type_name))
                    .cell("part", CellValue::Text(a.part_name))
                    .cell("quantity", CellValue::Number(u64::from(a.quantity)))
            });
            let formatter = TableFormatter::new(RECAP_COLUMNS, "assignment").without_summary();
            formatter.output(rows, session.format)
        }
        OutputFormat::Auto => print_recap(&session.ledger, &distribution),
    }
}

/// Header, per-assignment table and per-participant totals of a distribution
fn print_recap(ledger: &Ledger, distribution: &Distribution) -> Result<()> {
    let details = ledger.assignment_details(distribution.id)?;
    let names = participant_names(ledger)?;
    let types = type_names(ledger)?;

    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(distribution.id).cyan());
    println!(
        "{}: {}",
        style("Name").bold(),
        style(&distribution.name).yellow()
    );
    println!(
        "{}: {}",
        style("Created").bold(),
        distribution.created_at.format("%Y-%m-%d %H:%M")
    );
    let selections: Vec<String> = distribution
        .selections
        .iter()
        .map(|s| {
            format!(
                "{}× {}",
                s.count,
                types.get(&s.type_id).map_or("?", String::as_str)
            )
        })
        .collect();
    println!("{}: {}", style("Selections").bold(), selections.join(", "));
    println!(
        "{}: {}",
        style("Participants").bold(),
        distribution.participants.len()
    );
    println!("{}", style("─".repeat(60)).dim());

    if details.is_empty() {
        println!("{}", style("No units were assigned.").dim());
        return Ok(());
    }

    println!();
    let records = details.iter().map(|a| {
        vec![
            truncate_str(&a.participant_name, 28),
            a.object_name.clone(),
            a.type_name.clone(),
            a.part_name.clone(),
            a.quantity.to_string(),
        ]
    });
    println!(
        "{}",
        markdown_table(&["Participant", "Object", "Type", "Part", "Qty"], records)
    );

    let mut totals: HashMap<ParticipantId, u64> = HashMap::new();
    for a in &details {
        *totals.entry(a.participant_id).or_insert(0) += u64::from(a.quantity);
    }
    println!();
    let records = distribution.participants.iter().map(|p| {
        vec![
            names.get(p).cloned().unwrap_or_else(|| p.to_string()),
            totals.get(p).copied().unwrap_or(0).to_string(),
        ]
    });
    println!("{}", markdown_table(&["Participant", "Units"], records));
    let total: u64 = totals.values().sum();
    println!();
    println!("{} {} unit(s)", style("Total:").bold(), style(total).cyan());
    Ok(())
}

fn run_cancel(args: CancelArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let distribution = session.ledger.get_distribution(args.id)?;

    let question = format!(
        "Cancel distribution {} '{}' and delete its assignments?",
        distribution.id, distribution.name
    );
    if !confirm(&question, args.yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let rows = session.ledger.cancel_distribution(args.id)?;
    success(
        global,
        format_args!(
            "Cancelled distribution {} ({} assignment row(s) removed)",
            style(args.id).cyan(),
            rows
        ),
    );
    Ok(())
}

fn participant_names(ledger: &Ledger) -> Result<HashMap<ParticipantId, String>> {
    Ok(ledger
        .list_participants()?
        .into_iter()
        .map(|p| (p.id, p.display_name()))
        .collect())
}

fn part_names(ledger: &Ledger) -> Result<HashMap<PartKindId, String>> {
    Ok(ledger
        .list_objects()?
        .into_iter()
        .flat_map(|o| o.parts)
        .map(|p| (p.id, p.name))
        .collect())
}

/// "Object/Type" labels by type id
fn type_names(ledger: &Ledger) -> Result<HashMap<KitTypeId, String>> {
    Ok(ledger
        .list_objects()?
        .into_iter()
        .flat_map(|o| {
            let object = o.name;
            o.types
                .into_iter()
                .map(move |t| (t.id, format!("{}/{}", object, t.name)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(policy: Option<&str>, count: Option<i64>) -> RunArgs {
        RunArgs {
            name: String::new(),
            participants: Vec::new(),
            all_participants: false,
            select: Vec::new(),
            policy: policy.map(str::to_string),
            count,
            seed: None,
        }
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("3:2").unwrap(), ("3".to_string(), 2));
        assert_eq!(
            parse_selection("First aid/Small: 4").unwrap(),
            ("First aid/Small".to_string(), 4)
        );
        assert_eq!(parse_selection("T1:0").unwrap(), ("T1".to_string(), 0));
    }

    #[test]
    fn test_parse_selection_rejects_bad_input() {
        assert!(parse_selection("3").is_err());
        assert!(parse_selection(":2").is_err());
        assert!(parse_selection("3:two").is_err());
        assert!(parse_selection("3:-1").is_err());
    }

    #[test]
    fn test_resolve_policy_prefers_arguments() {
        let config = Config::from_yaml("algorithm:\n  policy: random\n  count: 3\n").unwrap();

        let policy = resolve_policy(&run_args(None, None), &config).unwrap();
        assert_eq!(policy.kind, PolicyKind::Random);
        assert_eq!(policy.rounds, 3);

        let policy = resolve_policy(&run_args(Some("less"), Some(1)), &config).unwrap();
        assert_eq!(policy.kind, PolicyKind::Less);
        assert_eq!(policy.rounds, 1);
    }

    #[test]
    fn test_resolve_policy_rejects_invalid_values() {
        let config = Config::default();
        assert!(resolve_policy(&run_args(Some("fairest"), None), &config).is_err());
        assert!(resolve_policy(&run_args(None, Some(-1)), &config).is_err());
    }
}
