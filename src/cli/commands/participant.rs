//! `kitshare participant` command - Participant management

use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Input};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{print_structured, success, Session};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ParticipantId;
use crate::ledger::{NewParticipant, Participant};

#[derive(Subcommand, Debug)]
pub enum ParticipantCommands {
    /// Register a participant
    Add(AddArgs),

    /// List participants
    List,

    /// Show a participant's details
    Show(ShowArgs),

    /// Change a participant's name or contact details
    Edit(EditArgs),

    /// Remove a participant that no distribution references
    Remove(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// First name
    pub first_name: Option<String>,

    /// Last name
    pub last_name: Option<String>,

    /// Email address
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Phone number
    #[arg(long)]
    pub phone: Option<String>,

    /// Prompt for every field
    #[arg(long, short = 'i')]
    pub interactive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Participant id (e.g. 3 or P3)
    pub id: ParticipantId,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Participant id (e.g. 3 or P3)
    pub id: ParticipantId,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,

    #[arg(long, short = 'e')]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "NAME", 32),
    ColumnDef::new("email", "EMAIL", 32),
    ColumnDef::new("phone", "PHONE", 18),
    ColumnDef::new("created", "CREATED", 12),
];

pub fn run(cmd: ParticipantCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ParticipantCommands::Add(args) => run_add(args, global),
        ParticipantCommands::List => run_list(global),
        ParticipantCommands::Show(args) => run_show(args, global),
        ParticipantCommands::Edit(args) => run_edit(args, global),
        ParticipantCommands::Remove(args) => run_remove(args, global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;

    let data = if args.interactive {
        prompt_participant(&args)?
    } else {
        NewParticipant {
            first_name: args.first_name.unwrap_or_default(),
            last_name: args.last_name.unwrap_or_default(),
            email: args.email.unwrap_or_default(),
            phone: args.phone.unwrap_or_default(),
        }
    };

    let participant = session.ledger.add_participant(&data)?;
    if session.format == OutputFormat::Id {
        println!("{}", participant.id);
        return Ok(());
    }
    if print_structured(&participant, session.format)? {
        return Ok(());
    }
    success(
        global,
        format_args!(
            "Added participant {} {}",
            style(participant.id).cyan(),
            style(participant.display_name()).yellow()
        ),
    );
    Ok(())
}

fn prompt_participant(args: &AddArgs) -> Result<NewParticipant> {
    let theme = ColorfulTheme::default();
    let field = |prompt: &str, initial: &Option<String>, required: bool| -> Result<String> {
        Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .with_initial_text(initial.clone().unwrap_or_default())
            .allow_empty(!required)
            .interact_text()
            .into_diagnostic()
    };

    Ok(NewParticipant {
        first_name: field("First name", &args.first_name, true)?,
        last_name: field("Last name", &args.last_name, false)?,
        email: field("Email", &args.email, false)?,
        phone: field("Phone", &args.phone, false)?,
    })
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let participants = session.ledger.list_participants()?;

    if print_structured(&participants, session.format)? {
        return Ok(());
    }
    if participants.is_empty() && session.format == OutputFormat::Auto {
        if !global.quiet {
            println!("No participants found.");
        }
        return Ok(());
    }

    let rows = participants.iter().map(participant_row);
    let mut formatter = TableFormatter::new(COLUMNS, "participant");
    if global.quiet {
        formatter = formatter.without_summary();
    }
    formatter.output(rows, session.format)
}

fn participant_row(p: &Participant) -> TableRow {
    let optional = |s: &str| {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    };
    TableRow::new(p.id.get())
        .cell("name", CellValue::Text(p.display_name()))
        .cell("email", optional(&p.email))
        .cell("phone", optional(&p.phone))
        .cell("created", CellValue::Date(p.created_at))
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let participant = session.ledger.get_participant(args.id)?;

    if print_structured(&participant, session.format)? {
        return Ok(());
    }
    if session.format == OutputFormat::Id {
        println!("{}", participant.id);
        return Ok(());
    }

    let totals = session.ledger.historical_totals(&[participant.id])?;
    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(participant.id).cyan());
    println!(
        "{}: {}",
        style("Name").bold(),
        style(participant.display_name()).yellow()
    );
    if !participant.email.is_empty() {
        println!("{}: {}", style("Email").bold(), participant.email);
    }
    if !participant.phone.is_empty() {
        println!("{}: {}", style("Phone").bold(), participant.phone);
    }
    println!(
        "{}: {}",
        style("Units received").bold(),
        totals.total(participant.id)
    );
    println!(
        "{}: {}",
        style("Created").bold(),
        participant.created_at.format("%Y-%m-%d %H:%M")
    );
    println!("{}", style("─".repeat(60)).dim());
    Ok(())
}

fn run_edit(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let current = session.ledger.get_participant(args.id)?;

    let data = NewParticipant {
        first_name: args.first_name.unwrap_or(current.first_name),
        last_name: args.last_name.unwrap_or(current.last_name),
        email: args.email.unwrap_or(current.email),
        phone: args.phone.unwrap_or(current.phone),
    };
    let updated = session.ledger.update_participant(args.id, &data)?;

    if print_structured(&updated, session.format)? {
        return Ok(());
    }
    success(
        global,
        format_args!(
            "Updated participant {} {}",
            style(updated.id).cyan(),
            style(updated.display_name()).yellow()
        ),
    );
    Ok(())
}

fn run_remove(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    session.ledger.remove_participant(args.id)?;
    success(
        global,
        format_args!("Removed participant {}", style(args.id).cyan()),
    );
    Ok(())
}
