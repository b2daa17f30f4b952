//! `kitshare backup` command - JSON export and import of the whole ledger

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{confirm, success, Session};
use crate::cli::GlobalOpts;

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Write every ledger table to a JSON file
    Export(ExportArgs),

    /// Replace the ledger contents with a JSON backup
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Destination file
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Backup file written by `kitshare backup export`
    pub file: PathBuf,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(cmd: BackupCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BackupCommands::Export(args) => run_export(args, global),
        BackupCommands::Import(args) => run_import(args, global),
    }
}

fn run_export(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let dump = session.ledger.export_to(&args.file)?;
    success(
        global,
        format_args!(
            "Exported {} row(s) to {}",
            dump.data.row_count(),
            style(args.file.display()).cyan()
        ),
    );
    Ok(())
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;

    let question = format!(
        "Replace every record in {} with the contents of {}?",
        session.project.ledger_path().display(),
        args.file.display()
    );
    if !confirm(&question, args.yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let rows = session.ledger.import_from(&args.file)?;
    success(
        global,
        format_args!(
            "Imported {} row(s) from {}",
            rows,
            style(args.file.display()).cyan()
        ),
    );
    Ok(())
}
