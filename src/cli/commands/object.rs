//! `kitshare object` command - Objects, their parts and kit types
//!
//! Objects are edited as whole YAML definitions; `object template` prints a
//! starting point and `object show --definition` prints the stored one.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::cli::helpers::{print_structured, success, Session};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ObjectId;
use crate::ledger::{CatalogObject, ObjectDefinition};

#[derive(Subcommand, Debug)]
pub enum ObjectCommands {
    /// Create an object from a YAML definition
    Add(FileArgs),

    /// Replace an object's name, parts and types from a YAML definition
    Edit(EditArgs),

    /// List objects
    List,

    /// Show an object with its parts and types
    Show(ShowArgs),

    /// Remove an object that no distribution references
    Remove(IdArgs),

    /// Print an example object definition
    Template,
}

#[derive(clap::Args, Debug)]
pub struct FileArgs {
    /// YAML definition file
    #[arg(long, short = 'F')]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Object id (e.g. 2 or O2)
    pub id: ObjectId,

    /// YAML definition file
    #[arg(long, short = 'F')]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Object id (e.g. 2 or O2)
    pub id: ObjectId,

    /// Print the editable YAML definition instead
    #[arg(long)]
    pub definition: bool,
}

#[derive(clap::Args, Debug)]
pub struct IdArgs {
    /// Object id (e.g. 2 or O2)
    pub id: ObjectId,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "NAME", 32),
    ColumnDef::new("parts", "PARTS", 8),
    ColumnDef::new("types", "TYPES", 8),
    ColumnDef::new("created", "CREATED", 12),
];

const TEMPLATE: &str = r#"# kitshare object definition
name: First aid kit
parts:
  - name: Bandage
  - name: Gloves
  - name: Scissors
types:
  # quantities: units of each part per kit; 0 leaves the part out
  - name: Small
    quantities:
      Bandage: 2
      Gloves: 1
  - name: Large
    quantities:
      Bandage: 4
      Gloves: 2
      Scissors: 1
"#;

pub fn run(cmd: ObjectCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ObjectCommands::Add(args) => run_add(args, global),
        ObjectCommands::Edit(args) => run_edit(args, global),
        ObjectCommands::List => run_list(global),
        ObjectCommands::Show(args) => run_show(args, global),
        ObjectCommands::Remove(args) => run_remove(args, global),
        ObjectCommands::Template => {
            print!("{}", TEMPLATE);
            Ok(())
        }
    }
}

fn read_definition(path: &Path) -> Result<ObjectDefinition> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("cannot read {}: {}", path.display(), e))?;
    serde_yml::from_str(&contents)
        .map_err(|e| miette::miette!("invalid object definition in {}: {}", path.display(), e))
}

fn run_add(args: FileArgs, global: &GlobalOpts) -> Result<()> {
    let def = read_definition(&args.file)?;
    let mut session = Session::open(global)?;
    let object = session.ledger.add_object(&def)?;
    report_written(&object, "Added", &session, global)
}

fn run_edit(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    let def = read_definition(&args.file)?;
    let mut session = Session::open(global)?;
    let object = session.ledger.replace_object(args.id, &def)?;
    report_written(&object, "Updated", &session, global)
}

fn report_written(
    object: &CatalogObject,
    verb: &str,
    session: &Session,
    global: &GlobalOpts,
) -> Result<()> {
    if session.format == OutputFormat::Id {
        println!("{}", object.id);
        return Ok(());
    }
    if print_structured(object, session.format)? {
        return Ok(());
    }
    success(
        global,
        format_args!(
            "{} object {} {} ({} part(s), {} type(s))",
            verb,
            style(object.id).cyan(),
            style(&object.name).yellow(),
            object.parts.len(),
            object.types.len()
        ),
    );
    if !global.quiet {
        print_types(object);
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let objects = session.ledger.list_objects()?;

    if print_structured(&objects, session.format)? {
        return Ok(());
    }
    if objects.is_empty() && session.format == OutputFormat::Auto {
        if !global.quiet {
            println!("No objects found.");
        }
        return Ok(());
    }

    let rows = objects.iter().map(|o| {
        TableRow::new(o.id.get())
            .cell("name", CellValue::Text(o.name.clone()))
            .cell("parts", CellValue::Number(o.parts.len() as u64))
            .cell("types", CellValue::Number(o.types.len() as u64))
            .cell("created", CellValue::Date(o.created_at))
    });
    let mut formatter = TableFormatter::new(COLUMNS, "object");
    if global.quiet {
        formatter = formatter.without_summary();
    }
    formatter.output(rows, session.format)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let object = session.ledger.get_object(args.id)?;

    if args.definition {
        let def = ObjectDefinition::from(&object);
        print!("{}", serde_yml::to_string(&def).into_diagnostic()?);
        return Ok(());
    }
    if print_structured(&object, session.format)? {
        return Ok(());
    }
    if session.format == OutputFormat::Id {
        println!("{}", object.id);
        return Ok(());
    }

    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(object.id).cyan());
    println!("{}: {}", style("Name").bold(), style(&object.name).yellow());
    println!(
        "{}: {}",
        style("Created").bold(),
        object.created_at.format("%Y-%m-%d %H:%M")
    );
    println!();
    println!("{}", style("Parts:").bold());
    if object.parts.is_empty() {
        println!("  {}", style("(none)").dim());
    }
    for part in &object.parts {
        println!("  {} {}", style(format!("K{}", part.id)).cyan(), part.name);
    }
    println!();
    print_types(&object);
    println!("{}", style("─".repeat(60)).dim());
    Ok(())
}

fn print_types(object: &CatalogObject) {
    println!("{}", style("Types:").bold());
    if object.types.is_empty() {
        println!("  {}", style("(none)").dim());
    }
    for kit in &object.types {
        let members: Vec<String> = kit
            .members
            .iter()
            .map(|m| {
                format!(
                    "{}× {}",
                    m.multiplier,
                    object.part_name(m.part_kind_id).unwrap_or("?")
                )
            })
            .collect();
        let members = if members.is_empty() {
            style("no parts".to_string()).dim().to_string()
        } else {
            members.join(", ")
        };
        println!(
            "  {} {} ({} unit(s) per kit): {}",
            style(format!("T{}", kit.id)).cyan(),
            style(&kit.name).yellow(),
            kit.units_per_kit(),
            members
        );
    }
}

fn run_remove(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    session.ledger.remove_object(args.id)?;
    success(global, format_args!("Removed object {}", style(args.id).cyan()));
    Ok(())
}
