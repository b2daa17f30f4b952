//! `kitshare config` command - Configuration management
//!
//! Provides commands to view and modify kitshare configuration.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::helpers::success;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::VALID_KEYS;
use crate::core::project::Project;
use crate::core::logging::parse_level;
use crate::core::{logging_status, Config};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration values
    Show(ShowArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Unset (remove) a configuration value
    Unset(UnsetArgs),

    /// Show paths to configuration files
    Path,

    /// List all available configuration keys
    Keys,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Show only this key's value
    pub key: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., algorithm.policy, algorithm.count)
    pub key: String,

    /// Value to set
    #[arg(allow_hyphen_values = true)]
    pub value: String,

    /// Set in global (user) config instead of project config
    #[arg(long, short = 'g')]
    pub global: bool,
}

#[derive(clap::Args, Debug)]
pub struct UnsetArgs {
    /// Configuration key to remove
    pub key: String,

    /// Remove from global (user) config instead of project config
    #[arg(long, short = 'g')]
    pub global: bool,
}

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => run_show(args, global),
        ConfigCommands::Set(args) => run_set(args, global),
        ConfigCommands::Unset(args) => run_unset(args, global),
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Keys => run_keys(),
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::locate(global.project.as_deref()).ok();
    let config = Config::load(project.as_ref())?;

    if let Some(key) = &args.key {
        ensure_known_key(key)?;
        return match config.get(key) {
            Some(v) => {
                println!("{}", v);
                Ok(())
            }
            None => Err(miette::miette!("Key '{}' is not set", key)),
        };
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&config).into_diagnostic()?);
            return Ok(());
        }
        _ => {}
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    for (key, _) in VALID_KEYS {
        print_config_value(key, config.get(key).as_deref());
    }
    println!();
    match config.policy() {
        Ok(policy) => {
            let rounds = if policy.rounds == 0 {
                "as many as possible".to_string()
            } else {
                policy.rounds.to_string()
            };
            println!(
                "  {} {} (share rounds: {})",
                style("policy in effect:").dim(),
                style(policy.kind).green(),
                rounds
            );
        }
        Err(err) => println!("  {} {}", style("invalid policy:").red(), err),
    }

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Environment variables (KITSHARE_POLICY, KITSHARE_COUNT, KITSHARE_SEED, KITSHARE_LOG)");
    println!("  2. Project config (.kitshare/config.yaml)");
    println!("  3. Global config (~/.config/kitshare/config.yaml)");

    Ok(())
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    ensure_known_key(&args.key)?;
    let config_path = if args.global {
        get_global_config_path()?
    } else {
        get_project_config_path(global)?
    };

    let mut config_map = read_mapping(&config_path)?;
    set_nested_value(&mut config_map, &args.key, parse_scalar(&args.value))?;

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    validate_config(&yaml)?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if args.global { "global" } else { "project" };
    success(
        global,
        format_args!(
            "Set {} {} {} in {} config",
            style(&args.key).cyan(),
            style("→").dim(),
            style(&args.value).yellow(),
            scope
        ),
    );
    Ok(())
}

fn run_unset(args: UnsetArgs, global: &GlobalOpts) -> Result<()> {
    let config_path = if args.global {
        get_global_config_path()?
    } else {
        get_project_config_path(global)?
    };

    if !config_path.exists() {
        return Err(miette::miette!(
            "Config file does not exist: {}",
            config_path.display()
        ));
    }

    let mut config_map = read_mapping(&config_path)?;
    if !unset_nested_value(&mut config_map, &args.key) {
        return Err(miette::miette!("Key '{}' not found in config", args.key));
    }

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if args.global { "global" } else { "project" };
    success(
        global,
        format_args!("Removed {} from {} config", style(&args.key).cyan(), scope),
    );
    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    let global_path = get_global_config_path()?;
    let project_path = get_project_config_path(global);

    println!("{}", style("Configuration file paths:").bold());
    println!();
    println!("  {} {}", style("Global:").cyan(), global_path.display());
    print_exists(&global_path, 9);

    println!();
    match project_path {
        Ok(path) => {
            println!("  {} {}", style("Project:").cyan(), path.display());
            print_exists(&path, 10);
        }
        Err(_) => println!(
            "  {} {}",
            style("Project:").cyan(),
            style("(not in a kitshare project)").dim()
        ),
    }

    if let Some((level, log_dir)) = logging_status() {
        println!();
        println!(
            "  {} {} ({})",
            style("Logs:").cyan(),
            log_dir.display(),
            level
        );
    }

    Ok(())
}

fn print_exists(path: &Path, indent: usize) {
    let marker = if path.exists() {
        style("(exists)").green()
    } else {
        style("(not created)").dim()
    };
    println!("{:indent$}{}", "", marker, indent = indent);
}

fn run_keys() -> Result<()> {
    println!("{}", style("Available configuration keys:").bold());
    println!();

    for (key, description) in VALID_KEYS {
        println!("  {:<20} {}", style(key).cyan(), style(description).dim());
    }

    println!();
    println!(
        "{}",
        style("Use 'kitshare config set <key> <value>' to set a value.").dim()
    );

    Ok(())
}

// Helper functions

fn get_global_config_path() -> Result<PathBuf> {
    Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine global config directory"))
}

fn get_project_config_path(global: &GlobalOpts) -> Result<PathBuf> {
    let project = Project::locate(global.project.as_deref())?;
    Ok(project.config_path())
}

fn ensure_known_key(key: &str) -> Result<()> {
    if VALID_KEYS.iter().any(|(k, _)| *k == key) {
        return Ok(());
    }
    let keys: Vec<&str> = VALID_KEYS.iter().map(|(k, _)| *k).collect();
    Err(miette::miette!(
        help = format!("valid keys: {}", keys.join(", ")),
        "Unknown configuration key '{}'",
        key
    ))
}

/// Read a config file as a YAML mapping (missing or empty files are empty mappings)
fn read_mapping(path: &Path) -> Result<serde_yml::Value> {
    if !path.exists() {
        return Ok(serde_yml::Value::Mapping(Default::default()));
    }
    let content = fs::read_to_string(path).into_diagnostic()?;
    let parsed: serde_yml::Value = serde_yml::from_str(&content)
        .map_err(|e| miette::miette!("invalid config file {}: {}", path.display(), e))?;
    match parsed {
        serde_yml::Value::Null => Ok(serde_yml::Value::Mapping(Default::default())),
        serde_yml::Value::Mapping(_) => Ok(parsed),
        _ => Err(miette::miette!(
            "config file {} is not a mapping",
            path.display()
        )),
    }
}

/// Interpret a command-line value as a YAML scalar so numbers stay numbers
fn parse_scalar(value: &str) -> serde_yml::Value {
    match serde_yml::from_str::<serde_yml::Value>(value) {
        Ok(parsed @ (serde_yml::Value::Number(_) | serde_yml::Value::Bool(_))) => parsed,
        _ => serde_yml::Value::String(value.to_string()),
    }
}

/// Reject a config document that would fail to load or name an invalid setting
fn validate_config(yaml: &str) -> Result<()> {
    let config = Config::from_yaml(yaml)
        .map_err(|e| miette::miette!("value does not fit the configuration: {}", e))?;
    config.policy()?;
    if let Some(level) = &config.log_level {
        parse_level(level)?;
    }
    if let Some(format) = &config.default_format {
        format
            .parse::<OutputFormat>()
            .map_err(|e| miette::miette!("invalid default_format '{}': {}", format, e))?;
    }
    Ok(())
}

fn print_config_value(key: &str, value: Option<&str>) {
    if let Some(v) = value {
        println!("  {}: {}", style(key).cyan(), style(v).yellow());
    } else {
        println!("  {}: {}", style(key).cyan(), style("(not set)").dim());
    }
}

fn set_nested_value(root: &mut serde_yml::Value, key: &str, value: serde_yml::Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(miette::miette!("empty configuration key"));
    };

    let mut current = root;
    for part in parents {
        let serde_yml::Value::Mapping(map) = current else {
            return Err(miette::miette!("'{}' is not a mapping in the config file", part));
        };
        let key = serde_yml::Value::String(part.to_string());
        if !map.contains_key(&key) {
            map.insert(key.clone(), serde_yml::Value::Mapping(Default::default()));
        }
        current = map
            .get_mut(&key)
            .ok_or_else(|| miette::miette!("cannot create '{}' in the config file", part))?;
    }

    match current {
        serde_yml::Value::Mapping(map) => {
            map.insert(serde_yml::Value::String(last.to_string()), value);
            Ok(())
        }
        _ => Err(miette::miette!("cannot set '{}': parent is not a mapping", key)),
    }
}

fn unset_nested_value(root: &mut serde_yml::Value, key: &str) -> bool {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };

    let mut current = root;
    for part in parents {
        match current {
            serde_yml::Value::Mapping(map) => {
                match map.get_mut(&serde_yml::Value::String(part.to_string())) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            _ => return false,
        }
    }

    match current {
        serde_yml::Value::Mapping(map) => map
            .remove(&serde_yml::Value::String(last.to_string()))
            .is_some(),
        _ => false,
    }
}
