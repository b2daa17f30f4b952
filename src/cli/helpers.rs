//! Shared helper functions for CLI commands

use console::style;
use miette::{IntoDiagnostic, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{init_logging, Config, Project};
use crate::ledger::Ledger;

/// Everything a command needs from an opened project
pub struct Session {
    pub project: Project,
    pub config: Config,
    pub ledger: Ledger,
    /// Output format after applying the configured default
    pub format: OutputFormat,
}

impl Session {
    /// Locate the project, load its configuration and open the ledger
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = Project::locate(global.project.as_deref())?;
        let config = Config::load(Some(&project))?;
        let ledger = Ledger::open(&project)?;
        let format = effective_format(global.format, &config);
        Ok(Self {
            project,
            config,
            ledger,
            format,
        })
    }
}

/// `--format auto` falls back to the configured `default_format`
pub fn effective_format(requested: OutputFormat, config: &Config) -> OutputFormat {
    if requested != OutputFormat::Auto {
        return requested;
    }
    config
        .default_format
        .as_deref()
        .and_then(|f| f.parse().ok())
        .unwrap_or(OutputFormat::Auto)
}

/// Start file logging for the current project, if there is one
///
/// Failure only prints a warning; commands run without logging.
pub fn start_logging(global: &GlobalOpts) {
    let Ok(project) = Project::locate(global.project.as_deref()) else {
        return;
    };
    let level = if global.verbose {
        "debug".to_string()
    } else {
        Config::load(Some(&project))
            .map(|c| c.log_level().to_string())
            .unwrap_or_else(|_| "info".to_string())
    };
    if let Err(err) = init_logging(&level, &project.log_dir()) {
        if !global.quiet {
            eprintln!("{} logging disabled: {}", style("!").yellow(), err);
        }
    }
}

/// Print `value` as JSON or YAML when the format asks for it
///
/// Returns `false` for the other formats so the caller can render its own view.
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Random source for a run: seeded when a seed is known, from the OS otherwise
pub fn build_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Ask for a y/N answer on stdin; `--yes` skips the question
pub fn confirm(question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{} [y/N] ", question);
    std::io::Write::flush(&mut std::io::stdout()).into_diagnostic()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).into_diagnostic()?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Print a green check status line unless quiet
pub fn success(global: &GlobalOpts, message: impl std::fmt::Display) {
    if !global.quiet {
        println!("{} {}", style("✓").green(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_effective_format() {
        let mut config = Config::default();
        assert_eq!(effective_format(OutputFormat::Auto, &config), OutputFormat::Auto);

        config.default_format = Some("json".to_string());
        assert_eq!(effective_format(OutputFormat::Auto, &config), OutputFormat::Json);
        assert_eq!(effective_format(OutputFormat::Csv, &config), OutputFormat::Csv);

        config.default_format = Some("nonsense".to_string());
        assert_eq!(effective_format(OutputFormat::Auto, &config), OutputFormat::Auto);
    }

    #[test]
    fn test_seeded_rng_repeats() {
        let a: u64 = build_rng(Some(7)).random();
        let b: u64 = build_rng(Some(7)).random();
        assert_eq!(a, b);
    }
}
