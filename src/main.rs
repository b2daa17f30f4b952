use clap::Parser;
use kitshare::cli::commands;
use kitshare::cli::helpers::start_logging;
use kitshare::cli::{Cli, Commands};
use miette::Result;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    if !matches!(cli.command, Commands::Init(_) | Commands::Completions(_)) {
        start_logging(&global);
    }

    match cli.command {
        Commands::Init(args) => commands::init::run(args, &global),
        Commands::Participant(cmd) => commands::participant::run(cmd, &global),
        Commands::Object(cmd) => commands::object::run(cmd, &global),
        Commands::Distribution(cmd) => commands::distribution::run(cmd, &global),
        Commands::Stats(args) => commands::stats::run(args, &global),
        Commands::Backup(cmd) => commands::backup::run(cmd, &global),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
