mod cli;
mod commands;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vrouter_core::{CommandRunner, DryRunRunner, Reconciler, SystemRunner};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a reconciler
        Command::Config(ref args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(ref args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "vrouter", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let config = vrouter_config::load_config(cli.global.config.as_deref())?;
            tracing::debug!(command = ?cmd, data_dir = %config.data_dir.display(), "dispatching command");

            if cli.global.dry_run {
                let runner = Arc::new(DryRunRunner::new());
                let result = dispatch_with(cmd, config, Arc::clone(&runner), &cli.global).await;
                report_dry_run(&runner, &cli.global);
                result
            } else {
                dispatch_with(cmd, config, Arc::new(SystemRunner), &cli.global).await
            }
        }
    }
}

async fn dispatch_with<R: CommandRunner>(
    cmd: Command,
    config: vrouter_core::RouterConfig,
    runner: Arc<R>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let reconciler = Arc::new(Reconciler::new(config, runner));
    commands::dispatch(cmd, &reconciler, global).await
}

/// List what a real run would have executed.
fn report_dry_run(runner: &DryRunRunner, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    let lines = runner.recorded_lines();
    let color = output::should_color(&global.color);
    eprintln!(
        "{} {} command(s) not executed",
        output::warning("dry run:", color),
        lines.len()
    );
    for line in lines {
        eprintln!("  {line}");
    }
}
