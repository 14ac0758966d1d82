//! Command-line host for the CASL plugin phases.
//!
//! The runtime parses arguments, installs telemetry, builds an
//! [`ActionEngine`] for the requested phase and renders the resulting report.
//! Streams are injected so tests can drive the CLI without a terminal.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;

use casl_config::{ConfigStore, DiscoveredPlugin, LogFormat, LogSettings, Phase, band_name, plugin_score};
use casl_plugins::{ActionEngine, DirectoryLoader, PluginLoader, PluginUnit, Prompter, RunRequest};
use clap::Parser;
use tracing::debug;

mod cli;
mod errors;
pub mod output;
mod prompt;
mod signals;
mod telemetry;

use cli::{Cli, CliCommand, ListArgs, RunArgs};
use errors::{AppError, EXIT_CANCELLED, EXIT_PLUGIN_FAILURE};
pub use output::{OutputFormat, PluginListing, ResolvedOutputFormat};
use prompt::TerminalPrompter;
use signals::InterruptGuard;

const CLI_TARGET: &str = "casl_cli";

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E, stdout_is_terminal: bool) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            let _ = write!(stderr, "{}", error.render());
            return AppError::CliUsage(error).exit_code();
        }
        Err(error) => {
            let _ = write!(stdout, "{}", error.render());
            return ExitCode::SUCCESS;
        }
    };

    match execute(&cli, stdout, stdout_is_terminal) {
        Ok(code) => code,
        Err(error) => {
            let _ = writeln!(stderr, "casl: {error}");
            error.exit_code()
        }
    }
}

fn execute<W: Write>(
    cli: &Cli,
    stdout: &mut W,
    stdout_is_terminal: bool,
) -> Result<ExitCode, AppError> {
    let settings = LogSettings::resolve(
        cli.log_filter.clone(),
        Some(cli.log_format.unwrap_or(LogFormat::Compact)),
    );
    telemetry::initialise(&settings)?;
    let format = cli.output.resolve(stdout_is_terminal);
    match &cli.command {
        CliCommand::Pre(args) => run_phase(Phase::Pre, args, stdout, format),
        CliCommand::Post(args) => run_phase(Phase::Post, args, stdout, format),
        CliCommand::List(args) => list(args, stdout, format),
    }
}

fn run_phase<W: Write>(
    phase: Phase,
    args: &RunArgs,
    stdout: &mut W,
    format: ResolvedOutputFormat,
) -> Result<ExitCode, AppError> {
    let workspace = &args.locations.workspace;
    if !workspace.is_dir() {
        return Err(AppError::InvalidWorkspace {
            path: workspace.clone(),
        });
    }
    let engine = ActionEngine::new(phase)
        .with_loader(DirectoryLoader::new(args.locations.plugins_dir()))
        .with_backup(args.backup);
    let _interrupts = InterruptGuard::install(&engine.cancel_token()).map_err(AppError::Signal)?;

    let interactive = !args.non_interactive && io::stdin().is_terminal();
    let mut request = RunRequest::new(workspace.clone())
        .artifacts(args.artifacts.iter().cloned())
        .noninteractive(!interactive);
    if let Some(root) = &args.artifact_root {
        request = request.artifact_root(root.clone());
    }
    if let Some(limit) = args.max_files {
        request = request.max_files(limit);
    }
    if interactive {
        let prompter: Arc<dyn Prompter> = Arc::new(TerminalPrompter::new());
        request = request.prompter(prompter);
    }
    debug!(
        target: CLI_TARGET,
        phase = %phase,
        workspace = %workspace.display(),
        interactive,
        "running phase"
    );

    let Some(report) = engine.run(&request) else {
        output::write_skipped(stdout, phase, format)?;
        return Ok(ExitCode::SUCCESS);
    };
    output::write_report(stdout, &report, format)?;
    Ok(if report.is_cancelled() {
        ExitCode::from(EXIT_CANCELLED)
    } else if report.ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PLUGIN_FAILURE)
    })
}

fn list<W: Write>(
    args: &ListArgs,
    stdout: &mut W,
    format: ResolvedOutputFormat,
) -> Result<ExitCode, AppError> {
    let workspace = &args.locations.workspace;
    if !workspace.is_dir() {
        return Err(AppError::InvalidWorkspace {
            path: workspace.clone(),
        });
    }
    let discovery = DirectoryLoader::new(args.locations.plugins_dir()).discover();
    let units: Vec<&PluginUnit> = discovery
        .units
        .iter()
        .filter(|unit| unit.runs_in(args.phase))
        .collect();
    let discovered: Vec<DiscoveredPlugin> = units
        .iter()
        .map(|unit| DiscoveredPlugin::new(unit.id(), unit.metadata().tags().iter()))
        .collect();
    let config = ConfigStore::new(workspace, args.phase).load(&discovered).config;

    let mut listing: Vec<PluginListing> = units
        .iter()
        .map(|unit| {
            let tags: Vec<&str> = unit.metadata().tags().iter().map(String::as_str).collect();
            PluginListing {
                id: unit.id().to_owned(),
                name: unit.metadata().name().to_owned(),
                enabled: config.is_enabled(unit.id()),
                priority: config.effective_priority(unit.id()),
                requires: unit.requires().iter().cloned().collect(),
                band: describe_band(args.phase, &tags),
            }
        })
        .collect();
    listing.sort_by_key(|row| (row.priority.unwrap_or(i32::MAX), row.id.clone()));
    output::write_listing(stdout, args.phase, &listing, format)?;
    Ok(ExitCode::SUCCESS)
}

fn describe_band(phase: Phase, tags: &[&str]) -> String {
    let score = plugin_score(phase, tags);
    format!("{score} {}", band_name(phase, score))
}
