//! CLI argument definitions for the `casl` binary.

use std::path::PathBuf;

use casl_config::{LogFormat, Phase};
use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Runs CASL action plugins around a build.
#[derive(Parser, Debug)]
#[command(name = "casl", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Controls how results are rendered.
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// `EnvFilter` directive for diagnostics written to stderr.
    #[arg(long, global = true, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Diagnostic log format (`json` or `compact`).
    #[arg(long, global = true, value_name = "FORMAT")]
    pub(crate) log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Structured subcommands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Runs the pre-build plugins.
    Pre(RunArgs),
    /// Runs the post-build plugins.
    Post(RunArgs),
    /// Lists discovered plugins with their configured state.
    List(ListArgs),
}

/// Where the workspace and its plugins live.
#[derive(Args, Debug, Clone)]
pub(crate) struct Locations {
    /// Workspace root.
    #[arg(long, short = 'w', value_name = "DIR", default_value = ".")]
    pub(crate) workspace: PathBuf,
    /// Directory holding one subdirectory per plugin. Defaults to
    /// `<workspace>/plugins`.
    #[arg(long, short = 'p', value_name = "DIR")]
    pub(crate) plugins: Option<PathBuf>,
}

impl Locations {
    pub(crate) fn plugins_dir(&self) -> PathBuf {
        self.plugins
            .clone()
            .unwrap_or_else(|| self.workspace.join("plugins"))
    }
}

/// Arguments of `casl pre` and `casl post`.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub(crate) locations: Locations,
    /// Directory holding build artifacts.
    #[arg(long, value_name = "DIR")]
    pub(crate) artifact_root: Option<PathBuf>,
    /// Artifact produced by the build; may be repeated.
    #[arg(long = "artifact", value_name = "PATH")]
    pub(crate) artifacts: Vec<PathBuf>,
    /// Upper bound on files returned by one iteration.
    #[arg(long, value_name = "COUNT")]
    pub(crate) max_files: Option<usize>,
    /// Answers every plugin prompt with its default.
    #[arg(long)]
    pub(crate) non_interactive: bool,
    /// Keeps a backup when the configuration file is rewritten.
    #[arg(long)]
    pub(crate) backup: bool,
}

/// Arguments of `casl list`.
#[derive(Args, Debug, Clone)]
pub(crate) struct ListArgs {
    #[command(flatten)]
    pub(crate) locations: Locations,
    /// Phase whose configuration is shown.
    #[arg(long, default_value_t = Phase::Pre)]
    pub(crate) phase: Phase,
}
