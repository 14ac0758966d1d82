//! Rendering of run reports and plugin listings.
//!
//! Human output is a compact table for terminals. JSON output serialises the
//! report unchanged so build pipelines can consume it.

mod render;

use std::io::Write;

use casl_config::Phase;
use casl_plugins::ExecutionReport;
use clap::ValueEnum;
use serde::Serialize;

use crate::errors::AppError;

/// Output format selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON.
    Json,
}

/// Output format after resolving `auto` based on TTY detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// Human-readable table.
    Human,
    /// JSON document.
    Json,
}

impl OutputFormat {
    /// Resolves the output format based on whether stdout is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Auto => {
                if stdout_is_terminal {
                    ResolvedOutputFormat::Human
                } else {
                    ResolvedOutputFormat::Json
                }
            }
            Self::Human => ResolvedOutputFormat::Human,
            Self::Json => ResolvedOutputFormat::Json,
        }
    }
}

/// One row of `casl list`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    /// Plugin id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the configuration enables the plugin.
    pub enabled: bool,
    /// Configured priority, if any.
    pub priority: Option<i32>,
    /// Ids the plugin runs after.
    pub requires: Vec<String>,
    /// Default ordering band chosen from the tags.
    pub band: String,
}

/// Skipped-phase payload for JSON output.
#[derive(Serialize)]
struct Skipped {
    phase: Phase,
    skipped: bool,
}

pub(crate) fn write_report<W: Write>(
    out: &mut W,
    report: &ExecutionReport,
    format: ResolvedOutputFormat,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => out.write_all(render::report(report).as_bytes())?,
        ResolvedOutputFormat::Json => write_json(out, report)?,
    }
    Ok(())
}

pub(crate) fn write_skipped<W: Write>(
    out: &mut W,
    phase: Phase,
    format: ResolvedOutputFormat,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => writeln!(out, "{} plugins skipped", phase.label())?,
        ResolvedOutputFormat::Json => write_json(
            out,
            &Skipped {
                phase,
                skipped: true,
            },
        )?,
    }
    Ok(())
}

pub(crate) fn write_listing<W: Write>(
    out: &mut W,
    phase: Phase,
    listing: &[PluginListing],
    format: ResolvedOutputFormat,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => out.write_all(render::listing(phase, listing).as_bytes())?,
        ResolvedOutputFormat::Json => write_json(out, &listing)?,
    }
    Ok(())
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(AppError::Serialise)?;
    writeln!(out)?;
    Ok(())
}
