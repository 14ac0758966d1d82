//! Plain-text rendering.

use casl_config::Phase;
use casl_plugins::ExecutionReport;

use super::PluginListing;

const OK: &str = "ok";
const FAILED: &str = "FAILED";
const NOT_RUN: &str = "skip";
const DETAIL_INDENT: &str = "         ";

pub(super) fn report(report: &ExecutionReport) -> String {
    let width = report
        .items()
        .iter()
        .map(|item| item.plugin_id.len())
        .chain(report.not_run().iter().map(String::len))
        .max()
        .unwrap_or(0);
    let mut out = format!("{} plugins\n", report.phase().label());
    for item in report {
        let status = if item.success { OK } else { FAILED };
        out.push_str(&format!(
            "  {status:<6} {id:<width$}  {ms:>9.1} ms",
            id = item.plugin_id,
            ms = item.duration_ms
        ));
        let mut lines = item.error.lines();
        if let Some(first) = lines.next() {
            out.push_str("  ");
            out.push_str(first);
        }
        out.push('\n');
        for line in lines {
            out.push_str(DETAIL_INDENT);
            out.push_str(line);
            out.push('\n');
        }
    }
    for id in report.not_run() {
        out.push_str(&format!("  {NOT_RUN:<6} {id}\n"));
    }
    if report.is_cancelled() {
        out.push_str("run cancelled\n");
    }
    out.push_str(&report.summary());
    out.push('\n');
    out
}

pub(super) fn listing(phase: Phase, listing: &[PluginListing]) -> String {
    if listing.is_empty() {
        return format!("no {} plugins found\n", phase.label());
    }
    let width = listing.iter().map(|row| row.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in listing {
        let state = if row.enabled { "enabled" } else { "disabled" };
        let priority = row
            .priority
            .map_or_else(|| "-".to_owned(), |priority| priority.to_string());
        out.push_str(&format!(
            "{id:<width$}  {state:<8}  {priority:>4}  {band}",
            id = row.id,
            band = row.band
        ));
        if !row.requires.is_empty() {
            out.push_str(&format!("  (after {})", row.requires.join(", ")));
        }
        out.push('\n');
    }
    out
}
