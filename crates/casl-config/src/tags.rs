//! Tag heuristics that seed default plugin priorities.
//!
//! Each phase maps well-known tags onto ordinal bands. A plugin lands in the
//! lowest band any of its tags maps to; plugins without a recognised tag fall
//! into [`DEFAULT_BAND`]. Within a band, ties are broken by plugin id.

use crate::phase::Phase;
use crate::workspace::DiscoveredPlugin;

/// Band assigned to plugins whose tags are all unrecognised.
pub const DEFAULT_BAND: u32 = 100;

struct Band {
    score: u32,
    name: &'static str,
    tags: &'static [&'static str],
}

const PRE_BANDS: &[Band] = &[
    Band {
        score: 0,
        name: "Cleanup",
        tags: &["clean", "cleanup", "sanitize", "prune", "tidy"],
    },
    Band {
        score: 10,
        name: "Validation",
        tags: &["validation", "presence", "check", "requirements"],
    },
    Band {
        score: 15,
        name: "Tests",
        tags: &["test", "tests", "pytest", "unittest"],
    },
    Band {
        score: 20,
        name: "Preparation",
        tags: &[
            "prepare",
            "codegen",
            "generate",
            "fetch",
            "resources",
            "download",
            "install",
            "bootstrap",
            "configure",
        ],
    },
    Band {
        score: 30,
        name: "Conformity",
        tags: &[
            "license",
            "header",
            "normalize",
            "inject",
            "spdx",
            "banner",
            "copyright",
        ],
    },
    Band {
        score: 40,
        name: "Formatting",
        tags: &[
            "lint",
            "format",
            "typecheck",
            "mypy",
            "flake8",
            "ruff",
            "pep8",
            "black",
            "isort",
            "sort-imports",
        ],
    },
    Band {
        score: 50,
        name: "Protection",
        tags: &[
            "obfuscation",
            "obfuscate",
            "transpile",
            "protect",
            "encrypt",
            "package",
        ],
    },
    Band {
        score: 60,
        name: "Publishing",
        tags: &["publish", "release", "deploy"],
    },
];

const POST_BANDS: &[Band] = &[
    Band {
        score: 0,
        name: "Cleanup",
        tags: &["clean", "cleanup", "sanitize", "prune", "tidy"],
    },
    Band {
        score: 10,
        name: "Validation",
        tags: &["validation", "verify", "check", "integrity"],
    },
    Band {
        score: 15,
        name: "Tests",
        tags: &["test", "tests", "smoke"],
    },
    Band {
        score: 20,
        name: "Optimisation",
        tags: &["optimize", "optimization", "compress", "strip", "minify"],
    },
    Band {
        score: 30,
        name: "Signing",
        tags: &["sign", "signature", "security", "encrypt", "hash"],
    },
    Band {
        score: 40,
        name: "Packaging",
        tags: &["package", "packaging", "bundle", "archive", "zip"],
    },
    Band {
        score: 50,
        name: "Reporting",
        tags: &[
            "report",
            "reporting",
            "stats",
            "statistics",
            "document",
            "log",
            "publish",
            "release",
        ],
    },
];

const fn bands(phase: Phase) -> &'static [Band] {
    match phase {
        Phase::Pre => PRE_BANDS,
        Phase::Post => POST_BANDS,
    }
}

/// Band score for a single tag, compared case-insensitively.
#[must_use]
pub fn tag_score(phase: Phase, tag: &str) -> u32 {
    let tag = tag.trim().to_ascii_lowercase();
    bands(phase)
        .iter()
        .find(|band| band.tags.contains(&tag.as_str()))
        .map_or(DEFAULT_BAND, |band| band.score)
}

/// Lowest band score across a plugin's tags.
#[must_use]
pub fn plugin_score<S: AsRef<str>>(phase: Phase, tags: &[S]) -> u32 {
    tags.iter()
        .map(|tag| tag_score(phase, tag.as_ref()))
        .min()
        .unwrap_or(DEFAULT_BAND)
}

/// Display name of the band with the given score.
#[must_use]
pub fn band_name(phase: Phase, score: u32) -> String {
    bands(phase)
        .iter()
        .find(|band| band.score == score)
        .map_or_else(
            || {
                if score == DEFAULT_BAND {
                    "Default".to_owned()
                } else {
                    format!("Band {score}")
                }
            },
            |band| band.name.to_owned(),
        )
}

/// Renders the band chosen for a plugin.
///
/// ```
/// use casl_config::{Phase, describe_priority};
///
/// assert_eq!(
///     describe_priority(Phase::Post, "zipper", &["ZIP", "custom"]),
///     "zipper (zip, custom) -> band 40: Packaging",
/// );
/// assert_eq!(
///     describe_priority::<&str>(Phase::Pre, "bare", &[]),
///     "bare (no tags) -> band 100: Default",
/// );
/// ```
#[must_use]
pub fn describe_priority<S: AsRef<str>>(phase: Phase, plugin_id: &str, tags: &[S]) -> String {
    let score = plugin_score(phase, tags);
    let name = band_name(phase, score);
    if tags.is_empty() {
        return format!("{plugin_id} (no tags) -> band {score}: {name}");
    }
    let rendered = tags
        .iter()
        .map(|tag| tag.as_ref().trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{plugin_id} ({rendered}) -> band {score}: {name}")
}

/// Orders discovered plugins by `(band score, id)`.
#[must_use]
pub fn order_by_tags(phase: Phase, plugins: &[DiscoveredPlugin]) -> Vec<String> {
    let mut scored: Vec<(u32, &str)> = plugins
        .iter()
        .map(|plugin| (plugin_score(phase, &plugin.tags), plugin.id.as_str()))
        .collect();
    scored.sort_unstable();
    scored.dedup();
    scored.into_iter().map(|(_, id)| id.to_owned()).collect()
}
