//! Include/exclude glob filtering for file iteration.

use wildmatch::WildMatch;

/// Compiled include and exclude patterns.
///
/// Patterns starting with `**/` also match at the root, so `**/*.rs` accepts
/// `main.rs` as well as `src/main.rs`.
#[derive(Debug, Clone)]
pub(crate) struct GlobFilter {
    include: Vec<WildMatch>,
    exclude: Vec<WildMatch>,
}

impl GlobFilter {
    pub(crate) fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        Self {
            include: compile(include),
            exclude: compile(exclude),
        }
    }

    /// Whether a `/`-separated relative path is selected.
    pub(crate) fn accepts(&self, relative: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|glob| glob.matches(relative));
        included && !self.rejects(relative)
    }

    /// Whether a `/`-separated relative path is excluded.
    pub(crate) fn rejects(&self, relative: &str) -> bool {
        self.exclude.iter().any(|glob| glob.matches(relative))
    }

    /// Whether a directory can be skipped entirely.
    pub(crate) fn prunes_dir(&self, relative: &str) -> bool {
        self.rejects(&format!("{relative}/"))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Vec<WildMatch> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let pattern = pattern.as_ref().trim();
        if pattern.is_empty() {
            continue;
        }
        compiled.push(WildMatch::new(pattern));
        if let Some(rest) = pattern.strip_prefix("**/") {
            compiled.push(WildMatch::new(rest));
        }
    }
    compiled
}
