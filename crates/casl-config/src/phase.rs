//! The two fixed points at which action plugins run.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Build phase an engine instance is bound to.
///
/// ```
/// use casl_config::Phase;
///
/// assert_eq!("post".parse::<Phase>().ok(), Some(Phase::Post));
/// assert_eq!(Phase::Pre.config_stem(), "bcasl");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Phase {
    /// Before compilation; plugins see workspace sources.
    Pre,
    /// After compilation; plugins see build artefacts.
    Post,
}

impl Phase {
    /// Both phases in execution order.
    pub const ALL: [Self; 2] = [Self::Pre, Self::Post];

    /// File stem of this phase's workspace configuration.
    #[must_use]
    pub const fn config_stem(self) -> &'static str {
        match self {
            Self::Pre => "bcasl",
            Self::Post => "acasl",
        }
    }

    /// Human label used in logs and rendered reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pre => "pre-build",
            Self::Post => "post-build",
        }
    }
}
