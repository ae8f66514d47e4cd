//! Model version classification
//!
//! Compares the `model.version` strings of two canonical models. A breaking
//! change report paired with anything less than a major bump is worth a notice.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a model's declared version moved between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
    /// Same version, or only pre-release/build metadata changed
    Unchanged,
    Downgrade,
    /// One side is not a semantic version
    Unknown,
}

impl VersionBump {
    /// Classify the move from `old` to `new`; a leading `v` is accepted
    pub fn between(old: &str, new: &str) -> Self {
        match (parse_version(old), parse_version(new)) {
            (Ok(old), Ok(new)) => Self::classify(&old, &new),
            _ => Self::Unknown,
        }
    }

    pub fn classify(old: &Version, new: &Version) -> Self {
        let core = |v: &Version| (v.major, v.minor, v.patch);
        if core(new) < core(old) {
            Self::Downgrade
        } else if new.major > old.major {
            Self::Major
        } else if new.minor > old.minor {
            Self::Minor
        } else if new.patch > old.patch {
            Self::Patch
        } else {
            Self::Unchanged
        }
    }

    /// Whether this bump announces breaking changes
    pub fn allows_breaking(&self) -> bool {
        matches!(self, Self::Major)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Unchanged => "unchanged",
            Self::Downgrade => "downgrade",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a model version, stripping a leading `v`
pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

/// Next version for a change of the given kind
pub fn suggest_next(current: &Version, breaking: bool, additive: bool) -> Version {
    if breaking {
        Version::new(current.major + 1, 0, 0)
    } else if additive {
        Version::new(current.major, current.minor + 1, 0)
    } else {
        Version::new(current.major, current.minor, current.patch + 1)
    }
}
