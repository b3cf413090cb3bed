use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TabmetaError;

/// The fixed container hierarchy of the platform, shallowest first.
///
/// `File` is not a traversable level: files attach as leaves under any of the
/// other levels. `Analysis` is both the deepest traversable level and a leaf
/// attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Group,
    Project,
    Subject,
    Session,
    Acquisition,
    Analysis,
    File,
}

/// Traversable levels, shallowest to deepest.
pub const LEVEL_ORDER: [Level; 6] = [
    Level::Group,
    Level::Project,
    Level::Subject,
    Level::Session,
    Level::Acquisition,
    Level::Analysis,
];

impl Level {
    pub fn order() -> impl Iterator<Item = Level> {
        LEVEL_ORDER.into_iter()
    }

    /// True iff `self` occurs strictly before `other` in the hierarchy.
    pub fn is_ancestor(self, other: Level) -> bool {
        self.depth() < other.depth()
    }

    /// Position in the hierarchy; `File` sorts below everything else.
    pub fn depth(self) -> usize {
        match self {
            Level::Group => 0,
            Level::Project => 1,
            Level::Subject => 2,
            Level::Session => 3,
            Level::Acquisition => 4,
            Level::Analysis => 5,
            Level::File => 6,
        }
    }

    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Group => None,
            Level::Project => Some(Level::Group),
            Level::Subject => Some(Level::Project),
            Level::Session => Some(Level::Subject),
            Level::Acquisition => Some(Level::Session),
            Level::Analysis => Some(Level::Acquisition),
            Level::File => None,
        }
    }

    pub fn child(self) -> Option<Level> {
        Level::order().find(|candidate| candidate.parent() == Some(self))
    }

    /// Leaf attachment points: never ancestors of anything.
    pub fn is_leaf(self) -> bool {
        matches!(self, Level::Analysis | Level::File)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Group => "group",
            Level::Project => "project",
            Level::Subject => "subject",
            Level::Session => "session",
            Level::Acquisition => "acquisition",
            Level::Analysis => "analysis",
            Level::File => "file",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Level {
    type Err = TabmetaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "group" => Ok(Level::Group),
            "project" => Ok(Level::Project),
            "subject" => Ok(Level::Subject),
            "session" => Ok(Level::Session),
            "acquisition" => Ok(Level::Acquisition),
            "analysis" => Ok(Level::Analysis),
            "file" => Ok(Level::File),
            _ => Err(TabmetaError::InvalidLevel(value.to_string())),
        }
    }
}

/// Platform-native opaque container IDs are 24 hex characters.
pub fn looks_like_native_id(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new("^[0-9a-fA-F]{24}$").expect("valid regex"));
    pattern.is_match(value)
}
