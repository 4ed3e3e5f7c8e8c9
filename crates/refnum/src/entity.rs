use core::{fmt, str::FromStr};

use crate::ParseReferenceError;

/// The kinds of domain objects that carry a human readable reference.
///
/// The set is closed: every tag maps to a fixed prefix that is part of the
/// externally visible reference (`WI-123`, `O-7`, ...). Prefixes are not
/// configurable at runtime.
///
/// With the `serde` feature enabled, tags serialize as their kebab-case
/// names (`"work-item"`, `"key-result"`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EntityType {
    /// A work item (task, bug, story). Prefix `WI`.
    WorkItem,
    /// A feature, also called an initiative. Prefix `I`.
    Feature,
    /// A key result belonging to an objective. Prefix `KR`.
    KeyResult,
    /// An objective. Prefix `O`.
    Objective,
}

impl EntityType {
    /// Every supported entity type, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::WorkItem,
        Self::Feature,
        Self::KeyResult,
        Self::Objective,
    ];

    /// Returns the fixed reference prefix for this entity type.
    ///
    /// # Example
    /// ```
    /// use refnum::EntityType;
    ///
    /// assert_eq!(EntityType::WorkItem.prefix(), "WI");
    /// assert_eq!(EntityType::KeyResult.prefix(), "KR");
    /// ```
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::WorkItem => "WI",
            Self::Feature => "I",
            Self::KeyResult => "KR",
            Self::Objective => "O",
        }
    }

    /// Returns the kebab-case tag used for storage and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkItem => "work-item",
            Self::Feature => "feature",
            Self::KeyResult => "key-result",
            Self::Objective => "objective",
        }
    }

    /// Looks up the entity type owning a reference prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.prefix() == prefix)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| ParseReferenceError::UnknownEntityType(s.to_owned()))
    }
}
