use core::{fmt, str::FromStr};

use crate::EntityType;

/// Separator between the prefix and the numeric part of a reference.
pub const SEPARATOR: char = '-';

/// A human readable, per-organization unique identifier such as `WI-123`.
///
/// A reference is derived from the entity type's fixed prefix and a value
/// issued by a counter store. It is attached to an entity once, at creation
/// time, and never changes afterwards.
///
/// # Example
/// ```
/// use refnum::{EntityType, Reference};
///
/// let reference = Reference::new(EntityType::WorkItem, 123);
/// assert_eq!(reference.to_string(), "WI-123");
///
/// let parsed: Reference = "O-7".parse().unwrap();
/// assert_eq!(parsed, Reference::new(EntityType::Objective, 7));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Reference {
    entity_type: EntityType,
    value: u64,
}

impl Reference {
    /// Combines an entity type and a counter value.
    #[must_use]
    pub const fn new(entity_type: EntityType, value: u64) -> Self {
        Self { entity_type, value }
    }

    /// The entity type the reference belongs to.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// The numeric part of the reference.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.entity_type.prefix(), self.value)
    }
}

/// Errors produced while parsing a [`Reference`] or an [`EntityType`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseReferenceError {
    /// The input has no `-` between prefix and number.
    #[error("reference `{0}` is missing the `-` separator")]
    MissingSeparator(String),

    /// The prefix does not belong to any entity type.
    #[error("unknown reference prefix `{0}`")]
    UnknownPrefix(String),

    /// The numeric part is empty, not decimal, zero, or out of range.
    #[error("invalid reference number `{0}`")]
    InvalidValue(String),

    /// The entity type tag is not one of the supported tags.
    #[error("unknown entity type `{0}`")]
    UnknownEntityType(String),
}

impl FromStr for Reference {
    type Err = ParseReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, digits) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| ParseReferenceError::MissingSeparator(s.to_owned()))?;

        let entity_type = EntityType::from_prefix(prefix)
            .ok_or_else(|| ParseReferenceError::UnknownPrefix(prefix.to_owned()))?;

        // `u64::from_str` accepts a leading `+`, references never carry one.
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseReferenceError::InvalidValue(digits.to_owned()));
        }
        let value = digits
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ParseReferenceError::InvalidValue(digits.to_owned()))?;

        Ok(Self::new(entity_type, value))
    }
}

impl TryFrom<String> for Reference {
    type Error = ParseReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Reference> for String {
    fn from(value: Reference) -> Self {
        value.to_string()
    }
}
