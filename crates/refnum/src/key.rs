use core::{fmt, str::FromStr};
use std::sync::Arc;

use crate::{EntityType, Error};

/// An opaque organization (tenant) identifier.
///
/// The allocator never interprets the identifier: it is whatever the host
/// application uses as the primary key of an organization (a UUID, a ULID, a
/// slug). The only requirement is that it is not blank. Cloning is cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct OrganizationId(Arc<str>);

impl OrganizationId {
    /// Wraps an organization identifier.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOrganization`] if `id` is empty or only
    /// whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidOrganization);
        }
        Ok(Self(Arc::from(id)))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrganizationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OrganizationId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrganizationId> for String {
    fn from(value: OrganizationId) -> Self {
        value.0.to_string()
    }
}

/// Identifies one counter: a single `(organization, entity type)` pair.
///
/// Counters for distinct keys are fully independent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    /// The owning organization.
    pub organization: OrganizationId,
    /// The kind of entity the counter numbers.
    pub entity_type: EntityType,
}

impl CounterKey {
    /// Creates a key for `organization` and `entity_type`.
    #[must_use]
    pub const fn new(organization: OrganizationId, entity_type: EntityType) -> Self {
        Self {
            organization,
            entity_type,
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.entity_type)
    }
}
