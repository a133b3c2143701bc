//! Entity identities and dependency references.
//!
//! Manifests refer to other entities by bare name (`ANTLR-3.5`) or by
//! suite-qualified name (`truffle:TRUFFLE_API`). References are resolved once
//! while the project graph is built and from then on every edge carries a
//! [`NodeId`] that says exactly what it points at.

use serde::{Deserialize, Serialize};

/// Separator between a suite name and an entity name.
pub const QUALIFIER: char = ':';

/// The kinds of entity a suite declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Distribution,
    Library,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => f.write_str("project"),
            Self::Distribution => f.write_str("distribution"),
            Self::Library => f.write_str("library"),
        }
    }
}

/// A dependency reference as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Suite qualifier, if present.
    pub suite: Option<String>,
    /// Entity name.
    pub name: String,
}

impl Reference {
    /// Split a raw reference into its optional suite qualifier and name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(QUALIFIER) {
            Some((suite, name)) => Self {
                suite: Some(suite.to_string()),
                name: name.to_string(),
            },
            None => Self {
                suite: None,
                name: raw.to_string(),
            },
        }
    }

    /// Returns true if the reference names its suite.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.suite.is_some()
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suite {
            Some(suite) => write!(f, "{suite}{QUALIFIER}{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Identity of a suite-scoped entity (project or distribution).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub suite: String,
    pub name: String,
}

impl EntityId {
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{QUALIFIER}{}", self.suite, self.name)
    }
}

/// A resolved reference. Libraries live in one global namespace; projects
/// and distributions are scoped by their suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NodeId {
    Project(EntityId),
    Distribution(EntityId),
    Library(String),
}

impl NodeId {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Project(_) => EntityKind::Project,
            Self::Distribution(_) => EntityKind::Distribution,
            Self::Library(_) => EntityKind::Library,
        }
    }

    #[must_use]
    pub fn as_project(&self) -> Option<&EntityId> {
        match self {
            Self::Project(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_distribution(&self) -> Option<&EntityId> {
        match self {
            Self::Distribution(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_library(&self) -> Option<&str> {
        match self {
            Self::Library(id) => Some(id),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(id) | Self::Distribution(id) => id.fmt(f),
            Self::Library(id) => f.write_str(id),
        }
    }
}
