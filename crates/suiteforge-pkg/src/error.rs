//! Resolution errors and their classification.

use crate::compose::ComposeError;
use crate::manifest::ManifestError;
use crate::registry::MaterializeError;
use crate::transport::FetchError;
use thiserror::Error;

/// Two declarations that cannot both hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The same suite is pinned to different revisions under the strict policy.
    #[error(
        "suite '{suite}' is imported at revision {pinned} by '{pinned_by}' and at revision {requested} by '{requested_by}'"
    )]
    SuiteRevision {
        suite: String,
        pinned: String,
        pinned_by: String,
        requested: String,
        requested_by: String,
    },

    /// An unqualified reference matches entities in more than one imported suite.
    #[error(
        "reference '{reference}' in {owner} is ambiguous; it is declared by suites: {}",
        .candidates.join(", ")
    )]
    AmbiguousReference {
        owner: String,
        reference: String,
        candidates: Vec<String>,
    },

    /// Two suites declare the same library with different digests.
    #[error(
        "library '{library}' is declared by '{first_suite}' with {first} and by '{second_suite}' with {second}"
    )]
    LibraryDigest {
        library: String,
        first_suite: String,
        first: String,
        second_suite: String,
        second: String,
    },
}

/// Errors that can occur while resolving suites into a build plan.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// Steps left over after ordering. Only reachable if cycle detection
    /// missed a cycle.
    #[error("could not order build steps: {}", .remaining.join(", "))]
    Unorderable { remaining: Vec<String> },
}

/// Broad error classes, one per process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Manifest,
    Conflict,
    Cycle,
    UnsupportedPlatform,
    Fetch,
    Verification,
    Other,
}

impl ErrorKind {
    /// The process exit code for this class.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Other => 1,
            Self::Manifest => 2,
            Self::Conflict => 3,
            Self::Cycle => 4,
            Self::UnsupportedPlatform => 5,
            Self::Fetch => 6,
            Self::Verification => 7,
        }
    }
}

impl ResolveError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Manifest(_) => ErrorKind::Manifest,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::CyclicDependency { .. } => ErrorKind::Cycle,
            Self::Compose(err) => err.kind(),
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Materialize(err) => err.kind(),
            Self::Unorderable { .. } => ErrorKind::Other,
        }
    }
}
