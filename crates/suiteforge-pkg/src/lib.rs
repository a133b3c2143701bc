//! Suite management for multi-repository build systems.
//!
//! This crate provides:
//! - Parsing and validation of `suite.toml` manifests
//! - Transitive suite import resolution with revision conflict policies
//! - A global, deduplicated library registry with checksum verification
//! - The project and distribution dependency graph with cycle detection
//! - Per-platform distribution composition
//! - Deterministic, layered build ordering and handler dispatch

mod compose;
mod config;
mod digest;
mod dispatch;
mod error;
mod fetch;
mod graph;
mod imports;
mod loader;
mod manifest;
mod planner;
mod reference;
mod registry;
mod resolve;
mod transport;

#[cfg(test)]
mod testing;

pub use compose::{ComposeError, DistributionComposer, Platform, ResolvedDistribution};
pub use config::{Config, ConfigError, CACHE_DIR_ENV, CONFIG_ENV};
pub use digest::{
    ChecksumVerifier, Digest, DigestAlgorithm, DigestError, DigestRequirement, StandardVerifier,
    NO_CHECK,
};
pub use dispatch::{DispatchError, HandlerRegistry, StepHandler, TemplateHandler};
pub use error::{ConflictError, ErrorKind, ResolveError};
pub use fetch::{
    BinaryFetcher, DirectoryFetcher, GitFetcher, KindFetcher, RevisionStamp, Snapshot,
    SuiteFetcher,
};
pub use graph::{
    DistributionNode, Edge, EdgeKind, Handler, LinkLibraries, Phase, PhaseNode, ProjectGraph,
    ProjectNode,
};
pub use imports::{ConflictNote, ImportEdge, ImportResolver, ResolvedSuite, SuiteSet};
pub use loader::{ManifestLoader, TomlManifestLoader};
pub use manifest::{
    ConflictPolicy, Distribution, ImportLocation, Library, License, LocationKind, ManifestError,
    PlatformVariant, Project, Repository, SuiteImport, SuiteInfo, SuiteManifest, MANIFEST_FILE,
    OTHERS,
};
pub use planner::{BuildOrder, BuildPlanner, BuildStep};
pub use reference::{EntityId, EntityKind, NodeId, Reference, QUALIFIER};
pub use registry::{ArtifactRegistry, LibraryStatus, MaterializeError, RegisteredLibrary};
pub use resolve::{BuildPlan, LibraryState, PlanRequest, Resolution, Resolver};
pub use transport::{local_path, FetchError, HttpTransport, Transport};
