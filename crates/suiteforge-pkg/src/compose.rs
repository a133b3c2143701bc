//! Distribution contents and platform variants.
//!
//! A distribution packages the compile closure of its declared dependencies,
//! minus anything it excludes and anything a distribution it depends on
//! already provides. Exclusions remove a node and everything reachable only
//! through it. Results are memoized, so a distribution that several others
//! depend on is composed once per platform.

use crate::error::ErrorKind;
use crate::graph::{DistributionNode, EdgeKind, ProjectGraph};
use crate::manifest::{Distribution, OTHERS};
use crate::reference::{EntityId, NodeId};
use crate::registry::MaterializeError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors that can make a single distribution unbuildable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("unknown distribution '{0}'")]
    UnknownDistribution(String),

    #[error(
        "distribution '{distribution}' has no variant for platform {platform}; available: {}",
        .available.join(", ")
    )]
    UnsupportedPlatform {
        distribution: String,
        platform: String,
        available: Vec<String>,
    },

    #[error("distribution '{distribution}' requires library '{}': {source}", .source.library())]
    Library {
        distribution: String,
        #[source]
        source: MaterializeError,
    },

    #[error("distribution '{distribution}' depends on '{dependency}', which failed: {source}")]
    Dependency {
        distribution: String,
        dependency: String,
        #[source]
        source: Box<ComposeError>,
    },
}

impl ComposeError {
    /// Classify by root cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownDistribution(_) => ErrorKind::Manifest,
            Self::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            Self::Library { source, .. } => source.kind(),
            Self::Dependency { source, .. } => source.kind(),
        }
    }
}

/// Target operating system and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process runs on, spelled the way manifests spell it.
    #[must_use]
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "i386",
            other => other,
        };
        Self::new(os, arch)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// A distribution's contents for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDistribution {
    pub id: EntityId,
    pub platform: Platform,
    /// Absolute output path.
    pub path: PathBuf,
    /// Packaged projects in first-visit order.
    pub projects: Vec<EntityId>,
    /// Packaged libraries in first-visit order.
    pub libraries: Vec<String>,
    /// Declared distribution dependencies, then ones found in the closure.
    pub dist_dependencies: Vec<EntityId>,
    pub main_class: Option<String>,
    pub publish: bool,
    pub description: Option<String>,
    pub license: Option<String>,
}

/// Composes distributions for one platform.
pub struct DistributionComposer<'a> {
    graph: &'a ProjectGraph,
    platform: Platform,
    memo: HashMap<EntityId, Result<ResolvedDistribution, ComposeError>>,
}

impl<'a> DistributionComposer<'a> {
    pub fn new(graph: &'a ProjectGraph, platform: Platform) -> Self {
        Self {
            graph,
            platform,
            memo: HashMap::new(),
        }
    }

    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Compose a distribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the distribution is unknown, has no variant for
    /// the platform, or depends on a distribution that fails.
    pub fn compose(&mut self, id: &EntityId) -> Result<ResolvedDistribution, ComposeError> {
        if let Some(done) = self.memo.get(id) {
            return done.clone();
        }
        let result = self.compose_uncached(id);
        self.memo.insert(id.clone(), result.clone());
        result
    }

    fn compose_uncached(&mut self, id: &EntityId) -> Result<ResolvedDistribution, ComposeError> {
        let graph = self.graph;
        let node = graph
            .distribution(id)
            .ok_or_else(|| ComposeError::UnknownDistribution(id.to_string()))?;

        let mut dist_dependencies = node.dist_dependencies.clone();
        let mut provided = HashSet::new();
        for dependency in &node.dist_dependencies {
            self.provide(node, dependency, &mut provided)?;
        }

        // Distributions met inside the closure become implicit dependencies.
        let (_, _, implicit) = closure(graph, node, &provided);
        for dependency in implicit {
            if !dist_dependencies.contains(&dependency) {
                self.provide(node, &dependency, &mut provided)?;
                dist_dependencies.push(dependency);
            }
        }
        let (projects, libraries, _) = closure(graph, node, &provided);

        let path = select_path(&node.declaration, &self.platform).map_err(|available| {
            ComposeError::UnsupportedPlatform {
                distribution: id.to_string(),
                platform: self.platform.to_string(),
                available,
            }
        })?;

        debug!(
            distribution = %id,
            projects = projects.len(),
            libraries = libraries.len(),
            "distribution composed"
        );
        Ok(ResolvedDistribution {
            id: id.clone(),
            platform: self.platform.clone(),
            path: node.suite_root.join(path),
            projects,
            libraries,
            dist_dependencies,
            main_class: node.declaration.main_class.clone(),
            publish: node.declaration.publish,
            description: node.declaration.description.clone(),
            license: node.declaration.license.clone(),
        })
    }

    /// Compose a dependency and mark everything it packages as provided.
    fn provide(
        &mut self,
        node: &DistributionNode,
        dependency: &EntityId,
        provided: &mut HashSet<NodeId>,
    ) -> Result<(), ComposeError> {
        let resolved = self.compose(dependency).map_err(|source| ComposeError::Dependency {
            distribution: node.id.to_string(),
            dependency: dependency.to_string(),
            source: Box::new(source),
        })?;
        provided.insert(NodeId::Distribution(dependency.clone()));
        provided.extend(resolved.projects.into_iter().map(NodeId::Project));
        provided.extend(resolved.libraries.into_iter().map(NodeId::Library));
        Ok(())
    }
}

/// Walk compile edges from the declared dependencies without entering
/// excluded or provided nodes. Returns projects, libraries and the
/// distributions met on the way.
fn closure(
    graph: &ProjectGraph,
    node: &DistributionNode,
    provided: &HashSet<NodeId>,
) -> (Vec<EntityId>, Vec<String>, Vec<EntityId>) {
    let excluded: HashSet<&NodeId> = node.exclude.iter().collect();
    let mut projects = Vec::new();
    let mut libraries = Vec::new();
    let mut distributions = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<NodeId> = node.dependencies.iter().rev().cloned().collect();

    while let Some(current) = stack.pop() {
        if excluded.contains(&current) || provided.contains(&current) || !seen.insert(current.clone()) {
            continue;
        }
        match &current {
            NodeId::Project(id) => {
                projects.push(id.clone());
                if let Some(project) = graph.project(id) {
                    stack.extend(
                        project
                            .edges
                            .iter()
                            .rev()
                            .filter(|e| e.kind == EdgeKind::Compile)
                            .map(|e| e.target.clone()),
                    );
                }
            }
            NodeId::Library(name) => libraries.push(name.clone()),
            NodeId::Distribution(id) => {
                if *id != node.id {
                    distributions.push(id.clone());
                }
            }
        }
    }
    (projects, libraries, distributions)
}

/// Pick the output path for a platform. On failure returns the platforms
/// the distribution does support.
fn select_path(dist: &Distribution, platform: &Platform) -> Result<PathBuf, Vec<String>> {
    if dist.os_arch.is_empty() {
        return Ok(dist.default_path());
    }

    let lookups = [
        (platform.os.as_str(), platform.arch.as_str()),
        (platform.os.as_str(), OTHERS),
        (OTHERS, platform.arch.as_str()),
        (OTHERS, OTHERS),
    ];
    for (os, arch) in lookups {
        if let Some(variant) = dist.os_arch.get(os).and_then(|arches| arches.get(arch)) {
            return Ok(variant
                .path
                .as_ref()
                .map_or_else(|| dist.default_path(), PathBuf::from));
        }
    }

    Err(dist
        .os_arch
        .iter()
        .flat_map(|(os, arches)| arches.keys().map(move |arch| format!("{os}-{arch}")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::build_graph;
    use std::path::Path;

    const CHAIN: &str = r#"
[suite]
name = "app"
version = "1.0.0"

[[library]]
name = "LIB3"
urls = ["https://example.com/lib3.jar"]
sha1 = "NOCHECK"

[[project]]
name = "P1"
dependencies = ["P2"]

[[project]]
name = "P2"
dependencies = ["P3"]

[[project]]
name = "P3"
dependencies = ["LIB3"]

[[distribution]]
name = "APP"
dependencies = ["P1"]
exclude = ["P3"]

[[distribution]]
name = "FULL"
dependencies = ["P1"]
"#;

    fn id(name: &str) -> EntityId {
        EntityId::new("app", name)
    }

    #[test]
    fn test_exclusion_is_transitive() {
        let (_, _, graph) = build_graph(&[CHAIN]);
        let mut composer = DistributionComposer::new(&graph, Platform::new("linux", "amd64"));
        let app = composer.compose(&id("APP")).unwrap();
        assert_eq!(app.projects, [id("P1"), id("P2")]);
        assert!(app.libraries.is_empty());

        let full = composer.compose(&id("FULL")).unwrap();
        assert_eq!(full.projects, [id("P1"), id("P2"), id("P3")]);
        assert_eq!(full.libraries, ["LIB3"]);
        assert_eq!(full.path, Path::new("/app").join("build/dists/full.jar"));
    }

    #[test]
    fn test_dist_dependency_contents_are_not_repackaged() {
        let toml = r#"
[suite]
name = "app"
version = "1.0.0"

[[project]]
name = "api"

[[project]]
name = "impl"
dependencies = ["api"]

[[distribution]]
name = "API"
dependencies = ["api"]

[[distribution]]
name = "IMPL"
dependencies = ["impl"]
dist-dependencies = ["API"]
"#;
        let (_, _, graph) = build_graph(&[toml]);
        let mut composer = DistributionComposer::new(&graph, Platform::new("linux", "amd64"));
        let resolved = composer.compose(&id("IMPL")).unwrap();
        assert_eq!(resolved.projects, [id("impl")]);
        assert_eq!(resolved.dist_dependencies, [id("API")]);
    }

    #[test]
    fn test_distribution_in_closure_becomes_dependency() {
        let toml = r#"
[suite]
name = "app"
version = "1.0.0"

[[project]]
name = "api"

[[project]]
name = "impl"
dependencies = ["API"]

[[distribution]]
name = "API"
dependencies = ["api"]

[[distribution]]
name = "IMPL"
dependencies = ["impl"]
"#;
        let (_, _, graph) = build_graph(&[toml]);
        let mut composer = DistributionComposer::new(&graph, Platform::new("linux", "amd64"));
        let resolved = composer.compose(&id("IMPL")).unwrap();
        assert_eq!(resolved.projects, [id("impl")]);
        assert_eq!(resolved.dist_dependencies, [id("API")]);
    }

    fn native_dist(variants: &str) -> String {
        format!(
            "[suite]\nname = \"app\"\nversion = \"1.0.0\"\n\n[[distribution]]\nname = \"NATIVE\"\n{variants}"
        )
    }

    #[test]
    fn test_platform_exact_and_wildcards() {
        let toml = native_dist(
            "[distribution.os-arch.linux.amd64]\npath = \"linux-amd64.tar\"\n\
             [distribution.os-arch.linux.\"<others>\"]\npath = \"linux-any.tar\"\n\
             [distribution.os-arch.\"<others>\".aarch64]\npath = \"any-aarch64.tar\"\n",
        );
        let (_, _, graph) = build_graph(&[&toml]);
        let path = |os: &str, arch: &str| {
            DistributionComposer::new(&graph, Platform::new(os, arch))
                .compose(&id("NATIVE"))
                .map(|d| d.path)
        };
        assert_eq!(path("linux", "amd64").unwrap(), Path::new("/app/linux-amd64.tar"));
        assert_eq!(path("linux", "sparcv9").unwrap(), Path::new("/app/linux-any.tar"));
        assert_eq!(path("darwin", "aarch64").unwrap(), Path::new("/app/any-aarch64.tar"));
        assert!(path("darwin", "amd64").is_err());
    }

    #[test]
    fn test_unsupported_platform() {
        let toml = native_dist(
            "[distribution.os-arch.linux.amd64]\npath = \"l.tar\"\n\
             [distribution.os-arch.darwin.amd64]\npath = \"d.tar\"\n",
        );
        let (_, _, graph) = build_graph(&[&toml]);
        let err = DistributionComposer::new(&graph, Platform::new("solaris", "amd64"))
            .compose(&id("NATIVE"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
        match err {
            ComposeError::UnsupportedPlatform { available, platform, .. } => {
                assert_eq!(platform, "solaris-amd64");
                assert_eq!(available, ["darwin-amd64", "linux-amd64"]);
            }
            other => panic!("expected unsupported platform, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_dependency_propagates() {
        let toml = r#"
[suite]
name = "app"
version = "1.0.0"

[[distribution]]
name = "NATIVE"

[distribution.os-arch.linux.amd64]
path = "l.tar"

[[distribution]]
name = "BUNDLE"
dist-dependencies = ["NATIVE"]
"#;
        let (_, _, graph) = build_graph(&[toml]);
        let err = DistributionComposer::new(&graph, Platform::new("windows", "amd64"))
            .compose(&id("BUNDLE"))
            .unwrap_err();
        assert!(matches!(err, ComposeError::Dependency { .. }));
        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    }

    #[test]
    fn test_host_platform_spelling() {
        let host = Platform::host();
        assert_ne!(host.os, "macos");
        assert_ne!(host.arch, "x86_64");
    }
}
