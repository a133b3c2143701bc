//! Fixtures shared by unit tests.

use crate::digest::StandardVerifier;
use crate::error::ResolveError;
use crate::graph::ProjectGraph;
use crate::imports::{ImportEdge, ResolvedSuite, SuiteSet};
use crate::manifest::SuiteManifest;
use crate::registry::ArtifactRegistry;
use crate::transport::{FetchError, Transport};
use std::path::PathBuf;
use std::sync::Arc;

/// A transport with nothing behind it.
pub(crate) struct OfflineTransport;

impl Transport for OfflineTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::NotFound {
            location: url.to_string(),
        })
    }
}

/// A suite set from manifests already in resolution order. Each suite is
/// rooted at `/<name>`.
pub(crate) fn suite_set(manifests: &[&str]) -> SuiteSet {
    let parsed: Vec<SuiteManifest> = manifests
        .iter()
        .map(|toml| SuiteManifest::parse(toml).unwrap())
        .collect();

    let mut edges = Vec::new();
    for manifest in &parsed {
        for import in &manifest.imports {
            edges.push(ImportEdge {
                importer: manifest.name().to_string(),
                imported: import.name.clone(),
                revision: import.revision.clone(),
            });
        }
    }

    let suites = parsed
        .into_iter()
        .enumerate()
        .map(|(index, manifest)| ResolvedSuite {
            name: manifest.name().to_string(),
            root: PathBuf::from(format!("/{}", manifest.name())),
            revision: (index > 0).then(|| "test".to_string()),
            stamp: None,
            location: None,
            index,
            manifest,
        })
        .collect();
    SuiteSet::new(suites, edges, Vec::new())
}

/// Register every library and build the project graph.
pub(crate) fn try_build_graph(
    manifests: &[&str],
) -> Result<(SuiteSet, ArtifactRegistry, ProjectGraph), ResolveError> {
    let suites = suite_set(manifests);
    let mut registry = ArtifactRegistry::new(
        "/cache",
        Arc::new(OfflineTransport),
        Arc::new(StandardVerifier),
    );
    for suite in suites.iter() {
        for library in &suite.manifest.libraries {
            registry.register(&suite.name, &suite.root, library)?;
        }
    }
    let graph = ProjectGraph::build(&suites, &registry)?;
    Ok((suites, registry, graph))
}

pub(crate) fn build_graph(manifests: &[&str]) -> (SuiteSet, ArtifactRegistry, ProjectGraph) {
    try_build_graph(manifests).unwrap()
}
