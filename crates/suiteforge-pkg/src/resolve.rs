//! End-to-end resolution: suites, libraries, graph, and per-platform plans.
//!
//! [`Resolver::resolve`] performs the structural work once and returns an
//! immutable [`Resolution`]. Structural failures (manifest errors, conflicts,
//! cycles) abort it. [`Resolution::plan`] then composes the requested
//! distributions for a platform; failures there are recorded per
//! distribution and never abort the others.

use crate::compose::{ComposeError, DistributionComposer, Platform, ResolvedDistribution};
use crate::config::Config;
use crate::digest::{ChecksumVerifier, StandardVerifier};
use crate::error::{ConflictError, ResolveError};
use crate::fetch::{KindFetcher, SuiteFetcher};
use crate::graph::ProjectGraph;
use crate::imports::{ImportResolver, ResolvedSuite, SuiteSet};
use crate::loader::{ManifestLoader, TomlManifestLoader};
use crate::manifest::{ConflictPolicy, ManifestError};
use crate::planner::{BuildOrder, BuildPlanner};
use crate::reference::{EntityId, Reference};
use crate::registry::{ArtifactRegistry, LibraryStatus};
use crate::transport::{HttpTransport, Transport};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolves a root suite into a [`Resolution`].
pub struct Resolver {
    config: Config,
    loader: Arc<dyn ManifestLoader>,
    fetcher: Option<Arc<dyn SuiteFetcher>>,
    transport: Option<Arc<dyn Transport>>,
    verifier: Arc<dyn ChecksumVerifier>,
    conflict_resolution: Option<ConflictPolicy>,
}

impl Resolver {
    /// Create a resolver using the default collaborators.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            loader: Arc::new(TomlManifestLoader),
            fetcher: None,
            transport: None,
            verifier: Arc::new(StandardVerifier),
            conflict_resolution: None,
        }
    }

    /// Use a different manifest loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ManifestLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Use a different suite fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SuiteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a different artifact transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a different checksum verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn ChecksumVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace every suite's conflict policy. Takes precedence over the
    /// configuration file.
    #[must_use]
    pub fn with_conflict_resolution(mut self, policy: Option<ConflictPolicy>) -> Self {
        self.conflict_resolution = policy;
        self
    }

    /// Resolve the suite in `root` and everything it imports.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid manifests, unfetchable imports, revision
    /// or digest conflicts, ambiguous or dangling references, and cycles.
    pub fn resolve(&self, root: &Path) -> Result<Resolution, ResolveError> {
        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let fetcher: Arc<dyn SuiteFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(KindFetcher::new(&self.config, Arc::clone(&transport))),
        };

        let policy = self.conflict_resolution.or(self.config.conflict_resolution);
        let suites = ImportResolver::new(self.loader.as_ref(), fetcher.as_ref())
            .with_policy_override(policy)
            .resolve(root)?;
        for note in suites.notes() {
            warn!("{note}");
        }

        let mut registry = ArtifactRegistry::new(
            self.config.library_cache(),
            transport,
            Arc::clone(&self.verifier),
        );
        for suite in suites.iter() {
            for library in &suite.manifest.libraries {
                registry.register(&suite.name, &suite.root, library)?;
            }
        }

        let graph = ProjectGraph::build(&suites, &registry)?;
        info!(
            suites = suites.len(),
            libraries = registry.len(),
            "resolution complete"
        );
        Ok(Resolution {
            suites,
            registry,
            graph,
        })
    }
}

/// The merged, validated state of one invocation.
pub struct Resolution {
    pub suites: SuiteSet,
    pub registry: ArtifactRegistry,
    pub graph: ProjectGraph,
}

/// What to plan.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub distributions: Vec<EntityId>,
    pub platform: Platform,
    /// Download and verify required libraries.
    pub materialize: bool,
}

/// State of a library required by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryState {
    pub status: LibraryStatus,
    pub path: Option<PathBuf>,
    pub resource: bool,
}

/// A build plan for one platform.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub platform: Platform,
    /// Steps for the distributions that resolved successfully.
    pub order: BuildOrder,
    /// Libraries required by the successful distributions.
    pub libraries: BTreeMap<String, LibraryState>,
    pub distributions: BTreeMap<EntityId, Result<ResolvedDistribution, ComposeError>>,
}

impl BuildPlan {
    /// Distributions that could not be planned.
    pub fn failures(&self) -> impl Iterator<Item = (&EntityId, &ComposeError)> {
        self.distributions
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|err| (id, err)))
    }

    /// Returns true if every requested distribution was planned.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl Resolution {
    /// Look up a distribution by `NAME` or `suite:NAME`. A bare name is
    /// looked up in the root suite first, then in every other suite.
    ///
    /// # Errors
    ///
    /// Returns an error if no distribution matches, or a bare name matches
    /// distributions in several imported suites.
    pub fn distribution_id(&self, name: &str) -> Result<EntityId, ResolveError> {
        let reference = Reference::parse(name);
        let declares = |suite: &&ResolvedSuite| {
            suite.manifest.distribution(&reference.name).is_some()
        };

        let candidates: Vec<&str> = match &reference.suite {
            Some(suite) => self
                .suites
                .get(suite)
                .filter(declares)
                .map(|s| s.name.as_str())
                .into_iter()
                .collect(),
            None if declares(&self.suites.root()) => vec![self.suites.root().name.as_str()],
            None => self
                .suites
                .iter()
                .filter(declares)
                .map(|s| s.name.as_str())
                .collect(),
        };

        match candidates.as_slice() {
            [suite] => Ok(EntityId::new(*suite, reference.name)),
            [] => Err(ManifestError::UnresolvedReference {
                owner: "the command line".to_string(),
                reference: name.to_string(),
                reason: "no such distribution".to_string(),
            }
            .into()),
            many => Err(ConflictError::AmbiguousReference {
                owner: "the command line".to_string(),
                reference: name.to_string(),
                candidates: many.iter().map(|s| (*s).to_string()).collect(),
            }
            .into()),
        }
    }

    /// Distributions declared by the root suite.
    #[must_use]
    pub fn root_distributions(&self) -> Vec<EntityId> {
        let root = self.suites.root();
        root.manifest
            .distributions
            .iter()
            .map(|d| EntityId::new(&root.name, &d.name))
            .collect()
    }

    /// Build a plan for the requested distributions on one platform.
    ///
    /// A distribution that cannot be composed for the platform, or whose
    /// libraries fail to materialize, is marked failed; the order covers
    /// the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the order itself cannot be computed.
    pub fn plan(&self, request: &PlanRequest) -> Result<BuildPlan, ResolveError> {
        let planner = BuildPlanner::new(&self.graph, &self.registry);
        let mut composer = DistributionComposer::new(&self.graph, request.platform.clone());

        let mut distributions = BTreeMap::new();
        for id in &request.distributions {
            distributions.insert(id.clone(), composer.compose(id));
        }

        let mut required: BTreeMap<EntityId, BTreeSet<String>> = BTreeMap::new();
        for (id, resolved) in &distributions {
            if let Ok(resolved) = resolved {
                let mut libraries: BTreeSet<String> = resolved.libraries.iter().cloned().collect();
                for step in planner.order(std::slice::from_ref(id))?.steps() {
                    libraries.extend(step.libraries.iter().cloned());
                    libraries.extend(step.resources.iter().cloned());
                }
                required.insert(id.clone(), libraries);
            }
        }

        if request.materialize {
            let all: BTreeSet<&str> = required.values().flatten().map(String::as_str).collect();
            info!(libraries = all.len(), "materializing required libraries");
            let outcomes = self.registry.materialize_all(all);
            for (id, libraries) in &required {
                let failure = libraries
                    .iter()
                    .find_map(|name| outcomes.get(name).and_then(|r| r.as_ref().err()));
                if let Some(err) = failure {
                    warn!(distribution = %id, "distribution dropped: {err}");
                    distributions.insert(
                        id.clone(),
                        Err(ComposeError::Library {
                            distribution: id.to_string(),
                            source: err.clone(),
                        }),
                    );
                }
            }
        }

        let planned: Vec<EntityId> = distributions
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(id, _)| id.clone())
            .collect();
        let order = planner.order(&planned)?;

        let libraries = required
            .iter()
            .filter(|(id, _)| planned.contains(id))
            .flat_map(|(_, libraries)| libraries)
            .filter_map(|name| {
                let library = self.registry.get(name)?;
                Some((
                    name.clone(),
                    LibraryState {
                        status: self.registry.status(name)?,
                        path: self.registry.resolved_path(name),
                        resource: library.resource,
                    },
                ))
            })
            .collect();

        Ok(BuildPlan {
            platform: request.platform.clone(),
            order,
            libraries,
            distributions,
        })
    }
}
