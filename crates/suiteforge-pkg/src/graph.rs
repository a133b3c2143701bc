//! The merged project graph.
//!
//! Projects and distributions from every resolved suite become nodes keyed by
//! [`EntityId`]; libraries stay in the registry's global namespace. Every
//! manifest reference is resolved exactly once here, so later stages only see
//! tagged [`NodeId`]s.
//!
//! Build ordering works on *phase nodes*: each project has a compile phase,
//! and projects with annotation processors or generated dependencies also
//! have a generate phase that runs first. Edges constrain phases as follows:
//!
//! | edge P → Q  | constraint                                              |
//! |-------------|---------------------------------------------------------|
//! | `Compile`   | compile(P) after compile(Q)                             |
//! | `Generated` | generate(P) after generate(Q), or compile(Q) if Q has no generate phase |
//! | `Processor` | generate(P) after compile(Q)                            |
//!
//! A distribution used as a target stands for the projects it contains.

use crate::error::{ConflictError, ResolveError};
use crate::imports::{ResolvedSuite, SuiteSet};
use crate::manifest::{Distribution, ManifestError, Project};
use crate::reference::{EntityId, EntityKind, NodeId, Reference};
use crate::registry::ArtifactRegistry;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::path::PathBuf;
use tracing::debug;

/// Build phase of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generate,
    Compile,
}

/// How a project depends on another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Ordinary dependency: needed to compile and packaged with the project.
    Compile,
    /// Its generated sources must exist before this project generates.
    Generated,
    /// Runs as an annotation processor during this project's generate phase.
    Processor,
}

/// Build handler for a project's compile step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handler {
    DefaultCompile,
    Native,
    Custom(String),
}

impl Handler {
    /// The handler for a declared project: an explicit class wins over the
    /// native flag.
    #[must_use]
    pub fn for_project(project: &Project) -> Self {
        match (&project.class, project.native) {
            (Some(class), _) => Self::Custom(class.clone()),
            (None, true) => Self::Native,
            (None, false) => Self::DefaultCompile,
        }
    }

    /// Parse a handler token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "default-compile" => Some(Self::DefaultCompile),
            "native" => Some(Self::Native),
            _ => token
                .strip_prefix("custom:")
                .filter(|class| !class.is_empty())
                .map(|class| Self::Custom(class.to_string())),
        }
    }
}

impl std::fmt::Display for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultCompile => f.write_str("default-compile"),
            Self::Native => f.write_str("native"),
            Self::Custom(class) => write!(f, "custom:{class}"),
        }
    }
}

impl Serialize for Handler {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: NodeId,
}

/// A project with its references resolved.
#[derive(Debug, Clone)]
pub struct ProjectNode {
    pub id: EntityId,
    pub suite_index: usize,
    pub decl_index: usize,
    pub handler: Handler,
    /// Whether the project has a generate phase.
    pub generates: bool,
    /// Absolute source roots.
    pub source_dirs: Vec<PathBuf>,
    /// Absolute output directory.
    pub output: PathBuf,
    /// Edges in declaration order: dependencies, generated dependencies,
    /// then annotation processors.
    pub edges: Vec<Edge>,
    pub working_sets: Vec<String>,
    pub license: Option<String>,
}

/// A distribution with its references resolved.
#[derive(Debug, Clone)]
pub struct DistributionNode {
    pub id: EntityId,
    pub suite_index: usize,
    pub decl_index: usize,
    /// Checkout directory of the declaring suite.
    pub suite_root: PathBuf,
    pub dependencies: Vec<NodeId>,
    pub exclude: Vec<NodeId>,
    pub dist_dependencies: Vec<EntityId>,
    /// The declaration, for paths, platform variants and metadata.
    pub declaration: Distribution,
}

/// One build phase of one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PhaseNode {
    pub project: EntityId,
    pub phase: Phase,
}

impl PhaseNode {
    #[must_use]
    pub fn compile(project: &EntityId) -> Self {
        Self {
            project: project.clone(),
            phase: Phase::Compile,
        }
    }

    #[must_use]
    pub fn generate(project: &EntityId) -> Self {
        Self {
            project: project.clone(),
            phase: Phase::Generate,
        }
    }
}

impl std::fmt::Display for PhaseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.phase {
            Phase::Compile => self.project.fmt(f),
            Phase::Generate => write!(f, "{} (generate)", self.project),
        }
    }
}

/// Libraries a project needs, split by use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkLibraries {
    pub link: Vec<String>,
    pub resources: Vec<String>,
}

/// Projects and distributions of the whole resolved set.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    projects: Vec<ProjectNode>,
    project_index: HashMap<EntityId, usize>,
    distributions: Vec<DistributionNode>,
    distribution_index: HashMap<EntityId, usize>,
}

impl ProjectGraph {
    /// Build the graph, resolve every reference and reject cycles.
    ///
    /// # Errors
    ///
    /// Returns a manifest error for unresolvable or mistyped references, a
    /// conflict for ambiguous ones, and a cyclic dependency error naming the
    /// full cycle.
    pub fn build(suites: &SuiteSet, registry: &ArtifactRegistry) -> Result<Self, ResolveError> {
        let mut graph = Self {
            projects: Vec::new(),
            project_index: HashMap::new(),
            distributions: Vec::new(),
            distribution_index: HashMap::new(),
        };

        for suite in suites.iter() {
            let resolver = ReferenceResolver {
                suites,
                registry,
                suite,
                visible: suites.visible_from(&suite.name),
            };

            for (decl_index, project) in suite.manifest.projects.iter().enumerate() {
                let node = resolver.project(project, decl_index)?;
                graph.project_index.insert(node.id.clone(), graph.projects.len());
                graph.projects.push(node);
            }
            for (decl_index, dist) in suite.manifest.distributions.iter().enumerate() {
                let node = resolver.distribution(dist, decl_index)?;
                graph
                    .distribution_index
                    .insert(node.id.clone(), graph.distributions.len());
                graph.distributions.push(node);
            }
        }

        graph.check_cycles()?;
        debug!(
            projects = graph.projects.len(),
            distributions = graph.distributions.len(),
            "project graph built"
        );
        Ok(graph)
    }

    /// Projects in (suite, declaration) order.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectNode> {
        self.projects.iter()
    }

    /// Distributions in (suite, declaration) order.
    pub fn distributions(&self) -> impl Iterator<Item = &DistributionNode> {
        self.distributions.iter()
    }

    #[must_use]
    pub fn project(&self, id: &EntityId) -> Option<&ProjectNode> {
        self.project_index.get(id).map(|&i| &self.projects[i])
    }

    #[must_use]
    pub fn distribution(&self, id: &EntityId) -> Option<&DistributionNode> {
        self.distribution_index.get(id).map(|&i| &self.distributions[i])
    }

    /// Every phase node, in (suite, declaration, phase) order.
    #[must_use]
    pub fn phase_nodes(&self) -> Vec<PhaseNode> {
        let mut nodes = Vec::new();
        for project in &self.projects {
            if project.generates {
                nodes.push(PhaseNode::generate(&project.id));
            }
            nodes.push(PhaseNode::compile(&project.id));
        }
        nodes
    }

    /// Deterministic sort key of a phase node.
    #[must_use]
    pub fn order_key(&self, node: &PhaseNode) -> (usize, usize, Phase) {
        self.project(&node.project).map_or(
            (usize::MAX, usize::MAX, node.phase),
            |p| (p.suite_index, p.decl_index, node.phase),
        )
    }

    /// Projects a distribution stands for: its project entries plus the
    /// projects of any distribution it contains or depends on.
    #[must_use]
    pub fn member_projects(&self, dist: &EntityId) -> Vec<EntityId> {
        let mut members = Vec::new();
        let mut seen_members = HashSet::new();
        let mut seen_dists = HashSet::new();
        self.collect_members(dist, &mut members, &mut seen_members, &mut seen_dists);
        members
    }

    fn collect_members(
        &self,
        dist: &EntityId,
        members: &mut Vec<EntityId>,
        seen_members: &mut HashSet<EntityId>,
        seen_dists: &mut HashSet<EntityId>,
    ) {
        if !seen_dists.insert(dist.clone()) {
            return;
        }
        let Some(node) = self.distribution(dist) else {
            return;
        };
        for dependency in &node.dependencies {
            match dependency {
                NodeId::Project(id) => {
                    if seen_members.insert(id.clone()) {
                        members.push(id.clone());
                    }
                }
                NodeId::Distribution(id) => self.collect_members(id, members, seen_members, seen_dists),
                NodeId::Library(_) => {}
            }
        }
        for id in &node.dist_dependencies {
            self.collect_members(id, members, seen_members, seen_dists);
        }
    }

    /// Projects a dependency target stands for.
    fn target_projects(&self, target: &NodeId) -> Vec<EntityId> {
        match target {
            NodeId::Project(id) => vec![id.clone()],
            NodeId::Distribution(id) => self.member_projects(id),
            NodeId::Library(_) => Vec::new(),
        }
    }

    /// Phase nodes that must complete before `node`.
    #[must_use]
    pub fn prerequisites(&self, node: &PhaseNode) -> Vec<PhaseNode> {
        let Some(project) = self.project(&node.project) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut push = |n: PhaseNode| {
            if !out.contains(&n) {
                out.push(n);
            }
        };

        match node.phase {
            Phase::Compile => {
                if project.generates {
                    push(PhaseNode::generate(&project.id));
                }
                for edge in project.edges.iter().filter(|e| e.kind == EdgeKind::Compile) {
                    for id in self.target_projects(&edge.target) {
                        push(PhaseNode::compile(&id));
                    }
                }
            }
            Phase::Generate => {
                for edge in &project.edges {
                    match edge.kind {
                        EdgeKind::Compile => {}
                        EdgeKind::Generated => {
                            for id in self.target_projects(&edge.target) {
                                let generates = self.project(&id).is_some_and(|p| p.generates);
                                push(if generates {
                                    PhaseNode::generate(&id)
                                } else {
                                    PhaseNode::compile(&id)
                                });
                            }
                        }
                        EdgeKind::Processor => {
                            for id in self.target_projects(&edge.target) {
                                push(PhaseNode::compile(&id));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Libraries reachable from a project over compile edges, in
    /// first-visit order, split into linkable and resource-only.
    #[must_use]
    pub fn link_libraries(&self, project: &EntityId, registry: &ArtifactRegistry) -> LinkLibraries {
        let mut libraries = LinkLibraries::default();
        let mut seen_libraries = HashSet::new();
        let mut seen = HashSet::new();
        let mut stack = vec![NodeId::Project(project.clone())];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            let next: Vec<NodeId> = match &node {
                NodeId::Library(name) => {
                    if seen_libraries.insert(name.clone()) {
                        let resource = registry.get(name).is_some_and(|l| l.resource);
                        if resource {
                            libraries.resources.push(name.clone());
                        } else {
                            libraries.link.push(name.clone());
                        }
                    }
                    Vec::new()
                }
                NodeId::Project(id) => self
                    .project(id)
                    .map(|p| {
                        p.edges
                            .iter()
                            .filter(|e| e.kind == EdgeKind::Compile)
                            .map(|e| e.target.clone())
                            .collect()
                    })
                    .unwrap_or_default(),
                NodeId::Distribution(id) => self
                    .distribution(id)
                    .map(|d| d.dependencies.clone())
                    .unwrap_or_default(),
            };
            stack.extend(next.into_iter().rev());
        }
        libraries
    }

    fn check_cycles(&self) -> Result<(), ResolveError> {
        let dist_roots: Vec<EntityId> = self.distributions.iter().map(|d| d.id.clone()).collect();
        let dist_cycle = find_cycle(dist_roots, |id| {
            self.distribution(id)
                .map(|d| {
                    d.dist_dependencies
                        .iter()
                        .cloned()
                        .chain(d.dependencies.iter().filter_map(|n| n.as_distribution().cloned()))
                        .collect()
                })
                .unwrap_or_default()
        });
        if let Some(cycle) = dist_cycle {
            return Err(ResolveError::CyclicDependency {
                cycle: cycle.iter().map(ToString::to_string).collect(),
            });
        }

        if let Some(cycle) = find_cycle(self.phase_nodes(), |node| self.prerequisites(node)) {
            return Err(ResolveError::CyclicDependency {
                cycle: cycle.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first search for a cycle reachable from `roots`.
///
/// Returns the cycle as a path whose first and last elements are the same
/// node.
pub(crate) fn find_cycle<N, F>(roots: Vec<N>, mut successors: F) -> Option<Vec<N>>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> Vec<N>,
{
    let mut marks: HashMap<N, Mark> = HashMap::new();

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root.clone(), Mark::InProgress);
        let children = successors(&root);
        let mut stack: Vec<(N, Vec<N>, usize)> = vec![(root, children, 0)];

        while let Some((_, children, next)) = stack.last_mut() {
            if *next >= children.len() {
                if let Some((node, _, _)) = stack.pop() {
                    marks.insert(node, Mark::Done);
                }
                continue;
            }
            let child = children[*next].clone();
            *next += 1;

            match marks.get(&child) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => {
                    let start = stack.iter().position(|(n, _, _)| *n == child)?;
                    let mut cycle: Vec<N> = stack[start..].iter().map(|(n, _, _)| n.clone()).collect();
                    cycle.push(child);
                    return Some(cycle);
                }
                None => {
                    marks.insert(child.clone(), Mark::InProgress);
                    let grandchildren = successors(&child);
                    stack.push((child, grandchildren, 0));
                }
            }
        }
    }
    None
}

/// Resolves references written in one suite.
struct ReferenceResolver<'a> {
    suites: &'a SuiteSet,
    registry: &'a ArtifactRegistry,
    suite: &'a ResolvedSuite,
    visible: BTreeSet<String>,
}

impl ReferenceResolver<'_> {
    fn project(&self, project: &Project, decl_index: usize) -> Result<ProjectNode, ResolveError> {
        let id = EntityId::new(&self.suite.name, &project.name);
        let owner = format!("project '{id}'");

        let mut edges = Vec::new();
        for raw in &project.dependencies {
            edges.push(Edge {
                kind: EdgeKind::Compile,
                target: self.resolve(&owner, raw)?,
            });
        }
        for raw in &project.generated_dependencies {
            let target = self.resolve(&owner, raw)?;
            if let NodeId::Library(_) = target {
                return Err(ManifestError::WrongKind {
                    owner,
                    reference: raw.clone(),
                    expected: EntityKind::Project,
                    found: EntityKind::Library,
                }
                .into());
            }
            edges.push(Edge {
                kind: EdgeKind::Generated,
                target,
            });
        }
        for raw in &project.annotation_processors {
            edges.push(Edge {
                kind: EdgeKind::Processor,
                target: self.resolve(&owner, raw)?,
            });
        }

        let project_dir = self.suite.root.join(&project.name);
        let output = match &project.output {
            Some(output) => self.suite.root.join(output),
            None => self.suite.root.join("build").join(&project.name),
        };

        Ok(ProjectNode {
            handler: Handler::for_project(project),
            generates: !project.annotation_processors.is_empty()
                || !project.generated_dependencies.is_empty(),
            source_dirs: project.source_dirs.iter().map(|d| project_dir.join(d)).collect(),
            output,
            edges,
            working_sets: project.working_sets.clone(),
            license: project
                .license
                .clone()
                .or_else(|| self.suite.manifest.suite.default_license.clone()),
            suite_index: self.suite.index,
            decl_index,
            id,
        })
    }

    fn distribution(&self, dist: &Distribution, decl_index: usize) -> Result<DistributionNode, ResolveError> {
        let id = EntityId::new(&self.suite.name, &dist.name);
        let owner = format!("distribution '{id}'");

        let dependencies = dist
            .dependencies
            .iter()
            .map(|raw| self.resolve(&owner, raw))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = dist
            .exclude
            .iter()
            .map(|raw| self.resolve(&owner, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut dist_dependencies = Vec::new();
        for raw in &dist.dist_dependencies {
            match self.resolve(&owner, raw)? {
                NodeId::Distribution(target) => dist_dependencies.push(target),
                other => {
                    return Err(ManifestError::WrongKind {
                        owner,
                        reference: raw.clone(),
                        expected: EntityKind::Distribution,
                        found: other.kind(),
                    }
                    .into())
                }
            }
        }

        Ok(DistributionNode {
            id,
            suite_index: self.suite.index,
            decl_index,
            suite_root: self.suite.root.clone(),
            dependencies,
            exclude,
            dist_dependencies,
            declaration: dist.clone(),
        })
    }

    fn resolve(&self, owner: &str, raw: &str) -> Result<NodeId, ResolveError> {
        let reference = Reference::parse(raw);
        let unresolved = |reason: String| ManifestError::UnresolvedReference {
            owner: owner.to_string(),
            reference: raw.to_string(),
            reason,
        };

        if let Some(qualifier) = &reference.suite {
            let target = self
                .suites
                .get(qualifier)
                .ok_or_else(|| unresolved(format!("suite '{qualifier}' is not part of the resolution")))?;
            return declared_in(target, &reference.name)
                .ok_or_else(|| unresolved(format!("suite '{qualifier}' declares no '{}'", reference.name)).into());
        }

        if let Some(node) = declared_in(self.suite, &reference.name) {
            return Ok(node);
        }

        let mut candidates: Vec<&ResolvedSuite> = self
            .visible
            .iter()
            .filter_map(|name| self.suites.get(name))
            .filter(|s| {
                matches!(
                    s.manifest.entity_kind(&reference.name),
                    Some(EntityKind::Project | EntityKind::Distribution)
                )
            })
            .collect();
        candidates.sort_by_key(|s| s.index);

        match candidates.as_slice() {
            [only] => match self.registry.get(&reference.name) {
                Some(library) => Err(ConflictError::AmbiguousReference {
                    owner: owner.to_string(),
                    reference: raw.to_string(),
                    candidates: vec![only.name.clone(), library.declared_by.clone()],
                }
                .into()),
                None => declared_in(only, &reference.name)
                    .ok_or_else(|| unresolved("declaration vanished".to_string()).into()),
            },
            [] if self.registry.contains(&reference.name) => Ok(NodeId::Library(reference.name)),
            [] => Err(unresolved(
                "no project, distribution or library with that name is visible".to_string(),
            )
            .into()),
            many => Err(ConflictError::AmbiguousReference {
                owner: owner.to_string(),
                reference: raw.to_string(),
                candidates: many.iter().map(|s| s.name.clone()).collect(),
            }
            .into()),
        }
    }
}

fn declared_in(suite: &ResolvedSuite, name: &str) -> Option<NodeId> {
    match suite.manifest.entity_kind(name)? {
        EntityKind::Project => Some(NodeId::Project(EntityId::new(&suite.name, name))),
        EntityKind::Distribution => Some(NodeId::Distribution(EntityId::new(&suite.name, name))),
        EntityKind::Library => Some(NodeId::Library(name.to_string())),
    }
}
