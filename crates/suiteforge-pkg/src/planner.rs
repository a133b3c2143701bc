//! Layered build ordering.
//!
//! Only phase nodes required by the requested distributions are planned.
//! Layer `k` holds every step whose prerequisites all sit in earlier layers,
//! so steps within one layer are independent of each other. Inside a layer
//! steps are sorted by suite resolution index, then declaration index, then
//! phase, which makes the order identical across runs.

use crate::error::ResolveError;
use crate::graph::{EdgeKind, Handler, Phase, PhaseNode, ProjectGraph};
use crate::reference::{EntityId, NodeId};
use crate::registry::ArtifactRegistry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// One unit of build work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    pub project: EntityId,
    pub phase: Phase,
    pub handler: Handler,
    pub source_dirs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Libraries on the step's class path.
    pub libraries: Vec<String>,
    /// Resource-only libraries the step reads.
    pub resources: Vec<String>,
    /// Output directories of annotation processors built from projects or
    /// distributions. Only set on generate steps.
    pub processor_path: Vec<PathBuf>,
    pub working_sets: Vec<String>,
}

impl BuildStep {
    #[must_use]
    pub fn node(&self) -> PhaseNode {
        PhaseNode {
            project: self.project.clone(),
            phase: self.phase,
        }
    }
}

/// Steps grouped into dependency layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildOrder {
    pub layers: Vec<Vec<BuildStep>>,
}

impl BuildOrder {
    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &BuildStep> {
        self.layers.iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Vec::is_empty)
    }

    /// Flat index of a phase node in execution order.
    #[must_use]
    pub fn position(&self, node: &PhaseNode) -> Option<usize> {
        self.steps().position(|s| s.project == node.project && s.phase == node.phase)
    }

    /// Layer holding a phase node.
    #[must_use]
    pub fn layer_of(&self, node: &PhaseNode) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.iter().any(|s| s.project == node.project && s.phase == node.phase))
    }
}

/// Orders build steps for a set of distributions.
pub struct BuildPlanner<'a> {
    graph: &'a ProjectGraph,
    registry: &'a ArtifactRegistry,
}

impl<'a> BuildPlanner<'a> {
    pub fn new(graph: &'a ProjectGraph, registry: &'a ArtifactRegistry) -> Self {
        Self { graph, registry }
    }

    /// Order the steps needed to build the given distributions.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unorderable`] if steps remain that can never
    /// become ready.
    pub fn order(&self, distributions: &[EntityId]) -> Result<BuildOrder, ResolveError> {
        let projects: Vec<EntityId> = distributions
            .iter()
            .flat_map(|d| self.graph.member_projects(d))
            .collect();
        self.order_projects(&projects)
    }

    /// Order the steps needed to compile the given projects.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unorderable`] if steps remain that can never
    /// become ready.
    pub fn order_projects(&self, projects: &[EntityId]) -> Result<BuildOrder, ResolveError> {
        let required = self.required(projects);

        let mut remaining: HashMap<&PhaseNode, usize> = HashMap::new();
        let mut dependents: HashMap<PhaseNode, Vec<&PhaseNode>> = HashMap::new();
        for node in &required {
            let prerequisites = self.graph.prerequisites(node);
            remaining.insert(node, prerequisites.len());
            for prerequisite in prerequisites {
                dependents.entry(prerequisite).or_default().push(node);
            }
        }

        let mut ready: Vec<&PhaseNode> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut layers = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            ready.sort_by_key(|node| self.graph.order_key(node));
            let mut next = Vec::new();
            for node in &ready {
                for &dependent in dependents.get(*node).map(Vec::as_slice).unwrap_or_default() {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            placed += ready.len();
            layers.push(ready.iter().map(|node| self.step(node)).collect::<Vec<_>>());
            ready = next;
        }

        if placed < required.len() {
            let mut stuck: Vec<&PhaseNode> = remaining
                .iter()
                .filter(|(_, &count)| count > 0)
                .map(|(&node, _)| node)
                .collect();
            stuck.sort_by_key(|node| self.graph.order_key(node));
            return Err(ResolveError::Unorderable {
                remaining: stuck.iter().map(ToString::to_string).collect(),
            });
        }

        debug!(steps = placed, layers = layers.len(), "build order computed");
        Ok(BuildOrder { layers })
    }

    /// Every phase node reachable from the projects' compile phases.
    fn required(&self, projects: &[EntityId]) -> HashSet<PhaseNode> {
        let mut required = HashSet::new();
        let mut stack: Vec<PhaseNode> = projects.iter().map(PhaseNode::compile).collect();
        while let Some(node) = stack.pop() {
            if required.insert(node.clone()) {
                stack.extend(self.graph.prerequisites(&node));
            }
        }
        required
    }

    fn step(&self, node: &PhaseNode) -> BuildStep {
        let project = self.graph.project(&node.project);
        let mut libraries = self.graph.link_libraries(&node.project, self.registry);
        let mut processor_path = Vec::new();

        if node.phase == Phase::Generate {
            let processors = project
                .into_iter()
                .flat_map(|p| &p.edges)
                .filter(|e| e.kind == EdgeKind::Processor);
            for edge in processors {
                let members = match &edge.target {
                    NodeId::Library(name) => {
                        if !libraries.link.contains(name) {
                            libraries.link.push(name.clone());
                        }
                        continue;
                    }
                    NodeId::Project(id) => vec![id.clone()],
                    NodeId::Distribution(id) => self.graph.member_projects(id),
                };
                for member in members {
                    let Some(output) = self.graph.project(&member).map(|p| p.output.clone()) else {
                        continue;
                    };
                    if !processor_path.contains(&output) {
                        processor_path.push(output);
                    }
                }
            }
        }

        BuildStep {
            project: node.project.clone(),
            phase: node.phase,
            handler: project.map_or(Handler::DefaultCompile, |p| p.handler.clone()),
            source_dirs: project.map(|p| p.source_dirs.clone()).unwrap_or_default(),
            output: project.map(|p| p.output.clone()).unwrap_or_default(),
            libraries: libraries.link,
            resources: libraries.resources,
            processor_path,
            working_sets: project.map(|p| p.working_sets.clone()).unwrap_or_default(),
        }
    }
}
