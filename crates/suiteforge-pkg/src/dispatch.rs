//! Build-step handler dispatch.
//!
//! Steps carry a handler token (`default-compile`, `native`,
//! `custom:<class>`). A [`HandlerRegistry`] maps tokens to [`StepHandler`]s
//! so callers can check up front that every step in a plan can be handled.

use crate::graph::Phase;
use crate::planner::{BuildOrder, BuildStep};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors raised while dispatching build steps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no handler registered for '{token}' (needed by {project})")]
    NoHandler { token: String, project: String },

    #[error("handler for {project} failed: {reason}")]
    Failed { project: String, reason: String },
}

/// Carries out one kind of build step.
pub trait StepHandler: Send + Sync {
    /// Handle a step, returning a description of the action taken.
    fn dispatch(&self, step: &BuildStep) -> Result<String, DispatchError>;
}

/// Renders a command template for a step without running anything.
///
/// Placeholders: `{project}`, `{suite}`, `{name}`, `{phase}`, `{handler}`,
/// `{output}`, `{sources}` (space separated), `{libraries}` and
/// `{processors}` (colon separated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateHandler {
    template: String,
}

impl TemplateHandler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    #[must_use]
    pub fn render(&self, step: &BuildStep) -> String {
        let phase = match step.phase {
            Phase::Generate => "generate",
            Phase::Compile => "compile",
        };
        let sources = step
            .source_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let processors = step
            .processor_path
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(":");

        self.template
            .replace("{project}", &step.project.to_string())
            .replace("{suite}", &step.project.suite)
            .replace("{name}", &step.project.name)
            .replace("{phase}", phase)
            .replace("{handler}", &step.handler.to_string())
            .replace("{output}", &step.output.display().to_string())
            .replace("{sources}", &sources)
            .replace("{libraries}", &step.libraries.join(":"))
            .replace("{processors}", &processors)
    }
}

impl StepHandler for TemplateHandler {
    fn dispatch(&self, step: &BuildStep) -> Result<String, DispatchError> {
        Ok(self.render(step))
    }
}

/// Handlers keyed by token.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn StepHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Template handlers for the built-in tokens. Custom handlers must be
    /// registered explicitly.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "default-compile",
            TemplateHandler::new("{phase} {project} -> {output}"),
        );
        registry.register("native", TemplateHandler::new("native-build {project} -> {output}"));
        registry
    }

    /// Add template handlers from `token = template` pairs, replacing any
    /// existing handler for the same token.
    #[must_use]
    pub fn with_templates(mut self, templates: &BTreeMap<String, String>) -> Self {
        for (token, template) in templates {
            self.register(token.clone(), TemplateHandler::new(template.clone()));
        }
        self
    }

    pub fn register(&mut self, token: impl Into<String>, handler: impl StepHandler + 'static) {
        self.handlers.insert(token.into(), Box::new(handler));
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.handlers.contains_key(token)
    }

    /// Tokens used by the order that have no handler.
    #[must_use]
    pub fn missing_handlers(&self, order: &BuildOrder) -> BTreeSet<String> {
        order
            .steps()
            .map(|step| step.handler.to_string())
            .filter(|token| !self.contains(token))
            .collect()
    }

    /// Dispatch a single step to its handler.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is registered for the step's token or
    /// the handler fails.
    pub fn dispatch(&self, step: &BuildStep) -> Result<String, DispatchError> {
        let token = step.handler.to_string();
        let handler = self.handlers.get(&token).ok_or_else(|| DispatchError::NoHandler {
            token,
            project: step.node().to_string(),
        })?;
        handler.dispatch(step)
    }

    /// Dispatch every step in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error.
    pub fn dispatch_all(&self, order: &BuildOrder) -> Result<Vec<String>, DispatchError> {
        order.steps().map(|step| self.dispatch(step)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Handler;
    use crate::reference::EntityId;
    use std::path::PathBuf;

    fn step(name: &str, phase: Phase, handler: Handler) -> BuildStep {
        BuildStep {
            project: EntityId::new("fastr", name),
            phase,
            handler,
            source_dirs: vec![PathBuf::from("/fastr/p/src")],
            output: PathBuf::from("/fastr/build/p"),
            libraries: vec!["ANTLR".into(), "JLINE".into()],
            resources: Vec::new(),
            processor_path: vec![PathBuf::from("/truffle/build/dsl")],
            working_sets: Vec::new(),
        }
    }

    #[test]
    fn test_render_template() {
        let handler = TemplateHandler::new(
            "{handler} {suite}/{name} [{phase}] {sources} cp={libraries} ap={processors}",
        );
        let rendered = handler.render(&step("p", Phase::Generate, Handler::DefaultCompile));
        assert_eq!(
            rendered,
            "default-compile fastr/p [generate] /fastr/p/src cp=ANTLR:JLINE ap=/truffle/build/dsl"
        );
    }

    #[test]
    fn test_missing_custom_handler() {
        let order = BuildOrder {
            layers: vec![vec![
                step("a", Phase::Compile, Handler::DefaultCompile),
                step("b", Phase::Compile, Handler::Custom("FastRNativeProject".into())),
            ]],
        };
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(
            registry.missing_handlers(&order),
            BTreeSet::from(["custom:FastRNativeProject".to_string()])
        );
        let err = registry.dispatch_all(&order).unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler { ref project, .. } if project == "fastr:b"));

        let templates = BTreeMap::from([(
            "custom:FastRNativeProject".to_string(),
            "make -C {output}".to_string(),
        )]);
        let registry = HandlerRegistry::with_defaults().with_templates(&templates);
        assert!(registry.missing_handlers(&order).is_empty());
        assert_eq!(
            registry.dispatch_all(&order).unwrap(),
            ["compile fastr:a -> /fastr/build/p", "make -C /fastr/build/p"]
        );
    }
}
