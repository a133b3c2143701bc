//! Implementation of the `suiteforge plan` command.

use crate::session::Session;
use crate::GlobalOptions;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use suiteforge_pkg::{
    BuildPlan, BuildStep, HandlerRegistry, LibraryState, PlanRequest, Platform,
    ResolvedDistribution,
};

/// Options for the plan command.
#[derive(Debug)]
pub struct PlanOptions {
    /// Distribution names; empty means every root distribution.
    pub distributions: Vec<String>,
    pub platform: Platform,
    pub json: bool,
    /// Materialize required libraries before planning.
    pub fetch: bool,
    /// Print handler actions instead of the plan.
    pub dry_run: bool,
}

/// Machine-readable view of a build plan.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    pub platform: String,
    pub layers: &'a [Vec<BuildStep>],
    pub distributions: BTreeMap<String, DistributionReport<'a>>,
    pub libraries: &'a BTreeMap<String, LibraryState>,
}

#[derive(Debug, Serialize)]
pub struct DistributionReport<'a> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<&'a ResolvedDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> PlanReport<'a> {
    pub fn new(plan: &'a BuildPlan) -> Self {
        let distributions = plan
            .distributions
            .iter()
            .map(|(id, result)| {
                let report = match result {
                    Ok(resolved) => DistributionReport {
                        status: "ok",
                        resolved: Some(resolved),
                        error: None,
                    },
                    Err(err) => DistributionReport {
                        status: "failed",
                        resolved: None,
                        error: Some(err.to_string()),
                    },
                };
                (id.to_string(), report)
            })
            .collect();

        Self {
            platform: plan.platform.to_string(),
            layers: &plan.order.layers,
            distributions,
            libraries: &plan.libraries,
        }
    }

    /// Human-readable plan.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Build plan for {}", self.platform);

        for (index, layer) in self.layers.iter().enumerate() {
            let _ = writeln!(out, "Layer {index}:");
            for step in layer {
                let _ = writeln!(out, "  {} [{}]", step.node(), step.handler);
            }
        }

        let _ = writeln!(out, "Distributions:");
        for (id, report) in &self.distributions {
            match (report.resolved, &report.error) {
                (Some(resolved), _) => {
                    let _ = writeln!(
                        out,
                        "  {id} -> {} ({} projects, {} libraries)",
                        resolved.path.display(),
                        resolved.projects.len(),
                        resolved.libraries.len()
                    );
                }
                (None, Some(error)) => {
                    let _ = writeln!(out, "  {id} FAILED: {error}");
                }
                (None, None) => {}
            }
        }

        if !self.libraries.is_empty() {
            let _ = writeln!(out, "Libraries:");
            for (name, state) in self.libraries {
                let kind = if state.resource { " (resource)" } else { "" };
                let _ = writeln!(out, "  {name}{kind} {}", state.status);
            }
        }

        out
    }
}

/// Resolve, plan and print.
pub fn run(global: &GlobalOptions, options: &PlanOptions) -> Result<()> {
    let session = Session::open(global)?;
    let distributions = session.distributions(&options.distributions)?;
    let plan = session.resolution.plan(&PlanRequest {
        distributions,
        platform: options.platform.clone(),
        materialize: options.fetch,
    })?;

    if options.dry_run {
        let handlers = HandlerRegistry::with_defaults().with_templates(&session.config.handlers);
        let missing = handlers.missing_handlers(&plan.order);
        if !missing.is_empty() {
            bail!(
                "No handler configured for: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        for action in handlers.dispatch_all(&plan.order)? {
            println!("{action}");
        }
    } else if options.json {
        let text = serde_json::to_string_pretty(&PlanReport::new(&plan))
            .context("Failed to encode plan")?;
        println!("{text}");
    } else {
        print!("{}", PlanReport::new(&plan).render());
    }

    ensure_complete(&plan)
}

/// Fail with the first distribution error, after output has been printed.
pub fn ensure_complete(plan: &BuildPlan) -> Result<()> {
    let failed = plan.failures().count();
    match plan.failures().next() {
        None => Ok(()),
        Some((_, err)) => Err(anyhow::Error::new(err.clone()).context(format!(
            "{failed} of {} distributions could not be planned",
            plan.distributions.len()
        ))),
    }
}
