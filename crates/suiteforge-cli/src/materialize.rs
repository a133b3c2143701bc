//! Implementation of the `suiteforge materialize` command.

use crate::plan::ensure_complete;
use crate::session::Session;
use crate::GlobalOptions;
use anyhow::Result;
use suiteforge_pkg::{BuildPlan, LibraryStatus, PlanRequest, Platform};

/// Options for the materialize command.
#[derive(Debug)]
pub struct MaterializeOptions {
    /// Distribution names; empty means every root distribution.
    pub distributions: Vec<String>,
    pub platform: Platform,
}

/// Download and verify every library the distributions need.
pub fn run(global: &GlobalOptions, options: &MaterializeOptions) -> Result<()> {
    let session = Session::open(global)?;
    let distributions = session.distributions(&options.distributions)?;
    let plan = session.resolution.plan(&PlanRequest {
        distributions,
        platform: options.platform.clone(),
        materialize: true,
    })?;

    print_summary(&plan);
    ensure_complete(&plan)
}

fn print_summary(plan: &BuildPlan) {
    for (name, state) in &plan.libraries {
        match (&state.path, state.status) {
            (Some(path), LibraryStatus::Exempt) => {
                println!("  {name} -> {} (not verified: NOCHECK)", path.display());
            }
            (Some(path), _) => println!("  {name} -> {}", path.display()),
            (None, status) => println!("  {name} {status}"),
        }
    }

    let ready = plan.distributions.values().filter(|r| r.is_ok()).count();
    println!(
        "Materialized {} libraries for {ready} of {} distributions ({})",
        plan.libraries.len(),
        plan.distributions.len(),
        plan.platform
    );
    for (id, err) in plan.failures() {
        println!("  {id} FAILED: {err}");
    }
}
