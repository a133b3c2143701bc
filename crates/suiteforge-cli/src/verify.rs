//! Implementation of the `suiteforge verify` command.

use crate::session::Session;
use crate::GlobalOptions;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use suiteforge_pkg::{ArtifactRegistry, LibraryStatus, MaterializeError};

/// Outcome of checking a set of libraries.
#[derive(Debug, Default)]
pub struct VerifyResult {
    pub verified: Vec<String>,
    /// Libraries declared with `NOCHECK`.
    pub exempt: Vec<String>,
    pub failed: Vec<MaterializeError>,
}

impl VerifyResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn print_summary(&self) {
        for name in &self.verified {
            println!("  ok       {name}");
        }
        for name in &self.exempt {
            println!("  exempt   {name}");
        }
        for err in &self.failed {
            println!("  FAILED   {}: {err}", err.library());
        }
        println!(
            "{} verified, {} exempt, {} failed",
            self.verified.len(),
            self.exempt.len(),
            self.failed.len()
        );
    }
}

/// Materialize the named libraries, or all of them, and classify the results.
///
/// # Errors
///
/// Returns an error if a named library is not registered.
pub fn verify_libraries(registry: &ArtifactRegistry, names: &[String]) -> Result<VerifyResult> {
    let selected: Vec<&str> = if names.is_empty() {
        registry.iter().map(|l| l.name.as_str()).collect()
    } else {
        for name in names {
            if !registry.contains(name) {
                bail!("Unknown library '{name}'");
            }
        }
        names.iter().map(String::as_str).collect()
    };

    let outcomes: BTreeMap<String, Result<PathBuf, MaterializeError>> =
        registry.materialize_all(selected);

    let mut result = VerifyResult::default();
    for (name, outcome) in outcomes {
        match outcome {
            Err(err) => result.failed.push(err),
            Ok(_) if registry.status(&name) == Some(LibraryStatus::Exempt) => {
                result.exempt.push(name);
            }
            Ok(_) => result.verified.push(name),
        }
    }
    Ok(result)
}

pub fn run(global: &GlobalOptions, libraries: &[String]) -> Result<()> {
    let session = Session::open(global)?;
    let result = verify_libraries(&session.resolution.registry, libraries)?;
    result.print_summary();

    match result.failed.into_iter().next() {
        None => Ok(()),
        Some(err) => Err(anyhow::Error::new(err).context("Library verification failed")),
    }
}
