//! Implementation of the `suiteforge resolve` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use suiteforge_pkg::{ConflictNote, ImportEdge, RegisteredLibrary, Resolution, RevisionStamp};

/// Machine-readable view of a resolution.
#[derive(Debug, Serialize)]
pub struct ResolutionReport<'a> {
    pub suites: Vec<SuiteReport<'a>>,
    pub imports: &'a [ImportEdge],
    pub conflicts: &'a [ConflictNote],
    pub libraries: Vec<&'a RegisteredLibrary>,
}

#[derive(Debug, Serialize)]
pub struct SuiteReport<'a> {
    pub index: usize,
    pub name: &'a str,
    pub version: &'a str,
    pub revision: Option<&'a RevisionStamp>,
    pub root: &'a Path,
    pub projects: usize,
    pub distributions: usize,
    pub repositories: Vec<RepositoryReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RepositoryReport<'a> {
    pub name: &'a str,
    pub url: &'a str,
}

impl<'a> ResolutionReport<'a> {
    pub fn new(resolution: &'a Resolution) -> Self {
        let suites = resolution
            .suites
            .iter()
            .map(|suite| SuiteReport {
                index: suite.index,
                name: &suite.name,
                version: &suite.manifest.suite.version,
                revision: suite.stamp.as_ref(),
                root: &suite.root,
                projects: suite.manifest.projects.len(),
                distributions: suite.manifest.distributions.len(),
                repositories: suite
                    .manifest
                    .repositories
                    .iter()
                    .map(|(name, repository)| RepositoryReport {
                        name,
                        url: &repository.url,
                    })
                    .collect(),
            })
            .collect();

        Self {
            suites,
            imports: resolution.suites.edges(),
            conflicts: resolution.suites.notes(),
            libraries: resolution.registry.iter().collect(),
        }
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Suites:");
        for suite in &self.suites {
            let revision = suite
                .revision
                .map_or_else(|| "(root)".to_string(), ToString::to_string);
            let _ = writeln!(
                out,
                "  {:>2} {} {} @ {} [{} projects, {} distributions]",
                suite.index,
                suite.name,
                suite.version,
                revision,
                suite.projects,
                suite.distributions
            );
            for repository in &suite.repositories {
                let _ = writeln!(out, "       publishes to {} ({})", repository.name, repository.url);
            }
        }

        if !self.imports.is_empty() {
            let _ = writeln!(out, "Imports:");
            for edge in self.imports {
                let _ = writeln!(out, "  {} -> {} @ {}", edge.importer, edge.imported, edge.revision);
            }
        }

        if !self.conflicts.is_empty() {
            let _ = writeln!(out, "Resolved conflicts:");
            for note in self.conflicts {
                let _ = writeln!(out, "  {note}");
            }
        }

        let _ = writeln!(out, "Libraries: {}", self.libraries.len());
        for library in &self.libraries {
            let _ = writeln!(out, "  {} (from {})", library.name, library.declared_by);
        }

        out
    }
}

/// Print a resolution as text or JSON.
pub fn print_resolution(resolution: &Resolution, json: bool) -> Result<()> {
    let report = ResolutionReport::new(resolution);
    if json {
        let text = serde_json::to_string_pretty(&report).context("Failed to encode resolution")?;
        println!("{text}");
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
