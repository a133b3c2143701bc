//! Configuration loading and resolution shared by every command.

use crate::GlobalOptions;
use anyhow::{Context, Result};
use suiteforge_pkg::{Config, EntityId, Resolution, Resolver};

/// A resolved root suite plus the configuration it was resolved with.
pub struct Session {
    pub config: Config,
    pub resolution: Resolution,
}

impl Session {
    /// Load configuration and resolve the suite named by the global flags.
    pub fn open(global: &GlobalOptions) -> Result<Self> {
        let config = Config::discover(global.config.as_deref())
            .context("Failed to load configuration")?;

        let resolution = Resolver::new(config.clone())
            .with_conflict_resolution(global.conflict_resolution)
            .resolve(&global.suite)
            .with_context(|| format!("Failed to resolve suite in '{}'", global.suite.display()))?;

        Ok(Self { config, resolution })
    }

    /// Look up requested distributions, or every root distribution when
    /// none were named.
    pub fn distributions(&self, names: &[String]) -> Result<Vec<EntityId>> {
        if names.is_empty() {
            return Ok(self.resolution.root_distributions());
        }
        names
            .iter()
            .map(|name| {
                self.resolution
                    .distribution_id(name)
                    .with_context(|| format!("Unknown distribution '{name}'"))
            })
            .collect()
    }
}
