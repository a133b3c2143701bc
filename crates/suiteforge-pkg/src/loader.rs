//! Manifest loading.

use crate::manifest::{ManifestError, SuiteManifest, MANIFEST_FILE};
use std::path::Path;

/// Turns a suite location into a parsed manifest.
pub trait ManifestLoader: Send + Sync {
    fn load_suite(&self, location: &Path) -> Result<SuiteManifest, ManifestError>;
}

/// Reads `suite.toml` from a suite directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlManifestLoader;

impl ManifestLoader for TomlManifestLoader {
    fn load_suite(&self, location: &Path) -> Result<SuiteManifest, ManifestError> {
        let manifest_path = location.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ManifestError::NotFound(location.to_path_buf()));
        }
        SuiteManifest::from_path(manifest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "[suite]\nname = \"core\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();

        let manifest = TomlManifestLoader.load_suite(dir.path()).unwrap();
        assert_eq!(manifest.name(), "core");
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = TomlManifestLoader.load_suite(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }
}
