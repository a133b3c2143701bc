//! Suite manifest (`suite.toml`) parsing and validation.
//!
//! ```toml
//! [suite]
//! name = "fastr"
//! version = "1.0.0"
//! conflict-resolution = "latest"
//!
//! [[import]]
//! name = "truffle"
//! revision = "3c34543a8b7ff5edd74b76aafbeb3af52bd4afe7"
//! urls = [{ url = "https://github.com/graalvm/truffle", kind = "git" }]
//!
//! [[library]]
//! name = "ANTLR-3.5"
//! urls = ["https://repo1.maven.org/maven2/org/antlr/antlr-runtime/3.5/antlr-runtime-3.5.jar"]
//! sha1 = "0baa82bff19059401e90e1b90020beb9c96305d7"
//!
//! [[project]]
//! name = "com.example.parser"
//! source-dirs = ["src"]
//! dependencies = ["ANTLR-3.5", "truffle:TRUFFLE_API"]
//!
//! [[distribution]]
//! name = "PARSER"
//! dependencies = ["com.example.parser"]
//! exclude = ["ANTLR-3.5"]
//! ```

use crate::digest::{Digest, DigestAlgorithm, DigestRequirement, NO_CHECK};
use crate::reference::{EntityKind, QUALIFIER};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The manifest filename at the root of every suite.
pub const MANIFEST_FILE: &str = "suite.toml";

/// Wildcard key in `os-arch` tables matching any OS or architecture.
pub const OTHERS: &str = "<others>";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no suite.toml found in '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("invalid name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    #[error("suite '{suite}' requires suiteforge {required}, but this is {current}")]
    UnsupportedFormat {
        suite: String,
        required: String,
        current: String,
    },

    #[error("suite '{suite}' declares '{name}' twice (as {first} and as {second})")]
    DuplicateName {
        suite: String,
        name: String,
        first: EntityKind,
        second: EntityKind,
    },

    #[error("suite '{suite}' imports '{name}' more than once")]
    DuplicateImport { suite: String, name: String },

    #[error("import '{name}' in suite '{suite}' has no fetch locations")]
    NoImportLocations { suite: String, name: String },

    #[error("suite '{0}' imports itself")]
    SelfImport(String),

    #[error(
        "library '{library}' in suite '{suite}' declares no digest; use sha1 = \"NOCHECK\" to opt out explicitly"
    )]
    MissingDigest { suite: String, library: String },

    #[error("library '{library}' in suite '{suite}' has an invalid digest: {reason}")]
    InvalidDigest {
        suite: String,
        library: String,
        reason: String,
    },

    #[error("library '{library}' in suite '{suite}' has neither a path nor download urls")]
    NoLibrarySource { suite: String, library: String },

    #[error("unknown license '{license}' referenced by {owner}")]
    UnknownLicense { owner: String, license: String },

    #[error("suite loaded from '{location}' is named '{found}', expected '{expected}'")]
    NameMismatch {
        location: String,
        expected: String,
        found: String,
    },

    #[error("unresolved reference '{reference}' in {owner}: {reason}")]
    UnresolvedReference {
        owner: String,
        reference: String,
        reason: String,
    },

    #[error("'{reference}' in {owner} must name a {expected}, found a {found}")]
    WrongKind {
        owner: String,
        reference: String,
        expected: EntityKind,
        found: EntityKind,
    },
}

/// How a suite settles two different pinned revisions of the same imported suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail the resolution with a conflict.
    #[default]
    Strict,
    /// Keep whichever revision was seen first.
    Ignore,
    /// Keep the revision with the most recent revision stamp.
    Latest,
}

impl ConflictPolicy {
    /// Returns the policy as it is spelled in manifests.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Ignore => "ignore",
            Self::Latest => "latest",
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" | "none" => Ok(Self::Strict),
            "ignore" => Ok(Self::Ignore),
            "latest" => Ok(Self::Latest),
            _ => Err(format!(
                "unknown conflict resolution '{s}', expected one of: strict, ignore, latest"
            )),
        }
    }
}

/// The complete suite.toml manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteManifest {
    /// Suite metadata (required).
    pub suite: SuiteInfo,

    /// Suites this suite imports, each pinned to a revision.
    #[serde(default, rename = "import")]
    pub imports: Vec<SuiteImport>,

    /// Repositories distributions are published to.
    #[serde(default)]
    pub repositories: BTreeMap<String, Repository>,

    /// Licenses referenced by libraries, projects and distributions.
    #[serde(default)]
    pub licenses: BTreeMap<String, License>,

    /// External libraries.
    #[serde(default, rename = "library")]
    pub libraries: Vec<Library>,

    /// Build modules.
    #[serde(default, rename = "project")]
    pub projects: Vec<Project>,

    /// Packaged outputs.
    #[serde(default, rename = "distribution")]
    pub distributions: Vec<Distribution>,
}

/// Suite metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SuiteInfo {
    /// Suite name (required, unique across the resolved graph).
    pub name: String,

    /// Suite version (required, semver).
    pub version: String,

    /// Oldest suiteforge release able to read this manifest.
    #[serde(default)]
    pub format_version: Option<String>,

    /// Policy for conflicting revisions among this suite's imports.
    /// When absent the root suite's policy applies.
    #[serde(default)]
    pub conflict_resolution: Option<ConflictPolicy>,

    /// License applied to entities that do not name one.
    #[serde(default)]
    pub default_license: Option<String>,

    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
}

/// An imported suite pinned to a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteImport {
    /// Name of the imported suite.
    pub name: String,

    /// Pinned revision identifier.
    pub revision: String,

    /// Fetch locations in order of preference.
    #[serde(default)]
    pub urls: Vec<ImportLocation>,
}

/// A location an imported suite can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportLocation {
    /// Repository URL, snapshot base URL or local directory.
    pub url: String,

    /// What lives at the URL.
    pub kind: LocationKind,
}

/// The kind of an import location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    /// Version-controlled source repository.
    Git,
    /// Precomputed binary snapshot.
    Binary,
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => f.write_str("git"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// A publishing repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Repository {
    /// Endpoint URL.
    pub url: String,

    /// Licenses accepted by the repository.
    #[serde(default)]
    pub licenses: Vec<String>,
}

/// A license declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct License {
    /// Human-readable license name.
    pub name: String,

    /// License text URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// An external library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Library {
    /// Library identity.
    pub name: String,

    /// Local path, relative to the suite root. May reference `${VAR}`.
    #[serde(default)]
    pub path: Option<String>,

    /// Download URLs in order of preference.
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA-1 digest, or `NOCHECK`.
    #[serde(default)]
    pub sha1: Option<String>,

    /// SHA-256 digest, or `NOCHECK`.
    #[serde(default)]
    pub sha256: Option<String>,

    /// Resource-only: tracked and verified but never linked.
    #[serde(default)]
    pub resource: bool,

    /// License identifier.
    #[serde(default)]
    pub license: Option<String>,
}

impl Library {
    /// Returns the digest requirement declared for this library.
    ///
    /// # Errors
    ///
    /// Returns an error if no digest is declared, more than one is declared,
    /// or the declared digest is malformed.
    pub fn digest_requirement(&self, suite: &str) -> Result<DigestRequirement, ManifestError> {
        let (algorithm, value) = match (&self.sha1, &self.sha256) {
            (Some(v), None) => (DigestAlgorithm::Sha1, v),
            (None, Some(v)) => (DigestAlgorithm::Sha256, v),
            (None, None) => {
                return Err(ManifestError::MissingDigest {
                    suite: suite.to_string(),
                    library: self.name.clone(),
                })
            }
            (Some(_), Some(_)) => {
                return Err(ManifestError::InvalidDigest {
                    suite: suite.to_string(),
                    library: self.name.clone(),
                    reason: "declare either sha1 or sha256, not both".to_string(),
                })
            }
        };

        if value == NO_CHECK {
            return Ok(DigestRequirement::Skip);
        }

        Digest::parse(algorithm, value)
            .map(DigestRequirement::Verify)
            .map_err(|e| ManifestError::InvalidDigest {
                suite: suite.to_string(),
                library: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// A build module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Project {
    /// Project identity.
    pub name: String,

    /// Source roots, relative to the project directory.
    #[serde(default)]
    pub source_dirs: Vec<String>,

    /// Ordered dependency references.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Dependencies whose generated sources must exist before this
    /// project's generation step.
    #[serde(default)]
    pub generated_dependencies: Vec<String>,

    /// Annotation processors run during this project's generation step.
    #[serde(default)]
    pub annotation_processors: Vec<String>,

    /// Built by an external native toolchain.
    #[serde(default)]
    pub native: bool,

    /// Named build handler replacing the default compile step.
    #[serde(default)]
    pub class: Option<String>,

    /// Output directory, relative to the suite root.
    #[serde(default)]
    pub output: Option<String>,

    /// IDE working sets.
    #[serde(default)]
    pub working_sets: Vec<String>,

    /// License identifier.
    #[serde(default)]
    pub license: Option<String>,
}

/// A packaged output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Distribution {
    /// Distribution identity.
    pub name: String,

    /// Short description.
    #[serde(default)]
    pub description: Option<String>,

    /// Projects and libraries packaged into the distribution.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Transitively reachable entries left out of the package.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Distributions this one depends on instead of repackaging them.
    #[serde(default)]
    pub dist_dependencies: Vec<String>,

    /// Entry point.
    #[serde(default)]
    pub main_class: Option<String>,

    /// Output path, relative to the suite root.
    #[serde(default)]
    pub path: Option<String>,

    /// Whether the distribution is deployed to the suite's repositories.
    #[serde(default = "default_true")]
    pub publish: bool,

    /// Per-OS, per-architecture overrides.
    #[serde(default)]
    pub os_arch: BTreeMap<String, BTreeMap<String, PlatformVariant>>,

    /// License identifier.
    #[serde(default)]
    pub license: Option<String>,
}

impl Distribution {
    /// Returns the output path used when no platform override applies.
    #[must_use]
    pub fn default_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => Path::new("build")
                .join("dists")
                .join(format!("{}.jar", self.name.to_lowercase().replace('_', "-"))),
        }
    }
}

/// Platform-specific settings of a distribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformVariant {
    /// Output path for this platform.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SuiteManifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the manifest fails validation.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// The suite's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.suite.name
    }

    /// Find a project by name.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Find a library by name.
    #[must_use]
    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name == name)
    }

    /// Find a distribution by name.
    #[must_use]
    pub fn distribution(&self, name: &str) -> Option<&Distribution> {
        self.distributions.iter().find(|d| d.name == name)
    }

    /// Returns what kind of entity `name` is in this suite, if any.
    #[must_use]
    pub fn entity_kind(&self, name: &str) -> Option<EntityKind> {
        if self.project(name).is_some() {
            Some(EntityKind::Project)
        } else if self.distribution(name).is_some() {
            Some(EntityKind::Distribution)
        } else if self.library(name).is_some() {
            Some(EntityKind::Library)
        } else {
            None
        }
    }

    /// Validate the manifest.
    fn validate(&self) -> Result<(), ManifestError> {
        validate_suite_name(&self.suite.name)?;
        self.validate_version()?;
        self.validate_imports()?;
        self.validate_entities()?;
        self.validate_licenses()?;
        Ok(())
    }

    /// Validate the version and format version.
    fn validate_version(&self) -> Result<(), ManifestError> {
        let version = &self.suite.version;
        semver::Version::parse(version)
            .map_err(|e| ManifestError::InvalidVersion(version.clone(), e.to_string()))?;

        if let Some(ref required) = self.suite.format_version {
            let required_version = semver::Version::parse(required)
                .map_err(|e| ManifestError::InvalidVersion(required.clone(), e.to_string()))?;
            let current = semver::Version::parse(env!("CARGO_PKG_VERSION")).map_err(|e| {
                ManifestError::InvalidVersion(env!("CARGO_PKG_VERSION").to_string(), e.to_string())
            })?;
            if required_version > current {
                return Err(ManifestError::UnsupportedFormat {
                    suite: self.suite.name.clone(),
                    required: required.clone(),
                    current: current.to_string(),
                });
            }
        }

        Ok(())
    }

    fn validate_imports(&self) -> Result<(), ManifestError> {
        let mut seen = std::collections::HashSet::new();
        for import in &self.imports {
            validate_suite_name(&import.name)?;
            if import.name == self.suite.name {
                return Err(ManifestError::SelfImport(import.name.clone()));
            }
            if !seen.insert(import.name.as_str()) {
                return Err(ManifestError::DuplicateImport {
                    suite: self.suite.name.clone(),
                    name: import.name.clone(),
                });
            }
            if import.urls.is_empty() {
                return Err(ManifestError::NoImportLocations {
                    suite: self.suite.name.clone(),
                    name: import.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Names are unique across projects, libraries and distributions.
    fn validate_entities(&self) -> Result<(), ManifestError> {
        let suite = &self.suite.name;
        let mut names: HashMap<&str, EntityKind> = HashMap::new();
        let declared = self
            .projects
            .iter()
            .map(|p| (p.name.as_str(), EntityKind::Project))
            .chain(
                self.libraries
                    .iter()
                    .map(|l| (l.name.as_str(), EntityKind::Library)),
            )
            .chain(
                self.distributions
                    .iter()
                    .map(|d| (d.name.as_str(), EntityKind::Distribution)),
            );

        for (name, kind) in declared {
            validate_entity_name(name)?;
            if let Some(first) = names.insert(name, kind) {
                return Err(ManifestError::DuplicateName {
                    suite: suite.clone(),
                    name: name.to_string(),
                    first,
                    second: kind,
                });
            }
        }

        for library in &self.libraries {
            library.digest_requirement(suite)?;
            if library.path.is_none() && library.urls.is_empty() {
                return Err(ManifestError::NoLibrarySource {
                    suite: suite.clone(),
                    library: library.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_licenses(&self) -> Result<(), ManifestError> {
        let check = |owner: String, license: &Option<String>| -> Result<(), ManifestError> {
            match license {
                Some(id) if !self.licenses.contains_key(id) => Err(ManifestError::UnknownLicense {
                    owner,
                    license: id.clone(),
                }),
                _ => Ok(()),
            }
        };

        check(
            format!("suite '{}'", self.suite.name),
            &self.suite.default_license,
        )?;
        for library in &self.libraries {
            check(format!("library '{}'", library.name), &library.license)?;
        }
        for project in &self.projects {
            check(format!("project '{}'", project.name), &project.license)?;
        }
        for dist in &self.distributions {
            check(format!("distribution '{}'", dist.name), &dist.license)?;
        }
        for (name, repository) in &self.repositories {
            for license in &repository.licenses {
                check(format!("repository '{name}'"), &Some(license.clone()))?;
            }
        }
        Ok(())
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Suite names follow package naming: a leading letter, then letters,
/// digits, hyphens and underscores.
fn validate_suite_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }

    if name.len() > 64 {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot exceed 64 characters",
        ));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name must start with a letter",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Entity names additionally allow dots (`com.example.parser`, `ANTLR-3.5`)
/// but never the suite qualifier.
fn validate_entity_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }

    if name.contains(QUALIFIER) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "':' is reserved for suite-qualified references",
        ));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name must start with a letter or digit",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name can only contain letters, numbers, dots, hyphens, and underscores",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_manifest() {
        let toml = r#"
[suite]
name = "core"
version = "0.1.0"
"#;
        let manifest = SuiteManifest::parse(toml).unwrap();
        assert_eq!(manifest.name(), "core");
        assert_eq!(manifest.suite.conflict_resolution, None);
        assert!(manifest.imports.is_empty());
        assert!(manifest.projects.is_empty());
    }

    #[test]
    fn parse_full_manifest() {
        let toml = r#"
[suite]
name = "fastr"
version = "1.2.3"
conflict-resolution = "latest"
default-license = "GPLv2"

[[import]]
name = "truffle"
revision = "3c34543a8b7ff5edd74b76aafbeb3af52bd4afe7"
urls = [
    { url = "https://github.com/graalvm/truffle", kind = "git" },
    { url = "https://snapshots.example.com/nexus", kind = "binary" },
]

[repositories.snapshots]
url = "https://snapshots.example.com/nexus"
licenses = ["GPLv2"]

[licenses.GPLv2]
name = "GNU General Public License, version 2"
url = "http://www.gnu.org/licenses/old-licenses/gpl-2.0.en.html"

[[library]]
name = "GNUR"
path = "libdownloads/R-3.3.0.tar.gz"
urls = ["http://cran.rstudio.com/src/base/R-3/R-3.3.0.tar.gz"]
sha1 = "166a25a7996150c9c83cdafcc89bfcd81578a887"
resource = true

[[library]]
name = "JDK_TOOLS"
path = "${JAVA_HOME}/lib/tools.jar"
sha1 = "NOCHECK"

[[project]]
name = "com.oracle.truffle.r.native"
dependencies = ["GNUR"]
native = true
class = "FastRNativeProject"

[[project]]
name = "com.oracle.truffle.r.parser"
source-dirs = ["src"]
dependencies = ["truffle:TRUFFLE_API"]
annotation-processors = ["truffle:TRUFFLE_DSL_PROCESSOR"]

[[distribution]]
name = "FASTR"
dependencies = ["com.oracle.truffle.r.parser"]
exclude = ["GNUR"]
dist-dependencies = ["truffle:TRUFFLE_API"]
main-class = "com.oracle.truffle.r.engine.shell.RCommand"

[distribution.os-arch.linux.amd64]
path = "build/dists/linux/amd64/fastr.jar"
"#;
        let manifest = SuiteManifest::parse(toml).unwrap();
        assert_eq!(
            manifest.suite.conflict_resolution,
            Some(ConflictPolicy::Latest)
        );
        assert_eq!(manifest.imports.len(), 1);
        assert_eq!(manifest.imports[0].urls[1].kind, LocationKind::Binary);
        assert_eq!(manifest.libraries.len(), 2);
        assert!(manifest.library("GNUR").unwrap().resource);
        assert_eq!(
            manifest
                .library("JDK_TOOLS")
                .unwrap()
                .digest_requirement("fastr")
                .unwrap(),
            DigestRequirement::Skip
        );
        let native = manifest.project("com.oracle.truffle.r.native").unwrap();
        assert!(native.native);
        assert_eq!(native.class.as_deref(), Some("FastRNativeProject"));
        let dist = manifest.distribution("FASTR").unwrap();
        assert!(dist.publish);
        assert_eq!(dist.os_arch["linux"]["amd64"].path.as_deref(), Some("build/dists/linux/amd64/fastr.jar"));
        assert_eq!(manifest.entity_kind("FASTR"), Some(EntityKind::Distribution));
    }

    #[test]
    fn declaration_order_is_preserved() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[project]]
name = "zeta"

[[project]]
name = "alpha"

[[project]]
name = "mu"
"#;
        let manifest = SuiteManifest::parse(toml).unwrap();
        let names: Vec<_> = manifest.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mu"]);
    }

    #[test]
    fn default_distribution_path() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[distribution]]
name = "FASTR_UNIT_TESTS"
"#;
        let manifest = SuiteManifest::parse(toml).unwrap();
        assert_eq!(
            manifest.distributions[0].default_path(),
            Path::new("build/dists/fastr-unit-tests.jar")
        );
    }

    #[test]
    fn missing_digest_is_rejected() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[library]]
name = "LIB"
urls = ["https://example.com/lib.jar"]
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::MissingDigest { .. }));
    }

    #[test]
    fn malformed_digest_is_rejected() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[library]]
name = "LIB"
urls = ["https://example.com/lib.jar"]
sha1 = "not-hex"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidDigest { .. }));
    }

    #[test]
    fn library_without_source_is_rejected() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[library]]
name = "LIB"
sha1 = "NOCHECK"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::NoLibrarySource { .. }));
    }

    #[test]
    fn duplicate_names_across_kinds() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[project]]
name = "thing"

[[distribution]]
name = "thing"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::DuplicateName {
                first: EntityKind::Project,
                second: EntityKind::Distribution,
                ..
            }
        ));
    }

    #[test]
    fn qualifier_not_allowed_in_names() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[project]]
name = "other:thing"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName(..)));
    }

    #[test]
    fn import_without_locations() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[import]]
name = "t"
revision = "abc"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::NoImportLocations { .. }));
    }

    #[test]
    fn self_import() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"

[[import]]
name = "s"
revision = "abc"
urls = [{ url = "../s", kind = "git" }]
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::SelfImport(..)));
    }

    #[test]
    fn unknown_license() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"
default-license = "BSD-new"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownLicense { .. }));
    }

    #[test]
    fn format_version_newer_than_tool() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"
format-version = "999.0.0"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedFormat { .. }));
    }

    #[test]
    fn invalid_version() {
        let toml = r#"
[suite]
name = "s"
version = "not-a-version"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVersion(..)));
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let toml = r#"
[suite]
name = "s"
version = "0.1.0"
mxversion = "5.34.4"
"#;
        let err = SuiteManifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(..)));
    }

    #[test]
    fn conflict_policy_from_str() {
        assert_eq!("latest".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Latest));
        assert_eq!("none".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Strict));
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }
}
