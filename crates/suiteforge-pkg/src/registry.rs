//! External library registry.
//!
//! Every library declared by any suite in the resolved set is registered here
//! under its global identity. Materializing a library makes sure a verified
//! copy exists at its local path:
//! - a file already on disk is reused if it verifies
//! - otherwise the declared URLs are tried in order through the [`Transport`]
//! - downloaded bytes are checked by the [`ChecksumVerifier`] before they
//!   are written
//!
//! `${VAR}` references in a declared path are expanded on materialization,
//! so an unset variable only fails the library that uses it.
//!
//! Each identity has its own slot, so concurrent callers asking for the same
//! library wait for a single fetch and all observe its outcome. Outcomes,
//! failures included, are kept for the lifetime of the registry.

use crate::digest::{ChecksumVerifier, Digest, DigestRequirement};
use crate::error::{ConflictError, ErrorKind, ResolveError};
use crate::manifest::Library;
use crate::transport::{FetchError, Transport};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while materializing a library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("unknown library '{0}'")]
    UnknownLibrary(String),

    /// The artifact's bytes do not match the declared digest.
    #[error("checksum verification failed for '{library}' from '{url}': expected {expected}, got {actual}")]
    Verification {
        library: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("could not fetch library '{library}': {source}")]
    Fetch {
        library: String,
        #[source]
        source: FetchError,
    },

    #[error("path '{path}' of library '{library}' references undefined environment variable '{variable}'")]
    UndefinedVariable {
        library: String,
        path: String,
        variable: String,
    },

    #[error("could not store library '{library}' at '{path}': {reason}")]
    Io {
        library: String,
        path: String,
        reason: String,
    },
}

impl MaterializeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Verification { .. } => ErrorKind::Verification,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::UndefinedVariable { .. } => ErrorKind::Manifest,
            Self::UnknownLibrary(_) | Self::Io { .. } => ErrorKind::Other,
        }
    }

    /// The library the error is about.
    #[must_use]
    pub fn library(&self) -> &str {
        match self {
            Self::UnknownLibrary(library)
            | Self::Verification { library, .. }
            | Self::Fetch { library, .. }
            | Self::UndefinedVariable { library, .. }
            | Self::Io { library, .. } => library,
        }
    }
}

/// Verification state of a registered library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    /// Not materialized yet.
    Unverified,
    /// Materialized and matched its digest.
    Verified,
    /// Materialized under an explicit `NOCHECK` exemption.
    Exempt,
    /// Materialization failed.
    Failed,
}

impl std::fmt::Display for LibraryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified => f.write_str("unverified"),
            Self::Verified => f.write_str("verified"),
            Self::Exempt => f.write_str("exempt"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A library after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredLibrary {
    pub name: String,
    /// Download URLs; mirrors from later identical declarations are appended.
    pub urls: Vec<String>,
    pub digest: DigestRequirement,
    /// Declared local path, `${VAR}` references unexpanded. Libraries
    /// without one are kept under the registry's cache directory.
    pub path: Option<String>,
    /// Checkout of the declaring suite; relative paths resolve against it.
    pub suite_root: PathBuf,
    /// Resource-only libraries are never linked.
    pub resource: bool,
    pub license: Option<String>,
    /// Suite whose declaration was registered first.
    pub declared_by: String,
    /// Suites that re-declared the library identically.
    pub also_declared_by: Vec<String>,
}

type Outcome = Result<PathBuf, MaterializeError>;
type Slot = Arc<Mutex<Option<Outcome>>>;

/// The global library namespace of one resolution.
pub struct ArtifactRegistry {
    libraries: BTreeMap<String, RegisteredLibrary>,
    cache_dir: PathBuf,
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn ChecksumVerifier>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("libraries", &self.libraries)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl ArtifactRegistry {
    /// Create an empty registry. Libraries without a path are stored under
    /// `cache_dir`.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn ChecksumVerifier>,
    ) -> Self {
        Self {
            libraries: BTreeMap::new(),
            cache_dir: cache_dir.into(),
            transport,
            verifier,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Register a library declared by `suite`, whose checkout is `suite_root`.
    ///
    /// Registering identical metadata again is a no-op apart from recording
    /// the extra declaring suite and any new mirror URLs.
    ///
    /// # Errors
    ///
    /// Returns a conflict if the library is already registered with a
    /// different digest, or a manifest error if its digest is malformed.
    pub fn register(
        &mut self,
        suite: &str,
        suite_root: &Path,
        library: &Library,
    ) -> Result<(), ResolveError> {
        let digest = library.digest_requirement(suite)?;

        if let Some(existing) = self.libraries.get_mut(&library.name) {
            if existing.digest != digest {
                return Err(ConflictError::LibraryDigest {
                    library: library.name.clone(),
                    first_suite: existing.declared_by.clone(),
                    first: existing.digest.to_string(),
                    second_suite: suite.to_string(),
                    second: digest.to_string(),
                }
                .into());
            }
            for url in &library.urls {
                if !existing.urls.contains(url) {
                    existing.urls.push(url.clone());
                }
            }
            if existing.declared_by != suite && !existing.also_declared_by.iter().any(|s| s == suite) {
                existing.also_declared_by.push(suite.to_string());
            }
            debug!(library = %library.name, suite, "library already registered");
            return Ok(());
        }

        if digest == DigestRequirement::Skip {
            warn!(library = %library.name, suite, "library is exempt from checksum verification");
        }
        self.libraries.insert(
            library.name.clone(),
            RegisteredLibrary {
                name: library.name.clone(),
                urls: library.urls.clone(),
                digest,
                path: library.path.clone(),
                suite_root: suite_root.to_path_buf(),
                resource: library.resource,
                license: library.license.clone(),
                declared_by: suite.to_string(),
                also_declared_by: Vec::new(),
            },
        );
        Ok(())
    }

    /// Absolute local path of a library.
    ///
    /// # Errors
    ///
    /// Returns an error if the library is unknown or its declared path
    /// references an unset environment variable.
    pub fn local_path(&self, id: &str) -> Result<PathBuf, MaterializeError> {
        let library = self
            .libraries
            .get(id)
            .ok_or_else(|| MaterializeError::UnknownLibrary(id.to_string()))?;
        self.library_path(library)
    }

    fn library_path(&self, library: &RegisteredLibrary) -> Result<PathBuf, MaterializeError> {
        match &library.path {
            Some(raw) => {
                let expanded = expand_vars(raw).map_err(|variable| MaterializeError::UndefinedVariable {
                    library: library.name.clone(),
                    path: raw.clone(),
                    variable,
                })?;
                let path = PathBuf::from(expanded);
                Ok(if path.is_relative() {
                    library.suite_root.join(path)
                } else {
                    path
                })
            }
            None => {
                let file_name = library
                    .urls
                    .first()
                    .and_then(|url| url.rsplit('/').next())
                    .filter(|name| !name.is_empty())
                    .unwrap_or(&library.name);
                Ok(self.cache_dir.join(&library.name).join(file_name))
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RegisteredLibrary> {
        self.libraries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.libraries.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredLibrary> {
        self.libraries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Libraries declared `NOCHECK`, for auditing.
    pub fn exempt(&self) -> impl Iterator<Item = &RegisteredLibrary> {
        self.libraries
            .values()
            .filter(|lib| lib.digest == DigestRequirement::Skip)
    }

    fn slot(&self, id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    fn outcome(&self, id: &str) -> Option<Outcome> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.get(id)?)
        };
        let outcome = slot.lock().unwrap_or_else(PoisonError::into_inner);
        outcome.clone()
    }

    /// Make sure a verified copy of the library exists locally.
    ///
    /// At most one fetch happens per identity; later and concurrent callers
    /// get the recorded outcome. URLs are tried in order until one yields
    /// bytes that verify: a download failure and a digest mismatch both move
    /// on to the next mirror.
    ///
    /// # Errors
    ///
    /// Returns a verification error if any mirror served mismatching bytes
    /// and none served matching ones, a fetch error if no URL could be
    /// downloaded, and an error if the library is unknown, its path cannot
    /// be expanded or the file cannot be written.
    pub fn materialize(&self, id: &str) -> Result<PathBuf, MaterializeError> {
        let library = self
            .libraries
            .get(id)
            .ok_or_else(|| MaterializeError::UnknownLibrary(id.to_string()))?;

        let slot = self.slot(id);
        let mut outcome = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(done) = outcome.as_ref() {
            return done.clone();
        }

        let result = self.fetch_and_verify(library);
        match &result {
            Ok(path) => info!(library = id, path = %path.display(), "materialized"),
            Err(err) => warn!(library = id, "materialization failed: {err}"),
        }
        *outcome = Some(result.clone());
        result
    }

    /// Materialize several libraries in parallel, once per distinct identity.
    pub fn materialize_all<'a, I>(&self, ids: I) -> BTreeMap<String, Result<PathBuf, MaterializeError>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = ids.into_iter().collect();
        distinct
            .into_par_iter()
            .map(|id| (id.to_string(), self.materialize(id)))
            .collect()
    }

    fn fetch_and_verify(&self, library: &RegisteredLibrary) -> Outcome {
        let path = self.library_path(library)?;

        if path.is_file() {
            let bytes = fs::read(&path).map_err(|e| MaterializeError::Io {
                library: library.name.clone(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            match &library.digest {
                DigestRequirement::Skip => return Ok(path.clone()),
                DigestRequirement::Verify(expected) => {
                    if self.verifier.verify(&bytes, expected) {
                        debug!(library = %library.name, "reusing verified local copy");
                        return Ok(path.clone());
                    }
                    if library.urls.is_empty() {
                        return Err(mismatch(library, &path.display().to_string(), expected, &bytes));
                    }
                    debug!(library = %library.name, "local copy is stale, downloading");
                }
            }
        }

        let mut attempts = Vec::new();
        let mut rejected = None;
        for url in &library.urls {
            let bytes = match self.transport.download(url) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(library = %library.name, url, "download failed: {err}");
                    attempts.push(format!("{url}: {err}"));
                    continue;
                }
            };

            if let DigestRequirement::Verify(expected) = &library.digest {
                if !self.verifier.verify(&bytes, expected) {
                    warn!(library = %library.name, url, "checksum mismatch, trying next url");
                    attempts.push(format!("{url}: checksum mismatch"));
                    rejected.get_or_insert_with(|| mismatch(library, url, expected, &bytes));
                    continue;
                }
            }

            store(library, &path, &bytes)?;
            return Ok(path);
        }

        if let Some(err) = rejected {
            return Err(err);
        }

        let source = if library.urls.is_empty() {
            FetchError::NotFound {
                location: path.display().to_string(),
            }
        } else {
            FetchError::Exhausted {
                what: format!("library '{}'", library.name),
                attempts,
            }
        };
        Err(MaterializeError::Fetch {
            library: library.name.clone(),
            source,
        })
    }

    /// The local path of a library, once it has been materialized successfully.
    #[must_use]
    pub fn resolved_path(&self, id: &str) -> Option<PathBuf> {
        self.outcome(id).and_then(Result::ok)
    }

    /// Verification state of a library, `None` if it is not registered.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<LibraryStatus> {
        let library = self.libraries.get(id)?;
        Some(match self.outcome(id) {
            None => LibraryStatus::Unverified,
            Some(Err(_)) => LibraryStatus::Failed,
            Some(Ok(_)) if library.digest == DigestRequirement::Skip => LibraryStatus::Exempt,
            Some(Ok(_)) => LibraryStatus::Verified,
        })
    }
}

fn mismatch(library: &RegisteredLibrary, url: &str, expected: &Digest, bytes: &[u8]) -> MaterializeError {
    MaterializeError::Verification {
        library: library.name.clone(),
        url: url.to_string(),
        expected: expected.to_string(),
        actual: Digest::compute(expected.algorithm, bytes).to_string(),
    }
}

/// Write through a uniquely named temporary sibling so a partial file never
/// carries the final name, even when other libraries share the directory.
fn store(library: &RegisteredLibrary, path: &Path, bytes: &[u8]) -> Result<(), MaterializeError> {
    let io_err = |path: &Path, e: std::io::Error| MaterializeError::Io {
        library: library.name.clone(),
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(".suiteforge-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| io_err(parent, e))?;
    staged.write_all(bytes).map_err(|e| io_err(staged.path(), e))?;
    staged.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

/// Expand `${VAR}` references from the environment. Fails with the name of
/// the first unset variable.
fn expand_vars(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let variable = &rest[start + 2..start + 2 + len];
        let value = std::env::var(variable).map_err(|_| variable.to_string())?;
        out.push_str(&rest[..start]);
        out.push_str(&value);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Ok(out)
}
