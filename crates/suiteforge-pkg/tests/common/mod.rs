//! Shared fixtures for resolver integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use suiteforge_pkg::{
    Config, FetchError, ImportLocation, Resolver, RevisionStamp, Snapshot, SuiteFetcher, Transport,
    MANIFEST_FILE,
};
use tempfile::TempDir;

/// A temporary tree holding a root suite and snapshots of imported suites.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the root suite and return its directory.
    pub fn root(&self, toml: &str) -> PathBuf {
        let dir = self.path().join("root");
        write_manifest(&dir, toml);
        dir
    }

    /// Write the snapshot of `suite` at `revision`.
    pub fn snapshot(&self, suite: &str, revision: &str, toml: &str) {
        write_manifest(&self.snapshots().join(suite).join(revision), toml);
    }

    pub fn snapshots(&self) -> PathBuf {
        self.path().join("snapshots")
    }

    pub fn config(&self) -> Config {
        Config {
            cache_dir: self.path().join("cache"),
            ..Config::default()
        }
    }
}

fn write_manifest(dir: &Path, toml: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(MANIFEST_FILE), toml).unwrap();
}

/// Serves snapshots from `<base>/<suite>/<revision>`, with optional
/// commit times per revision.
pub struct SnapshotFetcher {
    base: PathBuf,
    times: HashMap<(String, String), i64>,
    pub fetches: AtomicUsize,
}

impl SnapshotFetcher {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            times: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn committed(mut self, suite: &str, revision: &str, unix_seconds: i64) -> Self {
        self.times
            .insert((suite.to_string(), revision.to_string()), unix_seconds);
        self
    }
}

impl SuiteFetcher for SnapshotFetcher {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let path = self.base.join(suite).join(revision);
        if !path.join(MANIFEST_FILE).is_file() {
            return Err(FetchError::NotFound {
                location: format!("{}/{suite}/{revision}", location.url),
            });
        }
        let stamp = match self.times.get(&(suite.to_string(), revision.to_string())) {
            Some(&t) => RevisionStamp::at(revision, t),
            None => RevisionStamp::unknown(revision),
        };
        Ok(Snapshot { path, stamp })
    }
}

/// Serves artifacts from memory and counts downloads per URL.
#[derive(Default)]
pub struct MemoryTransport {
    files: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    downloads: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Sleep before answering, to widen race windows.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn downloads(&self, url: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.lock().unwrap().values().sum()
    }
}

impl Transport for MemoryTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .downloads
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.files.get(url).cloned().ok_or_else(|| FetchError::NotFound {
            location: url.to_string(),
        })
    }
}

/// A resolver wired to in-memory collaborators.
pub fn resolver(
    sandbox: &Sandbox,
    fetcher: SnapshotFetcher,
    transport: Arc<MemoryTransport>,
) -> Resolver {
    Resolver::new(sandbox.config())
        .with_fetcher(Arc::new(fetcher))
        .with_transport(transport)
}

/// A `[suite]` header.
pub fn header(name: &str) -> String {
    format!("[suite]\nname = \"{name}\"\nversion = \"1.0.0\"\n")
}

/// An `[[import]]` entry.
pub fn import(name: &str, revision: &str) -> String {
    format!(
        "\n[[import]]\nname = \"{name}\"\nrevision = \"{revision}\"\nurls = [{{ url = \"https://git.example.com/{name}\", kind = \"git\" }}]\n"
    )
}

/// Hex SHA-1 of some bytes.
pub fn sha1_hex(bytes: &[u8]) -> String {
    suiteforge_pkg::Digest::compute(suiteforge_pkg::DigestAlgorithm::Sha1, bytes).hex
}
