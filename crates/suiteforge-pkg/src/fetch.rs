//! Fetching imported suites at pinned revisions.
//!
//! A [`SuiteFetcher`] turns an import location and a revision into a local
//! snapshot directory plus a [`RevisionStamp`] used to order revisions when
//! the `latest` conflict policy has to choose between two of them.

use crate::config::Config;
use crate::manifest::{ImportLocation, LocationKind, MANIFEST_FILE};
use crate::transport::{local_path, FetchError, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Orders revisions of one suite.
///
/// Revisions compare by commit time first, with unknown times sorting before
/// every known time, then by revision identifier. The order is total, so the
/// choice between two revisions never depends on fetch order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionStamp {
    pub committed_at: Option<DateTime<Utc>>,
    pub revision: String,
}

impl RevisionStamp {
    /// A stamp with no commit time.
    pub fn unknown(revision: impl Into<String>) -> Self {
        Self {
            committed_at: None,
            revision: revision.into(),
        }
    }

    /// A stamp committed at the given Unix time.
    pub fn at(revision: impl Into<String>, unix_seconds: i64) -> Self {
        Self {
            committed_at: DateTime::from_timestamp(unix_seconds, 0),
            revision: revision.into(),
        }
    }
}

impl std::fmt::Display for RevisionStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.committed_at {
            Some(at) => write!(f, "{} ({})", self.revision, at.to_rfc3339()),
            None => f.write_str(&self.revision),
        }
    }
}

/// A suite checked out at a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Directory containing the suite's manifest.
    pub path: PathBuf,
    pub stamp: RevisionStamp,
}

/// Materializes a suite at a pinned revision from one location.
pub trait SuiteFetcher: Send + Sync {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError>;
}

/// Clones git repositories into the suite cache, one working tree per revision.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    cache_dir: PathBuf,
}

impl GitFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }
}

impl SuiteFetcher for GitFetcher {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError> {
        let dest = self.cache_dir.join(suite).join(revision);
        let dest_str = dest.to_string_lossy().into_owned();

        if !dest.join(".git").exists() {
            if dest.exists() {
                fs::remove_dir_all(&dest).map_err(|e| FetchError::io(&dest, &e))?;
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, &e))?;
            }
            info!(suite, url = %location.url, "cloning");
            run_git(None, &["clone", "--quiet", "--no-checkout", &location.url, &dest_str])?;
        }

        if run_git(Some(&dest), &["checkout", "--quiet", "--detach", revision]).is_err() {
            debug!(suite, revision, "revision not in clone, fetching");
            run_git(Some(&dest), &["fetch", "--quiet", "origin", revision])?;
            run_git(Some(&dest), &["checkout", "--quiet", "--detach", revision])?;
        }

        let committed = run_git(Some(&dest), &["show", "-s", "--format=%ct", revision])?;
        let seconds: i64 = committed
            .trim()
            .parse()
            .map_err(|_| FetchError::InvalidSnapshot {
                location: location.url.clone(),
                reason: format!("unreadable commit time '{}'", committed.trim()),
            })?;

        Ok(Snapshot {
            path: dest,
            stamp: RevisionStamp::at(revision, seconds),
        })
    }
}

fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String, FetchError> {
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let output = command.args(args).output().map_err(|e| FetchError::Command {
        command: format!("git {}", args.join(" ")),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(FetchError::Command {
            command: format!("git {}", args.join(" ")),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Downloads `<url>/<suite>/<revision>.tar.gz` snapshots and unpacks them.
pub struct BinaryFetcher {
    transport: Arc<dyn Transport>,
    cache_dir: PathBuf,
}

impl BinaryFetcher {
    pub fn new(transport: Arc<dyn Transport>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            cache_dir: cache_dir.into(),
        }
    }
}

impl SuiteFetcher for BinaryFetcher {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError> {
        let dest = self.cache_dir.join(suite).join(format!("{revision}-binary"));
        if dest.join(MANIFEST_FILE).is_file() {
            debug!(suite, revision, "using cached binary snapshot");
            return Ok(Snapshot {
                path: dest,
                stamp: RevisionStamp::unknown(revision),
            });
        }

        let url = format!("{}/{suite}/{revision}.tar.gz", location.url.trim_end_matches('/'));
        info!(suite, %url, "downloading binary snapshot");
        let data = self.transport.download(&url)?;
        unpack_snapshot(&data, &dest, &url)?;

        Ok(Snapshot {
            path: dest,
            stamp: RevisionStamp::unknown(revision),
        })
    }
}

/// Unpack a gzipped tarball so that `dest` holds the suite manifest,
/// stripping a single top-level directory when the archive has one.
fn unpack_snapshot(data: &[u8], dest: &Path, url: &str) -> Result<(), FetchError> {
    use flate2::read::GzDecoder;

    let staging = dest.with_extension("partial");
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| FetchError::io(&staging, &e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| FetchError::io(&staging, &e))?;

    let mut archive = tar::Archive::new(GzDecoder::new(data));
    archive.unpack(&staging).map_err(|e| FetchError::InvalidSnapshot {
        location: url.to_string(),
        reason: e.to_string(),
    })?;

    let root = if staging.join(MANIFEST_FILE).is_file() {
        staging.clone()
    } else {
        let entries: Vec<PathBuf> = fs::read_dir(&staging)
            .map_err(|e| FetchError::io(&staging, &e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        match entries.as_slice() {
            [only] if only.join(MANIFEST_FILE).is_file() => only.clone(),
            _ => {
                return Err(FetchError::InvalidSnapshot {
                    location: url.to_string(),
                    reason: format!("no {MANIFEST_FILE} in archive"),
                })
            }
        }
    };

    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| FetchError::io(dest, &e))?;
    }
    fs::rename(&root, dest).map_err(|e| FetchError::io(dest, &e))?;
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| FetchError::io(&staging, &e))?;
    }
    Ok(())
}

/// Uses an existing local checkout: `<dir>/<suite>` or `<dir>` itself.
///
/// Local checkouts carry no history, so their stamps have no commit time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryFetcher;

impl SuiteFetcher for DirectoryFetcher {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError> {
        let dir = local_path(&location.url).ok_or_else(|| FetchError::NotFound {
            location: location.url.clone(),
        })?;

        [dir.join(suite), dir.to_path_buf()]
            .into_iter()
            .find(|candidate| candidate.join(MANIFEST_FILE).is_file())
            .map(|path| Snapshot {
                path,
                stamp: RevisionStamp::unknown(revision),
            })
            .ok_or_else(|| FetchError::NotFound {
                location: dir.join(suite).display().to_string(),
            })
    }
}

/// Dispatches on the location: local directories are used in place,
/// everything else by its declared kind.
pub struct KindFetcher {
    git: GitFetcher,
    binary: BinaryFetcher,
    directory: DirectoryFetcher,
}

impl KindFetcher {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            git: GitFetcher::new(config.suite_cache()),
            binary: BinaryFetcher::new(transport, config.suite_cache()),
            directory: DirectoryFetcher,
        }
    }
}

impl SuiteFetcher for KindFetcher {
    fn fetch(
        &self,
        location: &ImportLocation,
        suite: &str,
        revision: &str,
    ) -> Result<Snapshot, FetchError> {
        if local_path(&location.url).is_some_and(Path::is_dir) {
            return self.directory.fetch(location, suite, revision);
        }
        match location.kind {
            LocationKind::Git => self.git.fetch(location, suite, revision),
            LocationKind::Binary => self.binary.fetch(location, suite, revision),
        }
    }
}
