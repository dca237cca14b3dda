//! Repository walking for srcdup.
//!
//! The indexing pipeline consumes a stream of blobs from a [`RepoWalker`];
//! where those blobs come from (a checkout on disk, an archival container, a
//! remote) is not the engine's concern. This crate defines the contract and
//! ships two implementations:
//!
//! - [`FsRepoWalker`]: walks a directory on disk, treating it as a single
//!   repository. VCS internals (`.git` and friends) and hidden entries are
//!   skipped, and binary files are flagged with the classic NUL-byte sniff
//!   so the pipeline can filter them.
//! - [`MemoryWalker`]: a fixed in-memory blob list, for tests and ephemeral
//!   pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// How many leading bytes are sniffed for NUL when classifying a blob as
/// binary. Matches the conventional git heuristic.
const BINARY_SNIFF_LEN: usize = 8000;

/// One observation yielded by a walker.
///
/// A file that exists but cannot be read is a per-document event, not a
/// fatal error: the pipeline counts it and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    Blob(WalkedBlob),
    Unreadable { path: String, reason: String },
}

/// One blob yielded by a walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedBlob {
    /// Repository identifier (for a filesystem walk, the directory name).
    pub repo: String,
    /// Commit hash the blob was read at, or a sentinel for plain directories.
    pub commit: String,
    /// Path of the file relative to the repository root, `/`-separated.
    pub path: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Whether the content sniffs as binary. Binary blobs are not indexed.
    pub is_binary: bool,
}

/// Errors produced while walking a repository.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("repository root {0:?} does not exist or is not a directory")]
    RootNotFound(PathBuf),
    #[error("walk aborted: {0}")]
    Aborted(String),
}

/// Source of blobs for the indexing pipeline.
pub trait RepoWalker {
    /// Visit every event. The visitor returning an error aborts the walk.
    fn walk(
        &self,
        visitor: &mut dyn FnMut(WalkEvent) -> Result<(), WalkError>,
    ) -> Result<(), WalkError>;
}

/// Classify content as binary with the NUL-byte sniff over the first
/// [`BINARY_SNIFF_LEN`] bytes.
pub fn sniff_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_SNIFF_LEN)
        .any(|&b| b == 0)
}

/// Walks a directory on disk as one repository.
#[derive(Debug)]
pub struct FsRepoWalker {
    root: PathBuf,
    repo: String,
    commit: String,
}

impl FsRepoWalker {
    /// Open a walker over `root`. The repository id defaults to the
    /// directory's file name.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WalkError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(WalkError::RootNotFound(root));
        }
        let repo = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.to_string_lossy().into_owned());
        Ok(Self {
            root,
            repo,
            commit: identity_commit(),
        })
    }

    /// Override the repository identifier.
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    /// Override the commit hash recorded for every blob.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = commit.into();
        self
    }
}

fn identity_commit() -> String {
    // Plain directories carry no VCS metadata.
    "WORKDIR".to_string()
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

impl RepoWalker for FsRepoWalker {
    fn walk(
        &self,
        visitor: &mut dyn FnMut(WalkEvent) -> Result<(), WalkError>,
    ) -> Result<(), WalkError> {
        // sort_by_file_name gives a stable visiting order across platforms,
        // which keeps the pipeline's skip summaries and logs reproducible.
        let iter = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in iter {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // An unreadable directory entry skips that entry only.
                    let path = err
                        .path()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|| self.root.to_string_lossy().into_owned());
                    visitor(WalkEvent::Unreadable {
                        path,
                        reason: err.to_string(),
                    })?;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    visitor(WalkEvent::Unreadable {
                        path: rel,
                        reason: err.to_string(),
                    })?;
                    continue;
                }
            };
            let is_binary = sniff_binary(&bytes);
            debug!(repo = %self.repo, path = %rel, bytes = bytes.len(), is_binary, "walked blob");

            visitor(WalkEvent::Blob(WalkedBlob {
                repo: self.repo.clone(),
                commit: self.commit.clone(),
                path: rel,
                bytes,
                is_binary,
            }))?;
        }
        Ok(())
    }
}

/// A walker over a fixed list of events, for tests and ephemeral pipelines.
#[derive(Default)]
pub struct MemoryWalker {
    events: Vec<WalkEvent>,
}

impl MemoryWalker {
    pub fn new(events: Vec<WalkEvent>) -> Self {
        Self { events }
    }

    /// Direct access to the event list, for building fixtures.
    pub fn events_mut(&mut self) -> &mut Vec<WalkEvent> {
        &mut self.events
    }

    /// Convenience for text blobs in a named repo at a sentinel commit.
    pub fn push_text(&mut self, repo: &str, path: &str, text: &str) {
        self.events.push(WalkEvent::Blob(WalkedBlob {
            repo: repo.to_string(),
            commit: identity_commit(),
            path: path.to_string(),
            bytes: text.as_bytes().to_vec(),
            is_binary: false,
        }));
    }
}

impl RepoWalker for MemoryWalker {
    fn walk(
        &self,
        visitor: &mut dyn FnMut(WalkEvent) -> Result<(), WalkError>,
    ) -> Result<(), WalkError> {
        for event in &self.events {
            visitor(event.clone())?;
        }
        Ok(())
    }
}
