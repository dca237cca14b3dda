//! Content-addressed identity and hashing primitives.
//!
//! This crate defines the two hash surfaces the engine depends on:
//!
//! - **Blob ids**: the SHA1 of a document's raw bytes, hex lowercase. Two
//!   documents with equal blob ids have identical byte content and are exact
//!   duplicates by definition.
//! - **Band values**: the SHA1 of the canonical byte serialization of one
//!   LSH band's sketch rows.
//!
//! # Byte layouts
//!
//! ## Blob id
//!
//! ```text
//! SHA1(raw_bytes) → 40-char lowercase hex
//! ```
//!
//! ## Band value
//!
//! Each sketch row `(token_index, t)` is serialized as two fixed-width
//! big-endian integers, concatenated in row order:
//!
//! ```text
//! SHA1(idx_0.to_be_bytes() || t_0.to_be_bytes() || idx_1.to_be_bytes() || ...)
//! ```
//!
//! No other source of randomness enters identifiers: given the same input
//! bytes and the same sketch parameters, every id in the index is
//! reproducible bit-for-bit.

use std::fmt;

use sha1::{Digest, Sha1};
use thiserror::Error;

/// Compute the blob id of raw document bytes.
///
/// # Examples
///
/// ```
/// let id = identity::blob_id(b"hello\n");
/// assert_eq!(id, "f572d396fae9206628714fb2ce00f72e94f2258f");
/// ```
pub fn blob_id(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash one band's sketch rows to an opaque band value.
///
/// Rows are serialized canonically (big-endian, fixed width) so the value is
/// stable across platforms and runs.
pub fn band_value(rows: &[(u64, i64)]) -> String {
    let mut hasher = Sha1::new();
    for &(idx, t) in rows {
        hasher.update(idx.to_be_bytes());
        hasher.update(t.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Errors produced when parsing a rendered document key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("document key is missing the `//` repo/path separator")]
    MissingRepoSeparator,
    #[error("document key is missing the `@` blob separator")]
    MissingBlobSeparator,
    #[error("function suffix must be `:name:line`, got {0:?}")]
    InvalidFunctionSuffix(String),
    #[error("function line is not a number: {0:?}")]
    InvalidFunctionLine(String),
}

/// A function-scoped document within a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub name: String,
    pub line: u32,
}

/// The stable identifier of one indexable document.
///
/// Rendered as `repo//path@blob-id` for whole files and
/// `repo//path@blob-id:name:line` for function-scoped documents. The
/// rendered form is the primary key used everywhere downstream; `parse`
/// round-trips it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub repo: String,
    pub path: String,
    pub blob_id: String,
    pub function: Option<FunctionRef>,
}

impl DocumentKey {
    /// Key for a whole-file document.
    pub fn file(repo: impl Into<String>, path: impl Into<String>, blob_id: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            path: path.into(),
            blob_id: blob_id.into(),
            function: None,
        }
    }

    /// Key for a function-scoped document.
    pub fn function(
        repo: impl Into<String>,
        path: impl Into<String>,
        blob_id: impl Into<String>,
        name: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            repo: repo.into(),
            path: path.into(),
            blob_id: blob_id.into(),
            function: Some(FunctionRef {
                name: name.into(),
                line,
            }),
        }
    }

    /// Parse a rendered key back into its parts.
    pub fn parse(rendered: &str) -> Result<Self, KeyError> {
        let (repo, rest) = rendered
            .split_once("//")
            .ok_or(KeyError::MissingRepoSeparator)?;
        let (path, tail) = rest
            .rsplit_once('@')
            .ok_or(KeyError::MissingBlobSeparator)?;

        // A function-scoped key carries exactly two `:`-separated fields
        // after the blob id.
        let mut parts = tail.split(':');
        let blob = parts.next().unwrap_or_default();
        let function = match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => None,
            (Some(name), Some(line), None) => Some(FunctionRef {
                name: name.to_string(),
                line: line
                    .parse()
                    .map_err(|_| KeyError::InvalidFunctionLine(line.to_string()))?,
            }),
            _ => return Err(KeyError::InvalidFunctionSuffix(tail.to_string())),
        };

        Ok(Self {
            repo: repo.to_string(),
            path: path.to_string(),
            blob_id: blob.to_string(),
            function,
        })
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}@{}", self.repo, self.path, self.blob_id)?;
        if let Some(func) = &self.function {
            write!(f, ":{}:{}", func.name, func.line)?;
        }
        Ok(())
    }
}
