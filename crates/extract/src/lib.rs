//! Feature extraction for srcdup.
//!
//! The similarity engine consumes documents as weighted bags of features; it
//! never looks at syntax itself. This crate defines that contract (the
//! [`FeatureExtractor`] trait and the [`Feature`] record) together with
//! [`TokenExtractor`], a deterministic identifier-based implementation that
//! makes the pipeline usable end-to-end without an external parser.
//!
//! Extractors must be pure: the same bytes and the same configuration must
//! always produce the same features, because features feed the corpus
//! vocabulary and the sketch space.
//!
//! ```
//! use extract::{ExtractConfig, FeatureExtractor, TokenExtractor};
//!
//! let extractor = TokenExtractor::new(ExtractConfig::default()).unwrap();
//! let features = extractor.extract_file(b"fn main() { run(); }").unwrap();
//! assert!(features.iter().any(|f| f.token == "main"));
//! ```

mod config;
mod tokens;

pub use crate::config::{ExtractConfig, ExtractError};
pub use crate::tokens::TokenExtractor;

use serde::{Deserialize, Serialize};

/// One weighted feature emitted for a document.
///
/// Equal tokens within one document are summed into a single feature by the
/// extractor; weights are positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub token: String,
    pub weight: u32,
}

/// Features for one function-scoped document within a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFeatures {
    /// Function name as written in the source.
    pub name: String,
    /// 1-based line of the definition.
    pub line: u32,
    /// The function's own text; its bytes are the function document's
    /// content for identity purposes.
    pub text: String,
    pub features: Vec<Feature>,
}

/// Supplier of weighted feature bags.
///
/// Implementations must be deterministic per input. `Send + Sync` because
/// extraction fans out across the worker pool.
pub trait FeatureExtractor: Send + Sync {
    /// Extract the feature bag of a whole file.
    fn extract_file(&self, bytes: &[u8]) -> Result<Vec<Feature>, ExtractError>;

    /// Extract one feature bag per function found in the file.
    fn extract_functions(&self, bytes: &[u8]) -> Result<Vec<FunctionFeatures>, ExtractError>;
}
