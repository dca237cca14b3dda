//! Single-document queries against the srcdup index.
//!
//! Given one input artifact (a whole file or a function inside it), the
//! [`QueryEngine`] answers with two sets:
//!
//! - **duplicates**: every indexed site whose content is byte-identical to
//!   the input (equal blob id);
//! - **similar**: indexed documents that share at least one LSH band with
//!   the input and whose estimated generalized Jaccard similarity meets the
//!   configured floor.
//!
//! The engine reuses the index's stored DocFreq and sketch parameters, so a
//! query sees exactly the sketch space the corpus was indexed under. A store
//! without those artifacts has never been indexed, and queries against it
//! fail with [`MatchError::IndexNotBuilt`].

mod engine;
mod types;

pub use crate::engine::QueryEngine;
pub use crate::types::{
    DuplicateHit, MatchError, QueryConfig, QueryOutcome, SimilarHit,
};
