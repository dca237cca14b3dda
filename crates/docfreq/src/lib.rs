//! Corpus-wide document frequencies for srcdup.
//!
//! [`OrderedDocFreq`] is the single authoritative vocabulary artifact of an
//! index: the count of distinct documents, the lexicographically ordered
//! token list, and each token's document frequency. The position of a token
//! in the ordered list is its stable integer index, used by the sketcher to
//! address parameter rows; index and query must therefore agree on one
//! DocFreq, bit for bit.
//!
//! The interchange format is a JSON object `{docs, tokens, df}`. The token
//! array is redundant with the keys of `df` but is serialized explicitly so
//! readers never depend on map ordering.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building or loading a DocFreq artifact.
#[derive(Debug, Error)]
pub enum DocFreqError {
    #[error("docfreq json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token list and frequency map disagree at {token:?}")]
    TokenMismatch { token: String },
    #[error("docfreq has zero documents")]
    EmptyCorpus,
}

/// The ordered vocabulary and per-token document frequencies of a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedDocFreq {
    /// Number of distinct documents that contributed features.
    pub docs: usize,
    /// All observed tokens in lexicographic order. Position in this list is
    /// the token's stable index.
    pub tokens: Vec<String>,
    /// Token → number of distinct documents containing it.
    pub df: BTreeMap<String, usize>,
}

impl OrderedDocFreq {
    /// Stable index of a token, if it is in the vocabulary.
    pub fn token_index(&self, token: &str) -> Option<usize> {
        self.tokens
            .binary_search_by(|probe| probe.as_str().cmp(token))
            .ok()
    }

    /// Document frequency of a token, if it is in the vocabulary.
    pub fn frequency(&self, token: &str) -> Option<usize> {
        self.df.get(token).copied()
    }

    /// Check the artifact's internal invariants: every token in the ordered
    /// list appears in the frequency map and vice versa, and the corpus is
    /// non-empty.
    pub fn validate(&self) -> Result<(), DocFreqError> {
        if self.docs == 0 {
            return Err(DocFreqError::EmptyCorpus);
        }
        if self.tokens.len() != self.df.len() {
            let token = self
                .tokens
                .iter()
                .find(|t| !self.df.contains_key(*t))
                .cloned()
                .unwrap_or_else(|| self.df.keys().next().cloned().unwrap_or_default());
            return Err(DocFreqError::TokenMismatch { token });
        }
        for (listed, mapped) in self.tokens.iter().zip(self.df.keys()) {
            if listed != mapped {
                return Err(DocFreqError::TokenMismatch {
                    token: listed.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serialize to the `{docs, tokens, df}` JSON document.
    pub fn to_json(&self) -> Result<String, DocFreqError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load from the `{docs, tokens, df}` JSON document and validate.
    pub fn from_json(json: &str) -> Result<Self, DocFreqError> {
        let df: Self = serde_json::from_str(json)?;
        df.validate()?;
        Ok(df)
    }
}

/// Streaming builder: feed each document's tokens once, then build.
#[derive(Default)]
pub struct DocFreqBuilder {
    seen_docs: HashSet<String>,
    df: BTreeMap<String, usize>,
}

impl DocFreqBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one document's tokens.
    ///
    /// Tokens repeated within the document count once; a document key seen
    /// before is ignored entirely, so replays cannot inflate frequencies.
    pub fn add_document<'a>(
        &mut self,
        document_key: &str,
        tokens: impl IntoIterator<Item = &'a str>,
    ) {
        if !self.seen_docs.insert(document_key.to_string()) {
            return;
        }
        let unique: HashSet<&str> = tokens.into_iter().collect();
        for token in unique {
            *self.df.entry(token.to_string()).or_insert(0) += 1;
        }
    }

    /// Number of distinct documents recorded so far.
    pub fn documents(&self) -> usize {
        self.seen_docs.len()
    }

    pub fn build(self) -> OrderedDocFreq {
        // BTreeMap iteration is already lexicographic, which fixes T's order.
        let tokens = self.df.keys().cloned().collect();
        OrderedDocFreq {
            docs: self.seen_docs.len(),
            tokens,
            df: self.df,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OrderedDocFreq {
        let mut builder = DocFreqBuilder::new();
        builder.add_document("r//a@1", ["alpha", "beta", "alpha"]);
        builder.add_document("r//b@2", ["beta", "gamma"]);
        builder.build()
    }

    #[test]
    fn builder_counts_distinct_documents_per_token() {
        let df = sample();
        assert_eq!(df.docs, 2);
        assert_eq!(df.frequency("alpha"), Some(1));
        assert_eq!(df.frequency("beta"), Some(2));
        assert_eq!(df.frequency("gamma"), Some(1));
        assert_eq!(df.frequency("delta"), None);
    }

    #[test]
    fn builder_ignores_replayed_document_keys() {
        let mut builder = DocFreqBuilder::new();
        builder.add_document("r//a@1", ["alpha"]);
        builder.add_document("r//a@1", ["alpha", "beta"]);
        let df = builder.build();
        assert_eq!(df.docs, 1);
        assert_eq!(df.frequency("alpha"), Some(1));
        assert_eq!(df.frequency("beta"), None);
    }

    #[test]
    fn tokens_are_sorted_and_indexed() {
        let df = sample();
        assert_eq!(df.tokens, vec!["alpha", "beta", "gamma"]);
        assert_eq!(df.token_index("alpha"), Some(0));
        assert_eq!(df.token_index("beta"), Some(1));
        assert_eq!(df.token_index("gamma"), Some(2));
        assert_eq!(df.token_index("zeta"), None);
    }

    #[test]
    fn build_is_deterministic_regardless_of_insertion_order() {
        let mut first = DocFreqBuilder::new();
        first.add_document("d1", ["b", "a"]);
        first.add_document("d2", ["c", "a"]);

        let mut second = DocFreqBuilder::new();
        second.add_document("d2", ["a", "c"]);
        second.add_document("d1", ["a", "b"]);

        assert_eq!(first.build(), second.build());
    }

    #[test]
    fn json_round_trip_preserves_artifact() {
        let df = sample();
        let json = df.to_json().unwrap();
        let back = OrderedDocFreq::from_json(&json).unwrap();
        assert_eq!(df, back);
    }

    #[test]
    fn json_exposes_all_three_fields() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["docs"], 2);
        assert_eq!(value["tokens"][0], "alpha");
        assert_eq!(value["df"]["beta"], 2);
    }

    #[test]
    fn validate_rejects_mismatched_tokens() {
        let mut df = sample();
        df.tokens.push("orphan".to_string());
        assert!(matches!(
            df.validate(),
            Err(DocFreqError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_corpus() {
        let df = DocFreqBuilder::new().build();
        assert!(matches!(df.validate(), Err(DocFreqError::EmptyCorpus)));
    }
}
