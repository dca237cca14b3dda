//! TF-IDF bags and the Ioffe Weighted MinHash sketcher.
//!
//! A document reaches this module as a sparse nonnegative vector over the
//! corpus vocabulary (the *bag*). The sketcher maps a bag to K integer rows
//! `(token_index, t)` such that two sketches agree at any one row with
//! probability equal to the generalized Jaccard similarity of the bags,
//! `Σ min(u_i, v_i) / Σ max(u_i, v_i)`.

use std::collections::BTreeMap;

use docfreq::OrderedDocFreq;
use extract::Feature;
use serde::{Deserialize, Serialize};

use crate::config::SketchError;
use crate::params::SketchParams;

/// A document's sparse TF-IDF vector, keyed by token position in the
/// ordered vocabulary. Entries are sorted by position and strictly positive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bag {
    entries: Vec<(u64, f64)>,
}

impl Bag {
    /// Build a bag directly from (token position, weight) entries.
    /// Non-positive weights are dropped; entries are sorted by position.
    pub fn from_entries(mut entries: Vec<(u64, f64)>) -> Self {
        entries.retain(|&(_, w)| w > 0.0);
        entries.sort_by_key(|&(idx, _)| idx);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn support(&self) -> &[(u64, f64)] {
        &self.entries
    }

    /// Generalized Jaccard similarity between two bags,
    /// `Σ min / Σ max` over the union of their supports.
    pub fn generalized_jaccard(&self, other: &Bag) -> f64 {
        let (lhs, rhs) = (&self.entries, &other.entries);
        let mut min_sum = 0.0;
        let mut max_sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < lhs.len() && j < rhs.len() {
            let (ia, wa) = lhs[i];
            let (ib, wb) = rhs[j];
            if ia == ib {
                min_sum += wa.min(wb);
                max_sum += wa.max(wb);
                i += 1;
                j += 1;
            } else if ia < ib {
                max_sum += wa;
                i += 1;
            } else {
                max_sum += wb;
                j += 1;
            }
        }
        max_sum += lhs[i..].iter().map(|&(_, w)| w).sum::<f64>();
        max_sum += rhs[j..].iter().map(|&(_, w)| w).sum::<f64>();
        if max_sum == 0.0 {
            0.0
        } else {
            min_sum / max_sum
        }
    }
}

/// Compute a document's TF-IDF bag against the corpus vocabulary.
///
/// The weight of the token at position `i` is
/// `ln(1 + tf) × ln(N / df)`, the log-TF variant, which is the
/// authoritative formula for this engine. Tokens
/// absent from the vocabulary are silently dropped (query-time unknown
/// tokens contribute nothing), as are tokens whose weight comes out
/// non-positive (a token present in every document has `ln(N/df) = 0`).
pub fn tfidf_bag(features: &[Feature], df: &OrderedDocFreq) -> Bag {
    let mut tf: BTreeMap<u64, u64> = BTreeMap::new();
    for feature in features {
        if let Some(idx) = df.token_index(&feature.token) {
            *tf.entry(idx as u64).or_insert(0) += u64::from(feature.weight);
        }
    }

    let n = df.docs as f64;
    let mut entries = Vec::with_capacity(tf.len());
    for (idx, count) in tf {
        let token = &df.tokens[idx as usize];
        let freq = df.df[token] as f64;
        let weight = (1.0 + count as f64).ln() * (n / freq).ln();
        if weight > 0.0 {
            entries.push((idx, weight));
        }
    }
    Bag { entries }
}

/// A fixed-length Weighted MinHash sketch: K rows of `(token_index, t)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sketch {
    pub rows: Vec<(u64, i64)>,
}

impl Sketch {
    /// The sentinel sketch an empty bag maps to. The index stores no sketch
    /// or band rows for such documents.
    pub fn sentinel(hash_rows: usize) -> Self {
        Self {
            rows: vec![(0, 0); hash_rows],
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.rows.iter().all(|&row| row == (0, 0))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-wise agreement rate with another sketch of the same length: the
    /// unbiased estimator of generalized Jaccard similarity.
    pub fn agreement(&self, other: &Sketch) -> Result<f64, SketchError> {
        if self.rows.len() != other.rows.len() {
            return Err(SketchError::RowCountMismatch {
                expected: self.rows.len(),
                got: other.rows.len(),
            });
        }
        if self.rows.is_empty() {
            return Ok(0.0);
        }
        let matching = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .filter(|(a, b)| a == b)
            .count();
        Ok(matching as f64 / self.rows.len() as f64)
    }
}

/// Sketch a bag with the Ioffe construction.
///
/// For each hash row `k` and each token `i` in the bag's support:
///
/// ```text
/// t_i  = floor(ln(w_i) / r_ik + β_ik)
/// a_i  = c_ik / (exp(r_ik · (t_i − β_ik)) · exp(r_ik))
/// ```
///
/// The row emits `(i*, t_{i*})` for the `i*` minimizing `a_i`, ties to the
/// lower token position. The comparison runs in log space, which is
/// monotonic in `a_i` and immune to `exp` overflow. One pass per token
/// updates all K running minima, so the cost is O(|support| × K).
pub fn sketch_bag(bag: &Bag, params: &SketchParams) -> Sketch {
    let k = params.hash_rows();
    if bag.is_empty() {
        return Sketch::sentinel(k);
    }

    let mut best_ln_a = vec![f64::INFINITY; k];
    let mut best = vec![(0u64, 0i64); k];

    for &(idx, weight) in bag.support() {
        let row = params.row(idx);
        let ln_w = weight.ln();
        for slot in 0..k {
            let r = row.r[slot];
            let beta = row.beta[slot];
            let t = (ln_w / r + beta).floor();
            let ln_a = row.ln_c[slot] - r * (t - beta + 1.0);
            if ln_a < best_ln_a[slot] {
                best_ln_a[slot] = ln_a;
                best[slot] = (idx, t as i64);
            }
        }
    }

    Sketch { rows: best }
}
