//! Deterministic parameter rows for the Weighted MinHash family.
//!
//! Conceptually the sketcher is driven by three `|T| × K` matrices: `r` and
//! `c` drawn from Gamma(2, 1), `β` from Uniform(0, 1). Materializing them is
//! prohibitive for large vocabularies (`|T| × K × 3 × 8` bytes), so rows are
//! derived on demand: row `i` comes from an RNG seeded by mixing the index
//! into the master seed, drawing `r`, then `c`, then `β` in a fixed order.
//! The same `(seed, token index, K)` always yields the same row, on every
//! worker, in every run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SketchConfig;

/// Parameter generator for one sketch space.
#[derive(Debug, Clone)]
pub struct SketchParams {
    seed: u64,
    hash_rows: usize,
}

/// The K parameter values for one token position, contiguous per component
/// so the sketcher streams through them once per token.
///
/// `ln_c` stores `ln(c)` rather than `c`: the row selection compares
/// `ln(a_i) = ln(c) − r·(t − β + 1)`, which is monotonic in `a_i` and never
/// overflows where `exp` terms would.
pub(crate) struct ParamRow {
    pub r: Vec<f64>,
    pub ln_c: Vec<f64>,
    pub beta: Vec<f64>,
}

impl SketchParams {
    pub fn new(cfg: &SketchConfig) -> Self {
        Self {
            seed: cfg.seed,
            hash_rows: cfg.hash_rows(),
        }
    }

    /// Total hash rows (K) this generator produces per token.
    pub fn hash_rows(&self) -> usize {
        self.hash_rows
    }

    /// Derive the parameter row for one token position.
    pub(crate) fn row(&self, token_index: u64) -> ParamRow {
        let step = token_index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(splitmix64(self.seed.wrapping_add(step)));

        let k = self.hash_rows;
        let mut r = Vec::with_capacity(k);
        let mut ln_c = Vec::with_capacity(k);
        let mut beta = Vec::with_capacity(k);
        for _ in 0..k {
            r.push(gamma_2_1(&mut rng));
        }
        for _ in 0..k {
            ln_c.push(gamma_2_1(&mut rng).ln());
        }
        for _ in 0..k {
            beta.push(rng.gen::<f64>());
        }
        ParamRow { r, ln_c, beta }
    }
}

/// Sample Gamma(2, 1) as the sum of two unit exponentials.
fn gamma_2_1(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-u1.ln() - u2.ln()).max(1e-12)
}

/// A 64-bit mixing function with good avalanche behavior.
#[inline]
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
