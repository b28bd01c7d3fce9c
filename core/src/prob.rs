//! Probability-domain strategy shared by all weight arithmetic.
//!
//! The filter can store likelihoods and weights either as plain probabilities or as
//! natural logarithms. Long likelihood vectors routinely underflow `f64` in the plain
//! domain, so the log domain is the robust choice for image likelihoods; the plain
//! domain remains available for cheap models and for matching reference outputs.
//!
//! Rather than branching on a boolean inside every numeric stage, the domain is a
//! small strategy selected once at filter construction: [`ProbabilityDomain::combine`]
//! reduces a set of probability terms (sum vs. log-sum-exp),
//! [`ProbabilityDomain::normalize`] rescales a weight vector to total probability one,
//! and [`ProbabilityDomain::to_probability`] maps a stored weight back to a plain
//! probability for consumers that need one (resampling, weighted means).

use serde::{Deserialize, Serialize};

/// How probability-bearing quantities are represented in a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbabilityDomain {
    /// Plain probabilities in `[0, 1]`. Sums are sums, products are products.
    Linear,
    /// Natural-log probabilities in `[-inf, 0]`. Sums become log-sum-exp,
    /// products become sums.
    Log,
}

impl Default for ProbabilityDomain {
    fn default() -> Self {
        ProbabilityDomain::Linear
    }
}

/// Numerically stable log-sum-exp reduction: `ln(sum_i exp(values[i]))`.
///
/// The running maximum is subtracted before exponentiating so that large-magnitude
/// log probabilities neither overflow nor collapse to zero. An empty slice and an
/// all-`-inf` slice both reduce to `-inf` (the log of zero probability mass).
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max.is_infinite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

impl ProbabilityDomain {
    /// The uniform weight for an `n`-element distribution in this domain.
    pub fn uniform(&self, n: usize) -> f64 {
        match self {
            ProbabilityDomain::Linear => 1.0 / n as f64,
            ProbabilityDomain::Log => -(n as f64).ln(),
        }
    }

    /// Marginalize a set of terms into a single weight: plain sum in the linear
    /// domain, stable log-sum-exp in the log domain.
    pub fn combine(&self, terms: &[f64]) -> f64 {
        match self {
            ProbabilityDomain::Linear => terms.iter().sum(),
            ProbabilityDomain::Log => logsumexp(terms),
        }
    }

    /// Apply a prior to a likelihood: multiply in the linear domain, add in the log domain.
    pub fn apply_prior(&self, likelihood: f64, prior: f64) -> f64 {
        match self {
            ProbabilityDomain::Linear => likelihood * prior,
            ProbabilityDomain::Log => likelihood + prior,
        }
    }

    /// Total probability mass of a weight vector: sum or log-sum-exp.
    pub fn total(&self, weights: &[f64]) -> f64 {
        self.combine(weights)
    }

    /// Map a stored weight back to a plain probability.
    pub fn to_probability(&self, weight: f64) -> f64 {
        match self {
            ProbabilityDomain::Linear => weight,
            ProbabilityDomain::Log => weight.exp(),
        }
    }

    /// Normalize a weight vector in place so its total probability is one
    /// (`sum == 1` linear, `logsumexp == 0` log).
    ///
    /// A degenerate total (zero, negative, or non-finite mass, e.g. every
    /// likelihood underflowed to zero or every log weight is `-inf`) falls back
    /// to the uniform distribution instead of propagating NaN into the ensemble.
    pub fn normalize(&self, weights: &mut [f64]) {
        if weights.is_empty() {
            return;
        }
        match self {
            ProbabilityDomain::Linear => {
                let sum: f64 = weights.iter().sum();
                if sum > 0.0 && sum.is_finite() {
                    for w in weights.iter_mut() {
                        *w /= sum;
                    }
                } else {
                    let uniform = self.uniform(weights.len());
                    weights.fill(uniform);
                }
            }
            ProbabilityDomain::Log => {
                let total = logsumexp(weights);
                if total.is_finite() {
                    for w in weights.iter_mut() {
                        *w -= total;
                    }
                } else {
                    let uniform = self.uniform(weights.len());
                    weights.fill(uniform);
                }
            }
        }
    }
}
