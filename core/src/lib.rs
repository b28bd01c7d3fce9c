//! Generic particle filter (sequential Monte Carlo) toolbox for visual tracking
//!
//! This crate provides a generic particle filter for tracking an evolving hidden state
//! (for example a rotated rectangle describing an object's position, size, and orientation
//! in a video) from noisy observation likelihoods. The filter itself is model agnostic:
//! it knows nothing about images, colors, or shapes. It owns an ensemble of candidate
//! state vectors ("particles"), advances them through a linear dynamics model with
//! additive Gaussian noise, and turns externally supplied likelihood scores into
//! normalized posterior weights which drive resampling.
//!
//! This crate is primarily built off of two dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for the filter.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for process noise and ensemble initialization.
//!
//! All other functionality is built on top of these crates or is auxiliary
//! (configuration serialization, the demo driver). Observation likelihoods are computed by
//! external collaborators implementing [`observation::ObservationModel`]; the filter only
//! defines the storage slot for each (observation model, particle) pair.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [error]: Error taxonomy for configuration-time validation and numeric degeneracy.
//! - [prob]: The probability-domain strategy (plain probabilities vs. natural-log
//!   probabilities) shared by all weight arithmetic.
//! - [filter]: The [`filter::ParticleFilter`] aggregate: ensemble storage, configuration,
//!   initialization, transition, bounding, marginalization, and resampling.
//! - [observation]: The observation-model collaborator contract and Gaussian likelihood
//!   helpers for building concrete models.
//! - [schema]: A rotated-rectangle state schema with second-order autoregressive dynamics,
//!   usable as a template for defining application state layouts.
//!
//! ## Filtering cycle
//!
//! The caller drives one cycle per video frame (or time step):
//!
//! ```text
//! create -> set_dynamics / set_noise / set_bounds -> initialize
//!   -> loop { transition -> observe -> marginalize -> resample }
//! ```
//!
//! Each stage runs to completion before returning and performs no I/O. The filter is a
//! single-owner value type: `&mut self` on every mutating stage rules out concurrent
//! cycles on one instance, and the random generator is owned by the filter so that
//! independent filters produce independent, reproducible streams.
//!
//! ## Probability domains
//!
//! Likelihoods routinely underflow `f64` when many scores are multiplied, so the filter
//! can run entirely in the log domain: sums of probabilities become numerically stable
//! log-sum-exp reductions and products become sums. The domain is fixed at construction
//! via [`prob::ProbabilityDomain`] and every probability-bearing field is interpreted
//! consistently with it.

pub mod error;
pub mod filter;
pub mod observation;
pub mod prob;
pub mod schema;

pub use error::ParticleError;
pub use filter::{Bound, ParticleFilter};
pub use observation::ObservationModel;
pub use prob::ProbabilityDomain;

/// Compute the weighted circular mean of a set of angle-like values.
///
/// `0` and `period` are identical angles, so 180 is not a sensible mean of 2 and
/// 358 degrees. This function averages the cosine and sine of each value (scaled
/// onto the unit circle by `period`) and takes the arc tangent of the result,
/// wrapping the answer back into `[0, period)`.
///
/// `values` and `weights` must have equal length; weights are assumed to sum to 1
/// in the plain probability domain. A `period` of `360.0` treats values as degrees,
/// `2.0 * std::f64::consts::PI` as radians.
pub fn angle_mean(values: &[f64], weights: &[f64], period: f64) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let scale = 2.0 * std::f64::consts::PI / period;
    let mut mean_cos = 0.0;
    let mut mean_sin = 0.0;
    for (&v, &w) in values.iter().zip(weights.iter()) {
        mean_cos += (v * scale).cos() * w;
        mean_sin += (v * scale).sin() * w;
    }
    let mut mean = mean_sin.atan2(mean_cos) / scale;
    if mean < 0.0 {
        mean += period;
    }
    mean
}

/// Unweighted circular mean; see [`angle_mean`].
pub fn angle_mean_uniform(values: &[f64], period: f64) -> f64 {
    let w = 1.0 / values.len() as f64;
    let weights = vec![w; values.len()];
    angle_mean(values, &weights, period)
}
