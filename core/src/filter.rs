//! The particle filter aggregate: ensemble storage, configuration, initialization,
//! transition, bounding, marginalization, and resampling.
//!
//! A [`ParticleFilter`] owns one ensemble of candidate state vectors (the columns of a
//! `num_states x num_particles` matrix) together with the per-particle, per-observation
//! likelihood table filled in by external observation models. One filtering cycle is:
//!
//! ```text
//! transition() -> observe()/set_likelihood() -> marginalize() -> resample()
//! ```
//!
//! Only a linear state transition model is supported: `next = A * current + c .* noise`
//! where `A` is the state part of the dynamics matrix and `c` its trailing
//! noise-coefficient column. Nonlinear dynamics can be layered on top by mutating the
//! ensemble directly between cycles; the other stages do not need to change.

use crate::error::ParticleError;
use crate::prob::ProbabilityDomain;
use crate::angle_mean;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Admissible interval for one state dimension.
///
/// `lower == upper` disables bounding for the dimension. With `wrap` set the
/// interval is circular (useful for angles): a value leaving one end re-enters
/// from the other. Without it, out-of-range values clamp to the interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
    pub wrap: bool,
}

impl Bound {
    /// No bounding for this dimension.
    pub fn none() -> Self {
        Bound {
            lower: 0.0,
            upper: 0.0,
            wrap: false,
        }
    }

    /// Clamp values into `[lower, upper]`.
    pub fn clamped(lower: f64, upper: f64) -> Self {
        Bound {
            lower,
            upper,
            wrap: false,
        }
    }

    /// Wrap values circularly with period `upper - lower`.
    pub fn wrapped(lower: f64, upper: f64) -> Self {
        Bound {
            lower,
            upper,
            wrap: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lower != self.upper
    }

    /// Apply the bound to a single value.
    ///
    /// Wrapping is single-step: one period is added or subtracted at most once,
    /// which is adequate as long as one transition step cannot move a value by
    /// more than a full period. Idempotent for values already in range.
    pub fn apply(&self, v: f64) -> f64 {
        if !self.is_active() {
            return v;
        }
        if self.wrap {
            let period = self.upper - self.lower;
            if v < self.lower {
                v + period
            } else if v >= self.upper {
                v - period
            } else {
                v
            }
        } else {
            v.clamp(self.lower, self.upper)
        }
    }
}

/// Generic sequential Monte Carlo state estimator.
///
/// Dimensions (`num_states`, `num_observation_models`, `num_particles`) and the
/// probability domain are fixed at creation. Configure dynamics, noise, and bounds,
/// seed the ensemble with [`ParticleFilter::initialize`] or
/// [`ParticleFilter::initialize_from`], then cycle through
/// transition / observe / marginalize / resample.
#[derive(Clone)]
pub struct ParticleFilter {
    num_states: usize,
    num_observation_models: usize,
    num_particles: usize,
    domain: ProbabilityDomain,
    /// `num_states x (num_states + 1)`; the last column is the per-state noise
    /// coefficient applied to the Gaussian noise sample.
    dynamics: DMatrix<f64>,
    /// Per-state Gaussian standard deviation; 0 disables noise for that state.
    noise_std: DVector<f64>,
    bounds: Vec<Bound>,
    rng: StdRng,
    /// `num_states x num_particles`, one particle per column.
    particles: DMatrix<f64>,
    /// `num_observation_models x num_particles`, written by observation models
    /// between transition and marginalization.
    likelihoods: DMatrix<f64>,
    particle_weights: DVector<f64>,
    observation_weights: DVector<f64>,
    observation_priors: DVector<f64>,
    /// Whether the weight vectors are current for this cycle's likelihood table.
    marginalized: bool,
}

impl ParticleFilter {
    /// Create a filter with default configuration: identity transition with unit
    /// noise coefficient ("next = current + noise"), unit noise standard deviation,
    /// no bounds, uniform observation priors, and a fixed default random seed.
    pub fn new(
        num_states: usize,
        num_observation_models: usize,
        num_particles: usize,
        domain: ProbabilityDomain,
    ) -> Result<Self, ParticleError> {
        if num_states == 0 {
            return Err(ParticleError::InvalidArgument(
                "num_states must be positive".into(),
            ));
        }
        if num_observation_models == 0 {
            return Err(ParticleError::InvalidArgument(
                "num_observation_models must be positive".into(),
            ));
        }
        if num_particles == 0 {
            return Err(ParticleError::InvalidArgument(
                "num_particles must be positive".into(),
            ));
        }
        let mut dynamics = DMatrix::<f64>::zeros(num_states, num_states + 1);
        for i in 0..num_states {
            dynamics[(i, i)] = 1.0;
            dynamics[(i, num_states)] = 1.0;
        }
        let uniform_prior = domain.uniform(num_observation_models);
        Ok(ParticleFilter {
            num_states,
            num_observation_models,
            num_particles,
            domain,
            dynamics,
            noise_std: DVector::from_element(num_states, 1.0),
            bounds: vec![Bound::none(); num_states],
            rng: StdRng::seed_from_u64(1),
            particles: DMatrix::zeros(num_states, num_particles),
            likelihoods: DMatrix::zeros(num_observation_models, num_particles),
            particle_weights: DVector::from_element(
                num_particles,
                domain.uniform(num_particles),
            ),
            observation_weights: DVector::from_element(num_observation_models, uniform_prior),
            observation_priors: DVector::from_element(num_observation_models, uniform_prior),
            marginalized: false,
        })
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_observation_models(&self) -> usize {
        self.num_observation_models
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn domain(&self) -> ProbabilityDomain {
        self.domain
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    /// The live ensemble, one particle per column.
    pub fn particles(&self) -> &DMatrix<f64> {
        &self.particles
    }

    /// One particle's state vector, copied out of the ensemble.
    pub fn particle(&self, index: usize) -> DVector<f64> {
        self.particles.column(index).clone_owned()
    }

    /// Overwrite one particle's state vector.
    pub fn set_particle(&mut self, index: usize, state: &DVector<f64>) -> Result<(), ParticleError> {
        if state.len() != self.num_states {
            return Err(ParticleError::dimension(
                "particle state length",
                self.num_states,
                state.len(),
            ));
        }
        self.particles.set_column(index, state);
        Ok(())
    }

    /// The raw likelihood table, `num_observation_models x num_particles`.
    pub fn likelihoods(&self) -> &DMatrix<f64> {
        &self.likelihoods
    }

    /// Write one likelihood slot. The value must match the filter's probability
    /// domain (plain or natural log). Invalidates the current weight vectors.
    pub fn set_likelihood(&mut self, observation: usize, particle: usize, value: f64) {
        self.likelihoods[(observation, particle)] = value;
        self.marginalized = false;
    }

    /// Mutable access to the full likelihood table for bulk writers.
    /// Invalidates the current weight vectors.
    pub fn likelihoods_mut(&mut self) -> &mut DMatrix<f64> {
        self.marginalized = false;
        &mut self.likelihoods
    }

    /// Per-particle marginal posterior weights, valid after [`ParticleFilter::marginalize`].
    pub fn particle_weights(&self) -> &DVector<f64> {
        &self.particle_weights
    }

    /// Per-observation-model marginal posterior weights, valid after
    /// [`ParticleFilter::marginalize`]. The largest entry names the observation
    /// channel currently explaining the data best.
    pub fn observation_weights(&self) -> &DVector<f64> {
        &self.observation_weights
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Set the dynamics model, `num_states x (num_states + 1)`.
    ///
    /// The leading square block is the linear transition operator; the last column
    /// is the per-state noise coefficient:
    /// `next = dynamics[:, 0..S] * current + dynamics[:, S] .* noise`.
    pub fn set_dynamics(&mut self, dynamics: &DMatrix<f64>) -> Result<(), ParticleError> {
        if dynamics.nrows() != self.num_states {
            return Err(ParticleError::dimension(
                "dynamics rows",
                self.num_states,
                dynamics.nrows(),
            ));
        }
        if dynamics.ncols() != self.num_states + 1 {
            return Err(ParticleError::dimension(
                "dynamics columns",
                self.num_states + 1,
                dynamics.ncols(),
            ));
        }
        self.dynamics = dynamics.clone();
        Ok(())
    }

    /// Set the noise model: reseed the filter's random generator and set the
    /// per-state Gaussian standard deviation (0 disables noise for that state).
    pub fn set_noise(&mut self, seed: u64, std: &DVector<f64>) -> Result<(), ParticleError> {
        if std.len() != self.num_states {
            return Err(ParticleError::dimension(
                "noise std length",
                self.num_states,
                std.len(),
            ));
        }
        if std.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ParticleError::InvalidArgument(
                "noise std must be finite and non-negative".into(),
            ));
        }
        self.rng = StdRng::seed_from_u64(seed);
        self.noise_std = std.clone();
        Ok(())
    }

    /// Set per-state bounds, one [`Bound`] per state dimension.
    /// Wrap bounds require `upper > lower` (the wrap period).
    pub fn set_bounds(&mut self, bounds: &[Bound]) -> Result<(), ParticleError> {
        if bounds.len() != self.num_states {
            return Err(ParticleError::dimension(
                "bounds length",
                self.num_states,
                bounds.len(),
            ));
        }
        for (i, b) in bounds.iter().enumerate() {
            if b.is_active() && b.upper < b.lower {
                return Err(ParticleError::InvalidArgument(format!(
                    "bound for state {i} has upper < lower ([{}, {}])",
                    b.lower, b.upper
                )));
            }
            if b.wrap && b.upper <= b.lower {
                return Err(ParticleError::InvalidArgument(format!(
                    "wrap bound for state {i} requires upper > lower (got [{}, {}])",
                    b.lower, b.upper
                )));
            }
        }
        self.bounds = bounds.to_vec();
        Ok(())
    }

    /// Set per-observation-model priors, expressed in the filter's probability
    /// domain. The default is uniform.
    pub fn set_observation_priors(&mut self, priors: &DVector<f64>) -> Result<(), ParticleError> {
        if priors.len() != self.num_observation_models {
            return Err(ParticleError::dimension(
                "observation priors length",
                self.num_observation_models,
                priors.len(),
            ));
        }
        self.observation_priors = priors.clone();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Seed the ensemble by sampling each state dimension uniformly from its bound
    /// interval. Dimensions with inactive bounds (`lower == upper`) are filled with
    /// that constant value.
    pub fn initialize(&mut self) {
        for i in 0..self.num_states {
            let b = self.bounds[i];
            for j in 0..self.num_particles {
                self.particles[(i, j)] = if b.is_active() {
                    self.rng.random_range(b.lower..b.upper)
                } else {
                    b.lower
                };
            }
        }
    }

    /// Seed the ensemble by replicating the columns of a smaller seed ensemble.
    ///
    /// Seed column `i` receives `floor(N/M) + 1` copies if `i < N mod M`, else
    /// `floor(N/M)` copies, preserving seed order, so the copies cover all `N`
    /// output slots exactly with near-uniform multiplicity.
    pub fn initialize_from(&mut self, seed: &DMatrix<f64>) -> Result<(), ParticleError> {
        if seed.nrows() != self.num_states {
            return Err(ParticleError::dimension(
                "seed ensemble rows",
                self.num_states,
                seed.nrows(),
            ));
        }
        if seed.ncols() == 0 {
            return Err(ParticleError::InvalidArgument(
                "seed ensemble must contain at least one particle".into(),
            ));
        }
        let m = seed.ncols();
        let divide = self.num_particles / m;
        let remain = self.num_particles % m;
        let mut k = 0;
        for i in 0..m {
            let copies = divide + if i < remain { 1 } else { 0 };
            for _ in 0..copies {
                self.particles.set_column(k, &seed.column(i));
                k += 1;
            }
        }
        debug_assert_eq!(k, self.num_particles);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transition
    // ------------------------------------------------------------------

    /// Advance every particle one step through the linear dynamics plus Gaussian
    /// noise, then apply bounds in place. Invalidates the current weight vectors.
    pub fn transition(&mut self) {
        let state_part = self.dynamics.columns(0, self.num_states);
        let mut transits = &state_part * &self.particles;
        for i in 0..self.num_states {
            let coeff = self.dynamics[(i, self.num_states)];
            let std = self.noise_std[i];
            if coeff == 0.0 || std == 0.0 {
                continue;
            }
            // std was validated finite and positive at set_noise
            let normal = Normal::new(0.0, std).unwrap();
            for j in 0..self.num_particles {
                transits[(i, j)] += coeff * normal.sample(&mut self.rng);
            }
        }
        self.particles = transits;
        self.apply_bounds();
        self.marginalized = false;
    }

    /// Clamp or wrap every particle's state into the configured bounds.
    /// Called by [`ParticleFilter::transition`]; exposed for callers that mutate
    /// the ensemble directly (e.g. a nonlinear transition layered on top).
    pub fn apply_bounds(&mut self) {
        for i in 0..self.num_states {
            let b = self.bounds[i];
            if !b.is_active() {
                continue;
            }
            for j in 0..self.num_particles {
                self.particles[(i, j)] = b.apply(self.particles[(i, j)]);
            }
        }
    }

    // ------------------------------------------------------------------
    // Marginalization
    // ------------------------------------------------------------------

    /// Reduce the likelihood table to per-particle and per-observation-model
    /// posterior weights, folding in the observation priors, and normalize each
    /// weight vector (sum 1 in the linear domain, log-sum-exp 0 in the log domain).
    ///
    /// Degenerate inputs (all-zero or all-`-inf` likelihoods) yield uniform
    /// weights rather than NaN.
    pub fn marginalize(&mut self) {
        let o = self.num_observation_models;
        let n = self.num_particles;

        // p(data | particle), marginalized over which observation model is correct
        let mut weighted = vec![0.0; o];
        for j in 0..n {
            for i in 0..o {
                weighted[i] = self
                    .domain
                    .apply_prior(self.likelihoods[(i, j)], self.observation_priors[i]);
            }
            self.particle_weights[j] = self.domain.combine(&weighted);
        }
        self.domain.normalize(self.particle_weights.as_mut_slice());

        // evidence for each observation model, marginalized over particle state
        let mut row = vec![0.0; n];
        for i in 0..o {
            for j in 0..n {
                row[j] = self.likelihoods[(i, j)];
            }
            self.observation_weights[i] = self
                .domain
                .apply_prior(self.domain.combine(&row), self.observation_priors[i]);
        }
        self.domain.normalize(self.observation_weights.as_mut_slice());

        self.marginalized = true;
    }

    // ------------------------------------------------------------------
    // Resampling
    // ------------------------------------------------------------------

    /// Draw a new, unweighted ensemble proportional to particle weight, replacing
    /// the old ensemble wholesale. Marginalizes first if the weight vectors are
    /// stale for this cycle.
    ///
    /// This is deterministic stratified duplication: particle `n` contributes
    /// `round(prob[n] * N)` copies in particle order, truncated once `N` columns
    /// are emitted; any shortfall from rounding is padded with copies of the
    /// highest-weight particle. It is not an unbiased multinomial or systematic
    /// resampler; the rounding scheme is part of the filter's defined behavior.
    pub fn resample(&mut self) {
        if !self.marginalized {
            self.marginalize();
        }
        let n = self.num_particles;
        let mut new_particles = DMatrix::<f64>::zeros(self.num_states, n);
        let mut k = 0;
        'fill: for j in 0..n {
            let prob = self.domain.to_probability(self.particle_weights[j]);
            let copies = (prob * n as f64).round() as usize;
            for _ in 0..copies {
                new_particles.set_column(k, &self.particles.column(j));
                k += 1;
                if k == n {
                    break 'fill;
                }
            }
        }
        if k < n {
            let best = self.most_probable();
            let column = self.particles.column(best).clone_owned();
            while k < n {
                new_particles.set_column(k, &column);
                k += 1;
            }
        }
        self.particles = new_particles;
    }

    // ------------------------------------------------------------------
    // Estimates
    // ------------------------------------------------------------------

    /// Index of the highest-weight particle.
    pub fn most_probable(&self) -> usize {
        let mut best = 0;
        let mut best_weight = f64::NEG_INFINITY;
        for (j, &w) in self.particle_weights.iter().enumerate() {
            if w > best_weight {
                best_weight = w;
                best = j;
            }
        }
        best
    }

    /// Weight-averaged state estimate. Wrap-bounded dimensions use the circular
    /// (cosine/sine) mean over the bound period instead of the arithmetic mean,
    /// so angle estimates behave sensibly across the wrap point.
    pub fn mean_state(&self) -> DVector<f64> {
        let probs: Vec<f64> = self
            .particle_weights
            .iter()
            .map(|&w| self.domain.to_probability(w))
            .collect();
        let mut mean = DVector::<f64>::zeros(self.num_states);
        for i in 0..self.num_states {
            let b = self.bounds[i];
            if b.is_active() && b.wrap {
                let values: Vec<f64> = self.particles.row(i).iter().copied().collect();
                mean[i] = angle_mean(&values, &probs, b.upper - b.lower);
            } else {
                mean[i] = (0..self.num_particles)
                    .map(|j| self.particles[(i, j)] * probs[j])
                    .sum();
            }
        }
        mean
    }

    /// Effective sample size `1 / sum(w^2)` over probability-domain weights;
    /// `N` for uniform weights, approaching 1 as the ensemble degenerates.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self
            .particle_weights
            .iter()
            .map(|&w| {
                let p = self.domain.to_probability(w);
                p * p
            })
            .sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let probs: Vec<f64> = self
            .particle_weights
            .iter()
            .map(|&w| self.domain.to_probability(w))
            .collect();
        let min_weight = probs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = probs.iter().copied().fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_states", &self.num_states)
            .field("num_observation_models", &self.num_observation_models)
            .field("num_particles", &self.num_particles)
            .field("domain", &self.domain)
            .field("effective_sample_size", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prob::logsumexp;
    use assert_approx_eq::assert_approx_eq;

    fn filter(
        states: usize,
        observes: usize,
        particles: usize,
        domain: ProbabilityDomain,
    ) -> ParticleFilter {
        ParticleFilter::new(states, observes, particles, domain).unwrap()
    }

    #[test]
    fn test_new_defaults() {
        let pf = filter(3, 2, 10, ProbabilityDomain::Linear);
        // ensemble starts zeroed until initialized
        for i in 0..3 {
            for j in 0..10 {
                assert_eq!(pf.particles()[(i, j)], 0.0);
            }
        }
        assert_eq!(pf.num_states(), 3);
        assert_eq!(pf.num_particles(), 10);
        assert_eq!(pf.num_observation_models(), 2);
        assert!(pf.bounds().iter().all(|b| !b.is_active()));
    }

    #[test]
    fn test_new_rejects_zero_dimensions() {
        assert!(ParticleFilter::new(0, 1, 1, ProbabilityDomain::Linear).is_err());
        assert!(ParticleFilter::new(1, 0, 1, ProbabilityDomain::Linear).is_err());
        assert!(ParticleFilter::new(1, 1, 0, ProbabilityDomain::Linear).is_err());
    }

    #[test]
    fn test_set_dynamics_validates_shape() {
        let mut pf = filter(2, 1, 5, ProbabilityDomain::Linear);
        let wrong = DMatrix::<f64>::identity(2, 2); // missing noise column
        assert!(pf.set_dynamics(&wrong).is_err());
        let ok = DMatrix::<f64>::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        assert!(pf.set_dynamics(&ok).is_ok());
    }

    #[test]
    fn test_set_noise_validates() {
        let mut pf = filter(2, 1, 5, ProbabilityDomain::Linear);
        assert!(pf.set_noise(7, &DVector::from_vec(vec![1.0])).is_err());
        assert!(pf.set_noise(7, &DVector::from_vec(vec![1.0, -0.5])).is_err());
        assert!(pf.set_noise(7, &DVector::from_vec(vec![1.0, 0.0])).is_ok());
    }

    #[test]
    fn test_set_bounds_validates_wrap() {
        let mut pf = filter(2, 1, 5, ProbabilityDomain::Linear);
        let bad = vec![Bound::wrapped(10.0, 10.0), Bound::none()];
        assert!(pf.set_bounds(&bad).is_err());
        // failed call must not partially mutate
        assert!(pf.bounds().iter().all(|b| !b.is_active()));
        let good = vec![Bound::wrapped(0.0, 360.0), Bound::clamped(-1.0, 1.0)];
        assert!(pf.set_bounds(&good).is_ok());
    }

    #[test]
    fn test_initialize_uniform_within_bounds() {
        let mut pf = filter(2, 1, 200, ProbabilityDomain::Linear);
        pf.set_bounds(&[Bound::clamped(-5.0, 5.0), Bound::clamped(100.0, 200.0)])
            .unwrap();
        pf.set_noise(42, &DVector::from_element(2, 1.0)).unwrap();
        pf.initialize();
        for j in 0..200 {
            let x = pf.particles()[(0, j)];
            let y = pf.particles()[(1, j)];
            assert!((-5.0..5.0).contains(&x));
            assert!((100.0..200.0).contains(&y));
        }
    }

    #[test]
    fn test_initialize_degenerate_bound_fills_constant() {
        let mut pf = filter(1, 1, 10, ProbabilityDomain::Linear);
        pf.set_bounds(&[Bound::clamped(3.0, 3.0)]).unwrap(); // inactive
        pf.initialize();
        for j in 0..10 {
            assert_eq!(pf.particles()[(0, j)], 3.0);
        }
    }

    #[test]
    fn test_initialize_from_replication_exactness() {
        // N = 10 targets, M = 3 seeds: copies must be 4, 3, 3 in seed order.
        let mut pf = filter(1, 1, 10, ProbabilityDomain::Linear);
        let seed = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        pf.initialize_from(&seed).unwrap();
        let counts: Vec<usize> = (1..=3)
            .map(|v| {
                (0..10)
                    .filter(|&j| pf.particles()[(0, j)] == v as f64)
                    .count()
            })
            .collect();
        assert_eq!(counts, vec![4, 3, 3]);
        // seed order preserved
        assert_eq!(pf.particles()[(0, 0)], 1.0);
        assert_eq!(pf.particles()[(0, 9)], 3.0);
    }

    #[test]
    fn test_initialize_from_validates() {
        let mut pf = filter(2, 1, 10, ProbabilityDomain::Linear);
        let wrong_rows = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        assert!(pf.initialize_from(&wrong_rows).is_err());
        let empty = DMatrix::<f64>::zeros(2, 0);
        assert!(pf.initialize_from(&empty).is_err());
    }

    #[test]
    fn test_transition_zero_noise_is_deterministic() {
        // dynamics [[1, 0]]: identity transition, zero noise coefficient
        let mut pf = filter(1, 1, 1, ProbabilityDomain::Linear);
        pf.set_dynamics(&DMatrix::from_row_slice(1, 2, &[1.0, 0.0]))
            .unwrap();
        pf.set_particle(0, &DVector::from_vec(vec![5.0])).unwrap();
        pf.transition();
        assert_eq!(pf.particles()[(0, 0)], 5.0);
    }

    #[test]
    fn test_transition_zero_std_is_deterministic() {
        let mut pf = filter(1, 1, 3, ProbabilityDomain::Linear);
        pf.set_noise(11, &DVector::from_vec(vec![0.0])).unwrap();
        for j in 0..3 {
            pf.set_particle(j, &DVector::from_vec(vec![j as f64])).unwrap();
        }
        pf.transition();
        for j in 0..3 {
            assert_eq!(pf.particles()[(0, j)], j as f64);
        }
    }

    #[test]
    fn test_transition_applies_linear_dynamics() {
        // Second-order AR in 2 states: x' = 2x - xp, xp' = x, no noise.
        let mut pf = filter(2, 1, 1, ProbabilityDomain::Linear);
        pf.set_dynamics(&DMatrix::from_row_slice(
            2,
            3,
            &[2.0, -1.0, 0.0, 1.0, 0.0, 0.0],
        ))
        .unwrap();
        pf.set_particle(0, &DVector::from_vec(vec![10.0, 8.0])).unwrap();
        pf.transition();
        assert_eq!(pf.particles()[(0, 0)], 12.0); // 10 + (10 - 8)
        assert_eq!(pf.particles()[(1, 0)], 10.0);
    }

    #[test]
    fn test_transition_is_seeded_and_reproducible() {
        let mut a = filter(1, 1, 50, ProbabilityDomain::Linear);
        let mut b = filter(1, 1, 50, ProbabilityDomain::Linear);
        a.set_noise(99, &DVector::from_vec(vec![2.0])).unwrap();
        b.set_noise(99, &DVector::from_vec(vec![2.0])).unwrap();
        a.transition();
        b.transition();
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn test_bounding_clamp_and_wrap() {
        let mut pf = filter(2, 1, 3, ProbabilityDomain::Linear);
        pf.set_bounds(&[Bound::clamped(0.0, 10.0), Bound::wrapped(0.0, 360.0)])
            .unwrap();
        pf.set_particle(0, &DVector::from_vec(vec![-4.0, 370.0])).unwrap();
        pf.set_particle(1, &DVector::from_vec(vec![15.0, -10.0])).unwrap();
        pf.set_particle(2, &DVector::from_vec(vec![5.0, 180.0])).unwrap();
        pf.apply_bounds();
        assert_eq!(pf.particles()[(0, 0)], 0.0);
        assert_eq!(pf.particles()[(1, 0)], 10.0);
        assert_eq!(pf.particles()[(0, 1)], 10.0);
        assert_eq!(pf.particles()[(1, 1)], 350.0);
        assert_eq!(pf.particles()[(0, 2)], 5.0);
        assert_eq!(pf.particles()[(1, 2)], 180.0);
    }

    #[test]
    fn test_bounding_is_idempotent() {
        let mut pf = filter(2, 1, 4, ProbabilityDomain::Linear);
        pf.set_bounds(&[Bound::clamped(-1.0, 1.0), Bound::wrapped(0.0, 360.0)])
            .unwrap();
        pf.set_particle(0, &DVector::from_vec(vec![3.0, 365.0])).unwrap();
        pf.set_particle(1, &DVector::from_vec(vec![-2.0, -5.0])).unwrap();
        pf.set_particle(2, &DVector::from_vec(vec![0.5, 0.0])).unwrap();
        pf.set_particle(3, &DVector::from_vec(vec![1.0, 359.9])).unwrap();
        pf.apply_bounds();
        let once = pf.particles().clone();
        pf.apply_bounds();
        assert_eq!(pf.particles(), &once);
    }

    #[test]
    fn test_marginalize_normalizes_linear() {
        let mut pf = filter(1, 2, 3, ProbabilityDomain::Linear);
        let likes = [[0.1, 0.5, 0.2], [0.3, 0.1, 0.4]];
        for (i, row) in likes.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                pf.set_likelihood(i, j, v);
            }
        }
        pf.marginalize();
        assert_approx_eq!(pf.particle_weights().iter().sum::<f64>(), 1.0, 1e-12);
        assert_approx_eq!(pf.observation_weights().iter().sum::<f64>(), 1.0, 1e-12);
        // particle 1 carries the most combined likelihood (0.5 + 0.1)
        assert_eq!(pf.most_probable(), 1);
        // both models sum to 0.8 total evidence, so their weights tie at 0.5
        assert_approx_eq!(pf.observation_weights()[0], 0.5, 1e-12);
    }

    #[test]
    fn test_marginalize_normalizes_log() {
        let mut pf = filter(1, 2, 3, ProbabilityDomain::Log);
        let likes = [[0.1f64, 0.5, 0.2], [0.3, 0.1, 0.4]];
        for (i, row) in likes.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                pf.set_likelihood(i, j, v.ln());
            }
        }
        pf.marginalize();
        let weights: Vec<f64> = pf.particle_weights().iter().copied().collect();
        assert_approx_eq!(logsumexp(&weights), 0.0, 1e-12);
        let obs: Vec<f64> = pf.observation_weights().iter().copied().collect();
        assert_approx_eq!(logsumexp(&obs), 0.0, 1e-12);
    }

    #[test]
    fn test_marginalize_domains_agree() {
        let likes = [[0.1f64, 0.5, 0.2, 0.05], [0.3, 0.1, 0.4, 0.25]];
        let mut linear = filter(1, 2, 4, ProbabilityDomain::Linear);
        let mut log = filter(1, 2, 4, ProbabilityDomain::Log);
        for (i, row) in likes.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                linear.set_likelihood(i, j, v);
                log.set_likelihood(i, j, v.ln());
            }
        }
        linear.marginalize();
        log.marginalize();
        for j in 0..4 {
            assert_approx_eq!(
                linear.particle_weights()[j],
                log.particle_weights()[j].exp(),
                1e-12
            );
        }
        for i in 0..2 {
            assert_approx_eq!(
                linear.observation_weights()[i],
                log.observation_weights()[i].exp(),
                1e-12
            );
        }
    }

    #[test]
    fn test_marginalize_degenerate_falls_back_to_uniform() {
        let mut pf = filter(1, 1, 4, ProbabilityDomain::Linear);
        // likelihood table defaults to all zeros
        pf.marginalize();
        for j in 0..4 {
            assert_approx_eq!(pf.particle_weights()[j], 0.25, 1e-12);
        }
        let mut pf = filter(1, 1, 4, ProbabilityDomain::Log);
        for j in 0..4 {
            pf.set_likelihood(0, j, f64::NEG_INFINITY);
        }
        pf.marginalize();
        for j in 0..4 {
            assert_approx_eq!(pf.particle_weights()[j].exp(), 0.25, 1e-12);
        }
    }

    #[test]
    fn test_resample_conserves_ensemble_size() {
        let mut pf = filter(1, 1, 7, ProbabilityDomain::Linear);
        for j in 0..7 {
            pf.set_particle(j, &DVector::from_vec(vec![j as f64])).unwrap();
            pf.set_likelihood(0, j, 0.05 + 0.1 * j as f64);
        }
        pf.resample(); // implicitly marginalizes
        assert_eq!(pf.particles().ncols(), 7);
        assert_eq!(pf.particles().nrows(), 1);
    }

    #[test]
    fn test_resample_preserves_dominant_particle() {
        let mut pf = filter(1, 1, 10, ProbabilityDomain::Linear);
        for j in 0..10 {
            pf.set_particle(j, &DVector::from_vec(vec![j as f64])).unwrap();
            pf.set_likelihood(0, j, if j == 6 { 1.0 } else { 1e-12 });
        }
        pf.resample();
        for j in 0..10 {
            assert_eq!(pf.particles()[(0, j)], 6.0);
        }
    }

    #[test]
    fn test_resample_pads_with_highest_weight_particle() {
        // Weights 0.1/0.1/0.1/0.7 over N=4 give copies round(0.4)=0, 0, 0,
        // round(2.8)=3, so only 3 slots fill and the argmax particle pads the rest.
        let mut pf = filter(1, 1, 4, ProbabilityDomain::Linear);
        for j in 0..4 {
            pf.set_particle(j, &DVector::from_vec(vec![j as f64])).unwrap();
        }
        for (j, w) in [0.1, 0.1, 0.1, 0.7].iter().enumerate() {
            pf.set_likelihood(0, j, *w);
        }
        pf.resample();
        for j in 0..4 {
            assert_eq!(pf.particles()[(0, j)], 3.0);
        }
    }

    #[test]
    fn test_resample_log_domain() {
        let mut pf = filter(1, 1, 6, ProbabilityDomain::Log);
        for j in 0..6 {
            pf.set_particle(j, &DVector::from_vec(vec![j as f64])).unwrap();
            pf.set_likelihood(0, j, if j == 2 { 0.0 } else { -50.0 });
        }
        pf.resample();
        for j in 0..6 {
            assert_eq!(pf.particles()[(0, j)], 2.0);
        }
    }

    #[test]
    fn test_mean_state_weighted() {
        let mut pf = filter(1, 1, 2, ProbabilityDomain::Linear);
        pf.set_particle(0, &DVector::from_vec(vec![0.0])).unwrap();
        pf.set_particle(1, &DVector::from_vec(vec![10.0])).unwrap();
        pf.set_likelihood(0, 0, 0.25);
        pf.set_likelihood(0, 1, 0.75);
        pf.marginalize();
        let mean = pf.mean_state();
        assert_approx_eq!(mean[0], 7.5, 1e-12);
    }

    #[test]
    fn test_mean_state_wrapped_dimension() {
        let mut pf = filter(1, 1, 2, ProbabilityDomain::Linear);
        pf.set_bounds(&[Bound::wrapped(0.0, 360.0)]).unwrap();
        pf.set_particle(0, &DVector::from_vec(vec![358.0])).unwrap();
        pf.set_particle(1, &DVector::from_vec(vec![2.0])).unwrap();
        pf.set_likelihood(0, 0, 0.4);
        pf.set_likelihood(0, 1, 0.6);
        pf.marginalize();
        let mean = pf.mean_state();
        assert_approx_eq!(mean[0], 0.4, 1e-3);
    }

    #[test]
    fn test_effective_sample_size() {
        let mut pf = filter(1, 1, 100, ProbabilityDomain::Linear);
        for j in 0..100 {
            pf.set_likelihood(0, j, 1.0);
        }
        pf.marginalize();
        assert_approx_eq!(pf.effective_sample_size(), 100.0, 1e-9);
    }

    #[test]
    fn test_observation_priors_shift_weights() {
        let mut pf = filter(1, 2, 2, ProbabilityDomain::Linear);
        for j in 0..2 {
            pf.set_likelihood(0, j, 0.5);
            pf.set_likelihood(1, j, 0.5);
        }
        pf.set_observation_priors(&DVector::from_vec(vec![0.9, 0.1]))
            .unwrap();
        pf.marginalize();
        assert_approx_eq!(pf.observation_weights()[0], 0.9, 1e-12);
        assert_approx_eq!(pf.observation_weights()[1], 0.1, 1e-12);
        // equal likelihoods: particle weights stay uniform regardless of priors
        assert_approx_eq!(pf.particle_weights()[0], 0.5, 1e-12);
    }

    #[test]
    fn test_set_observation_priors_validates_length() {
        let mut pf = filter(1, 2, 2, ProbabilityDomain::Linear);
        assert!(pf
            .set_observation_priors(&DVector::from_vec(vec![1.0]))
            .is_err());
    }
}
