//! Observation-model collaborator contract.
//!
//! The filter core never computes a likelihood itself; it defines one storage slot per
//! (observation model, particle) pair and lets external models fill it. A model scores
//! how well a candidate state vector explains the current scene (an image frame, a
//! sensor reading) and returns a scalar in the filter's probability domain: a plain
//! likelihood for [`ProbabilityDomain::Linear`] filters, a natural-log likelihood for
//! [`ProbabilityDomain::Log`] ones.

use crate::error::ParticleError;
use crate::filter::ParticleFilter;
use crate::prob::ProbabilityDomain;

use nalgebra::DVector;

/// One independent observation channel (e.g. a color model or a shape model).
pub trait ObservationModel {
    /// Likelihood of the scene given one candidate state, in the probability
    /// domain of the filter this model is attached to.
    fn likelihood(&self, state: &DVector<f64>) -> f64;
}

impl ParticleFilter {
    /// Fill the likelihood table by evaluating every observation model on every
    /// particle, one row per model. Call between [`ParticleFilter::transition`]
    /// and [`ParticleFilter::marginalize`].
    ///
    /// Fails with `InvalidArgument` if the number of models does not match the
    /// filter, and with `NumericDegeneracy` if any model returns NaN; the table
    /// may be partially written in the latter case and must be refilled.
    pub fn observe(&mut self, models: &[&dyn ObservationModel]) -> Result<(), ParticleError> {
        if models.len() != self.num_observation_models() {
            return Err(ParticleError::dimension(
                "observation model count",
                self.num_observation_models(),
                models.len(),
            ));
        }
        for j in 0..self.num_particles() {
            let state = self.particle(j);
            for (i, model) in models.iter().enumerate() {
                let likelihood = model.likelihood(&state);
                if likelihood.is_nan() {
                    return Err(ParticleError::NumericDegeneracy(format!(
                        "observation model {i} returned NaN for particle {j}"
                    )));
                }
                self.set_likelihood(i, j, likelihood);
            }
        }
        Ok(())
    }
}

/// Univariate Gaussian probability density at `x`.
pub fn gaussian_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

/// Natural log of [`gaussian_pdf`]; stays finite far into the tails where the
/// plain density underflows.
pub fn gaussian_log_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    -0.5 * z * z - std.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

/// An observation model scoring the Euclidean distance between selected state
/// dimensions and a reference vector under a Gaussian kernel.
///
/// Useful as a building block for synthetic scenes and tests: the reference is
/// the "true" measurement and `std` its uncertainty. Emits plain or log
/// densities to match the filter's domain.
pub struct GaussianObservation {
    reference: DVector<f64>,
    /// Indices of the state dimensions this channel observes.
    dimensions: Vec<usize>,
    std: f64,
    domain: ProbabilityDomain,
}

impl GaussianObservation {
    pub fn new(
        reference: DVector<f64>,
        dimensions: Vec<usize>,
        std: f64,
        domain: ProbabilityDomain,
    ) -> Result<Self, ParticleError> {
        if reference.len() != dimensions.len() {
            return Err(ParticleError::dimension(
                "gaussian observation reference length",
                dimensions.len(),
                reference.len(),
            ));
        }
        if !(std.is_finite() && std > 0.0) {
            return Err(ParticleError::InvalidArgument(
                "gaussian observation std must be finite and positive".into(),
            ));
        }
        Ok(GaussianObservation {
            reference,
            dimensions,
            std,
            domain,
        })
    }

    pub fn set_reference(&mut self, reference: DVector<f64>) -> Result<(), ParticleError> {
        if reference.len() != self.dimensions.len() {
            return Err(ParticleError::dimension(
                "gaussian observation reference length",
                self.dimensions.len(),
                reference.len(),
            ));
        }
        self.reference = reference;
        Ok(())
    }
}

impl ObservationModel for GaussianObservation {
    fn likelihood(&self, state: &DVector<f64>) -> f64 {
        let distance: f64 = self
            .dimensions
            .iter()
            .zip(self.reference.iter())
            .map(|(&dim, &r)| {
                let d = state[dim] - r;
                d * d
            })
            .sum::<f64>()
            .sqrt();
        match self.domain {
            ProbabilityDomain::Linear => gaussian_pdf(distance, 0.0, self.std),
            ProbabilityDomain::Log => gaussian_log_pdf(distance, 0.0, self.std),
        }
    }
}
