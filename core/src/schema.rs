//! Rotated-rectangle state schema with second-order autoregressive dynamics.
//!
//! The filter core only sees flat `f64` state vectors; this module gives the ten
//! raw dimensions of a rotated-rectangle tracker their names and wires up the
//! matching dynamics, noise, and bounds. It also serves as a template for defining
//! other application state layouts: nothing in the core depends on it.
//!
//! The state carries both the current rectangle and the previous-step copy of each
//! quantity, which lets a purely linear dynamics matrix express the second-order
//! model `next = current + (current - previous) + noise` (constant-velocity in
//! every rectangle parameter).

use crate::error::ParticleError;
use crate::filter::{Bound, ParticleFilter};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of state dimensions used by the rotated-rectangle schema.
pub const RECT_NUM_STATES: usize = 10;

/// Named view of one rotated-rectangle particle.
///
/// `x`/`y` are the rectangle center in pixels, `angle` the rotation around the
/// center in degrees; the `*_prev` fields hold the previous step's values for the
/// second-order dynamics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectState {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub x_prev: f64,
    pub y_prev: f64,
    pub width_prev: f64,
    pub height_prev: f64,
    pub angle_prev: f64,
}

impl RectState {
    /// A rectangle at rest: previous values equal to current ones.
    pub fn at_rest(x: f64, y: f64, width: f64, height: f64, angle: f64) -> Self {
        RectState {
            x,
            y,
            width,
            height,
            angle,
            x_prev: x,
            y_prev: y,
            width_prev: width,
            height_prev: height,
            angle_prev: angle,
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.x,
            self.y,
            self.width,
            self.height,
            self.angle,
            self.x_prev,
            self.y_prev,
            self.width_prev,
            self.height_prev,
            self.angle_prev,
        ])
    }

    pub fn from_vector(state: &DVector<f64>) -> Result<Self, ParticleError> {
        if state.len() != RECT_NUM_STATES {
            return Err(ParticleError::dimension(
                "rect state length",
                RECT_NUM_STATES,
                state.len(),
            ));
        }
        Ok(RectState {
            x: state[0],
            y: state[1],
            width: state[2],
            height: state[3],
            angle: state[4],
            x_prev: state[5],
            y_prev: state[6],
            width_prev: state[7],
            height_prev: state[8],
            angle_prev: state[9],
        })
    }

    /// Read one particle from a filter as a rectangle state.
    pub fn from_particle(filter: &ParticleFilter, index: usize) -> Result<Self, ParticleError> {
        Self::from_vector(&filter.particle(index))
    }

    /// Write this rectangle state into one particle slot.
    pub fn to_particle(&self, filter: &mut ParticleFilter, index: usize) -> Result<(), ParticleError> {
        filter.set_particle(index, &self.to_vector())
    }
}

impl fmt::Display for RectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}) {:.1}x{:.1} @ {:.1} deg",
            self.x, self.y, self.width, self.height, self.angle
        )
    }
}

/// Second-order autoregressive dynamics matrix for the rectangle schema,
/// `10 x 11` including the noise-coefficient column.
///
/// Each current-value row computes `2 * current - previous` (i.e. current plus the
/// last step's velocity) with unit noise coefficient; each previous-value row copies
/// the current value forward with no noise.
pub fn second_order_dynamics() -> DMatrix<f64> {
    let half = RECT_NUM_STATES / 2;
    let mut dynamics = DMatrix::<f64>::zeros(RECT_NUM_STATES, RECT_NUM_STATES + 1);
    for i in 0..half {
        dynamics[(i, i)] = 2.0;
        dynamics[(i, half + i)] = -1.0;
        dynamics[(i, RECT_NUM_STATES)] = 1.0;
        dynamics[(half + i, i)] = 1.0;
    }
    dynamics
}

/// Bounds for a rectangle tracked inside a `frame_width x frame_height` image:
/// the center stays inside the frame, the size stays between one pixel and the
/// frame, and the angle wraps at 360 degrees. Previous-value dimensions are
/// unbounded (they are overwritten by the dynamics every step).
pub fn frame_bounds(frame_width: f64, frame_height: f64) -> Vec<Bound> {
    let mut bounds = vec![Bound::none(); RECT_NUM_STATES];
    bounds[0] = Bound::clamped(0.0, frame_width - 1.0);
    bounds[1] = Bound::clamped(0.0, frame_height - 1.0);
    bounds[2] = Bound::clamped(1.0, frame_width);
    bounds[3] = Bound::clamped(1.0, frame_height);
    bounds[4] = Bound::wrapped(0.0, 360.0);
    bounds
}

/// Per-parameter transition noise for the rectangle schema, in pixels / degrees
/// per step. Previous-value dimensions get zero noise.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RectNoise {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl Default for RectNoise {
    fn default() -> Self {
        RectNoise {
            x: 3.0,
            y: 3.0,
            width: 2.0,
            height: 2.0,
            angle: 1.0,
        }
    }
}

impl RectNoise {
    pub fn to_vector(&self) -> DVector<f64> {
        let mut std = DVector::zeros(RECT_NUM_STATES);
        std[0] = self.x;
        std[1] = self.y;
        std[2] = self.width;
        std[3] = self.height;
        std[4] = self.angle;
        std
    }
}

/// Configure a 10-state filter for rotated-rectangle tracking inside an image
/// frame: second-order dynamics, the given transition noise, and frame bounds.
pub fn configure(
    filter: &mut ParticleFilter,
    frame_width: f64,
    frame_height: f64,
    noise: RectNoise,
    seed: u64,
) -> Result<(), ParticleError> {
    if filter.num_states() != RECT_NUM_STATES {
        return Err(ParticleError::dimension(
            "rect schema filter states",
            RECT_NUM_STATES,
            filter.num_states(),
        ));
    }
    filter.set_dynamics(&second_order_dynamics())?;
    filter.set_noise(seed, &noise.to_vector())?;
    filter.set_bounds(&frame_bounds(frame_width, frame_height))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prob::ProbabilityDomain;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rect_state_round_trip() {
        let state = RectState {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            angle: 45.0,
            x_prev: 9.0,
            y_prev: 19.0,
            width_prev: 30.0,
            height_prev: 40.0,
            angle_prev: 44.0,
        };
        let back = RectState::from_vector(&state.to_vector()).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_from_vector_validates_length() {
        assert!(RectState::from_vector(&DVector::zeros(9)).is_err());
    }

    #[test]
    fn test_second_order_dynamics_predicts_velocity() {
        // A rectangle moving +2 px/step in x keeps moving at that rate with no noise.
        let mut pf = ParticleFilter::new(RECT_NUM_STATES, 1, 1, ProbabilityDomain::Linear).unwrap();
        configure(&mut pf, 640.0, 480.0, RectNoise::default(), 5).unwrap();
        // zero out transition noise for determinism
        pf.set_noise(5, &DVector::zeros(RECT_NUM_STATES)).unwrap();
        let mut state = RectState::at_rest(100.0, 100.0, 40.0, 30.0, 0.0);
        state.x_prev = 98.0; // implies velocity +2
        state.to_particle(&mut pf, 0).unwrap();
        pf.transition();
        let next = RectState::from_particle(&pf, 0).unwrap();
        assert_approx_eq!(next.x, 102.0, 1e-12);
        assert_approx_eq!(next.x_prev, 100.0, 1e-12);
        assert_approx_eq!(next.y, 100.0, 1e-12);
        assert_approx_eq!(next.angle, 0.0, 1e-12);
    }

    #[test]
    fn test_frame_bounds_shape() {
        let bounds = frame_bounds(640.0, 480.0);
        assert_eq!(bounds.len(), RECT_NUM_STATES);
        assert_eq!(bounds[0], Bound::clamped(0.0, 639.0));
        assert_eq!(bounds[4], Bound::wrapped(0.0, 360.0));
        assert!(bounds[5..].iter().all(|b| !b.is_active()));
    }

    #[test]
    fn test_configure_rejects_wrong_state_count() {
        let mut pf = ParticleFilter::new(4, 1, 1, ProbabilityDomain::Linear).unwrap();
        assert!(configure(&mut pf, 640.0, 480.0, RectNoise::default(), 5).is_err());
    }

    #[test]
    fn test_angle_wraps_through_360() {
        let mut pf = ParticleFilter::new(RECT_NUM_STATES, 1, 1, ProbabilityDomain::Linear).unwrap();
        configure(&mut pf, 640.0, 480.0, RectNoise::default(), 5).unwrap();
        pf.set_noise(5, &DVector::zeros(RECT_NUM_STATES)).unwrap();
        let mut state = RectState::at_rest(100.0, 100.0, 40.0, 30.0, 358.0);
        state.angle_prev = 353.0; // +5 deg/step
        state.to_particle(&mut pf, 0).unwrap();
        pf.transition();
        let next = RectState::from_particle(&pf, 0).unwrap();
        // 358 + 5 = 363 wraps to 3
        assert_approx_eq!(next.angle, 3.0, 1e-12);
    }

    #[test]
    fn test_display_formats_current_rect() {
        let state = RectState::at_rest(10.0, 20.0, 30.0, 40.0, 90.0);
        assert_eq!(state.to_string(), "(10.0, 20.0) 30.0x40.0 @ 90.0 deg");
    }
}
