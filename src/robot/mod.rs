//! Robot-side models: the course map, the ultrasonic rig, the simulated
//! robot and the particle-filter localizer.

pub mod ai;
pub mod map;
pub mod sensors;
pub mod sim;

pub use map::Map;
pub use sim::SimRobot;

use rand::rngs::ThreadRng;
use rand_distr::{Distribution, Normal};

/// Dimensionless motion-noise multipliers: `turn` scales the σ of angular
/// drift per radian commanded, `travel` the σ of linear drift per unit
/// commanded. Immutable once handed to a robot or filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionNoise {
    pub turn: f64,
    pub travel: f64,
}

impl MotionNoise {
    /// Noise-free motion, for deterministic tests and ideal-pose tracking.
    pub fn none() -> MotionNoise {
        MotionNoise {
            turn: 0.0,
            travel: 0.0,
        }
    }
}

impl Default for MotionNoise {
    fn default() -> MotionNoise {
        MotionNoise {
            turn: 0.1,
            travel: 0.05,
        }
    }
}

/// One Gaussian draw around `mean`; σ of zero collapses to the mean so
/// noise-free configurations stay exact.
pub(crate) fn gauss(rng: &mut ThreadRng, mean: f64, sigma: f64) -> f64 {
    if sigma > 0.0 {
        Normal::new(mean, sigma).unwrap().sample(rng)
    } else {
        mean
    }
}
