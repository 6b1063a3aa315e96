//! Monte Carlo localization over the occupancy map.
//!
//! The filter owns a fixed-size cloud of pose hypotheses. Each odometry
//! report advances every particle through the stochastic motion model; each
//! ultrasonic sweep reweights the cloud by how well predicted readings match
//! the measured ones and then resamples with a low-variance wheel.

use crate::robot::map::Map;
use crate::robot::sensors::Ultrasonic;
use crate::robot::{gauss, MotionNoise};
use crate::utility::{angular_mean, normalize_angle, Point, Pose};
use rand::prelude::*;
use rayon::prelude::*;
use statrs::distribution::{Continuous, Normal};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::{debug, warn};

/// Importance-weighting σ in map length units. Deliberately coarser than
/// the ultrasonic noise σ so one noisy reading reshapes the belief instead
/// of collapsing it.
pub const WEIGHT_SIGMA: f64 = 1.5;

pub struct ParticleLocalizer {
    pub map: Arc<Map>,
    sensors: Vec<Ultrasonic>,
    noise: MotionNoise,
    particles: Vec<Pose>,
    weights: Vec<f64>,
    /// Predicted reading of sensor `s` from particle `i`, refreshed by
    /// every `update`.
    sensed: Vec<Vec<f64>>,
    pub weight_sigma: f64,
}

impl ParticleLocalizer {
    /// Tracking-mode filter: every particle starts at the seed pose. This
    /// is the default when the track follower seeds from the waypoint
    /// graph.
    pub fn from_pose(
        seed: Pose,
        sensors: Vec<Ultrasonic>,
        noise: MotionNoise,
        map: Arc<Map>,
        count: usize,
    ) -> Self {
        let particles = vec![seed.normalized(); count];
        Self::with_particles(particles, sensors, noise, map)
    }

    /// Filter with no pose prior: particles sampled uniformly over the map
    /// box and all headings.
    pub fn uniform(
        sensors: Vec<Ultrasonic>,
        noise: MotionNoise,
        map: Arc<Map>,
        count: usize,
    ) -> Self {
        let (width, height) = map.size();
        let mut rng = thread_rng();
        let particles = (0..count)
            .map(|_| {
                Pose::new(
                    rng.gen_range(0.0..width),
                    rng.gen_range(0.0..height),
                    rng.gen_range(0.0..TAU),
                )
            })
            .collect();
        Self::with_particles(particles, sensors, noise, map)
    }

    fn with_particles(
        particles: Vec<Pose>,
        sensors: Vec<Ultrasonic>,
        noise: MotionNoise,
        map: Arc<Map>,
    ) -> Self {
        assert!(!particles.is_empty(), "particle count must be positive");
        let count = particles.len();
        let sensed = vec![vec![0.0; count]; sensors.len()];
        ParticleLocalizer {
            map,
            sensors,
            noise,
            weights: vec![1.0 / count as f64; count],
            particles,
            sensed,
            weight_sigma: WEIGHT_SIGMA,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Pose] {
        &self.particles
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Predict step: advances every particle through the same stochastic
    /// motion model as the robot, clipping positions to the map box.
    /// Off-map hypotheses created by the clip die in the next weighting
    /// pass because their predicted readings disagree with reality.
    pub fn advance(&mut self, dtheta: f64, forward: f64) {
        let mut rng = thread_rng();
        let turn_sigma = (dtheta * self.noise.turn).abs();
        for particle in &mut self.particles {
            let turned = normalize_angle(particle.angle + dtheta);
            let angle = normalize_angle(gauss(&mut rng, turned, turn_sigma));
            let dx = forward * angle.cos();
            let dy = forward * angle.sin();
            let x = gauss(&mut rng, particle.position.x + dx, (dx * self.noise.travel).abs());
            let y = gauss(&mut rng, particle.position.y + dy, (dy * self.noise.travel).abs());
            *particle = Pose {
                angle,
                position: self.map.clamp(Point { x, y }),
            };
        }
    }

    /// Weighting step plus resample. `measured` maps sensor names to
    /// observed distances; sensors without a reading this sweep are
    /// skipped.
    pub fn update(&mut self, measured: &HashMap<String, f64>) {
        self.sense_all();
        self.weigh(measured);
        self.resample();
    }

    /// Fills `sensed[s][i]` with the reading sensor `s` would report from
    /// particle `i`.
    fn sense_all(&mut self) {
        let particles = &self.particles;
        let map = &self.map;
        for (sensor, readings) in self.sensors.iter().zip(self.sensed.iter_mut()) {
            *readings = particles
                .par_iter()
                .map(|particle| sensor.predict(*particle, map))
                .collect();
        }
    }

    fn weigh(&mut self, measured: &HashMap<String, f64>) {
        // One Gaussian per sensor, centered on its measured reading.
        let likelihoods: Vec<(usize, Normal)> = self
            .sensors
            .iter()
            .enumerate()
            .filter_map(|(s, sensor)| {
                let reading = *measured.get(sensor.name())?;
                match Normal::new(reading, self.weight_sigma) {
                    Ok(normal) => Some((s, normal)),
                    Err(_) => {
                        warn!(sensor = sensor.name(), reading, "unusable reading, skipping");
                        None
                    }
                }
            })
            .collect();
        let sensed = &self.sensed;
        self.weights = (0..self.particles.len())
            .into_par_iter()
            .map(|i| {
                let mut weight = 1.0;
                for (s, normal) in &likelihoods {
                    weight *= normal.pdf(sensed[*s][i]);
                }
                if weight.is_finite() {
                    weight
                } else {
                    0.0
                }
            })
            .collect();
    }

    /// Low-variance wheel resample. Replaces the particle set with `n`
    /// draws whose frequency is proportional to weight, then resets every
    /// weight to 1/n. A fully degenerate belief (all weights zero) falls
    /// back to a uniform random subsample of the current set.
    fn resample(&mut self) {
        let n = self.particles.len();
        let mut rng = thread_rng();
        let w_max = self.weights.iter().cloned().fold(0.0, f64::max);
        let mut fresh = Vec::with_capacity(n);
        if w_max > 0.0 && w_max.is_finite() {
            let step = 2.0 * w_max;
            let mut cur = rng.gen_range(0..n);
            let mut beta = 0.0;
            for _ in 0..n {
                beta += rng.gen::<f64>() * step;
                while beta > self.weights[cur] {
                    beta -= self.weights[cur];
                    cur = (cur + 1) % n;
                }
                fresh.push(self.particles[cur]);
            }
        } else {
            debug!("degenerate belief, falling back to uniform resample");
            for _ in 0..n {
                fresh.push(self.particles[rng.gen_range(0..n)]);
            }
        }
        self.particles = fresh;
        let uniform = 1.0 / n as f64;
        for weight in &mut self.weights {
            *weight = uniform;
        }
    }

    /// Best pose estimate: mean position and the angular mean of headings
    /// (unit-vector averaging, so the 0/2π wrap does not bite).
    pub fn guess(&self) -> Pose {
        let n = self.particles.len() as f64;
        let mut sum = Point { x: 0.0, y: 0.0 };
        for particle in &self.particles {
            sum = sum + particle.position;
        }
        Pose {
            angle: angular_mean(self.particles.iter().map(|p| p.angle)),
            position: sum / n,
        }
    }
}
