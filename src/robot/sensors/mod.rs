//! Ultrasonic range-sensor descriptors and the standard mounting rigs.

use crate::robot::map::Map;
use crate::utility::Pose;
use std::f64::consts::{FRAC_PI_2, PI};

/// Datasheet resolution is within 0.1"; two standard deviations inside the
/// resolution puts 95% of readings on target.
pub const ULTRASONIC_NOISE_SIGMA: f64 = 0.05;

/// Half-angle of the sonar cone when `cone` integration is enabled.
pub const DEFAULT_CONE_HALF_ANGLE: f64 = PI / 12.0;

const CONE_RAYS: usize = 3;

/// Immutable descriptor of one ultrasonic sensor: where it sits on the
/// chassis, how it points, and how it is modeled.
#[derive(Debug, Clone)]
pub struct Ultrasonic {
    name: String,
    mount: Pose,
    noise_sigma: f64,
    cone: bool,
    cone_half_angle: f64,
    max_range: Option<f64>,
}

impl Ultrasonic {
    /// A single-ray sensor mounted at `mount` relative to the robot center.
    pub fn new(name: &str, mount: Pose, noise_sigma: f64) -> Ultrasonic {
        Ultrasonic {
            name: name.to_string(),
            mount,
            noise_sigma,
            cone: false,
            cone_half_angle: DEFAULT_CONE_HALF_ANGLE,
            max_range: None,
        }
    }

    /// A sensor that integrates over its sonar cone rather than one ray.
    pub fn cone(name: &str, mount: Pose, noise_sigma: f64) -> Ultrasonic {
        Ultrasonic {
            cone: true,
            ..Ultrasonic::new(name, mount, noise_sigma)
        }
    }

    pub fn with_cone_half_angle(mut self, half_angle: f64) -> Ultrasonic {
        self.cone_half_angle = half_angle;
        self
    }

    pub fn with_max_range(mut self, max_range: f64) -> Ultrasonic {
        self.max_range = Some(max_range);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mount(&self) -> Pose {
        self.mount
    }

    pub fn noise_sigma(&self) -> f64 {
        self.noise_sigma
    }

    pub fn is_cone(&self) -> bool {
        self.cone
    }

    /// Noise-free reading this sensor would report from `pose` on `map`:
    /// the distance to the first wall, or the map diagonal when nothing
    /// echoes back within range. Cone sensors report the nearest return
    /// across rays spread over `±cone_half_angle`.
    pub fn predict(&self, pose: Pose, map: &Map) -> f64 {
        let eye = pose.mounted(self.mount);
        let range = self.max_range.unwrap_or(f64::INFINITY);
        let reading = if self.cone {
            let mut nearest: Option<f64> = None;
            for ray in 0..CONE_RAYS {
                let spread = ray as f64 / (CONE_RAYS - 1) as f64 * 2.0 - 1.0;
                let bearing = Pose {
                    angle: eye.angle + spread * self.cone_half_angle,
                    ..eye
                };
                if let Some(dist) = Ultrasonic::one_ray(bearing, range, map) {
                    nearest = Some(nearest.map_or(dist, |best: f64| best.min(dist)));
                }
            }
            nearest
        } else {
            Ultrasonic::one_ray(eye, range, map)
        };
        reading.unwrap_or_else(|| map.diagonal())
    }

    fn one_ray(eye: Pose, range: f64, map: &Map) -> Option<f64> {
        map.raycast(eye, range).map(|hit| hit.dist(eye.position))
    }
}

/// Front/left/right/back single-ray rig at the robot center.
pub fn centered_rig() -> Vec<Ultrasonic> {
    vec![
        Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("left", Pose::new(0.0, 0.0, FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("right", Pose::new(0.0, 0.0, -FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("back", Pose::new(0.0, 0.0, PI), ULTRASONIC_NOISE_SIGMA),
    ]
}

/// Centered rig with cone integration, the default on the real chassis.
pub fn centered_cone_rig() -> Vec<Ultrasonic> {
    vec![
        Ultrasonic::cone("front", Pose::new(0.0, 0.0, 0.0), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::cone("left", Pose::new(0.0, 0.0, FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::cone("right", Pose::new(0.0, 0.0, -FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::cone("back", Pose::new(0.0, 0.0, PI), ULTRASONIC_NOISE_SIGMA),
    ]
}

/// Rig with the sensors pushed 4 units out from the center, matching the
/// physical mounting points on the chassis.
pub fn offset_rig() -> Vec<Ultrasonic> {
    vec![
        Ultrasonic::new("front", Pose::new(4.0, 0.0, 0.0), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("left", Pose::new(0.0, -4.0, FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("right", Pose::new(0.0, 4.0, -FRAC_PI_2), ULTRASONIC_NOISE_SIGMA),
        Ultrasonic::new("back", Pose::new(-4.0, 0.0, PI), ULTRASONIC_NOISE_SIGMA),
    ]
}

pub fn default_rig() -> Vec<Ultrasonic> {
    centered_cone_rig()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::map::{Cell, Map};

    fn map_with_walls(cols: usize, rows: usize, walls: &[(usize, usize)]) -> Map {
        let mut cells = vec![Cell::default(); cols * rows];
        for &(x, y) in walls {
            cells[y * cols + x] = Cell::wall();
        }
        Map::from_grid(cells, cols, 1.0).unwrap()
    }

    #[test]
    fn open_map_reads_the_sentinel() {
        let map = map_with_walls(10, 10, &[]);
        let front = Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), 0.05);
        let reading = front.predict(Pose::new(5.0, 5.0, 0.0), &map);
        assert!((reading - map.diagonal()).abs() < 1e-9);
    }

    #[test]
    fn straight_ray_reads_the_wall_distance() {
        let map = map_with_walls(10, 10, &[(8, 5)]);
        let front = Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), 0.05);
        let reading = front.predict(Pose::new(5.0, 5.5, 0.0), &map);
        assert!((reading - 3.5).abs() < 1e-9);
    }

    #[test]
    fn mount_offset_and_bearing_shift_the_ray() {
        // A back sensor from the middle of the map sees the west wall.
        let map = map_with_walls(10, 10, &[(0, 5)]);
        let back = Ultrasonic::new("back", Pose::new(0.0, 0.0, std::f64::consts::PI), 0.05);
        let reading = back.predict(Pose::new(5.5, 5.5, 0.0), &map);
        assert!((reading - 5.0).abs() < 1e-9);
    }

    #[test]
    fn cone_takes_the_nearest_return() {
        // Wall offset from the boresight: the straight ray misses it but an
        // edge ray of the cone catches it.
        let map = map_with_walls(20, 20, &[(12, 7)]);
        let straight = Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), 0.05);
        let coned = Ultrasonic::cone("front", Pose::new(0.0, 0.0, 0.0), 0.05)
            .with_cone_half_angle(0.5);
        // Boresight points just above the wall; the lower cone edge ray
        // sweeps down onto it.
        let pose = Pose::new(5.0, 10.0, 0.178);
        let miss = straight.predict(pose, &map);
        let hit = coned.predict(pose, &map);
        assert!((miss - map.diagonal()).abs() < 1e-9);
        assert!(hit < miss);
    }

    #[test]
    fn sensor_inside_a_wall_reads_zero_not_negative() {
        let map = map_with_walls(5, 5, &[(2, 2)]);
        let front = Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), 0.05);
        // Pointing into the wall from its own cell center.
        let reading = front.predict(Pose::new(2.5, 2.5, 1.3), &map);
        assert!(reading.abs() < 1e-12);
        // Off-center in the same cell the reading is still non-negative.
        let reading = front.predict(Pose::new(2.2, 2.8, 4.0), &map);
        assert!(reading >= 0.0);
        assert!(reading < 1.0);
    }

    #[test]
    fn max_range_turns_far_walls_into_the_sentinel() {
        let map = map_with_walls(10, 10, &[(8, 5)]);
        let front =
            Ultrasonic::new("front", Pose::new(0.0, 0.0, 0.0), 0.05).with_max_range(2.0);
        let reading = front.predict(Pose::new(5.0, 5.5, 0.0), &map);
        assert!((reading - map.diagonal()).abs() < 1e-9);
    }
}
