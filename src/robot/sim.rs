//! Simulated robot: forward kinematics with motion noise plus the sensor
//! model, used to advance particles' ground truth in tests and to stand in
//! for the real chassis when no hardware is attached.

use crate::robot::map::Map;
use crate::robot::sensors::Ultrasonic;
use crate::robot::{gauss, MotionNoise};
use crate::utility::{normalize_angle, Point, Pose};
use rand::thread_rng;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SimRobot {
    pose: Pose,
    sensors: Vec<Ultrasonic>,
    noise: MotionNoise,
    map: Arc<Map>,
}

impl SimRobot {
    pub fn new(pose: Pose, sensors: Vec<Ultrasonic>, noise: MotionNoise, map: Arc<Map>) -> Self {
        SimRobot {
            pose: pose.normalized(),
            sensors,
            noise,
            map,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn sensors(&self) -> &[Ultrasonic] {
        &self.sensors
    }

    /// Turns by `dtheta` then rolls `forward` along the new heading, with
    /// Gaussian drift proportional to each commanded magnitude. The
    /// position clips to the map bounding box; no pose is ever rejected.
    pub fn advance(&mut self, dtheta: f64, forward: f64) {
        let mut rng = thread_rng();
        let turned = normalize_angle(self.pose.angle + dtheta);
        let angle = normalize_angle(gauss(&mut rng, turned, (dtheta * self.noise.turn).abs()));
        let dx = forward * angle.cos();
        let dy = forward * angle.sin();
        let x = gauss(&mut rng, self.pose.position.x + dx, (dx * self.noise.travel).abs());
        let y = gauss(&mut rng, self.pose.position.y + dy, (dy * self.noise.travel).abs());
        self.pose = Pose {
            angle,
            position: self.map.clamp(Point { x, y }),
        };
    }

    /// Reading of every mounted sensor from the current pose, keyed by
    /// sensor name. Rays that see no wall report the map diagonal.
    pub fn sense(&self) -> HashMap<String, f64> {
        self.sensors
            .iter()
            .map(|sensor| (sensor.name().to_string(), sensor.predict(self.pose, &self.map)))
            .collect()
    }
}
