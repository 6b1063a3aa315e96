//! Shared geometry primitives: points, poses and heading arithmetic.

use std::f64::consts::TAU;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// Wraps an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    angle.rem_euclid(TAU)
}

/// Smallest absolute difference between two headings, in `[0, π]`.
pub fn angle_between(a: f64, b: f64) -> f64 {
    let diff = normalize_angle(a - b);
    diff.min(TAU - diff)
}

/// Mean of headings via unit-vector averaging, which sidesteps the wrap at
/// 0/2π that a plain arithmetic mean trips over.
pub fn angular_mean(angles: impl Iterator<Item = f64>) -> f64 {
    let (mut sin, mut cos, mut count) = (0.0, 0.0, 0usize);
    for angle in angles {
        sin += angle.sin();
        cos += angle.cos();
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    normalize_angle((sin / n).atan2(cos / n))
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn dist(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn mag(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Component-wise clamp into the box `[min, max]`.
    pub fn clamped(self, min: Point, max: Point) -> Point {
        Point {
            x: self.x.max(min.x).min(max.x),
            y: self.y.max(min.y).min(max.y),
        }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, other: Point) -> Point {
        Point {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, other: Point) -> Point {
        Point {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, scalar: f64) -> Point {
        Point {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

impl Div<f64> for Point {
    type Output = Point;
    fn div(self, scalar: f64) -> Point {
        Point {
            x: self.x / scalar,
            y: self.y / scalar,
        }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Point {
        Point { x, y }
    }
}

/// A planar pose: position plus heading. The heading is kept in `[0, 2π)`
/// by every constructor and update in this crate.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Pose {
    pub angle: f64,
    pub position: Point,
}

impl Pose {
    pub fn new(x: f64, y: f64, angle: f64) -> Pose {
        Pose {
            angle: normalize_angle(angle),
            position: Point { x, y },
        }
    }

    /// Copy of this pose with the heading wrapped into `[0, 2π)`.
    pub fn normalized(self) -> Pose {
        Pose {
            angle: normalize_angle(self.angle),
            position: self.position,
        }
    }

    /// World-frame pose of a fixture mounted at `mount` relative to this
    /// pose: the offset rotates with the heading and the bearings add.
    pub fn mounted(self, mount: Pose) -> Pose {
        let (sin, cos) = self.angle.sin_cos();
        Pose {
            angle: normalize_angle(self.angle + mount.angle),
            position: Point {
                x: self.position.x + mount.position.x * cos - mount.position.y * sin,
                y: self.position.y + mount.position.x * sin + mount.position.y * cos,
            },
        }
    }
}

impl Add for Pose {
    type Output = Pose;
    fn add(self, other: Pose) -> Pose {
        Pose {
            angle: normalize_angle(self.angle + other.angle),
            position: self.position + other.position,
        }
    }
}

impl AddAssign for Pose {
    fn add_assign(&mut self, other: Pose) {
        *self = *self + other;
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}) @ {:.2}",
            self.position.x, self.position.y, self.angle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn normalize_wraps_into_range() {
        assert!((normalize_angle(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(TAU + 0.25) - 0.25).abs() < 1e-12);
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!(normalize_angle(TAU) < 1e-12);
    }

    #[test]
    fn angular_mean_handles_the_wrap() {
        // Two headings straddling zero should average near zero, not π.
        let mean = angular_mean([TAU - 0.02, 0.02].iter().cloned());
        assert!(angle_between(mean, 0.0) < 1e-9);

        let mean = angular_mean([PI - 0.1, PI + 0.1].iter().cloned());
        assert!(angle_between(mean, PI) < 1e-9);
    }

    #[test]
    fn angular_mean_is_continuous_under_small_shifts() {
        let base = [0.3, 5.9, 1.2, 0.1];
        let eps = 1e-3;
        let before = angular_mean(base.iter().cloned());
        let after = angular_mean(base.iter().map(|a| a + eps));
        assert!((angle_between(after, before) - eps).abs() < 1e-6);
    }

    #[test]
    fn mounted_rotates_the_offset_with_the_heading() {
        // A fixture 1 unit ahead of a robot facing +y sits above the robot.
        let robot = Pose::new(2.0, 3.0, FRAC_PI_2);
        let mount = Pose::new(1.0, 0.0, 0.0);
        let world = robot.mounted(mount);
        assert!((world.position.x - 2.0).abs() < 1e-12);
        assert!((world.position.y - 4.0).abs() < 1e-12);
        assert!((world.angle - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn clamped_stays_in_box() {
        let p = Point { x: -1.0, y: 12.0 };
        let c = p.clamped(Point { x: 0.0, y: 0.0 }, Point { x: 10.0, y: 10.0 });
        assert_eq!(c, Point { x: 0.0, y: 10.0 });
    }
}
