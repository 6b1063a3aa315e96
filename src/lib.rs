//! On-robot control core for an autonomous indoor course robot.
//!
//! Two tightly coupled subsystems live here: the serial command
//! multiplexer, an id-tagged request/response transport over the single
//! line to the motor/sensor board (with a fake-hardware fallback for
//! off-robot work), and a Monte Carlo localizer that fuses noisy odometry
//! with ultrasonic readings against a known occupancy map. The localizer
//! loop stitches them together: odometry and sensor sweeps come in over a
//! feed queue, pose estimates go out through a shared fix record.

pub mod comm;
pub mod localizer;
pub mod robot;
pub mod utility;
