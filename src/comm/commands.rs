//! High-level command façade over the multiplexer queue.
//!
//! Wrappers build the textual wire commands, parse the fields that come
//! back, and convert between the crate's metric units and the firmware's:
//! encoder counts for distance, tenths of a degree for angles, PID units
//! (200–1000) for speed. A missing or failed response degrades to
//! `false` / echoed inputs; wrappers never raise toward the planner.

use super::{Command, CommConfig, Response, ResponseMap};
use crossbeam_channel::Sender;
use rand::{thread_rng, Rng};
use std::thread;
use tracing::warn;

/// Encoder counts per inch of travel.
pub const COUNTS_PER_INCH: f64 = 165.0;
pub const METERS_PER_INCH: f64 = 0.0254;

pub fn meters_to_counts(meters: f64) -> i64 {
    (meters / METERS_PER_INCH * COUNTS_PER_INCH).round() as i64
}

pub fn counts_to_meters(counts: i64) -> f64 {
    counts as f64 / COUNTS_PER_INCH * METERS_PER_INCH
}

pub fn radians_to_decidegrees(angle: f64) -> i64 {
    (angle.to_degrees() * 10.0).round() as i64
}

pub fn decidegrees_to_radians(decidegrees: i64) -> f64 {
    (decidegrees as f64 / 10.0).to_radians()
}

/// Servo channel and end-stop table for one pick-and-place arm.
#[derive(Debug, Clone, Copy)]
pub struct Arm {
    pub name: &'static str,
    pub arm_channel: u8,
    /// Servo angles for (up, down).
    pub arm_angles: (u16, u16),
    pub gripper_channel: u8,
    /// Servo angles for (open, closed).
    pub gripper_angles: (u16, u16),
}

pub const LEFT_ARM: Arm = Arm {
    name: "left",
    arm_channel: 0,
    arm_angles: (680, 310),
    gripper_channel: 1,
    gripper_angles: (900, 450),
};

pub const RIGHT_ARM: Arm = Arm {
    name: "right",
    arm_channel: 2,
    arm_angles: (330, 710),
    gripper_channel: 3,
    gripper_angles: (0, 350),
};

/// Scalar sensor channel numbers on the motor board.
pub const SENSOR_IDS: &[(&str, u8)] = &[
    ("heading", 0),
    ("accel.x", 1),
    ("accel.y", 2),
    ("accel.z", 3),
    ("ultrasonic.left", 4),
    ("ultrasonic.front", 5),
    ("ultrasonic.right", 6),
    ("ultrasonic.back", 7),
];

pub fn sensor_id(name: &str) -> Option<u8> {
    SENSOR_IDS
        .iter()
        .find(|(sensor, _)| *sensor == name)
        .map(|(_, id)| *id)
}

/// One caller's handle on the shared multiplexer. Cheap to clone; every
/// clone talks to the same queue and response map.
#[derive(Clone)]
pub struct SerialCommand {
    cfg: CommConfig,
    commands: Sender<Command>,
    responses: ResponseMap,
}

impl SerialCommand {
    pub(crate) fn new(
        cfg: CommConfig,
        commands: Sender<Command>,
        responses: ResponseMap,
    ) -> SerialCommand {
        SerialCommand {
            cfg,
            commands,
            responses,
        }
    }

    /// Enqueues a command under a fresh 15-bit id and returns the id. A
    /// full queue blocks (backpressure) rather than dropping.
    pub fn put(&self, command: &str) -> i32 {
        let id = thread_rng().gen_range(0..self.cfg.max_command_id);
        if self
            .commands
            .send(Command::Request {
                id,
                text: command.to_string(),
            })
            .is_err()
        {
            warn!(command, "command dropped: serial interface is down");
        }
        id
    }

    /// Fetches and removes the response for `id`. Blocking waits on the
    /// response map; non-blocking returns `None` when nothing has arrived.
    pub fn get(&self, id: i32, block: bool) -> Option<Response> {
        if block {
            Some(self.responses.take_blocking(id))
        } else {
            self.responses.take(id)
        }
    }

    /// Enqueues `command` and blocks for its response.
    pub fn run(&self, command: &str) -> Response {
        let id = self.put(command);
        self.responses.take_blocking(id)
    }

    /// Enqueues the shutdown sentinel. Safe to call more than once.
    pub fn quit(&self) {
        let _ = self.commands.send(Command::Quit);
    }

    /// Stop immediately.
    pub fn stop(&self) -> bool {
        self.run("stop").result.unwrap_or(false)
    }

    /// Individual wheel/side speeds in raw PWM units (0–10000).
    pub fn pwm_drive(&self, left: i32, right: i32) -> bool {
        self.run(&format!("pwm_drive {} {}", left, right))
            .result
            .unwrap_or(false)
    }

    /// Move `distance` meters while turning to the absolute heading
    /// `angle` radians. Returns the achieved (distance, heading).
    pub fn set(&self, distance: f64, angle: f64, speed: u16) -> (f64, f64) {
        let counts = meters_to_counts(distance);
        let decidegrees = radians_to_decidegrees(angle);
        let response = self.run(&format!("set {} {} {}", decidegrees, speed, counts));
        (
            counts_to_meters(response.distance.unwrap_or(counts)),
            decidegrees_to_radians(response.abs_heading.unwrap_or(decidegrees)),
        )
    }

    /// Straight move of `distance` meters; wire verb `move`. Returns the
    /// achieved distance.
    pub fn drive(&self, distance: f64, speed: u16) -> f64 {
        let counts = meters_to_counts(distance);
        let response = self.run(&format!("move {} {}", speed, counts));
        counts_to_meters(response.distance.unwrap_or(counts))
    }

    /// Line-follow for `distance` meters; `which` selects the tracked edge
    /// (1 = left, 2 = right).
    pub fn follow(&self, distance: f64, speed: u16, which: u8) -> f64 {
        let counts = meters_to_counts(distance);
        let response = self.run(&format!("follow {} {} {}", speed, counts, which));
        counts_to_meters(response.distance.unwrap_or(counts))
    }

    /// Turn to an absolute heading in radians; returns the achieved
    /// heading.
    pub fn turn_abs(&self, angle: f64) -> f64 {
        let decidegrees = radians_to_decidegrees(angle);
        let response = self.run(&format!("turn_abs {}", decidegrees));
        decidegrees_to_radians(response.abs_heading.unwrap_or(decidegrees))
    }

    /// Relative turn in radians. The firmware reports the remaining
    /// heading error, so achieved = desired − error.
    pub fn turn_rel(&self, angle: f64) -> f64 {
        let decidegrees = radians_to_decidegrees(angle);
        let response = self.run(&format!("turn_rel {}", decidegrees));
        decidegrees_to_radians(decidegrees - response.heading_err.unwrap_or(0))
    }

    /// Raw servo command. The motor board acknowledges immediately, so
    /// this sleeps out the configured settle time before returning.
    pub fn servo(&self, channel: u8, ramp: u8, angle: u16) -> bool {
        let response = self.run(&format!("servo {} {} {}", channel, ramp, angle));
        thread::sleep(self.cfg.servo_delay);
        response.result.unwrap_or(false)
    }

    pub fn arm_up(&self, arm: &Arm) -> bool {
        self.servo(arm.arm_channel, self.cfg.default_arm_ramp, arm.arm_angles.0)
    }

    pub fn arm_down(&self, arm: &Arm) -> bool {
        self.servo(arm.arm_channel, self.cfg.default_arm_ramp, arm.arm_angles.1)
    }

    pub fn gripper_open(&self, arm: &Arm) -> bool {
        self.servo(
            arm.gripper_channel,
            self.cfg.default_gripper_ramp,
            arm.gripper_angles.0,
        )
    }

    pub fn gripper_close(&self, arm: &Arm) -> bool {
        self.servo(
            arm.gripper_channel,
            self.cfg.default_gripper_ramp,
            arm.gripper_angles.1,
        )
    }

    /// Canned pick sequence on the firmware (`left_pick` / `right_pick`).
    pub fn arm_pick(&self, arm: &Arm) -> bool {
        self.run(&format!("{}_pick", arm.name)).result.unwrap_or(false)
    }

    /// Canned drop sequence on the firmware (`left_drop` / `right_drop`).
    pub fn arm_drop(&self, arm: &Arm) -> bool {
        self.run(&format!("{}_drop", arm.name)).result.unwrap_or(false)
    }

    /// One scalar sensor channel; −1 when the response carries no data.
    pub fn sensor(&self, sensor: u8) -> i64 {
        self.run(&format!("sensor {}", sensor)).data.unwrap_or(-1)
    }

    pub fn sensor_by_name(&self, name: &str) -> i64 {
        match sensor_id(name) {
            Some(id) => self.sensor(id),
            None => -1,
        }
    }

    /// The full sensor sweep: heading, accelerometer and the ultrasonic
    /// block.
    pub fn sensors(&self) -> Response {
        self.run("sensors")
    }

    pub fn compass_reset(&self) -> bool {
        self.run("compass_reset").result.unwrap_or(false)
    }
}
