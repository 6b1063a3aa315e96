//! Serial command multiplexer: a concurrent, id-tagged request/response
//! transport over the single serial line to the motor/sensor board.
//!
//! Any number of [`SerialCommand`] façades push commands onto one bounded
//! queue; the [`SerialInterface`] loops own the port, keep sends FIFO and
//! demultiplex responses by id into a shared [`ResponseMap`].

pub mod commands;
pub mod mux;
pub mod transport;

pub use commands::{Arm, SerialCommand, LEFT_ARM, RIGHT_ARM};
pub use mux::{MuxHandle, SerialInterface};
pub use transport::{fake_link, open_link, CommError, LinkRx, LinkTx};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Exclusive upper bound for generated command ids; ids fit in 15 bits.
pub const MAX_COMMAND_ID: i32 = 32767;

/// Id stored for responses that carry none, and the id of the shutdown
/// sentinel on the wire protocol.
pub const NO_ID: i32 = -1;

pub(crate) const COMMAND_EOL: &str = "\r";

/// Explicit transport configuration, passed at construction instead of
/// living in process-wide globals.
#[derive(Debug, Clone)]
pub struct CommConfig {
    pub port: String,
    pub baudrate: u32,
    /// Read timeout on the port; also paces how quickly the loops notice a
    /// shutdown request.
    pub timeout: Duration,
    pub queue_capacity: usize,
    /// Force one synchronous send-then-wait loop instead of the pipelined
    /// send/receive pair.
    pub sequential: bool,
    /// Prefix outgoing payloads with `<id> ` so the firmware can echo the
    /// id back.
    pub prefix_id: bool,
    /// How long a servo needs to finish its travel after the firmware
    /// acknowledges the command.
    pub servo_delay: Duration,
    /// Pacing sleep for the fake link.
    pub fake_delay: Duration,
    /// Exclusive upper bound for generated command ids.
    pub max_command_id: i32,
    pub default_speed: u16,
    pub default_arm_ramp: u8,
    pub default_gripper_ramp: u8,
}

impl Default for CommConfig {
    fn default() -> CommConfig {
        CommConfig {
            port: "/dev/ttyO3".to_string(),
            baudrate: 19200,
            timeout: Duration::from_secs(10),
            queue_capacity: 10,
            sequential: false,
            prefix_id: true,
            servo_delay: Duration::from_secs(1),
            fake_delay: Duration::from_millis(1),
            max_command_id: MAX_COMMAND_ID,
            default_speed: 200,
            default_arm_ramp: 10,
            default_gripper_ramp: 5,
        }
    }
}

/// One queued item: a command heading for the wire, or the shutdown
/// sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Request { id: i32, text: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accel {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Ultrasonic block of a `sensors` sweep, in inches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UltrasonicReadings {
    #[serde(default)]
    pub front: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub right: f64,
    #[serde(default)]
    pub back: f64,
}

impl UltrasonicReadings {
    /// Name-keyed view for the localizer's measurement update.
    pub fn as_map(&self) -> HashMap<String, f64> {
        vec![
            ("front".to_string(), self.front),
            ("left".to_string(), self.left),
            ("right".to_string(), self.right),
            ("back".to_string(), self.back),
        ]
        .into_iter()
        .collect()
    }
}

/// One structured response line from the firmware. Fields the firmware did
/// not send keep their defaults, so callers can fall back per field instead
/// of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_response_id")]
    pub id: i32,
    #[serde(default)]
    pub result: Option<bool>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub distance: Option<i64>,
    #[serde(default, rename = "absHeading")]
    pub abs_heading: Option<i64>,
    #[serde(default, rename = "headingErr")]
    pub heading_err: Option<i64>,
    #[serde(default)]
    pub data: Option<i64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub accel: Option<Accel>,
    #[serde(default)]
    pub ultrasonic: Option<UltrasonicReadings>,
}

fn default_response_id() -> i32 {
    NO_ID
}

impl Default for Response {
    fn default() -> Response {
        Response {
            id: NO_ID,
            result: None,
            msg: None,
            distance: None,
            abs_heading: None,
            heading_err: None,
            data: None,
            heading: None,
            accel: None,
            ultrasonic: None,
        }
    }
}

impl Response {
    /// The canned success response the fake link synthesizes.
    pub fn fake_success(id: i32) -> Response {
        Response {
            id,
            result: Some(true),
            msg: Some(String::new()),
            ..Response::default()
        }
    }
}

struct ResponseMapState {
    entries: HashMap<i32, Response>,
    closed: bool,
}

/// Id-keyed store of responses shared between the receive loop and every
/// caller. Callers block on a condition variable instead of spinning; a
/// closed map releases them with an empty response.
#[derive(Clone)]
pub struct ResponseMap {
    inner: Arc<(Mutex<ResponseMapState>, Condvar)>,
}

impl Default for ResponseMap {
    fn default() -> ResponseMap {
        ResponseMap::new()
    }
}

impl ResponseMap {
    pub fn new() -> ResponseMap {
        ResponseMap {
            inner: Arc::new((
                Mutex::new(ResponseMapState {
                    entries: HashMap::new(),
                    closed: false,
                }),
                Condvar::new(),
            )),
        }
    }

    pub fn insert(&self, id: i32, response: Response) {
        let (lock, ready) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.entries.insert(id, response);
        ready.notify_all();
    }

    /// Removes and returns the response for `id`, if present.
    pub fn take(&self, id: i32) -> Option<Response> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap().entries.remove(&id)
    }

    /// Blocks until a response for `id` arrives and removes it. Returns an
    /// empty response if the interface shuts down first.
    pub fn take_blocking(&self, id: i32) -> Response {
        let (lock, ready) = &*self.inner;
        let mut state = lock.lock().unwrap();
        loop {
            if let Some(response) = state.entries.remove(&id) {
                return response;
            }
            if state.closed {
                return Response::default();
            }
            state = ready.wait(state).unwrap();
        }
    }

    /// Removes everything, for the shutdown sweep.
    pub fn drain(&self) -> Vec<(i32, Response)> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap().entries.drain().collect()
    }

    /// Marks the map closed and releases every blocked caller.
    pub fn close(&self) {
        let (lock, ready) = &*self.inner;
        lock.lock().unwrap().closed = true;
        ready.notify_all();
    }

    pub fn len(&self) -> usize {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
