//! The link capability: how bytes get to and from the motor board.
//!
//! The exchange loops depend only on [`LinkTx`]/[`LinkRx`]. Opening the
//! configured port yields the real serial implementation; when the port is
//! unavailable the interface degrades to a fake link that accepts every
//! command and synthesizes success responses, so the rest of the stack can
//! run off-robot.

use super::{CommConfig, Response, COMMAND_EOL};
use failure::Fail;
use serialport::prelude::*;
use serialport::ClearBuffer;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Fail)]
pub enum CommError {
    #[fail(display = "could not open serial port: {}", _0)]
    Open(String),
    #[fail(display = "serial i/o failed: {}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "link closed by peer")]
    Disconnected,
    #[fail(display = "malformed response line {:?}: {}", line, cause)]
    Parse {
        line: String,
        #[cause]
        cause: serde_json::Error,
    },
}

impl From<io::Error> for CommError {
    fn from(err: io::Error) -> CommError {
        CommError::Io(err)
    }
}

/// Outbound half of the link.
pub trait LinkTx: Send {
    /// Writes one command line, tagging it with `id` when the link is
    /// configured to prefix ids.
    fn send(&mut self, id: i32, command: &str) -> Result<(), CommError>;
}

/// Inbound half of the link.
pub trait LinkRx: Send {
    /// One receive attempt: `Ok(Some)` for a parsed response line,
    /// `Ok(None)` for a benign timeout or blank keepalive, `Err` when the
    /// link is no longer usable.
    fn recv(&mut self) -> Result<Option<Response>, CommError>;
}

struct SerialTx {
    port: Box<dyn SerialPort>,
    prefix_id: bool,
}

impl LinkTx for SerialTx {
    fn send(&mut self, id: i32, command: &str) -> Result<(), CommError> {
        let line = if self.prefix_id {
            format!("{} {}{}", id, command, COMMAND_EOL)
        } else {
            format!("{}{}", command, COMMAND_EOL)
        };
        debug!(target: "comm", "[SEND] {}", line.trim_end());
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}

struct SerialRx {
    reader: BufReader<Box<dyn SerialPort>>,
    /// Partial line carried across timeouts.
    pending: String,
}

impl LinkRx for SerialRx {
    fn recv(&mut self) -> Result<Option<Response>, CommError> {
        match self.reader.read_line(&mut self.pending) {
            Ok(0) => Err(CommError::Disconnected),
            Ok(_) => {
                let line = self.pending.trim().to_string();
                self.pending.clear();
                if line.is_empty() {
                    return Ok(None);
                }
                debug!(target: "comm", "[RECV] {}", line);
                match serde_json::from_str(&line) {
                    Ok(response) => Ok(Some(response)),
                    Err(cause) => Err(CommError::Parse { line, cause }),
                }
            }
            Err(err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(err) => Err(CommError::Io(err)),
        }
    }
}

/// Ids sent but not yet answered, shared between the fake halves. A FIFO
/// rather than a single slot, so back-to-back sends cannot strand a caller.
type FakeBacklog = Arc<Mutex<VecDeque<i32>>>;

struct FakeTx {
    backlog: FakeBacklog,
    prefix_id: bool,
    fake_delay: Duration,
}

impl LinkTx for FakeTx {
    fn send(&mut self, id: i32, command: &str) -> Result<(), CommError> {
        if self.prefix_id {
            debug!(target: "comm", "[FAKE-SEND] {} {}", id, command);
        } else {
            debug!(target: "comm", "[FAKE-SEND] {}", command);
        }
        self.backlog.lock().unwrap().push_back(id);
        thread::sleep(self.fake_delay);
        Ok(())
    }
}

struct FakeRx {
    backlog: FakeBacklog,
    poll: Duration,
    fake_delay: Duration,
}

impl LinkRx for FakeRx {
    fn recv(&mut self) -> Result<Option<Response>, CommError> {
        for _ in 0..10 {
            if let Some(id) = self.backlog.lock().unwrap().pop_front() {
                thread::sleep(self.fake_delay);
                let response = Response::fake_success(id);
                debug!(target: "comm", "[FAKE-RECV] {:?}", response);
                return Ok(Some(response));
            }
            thread::sleep(self.poll);
        }
        Ok(None)
    }
}

/// A fake link that answers every sent id with a success response.
pub fn fake_link(cfg: &CommConfig) -> (Box<dyn LinkTx>, Box<dyn LinkRx>) {
    let backlog: FakeBacklog = Arc::new(Mutex::new(VecDeque::new()));
    (
        Box::new(FakeTx {
            backlog: backlog.clone(),
            prefix_id: cfg.prefix_id,
            fake_delay: cfg.fake_delay,
        }),
        Box::new(FakeRx {
            backlog,
            poll: cfg.timeout / 10,
            fake_delay: cfg.fake_delay,
        }),
    )
}

fn open_serial(cfg: &CommConfig) -> Result<(Box<dyn LinkTx>, Box<dyn LinkRx>), CommError> {
    let mut settings = SerialPortSettings::default();
    settings.baud_rate = cfg.baudrate;
    settings.timeout = cfg.timeout;
    let port = serialport::open_with_settings(&cfg.port, &settings)
        .map_err(|err| CommError::Open(err.to_string()))?;
    port.clear(ClearBuffer::All)
        .map_err(|err| CommError::Open(err.to_string()))?;
    let reader = port
        .try_clone()
        .map_err(|err| CommError::Open(err.to_string()))?;
    info!(
        port = %cfg.port,
        baudrate = cfg.baudrate,
        timeout_secs = cfg.timeout.as_secs_f64(),
        "serial port open"
    );
    Ok((
        Box::new(SerialTx {
            port,
            prefix_id: cfg.prefix_id,
        }),
        Box::new(SerialRx {
            reader: BufReader::new(reader),
            pending: String::new(),
        }),
    ))
}

/// Opens the configured serial port, falling back to the fake link when the
/// port cannot be opened.
pub fn open_link(cfg: &CommConfig) -> (Box<dyn LinkTx>, Box<dyn LinkRx>) {
    match open_serial(cfg) {
        Ok(link) => link,
        Err(err) => {
            warn!(port = %cfg.port, "trouble opening serial port: {}", err);
            warn!("faking serial communications");
            fake_link(cfg)
        }
    }
}
