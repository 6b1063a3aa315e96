//! Interactive exerciser for the serial multiplexer.
//!
//! Opens the given port (or the default) and drops into a
//! read-eval-command loop; every line typed is sent raw over the
//! multiplexer and its response printed. With no board attached the
//! interface runs in fake mode, which makes this a handy offline smoke
//! test.

use clap::Parser;
use failure::Error;
use indoor_robot_control::comm::{CommConfig, SerialInterface};
use std::io::{self, BufRead};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serial_shell", about = "Interactive serial-multiplexer shell")]
struct Args {
    /// Serial port to open; falls back to fake mode when unavailable.
    port: Option<String>,
    /// Baud rate.
    baudrate: Option<u32>,
    /// Read timeout in seconds.
    timeout: Option<f64>,
    /// Run commands strictly one at a time (send, then wait).
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut cfg = CommConfig::default();
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(baudrate) = args.baudrate {
        cfg.baudrate = baudrate;
    }
    if let Some(timeout) = args.timeout {
        cfg.timeout = Duration::from_secs_f64(timeout);
    }
    cfg.sequential = args.sequential;

    let interface = SerialInterface::new(cfg);
    let shell = interface.commander();
    let on_signal = interface.commander();
    let handle = interface.start();

    ctrlc::set_handler(move || on_signal.quit())?;

    println!("interactive session; Ctrl+D or \"quit\" to end");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "quit" {
            break;
        }
        let response = shell.run(command);
        println!("device: {:?}", response);
    }

    shell.quit();
    handle.join();
    Ok(())
}
