//! Polls the full sensor sweep in a loop, until Ctrl+C or the read limit.

use clap::Parser;
use failure::Error;
use indoor_robot_control::comm::{CommConfig, SerialInterface};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "read_sensors", about = "Fetch sensor data in a loop")]
struct Args {
    /// Max number of sensor sweeps to fetch.
    #[arg(short = 'n', default_value_t = 100)]
    max_reads: u32,
    /// Serial port to open; falls back to fake mode when unavailable.
    port: Option<String>,
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

    let interface = SerialInterface::new(cfg);
    let reader = interface.commander();
    let handle = interface.start();

    let live = Arc::new(AtomicBool::new(true));
    let on_signal = live.clone();
    ctrlc::set_handler(move || on_signal.store(false, Ordering::SeqCst))?;

    for sweep in 0..args.max_reads {
        if !live.load(Ordering::SeqCst) {
            break;
        }
        let data = reader.sensors();
        println!("[{}] sensor data: {:?}", sweep, data);
    }

    reader.quit();
    handle.join();
    Ok(())
}
