//! The serial interface loops.
//!
//! Pipelined mode (the default) runs a send loop and a receive loop on
//! separate threads: sends stay FIFO, responses are matched by id, and the
//! firmware is trusted to echo ids. Sequential mode runs one exec loop that
//! completes each command before popping the next.

use super::transport::{LinkRx, LinkTx};
use super::{Command, CommConfig, ResponseMap, SerialCommand};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

pub struct SerialInterface {
    cfg: CommConfig,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    responses: ResponseMap,
}

impl SerialInterface {
    pub fn new(cfg: CommConfig) -> SerialInterface {
        let (commands_tx, commands_rx) = bounded(cfg.queue_capacity);
        SerialInterface {
            cfg,
            commands_tx,
            commands_rx,
            responses: ResponseMap::new(),
        }
    }

    /// A command façade bound to this interface. Any number of commanders
    /// may coexist; the queue and response map are shared.
    pub fn commander(&self) -> SerialCommand {
        SerialCommand::new(
            self.cfg.clone(),
            self.commands_tx.clone(),
            self.responses.clone(),
        )
    }

    /// The shared response store, mostly useful for diagnostics.
    pub fn response_map(&self) -> ResponseMap {
        self.responses.clone()
    }

    /// Opens the configured port (or the fake fallback) and runs the
    /// exchange loops on a background thread.
    pub fn start(self) -> MuxHandle {
        let (tx, rx) = super::transport::open_link(&self.cfg);
        self.start_with_link(tx, rx)
    }

    /// Runs the exchange loops over an explicit link, which lets tests
    /// inject scripted or fake transports.
    pub fn start_with_link(self, link_tx: Box<dyn LinkTx>, link_rx: Box<dyn LinkRx>) -> MuxHandle {
        let handle = thread::Builder::new()
            .name("serial-mux".to_string())
            .spawn(move || self.run(link_tx, link_rx))
            .expect("failed to spawn serial-mux thread");
        MuxHandle { handle }
    }

    fn run(self, link_tx: Box<dyn LinkTx>, link_rx: Box<dyn LinkRx>) {
        if self.cfg.sequential {
            info!("starting exec loop (sequential mode)");
            exec_loop(&self.commands_rx, link_tx, link_rx, &self.responses);
            info!("exec loop terminated");
        } else {
            info!("starting send and receive loops");
            let live = Arc::new(AtomicBool::new(true));
            let (fatal_tx, fatal_rx) = bounded::<()>(1);
            let recv_live = live.clone();
            let recv_responses = self.responses.clone();
            let receiver = thread::Builder::new()
                .name("serial-recv".to_string())
                .spawn(move || recv_loop(link_rx, &recv_responses, &recv_live, &fatal_tx))
                .expect("failed to spawn serial-recv thread");
            send_loop(&self.commands_rx, link_tx, &fatal_rx);
            // Quit observed (or the receiver died): stop the receive loop,
            // which wakes on its next read timeout.
            live.store(false, Ordering::SeqCst);
            if receiver.join().is_err() {
                error!("receive loop panicked");
            }
            info!("send and receive loops terminated");
        }

        // Clean up: log anything that never made it out or back.
        let mut pending = 0usize;
        while let Ok(command) = self.commands_rx.try_recv() {
            if let Command::Request { id, text } = command {
                warn!(id, command = %text, "terminated with pending command");
                pending += 1;
            }
        }
        let unfetched = self.responses.drain();
        for (id, response) in &unfetched {
            warn!(id = *id, ?response, "terminated with unfetched response");
        }
        self.responses.close();
        info!(
            pending_commands = pending,
            unfetched_responses = unfetched.len(),
            "serial interface closed"
        );
    }
}

/// Handle to a running interface; joining it blocks until the loops have
/// unwound and the port is closed.
pub struct MuxHandle {
    handle: thread::JoinHandle<()>,
}

impl MuxHandle {
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("serial interface thread panicked");
        }
    }
}

/// Pops commands and writes them to the wire in FIFO order until the quit
/// sentinel arrives or the receive loop reports a fatal error.
fn send_loop(commands: &Receiver<Command>, mut link: Box<dyn LinkTx>, fatal: &Receiver<()>) {
    loop {
        crossbeam_channel::select! {
            recv(commands) -> command => match command {
                Ok(Command::Quit) | Err(_) => {
                    info!("send loop: quit");
                    return;
                }
                Ok(Command::Request { id, text }) => {
                    // Write errors are transient: log and keep servicing.
                    if let Err(err) = link.send(id, &text) {
                        warn!(id, command = %text, "send failed: {}", err);
                    }
                }
            },
            recv(fatal) -> _ => {
                warn!("send loop: receive loop reported a fatal error");
                return;
            }
        }
    }
}

/// Collects response lines and stores them by their echoed id (`NO_ID` when
/// the firmware omits one). A fatal receive error stops both loops.
fn recv_loop(
    mut link: Box<dyn LinkRx>,
    responses: &ResponseMap,
    live: &AtomicBool,
    fatal: &Sender<()>,
) {
    while live.load(Ordering::SeqCst) {
        match link.recv() {
            Ok(Some(response)) => responses.insert(response.id, response),
            Ok(None) => {} // timeout or blank keepalive
            Err(err) => {
                error!("receive loop: {}", err);
                let _ = fatal.try_send(());
                return;
            }
        }
    }
    info!("receive loop: quit");
}

/// Sequential mode: send, then wait out blank keepalives until this
/// command's response arrives. Responses without an id are stored under the
/// sent id, which is unambiguous here.
fn exec_loop(
    commands: &Receiver<Command>,
    mut tx: Box<dyn LinkTx>,
    mut rx: Box<dyn LinkRx>,
    responses: &ResponseMap,
) {
    loop {
        match commands.recv() {
            Ok(Command::Quit) | Err(_) => return,
            Ok(Command::Request { id, text }) => {
                if let Err(err) = tx.send(id, &text) {
                    warn!(id, command = %text, "send failed: {}", err);
                    continue;
                }
                loop {
                    match rx.recv() {
                        Ok(Some(response)) => {
                            let key = if response.id >= 0 { response.id } else { id };
                            responses.insert(key, response);
                            break;
                        }
                        Ok(None) => {} // keep waiting for this command's reply
                        Err(err) => {
                            error!("exec loop: {}", err);
                            return;
                        }
                    }
                }
            }
        }
    }
}
