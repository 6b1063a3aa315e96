//! Multiplexer scenarios over fake and scripted links.

use crossbeam_channel::bounded;
use indoor_robot_control::comm::{
    fake_link, CommConfig, CommError, LinkRx, LinkTx, MuxHandle, Response, SerialInterface, NO_ID,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn quick_cfg() -> CommConfig {
    CommConfig {
        timeout: Duration::from_millis(100),
        fake_delay: Duration::from_micros(200),
        servo_delay: Duration::from_millis(1),
        ..CommConfig::default()
    }
}

/// Joins the handle but fails the test if shutdown takes longer than
/// `limit`.
fn join_within(handle: MuxHandle, limit: Duration) {
    let (done_tx, done_rx) = bounded(1);
    thread::spawn(move || {
        handle.join();
        let _ = done_tx.send(());
    });
    done_rx
        .recv_timeout(limit)
        .expect("serial interface did not shut down in time");
}

/// Three concurrent callers hammer a fake-mode interface; every call
/// succeeds with its own id and nothing is left behind.
#[test]
fn concurrent_callers_in_fake_mode_all_succeed() {
    let cfg = quick_cfg();
    let interface = SerialInterface::new(cfg.clone());
    let responses = interface.response_map();
    let commander = interface.commander();
    let (tx, rx) = fake_link(&cfg);
    let handle = interface.start_with_link(tx, rx);

    let (done_tx, done_rx) = bounded(3);
    for _ in 0..3 {
        let caller = commander.clone();
        let done = done_tx.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                let id = caller.put("move 400 1000");
                let response = caller.get(id, true).expect("blocking get returns");
                assert_eq!(response.result, Some(true));
                assert_eq!(response.id, id);
            }
            let _ = done.send(());
        });
    }
    for _ in 0..3 {
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("caller did not finish in time");
    }

    assert!(responses.is_empty(), "responses left unclaimed");
    commander.quit();
    join_within(handle, Duration::from_secs(2));
}

/// A response is delivered exactly once: the second fetch comes back
/// empty.
#[test]
fn responses_pop_at_most_once() {
    let cfg = quick_cfg();
    let interface = SerialInterface::new(cfg.clone());
    let commander = interface.commander();
    let (tx, rx) = fake_link(&cfg);
    let handle = interface.start_with_link(tx, rx);

    let id = commander.put("stop");
    let first = commander.get(id, true);
    assert!(first.is_some());
    assert!(commander.get(id, false).is_none());

    commander.quit();
    join_within(handle, Duration::from_secs(2));
}

/// Domain wrappers in fake mode: success responses everywhere, echoed
/// inputs where the fake reply has no data fields.
#[test]
fn wrappers_degrade_to_echoed_inputs_in_fake_mode() {
    let cfg = quick_cfg();
    let interface = SerialInterface::new(cfg.clone());
    let commander = interface.commander();
    let (tx, rx) = fake_link(&cfg);
    let handle = interface.start_with_link(tx, rx);

    assert!(commander.stop());
    assert!(commander.compass_reset());
    // The fake response carries no distance field, so the wrapper echoes
    // the request (within one encoder count).
    let achieved = commander.drive(1.0, 400);
    assert!((achieved - 1.0).abs() < 1e-3);
    let turned = commander.turn_rel(0.5);
    assert!((turned - 0.5).abs() < 1e-3);

    commander.quit();
    join_within(handle, Duration::from_secs(2));
}

/// Quit terminates the loops and closes the link within the configured
/// timeout.
#[test]
fn quit_shuts_down_within_the_timeout() {
    let cfg = quick_cfg();
    let interface = SerialInterface::new(cfg.clone());
    let commander = interface.commander();
    let (tx, rx) = fake_link(&cfg);
    let handle = interface.start_with_link(tx, rx);

    commander.quit();
    commander.quit(); // idempotent
    join_within(handle, Duration::from_secs(2));
}

/// Sequential mode services commands one at a time through the same
/// public surface.
#[test]
fn sequential_mode_round_trips() {
    let mut cfg = quick_cfg();
    cfg.sequential = true;
    let interface = SerialInterface::new(cfg.clone());
    let commander = interface.commander();
    let (tx, rx) = fake_link(&cfg);
    let handle = interface.start_with_link(tx, rx);

    for _ in 0..5 {
        let response = commander.run("sensor 3");
        assert_eq!(response.result, Some(true));
    }

    commander.quit();
    join_within(handle, Duration::from_secs(2));
}

/// Scripted link: echoes each sent id back as a success response, except
/// the first reply which omits its id the way legacy firmware does.
struct ScriptState {
    sent: Mutex<VecDeque<i32>>,
    legacy_first: AtomicBool,
}

struct ScriptTx(Arc<ScriptState>);

impl LinkTx for ScriptTx {
    fn send(&mut self, id: i32, _command: &str) -> Result<(), CommError> {
        self.0.sent.lock().unwrap().push_back(id);
        Ok(())
    }
}

struct ScriptRx(Arc<ScriptState>);

impl LinkRx for ScriptRx {
    fn recv(&mut self) -> Result<Option<Response>, CommError> {
        let sent = self.0.sent.lock().unwrap().pop_front();
        match sent {
            Some(id) => {
                if self.0.legacy_first.swap(false, Ordering::SeqCst) {
                    // Id-less legacy line: parsed with the default id.
                    Ok(Some(Response {
                        result: Some(true),
                        ..Response::default()
                    }))
                } else {
                    Ok(Some(Response::fake_success(id)))
                }
            }
            None => {
                thread::sleep(Duration::from_millis(5));
                Ok(None)
            }
        }
    }
}

/// An id-less legacy response lands under −1 and is fetched through the
/// legacy path; id-bearing responses afterwards are unaffected.
#[test]
fn legacy_idless_responses_land_under_minus_one() {
    let cfg = quick_cfg();
    let interface = SerialInterface::new(cfg);
    let commander = interface.commander();
    let state = Arc::new(ScriptState {
        sent: Mutex::new(VecDeque::new()),
        legacy_first: AtomicBool::new(true),
    });
    let handle = interface.start_with_link(
        Box::new(ScriptTx(state.clone())),
        Box::new(ScriptRx(state)),
    );

    let legacy_id = commander.put("compass_reset");
    let legacy = commander.get(NO_ID, true).expect("legacy response arrives");
    assert_eq!(legacy.id, NO_ID);
    assert_eq!(legacy.result, Some(true));
    // The legacy command's own id never shows up in the map.
    assert!(commander.get(legacy_id, false).is_none());

    let modern = commander.run("stop");
    assert!(modern.id >= 0);
    assert_eq!(modern.result, Some(true));

    commander.quit();
    join_within(handle, Duration::from_secs(2));
}
