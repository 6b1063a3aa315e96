//! Localizer process loop: binds the particle filter to the navigator's
//! feed queue and publishes the pose estimate for the planner and track
//! follower to read.

use crate::comm::{Accel, Response, UltrasonicReadings};
use crate::robot::ai::ParticleLocalizer;
use crate::robot::SimRobot;
use crate::utility::Pose;
use arc_swap::ArcSwap;
use crossbeam_channel::Receiver;
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// One message from the navigator: either the kill signal or an odometry
/// report paired with the sensor sweep taken after the motion.
#[derive(Debug, Clone)]
pub enum NavMessage {
    Die,
    Odometry {
        /// Heading change since the last report, radians.
        d_theta: f64,
        /// Distance rolled since the last report, length units.
        d_xy: f64,
        /// The full `sensors` response; only the ultrasonic block feeds
        /// the filter.
        sensors: Response,
        timestamp: Option<SystemTime>,
    },
}

/// Latest pose estimate, shared single-writer/many-readers.
#[derive(Debug, Clone, PartialEq)]
pub struct BotFix {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub dirty: bool,
}

impl BotFix {
    pub fn from_pose(pose: Pose, dirty: bool) -> BotFix {
        BotFix {
            x: pose.position.x,
            y: pose.position.y,
            theta: pose.angle,
            dirty,
        }
    }
}

pub type SharedFix = Arc<ArcSwap<BotFix>>;

pub fn shared_fix(initial: BotFix) -> SharedFix {
    Arc::new(ArcSwap::from_pointee(initial))
}

/// Consumes feed messages until `Die` (or a closed feed), driving the
/// filter and publishing each estimate with `dirty` cleared.
pub fn run(feed: &Receiver<NavMessage>, fix: &ArcSwap<BotFix>, filter: &mut ParticleLocalizer) {
    loop {
        let message = match feed.recv() {
            Ok(message) => message,
            Err(_) => {
                debug!("feed queue closed, exiting");
                return;
            }
        };
        match message {
            NavMessage::Die => {
                debug!("received die signal, exiting");
                return;
            }
            NavMessage::Odometry {
                d_theta,
                d_xy,
                sensors,
                ..
            } => {
                debug!(turn = d_theta, travel = d_xy, "odometry");
                let measured: HashMap<String, f64> = match sensors.ultrasonic {
                    Some(block) => block.as_map(),
                    None => {
                        warn!("odometry message without an ultrasonic block");
                        HashMap::new()
                    }
                };
                filter.advance(d_theta, d_xy);
                filter.update(&measured);
                let guess = filter.guess();
                debug!(
                    x = guess.position.x,
                    y = guess.position.y,
                    theta = guess.angle,
                    "pose estimate"
                );
                fix.store(Arc::new(BotFix::from_pose(guess, false)));
            }
        }
    }
}

/// Stand-in for the navigator feed: random bounded moves of a simulated
/// robot, packaged exactly like the real odometry messages.
pub struct SimFeed {
    bot: SimRobot,
    delay: Duration,
}

impl SimFeed {
    pub fn new(bot: SimRobot, delay: Duration) -> SimFeed {
        SimFeed { bot, delay }
    }

    /// Ground-truth pose of the simulated robot.
    pub fn truth(&self) -> Pose {
        self.bot.pose()
    }

    pub fn next_message(&mut self) -> NavMessage {
        let (turn, travel) = {
            let mut rng = thread_rng();
            (
                rng.gen_range(-FRAC_PI_2..FRAC_PI_2),
                rng.gen_range(0.0..2.0),
            )
        };
        self.bot.advance(turn, travel);
        let sensed = self.bot.sense();
        let reading = |name: &str| sensed.get(name).copied().unwrap_or_default();
        let sensors = Response {
            id: 0,
            result: Some(true),
            msg: Some("localizer sim feed".to_string()),
            heading: Some(self.bot.pose().angle),
            accel: Some(Accel {
                x: 0.0,
                y: 0.0,
                z: 980.0,
            }),
            ultrasonic: Some(UltrasonicReadings {
                front: reading("front"),
                left: reading("left"),
                right: reading("right"),
                back: reading("back"),
            }),
            ..Response::default()
        };
        if self.delay > Duration::from_millis(0) {
            thread::sleep(self.delay);
        }
        NavMessage::Odometry {
            d_theta: turn,
            d_xy: travel,
            sensors,
            timestamp: Some(SystemTime::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::map::{Cell, Map};
    use crate::robot::sensors::centered_rig;
    use crate::robot::MotionNoise;
    use crossbeam_channel::unbounded;

    fn open_map(cols: usize, rows: usize) -> Arc<Map> {
        Arc::new(Map::from_grid(vec![Cell::default(); cols * rows], cols, 1.0).unwrap())
    }

    #[test]
    fn loop_updates_the_fix_and_honors_die() {
        let map = open_map(10, 10);
        let seed = Pose::new(5.0, 5.0, 0.0);
        let mut filter = ParticleLocalizer::from_pose(
            seed,
            centered_rig(),
            MotionNoise::none(),
            map.clone(),
            100,
        );
        let fix = shared_fix(BotFix::from_pose(seed, true));
        let (tx, rx) = unbounded();

        let sentinel = map.diagonal();
        tx.send(NavMessage::Odometry {
            d_theta: 0.0,
            d_xy: 1.0,
            sensors: Response {
                ultrasonic: Some(UltrasonicReadings {
                    front: sentinel,
                    left: sentinel,
                    right: sentinel,
                    back: sentinel,
                }),
                ..Response::default()
            },
            timestamp: None,
        })
        .unwrap();
        tx.send(NavMessage::Die).unwrap();

        run(&rx, &fix, &mut filter);

        let latest = fix.load();
        assert!(!latest.dirty);
        assert!((latest.x - 6.0).abs() < 0.05);
        assert!((latest.y - 5.0).abs() < 0.05);
    }

    #[test]
    fn sim_feed_messages_carry_the_ultrasonic_block() {
        let map = open_map(10, 10);
        let bot = SimRobot::new(
            Pose::new(5.0, 5.0, 0.0),
            centered_rig(),
            MotionNoise::none(),
            map,
        );
        let mut feed = SimFeed::new(bot, Duration::from_millis(0));
        match feed.next_message() {
            NavMessage::Odometry { sensors, d_xy, .. } => {
                assert!(sensors.ultrasonic.is_some());
                assert!(d_xy >= 0.0 && d_xy < 2.0);
            }
            NavMessage::Die => panic!("sim feed should never emit die"),
        }
    }
}
