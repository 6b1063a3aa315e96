//! Closed-loop localizer simulation: a simulated robot random-walks a
//! walled course while the particle filter tracks it from the same feed
//! messages the navigator would send, then the final estimate is compared
//! against ground truth.

use clap::Parser;
use crossbeam_channel::unbounded;
use failure::Error;
use indoor_robot_control::localizer::{self, BotFix, NavMessage, SimFeed};
use indoor_robot_control::robot::ai::ParticleLocalizer;
use indoor_robot_control::robot::map::{Cell, Map};
use indoor_robot_control::robot::sensors::offset_rig;
use indoor_robot_control::robot::{MotionNoise, SimRobot};
use indoor_robot_control::utility::{angle_between, Point, Pose};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "localizer_sim", about = "Particle-filter tracking simulation")]
struct Args {
    /// Number of feed messages to process.
    #[arg(short = 'n', long, default_value_t = 25)]
    steps: u32,
    /// Particle count.
    #[arg(long, default_value_t = 500)]
    particles: usize,
    /// Course size in cells per side.
    #[arg(long, default_value_t = 24)]
    cells: usize,
}

/// Square course with a wall around the perimeter.
fn walled_course(side: usize) -> Map {
    let mut cells = vec![Cell::default(); side * side];
    for i in 0..side {
        cells[i] = Cell::wall();
        cells[(side - 1) * side + i] = Cell::wall();
        cells[i * side] = Cell::wall();
        cells[i * side + side - 1] = Cell::wall();
    }
    Map::from_grid(cells, side, 1.0).expect("perimeter course is well formed")
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let map = Arc::new(walled_course(args.cells));
    let center = args.cells as f64 / 2.0;
    let seed = Pose::new(center, center, FRAC_PI_2);

    let truth_bot = SimRobot::new(seed, offset_rig(), MotionNoise::default(), map.clone());
    let mut feed = SimFeed::new(truth_bot, Duration::from_millis(0));
    let mut filter = ParticleLocalizer::from_pose(
        seed,
        offset_rig(),
        MotionNoise::default(),
        map,
        args.particles,
    );

    let fix = localizer::shared_fix(BotFix::from_pose(seed, true));
    let (tx, rx) = unbounded();
    let loop_fix = fix.clone();
    let localizer_thread = thread::spawn(move || localizer::run(&rx, &loop_fix, &mut filter));

    for step in 0..args.steps {
        let message = feed.next_message();
        tx.send(message)
            .map_err(|_| failure::err_msg("localizer feed closed early"))?;
        let estimate = fix.load();
        info!(
            step,
            truth = %feed.truth(),
            est_x = estimate.x,
            est_y = estimate.y,
            est_theta = estimate.theta,
            "step"
        );
    }
    tx.send(NavMessage::Die)
        .map_err(|_| failure::err_msg("localizer feed closed early"))?;
    localizer_thread
        .join()
        .map_err(|_| failure::err_msg("localizer thread panicked"))?;

    let truth = feed.truth();
    let estimate = fix.load();
    let position_error = truth
        .position
        .dist(Point {
            x: estimate.x,
            y: estimate.y,
        });
    let heading_error = angle_between(truth.angle, estimate.theta);
    info!(
        truth = %truth,
        est_x = estimate.x,
        est_y = estimate.y,
        position_error,
        heading_error,
        "final"
    );
    Ok(())
}
