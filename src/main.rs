use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use std::time::{Duration, Instant};

use geo_rail_sim::{
    config::SimulationConfig,
    mapping::{PolylineRouteSource, RouteFeed},
    road::polyline::PolylineFile,
    simulation::{Controls, KinematicBody, RecoveryStrategy, RouteFollowingDriver, VehicleController},
};

const TICK_HZ: f32 = 60.0;
const TELEMETRY_EVERY_TICKS: u64 = 30;

#[derive(Parser)]
#[command(name = "geo-rail-sim")]
#[command(about = "Headless road-following vehicle simulation on a geographic polyline")]
struct Args {
    /// Simulation configuration file
    #[arg(short, long, default_value = "sim.toml")]
    config: String,

    /// Polyline the vehicle drives along
    #[arg(short, long, default_value = "route.toml")]
    route: String,

    /// How the vehicle is brought back when it leaves the road
    #[arg(long, value_enum, default_value_t = Strategy::Teleport)]
    strategy: Strategy,

    /// Simulated seconds to run
    #[arg(short = 't', long, default_value_t = 60.0)]
    seconds: f32,

    /// Autopilot cruise speed
    #[arg(long, default_value_t = 50.0)]
    cruise_kmh: f32,

    /// Length of road handed out per request, metres
    #[arg(long, default_value_t = 300.0)]
    window_m: f64,

    /// Standard deviation of noise added to the autopilot's steering input
    #[arg(long, default_value_t = 0.0)]
    steering_noise: f32,

    /// Random seed for reproducible steering noise
    #[arg(short, long)]
    seed: Option<u64>,

    /// Pace the loop to wall-clock time
    #[arg(long)]
    realtime: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Strategy {
    /// Teleport back onto the road after a short hold
    Teleport,
    /// Continuous spring-damper rail assist
    Rail,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();
    info!("Starting geo-rail-sim");

    let config = if Path::new(&args.config).exists() {
        info!("Loading simulation configuration from: {}", &args.config);
        SimulationConfig::load_from_file(&args.config)?
    } else {
        warn!("Config file '{}' not found, using defaults", &args.config);
        SimulationConfig::default()
    };

    let polyline = PolylineFile::load_from_file(&args.route)?;
    if polyline.points.len() < 2 {
        bail!("Route '{}' needs at least two points", &args.route);
    }
    info!("Loaded route '{}' with {} points", polyline.name, polyline.points.len());

    let source = PolylineRouteSource::new(polyline.points, args.window_m);
    let initial = source.initial_window();
    let feed = RouteFeed::spawn(source)?;

    let strategy = match args.strategy {
        Strategy::Teleport => RecoveryStrategy::Teleport,
        Strategy::Rail => RecoveryStrategy::continuous(&config),
    };

    let body = KinematicBody::new(config.vehicle.mass);
    let mut controller = VehicleController::new(body, &config, strategy)?;
    if controller.accept_geo_route(&initial) == 0 {
        bail!("Route '{}' produced no road segments", &args.route);
    }

    let mut driver = RouteFollowingDriver::new(
        args.cruise_kmh,
        config.vehicle.wheelbase,
        config.vehicle.max_steering_angle_deg,
    );

    let noise = Normal::new(0.0, args.steering_noise.max(0.0)).context("Invalid steering noise")?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let dt = 1.0 / TICK_HZ;
    let total_ticks = (args.seconds.max(0.0) * TICK_HZ) as u64;
    let started = Instant::now();
    let mut teleports = 0u32;
    let mut requests = 0u32;

    for tick in 0..total_ticks {
        while let Some(event) = feed.try_next() {
            event.apply_to(&mut controller);
        }

        let mut controls = driver.controls(controller.route(), controller.body());
        if args.steering_noise > 0.0 {
            controls = Controls::new(controls.throttle, controls.brake, controls.steering + noise.sample(&mut rng));
        }

        let report = controller.tick(controls, dt);
        if report.teleport.is_some() {
            teleports += 1;
        }
        if let Some(request) = report.road_request {
            requests += 1;
            if let Err(e) = feed.request(request) {
                controller.road_request_failed(&format!("{:#}", e));
            }
        }

        if tick % TELEMETRY_EVERY_TICKS == 0 {
            let t = controller.telemetry();
            let geo = t
                .geo_position
                .map(|p| format!("{:.6}, {:.6}", p.latitude, p.longitude))
                .unwrap_or_else(|| "-".to_string());
            info!(
                "t={:6.1}s pos=({:7.1}, {:7.1}) geo=({}) {:5.1} km/h hdg {:3} {:2} {} remaining {:6.1} m segments {}",
                t.time,
                t.position.x,
                t.position.y,
                geo,
                t.speed_kmh,
                t.heading_degrees,
                t.compass,
                if t.on_road { "on-road " } else { "OFF-ROAD" },
                t.remaining_road_m,
                t.segment_count
            );
        }

        if args.realtime {
            let target = Duration::from_secs_f32((tick + 1) as f32 * dt);
            if let Some(wait) = target.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
    }

    info!(
        "Finished {:.1} s ({} recovery): {} teleports, {} road requests, wall time {:.2?}",
        controller.time(),
        controller.strategy().name(),
        teleports,
        requests,
        started.elapsed()
    );

    Ok(())
}
