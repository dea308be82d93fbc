use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo_rail_sim::{
    config::SimulationConfig,
    road::{RoadSegment, Route},
    simulation::{Controls, CorridorTracker, KinematicBody, RecoveryStrategy, RouteFollowingDriver, Vec2, Vec3, VehicleController},
};

/// A gently winding road, `count` segments of 10 m heading roughly north.
fn winding_route(count: usize) -> Route {
    let mut segments = Vec::with_capacity(count);
    let mut start = Vec2::zeros();
    for i in 0..count {
        let heading = (i as f32 * 0.05).sin() * 0.4;
        let end = start + Vec2::new(heading.sin(), heading.cos()) * 10.0;
        segments.push(RoadSegment::new(start, end, 2, 3.0).expect("valid segment"));
        start = end;
    }
    Route::new(segments)
}

fn benchmark_controller_tick(c: &mut Criterion) {
    let config = SimulationConfig::default();
    let dt = 1.0 / 60.0;

    let strategies = [
        ("teleport", RecoveryStrategy::Teleport),
        ("rail_assist", RecoveryStrategy::continuous(&config)),
    ];

    let mut group = c.benchmark_group("controller_tick");
    for (name, strategy) in strategies {
        let mut controller = VehicleController::new(KinematicBody::new(config.vehicle.mass), &config, strategy)
            .expect("Failed to build controller");
        controller.replace_route(winding_route(500));
        let mut driver = RouteFollowingDriver::new(60.0, config.vehicle.wheelbase, config.vehicle.max_steering_angle_deg);

        // Get up to speed before measuring
        for _ in 0..600 {
            let controls = driver.controls(controller.route(), controller.body());
            controller.tick(controls, dt);
        }

        group.bench_function(name, |b| {
            b.iter(|| {
                let controls = driver.controls(controller.route(), controller.body());
                black_box(controller.tick(black_box(controls), dt));
            })
        });
    }
    group.finish();
}

fn benchmark_corridor_scaling(c: &mut Criterion) {
    let config = SimulationConfig::default();
    let mut group = c.benchmark_group("corridor_full_scan");

    for count in [10usize, 100, 1000, 5000].iter() {
        let mut tracker = CorridorTracker::new(config.corridor.clone()).with_route(winding_route(*count));

        // Far off the road: no fast path, every segment is scanned
        group.bench_with_input(format!("{}_segments", count), count, |b, _count| {
            b.iter(|| black_box(tracker.check(black_box(Vec3::new(500.0, -500.0, 0.0)), 50.0)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_controller_tick, benchmark_corridor_scaling);
criterion_main!(benches);
