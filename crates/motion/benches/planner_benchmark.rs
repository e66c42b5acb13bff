use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::kinematics::{AxisConfig, AXES};
use motion::{GCodeState, Planner};

fn axes() -> [AxisConfig; AXES] {
    let mut cfg = AxisConfig::default();
    cfg.max_velocity = 500.0;
    cfg.max_jerk = 50_000_000.0;
    [cfg; AXES]
}

fn benchmark_mp_aline(c: &mut Criterion) {
    let axes = axes();

    c.bench_function("mp_aline_fill_ring", |b| {
        b.iter(|| {
            let mut planner = Planner::new();
            let mut target = [0.0f32; AXES];
            for i in 1..20 {
                target[0] = i as f32 * 5.0;
                target[1] = (i % 3) as f32 * 5.0;
                let _ = planner.mp_aline(
                    black_box(target),
                    black_box(300.0),
                    black_box(&axes),
                    GCodeState::default(),
                );
            }
        })
    });
}

criterion_group!(benches, benchmark_mp_aline);
criterion_main!(benches);
