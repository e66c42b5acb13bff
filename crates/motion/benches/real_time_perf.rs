// Measures the worst-case per-segment cost of the LO-priority path
// (segment runtime `next_segment` + prep `prepare_segment`), which must
// complete within one `NOM_SEGMENT_TIME` so the next DDA load never starves.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::kinematics::AXES;
use motion::prep::{prepare_segment, CorrectionState};
use motion::runtime::SegmentRuntime;
use motion::trapezoid::compute_trapezoid;
use motion::GCodeState;
use stepper::MAX_MOTORS;

fn unit_x() -> [f32; AXES] {
    let mut u = [0.0; AXES];
    u[0] = 1.0;
    u
}

fn bench_segment_exec_prep(c: &mut Criterion) {
    let steps_per_unit = [80.0f64; AXES];
    let following_error = [0.0f64; MAX_MOTORS];

    c.bench_function("segment_exec_and_prep", |b| {
        b.iter(|| {
            let mut mr = SegmentRuntime::new();
            let trapezoid = compute_trapezoid(200.0, 0.0, 300.0, 0.0, 5_000_000.0);
            mr.load_block(&trapezoid, unit_x(), [0.0; AXES], 5_000_000.0, GCodeState::default());
            let mut corrections = CorrectionState::new();
            while let Some(seg) = mr.next_segment() {
                let prepared = prepare_segment(
                    black_box(&seg),
                    black_box(&steps_per_unit),
                    black_box(&following_error),
                    &mut corrections,
                    50_000.0,
                );
                black_box(prepared);
            }
        })
    });
}

criterion_group!(benches, bench_segment_exec_prep);
criterion_main!(benches);
