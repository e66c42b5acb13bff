use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stepper::{DdaEngine, MotorSegment, PreparedSegment, SegmentSlot, StepperBackend};

#[derive(Default)]
struct NullBackend;

impl StepperBackend for NullBackend {
    fn set_period(&mut self, _ticks: u32) {}
    fn load_segment(&mut self, _segment: &PreparedSegment) {}
    fn motor_enable(&mut self, _motor: usize, _enabled: bool) {}
    fn motor_direction(&mut self, _motor: usize, _forward: bool) {}
    fn step_pulse(&mut self, _motor: usize) {}
}

fn benchmark_dda_tick(c: &mut Criterion) {
    let slot = SegmentSlot::new();
    let mut engine = DdaEngine::<4>::new();
    let mut backend = NullBackend;

    let mut seg = PreparedSegment::default();
    for i in 0..4 {
        seg.motors[i] = MotorSegment {
            substep_increment: 100 + i as i32 * 7,
            ticks: 1_000_000,
        };
    }
    seg.active_mask = 0b1111;
    seg.direction_mask = 0b0101;
    slot.publish(seg);

    c.bench_function("dda_on_tick", |b| {
        b.iter(|| {
            engine.on_tick(black_box(&slot), black_box(&mut backend));
        })
    });
}

criterion_group!(benches, benchmark_dda_tick);
criterion_main!(benches);
