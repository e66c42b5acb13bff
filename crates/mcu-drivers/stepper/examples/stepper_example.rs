#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;
use stepper::{DdaEngine, MotorSegment, PreparedSegment, SegmentSlot, StepperBackend};

struct LoggingBackend;

impl StepperBackend for LoggingBackend {
    fn set_period(&mut self, ticks: u32) {
        defmt::info!("TIMER: period set to {} ticks", ticks);
    }
    fn load_segment(&mut self, segment: &PreparedSegment) {
        defmt::info!("LOAD: active_mask={:08b}", segment.active_mask);
    }
    fn motor_enable(&mut self, motor: usize, enabled: bool) {
        defmt::info!("MOTOR {}: enable={}", motor, enabled);
    }
    fn motor_direction(&mut self, motor: usize, forward: bool) {
        defmt::info!("MOTOR {}: direction forward={}", motor, forward);
    }
    fn step_pulse(&mut self, motor: usize) {
        defmt::info!("MOTOR {}: step", motor);
    }
}

static SLOT: SegmentSlot = SegmentSlot::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    defmt::info!("--- Stepper DDA Example ---");

    let mut engine = DdaEngine::<2>::new();
    let mut backend = LoggingBackend;

    let mut seg = PreparedSegment::default();
    seg.motors[0] = MotorSegment {
        substep_increment: 100,
        ticks: 5,
    };
    seg.motors[1] = MotorSegment {
        substep_increment: 60,
        ticks: 3,
    };
    seg.active_mask = 0b11;
    seg.direction_mask = 0b01;
    SLOT.publish(seg);

    for _ in 0..10 {
        engine.on_tick(&SLOT, &mut backend);
    }

    defmt::info!("--- Emergency stop ---");
    engine.emergency_stop(&mut backend);

    loop {
        cortex_m::asm::wfi();
    }
}
