//! # RTIC-based firmware entry point
//!
//! The §5 HI/LO/foreground split, mapped onto RTIC tasks:
//!
//! - **HI** (`dda_isr`, priority 3, binds `TIM2`): drives
//!   [`stepper::DdaEngine`] one tick at a time, taking prepared segments
//!   from the [`stepper::SegmentSlot`] published by the LO side.
//! - **LO** (`exec_prep_task`, priority 2, software task): pulls the next
//!   buffer out of the planner, runs it through [`motion::SegmentRuntime`]
//!   and [`motion::prep::prepare_segment`], and publishes the result to the
//!   slot.
//! - **Foreground** (`idle`): the non-realtime dispatcher. Feeds the
//!   watchdog, polls the safety monitor, and toggles the liveness LED.
//!
//! `usart_task` sits alongside at LO priority, framing incoming bytes with
//! [`proto::framing::LineFramer`]; complete lines are out of this crate's
//! scope (§1 excludes the tokenizer), so they are only acknowledged here.

#![allow(unused_imports)]

#[rtic::app(device = stm32f4xx_hal::pac, dispatchers = [EXTI0, EXTI1, EXTI2, EXTI3])]
mod app {
    use stm32f4xx_hal::{
        gpio::{gpioa, gpiob, gpioc, gpiod, Output, PushPull},
        pac::{TIM2, USART1},
        prelude::*,
        serial::{Config as SerialConfig, Event as SerialEvent, Rx, Serial, Tx},
        timer::{CounterUs, Event as TimerEvent},
        watchdog::IndependentWatchdog,
    };
    use rtic_monotonics::{systick::*, Monotonic};

    use motion::kinematics::AXES;
    use motion::planner::MoveType;
    use motion::prep::{self, CorrectionState};
    use motion::{Planner, SegmentRuntime};
    use proto::framing::{Frame, ImmediateControl, LineFramer};
    use stepper::{DdaEngine, PreparedSegment, SegmentSlot, StepperBackend, MAX_MOTORS};

    use crate::safety::{FollowingErrorMonitor, SafetyMonitor};

    type LedPin = gpiod::PD12<Output<PushPull>>;
    type StepPin = gpioa::PA0<Output<PushPull>>;
    type DirPin = gpiob::PB0<Output<PushPull>>;
    type EnablePin = gpioc::PC0<Output<PushPull>>;

    /// Segment hand-off between [`exec_prep_task`] and [`dda_isr`]. A
    /// `static` rather than an RTIC resource: its whole point is the
    /// lock-free owner-flag protocol, not framework-mediated mutual
    /// exclusion.
    static SEGMENT_SLOT: SegmentSlot = SegmentSlot::new();

    /// Hardware-backed [`StepperBackend`]. Pins are `Option` because only
    /// the axes this board actually wires up are populated; unpopulated
    /// motors are silently inert.
    struct GpioBackend {
        step: [Option<StepPin>; MAX_MOTORS],
        dir: [Option<DirPin>; MAX_MOTORS],
        enable: [Option<EnablePin>; MAX_MOTORS],
    }

    impl StepperBackend for GpioBackend {
        fn set_period(&mut self, _ticks: u32) {
            // The DDA tick period is carried by TIM2's auto-reload value,
            // which `dda_isr` itself reprograms; no per-motor state here.
        }

        fn load_segment(&mut self, _segment: &PreparedSegment) {}

        fn motor_enable(&mut self, motor: usize, enabled: bool) {
            if let Some(Some(pin)) = self.enable.get_mut(motor) {
                // Most stepper drivers enable on a low ENABLE line.
                if enabled {
                    pin.set_low();
                } else {
                    pin.set_high();
                }
            }
        }

        fn motor_direction(&mut self, motor: usize, forward: bool) {
            if let Some(Some(pin)) = self.dir.get_mut(motor) {
                pin.set_state(forward.into());
            }
        }

        fn step_pulse(&mut self, motor: usize) {
            if let Some(Some(pin)) = self.step.get_mut(motor) {
                pin.set_high();
                pin.set_low();
            }
        }
    }

    #[shared]
    struct Shared {
        usart_tx: Tx<USART1>,
    }

    #[local]
    struct Local {
        led: LedPin,
        dda: DdaEngine<{ AXES }>,
        backend: GpioBackend,
        stepper_timer: CounterUs<TIM2>,
        usart_rx: Rx<USART1>,
        framer: LineFramer,
        planner: Planner,
        runtime: SegmentRuntime,
        corrections: CorrectionState,
        safety: SafetyMonitor<{ AXES }>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("RTIC init");
        let dp = cx.device;

        let rcc = dp.RCC.constrain();
        let clocks = rcc.cfgr.use_hse(8.MHz()).sysclk(168.MHz()).freeze();

        let systick_mono_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, clocks.hclk().0, systick_mono_token);

        let gpiod = dp.GPIOD.split();
        let mut led = gpiod.pd12.into_push_pull_output();
        led.set_high();

        let gpioa = dp.GPIOA.split();
        let tx_pin = gpioa.pa9.into_alternate();
        let rx_pin = gpioa.pa10.into_alternate();
        let serial_config = SerialConfig::default().baudrate(250_000.bps());
        let (usart_tx, mut usart_rx) =
            Serial::new(dp.USART1, (tx_pin, rx_pin), serial_config, &clocks)
                .unwrap()
                .split();
        usart_rx.listen(SerialEvent::Rxne);

        let mut stepper_timer = dp.TIM2.counter_us(&clocks);
        stepper_timer.listen(TimerEvent::Update);

        let watchdog = IndependentWatchdog::new(dp.IWDG);
        let following_error_monitors = [FollowingErrorMonitor::new(4.0); AXES];
        let safety = SafetyMonitor::new(following_error_monitors, watchdog);

        exec_prep_task::spawn().ok();

        defmt::info!("RTIC init complete");

        (
            Shared { usart_tx },
            Local {
                led,
                dda: DdaEngine::new(),
                backend: GpioBackend {
                    step: Default::default(),
                    dir: Default::default(),
                    enable: Default::default(),
                },
                stepper_timer,
                usart_rx,
                framer: LineFramer::new(),
                planner: Planner::new(),
                runtime: SegmentRuntime::new(),
                corrections: CorrectionState::new(),
                safety,
            },
        )
    }

    /// Foreground dispatcher. Feeds the watchdog and flashes the liveness
    /// LED; drops to solid-off once an emergency stop is active so a
    /// stopped board is visually distinguishable from a hung one.
    #[idle(local = [led, safety])]
    fn idle(cx: idle::Context) -> ! {
        loop {
            cx.local.safety.feed_watchdog();
            if cx.local.safety.is_emergency_stop_active() {
                cx.local.led.set_low();
            } else {
                cx.local.led.toggle();
            }
            Systick::delay(500.millis()).unwrap();
        }
    }

    /// HI priority: advances the DDA by one tick per TIM2 update, the
    /// fixed-rate overclocked step clock of §4.A.
    #[task(binds = TIM2, local = [dda, backend, stepper_timer], priority = 3)]
    fn dda_isr(cx: dda_isr::Context) {
        cx.local.stepper_timer.clear_interrupt(TimerEvent::Update);
        cx.local.dda.on_tick(&SEGMENT_SLOT, cx.local.backend);
    }

    /// LO priority: runs the next queued planner buffer through segment
    /// runtime and prep, publishing each resulting segment to the HI side.
    /// Loops forever, polling the planner when it is empty.
    #[task(local = [planner, runtime, corrections], priority = 2)]
    async fn exec_prep_task(cx: exec_prep_task::Context) {
        let steps_per_unit = [200.0 * 16.0 / 1.25; AXES];
        let following_error = [0.0f64; MAX_MOTORS];

        loop {
            let Some(buf) = cx.local.planner.run_next() else {
                Systick::delay(1.millis()).await;
                continue;
            };

            if matches!(buf.move_type, MoveType::Aline) {
                let trapezoid = buf.trapezoid();
                cx.local.runtime.load_block(
                    &trapezoid,
                    buf.unit_vector,
                    [0.0; AXES],
                    buf.jerk,
                    buf.gcode_state,
                );
                while let Some(seg) = cx.local.runtime.next_segment() {
                    let prepared = prep::prepare_segment(
                        &seg,
                        &steps_per_unit,
                        &following_error,
                        cx.local.corrections,
                        50_000.0,
                    );
                    while !SEGMENT_SLOT.publish(prepared) {
                        Systick::delay(1.millis()).await;
                    }
                }
            }

            cx.local.planner.free_running();
        }
    }

    /// Communication task: each incoming byte is fed to the line framer.
    /// Immediate controls act on the spot; complete lines would be handed
    /// to a G-code tokenizer upstream of this crate in a full build — out
    /// of scope here per §1 (this crate consumes typed canonical commands,
    /// not raw text).
    #[task(binds = USART1, local = [usart_rx, framer], priority = 2)]
    fn usart_task(cx: usart_task::Context) {
        if let Ok(byte) = cx.local.usart_rx.read() {
            match cx.local.framer.push(byte) {
                Ok(Some(Frame::Immediate(ImmediateControl::FeedHold))) => {
                    defmt::warn!("feedhold requested over wire");
                }
                Ok(Some(Frame::Immediate(ImmediateControl::HardReset))) => {
                    cortex_m::peripheral::SCB::sys_reset();
                }
                Ok(Some(Frame::Line(_line))) => {
                    // Handed off to the tokenizer/canon layer above this
                    // crate in a full build.
                }
                _ => {}
            }
        }
    }
}
