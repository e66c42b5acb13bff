//! Pin mapping for the MKS SKIPR board, adapted from a heated-extruder
//! layout to a bare 2-axis (X/Y) motion board: step/dir/enable per axis,
//! a limit switch per axis, and the USART used for the §6 line protocol.
//! This is a starting point and may need adjusting to match the actual
//! schematic.

use stm32f4xx_hal::gpio::{Input, Output, Pin, PushPull};

/// Struct to hold all the board pins.
pub struct BoardPins {
    pub led: Pin<'D', 12, Output<PushPull>>,
    pub stepper_x_step: Pin<'A', 0, Output<PushPull>>,
    pub stepper_x_dir: Pin<'B', 0, Output<PushPull>>,
    pub stepper_x_enable: Pin<'C', 0, Output<PushPull>>,
    pub stepper_x_limit: Pin<'E', 4, Input>,
    pub stepper_y_step: Pin<'A', 1, Output<PushPull>>,
    pub stepper_y_dir: Pin<'B', 1, Output<PushPull>>,
    pub stepper_y_enable: Pin<'C', 1, Output<PushPull>>,
    pub stepper_y_limit: Pin<'E', 5, Input>,
    pub uart_tx: Pin<'A', 9>,
    pub uart_rx: Pin<'A', 10>,
}

impl BoardPins {
    /// Splits every GPIO port this board uses and configures each pin's
    /// direction. Note: these are example pins; verify them against the
    /// MKS SKIPR schematic before flashing real hardware.
    pub fn new(dp: &stm32f4xx_hal::pac::Peripherals) -> Self {
        let gpioa = dp.GPIOA.split();
        let gpiob = dp.GPIOB.split();
        let gpioc = dp.GPIOC.split();
        let gpiod = dp.GPIOD.split();
        let gpioe = dp.GPIOE.split();

        Self {
            led: gpiod.pd12.into_push_pull_output(),
            stepper_x_step: gpioa.pa0.into_push_pull_output(),
            stepper_x_dir: gpiob.pb0.into_push_pull_output(),
            stepper_x_enable: gpioc.pc0.into_push_pull_output(),
            stepper_x_limit: gpioe.pe4.into_pull_up_input(),
            stepper_y_step: gpioa.pa1.into_push_pull_output(),
            stepper_y_dir: gpiob.pb1.into_push_pull_output(),
            stepper_y_enable: gpioc.pc1.into_push_pull_output(),
            stepper_y_limit: gpioe.pe5.into_pull_up_input(),
            uart_tx: gpioa.pa9,
            uart_rx: gpioa.pa10,
        }
    }
}
