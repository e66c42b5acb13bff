#![no_std]
#![no_main]

use defmt_rtt as _; // global logger
use panic_probe as _;

use mcu_firmware::{fixed_point, safety};

mod rtic_main;
use rtic_main as _;
