//! Baud-rate synthesis and polled console driver for the HPMicro UART.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod print;

pub mod baud;
pub mod bsp;
pub mod console;
pub mod driver_interfaces;
pub mod drivers;
pub mod error;

pub use baud::{solve, BaudSolution, BaudSolver, ClockParameters};
pub use console::Console;
pub use driver_interfaces::Uart;
pub use drivers::hpm_uart::{initialize, Features, HpmUart, UartConfig, UartState};
pub use error::{Infeasible, InitError};
