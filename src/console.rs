//! Character console on top of a polled UART.

use crate::driver_interfaces::Uart;
use crate::error::InitError;
use core::fmt::Write;

/// A console bound to a UART that initialized successfully.
///
/// There is no way to build one around a UART whose initialization failed,
/// so nothing is ever written to a half-configured device.
pub struct Console<U: Uart> {
    uart: U,
}

impl<U: Uart> Console<U> {
    /// Initializes `uart` and takes it over.
    pub fn init(mut uart: U) -> Result<Self, InitError> {
        uart.init()?;
        Ok(Self { uart })
    }

    /// Takes over an already initialized UART, or hands it back.
    pub fn new(uart: U) -> Result<Self, U> {
        if uart.is_ready() {
            Ok(Self { uart })
        } else {
            Err(uart)
        }
    }

    pub fn putc(&mut self, c: u8) {
        self.uart.put(c);
    }

    /// Never blocks.
    pub fn getc(&mut self) -> Option<u8> {
        self.uart.get()
    }

    pub fn puts(&mut self, s: &str) {
        for c in s.bytes() {
            self.putc(c);
        }
    }

    pub fn uart(&mut self) -> &mut U {
        &mut self.uart
    }

    pub fn into_inner(self) -> U {
        self.uart
    }
}

impl<U: Uart> Write for Console<U> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.puts(s);
        Ok(())
    }
}
