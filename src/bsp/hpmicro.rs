use crate::console::Console;
use crate::drivers::hpm_uart::{Features, HpmUart, UartConfig};
use crate::error::InitError;
use spin::Mutex;

// UART0 on the D45 boards, clocked from the 24 MHz crystal
pub const UART_BASE: usize = 0xf004_0000;
pub const UART_FREQUENCY: u32 = 24_000_000;
pub const UART_BAUDRATE: u32 = 115_200;

#[cfg(feature = "hpm6800")]
pub const UART_FEATURES: Features = Features::from_bits_truncate(
    Features::RX_IDLE_DETECT.bits() | Features::RX_ENABLE.bits(),
);
#[cfg(not(feature = "hpm6800"))]
pub const UART_FEATURES: Features = Features::empty();

pub const CONSOLE_CONFIG: UartConfig =
    UartConfig::new(UART_FREQUENCY, UART_BAUDRATE).with_features(UART_FEATURES);

static CONSOLE_CLAIMED: Mutex<bool> = Mutex::new(false);

/// Hands out the console UART. Returns `None` once it has been claimed.
pub fn claim_console_uart() -> Option<HpmUart> {
    let mut claimed = CONSOLE_CLAIMED.lock();
    if *claimed {
        return None;
    }
    *claimed = true;
    // Safety: UART_BASE is UART0 and the flag makes this the only handle.
    Some(unsafe { HpmUart::new(UART_BASE, CONSOLE_CONFIG) })
}

/// Claims and initializes the console UART.
pub fn console() -> Result<Console<HpmUart>, InitError> {
    let uart = claim_console_uart().ok_or(InitError::AlreadyClaimed)?;
    Console::init(uart)
}
