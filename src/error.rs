use thiserror::Error;

/// No divisor/oversample pair reproduces the requested baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Infeasible {
    #[error("source clock frequency is zero")]
    ZeroFrequency,
    #[error("baud rate is zero")]
    ZeroBaud,
    #[error("baud rate {0} is below the minimum of {min}", min = crate::baud::MIN_BAUD)]
    BaudBelowMinimum(u32),
    #[error("clock {frequency} Hz is too slow for {baud} baud")]
    ClockTooSlow { frequency: u32, baud: u32 },
    #[error("clock {frequency} Hz is too fast for {baud} baud")]
    ClockTooFast { frequency: u32, baud: u32 },
    #[error("no oversample within tolerance for {baud} baud at {frequency} Hz")]
    OutOfTolerance { frequency: u32, baud: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("baud rate configuration failed: {0}")]
    Infeasible(#[from] Infeasible),
    #[error("console uart already claimed")]
    AlreadyClaimed,
}

impl InitError {
    /// Firmware status code reported to the boot sequencer.
    pub const fn status(&self) -> i32 {
        match self {
            Self::Infeasible(_) => -1,
            Self::AlreadyClaimed => -2,
        }
    }
}
