use crate::baud::{BaudSolution, BaudSolver, ClockParameters};
use crate::driver_interfaces::Uart;
use crate::error::InitError;
use bitflags::bitflags;
use log::{debug, error, trace, warn};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// Polls of LSR.THRE before a byte is written regardless.
pub const TX_RETRY_LIMIT: u32 = 5000;
/// Idle threshold programmed (but left disabled) on variants with idle detect.
pub const RX_IDLE_THRESHOLD: u32 = 10;

register_bitfields! {
    // 32 bit wide registers
    u32,
    // Receive idle detection config (HPM6800 and later)
    IDLE_CFG [
        RX_IDLE_THR OFFSET(0) NUMBITS(8) [],
        RX_IDLE_EN OFFSET(8) NUMBITS(1) [],
        // 0: idle after THR bit times without a start bit
        RX_IDLE_COND OFFSET(9) NUMBITS(1) [],
        RXEN OFFSET(11) NUMBITS(1) []
    ],
    // Oversample Control
    OSCR [
        // 0 encodes 32
        OSC OFFSET(0) NUMBITS(5) []
    ],
    // FIFO Control with 4 bit thresholds
    FCRR [
        FIFOE OFFSET(0) NUMBITS(1) [],
        RFIFORST OFFSET(1) NUMBITS(1) [],
        TFIFORST OFFSET(2) NUMBITS(1) [],
        DMAE OFFSET(3) NUMBITS(1) [],
        RFIFOT4 OFFSET(8) NUMBITS(5) [],
        TFIFOT4 OFFSET(16) NUMBITS(5) [],
        FIFOT4EN OFFSET(23) NUMBITS(1) []
    ],
    // FIFO Control, also the layout of the GPR mirror
    FCR [
        FIFOE OFFSET(0) NUMBITS(1) [],
        RFIFORST OFFSET(1) NUMBITS(1) [],
        TFIFORST OFFSET(2) NUMBITS(1) [],
        DMAE OFFSET(3) NUMBITS(1) [],
        TFIFOT OFFSET(4) NUMBITS(2) [],
        RFIFOT OFFSET(6) NUMBITS(2) []
    ],
    // Line Control
    LCR [
        WLS OFFSET(0) NUMBITS(2) [
            FiveBits = 0b00,
            SixBits = 0b01,
            SevenBits = 0b10,
            EightBits = 0b11
        ],
        // Set for 2 stop bits
        STB OFFSET(2) NUMBITS(1) [],
        PEN OFFSET(3) NUMBITS(1) [],
        EPS OFFSET(4) NUMBITS(1) [],
        // Stick parity
        SPS OFFSET(5) NUMBITS(1) [],
        BC OFFSET(6) NUMBITS(1) [],
        // Divisor latch access
        DLAB OFFSET(7) NUMBITS(1) []
    ],
    // Line Status
    LSR [
        DR OFFSET(0) NUMBITS(1) [],
        OE OFFSET(1) NUMBITS(1) [],
        PE OFFSET(2) NUMBITS(1) [],
        FE OFFSET(3) NUMBITS(1) [],
        LBREAK OFFSET(4) NUMBITS(1) [],
        THRE OFFSET(5) NUMBITS(1) [],
        TEMT OFFSET(6) NUMBITS(1) [],
        ERRF OFFSET(7) NUMBITS(1) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    pub RegisterBlock {
        (0x00 => _reserved0),
        (0x04 => IDLE_CFG: ReadWrite<u32, IDLE_CFG::Register>),
        (0x08 => _reserved1),
        (0x14 => OSCR: ReadWrite<u32, OSCR::Register>),
        (0x18 => FCRR: ReadWrite<u32, FCRR::Register>),
        (0x1c => _reserved2),
        // RBR on read, THR on write, DLL while DLAB is set
        (0x20 => RBR_THR_DLL: ReadWrite<u32>),
        // IER, DLM while DLAB is set
        (0x24 => IER_DLM: ReadWrite<u32>),
        // IIR on read
        (0x28 => FCR: WriteOnly<u32, FCR::Register>),
        (0x2c => LCR: ReadWrite<u32, LCR::Register>),
        (0x30 => _reserved3),
        (0x34 => LSR: ReadOnly<u32, LSR::Register>),
        (0x38 => _reserved4),
        (0x3c => GPR: ReadWrite<u32, FCR::Register>),
        (0x40 => @END),
    }
}

bitflags! {
    /// Optional blocks of a particular UART IP revision.
    pub struct Features: u32 {
        /// FIFO is programmed through FCRR instead of FCR.
        const FINE_FIFO_THRESHOLD = 1 << 0;
        /// IDLE_CFG carries receive idle detection.
        const RX_IDLE_DETECT = 1 << 1;
        /// IDLE_CFG carries a receiver enable bit.
        const RX_ENABLE = 1 << 2;
    }
}

/// OSCR field value for a logical oversample factor.
pub const fn encode_oversample(oversample: u8) -> u32 {
    if oversample == crate::baud::MAX_OVERSAMPLE {
        0
    } else {
        oversample as u32
    }
}

/// Logical oversample factor for an OSCR field value.
pub const fn decode_oversample(field: u32) -> u8 {
    if field == 0 {
        crate::baud::MAX_OVERSAMPLE
    } else {
        field as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub clock_frequency_hz: u32,
    pub baud_rate: u32,
    pub features: Features,
    pub solver: BaudSolver,
}

impl UartConfig {
    pub const fn new(clock_frequency_hz: u32, baud_rate: u32) -> Self {
        Self {
            clock_frequency_hz,
            baud_rate,
            features: Features::empty(),
            solver: BaudSolver::DEFAULT,
        }
    }

    pub const fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub const fn with_solver(mut self, solver: BaudSolver) -> Self {
        self.solver = solver;
        self
    }

    pub const fn clock(&self) -> ClockParameters {
        ClockParameters::new(self.clock_frequency_hz, self.baud_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartState {
    Uninitialized,
    ConfiguringBaud,
    ConfiguringFrame,
    ConfiguringFifo,
    Ready,
    InitFailed,
}

/// HPMicro UART, polled, 8N1.
pub struct HpmUart {
    base_address: usize,
    config: UartConfig,
    state: UartState,
    #[cfg(test)]
    trail: tests::Trail,
}

impl HpmUart {
    /// # Safety
    /// `base_address` must point at this UART's register block, and the
    /// returned value must be the only handle used to access it.
    pub const unsafe fn new(base_address: usize, config: UartConfig) -> Self {
        Self {
            base_address,
            config,
            state: UartState::Uninitialized,
            #[cfg(test)]
            trail: tests::Trail::new(),
        }
    }

    pub fn state(&self) -> UartState {
        self.state
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.state == UartState::Ready
    }

    fn regs(&self) -> &RegisterBlock {
        // Safety: established by the contract of `new`
        unsafe { &*(self.base_address as *const RegisterBlock) }
    }

    fn transition(&mut self, next: UartState) {
        trace!("uart@{:#x}: {:?} -> {:?}", self.base_address, self.state, next);
        self.state = next;
        #[cfg(test)]
        {
            let lcr = self.regs().LCR.get();
            let gpr = self.regs().GPR.get();
            self.trail.push(next, lcr, gpr);
        }
    }

    fn restart(&mut self) {
        #[cfg(test)]
        self.trail.clear();
        self.transition(UartState::Uninitialized);
    }

    /// Runs the full initialization sequence. Calling it again restarts from
    /// `Uninitialized` and reprograms every register.
    ///
    /// A DLAB left set by an earlier failed attempt is closed first so the
    /// interrupt disable reaches IER rather than DLM.
    ///
    /// On an infeasible clock/baud pair this returns after disabling
    /// interrupts and setting DLAB; DLAB stays set.
    pub fn init(&mut self) -> Result<(), InitError> {
        self.restart();
        self.transition(UartState::ConfiguringBaud);

        self.disable_interrupts();
        self.open_divisor_latch();

        let solution = match self.config.solver.solve(self.config.clock()) {
            Ok(solution) => solution,
            Err(err) => {
                error!("uart@{:#x}: {}", self.base_address, err);
                self.transition(UartState::InitFailed);
                return Err(err.into());
            }
        };
        debug!(
            "uart@{:#x}: {} baud from {} Hz, divisor {} oversample {}",
            self.base_address,
            self.config.baud_rate,
            self.config.clock_frequency_hz,
            solution.divisor,
            solution.oversample
        );

        self.program_baud(solution);
        self.transition(UartState::ConfiguringFrame);
        self.program_frame();
        self.transition(UartState::ConfiguringFifo);
        self.program_fifo();
        self.transition(UartState::Ready);
        Ok(())
    }

    fn disable_interrupts(&self) {
        let regs = self.regs();
        // with DLAB left set (failed init, bootloader) offset 0x24 is DLM
        if regs.LCR.is_set(LCR::DLAB) {
            regs.LCR.modify(LCR::DLAB::CLEAR);
        }
        regs.IER_DLM.set(0);
    }

    fn open_divisor_latch(&self) {
        self.regs().LCR.modify(LCR::DLAB::SET);
    }

    fn program_baud(&self, solution: BaudSolution) {
        let regs = self.regs();
        regs.OSCR
            .modify(OSCR::OSC.val(encode_oversample(solution.oversample)));
        regs.RBR_THR_DLL.set(u32::from(solution.divisor & 0xff));
        regs.IER_DLM.set(u32::from(solution.divisor >> 8));
    }

    fn program_frame(&self) {
        // close the divisor latch and settle on 8N1 in one write
        self.regs().LCR.modify(
            LCR::DLAB::CLEAR
                + LCR::SPS::CLEAR
                + LCR::EPS::CLEAR
                + LCR::PEN::CLEAR
                + LCR::STB::CLEAR
                + LCR::WLS::EightBits,
        );
    }

    fn program_fifo(&self) {
        let regs = self.regs();
        let features = self.config.features;

        if features.contains(Features::FINE_FIFO_THRESHOLD) {
            regs.FCRR.write(FCRR::TFIFORST::SET + FCRR::RFIFORST::SET);
            regs.FCRR.write(
                FCRR::FIFOT4EN::SET
                    + FCRR::FIFOE::SET
                    + FCRR::TFIFOT4.val(0)
                    + FCRR::RFIFOT4.val(0)
                    + FCRR::DMAE::CLEAR,
            );
        } else {
            regs.FCR.write(FCR::TFIFORST::SET + FCR::RFIFORST::SET);
            regs.FCR.write(
                FCR::FIFOE::SET + FCR::TFIFOT.val(0) + FCR::RFIFOT.val(0) + FCR::DMAE::CLEAR,
            );
            // FCR cannot be read back, keep a copy
            regs.GPR.write(
                FCR::FIFOE::SET + FCR::TFIFOT.val(0) + FCR::RFIFOT.val(0) + FCR::DMAE::CLEAR,
            );
        }

        if features.contains(Features::RX_IDLE_DETECT) {
            regs.IDLE_CFG.modify(
                IDLE_CFG::RX_IDLE_EN::CLEAR
                    + IDLE_CFG::RX_IDLE_THR.val(RX_IDLE_THRESHOLD)
                    + IDLE_CFG::RX_IDLE_COND::CLEAR,
            );
        }
        if features.contains(Features::RX_ENABLE) {
            regs.IDLE_CFG.modify(IDLE_CFG::RXEN::SET);
        }
    }

    /// Best-effort write: waits up to [`TX_RETRY_LIMIT`] polls for the
    /// holding register to drain, then writes anyway. A byte written while
    /// the transmitter is still busy may be lost.
    pub fn transmit_byte(&mut self, byte: u8) {
        if !self.is_ready() {
            warn!("uart@{:#x}: transmit in state {:?}", self.base_address, self.state);
            return;
        }
        let regs = self.regs();
        let mut retry = 0;
        while !regs.LSR.is_set(LSR::THRE) {
            if retry > TX_RETRY_LIMIT {
                break;
            }
            retry += 1;
            core::hint::spin_loop();
        }
        regs.RBR_THR_DLL.set(u32::from(byte));
    }

    /// Never blocks. `None` means nothing has arrived.
    pub fn receive_byte(&mut self) -> Option<u8> {
        if !self.is_ready() {
            warn!("uart@{:#x}: receive in state {:?}", self.base_address, self.state);
            return None;
        }
        let regs = self.regs();
        if regs.LSR.is_set(LSR::DR) {
            Some((regs.RBR_THR_DLL.get() & 0xff) as u8)
        } else {
            None
        }
    }
}

impl core::fmt::Write for HpmUart {
    fn write_str(&mut self, s: &str) -> Result<(), core::fmt::Error> {
        for c in s.bytes() {
            self.put(c);
        }
        Ok(())
    }
}

impl Uart for HpmUart {
    fn init(&mut self) -> Result<(), InitError> {
        HpmUart::init(self)
    }

    fn is_ready(&self) -> bool {
        HpmUart::is_ready(self)
    }

    fn get(&mut self) -> Option<u8> {
        self.receive_byte()
    }

    fn put(&mut self, value: u8) {
        self.transmit_byte(value)
    }
}

/// Builds a handle for the UART at `base_address` and brings it up.
///
/// # Safety
/// Same contract as [`HpmUart::new`].
pub unsafe fn initialize(
    base_address: usize,
    clock_frequency_hz: u32,
    baud_rate: u32,
) -> Result<HpmUart, InitError> {
    let mut uart = HpmUart::new(base_address, UartConfig::new(clock_frequency_hz, baud_rate));
    uart.init()?;
    Ok(uart)
}
