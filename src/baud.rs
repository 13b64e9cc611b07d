//! Divisor/oversample search for the UART baud generator.
//!
//! The transceiver derives its bit clock as
//! `source_clock / (divisor * oversample)`. The search walks the even
//! oversample values upwards and takes the first one whose truncated divisor
//! lands within tolerance, so lower oversample values always win over a
//! closer match further up the range.

use crate::error::Infeasible;

pub const MIN_BAUD: u32 = 200;
pub const MIN_OVERSAMPLE: u8 = 8;
pub const MAX_OVERSAMPLE: u8 = 32;
pub const MIN_DIVISOR: u16 = 1;
pub const MAX_DIVISOR: u16 = 0xFFFF;
pub const TOLERANCE_PERCENT: u32 = 3;

/// The clock/baud pair a UART is initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockParameters {
    pub source_frequency_hz: u32,
    pub target_baud: u32,
}

impl ClockParameters {
    pub const fn new(source_frequency_hz: u32, target_baud: u32) -> Self {
        Self {
            source_frequency_hz,
            target_baud,
        }
    }

    /// Rejects pairs that no divisor/oversample combination can reach.
    pub fn check(&self) -> Result<(), Infeasible> {
        let frequency = self.source_frequency_hz;
        let baud = self.target_baud;
        if frequency == 0 {
            return Err(Infeasible::ZeroFrequency);
        }
        if baud == 0 {
            return Err(Infeasible::ZeroBaud);
        }
        if baud < MIN_BAUD {
            return Err(Infeasible::BaudBelowMinimum(baud));
        }

        // 64 bit so `baud * 32` cannot wrap
        let f = u64::from(frequency);
        let b = u64::from(baud);
        if f / u64::from(MIN_DIVISOR) < b * u64::from(MIN_OVERSAMPLE) {
            return Err(Infeasible::ClockTooSlow { frequency, baud });
        }
        if f / u64::from(MAX_DIVISOR) > b * u64::from(MAX_OVERSAMPLE) {
            return Err(Infeasible::ClockTooFast { frequency, baud });
        }
        Ok(())
    }
}

/// A divisor latch value and the (logical) oversample factor it pairs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudSolution {
    pub divisor: u16,
    /// Even, in `8..=32`. Never the register encoding.
    pub oversample: u8,
}

impl BaudSolution {
    /// Source clock ticks per transmitted bit.
    pub fn ticks_per_bit(&self) -> u32 {
        u32::from(self.divisor) * u32::from(self.oversample)
    }

    /// The baud rate the hardware ends up producing from `frequency`, or
    /// `None` for a hand-built solution with a zero divisor or oversample.
    ///
    /// The solver bounds the error of `divisor * oversample` against
    /// `frequency / baud`, so the achieved rate itself may sit up to
    /// `tolerance / (100 - tolerance)` above the target (about 3.09% at 3%).
    pub fn achieved_baud(&self, frequency: u32) -> Option<u32> {
        frequency.checked_div(self.ticks_per_bit())
    }
}

/// Search parameters. Board code may tighten the tolerance or cap the
/// oversample range for SoCs whose OSCR field is narrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudSolver {
    tolerance_percent: u32,
    max_oversample: u8,
}

impl BaudSolver {
    pub const DEFAULT: Self = Self {
        tolerance_percent: TOLERANCE_PERCENT,
        max_oversample: MAX_OVERSAMPLE,
    };

    pub const fn new() -> Self {
        Self::DEFAULT
    }

    pub const fn with_tolerance(mut self, percent: u32) -> Self {
        self.tolerance_percent = percent;
        self
    }

    /// Caps the scanned range. Values outside `8..=32` are clamped.
    pub const fn with_max_oversample(mut self, oversample: u8) -> Self {
        self.max_oversample = if oversample < MIN_OVERSAMPLE {
            MIN_OVERSAMPLE
        } else if oversample > MAX_OVERSAMPLE {
            MAX_OVERSAMPLE
        } else {
            oversample
        };
        self
    }

    pub const fn tolerance_percent(&self) -> u32 {
        self.tolerance_percent
    }

    pub const fn max_oversample(&self) -> u8 {
        self.max_oversample
    }

    pub fn solve(&self, params: ClockParameters) -> Result<BaudSolution, Infeasible> {
        params.check()?;

        let frequency = u64::from(params.source_frequency_hz);
        let baud = u64::from(params.target_baud);
        let tolerance = u64::from(self.tolerance_percent);

        for oversample in (MIN_OVERSAMPLE..=self.max_oversample).step_by(2) {
            // floor((frequency / baud) / oversample)
            let divisor = frequency / (baud * u64::from(oversample));
            if divisor < u64::from(MIN_DIVISOR) || divisor > u64::from(MAX_DIVISOR) {
                continue;
            }
            // |divisor * oversample - frequency / baud| scaled by baud; the
            // divisor is truncated so the product never exceeds the ratio.
            let deviation = frequency - divisor * u64::from(oversample) * baud;
            if deviation == 0 || deviation * 100 <= tolerance * frequency {
                return Ok(BaudSolution {
                    divisor: divisor as u16,
                    oversample,
                });
            }
        }

        Err(Infeasible::OutOfTolerance {
            frequency: params.source_frequency_hz,
            baud: params.target_baud,
        })
    }
}

impl Default for BaudSolver {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Solves `frequency`/`baud` with the default tolerance and full oversample range.
pub fn solve(frequency: u32, baud: u32) -> Result<BaudSolution, Infeasible> {
    BaudSolver::DEFAULT.solve(ClockParameters::new(frequency, baud))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deviation of `divisor * oversample` from `frequency / baud`, in
    /// hundredths of a percent.
    fn ratio_error_bp(frequency: u32, baud: u32, solution: BaudSolution) -> u64 {
        let f = u64::from(frequency);
        let achieved = u64::from(solution.ticks_per_bit()) * u64::from(baud);
        (f - achieved) * 10_000 / f
    }

    fn accepted(frequency: u32, baud: u32, oversample: u8) -> bool {
        let f = u64::from(frequency);
        let b = u64::from(baud);
        let divisor = f / (b * u64::from(oversample));
        if divisor == 0 || divisor > u64::from(MAX_DIVISOR) {
            return false;
        }
        let deviation = f - divisor * u64::from(oversample) * b;
        deviation * 100 <= u64::from(TOLERANCE_PERCENT) * f
    }

    #[test]
    fn reference_board_default() {
        let solution = solve(24_000_000, 115_200).unwrap();
        assert_eq!(
            solution,
            BaudSolution {
                divisor: 26,
                oversample: 8
            }
        );
        let achieved = solution.achieved_baud(24_000_000).unwrap();
        assert_eq!(achieved, 115_384);
        assert!((achieved - 115_200) * 100 <= 3 * 115_200);
    }

    #[test]
    fn tolerance_bounds_the_ratio_not_the_achieved_rate() {
        // 16490 / 2000 = 8.245, 8x1 is 2.97% short of the ratio
        let solution = solve(16_490, 2000).unwrap();
        assert_eq!(
            solution,
            BaudSolution {
                divisor: 1,
                oversample: 8
            }
        );
        assert_eq!(ratio_error_bp(16_490, 2000, solution), 297);
        // 2061 baud is 3.05% fast: over 3%, under 3 / 97
        let achieved = solution.achieved_baud(16_490).unwrap();
        assert_eq!(achieved, 2061);
        assert!((achieved - 2000) * 100 > 3 * 2000);
        assert!((achieved - 2000) * 97 <= 3 * 2000);
    }

    #[test]
    fn achieved_baud_of_zero_divisor() {
        let bogus = BaudSolution {
            divisor: 0,
            oversample: 8,
        };
        assert_eq!(bogus.achieved_baud(24_000_000), None);
    }

    #[test]
    fn below_minimum_baud() {
        assert_eq!(
            solve(24_000_000, 100),
            Err(Infeasible::BaudBelowMinimum(100))
        );
    }

    #[test]
    fn clock_far_too_slow() {
        assert_eq!(
            solve(1000, 115_200),
            Err(Infeasible::ClockTooSlow {
                frequency: 1000,
                baud: 115_200
            })
        );
    }

    #[test]
    fn clock_too_fast_for_divisor_latch() {
        assert_eq!(
            solve(u32::MAX, 200),
            Err(Infeasible::ClockTooFast {
                frequency: u32::MAX,
                baud: 200
            })
        );
    }

    #[test]
    fn zero_inputs() {
        assert_eq!(solve(0, 115_200), Err(Infeasible::ZeroFrequency));
        assert_eq!(solve(24_000_000, 0), Err(Infeasible::ZeroBaud));
    }

    #[test]
    fn nine_six_hundred_prefers_lowest_oversample() {
        let solution = solve(24_000_000, 9600).unwrap();
        assert_eq!(solution.oversample, 8);
        assert_eq!(solution.divisor, 312);
        assert!(accepted(24_000_000, 9600, 8));
    }

    #[test]
    fn first_acceptable_oversample_wins() {
        // ratio 18: only an exact 18x oversample at divisor 1 is close enough
        let solution = solve(3_600_000, 200_000).unwrap();
        assert_eq!(
            solution,
            BaudSolution {
                divisor: 1,
                oversample: 18
            }
        );
        for oversample in (MIN_OVERSAMPLE..solution.oversample).step_by(2) {
            assert!(!accepted(3_600_000, 200_000, oversample), "{}", oversample);
        }
    }

    #[test]
    fn exhausted_scan_is_out_of_tolerance() {
        // ratio 15 sits between every reachable product
        assert_eq!(
            solve(3_000_000, 200_000),
            Err(Infeasible::OutOfTolerance {
                frequency: 3_000_000,
                baud: 200_000
            })
        );
    }

    #[test]
    fn wide_ratio_needs_thirty_two() {
        let solution = solve(u32::MAX, 2100).unwrap();
        assert_eq!(solution.oversample, 32);
        assert_eq!(solution.divisor, 63_913);
    }

    #[test]
    fn capped_range_skips_thirty_two() {
        let solver = BaudSolver::new().with_max_oversample(30);
        assert_eq!(
            solver.solve(ClockParameters::new(u32::MAX, 2100)),
            Err(Infeasible::OutOfTolerance {
                frequency: u32::MAX,
                baud: 2100
            })
        );
        assert_eq!(BaudSolver::new().with_max_oversample(64).max_oversample(), 32);
        assert_eq!(BaudSolver::new().with_max_oversample(2).max_oversample(), 8);
    }

    #[test]
    fn tighter_tolerance_moves_up_the_range() {
        // 24 MHz / 115200: 8x26 is 0.16% off, nothing is exact
        let solver = BaudSolver::new().with_tolerance(0);
        assert!(solver
            .solve(ClockParameters::new(24_000_000, 115_200))
            .is_err());
        let exact = solver.solve(ClockParameters::new(1_843_200, 115_200)).unwrap();
        assert_eq!(exact.ticks_per_bit(), 16);
        assert_eq!(exact.oversample, 8);
    }

    #[test]
    fn solutions_stay_in_range_and_tolerance() {
        let clocks = [
            1_843_200,
            8_000_000,
            12_000_000,
            24_000_000,
            48_000_000,
            80_000_000,
            100_000_000,
            200_000_000,
        ];
        let bauds = [
            200, 300, 1200, 2400, 4800, 9600, 19_200, 38_400, 57_600, 115_200, 230_400,
            460_800, 921_600, 1_500_000, 3_000_000,
        ];
        for &frequency in clocks.iter() {
            for &baud in bauds.iter() {
                let params = ClockParameters::new(frequency, baud);
                match solve(frequency, baud) {
                    Ok(solution) => {
                        assert!(params.check().is_ok());
                        assert_eq!(solution.oversample % 2, 0);
                        assert!(solution.oversample >= MIN_OVERSAMPLE);
                        assert!(solution.oversample <= MAX_OVERSAMPLE);
                        assert!(solution.divisor >= MIN_DIVISOR);
                        assert!(ratio_error_bp(frequency, baud, solution) <= 300);
                        // achieved rate never undershoots, overshoots by at
                        // most tolerance / (1 - tolerance)
                        let achieved = u64::from(solution.achieved_baud(frequency).unwrap());
                        let target = u64::from(baud);
                        assert!(achieved >= target);
                        assert!((achieved - target) * 97 <= 3 * target);
                        assert_eq!(solve(frequency, baud), Ok(solution));
                    }
                    Err(Infeasible::OutOfTolerance { .. }) => {
                        assert!(params.check().is_ok());
                        for oversample in (MIN_OVERSAMPLE..=MAX_OVERSAMPLE).step_by(2) {
                            assert!(!accepted(frequency, baud, oversample));
                        }
                    }
                    Err(err) => assert_eq!(params.check(), Err(err)),
                }
            }
        }
    }

    #[test]
    fn bound_violations_fail_before_scanning() {
        // these would otherwise surface as OutOfTolerance
        for &(frequency, baud) in [(1000, 115_200), (921_599, 115_200), (u32::MAX, 1000)].iter() {
            let err = solve(frequency, baud).unwrap_err();
            assert!(
                matches!(
                    err,
                    Infeasible::ClockTooSlow { .. } | Infeasible::ClockTooFast { .. }
                ),
                "{:?}",
                err
            );
        }
    }
}
