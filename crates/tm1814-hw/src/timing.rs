//! Protocol timing parameters.
//!
//! The TM1814 is self-clocked: every data bit occupies one fixed period and
//! is told apart by how long the line stays active within it. A frame is
//! committed once the line has been idle for at least the reset period.

use crate::{Error, Result};

/// Default data rate of the TM1814 (one symbol every 1.25 µs).
pub const DEFAULT_BIT_RATE_HZ: u32 = 800_000;

/// Default reset/latch period appended to every frame.
pub const DEFAULT_RESET_US: u32 = 1_650;

/// Bit rate and reset period for one strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Symbols per second.
    pub bit_rate_hz: u32,
    /// Minimum idle time after a frame, in microseconds.
    pub reset_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            bit_rate_hz: DEFAULT_BIT_RATE_HZ,
            reset_us: DEFAULT_RESET_US,
        }
    }
}

impl Timing {
    /// Checks the values against what the chip can latch.
    pub fn validate(&self) -> Result<()> {
        if !(400_000..=1_200_000).contains(&self.bit_rate_hz) {
            return Err(Error::Configuration(format!(
                "bit rate {} Hz outside 400-1200 kHz",
                self.bit_rate_hz
            )));
        }
        if self.reset_us < 200 {
            return Err(Error::Configuration(format!(
                "reset period {}us is shorter than the 200us latch threshold",
                self.reset_us
            )));
        }
        Ok(())
    }

    /// Duration of one symbol in nanoseconds.
    pub fn symbol_ns(&self) -> u64 {
        1_000_000_000 / self.bit_rate_hz as u64
    }

    /// Number of idle symbols needed to cover the reset period (rounded up).
    pub fn reset_symbols(&self) -> usize {
        let numerator = self.reset_us as u64 * self.bit_rate_hz as u64;
        numerator.div_ceil(1_000_000) as usize
    }

    /// Time the line needs to shift out `symbols` symbols.
    pub fn duration(&self, symbols: usize) -> std::time::Duration {
        std::time::Duration::from_nanos(symbols as u64 * self.symbol_ns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reset_symbols() {
        assert_eq!(Timing::default().reset_symbols(), 1320);
        assert_eq!(Timing::default().symbol_ns(), 1250);
    }

    #[test]
    fn test_reset_symbols_round_up() {
        let timing = Timing {
            bit_rate_hz: 800_000,
            reset_us: 301,
        };
        // 301us / 1.25us = 240.8
        assert_eq!(timing.reset_symbols(), 241);
    }

    #[test]
    fn test_validate() {
        assert!(Timing::default().validate().is_ok());
        assert!(Timing {
            bit_rate_hz: 800_000,
            reset_us: 50,
        }
        .validate()
        .is_err());
        assert!(Timing {
            bit_rate_hz: 10_000_000,
            reset_us: 300,
        }
        .validate()
        .is_err());
    }
}
