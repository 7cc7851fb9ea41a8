//! General-purpose clock manager for the PWM and PCM blocks.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::hal::memory::{
    MemoryBlock, CLOCK_MANAGER_PERIPHERAL_OFFSET, CLOCK_MANAGER_PERIPHERAL_SIZE,
};
use crate::{Error, Result};

const PASSWORD: u32 = 0x5A << 24;

const CTL_ENAB: u32 = 1 << 4;
const CTL_KILL: u32 = 1 << 5;
const CTL_BUSY: u32 = 1 << 7;
const CTL_MASH_SHIFT: u32 = 9;
const SRC_OSCILLATOR: u32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_millis(10);

/// Clock generators used by the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    Pcm,
    Pwm,
}

impl ClockId {
    fn ctl_offset(self) -> usize {
        match self {
            ClockId::Pcm => 0x98,
            ClockId::Pwm => 0xA0,
        }
    }

    fn div_offset(self) -> usize {
        self.ctl_offset() + 4
    }
}

/// 12.12 fixed point clock divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divisor {
    pub integer: u32,
    pub fraction: u32,
}

impl Divisor {
    /// Divisor that derives `target_hz` from `source_hz`.
    pub fn for_rate(source_hz: u32, target_hz: u32) -> Result<Self> {
        if target_hz == 0 || target_hz > source_hz {
            return Err(Error::Configuration(format!(
                "cannot derive {} Hz from a {} Hz clock",
                target_hz, source_hz
            )));
        }
        let integer = source_hz / target_hz;
        let remainder = (source_hz % target_hz) as u64;
        let fraction = ((remainder << 12) / target_hz as u64) as u32;
        // Fractional division needs MASH, which requires an integer part of at least 2.
        if integer > 0xFFF || (fraction != 0 && integer < 2) {
            return Err(Error::Configuration(format!(
                "divisor {}+{}/4096 out of range",
                integer, fraction
            )));
        }
        Ok(Self { integer, fraction })
    }

    fn register(&self) -> u32 {
        PASSWORD | (self.integer << 12) | self.fraction
    }

    fn mash(&self) -> u32 {
        if self.fraction == 0 {
            0
        } else {
            1
        }
    }
}

/// Clock manager register block.
pub struct ClockManager {
    mem: MemoryBlock,
    source_hz: u32,
}

impl ClockManager {
    pub fn open(source_hz: u32) -> Result<Self> {
        let mem = MemoryBlock::open_peripheral(
            CLOCK_MANAGER_PERIPHERAL_OFFSET,
            CLOCK_MANAGER_PERIPHERAL_SIZE,
        )?;
        Ok(Self { mem, source_hz })
    }

    /// Starts `clock` at `target_hz`, sourced from the oscillator.
    pub fn start(&self, clock: ClockId, target_hz: u32) -> Result<()> {
        let divisor = Divisor::for_rate(self.source_hz, target_hz)?;
        self.stop(clock)?;

        self.mem.write_register(clock.div_offset(), divisor.register());
        let ctl = PASSWORD | (divisor.mash() << CTL_MASH_SHIFT) | SRC_OSCILLATOR;
        self.mem.write_register(clock.ctl_offset(), ctl);
        self.mem.write_register(clock.ctl_offset(), ctl | CTL_ENAB);
        self.wait_busy(clock, true)?;

        debug!(
            "{:?} clock running at {} Hz (divisor {}+{}/4096)",
            clock, target_hz, divisor.integer, divisor.fraction
        );
        Ok(())
    }

    /// Stops `clock` and waits for it to settle.
    pub fn stop(&self, clock: ClockId) -> Result<()> {
        let ctl = self.mem.read_register(clock.ctl_offset());
        self.mem
            .write_register(clock.ctl_offset(), PASSWORD | (ctl & !CTL_ENAB & 0xFFFF));
        if self.wait_busy(clock, false).is_err() {
            self.mem
                .write_register(clock.ctl_offset(), PASSWORD | CTL_KILL);
            self.wait_busy(clock, false)?;
        }
        Ok(())
    }

    fn wait_busy(&self, clock: ClockId, busy: bool) -> Result<()> {
        let deadline = Instant::now() + BUSY_TIMEOUT;
        while (self.mem.read_register(clock.ctl_offset()) & CTL_BUSY != 0) != busy {
            if Instant::now() > deadline {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{:?} clock did not settle", clock),
                )));
            }
            std::thread::sleep(Duration::from_micros(10));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_divisor() {
        // Pi 3: 19.2 MHz oscillator
        assert_eq!(
            Divisor::for_rate(19_200_000, 2_400_000).unwrap(),
            Divisor {
                integer: 8,
                fraction: 0
            }
        );
        assert_eq!(Divisor::for_rate(19_200_000, 19_200_000).unwrap().integer, 1);
    }

    #[test]
    fn test_fractional_divisor() {
        // Pi 4: 54 MHz / 19.2 MHz = 2.8125
        let divisor = Divisor::for_rate(54_000_000, 19_200_000).unwrap();
        assert_eq!(divisor.integer, 2);
        assert_eq!(divisor.fraction, 3328);
        assert_eq!(divisor.mash(), 1);
    }

    #[test]
    fn test_out_of_range() {
        assert!(Divisor::for_rate(19_200_000, 0).is_err());
        assert!(Divisor::for_rate(19_200_000, 38_400_000).is_err());
        // 1.5 would need MASH with an integer part below 2
        assert!(Divisor::for_rate(30_000_000, 20_000_000).is_err());
    }
}
