//! PWM block fed by DMA.
//!
//! The channel runs in mark/space mode with the FIFO enabled: every word
//! taken from the FIFO is the mark (high) time of one range period. A DMA
//! channel keeps the FIFO filled for the whole frame. When the FIFO runs
//! dry between frames the output holds the silence bit, which is set to
//! the idle level of the line.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::audio;
use super::clock::{ClockId, ClockManager};
use super::dma::{DmaChannel, Dreq};
use super::gpio::{Gpio, Mode};
use super::memory::{self, MemoryBlock, PWM_PERIPHERAL_OFFSET, PWM_PERIPHERAL_SIZE};
use super::{PartialWrite, Peripheral};
use crate::timing::Timing;
use crate::transport::{EncodedFrame, PinAssignment, TransportConfig, PWM_TICKS_PER_SYMBOL};
use crate::Result;

// Register offsets.
const CTL: usize = 0x00;
const STA: usize = 0x04;
const DMAC: usize = 0x08;
const RNG1: usize = 0x10;
const RNG2: usize = 0x20;

// CTL bits for channel 1; channel 2 uses the same layout shifted by 8.
const CTL_PWEN: u32 = 1 << 0;
const CTL_SBIT: u32 = 1 << 3;
const CTL_USEF: u32 = 1 << 5;
const CTL_CLRF: u32 = 1 << 6;
const CTL_MSEN: u32 = 1 << 7;
const CTL_CHANNEL_MASK: u32 = 0xFF;

const STA_EMPT: u32 = 1 << 1;
const STA_WERR: u32 = 1 << 2;
const STA_BERR: u32 = 1 << 8;
const STA_CLEAR: u32 = 0x1FE;

const DMAC_ENAB: u32 = 1 << 31;
const DMAC_PANIC: u32 = 7 << 8;
const DMAC_DREQ: u32 = 3;

/// Replaces one channel's byte of CTL, leaving the other channel running.
fn channel_ctl(ctl: u32, shift: u32, bits: u32) -> u32 {
    (ctl & !(CTL_CHANNEL_MASK << shift)) | (bits << shift)
}

/// PWM peripheral handle for one channel.
pub struct PwmPeripheral {
    mem: MemoryBlock,
    clocks: ClockManager,
    gpio: Gpio,
    dma: DmaChannel,
    pin: PinAssignment,
    timing: Timing,
    idle_high: bool,
    enabled: bool,
}

impl PwmPeripheral {
    /// Maps the PWM, clock and GPIO blocks and sets up the DMA channel.
    /// Nothing is written to the PWM until [`Peripheral::enable`].
    pub fn open(pin: PinAssignment, timing: Timing, config: &TransportConfig) -> Result<Self> {
        let mem = MemoryBlock::open_peripheral(PWM_PERIPHERAL_OFFSET, PWM_PERIPHERAL_SIZE)?;
        let clocks = ClockManager::open(memory::oscillator_hz())?;
        let gpio = Gpio::open()?;
        let dma = DmaChannel::open(config.dma_channel, Dreq::Pwm, config.buffer_capacity)?;

        info!(
            "PWM channel {} opened on GPIO {} (DMA channel {})",
            pin.unit,
            pin.pin,
            dma.channel()
        );

        Ok(Self {
            mem,
            clocks,
            gpio,
            dma,
            pin,
            timing,
            idle_high: config.invert,
            enabled: false,
        })
    }

    fn shift(&self) -> u32 {
        8 * self.pin.unit as u32
    }

    fn range_register(&self) -> usize {
        if self.pin.unit == 0 {
            RNG1
        } else {
            RNG2
        }
    }

    fn set_channel_ctl(&self, bits: u32) {
        let shift = self.shift();
        self.mem
            .modify_register(CTL, |ctl| channel_ctl(ctl, shift, bits));
    }
}

impl Peripheral for PwmPeripheral {
    fn name(&self) -> String {
        format!("PWM channel {} (GPIO {})", self.pin.unit, self.pin.pin)
    }

    fn claimed_by(&self) -> Result<Option<String>> {
        if let Some(card) = audio::analog_card(&audio::read_cards()) {
            return Ok(Some(card));
        }
        if self.mem.read_register(CTL) & (CTL_PWEN << self.shift()) != 0 {
            return Ok(Some("another PWM user (channel already enabled)".to_string()));
        }
        Ok(None)
    }

    fn enable(&mut self) -> Result<()> {
        self.set_channel_ctl(0);
        std::thread::sleep(Duration::from_micros(10));

        let clock_hz = crate::transport::pwm_clock_hz(self.timing.bit_rate_hz);
        self.clocks.start(ClockId::Pwm, clock_hz)?;

        self.mem
            .write_register(self.range_register(), PWM_TICKS_PER_SYMBOL);
        self.mem.write_register(STA, STA_CLEAR);
        self.mem.modify_register(CTL, |ctl| ctl | CTL_CLRF);
        std::thread::sleep(Duration::from_micros(10));
        self.mem
            .write_register(DMAC, DMAC_ENAB | DMAC_PANIC | DMAC_DREQ);

        let mut bits = CTL_PWEN | CTL_USEF | CTL_MSEN;
        if self.idle_high {
            bits |= CTL_SBIT;
        }
        self.set_channel_ctl(bits);
        self.gpio.set_mode(self.pin.pin, self.pin.mode);
        self.enabled = true;

        debug!("PWM running at {} Hz, range {}", clock_hz, PWM_TICKS_PER_SYMBOL);
        Ok(())
    }

    fn write(&mut self, frame: &EncodedFrame) -> io::Result<()> {
        let EncodedFrame::DutyCycles(words) = frame else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "PWM expects duty cycle frames",
            ));
        };
        if !self.enabled {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "PWM not enabled"));
        }

        let total = frame.byte_len();
        let expected = self.timing.duration(words.len());
        self.mem.write_register(STA, STA_CLEAR);
        self.dma.transfer(words, expected)?;

        // The DMA is done once the last word is in the FIFO; let it drain.
        let deadline = Instant::now() + Duration::from_millis(10);
        while self.mem.read_register(STA) & STA_EMPT == 0 {
            if Instant::now() > deadline {
                return Err(PartialWrite::new(total, total).into());
            }
            std::thread::sleep(self.timing.duration(1));
        }

        let status = self.mem.read_register(STA);
        if status & (STA_WERR | STA_BERR) != 0 {
            debug!("PWM bus error after frame (STA={:#x})", status);
            return Err(PartialWrite::new(total, total).into());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        self.dma.reset();
        self.set_channel_ctl(0);
        self.gpio.set_mode(self.pin.pin, Mode::Input);
        self.clocks.stop(ClockId::Pwm)?;
        info!("PWM channel {} released", self.pin.unit);
        Ok(())
    }
}

impl Drop for PwmPeripheral {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ctl_keeps_other_channel() {
        let running = CTL_PWEN | CTL_MSEN;
        let ctl = running << 8;

        // Reconfiguring channel 1 leaves channel 2 running.
        let ctl = channel_ctl(ctl, 0, CTL_PWEN | CTL_USEF | CTL_SBIT);
        assert_eq!(ctl >> 8, running);
        assert_eq!(ctl & CTL_CHANNEL_MASK, CTL_PWEN | CTL_USEF | CTL_SBIT);

        // Stopping channel 1 again.
        assert_eq!(channel_ctl(ctl, 0, 0), running << 8);
    }

    #[test]
    fn test_channel_ctl_second_channel() {
        let ctl = channel_ctl(CTL_PWEN | CTL_USEF, 8, CTL_PWEN | CTL_MSEN);
        assert_eq!(ctl, (CTL_PWEN | CTL_USEF) | ((CTL_PWEN | CTL_MSEN) << 8));
        assert_eq!(channel_ctl(ctl, 8, 0), CTL_PWEN | CTL_USEF);
    }
}
