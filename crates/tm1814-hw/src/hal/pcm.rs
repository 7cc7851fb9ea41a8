//! PCM block with its transmit FIFO fed by DMA.
//!
//! Configured for frames of a single 32-bit channel with no padding, so one
//! data bit goes out per PCM clock cycle, MSB first.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::audio;
use super::clock::{ClockId, ClockManager};
use super::dma::{DmaChannel, Dreq};
use super::gpio::{Gpio, Mode};
use super::memory::{self, MemoryBlock, PCM_PERIPHERAL_OFFSET, PCM_PERIPHERAL_SIZE};
use super::{PartialWrite, Peripheral};
use crate::timing::Timing;
use crate::transport::{EncodedFrame, PinAssignment, TransportConfig};
use crate::Result;

// Register offsets.
const CS_A: usize = 0x00;
const FIFO_A: usize = 0x04;
const MODE_A: usize = 0x08;
const TXC_A: usize = 0x10;
const DREQ_A: usize = 0x14;
const INTEN_A: usize = 0x18;
const INTSTC_A: usize = 0x1C;

const CS_EN: u32 = 1 << 0;
const CS_TXON: u32 = 1 << 2;
const CS_TXCLR: u32 = 1 << 3;
const CS_RXCLR: u32 = 1 << 4;
const CS_DMAEN: u32 = 1 << 9;
const CS_TXERR: u32 = 1 << 15;
const CS_TXE: u32 = 1 << 21;
const CS_SYNC: u32 = 1 << 24;

// FLEN = 32 clocks per frame, FSLEN = 0.
const MODE_FRAME: u32 = 31 << 10;

// Channel 1 enabled, 32 bits wide (WEX + WID 8), at position 0.
const TXC_CHANNEL: u32 = (1 << 31) | (1 << 30) | (8 << 16);

// Request data below 48 free words, panic below 16.
const DREQ_TX: u32 = 0x30 << 8;
const DREQ_TX_PANIC: u32 = 0x10 << 24;

const SYNC_TIMEOUT: Duration = Duration::from_millis(10);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Protocol symbols carried by one 32-bit sample word.
fn symbols_per_word() -> usize {
    32 / crate::transport::chips::CHIPS_PER_SYMBOL
}

/// PCM peripheral handle for DOUT.
pub struct PcmPeripheral {
    mem: MemoryBlock,
    clocks: ClockManager,
    gpio: Gpio,
    dma: DmaChannel,
    pin: PinAssignment,
    timing: Timing,
    enabled: bool,
}

impl PcmPeripheral {
    /// Maps the PCM, clock and GPIO blocks and sets up the DMA channel.
    /// Nothing is written to the PCM until [`Peripheral::enable`].
    pub fn open(pin: PinAssignment, timing: Timing, config: &TransportConfig) -> Result<Self> {
        let mem = MemoryBlock::open_peripheral(PCM_PERIPHERAL_OFFSET, PCM_PERIPHERAL_SIZE)?;
        let clocks = ClockManager::open(memory::oscillator_hz())?;
        let gpio = Gpio::open()?;
        let dma = DmaChannel::open(config.dma_channel, Dreq::Pcm, config.buffer_capacity)?;

        info!(
            "PCM opened with DOUT on GPIO {} (DMA channel {})",
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
            enabled: false,
        })
    }

    fn wait_until(&self, deadline: Instant, mut done: impl FnMut(u32) -> bool) -> io::Result<()> {
        loop {
            let cs = self.mem.read_register(CS_A);
            if done(cs) {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("PCM FIFO stalled (CS_A={:#x})", cs),
                ));
            }
            std::hint::spin_loop();
        }
    }
}

impl Peripheral for PcmPeripheral {
    fn name(&self) -> String {
        format!("PCM (GPIO {})", self.pin.pin)
    }

    fn claimed_by(&self) -> Result<Option<String>> {
        if let Some(card) = audio::i2s_card(&audio::read_cards()) {
            return Ok(Some(card));
        }
        if self.mem.read_register(CS_A) & CS_EN != 0 {
            return Ok(Some("another PCM user (interface already enabled)".to_string()));
        }
        Ok(None)
    }

    fn enable(&mut self) -> Result<()> {
        self.mem.write_register(CS_A, 0);
        std::thread::sleep(Duration::from_micros(100));

        let clock_hz = crate::transport::pcm_clock_hz(self.timing.bit_rate_hz);
        self.clocks.start(ClockId::Pcm, clock_hz)?;

        self.mem.write_register(CS_A, CS_EN);
        self.mem.write_register(INTEN_A, 0);
        self.mem.write_register(INTSTC_A, 0b1111);
        self.mem.write_register(MODE_A, MODE_FRAME);
        self.mem.write_register(TXC_A, TXC_CHANNEL);
        self.mem.write_register(DREQ_A, DREQ_TX | DREQ_TX_PANIC);

        self.mem
            .write_register(CS_A, CS_EN | CS_DMAEN | CS_TXCLR | CS_RXCLR | CS_SYNC);
        // SYNC echoes back after two PCM clocks, once the clears have taken effect.
        self.wait_until(Instant::now() + SYNC_TIMEOUT, |cs| cs & CS_SYNC != 0)?;

        self.gpio.set_mode(self.pin.pin, self.pin.mode);
        self.enabled = true;

        debug!("PCM running at {} Hz", clock_hz);
        Ok(())
    }

    fn write(&mut self, frame: &EncodedFrame) -> io::Result<()> {
        let EncodedFrame::Samples(words) = frame else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "PCM expects sample frames",
            ));
        };
        if !self.enabled {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "PCM not enabled"));
        }

        let total = frame.byte_len();
        let expected = self.timing.duration(words.len() * symbols_per_word());

        // TXON with an empty FIFO flags an underrun, so give the DMA a
        // head start before the first bit goes out.
        self.mem.modify_register(CS_A, |cs| (cs & !CS_TXON) | CS_TXERR);
        let total = self.dma.start(words)?;
        std::thread::sleep(Duration::from_micros(10));
        self.mem.modify_register(CS_A, |cs| cs | CS_TXON);

        let result = self.dma.finish(total, expected);
        // Checked before the FIFO drains; an empty FIFO after the frame is expected.
        let cs = self.mem.read_register(CS_A);
        let drained = match result {
            Ok(()) => {
                let drained =
                    self.wait_until(Instant::now() + DRAIN_TIMEOUT, |cs| cs & CS_TXE != 0);
                // Let the last word leave the shift register before stopping.
                std::thread::sleep(self.timing.duration(symbols_per_word() + 1));
                drained.is_ok()
            }
            Err(_) => false,
        };
        self.mem.modify_register(CS_A, |cs| cs & !CS_TXON);
        result?;

        if !drained {
            return Err(PartialWrite::new(total, total).into());
        }
        if cs & CS_TXERR != 0 {
            debug!("PCM FIFO ran dry during the frame (CS_A={:#x})", cs);
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
        self.mem.write_register(CS_A, 0);
        self.gpio.set_mode(self.pin.pin, Mode::Input);
        self.clocks.stop(ClockId::Pcm)?;
        info!("PCM released");
        Ok(())
    }
}

impl Drop for PcmPeripheral {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
