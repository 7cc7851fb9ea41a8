//! Transport adapters.
//!
//! Each transport maps the symbol stream onto the physical encoding of one
//! peripheral and hands the result to an owned [`Peripheral`] handle.
//! The capacity check always runs before anything touches the hardware,
//! so a rejected frame never reaches the strip.

pub mod chips;
mod pcm;
mod pins;
mod pwm;
mod spi;

use std::str::FromStr;

use tracing::debug;

use crate::encoding::Signal;
use crate::hal::{dma, PartialWrite, Peripheral};
use crate::{Error, Result};

pub use pcm::{clock_hz as pcm_clock_hz, PcmTransport};
pub use pins::{pin_assignment, PinAssignment};
pub use pwm::{clock_hz as pwm_clock_hz, duty, PwmTransport, PWM_TICKS_PER_SYMBOL};
pub use spi::{clock_hz as spi_clock_hz, SpiTransport};

/// Default SPI buffer capacity (the spidev `bufsiz` default).
pub const DEFAULT_SPI_CAPACITY: usize = 4096;

/// Default capacity for the DMA-fed PWM and PCM transports.
pub const DEFAULT_DMA_CAPACITY: usize = 65536;

/// Hardware transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// SPI MOSI, byte oriented.
    #[default]
    Spi,
    /// PWM channel, one duty cycle per symbol.
    Pwm,
    /// PCM DOUT, fixed-rate sample words.
    Pcm,
}

impl TransportKind {
    /// Buffer capacity used when none is configured.
    pub fn default_capacity(&self) -> usize {
        match self {
            TransportKind::Spi => DEFAULT_SPI_CAPACITY,
            TransportKind::Pwm | TransportKind::Pcm => DEFAULT_DMA_CAPACITY,
        }
    }

    /// Pin used when none is configured.
    pub fn default_pin(&self) -> u8 {
        match self {
            TransportKind::Spi => 10,
            TransportKind::Pwm => 18,
            TransportKind::Pcm => 21,
        }
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "spi" => Ok(TransportKind::Spi),
            "pwm" => Ok(TransportKind::Pwm),
            "pcm" => Ok(TransportKind::Pcm),
            _ => Err(Error::Configuration(format!("unknown transport: {}", s))),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Spi => write!(f, "spi"),
            TransportKind::Pwm => write!(f, "pwm"),
            TransportKind::Pcm => write!(f, "pcm"),
        }
    }
}

/// Transport selection, fixed for the lifetime of a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// BCM GPIO number of the data pin.
    pub pin: u8,
    /// Complement the signal (no hardware inverter fitted).
    pub invert: bool,
    /// Largest encoded frame the transport accepts, in bytes.
    pub buffer_capacity: usize,
    /// DMA channel feeding the PWM or PCM FIFO. Unused by SPI.
    pub dma_channel: u8,
}

impl TransportConfig {
    /// Creates a config with the kind's default capacity and no inversion.
    pub fn new(kind: TransportKind, pin: u8) -> Self {
        Self {
            kind,
            pin,
            invert: false,
            buffer_capacity: kind.default_capacity(),
            dma_channel: dma::DEFAULT_DMA_CHANNEL,
        }
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_dma_channel(mut self, channel: u8) -> Self {
        self.dma_channel = channel;
        self
    }

    /// Checks the pin against the kind and returns its assignment.
    pub fn validate(&self) -> Result<PinAssignment> {
        if self.buffer_capacity == 0 {
            return Err(Error::Configuration("buffer capacity must be non-zero".into()));
        }
        if self.kind != TransportKind::Spi && !dma::is_usable_channel(self.dma_channel) {
            return Err(Error::Configuration(format!(
                "DMA channel {} is reserved or does not exist (use 4 or 8-14)",
                self.dma_channel
            )));
        }
        pin_assignment(self.kind, self.pin)
    }

    /// Encoded size of a frame of `symbols` symbols on this transport.
    ///
    /// Saturates at `usize::MAX`, so an oversized frame never fits a buffer.
    pub fn encoded_len(&self, symbols: usize) -> usize {
        self.checked_encoded_len(symbols).unwrap_or(usize::MAX)
    }

    /// Encoded size of a frame of `symbols` symbols, or `None` on overflow.
    pub fn checked_encoded_len(&self, symbols: usize) -> Option<usize> {
        match self.kind {
            TransportKind::Spi => spi::encoded_len(symbols),
            TransportKind::Pwm => pwm::encoded_len(symbols),
            TransportKind::Pcm => pcm::encoded_len(symbols),
        }
    }
}

/// Physical data for one frame, as handed to the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    /// Bytes shifted out MSB first (SPI).
    Bytes(Vec<u8>),
    /// One high-time in clock ticks per symbol (PWM).
    DutyCycles(Vec<u32>),
    /// 32-bit sample words shifted out MSB first (PCM).
    Samples(Vec<u32>),
}

impl EncodedFrame {
    /// Size of the frame in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            EncodedFrame::Bytes(bytes) => bytes.len(),
            EncodedFrame::DutyCycles(words) | EncodedFrame::Samples(words) => {
                words.len() * std::mem::size_of::<u32>()
            }
        }
    }
}

/// A transport variant bound to its hardware handle.
pub trait Transport: Send {
    /// Transport kind.
    fn kind(&self) -> TransportKind;

    /// Encoded size in bytes of a frame of `symbols` symbols.
    fn encoded_len(&self, symbols: usize) -> usize;

    /// Maps the signal onto this transport's physical encoding.
    fn encode(&self, signal: &Signal) -> EncodedFrame;

    /// The owned hardware handle.
    fn peripheral(&mut self) -> &mut dyn Peripheral;

    /// Validates, encodes and writes one frame.
    ///
    /// Blocks until the peripheral reports the frame was sent.
    fn transmit(&mut self, signal: &Signal, config: &TransportConfig) -> Result<()> {
        let required = self.encoded_len(signal.len());
        if required > config.buffer_capacity {
            return Err(Error::BufferOverflow {
                required,
                capacity: config.buffer_capacity,
            });
        }

        let frame = self.encode(signal);
        debug!(
            "Transmitting {} symbols as {} bytes over {}",
            signal.len(),
            frame.byte_len(),
            self.kind()
        );
        self.peripheral().write(&frame).map_err(write_error)
    }

    /// Releases the hardware handle.
    fn release(&mut self) -> Result<()> {
        self.peripheral().release()
    }
}

/// Maps a peripheral write failure onto the error the caller sees.
fn write_error(error: std::io::Error) -> Error {
    match PartialWrite::from_io(&error) {
        Some(partial) => Error::PartialFrame {
            sent: partial.sent,
            total: partial.total,
        },
        None => Error::Transport(error),
    }
}

/// Builds the transport variant for `kind` around an opened peripheral.
pub fn build(kind: TransportKind, peripheral: Box<dyn Peripheral>) -> Box<dyn Transport> {
    match kind {
        TransportKind::Spi => Box::new(SpiTransport::new(peripheral)),
        TransportKind::Pwm => Box::new(PwmTransport::new(peripheral)),
        TransportKind::Pcm => Box::new(PcmTransport::new(peripheral)),
    }
}
