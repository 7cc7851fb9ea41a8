//! Hardware handles.
//!
//! Each handle is opened explicitly, owned by exactly one transport and
//! released on every exit path (explicitly, or on drop).

pub mod audio;
pub mod clock;
pub mod dma;
pub mod gpio;
mod mailbox;
pub mod memory;
mod pcm;
mod pwm;
mod recording;
pub mod spidev;

use std::io;

use thiserror::Error;
use tracing::warn;

use crate::timing::Timing;
use crate::transport::{self, EncodedFrame, TransportConfig, TransportKind};
use crate::Result;

pub use dma::DEFAULT_DMA_CHANNEL;
pub use pcm::PcmPeripheral;
pub use pwm::PwmPeripheral;
pub use recording::RecordingPeripheral;
pub use spidev::SpiDevice;

/// A write that failed after part of the frame had already reached the strip.
///
/// Peripherals return it wrapped in an [`io::Error`] so the transport can
/// tell a cut-off frame from one that never left the Pi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame cut off after {sent} of {total} bytes")]
pub struct PartialWrite {
    pub sent: usize,
    pub total: usize,
}

impl PartialWrite {
    pub fn new(sent: usize, total: usize) -> Self {
        Self { sent, total }
    }

    /// Finds a partial write inside an I/O error.
    pub fn from_io(error: &io::Error) -> Option<Self> {
        error.get_ref()?.downcast_ref::<PartialWrite>().copied()
    }
}

impl From<PartialWrite> for io::Error {
    fn from(partial: PartialWrite) -> Self {
        io::Error::other(partial)
    }
}

/// An opened peripheral that accepts encoded frames.
pub trait Peripheral: Send {
    /// Human-readable name for logs and errors.
    fn name(&self) -> String;

    /// Returns who else holds the peripheral, if anyone.
    fn claimed_by(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Programs the peripheral for output. Called once, after the claim check.
    fn enable(&mut self) -> Result<()> {
        Ok(())
    }

    /// Writes one whole frame, blocking until it has been shifted out.
    ///
    /// Fails with a [`PartialWrite`] if the frame was cut off mid-way.
    fn write(&mut self, frame: &EncodedFrame) -> io::Result<()>;

    /// Stops output and gives the peripheral back. Safe to call twice.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens the hardware handle for `config`.
///
/// `device` overrides the spidev node derived from the pin.
pub fn open(
    config: &TransportConfig,
    timing: &Timing,
    device: Option<&str>,
) -> Result<Box<dyn Peripheral>> {
    let assignment = config.validate()?;
    match config.kind {
        TransportKind::Spi => {
            if config.invert {
                warn!("MOSI idles low between transfers; inverted output needs a pull-up or an external inverter");
            }
            let path = device
                .map(str::to_string)
                .unwrap_or_else(|| spidev::device_path(assignment.unit));
            let speed = transport::spi_clock_hz(timing.bit_rate_hz);
            Ok(Box::new(SpiDevice::open(&path, speed)?))
        }
        TransportKind::Pwm => Ok(Box::new(PwmPeripheral::open(assignment, *timing, config)?)),
        TransportKind::Pcm => {
            if config.invert {
                warn!("PCM DOUT drops low after each frame; inverted output needs a pull-up or an external inverter");
            }
            Ok(Box::new(PcmPeripheral::open(assignment, *timing, config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_write_survives_io_error() {
        let error: io::Error = PartialWrite::new(120, 4095).into();
        assert_eq!(PartialWrite::from_io(&error), Some(PartialWrite::new(120, 4095)));
        assert_eq!(error.to_string(), "frame cut off after 120 of 4095 bytes");

        assert_eq!(PartialWrite::from_io(&io::Error::other("bus fault")), None);
        assert_eq!(
            PartialWrite::from_io(&io::Error::from(io::ErrorKind::TimedOut)),
            None
        );
    }
}
