//! SPI transport.
//!
//! MOSI is clocked at three times the protocol bit rate, so every symbol
//! becomes three SPI bits (`110` for ONE, `100` for ZERO). The whole frame
//! has to fit one spidev transfer, which is why the kernel's `bufsiz`
//! parameter caps the strip length.

use super::chips;
use super::{EncodedFrame, Transport, TransportKind};
use crate::encoding::Signal;
use crate::hal::Peripheral;

/// SPI clock needed for a protocol bit rate.
pub fn clock_hz(bit_rate_hz: u32) -> u32 {
    bit_rate_hz * chips::CHIPS_PER_SYMBOL as u32
}

pub(super) fn encoded_len(symbols: usize) -> Option<usize> {
    chips::checked_packed_len(symbols)
}

/// SPI variant of [`Transport`].
pub struct SpiTransport {
    peripheral: Box<dyn Peripheral>,
}

impl SpiTransport {
    pub fn new(peripheral: Box<dyn Peripheral>) -> Self {
        Self { peripheral }
    }
}

impl Transport for SpiTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Spi
    }

    fn encoded_len(&self, symbols: usize) -> usize {
        encoded_len(symbols).unwrap_or(usize::MAX)
    }

    fn encode(&self, signal: &Signal) -> EncodedFrame {
        EncodedFrame::Bytes(chips::pack(signal))
    }

    fn peripheral(&mut self) -> &mut dyn Peripheral {
        self.peripheral.as_mut()
    }
}
