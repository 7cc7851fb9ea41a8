//! PCM transport.
//!
//! The PCM block is set up for one 32-bit channel per frame with no gaps,
//! so DOUT becomes a continuous bit stream at the PCM bit clock. The clock
//! runs at three times the protocol bit rate and the chips are the same as
//! for SPI, grouped into 32-bit sample words.

use super::chips;
use super::{EncodedFrame, Transport, TransportKind};
use crate::encoding::Signal;
use crate::hal::Peripheral;

const WORD_BYTES: usize = std::mem::size_of::<u32>();

/// PCM bit clock needed for a protocol bit rate.
pub fn clock_hz(bit_rate_hz: u32) -> u32 {
    bit_rate_hz * chips::CHIPS_PER_SYMBOL as u32
}

pub(super) fn encoded_len(symbols: usize) -> Option<usize> {
    chips::checked_packed_len(symbols)?
        .div_ceil(WORD_BYTES)
        .checked_mul(WORD_BYTES)
}

/// PCM variant of [`Transport`].
pub struct PcmTransport {
    peripheral: Box<dyn Peripheral>,
}

impl PcmTransport {
    pub fn new(peripheral: Box<dyn Peripheral>) -> Self {
        Self { peripheral }
    }
}

impl Transport for PcmTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pcm
    }

    fn encoded_len(&self, symbols: usize) -> usize {
        encoded_len(symbols).unwrap_or(usize::MAX)
    }

    fn encode(&self, signal: &Signal) -> EncodedFrame {
        let mut bytes = chips::pack(signal);
        let padded = bytes.len().div_ceil(WORD_BYTES) * WORD_BYTES;
        bytes.resize(padded, chips::idle_byte(signal.polarity()));

        EncodedFrame::Samples(
            bytes
                .chunks_exact(WORD_BYTES)
                .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
                .collect(),
        )
    }

    fn peripheral(&mut self) -> &mut dyn Peripheral {
        self.peripheral.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::inversion::apply;
    use crate::encoding::Symbol;
    use crate::hal::RecordingPeripheral;

    #[test]
    fn test_samples_are_word_padded() {
        let transport = PcmTransport::new(Box::new(RecordingPeripheral::new()));
        // 110 100 -> 1101_0000, then padded to a whole word with idle level.
        let signal = Signal::new(vec![Symbol::One, Symbol::Zero]);
        assert_eq!(
            transport.encode(&signal),
            EncodedFrame::Samples(vec![0xD000_0000])
        );
        assert_eq!(transport.encoded_len(2), 4);

        let inverted = apply(signal, true);
        assert_eq!(
            transport.encode(&inverted),
            EncodedFrame::Samples(vec![0x2FFF_FFFF])
        );
    }

    #[test]
    fn test_encoded_len_matches_frame() {
        let transport = PcmTransport::new(Box::new(RecordingPeripheral::new()));
        for count in [1, 10, 11, 32, 1000] {
            let signal = Signal::new(vec![Symbol::One; count]);
            assert_eq!(transport.encode(&signal).byte_len(), transport.encoded_len(count));
        }
    }
}
