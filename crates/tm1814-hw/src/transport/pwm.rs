//! PWM transport.
//!
//! The PWM channel runs in mark/space mode with a range of
//! [`PWM_TICKS_PER_SYMBOL`] ticks per protocol bit. Each FIFO word is the
//! number of ticks the line stays active for one symbol.

use super::{EncodedFrame, Transport, TransportKind};
use crate::encoding::{Polarity, Signal, Symbol};
use crate::hal::Peripheral;

/// PWM range (clock ticks per symbol).
pub const PWM_TICKS_PER_SYMBOL: u32 = 24;

const ZERO_TICKS: u32 = PWM_TICKS_PER_SYMBOL / 3;
const ONE_TICKS: u32 = 2 * PWM_TICKS_PER_SYMBOL / 3;

/// Active time of one symbol in ticks.
#[inline]
pub fn duty(symbol: Symbol, polarity: Polarity) -> u32 {
    let high = match symbol {
        Symbol::Zero => ZERO_TICKS,
        Symbol::One => ONE_TICKS,
        Symbol::Reset => 0,
    };
    match polarity {
        Polarity::Normal => high,
        Polarity::Inverted => PWM_TICKS_PER_SYMBOL - high,
    }
}

/// PWM clock needed for a protocol bit rate.
pub fn clock_hz(bit_rate_hz: u32) -> u32 {
    bit_rate_hz * PWM_TICKS_PER_SYMBOL
}

pub(super) fn encoded_len(symbols: usize) -> Option<usize> {
    symbols.checked_mul(std::mem::size_of::<u32>())
}

/// PWM variant of [`Transport`].
pub struct PwmTransport {
    peripheral: Box<dyn Peripheral>,
}

impl PwmTransport {
    pub fn new(peripheral: Box<dyn Peripheral>) -> Self {
        Self { peripheral }
    }
}

impl Transport for PwmTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pwm
    }

    fn encoded_len(&self, symbols: usize) -> usize {
        encoded_len(symbols).unwrap_or(usize::MAX)
    }

    fn encode(&self, signal: &Signal) -> EncodedFrame {
        let polarity = signal.polarity();
        EncodedFrame::DutyCycles(
            signal
                .symbols()
                .iter()
                .map(|&symbol| duty(symbol, polarity))
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
    use crate::hal::RecordingPeripheral;
    use crate::transport::TransportConfig;
    use crate::Error;

    #[test]
    fn test_duty_values() {
        assert_eq!(duty(Symbol::Zero, Polarity::Normal), 8);
        assert_eq!(duty(Symbol::One, Polarity::Normal), 16);
        assert_eq!(duty(Symbol::Reset, Polarity::Normal), 0);
        assert_eq!(duty(Symbol::Zero, Polarity::Inverted), 16);
        assert_eq!(duty(Symbol::One, Polarity::Inverted), 8);
        assert_eq!(duty(Symbol::Reset, Polarity::Inverted), 24);
    }

    #[test]
    fn test_encode_one_word_per_symbol() {
        let transport = PwmTransport::new(Box::new(RecordingPeripheral::new()));
        let signal = apply(
            Signal::new(vec![Symbol::One, Symbol::Zero, Symbol::Reset]),
            true,
        );
        assert_eq!(
            transport.encode(&signal),
            EncodedFrame::DutyCycles(vec![8, 16, 24])
        );
        assert_eq!(transport.encoded_len(3), 12);
    }

    #[test]
    fn test_capacity_checked_before_write() {
        let recorder = RecordingPeripheral::new();
        let mut transport = PwmTransport::new(Box::new(recorder.clone()));
        let config = TransportConfig::new(TransportKind::Pwm, 18).with_buffer_capacity(8);
        let signal = Signal::new(vec![Symbol::One; 3]);

        assert!(matches!(
            transport.transmit(&signal, &config),
            Err(Error::BufferOverflow {
                required: 12,
                capacity: 8
            })
        ));
        assert!(recorder.frames().is_empty());
    }
}
