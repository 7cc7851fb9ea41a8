//! Whole-strip frame assembly.

use super::inversion::Polarity;
use super::order::ChannelOrder;
use super::symbol::{encode, BitOrder, Symbol, SYMBOLS_PER_CHANNEL};
use crate::strip::{Channel, Strip};
use crate::timing::Timing;
use crate::Result;

/// Number of data symbols per pixel (4 channels x 8 bits).
pub const SYMBOLS_PER_PIXEL: usize = 4 * SYMBOLS_PER_CHANNEL;

/// Symbol stream for one frame, plus the polarity it must be sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    symbols: Vec<Symbol>,
    polarity: Polarity,
}

impl Signal {
    /// Wraps a symbol stream with normal polarity.
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self {
            symbols,
            polarity: Polarity::Normal,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub(crate) fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }
}

/// Turns a strip into the symbol stream for one frame.
#[derive(Debug, Clone)]
pub struct FrameSerializer {
    order: ChannelOrder,
    bit_order: BitOrder,
    brightness: u8,
    reset_symbols: usize,
}

impl FrameSerializer {
    /// Creates a serializer at full brightness, MSB first.
    pub fn new(order: ChannelOrder, timing: &Timing) -> Self {
        Self {
            order,
            bit_order: BitOrder::default(),
            brightness: u8::MAX,
            reset_symbols: timing.reset_symbols(),
        }
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    /// Number of idle symbols appended after the pixel data.
    pub fn reset_symbols(&self) -> usize {
        self.reset_symbols
    }

    /// Symbol count of a frame for `leds` pixels. Independent of pixel values.
    ///
    /// Saturates at `usize::MAX`, which no buffer can hold.
    pub fn symbol_count(&self, leds: usize) -> usize {
        self.checked_symbol_count(leds).unwrap_or(usize::MAX)
    }

    /// Symbol count of a frame for `leds` pixels, or `None` on overflow.
    pub fn checked_symbol_count(&self, leds: usize) -> Option<usize> {
        leds.checked_mul(SYMBOLS_PER_PIXEL)?
            .checked_add(self.reset_symbols)
    }

    /// Serializes every pixel in strip order, then the reset period.
    pub fn serialize(&self, strip: &Strip) -> Signal {
        let mut symbols = Vec::with_capacity(self.symbol_count(strip.len()));
        for pixel in strip.pixels() {
            let pixel = pixel.scaled(self.brightness);
            for value in self.order.arrange(&pixel) {
                symbols.extend_from_slice(&encode(value, self.bit_order));
            }
        }
        symbols.resize(symbols.len() + self.reset_symbols, Symbol::Reset);
        Signal::new(symbols)
    }
}

/// Serializes a strip with an unchecked channel order.
///
/// Fails if `channels` is not a permutation of R, G, B and W.
pub fn serialize(strip: &Strip, channels: &[Channel], timing: &Timing) -> Result<Signal> {
    let order = ChannelOrder::new(channels)?;
    Ok(FrameSerializer::new(order, timing).serialize(strip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::symbol::decode;
    use crate::strip::Pixel;
    use crate::Error;

    fn pixel_values(signal: &Signal, index: usize) -> Vec<u8> {
        let start = index * SYMBOLS_PER_PIXEL;
        signal.symbols()[start..start + SYMBOLS_PER_PIXEL]
            .chunks(SYMBOLS_PER_CHANNEL)
            .map(|chunk| decode(chunk, BitOrder::MsbFirst).unwrap())
            .collect()
    }

    #[test]
    fn test_length_is_independent_of_pixel_values() {
        let timing = Timing::default();
        let serializer = FrameSerializer::new(ChannelOrder::RGBW, &timing);
        for len in [0, 1, 7, 300] {
            let mut strip = Strip::new(len);
            let dark = serializer.serialize(&strip);
            strip.fill(Pixel::new(255, 17, 0, 200));
            let lit = serializer.serialize(&strip);
            let expected = len * 4 * 8 + timing.reset_symbols();
            assert_eq!(dark.len(), expected);
            assert_eq!(lit.len(), expected);
            assert_eq!(serializer.symbol_count(len), expected);
        }
    }

    #[test]
    fn test_channel_order_and_reset_tail() {
        let timing = Timing::default();
        let strip = Strip::from_pixels(vec![Pixel::new(1, 2, 3, 4), Pixel::new(5, 6, 7, 8)]);
        let signal = FrameSerializer::new(ChannelOrder::GRBW, &timing).serialize(&strip);

        assert_eq!(pixel_values(&signal, 0), vec![2, 1, 3, 4]);
        assert_eq!(pixel_values(&signal, 1), vec![6, 5, 7, 8]);
        assert!(signal.symbols()[2 * SYMBOLS_PER_PIXEL..]
            .iter()
            .all(|s| *s == Symbol::Reset));
    }

    #[test]
    fn test_brightness_applies_before_encoding() {
        let timing = Timing::default();
        let strip = Strip::from_pixels(vec![Pixel::new(255, 0, 0, 128)]);
        let signal = FrameSerializer::new(ChannelOrder::RGBW, &timing)
            .with_brightness(127)
            .serialize(&strip);
        assert_eq!(pixel_values(&signal, 0), vec![127, 0, 0, 64]);
    }

    #[test]
    fn test_serialize_rejects_bad_order() {
        let strip = Strip::new(1);
        let result = serialize(
            &strip,
            &[Channel::Red, Channel::Green, Channel::Blue],
            &Timing::default(),
        );
        assert!(matches!(result, Err(Error::InvalidChannelOrder(_))));
    }
}
