//! Sub-bit ("chip") patterns shared by the clocked bit-stream transports.
//!
//! SPI and PCM both shift out a plain bit stream at a fixed clock. Running
//! that clock at three times the protocol bit rate lets every symbol be drawn
//! as three chips: one high chip for ZERO, two for ONE.

use crate::encoding::{Polarity, Signal, Symbol};

/// Chips per protocol symbol.
pub const CHIPS_PER_SYMBOL: usize = 3;

const ZERO_CHIPS: u8 = 0b100;
const ONE_CHIPS: u8 = 0b110;
const RESET_CHIPS: u8 = 0b000;
const CHIP_MASK: u8 = 0b111;

/// Chip pattern of one symbol, MSB first.
#[inline]
pub fn chips(symbol: Symbol, polarity: Polarity) -> u8 {
    let pattern = match symbol {
        Symbol::Zero => ZERO_CHIPS,
        Symbol::One => ONE_CHIPS,
        Symbol::Reset => RESET_CHIPS,
    };
    match polarity {
        Polarity::Normal => pattern,
        Polarity::Inverted => !pattern & CHIP_MASK,
    }
}

/// Byte the line sits at while idle.
#[inline]
pub fn idle_byte(polarity: Polarity) -> u8 {
    match polarity {
        Polarity::Normal => 0x00,
        Polarity::Inverted => 0xFF,
    }
}

/// Bytes needed for `symbols` symbols, saturating at `usize::MAX`.
pub fn packed_len(symbols: usize) -> usize {
    checked_packed_len(symbols).unwrap_or(usize::MAX)
}

/// Bytes needed for `symbols` symbols, or `None` on overflow.
pub fn checked_packed_len(symbols: usize) -> Option<usize> {
    symbols
        .checked_mul(CHIPS_PER_SYMBOL)
        .map(|chips| chips.div_ceil(8))
}

/// Packs the chips of a signal into bytes, MSB first.
///
/// The last byte is padded with the idle level.
pub fn pack(signal: &Signal) -> Vec<u8> {
    let polarity = signal.polarity();
    let mut out = Vec::with_capacity(packed_len(signal.len()));
    let mut acc: u16 = 0;
    let mut bits = 0;

    for &symbol in signal.symbols() {
        acc = (acc << CHIPS_PER_SYMBOL) | chips(symbol, polarity) as u16;
        bits += CHIPS_PER_SYMBOL;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }

    if bits > 0 {
        let pad = 8 - bits;
        let fill = (idle_byte(polarity) as u16) >> bits;
        out.push(((acc << pad) | fill) as u8);
    }
    out
}

/// Unpacks a chip stream back into symbols. Used to check encoders.
pub fn unpack(bytes: &[u8], symbols: usize, polarity: Polarity) -> Vec<Option<Symbol>> {
    let bit = |i: usize| (bytes[i / 8] >> (7 - i % 8)) & 1;
    (0..symbols)
        .map(|n| {
            let base = n * CHIPS_PER_SYMBOL;
            let pattern = (bit(base) << 2) | (bit(base + 1) << 1) | bit(base + 2);
            [Symbol::Zero, Symbol::One, Symbol::Reset]
                .into_iter()
                .find(|&s| chips(s, polarity) == pattern)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::inversion::apply;

    #[test]
    fn test_packed_len() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(1), 1);
        assert_eq!(packed_len(8), 3);
        assert_eq!(packed_len(9), 4);
    }

    #[test]
    fn test_pack_known_pattern() {
        // 110 100 110 100 000 000 000 000 -> 1101_0011 0100_0000 0000_0000
        let signal = Signal::new(vec![
            Symbol::One,
            Symbol::Zero,
            Symbol::One,
            Symbol::Zero,
            Symbol::Reset,
            Symbol::Reset,
            Symbol::Reset,
            Symbol::Reset,
        ]);
        assert_eq!(pack(&signal), vec![0b1101_0011, 0b0100_0000, 0x00]);
    }

    #[test]
    fn test_inverted_pack_is_complement() {
        let signal = Signal::new(vec![Symbol::One, Symbol::Zero, Symbol::Reset]);
        let normal = pack(&signal);
        let inverted = pack(&apply(signal, true));
        assert_eq!(normal.len(), inverted.len());
        for (a, b) in normal.iter().zip(&inverted) {
            assert_eq!(*a, !*b);
        }
    }

    #[test]
    fn test_unpack_recovers_symbols() {
        let symbols = vec![Symbol::Zero, Symbol::One, Symbol::One, Symbol::Reset, Symbol::Zero];
        for invert in [false, true] {
            let signal = apply(Signal::new(symbols.clone()), invert);
            let bytes = pack(&signal);
            let decoded = unpack(&bytes, symbols.len(), signal.polarity());
            let expected: Vec<_> = symbols.iter().copied().map(Some).collect();
            assert_eq!(decoded, expected);
        }
    }
}
