//! Per-channel bit encoding.

use std::str::FromStr;

use crate::{Error, Result};

/// One protocol bit period on the data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Logical 0 (short pulse).
    Zero,
    /// Logical 1 (long pulse).
    One,
    /// Line held at idle level for a whole bit period (reset/latch).
    Reset,
}

impl Symbol {
    /// Returns the data symbol for a bit value.
    #[inline]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Symbol::One
        } else {
            Symbol::Zero
        }
    }

    /// Returns the bit value carried by a data symbol.
    #[inline]
    pub fn bit(&self) -> Option<bool> {
        match self {
            Symbol::Zero => Some(false),
            Symbol::One => Some(true),
            Symbol::Reset => None,
        }
    }
}

/// Order in which the bits of a channel value are shifted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Most significant bit first (what the TM1814 expects).
    #[default]
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

impl FromStr for BitOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "msb" | "msb-first" | "msb_first" => Ok(BitOrder::MsbFirst),
            "lsb" | "lsb-first" | "lsb_first" => Ok(BitOrder::LsbFirst),
            _ => Err(Error::Configuration(format!("unknown bit order: {}", s))),
        }
    }
}

impl std::fmt::Display for BitOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitOrder::MsbFirst => write!(f, "msb"),
            BitOrder::LsbFirst => write!(f, "lsb"),
        }
    }
}

/// Number of symbols per channel value.
pub const SYMBOLS_PER_CHANNEL: usize = 8;

/// Encodes one channel value into its eight data symbols.
#[inline]
pub fn encode(value: u8, order: BitOrder) -> [Symbol; SYMBOLS_PER_CHANNEL] {
    let mut symbols = [Symbol::Zero; SYMBOLS_PER_CHANNEL];
    for (i, slot) in symbols.iter_mut().enumerate() {
        let shift = match order {
            BitOrder::MsbFirst => 7 - i,
            BitOrder::LsbFirst => i,
        };
        *slot = Symbol::from_bit((value >> shift) & 1 == 1);
    }
    symbols
}

/// Decodes eight data symbols back into a channel value.
///
/// Returns `None` if any of the symbols is a reset period.
pub fn decode(symbols: &[Symbol], order: BitOrder) -> Option<u8> {
    if symbols.len() != SYMBOLS_PER_CHANNEL {
        return None;
    }
    let mut value = 0u8;
    for (i, symbol) in symbols.iter().enumerate() {
        if symbol.bit()? {
            let shift = match order {
                BitOrder::MsbFirst => 7 - i,
                BitOrder::LsbFirst => i,
            };
            value |= 1 << shift;
        }
    }
    Some(value)
}
