//! Signal inversion.
//!
//! Without a hardware inverter between the Pi and the strip, the driver has
//! to send the complemented waveform itself. Inversion swaps what ZERO and
//! ONE (and the idle level) look like on the wire; the transports apply it
//! when they map symbols to their physical encoding.

use super::frame::Signal;

/// Line polarity of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Active-high pulses, line idles low.
    #[default]
    Normal,
    /// Active-low pulses, line idles high.
    Inverted,
}

impl Polarity {
    /// Returns the opposite polarity.
    pub fn flipped(self) -> Self {
        match self {
            Polarity::Normal => Polarity::Inverted,
            Polarity::Inverted => Polarity::Normal,
        }
    }

    pub fn is_inverted(self) -> bool {
        self == Polarity::Inverted
    }
}

/// Whether the outgoing stream is complemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InversionPolicy {
    invert: bool,
}

impl InversionPolicy {
    pub fn new(invert: bool) -> Self {
        Self { invert }
    }

    pub fn inverts(&self) -> bool {
        self.invert
    }

    /// Applies the policy to a serialized frame.
    pub fn apply(&self, signal: Signal) -> Signal {
        apply(signal, self.invert)
    }
}

/// Flips the polarity of `signal` when `invert` is set.
pub fn apply(signal: Signal, invert: bool) -> Signal {
    if invert {
        let polarity = signal.polarity().flipped();
        signal.with_polarity(polarity)
    } else {
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Symbol;

    fn sample() -> Signal {
        Signal::new(vec![Symbol::One, Symbol::Zero, Symbol::Reset])
    }

    #[test]
    fn test_apply_twice_is_identity() {
        let original = sample();
        assert_eq!(apply(apply(original.clone(), true), true), original);
    }

    #[test]
    fn test_apply_false_is_noop() {
        assert_eq!(apply(sample(), false), sample());
    }

    #[test]
    fn test_apply_flips_polarity_only() {
        let inverted = InversionPolicy::new(true).apply(sample());
        assert_eq!(inverted.polarity(), Polarity::Inverted);
        assert_eq!(inverted.symbols(), sample().symbols());
    }
}
