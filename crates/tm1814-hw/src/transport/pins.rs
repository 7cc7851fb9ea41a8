//! Which GPIOs can carry which transport (BCM numbering).

use super::TransportKind;
use crate::hal::gpio::Mode;
use crate::{Error, Result};

/// A validated pin for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAssignment {
    pub kind: TransportKind,
    pub pin: u8,
    /// SPI bus, PWM channel or PCM interface number.
    pub unit: u8,
    /// Alternate function the pin must be switched to.
    pub mode: Mode,
}

struct PinSpec {
    kind: TransportKind,
    pin: u8,
    unit: u8,
    mode: Mode,
}

const PIN_SPECS: &[PinSpec] = &[
    PinSpec { kind: TransportKind::Spi, pin: 10, unit: 0, mode: Mode::AltFn0 },
    PinSpec { kind: TransportKind::Spi, pin: 20, unit: 1, mode: Mode::AltFn4 },
    PinSpec { kind: TransportKind::Pwm, pin: 12, unit: 0, mode: Mode::AltFn0 },
    PinSpec { kind: TransportKind::Pwm, pin: 18, unit: 0, mode: Mode::AltFn5 },
    PinSpec { kind: TransportKind::Pwm, pin: 13, unit: 1, mode: Mode::AltFn0 },
    PinSpec { kind: TransportKind::Pwm, pin: 19, unit: 1, mode: Mode::AltFn5 },
    PinSpec { kind: TransportKind::Pcm, pin: 21, unit: 0, mode: Mode::AltFn0 },
    PinSpec { kind: TransportKind::Pcm, pin: 31, unit: 0, mode: Mode::AltFn2 },
];

/// Looks up `pin` for `kind`.
pub fn pin_assignment(kind: TransportKind, pin: u8) -> Result<PinAssignment> {
    PIN_SPECS
        .iter()
        .find(|spec| spec.kind == kind && spec.pin == pin)
        .map(|spec| PinAssignment {
            kind,
            pin,
            unit: spec.unit,
            mode: spec.mode,
        })
        .ok_or(Error::InvalidPin { kind, pin })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pwm_channels() {
        assert_eq!(pin_assignment(TransportKind::Pwm, 18).unwrap().unit, 0);
        assert_eq!(pin_assignment(TransportKind::Pwm, 12).unwrap().unit, 0);
        assert_eq!(pin_assignment(TransportKind::Pwm, 13).unwrap().unit, 1);
        assert_eq!(pin_assignment(TransportKind::Pwm, 19).unwrap().mode, Mode::AltFn5);
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(pin_assignment(TransportKind::Spi, 18).is_err());
        assert!(pin_assignment(TransportKind::Pcm, 10).is_err());
        assert!(pin_assignment(TransportKind::Pwm, 21).is_err());
    }

    #[test]
    fn test_spi_buses() {
        assert_eq!(pin_assignment(TransportKind::Spi, 10).unwrap().unit, 0);
        assert_eq!(pin_assignment(TransportKind::Spi, 20).unwrap().unit, 1);
    }
}
