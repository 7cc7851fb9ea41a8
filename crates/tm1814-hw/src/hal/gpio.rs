//! GPIO function select.

use crate::hal::memory::{MemoryBlock, GPIO_PERIPHERAL_OFFSET, GPIO_PERIPHERAL_SIZE};
use crate::Result;

const NUM_GPIO_PINS: u8 = 58;

const REGISTER_SIZE: usize = std::mem::size_of::<u32>();

/// GPIO pin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Output,
    AltFn0,
    AltFn1,
    AltFn2,
    AltFn3,
    AltFn4,
    AltFn5,
}

impl Mode {
    /// Three-bit GPFSEL encoding.
    pub fn to_value(self) -> u32 {
        match self {
            Mode::Input => 0b000,
            Mode::Output => 0b001,
            Mode::AltFn0 => 0b100,
            Mode::AltFn1 => 0b101,
            Mode::AltFn2 => 0b110,
            Mode::AltFn3 => 0b111,
            Mode::AltFn4 => 0b011,
            Mode::AltFn5 => 0b010,
        }
    }
}

/// GPIO register block.
pub struct Gpio {
    mem: MemoryBlock,
}

impl Gpio {
    pub fn open() -> Result<Self> {
        let mem = MemoryBlock::open_peripheral(GPIO_PERIPHERAL_OFFSET, GPIO_PERIPHERAL_SIZE)?;
        Ok(Self { mem })
    }

    /// Sets the function of a pin.
    pub fn set_mode(&self, pin: u8, mode: Mode) {
        let (offset, shift) = fsel_location(pin);
        self.mem
            .modify_register(offset, |v| with_mode(v, shift, mode));
    }
}

/// GPFSEL register value with one pin's field replaced.
fn with_mode(register: u32, shift: u32, mode: Mode) -> u32 {
    (register & !(0b111 << shift)) | (mode.to_value() << shift)
}

/// Byte offset of the GPFSELn register and bit offset of the pin's field.
fn fsel_location(pin: u8) -> (usize, u32) {
    assert!(pin < NUM_GPIO_PINS);
    let offset = (pin as usize / 10) * REGISTER_SIZE;
    let shift = (pin as u32 % 10) * 3;
    (offset, shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_mode_keeps_neighbours() {
        // GPIO 10 and 12 as outputs, GPIO 11 an input.
        let register = 0b001_000_001;
        assert_eq!(with_mode(register, 3, Mode::AltFn0), 0b001_100_001);
        assert_eq!(with_mode(0b111_111_111, 3, Mode::Input), 0b111_000_111);
        assert_eq!(with_mode(0, 27, Mode::AltFn5), 0b010 << 27);
    }

    #[test]
    fn test_fsel_location() {
        assert_eq!(fsel_location(10), (4, 0));
        assert_eq!(fsel_location(18), (4, 24));
        assert_eq!(fsel_location(21), (8, 3));
    }
}
