//! Error types for the TM1814 strip driver.

use thiserror::Error;

use crate::transport::TransportKind;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or driving a strip.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid driver configuration.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Channel order is not a permutation of R, G, B and W.
    #[error("Invalid channel order: {0} (expected a permutation of R, G, B, W)")]
    InvalidChannelOrder(String),

    /// The pin cannot be used with the selected transport.
    #[error("GPIO {pin} cannot be used for {kind} output")]
    InvalidPin { kind: TransportKind, pin: u8 },

    /// The encoded frame does not fit the transport buffer.
    #[error("Encoded frame needs {required} bytes but the transport buffer holds {capacity}")]
    BufferOverflow { required: usize, capacity: usize },

    /// The peripheral is already in use by something else.
    #[error("{peripheral} is already claimed by {holder}")]
    ResourceConflict { peripheral: String, holder: String },

    /// Writing the frame to the peripheral failed.
    #[error("Transport write failed: {0}")]
    Transport(#[source] std::io::Error),

    /// The frame was cut off after part of it reached the strip.
    #[error("Frame cut off after {sent} of {total} bytes; the strip may show a mix of frames")]
    PartialFrame { sent: usize, total: usize },

    /// Device node could not be opened.
    #[error("Device not found at {0}")]
    DeviceNotFound(String),

    /// I/O error while opening or configuring a device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Strip length does not match the configured LED count.
    #[error("Strip length mismatch: expected {expected} LEDs, got {actual}")]
    StripLength { expected: usize, actual: usize },

    /// Invalid colour string.
    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

impl Error {
    /// Returns true if the error can only be fixed by changing the configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidChannelOrder(_)
                | Error::InvalidPin { .. }
                | Error::BufferOverflow { .. }
                | Error::StripLength { .. }
                | Error::InvalidColor(_)
        )
    }

    /// Returns true if a later frame may succeed without any change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::PartialFrame { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let overflow = Error::BufferOverflow {
            required: 4107,
            capacity: 4096,
        };
        assert!(overflow.is_configuration());
        assert!(!overflow.is_transient());

        let write = Error::Transport(std::io::Error::other("bus fault"));
        assert!(write.is_transient());
        assert!(!write.is_configuration());

        let cut = Error::PartialFrame { sent: 8, total: 4095 };
        assert!(cut.is_transient());
        assert!(!cut.is_configuration());

        let conflict = Error::ResourceConflict {
            peripheral: "PWM0".into(),
            holder: "bcm2835 Headphones".into(),
        };
        assert!(!conflict.is_configuration());
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::InvalidPin {
            kind: TransportKind::Pwm,
            pin: 10,
        };
        assert_eq!(err.to_string(), "GPIO 10 cannot be used for pwm output");
    }
}
