//! TM1814 Strip Hardware Library
//!
//! Drives TM1814 RGBW LED strips from a Raspberry Pi over SPI, PWM or PCM,
//! with optional signal inversion for boards without a level-shifting inverter.

pub mod driver;
pub mod encoding;
pub mod error;
pub mod hal;
pub mod strip;
pub mod timing;
pub mod transport;

pub use driver::{DriverConfig, DriverState, StripDriver};
pub use encoding::{BitOrder, ChannelOrder, FrameSerializer, InversionPolicy, Signal, Symbol};
pub use error::{Error, Result};
pub use hal::{Peripheral, RecordingPeripheral};
pub use strip::{parse_hex_color, Channel, Pixel, Strip};
pub use timing::Timing;
pub use transport::{EncodedFrame, TransportConfig, TransportKind};
