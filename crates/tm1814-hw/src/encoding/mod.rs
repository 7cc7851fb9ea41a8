//! Protocol-level encoding.
//!
//! Pixels become a stream of [`Symbol`]s: eight per channel, four channels
//! per pixel, followed by the reset period that latches the frame.

pub mod frame;
pub mod inversion;
pub mod order;
pub mod symbol;

pub use frame::{serialize, FrameSerializer, Signal, SYMBOLS_PER_PIXEL};
pub use inversion::{InversionPolicy, Polarity};
pub use order::ChannelOrder;
pub use symbol::{decode, encode, BitOrder, Symbol, SYMBOLS_PER_CHANNEL};
