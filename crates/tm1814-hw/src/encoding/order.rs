//! Channel transmission order.
//!
//! Strips wired or manufactured differently expect the four channels in a
//! different order. A wrong order shows up as wrong colours, never as a
//! corrupted frame.

use crate::strip::{Channel, Pixel};
use crate::{Error, Result};
use std::str::FromStr;

/// Sequence in which the R, G, B and W values of a pixel are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOrder([Channel; 4]);

impl ChannelOrder {
    /// Red, green, blue, white.
    pub const RGBW: ChannelOrder = ChannelOrder([
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::White,
    ]);

    /// Green, red, blue, white.
    pub const GRBW: ChannelOrder = ChannelOrder([
        Channel::Green,
        Channel::Red,
        Channel::Blue,
        Channel::White,
    ]);

    /// Builds an order, checking that it names each channel exactly once.
    pub fn new(channels: &[Channel]) -> Result<Self> {
        let invalid = || {
            Error::InvalidChannelOrder(channels.iter().map(Channel::as_char).collect::<String>())
        };
        if channels.len() != 4 {
            return Err(invalid());
        }
        for channel in Channel::ALL {
            if channels.iter().filter(|&&c| c == channel).count() != 1 {
                return Err(invalid());
            }
        }
        Ok(Self([channels[0], channels[1], channels[2], channels[3]]))
    }

    /// Returns the channels in transmission order.
    pub fn channels(&self) -> &[Channel; 4] {
        &self.0
    }

    /// Returns the channel values of a pixel in transmission order.
    #[inline]
    pub fn arrange(&self, pixel: &Pixel) -> [u8; 4] {
        self.0.map(|channel| pixel.channel(channel))
    }
}

impl Default for ChannelOrder {
    fn default() -> Self {
        ChannelOrder::RGBW
    }
}

impl FromStr for ChannelOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let channels = s
            .trim()
            .chars()
            .map(|c| Channel::from_char(c).ok_or_else(|| Error::InvalidChannelOrder(s.to_string())))
            .collect::<Result<Vec<_>>>()?;
        Self::new(&channels)
    }
}

impl std::fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for channel in &self.0 {
            write!(f, "{}", channel.as_char())?;
        }
        Ok(())
    }
}
