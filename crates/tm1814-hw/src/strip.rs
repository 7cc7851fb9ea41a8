//! RGBW pixel buffer for a TM1814 strip.

use crate::{Error, Result};

/// One of the four colour channels of a TM1814 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
    White,
}

impl Channel {
    /// All channels, in R, G, B, W order.
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::White];

    /// Parses a single channel letter (case-insensitive).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Channel::Red),
            'G' => Some(Channel::Green),
            'B' => Some(Channel::Blue),
            'W' => Some(Channel::White),
            _ => None,
        }
    }

    /// Returns the channel letter.
    pub fn as_char(&self) -> char {
        match self {
            Channel::Red => 'R',
            Channel::Green => 'G',
            Channel::Blue => 'B',
            Channel::White => 'W',
        }
    }
}

/// A single RGBW pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Pixel {
    /// All channels off.
    pub const OFF: Pixel = Pixel::new(0, 0, 0, 0);

    /// Creates a pixel from its channel values.
    pub const fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// Returns the value of one channel.
    #[inline]
    pub fn channel(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Red => self.r,
            Channel::Green => self.g,
            Channel::Blue => self.b,
            Channel::White => self.w,
        }
    }

    /// Unpacks a `0xWWRRGGBB` colour word.
    pub fn from_packed(color: u32) -> Self {
        Self {
            w: (color >> 24) as u8,
            r: (color >> 16) as u8,
            g: (color >> 8) as u8,
            b: color as u8,
        }
    }

    /// Packs the pixel into a `0xWWRRGGBB` colour word.
    pub fn to_packed(&self) -> u32 {
        (self.w as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Scales every channel by a global brightness (255 leaves the pixel unchanged).
    #[inline]
    pub fn scaled(&self, brightness: u8) -> Self {
        Self {
            r: scale(self.r, brightness),
            g: scale(self.g, brightness),
            b: scale(self.b, brightness),
            w: scale(self.w, brightness),
        }
    }
}

#[inline]
fn scale(value: u8, brightness: u8) -> u8 {
    ((value as u16 * (brightness as u16 + 1)) >> 8) as u8
}

/// Ordered sequence of pixels, one per LED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strip {
    pixels: Vec<Pixel>,
}

impl Strip {
    /// Creates a strip of `len` LEDs, all off.
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Pixel::OFF; len],
        }
    }

    /// Creates a strip from existing pixel data.
    pub fn from_pixels(pixels: Vec<Pixel>) -> Self {
        Self { pixels }
    }

    /// Returns the number of LEDs.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Returns true if the strip has no LEDs.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Returns the pixel data.
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Returns mutable pixel data.
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    /// Sets one pixel. Out-of-range indices are ignored.
    pub fn set_pixel(&mut self, index: usize, pixel: Pixel) {
        if let Some(slot) = self.pixels.get_mut(index) {
            *slot = pixel;
        }
    }

    /// Gets one pixel.
    pub fn get_pixel(&self, index: usize) -> Option<Pixel> {
        self.pixels.get(index).copied()
    }

    /// Sets every pixel to the same colour.
    pub fn fill(&mut self, pixel: Pixel) {
        self.pixels.fill(pixel);
    }

    /// Turns every pixel off.
    pub fn clear(&mut self) {
        self.fill(Pixel::OFF);
    }

    /// Copies pixel data from a packed `0xWWRRGGBB` slice.
    pub fn copy_from_packed(&mut self, data: &[u32]) -> Result<()> {
        if data.len() != self.pixels.len() {
            return Err(Error::StripLength {
                expected: self.pixels.len(),
                actual: data.len(),
            });
        }
        for (slot, &color) in self.pixels.iter_mut().zip(data) {
            *slot = Pixel::from_packed(color);
        }
        Ok(())
    }
}

/// Parses `#RRGGBB` or `#RRGGBBWW` into a pixel.
pub fn parse_hex_color(hex: &str) -> Result<Pixel> {
    let digits = hex.trim_start_matches('#');
    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(Error::InvalidColor(hex.to_string()));
    }
    let byte = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| Error::InvalidColor(hex.to_string()))
    };
    let w = if digits.len() == 8 { byte(6)? } else { 0 };
    Ok(Pixel::new(byte(0)?, byte(2)?, byte(4)?, w))
}
