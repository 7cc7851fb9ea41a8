//! Strip effects, rendered one frame at a time.

use anyhow::{bail, Result};
use std::str::FromStr;
use tm1814_hw::{Pixel, Strip};

/// Effect options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// Every LED shows the configured color.
    Solid,
    /// Color wheel scrolling along the strip.
    #[default]
    Rainbow,
    /// Configured color fading in and out.
    Breathing,
    /// A single lit LED running along the strip.
    Chase,
    /// LEDs off.
    Off,
}

/// Parameters shared by all effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectParams {
    pub color: Pixel,
    /// Speed (1-5)
    pub speed: u8,
}

impl Effect {
    /// Draws frame number `frame` into `strip`.
    pub fn render(&self, frame: u64, params: &EffectParams, strip: &mut Strip) {
        let speed = params.speed.clamp(1, 5) as u64;
        match self {
            Effect::Solid => strip.fill(params.color),
            Effect::Off => strip.clear(),
            Effect::Rainbow => {
                let len = strip.len().max(1) as u64;
                let offset = frame * speed * 2;
                for (i, pixel) in strip.pixels_mut().iter_mut().enumerate() {
                    let position = (i as u64 * 256 / len + offset) % 256;
                    *pixel = wheel(position as u8);
                }
            }
            Effect::Breathing => {
                // Triangle wave over 512 steps
                let phase = (frame * speed * 4) % 512;
                let level = if phase < 256 { phase } else { 511 - phase };
                strip.fill(params.color.scaled(level as u8));
            }
            Effect::Chase => {
                strip.clear();
                if !strip.is_empty() {
                    let position = (frame * speed / 4) as usize % strip.len();
                    strip.set_pixel(position, params.color);
                }
            }
        }
    }

    /// Returns true if every frame is identical.
    pub fn is_static(&self) -> bool {
        matches!(self, Effect::Solid | Effect::Off)
    }
}

/// Maps 0-255 onto a red-green-blue color wheel.
fn wheel(position: u8) -> Pixel {
    let p = position as u16;
    match position {
        0..=84 => Pixel::new((255 - p * 3) as u8, (p * 3) as u8, 0, 0),
        85..=169 => {
            let p = p - 85;
            Pixel::new(0, (255 - p * 3) as u8, (p * 3) as u8, 0)
        }
        _ => {
            let p = p - 170;
            Pixel::new((p * 3) as u8, 0, (255 - p * 3) as u8, 0)
        }
    }
}

impl FromStr for Effect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "solid" => Ok(Effect::Solid),
            "rainbow" => Ok(Effect::Rainbow),
            "breathing" => Ok(Effect::Breathing),
            "chase" => Ok(Effect::Chase),
            "off" => Ok(Effect::Off),
            _ => bail!(
                "Invalid effect: {}. Use: solid, rainbow, breathing, chase, off",
                s
            ),
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Solid => write!(f, "solid"),
            Effect::Rainbow => write!(f, "rainbow"),
            Effect::Breathing => write!(f, "breathing"),
            Effect::Chase => write!(f, "chase"),
            Effect::Off => write!(f, "off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Pixel = Pixel::new(0, 0, 0, 255);

    fn params(speed: u8) -> EffectParams {
        EffectParams { color: WHITE, speed }
    }

    #[test]
    fn test_effect_from_str() {
        assert_eq!("Rainbow".parse::<Effect>().unwrap(), Effect::Rainbow);
        assert_eq!("chase".parse::<Effect>().unwrap(), Effect::Chase);
        assert!("sparkle".parse::<Effect>().is_err());
        for effect in [Effect::Solid, Effect::Breathing, Effect::Off] {
            assert_eq!(effect.to_string().parse::<Effect>().unwrap(), effect);
        }
    }

    #[test]
    fn test_solid_and_off() {
        let mut strip = Strip::new(4);
        Effect::Solid.render(7, &params(3), &mut strip);
        assert!(strip.pixels().iter().all(|p| *p == WHITE));
        Effect::Off.render(8, &params(3), &mut strip);
        assert!(strip.pixels().iter().all(|p| *p == Pixel::OFF));
        assert!(Effect::Off.is_static());
        assert!(!Effect::Rainbow.is_static());
    }

    #[test]
    fn test_wheel_primaries() {
        assert_eq!(wheel(0), Pixel::new(255, 0, 0, 0));
        assert_eq!(wheel(85), Pixel::new(0, 255, 0, 0));
        assert_eq!(wheel(170), Pixel::new(0, 0, 255, 0));
    }

    #[test]
    fn test_rainbow_scrolls() {
        let mut first = Strip::new(8);
        let mut second = Strip::new(8);
        Effect::Rainbow.render(0, &params(1), &mut first);
        Effect::Rainbow.render(1, &params(1), &mut second);
        assert_eq!(first.get_pixel(0), Some(wheel(0)));
        assert_ne!(first, second);
    }

    #[test]
    fn test_breathing_fades() {
        let mut strip = Strip::new(1);
        Effect::Breathing.render(0, &params(1), &mut strip);
        assert_eq!(strip.get_pixel(0), Some(Pixel::OFF));
        // Peak at phase 255: frame * 4 == 252 is the closest step
        Effect::Breathing.render(63, &params(1), &mut strip);
        assert_eq!(strip.get_pixel(0).unwrap().w, 252);
        Effect::Breathing.render(128, &params(1), &mut strip);
        assert_eq!(strip.get_pixel(0), Some(Pixel::OFF));
    }

    #[test]
    fn test_chase_lights_one_led() {
        let mut strip = Strip::new(5);
        Effect::Chase.render(8, &params(2), &mut strip);
        let lit: Vec<usize> = (0..5)
            .filter(|&i| strip.get_pixel(i) != Some(Pixel::OFF))
            .collect();
        assert_eq!(lit, vec![4]);

        let mut empty = Strip::new(0);
        Effect::Chase.render(3, &params(2), &mut empty);
    }
}
