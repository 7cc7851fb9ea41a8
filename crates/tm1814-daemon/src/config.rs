//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tm1814_hw::{BitOrder, ChannelOrder, DriverConfig, Timing, TransportConfig, TransportKind};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Strip configuration
    #[serde(default)]
    pub strip: StripConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportSection,

    /// Signal timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Effect configuration
    #[serde(default)]
    pub effect: EffectConfig,

    /// Turn the strip off before exiting
    #[serde(default = "default_clear_on_exit")]
    pub clear_on_exit: bool,
}

/// Strip configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripConfig {
    /// Number of LEDs
    #[serde(default = "default_leds")]
    pub leds: usize,

    /// Order the channels are sent in (e.g., "RGBW", "GRBW")
    #[serde(default = "default_channel_order")]
    pub channel_order: String,

    /// Global brightness (0-255)
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Bit order within a channel: "msb" or "lsb"
    #[serde(default = "default_bit_order")]
    pub bit_order: String,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            leds: default_leds(),
            channel_order: default_channel_order(),
            brightness: default_brightness(),
            bit_order: default_bit_order(),
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Transport: spi, pwm or pcm
    #[serde(default = "default_kind")]
    pub kind: String,

    /// BCM GPIO pin (defaults per transport)
    #[serde(default)]
    pub pin: Option<u8>,

    /// Invert the output signal. Off by default: the recommended wiring
    /// uses an inverting level shifter, and SPI and PCM cannot hold an
    /// inverted line high between frames.
    #[serde(default)]
    pub invert: bool,

    /// Transport buffer capacity in bytes (defaults per transport)
    #[serde(default)]
    pub buffer_capacity: Option<usize>,

    /// spidev node override (e.g., "/dev/spidev0.0")
    #[serde(default)]
    pub spi_device: Option<String>,

    /// DMA channel feeding PWM and PCM
    #[serde(default = "default_dma_channel")]
    pub dma_channel: u8,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            pin: None,
            invert: false,
            buffer_capacity: None,
            spi_device: None,
            dma_channel: default_dma_channel(),
        }
    }
}

/// Signal timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Protocol bit rate in Hz
    #[serde(default = "default_bit_rate")]
    pub bit_rate_hz: u32,

    /// Reset (latch) period in microseconds
    #[serde(default = "default_reset_us")]
    pub reset_us: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bit_rate_hz: default_bit_rate(),
            reset_us: default_reset_us(),
        }
    }
}

/// Effect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Effect: solid, rainbow, breathing, chase, off
    #[serde(default = "default_effect")]
    pub name: String,

    /// Base color for solid, breathing and chase (#RRGGBB or #RRGGBBWW)
    #[serde(default = "default_color")]
    pub color: String,

    /// Speed (1-5)
    #[serde(default = "default_speed")]
    pub speed: u8,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            name: default_effect(),
            color: default_color(),
            speed: default_speed(),
            fps: default_fps(),
        }
    }
}

// Default value functions
fn default_clear_on_exit() -> bool {
    true
}

fn default_leds() -> usize {
    60
}

fn default_channel_order() -> String {
    "RGBW".to_string()
}

fn default_brightness() -> u8 {
    255
}

fn default_bit_order() -> String {
    "msb".to_string()
}

fn default_kind() -> String {
    "spi".to_string()
}

fn default_dma_channel() -> u8 {
    tm1814_hw::hal::DEFAULT_DMA_CHANNEL
}

fn default_bit_rate() -> u32 {
    tm1814_hw::timing::DEFAULT_BIT_RATE_HZ
}

fn default_reset_us() -> u32 {
    tm1814_hw::timing::DEFAULT_RESET_US
}

fn default_effect() -> String {
    "rainbow".to_string()
}

fn default_color() -> String {
    "#000000FF".to_string()
}

fn default_speed() -> u8 {
    3
}

fn default_fps() -> u32 {
    30
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Builds the driver configuration, validating every field.
    pub fn to_driver_config(&self) -> Result<DriverConfig> {
        let kind: TransportKind = self.transport.kind.parse()?;
        let mut transport =
            TransportConfig::new(kind, self.transport.pin.unwrap_or_else(|| kind.default_pin()))
                .with_invert(self.transport.invert)
                .with_dma_channel(self.transport.dma_channel);
        if let Some(capacity) = self.transport.buffer_capacity {
            transport = transport.with_buffer_capacity(capacity);
        }

        let config = DriverConfig {
            leds: self.strip.leds,
            order: self.strip.channel_order.parse::<ChannelOrder>()?,
            bit_order: self.strip.bit_order.parse::<BitOrder>()?,
            brightness: self.strip.brightness,
            timing: Timing {
                bit_rate_hz: self.timing.bit_rate_hz,
                reset_us: self.timing.reset_us,
            },
            transport,
            device: self.transport.spi_device.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strip: StripConfig::default(),
            transport: TransportSection::default(),
            timing: TimingConfig::default(),
            effect: EffectConfig::default(),
            clear_on_exit: default_clear_on_exit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.strip.leds, 60);
        assert_eq!(config.effect.name, "rainbow");
        assert!(config.clear_on_exit);

        let driver = config.to_driver_config().unwrap();
        assert_eq!(driver.transport.kind, TransportKind::Spi);
        assert_eq!(driver.transport.pin, 10);
        assert_eq!(driver.transport.buffer_capacity, 4096);
        assert_eq!(driver.transport.dma_channel, 10);
        assert!(!driver.transport.invert);
        assert_eq!(driver.timing, Timing::default());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: Config = toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        let driver = config.to_driver_config().unwrap();
        assert_eq!(config.effect.fps, 30);

        // Shipped for an inverting level shifter, matching the library default.
        assert!(!driver.transport.invert);
        assert_eq!(driver.transport.invert, Config::default().transport.invert);
        assert_eq!(driver.transport.dma_channel, 10);
    }

    #[test]
    fn test_pwm_section() {
        let config: Config = toml::from_str(
            r#"
            [strip]
            leds = 144
            channel_order = "grbw"

            [transport]
            kind = "pwm"
            pin = 12
            invert = true
            dma_channel = 14
            "#,
        )
        .unwrap();

        let driver = config.to_driver_config().unwrap();
        assert_eq!(driver.leds, 144);
        assert_eq!(driver.order, ChannelOrder::GRBW);
        assert_eq!(driver.transport.kind, TransportKind::Pwm);
        assert!(driver.transport.invert);
        assert_eq!(driver.transport.dma_channel, 14);
        assert_eq!(driver.transport.buffer_capacity, 65536);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.transport.kind = "i2s".to_string();
        assert!(config.to_driver_config().is_err());

        let mut config = Config::default();
        config.transport.pin = Some(4);
        assert!(config.to_driver_config().is_err());

        let mut config = Config::default();
        config.strip.channel_order = "RRGB".to_string();
        assert!(config.to_driver_config().is_err());

        let mut config = Config::default();
        config.transport.kind = "pcm".to_string();
        config.transport.dma_channel = 5;
        assert!(config.to_driver_config().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("tm1814d-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.strip.leds = 12;
        config.transport.spi_device = Some("/dev/spidev1.0".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.strip.leds, 12);
        assert_eq!(loaded.transport.spi_device.as_deref(), Some("/dev/spidev1.0"));
        assert_eq!(loaded.transport.pin, None);
    }
}
