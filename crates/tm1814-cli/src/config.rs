//! Strip settings read from the daemon's configuration file.
//!
//! Every field is optional; unset fields fall back to command-line flags or
//! library defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub strip: StripSection,
    pub transport: TransportSection,
    pub timing: TimingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StripSection {
    pub leds: Option<usize>,
    pub channel_order: Option<String>,
    pub brightness: Option<u8>,
    pub bit_order: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub kind: Option<String>,
    pub pin: Option<u8>,
    pub invert: Option<bool>,
    pub buffer_capacity: Option<usize>,
    pub spi_device: Option<String>,
    pub dma_channel: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub bit_rate_hz: Option<u32>,
    pub reset_us: Option<u32>,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration")
    }
}
