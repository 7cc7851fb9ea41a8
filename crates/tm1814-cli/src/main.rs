//! TM1814 Strip Control Tool
//!
//! CLI for one-shot commands against a TM1814 strip.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tm1814_hw::{
    parse_hex_color, BitOrder, Channel, ChannelOrder, DriverConfig, Pixel, RecordingPeripheral,
    Strip, StripDriver, Timing, TransportConfig, TransportKind,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::FileConfig;

/// LED count used when neither the flags nor the config file name one.
const DEFAULT_LEDS: usize = 60;

#[derive(Parser)]
#[command(name = "tm1814ctl")]
#[command(about = "Control tool for TM1814 RGBW LED strips")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (same format as tm1814d)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport: spi, pwm or pcm
    #[arg(long)]
    transport: Option<TransportKind>,

    /// BCM GPIO data pin
    #[arg(long)]
    pin: Option<u8>,

    /// Number of LEDs
    #[arg(long)]
    leds: Option<usize>,

    /// Invert the output signal (--invert or --invert=false)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    invert: Option<bool>,

    /// Transport buffer capacity in bytes
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Channel order (e.g., RGBW, GRBW)
    #[arg(long)]
    order: Option<ChannelOrder>,

    /// Global brightness (0-255)
    #[arg(long)]
    brightness: Option<u8>,

    /// spidev node override
    #[arg(long)]
    device: Option<String>,

    /// DMA channel for PWM and PCM
    #[arg(long)]
    dma: Option<u8>,

    /// Encode frames without touching the hardware
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set every LED to one color
    Fill {
        /// Color in hex format (#RRGGBB or #RRGGBBWW)
        color: String,
    },
    /// Turn off all LEDs
    Clear,
    /// Light a single LED, all others off
    Pixel {
        /// LED index, starting at 0
        index: usize,
        /// Color in hex format (#RRGGBB or #RRGGBBWW)
        color: String,
    },
    /// Light red, green, blue and white in turn to check the channel order
    Test {
        /// Time each color is shown, in milliseconds
        #[arg(long, default_value = "1000")]
        delay: u64,
    },
    /// Show frame size and timing without opening the hardware
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = build_config(&cli)?;

    let dry_run = cli.dry_run;
    match cli.command {
        Commands::Fill { color } => with_driver(config, dry_run, |d| handle_fill(d, &color)),
        Commands::Clear => with_driver(config, dry_run, handle_clear),
        Commands::Pixel { index, color } => {
            with_driver(config, dry_run, |d| handle_pixel(d, index, &color))
        }
        Commands::Test { delay } => with_driver(config, dry_run, |d| {
            handle_test(d, Duration::from_millis(delay))
        }),
        Commands::Info { json } => handle_info(&config, json),
    }
}

/// Opens the strip (or a recording stand-in), runs `f` and releases it.
fn with_driver<F>(config: DriverConfig, dry_run: bool, f: F) -> Result<()>
where
    F: FnOnce(&mut StripDriver) -> Result<()>,
{
    let recorder = dry_run.then(RecordingPeripheral::new);
    let mut driver = match &recorder {
        Some(recorder) => StripDriver::with_peripheral(config, Box::new(recorder.clone())),
        None => StripDriver::initialize(config),
    }
    .context("Failed to initialize strip")?;

    let result = f(&mut driver);
    debug!("{} frame(s) rendered", driver.frames_rendered());
    driver.shutdown().context("Failed to release strip")?;
    result?;

    if let Some(recorder) = recorder {
        let frames = recorder.frames();
        for (i, frame) in frames.iter().enumerate() {
            debug!("Dry run frame {}: {} bytes", i, frame.byte_len());
        }
        let bytes = frames.last().map(|f| f.byte_len()).unwrap_or(0);
        println!(
            "Dry run: {} frame(s) encoded, {} bytes each",
            frames.len(),
            bytes
        );
    }

    Ok(())
}

/// Merges flags over the config file over library defaults.
fn build_config(cli: &Cli) -> Result<DriverConfig> {
    let file = match &cli.config {
        Some(path) => {
            let file = FileConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            debug!("Loaded configuration from {}", path.display());
            file
        }
        None => FileConfig::default(),
    };

    let kind = match (cli.transport, &file.transport.kind) {
        (Some(kind), _) => kind,
        (None, Some(kind)) => kind.parse()?,
        (None, None) => TransportKind::default(),
    };
    let pin = cli
        .pin
        .or(file.transport.pin)
        .unwrap_or_else(|| kind.default_pin());
    let capacity = cli
        .buffer_capacity
        .or(file.transport.buffer_capacity)
        .unwrap_or_else(|| kind.default_capacity());
    let mut transport = TransportConfig::new(kind, pin)
        .with_invert(cli.invert.or(file.transport.invert).unwrap_or(false))
        .with_buffer_capacity(capacity);
    if let Some(channel) = cli.dma.or(file.transport.dma_channel) {
        transport = transport.with_dma_channel(channel);
    }

    let order = match (cli.order, &file.strip.channel_order) {
        (Some(order), _) => order,
        (None, Some(order)) => order.parse()?,
        (None, None) => ChannelOrder::default(),
    };
    let bit_order = match &file.strip.bit_order {
        Some(bit_order) => bit_order.parse()?,
        None => BitOrder::default(),
    };

    let defaults = Timing::default();
    let timing = Timing {
        bit_rate_hz: file.timing.bit_rate_hz.unwrap_or(defaults.bit_rate_hz),
        reset_us: file.timing.reset_us.unwrap_or(defaults.reset_us),
    };

    let config = DriverConfig {
        leds: cli.leds.or(file.strip.leds).unwrap_or(DEFAULT_LEDS),
        order,
        bit_order,
        brightness: cli.brightness.or(file.strip.brightness).unwrap_or(u8::MAX),
        timing,
        transport,
        device: cli.device.clone().or(file.transport.spi_device),
    };
    config.validate()?;
    Ok(config)
}

fn handle_fill(driver: &mut StripDriver, color: &str) -> Result<()> {
    let pixel = parse_hex_color(color)?;
    let mut strip = Strip::new(driver.leds());
    strip.fill(pixel);
    driver.render(&strip)?;
    println!("Strip filled with: {}", color);
    Ok(())
}

fn handle_clear(driver: &mut StripDriver) -> Result<()> {
    driver.clear()?;
    println!("Strip cleared");
    Ok(())
}

fn handle_pixel(driver: &mut StripDriver, index: usize, color: &str) -> Result<()> {
    if index >= driver.leds() {
        anyhow::bail!(
            "LED index {} out of range (strip has {} LEDs)",
            index,
            driver.leds()
        );
    }
    let mut strip = Strip::new(driver.leds());
    strip.set_pixel(index, parse_hex_color(color)?);
    driver.render(&strip)?;
    println!("LED {} set to: {}", index, color);
    Ok(())
}

fn handle_test(driver: &mut StripDriver, delay: Duration) -> Result<()> {
    let mut strip = Strip::new(driver.leds());
    for channel in Channel::ALL {
        strip.fill(channel_pixel(channel));
        driver.render(&strip)?;
        println!("Showing {}", channel_name(channel));
        std::thread::sleep(delay);
    }
    driver.clear()?;
    println!("Test complete; if a color was wrong, adjust --order");
    Ok(())
}

fn channel_pixel(channel: Channel) -> Pixel {
    match channel {
        Channel::Red => Pixel::new(255, 0, 0, 0),
        Channel::Green => Pixel::new(0, 255, 0, 0),
        Channel::Blue => Pixel::new(0, 0, 255, 0),
        Channel::White => Pixel::new(0, 0, 0, 255),
    }
}

fn channel_name(channel: Channel) -> &'static str {
    match channel {
        Channel::Red => "red",
        Channel::Green => "green",
        Channel::Blue => "blue",
        Channel::White => "white",
    }
}

#[derive(Debug, Serialize)]
struct FrameInfo {
    leds: usize,
    order: String,
    transport: String,
    pin: u8,
    invert: bool,
    /// Only set for the DMA-fed transports.
    dma_channel: Option<u8>,
    symbols: usize,
    reset_symbols: usize,
    frame_time_us: u128,
    buffer_capacity: usize,
    frame_bytes: usize,
    fits: bool,
    encoded_bytes: Vec<TransportSize>,
}

#[derive(Debug, Serialize)]
struct TransportSize {
    transport: String,
    bytes: usize,
    default_capacity: usize,
}

fn frame_info(config: &DriverConfig) -> FrameInfo {
    let symbols = config.symbol_count();
    let encoded_bytes = [TransportKind::Spi, TransportKind::Pwm, TransportKind::Pcm]
        .into_iter()
        .map(|kind| TransportSize {
            transport: kind.to_string(),
            bytes: TransportConfig::new(kind, kind.default_pin()).encoded_len(symbols),
            default_capacity: kind.default_capacity(),
        })
        .collect();

    FrameInfo {
        leds: config.leds,
        order: config.order.to_string(),
        transport: config.transport.kind.to_string(),
        pin: config.transport.pin,
        invert: config.transport.invert,
        dma_channel: (config.transport.kind != TransportKind::Spi)
            .then_some(config.transport.dma_channel),
        symbols,
        reset_symbols: config.timing.reset_symbols(),
        frame_time_us: config.timing.duration(symbols).as_micros(),
        buffer_capacity: config.transport.buffer_capacity,
        frame_bytes: config.frame_bytes(),
        fits: config.fits_buffer(),
        encoded_bytes,
    }
}

fn handle_info(config: &DriverConfig, json: bool) -> Result<()> {
    let info = frame_info(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Strip:");
    println!("  LEDs: {}", info.leds);
    println!("  Channel order: {}", info.order);
    println!("Transport:");
    println!("  Kind: {} (GPIO {})", info.transport, info.pin);
    println!("  Inverted: {}", if info.invert { "yes" } else { "no" });
    if let Some(channel) = info.dma_channel {
        println!("  DMA channel: {}", channel);
    }
    println!("Frame:");
    println!(
        "  Symbols: {} ({} reset)",
        info.symbols, info.reset_symbols
    );
    println!("  Duration: {}us", info.frame_time_us);
    println!(
        "  Encoded: {} of {} bytes ({})",
        info.frame_bytes,
        info.buffer_capacity,
        if info.fits { "fits" } else { "too large" }
    );
    println!("Encoded size per transport:");
    for size in &info.encoded_bytes {
        println!(
            "  {}: {} bytes (default capacity {})",
            size.transport, size.bytes, size.default_capacity
        );
    }
    Ok(())
}
