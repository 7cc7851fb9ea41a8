//! TM1814 Strip Daemon
//!
//! Background service that drives a TM1814 RGBW strip with a configured effect.

mod config;
mod effects;
mod render;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tm1814_hw::{parse_hex_color, StripDriver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use effects::{Effect, EffectParams};
use render::Renderer;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);

    let driver_config = config
        .to_driver_config()
        .context("Invalid strip configuration")?;
    let effect: Effect = config.effect.name.parse()?;
    let params = EffectParams {
        color: parse_hex_color(&config.effect.color).context("Invalid effect color")?,
        speed: config.effect.speed,
    };
    let fps = config.effect.fps.clamp(1, 120);

    let driver = StripDriver::initialize(driver_config).context("Failed to initialize strip")?;
    let driver = Arc::new(Mutex::new(driver));
    info!("Running {} effect at {} fps", effect, fps);

    // Start render loop
    let render_driver = driver.clone();
    let render_task = tokio::spawn(async move {
        render_loop(render_driver, effect, params, fps).await;
    });

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    render_task.abort();
    let _ = render_task.await;

    let driver = Arc::try_unwrap(driver)
        .map_err(|_| anyhow::anyhow!("Render loop still holds the strip"))?
        .into_inner()
        .map_err(|_| anyhow::anyhow!("Strip lock poisoned"))?;

    tokio::task::block_in_place(|| -> Result<()> {
        let mut driver = driver;
        if config.clear_on_exit {
            if let Err(e) = driver.clear() {
                warn!("Failed to clear strip: {}", e);
            }
        }
        driver.shutdown().context("Failed to release strip")
    })
}

async fn render_loop(
    driver: Arc<Mutex<StripDriver>>,
    effect: Effect,
    params: EffectParams,
    fps: u32,
) {
    let leds = driver.lock().unwrap().leds();
    let mut renderer = Renderer::new(effect, params, leds);
    let mut interval = tokio::time::interval(Duration::from_secs(1) / fps);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if !renderer.is_due() {
            continue;
        }
        tokio::task::block_in_place(|| {
            let mut driver = driver.lock().unwrap();
            renderer.tick(&mut driver, Instant::now())
        });
    }
}
