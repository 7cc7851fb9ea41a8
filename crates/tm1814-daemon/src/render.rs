//! Per-tick frame decisions for the render loop.

use std::time::{Duration, Instant};
use tm1814_hw::{Strip, StripDriver};
use tracing::warn;

use crate::effects::{Effect, EffectParams};

/// How often a run of identical failures is logged again.
pub const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Static effect already on the strip; nothing sent.
    Skipped,
    Rendered,
    Failed,
}

/// Rate limit for render error logs.
///
/// The first failure of a run is always logged, later ones at most once
/// per interval with the number of failures so far.
#[derive(Debug)]
pub struct ErrorThrottle {
    interval: Duration,
    consecutive: u32,
    last_log: Option<Instant>,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            consecutive: 0,
            last_log: None,
        }
    }

    /// Counts a failure. Returns the run length if this one should be logged.
    pub fn failure(&mut self, now: Instant) -> Option<u32> {
        self.consecutive += 1;
        let due = match self.last_log {
            Some(last) => self.consecutive == 1 || now.duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.last_log = Some(now);
            Some(self.consecutive)
        } else {
            None
        }
    }

    pub fn success(&mut self) {
        self.consecutive = 0;
    }
}

/// Drives one effect into a strip driver, one frame per tick.
pub struct Renderer {
    effect: Effect,
    params: EffectParams,
    strip: Strip,
    frame: u64,
    dirty: bool,
    errors: ErrorThrottle,
}

impl Renderer {
    pub fn new(effect: Effect, params: EffectParams, leds: usize) -> Self {
        Self {
            effect,
            params,
            strip: Strip::new(leds),
            frame: 0,
            dirty: true,
            errors: ErrorThrottle::new(ERROR_LOG_INTERVAL),
        }
    }

    /// Returns true if the next tick has to send a frame.
    ///
    /// Static effects are sent once, and again after a failed frame.
    pub fn is_due(&self) -> bool {
        !self.effect.is_static() || self.dirty
    }

    pub fn tick(&mut self, driver: &mut StripDriver, now: Instant) -> Tick {
        if !self.is_due() {
            return Tick::Skipped;
        }
        self.effect.render(self.frame, &self.params, &mut self.strip);
        self.frame = self.frame.wrapping_add(1);

        match driver.render(&self.strip) {
            Ok(()) => {
                self.dirty = false;
                self.errors.success();
                Tick::Rendered
            }
            Err(e) => {
                self.dirty = true;
                match self.errors.failure(now) {
                    Some(1) => warn!("Render error: {}", e),
                    Some(count) => warn!("Render error (repeated {} times): {}", count, e),
                    None => {}
                }
                Tick::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm1814_hw::{DriverConfig, Pixel, RecordingPeripheral, TransportConfig, TransportKind};

    fn driver(leds: usize) -> (StripDriver, RecordingPeripheral) {
        let recorder = RecordingPeripheral::new();
        let config = DriverConfig::new(leds, TransportConfig::new(TransportKind::Spi, 10));
        let driver = StripDriver::with_peripheral(config, Box::new(recorder.clone())).unwrap();
        (driver, recorder)
    }

    fn params() -> EffectParams {
        EffectParams {
            color: Pixel::new(0, 0, 0, 255),
            speed: 3,
        }
    }

    #[test]
    fn test_static_effect_sent_once() {
        let (mut driver, recorder) = driver(4);
        let mut renderer = Renderer::new(Effect::Solid, params(), 4);
        let now = Instant::now();

        assert_eq!(renderer.tick(&mut driver, now), Tick::Rendered);
        assert!(!renderer.is_due());
        assert_eq!(renderer.tick(&mut driver, now), Tick::Skipped);
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_static_effect_resent_after_failure() {
        let (mut driver, recorder) = driver(4);
        let mut renderer = Renderer::new(Effect::Solid, params(), 4);
        let now = Instant::now();

        recorder.fail_next_write();
        assert_eq!(renderer.tick(&mut driver, now), Tick::Failed);
        assert!(renderer.is_due());
        assert_eq!(renderer.tick(&mut driver, now), Tick::Rendered);
        assert_eq!(renderer.tick(&mut driver, now), Tick::Skipped);

        assert_eq!(recorder.frames().len(), 1);
        assert_eq!(driver.displayed().unwrap().get_pixel(0), Some(Pixel::new(0, 0, 0, 255)));
    }

    #[test]
    fn test_animated_effect_renders_every_tick() {
        let (mut driver, recorder) = driver(8);
        let mut renderer = Renderer::new(Effect::Rainbow, params(), 8);
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(renderer.tick(&mut driver, now), Tick::Rendered);
        }
        assert_eq!(recorder.frames().len(), 3);
        assert_eq!(driver.frames_rendered(), 3);
    }

    #[test]
    fn test_failures_counted_until_success() {
        let (mut driver, recorder) = driver(2);
        let mut renderer = Renderer::new(Effect::Chase, params(), 2);
        let now = Instant::now();

        for _ in 0..3 {
            recorder.fail_next_write();
        }
        for _ in 0..3 {
            assert_eq!(renderer.tick(&mut driver, now), Tick::Failed);
        }
        assert_eq!(renderer.errors.consecutive, 3);

        assert_eq!(renderer.tick(&mut driver, now), Tick::Rendered);
        assert_eq!(renderer.errors.consecutive, 0);
    }

    #[test]
    fn test_error_throttle() {
        let mut throttle = ErrorThrottle::new(ERROR_LOG_INTERVAL);
        let start = Instant::now();

        assert_eq!(throttle.failure(start), Some(1));
        assert_eq!(throttle.failure(start + Duration::from_secs(1)), None);
        assert_eq!(throttle.failure(start + Duration::from_secs(59)), None);
        assert_eq!(throttle.failure(start + Duration::from_secs(60)), Some(4));
        assert_eq!(throttle.failure(start + Duration::from_secs(61)), None);

        // A new run is logged straight away.
        throttle.success();
        assert_eq!(throttle.failure(start + Duration::from_secs(62)), Some(1));
    }
}
