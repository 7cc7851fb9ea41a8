//! Strip driver: encode, serialize, invert and transmit as one step.

use tracing::{debug, info, warn};

use crate::encoding::{BitOrder, ChannelOrder, FrameSerializer, InversionPolicy};
use crate::hal::{self, spidev, Peripheral};
use crate::strip::Strip;
use crate::timing::Timing;
use crate::transport::{self, Transport, TransportConfig, TransportKind};
use crate::{Error, Result};

/// Everything a driver needs, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Number of LEDs on the strip.
    pub leds: usize,
    pub order: ChannelOrder,
    pub bit_order: BitOrder,
    /// Global brightness, 255 = unscaled.
    pub brightness: u8,
    pub timing: Timing,
    pub transport: TransportConfig,
    /// Overrides the spidev node derived from the pin.
    pub device: Option<String>,
}

impl DriverConfig {
    /// Config for `leds` LEDs on `transport` with default encoding and timing.
    pub fn new(leds: usize, transport: TransportConfig) -> Self {
        Self {
            leds,
            order: ChannelOrder::default(),
            bit_order: BitOrder::default(),
            brightness: u8::MAX,
            timing: Timing::default(),
            transport,
            device: None,
        }
    }

    /// Checks every field that does not need the hardware.
    pub fn validate(&self) -> Result<()> {
        if self.leds == 0 {
            return Err(Error::Configuration("LED count must be non-zero".into()));
        }
        self.timing.validate()?;
        self.transport.validate()?;

        let too_long = || Error::Configuration(format!("{} LEDs is too long a strip", self.leds));
        let symbols = FrameSerializer::new(self.order, &self.timing)
            .checked_symbol_count(self.leds)
            .ok_or_else(too_long)?;
        self.transport
            .checked_encoded_len(symbols)
            .ok_or_else(too_long)?;
        Ok(())
    }

    /// Symbols in one frame.
    pub fn symbol_count(&self) -> usize {
        FrameSerializer::new(self.order, &self.timing).symbol_count(self.leds)
    }

    /// Encoded bytes in one frame on the configured transport.
    pub fn frame_bytes(&self) -> usize {
        self.transport.encoded_len(self.symbol_count())
    }

    /// Returns true if one frame fits the configured buffer.
    pub fn fits_buffer(&self) -> bool {
        self.frame_bytes() <= self.transport.buffer_capacity
    }
}

/// Render state of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Encoding,
    Transmitting,
}

/// Owns the transport and its hardware handle for one strip.
///
/// `render` takes `&mut self`, so a driver is never rendered from two places
/// at once; share it behind a mutex if several tasks produce frames.
pub struct StripDriver {
    config: DriverConfig,
    serializer: FrameSerializer,
    inversion: InversionPolicy,
    transport: Box<dyn Transport>,
    state: DriverState,
    displayed: Option<Strip>,
    frames: u64,
    released: bool,
}

impl StripDriver {
    /// Validates `config`, opens the hardware and prepares it for output.
    pub fn initialize(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let peripheral = hal::open(&config.transport, &config.timing, config.device.as_deref())?;

        if config.transport.kind == TransportKind::Spi {
            if let Some(bufsiz) = spidev::kernel_bufsiz() {
                if config.transport.buffer_capacity > bufsiz {
                    warn!(
                        "Buffer capacity {} exceeds spidev bufsiz {}; raise spidev.bufsiz on the kernel command line",
                        config.transport.buffer_capacity, bufsiz
                    );
                }
            }
        }

        Self::with_peripheral(config, peripheral)
    }

    /// Builds a driver around an already opened peripheral.
    ///
    /// The peripheral is released again if any step fails.
    pub fn with_peripheral(config: DriverConfig, mut peripheral: Box<dyn Peripheral>) -> Result<Self> {
        if let Err(e) = config.validate() {
            let _ = peripheral.release();
            return Err(e);
        }

        if let Some(holder) = peripheral.claimed_by()? {
            let name = peripheral.name();
            let _ = peripheral.release();
            return Err(Error::ResourceConflict {
                peripheral: name,
                holder,
            });
        }

        if let Err(e) = peripheral.enable() {
            let _ = peripheral.release();
            return Err(e);
        }

        let frame_bytes = config.frame_bytes();
        if !config.fits_buffer() {
            warn!(
                "{} LEDs need {} bytes per frame but the {} buffer holds {}; frames will be rejected",
                config.leds, frame_bytes, config.transport.kind, config.transport.buffer_capacity
            );
        }

        info!(
            "Driving {} LEDs over {} on GPIO {} ({} order, {} bytes per frame{})",
            config.leds,
            config.transport.kind,
            config.transport.pin,
            config.order,
            frame_bytes,
            if config.transport.invert { ", inverted" } else { "" }
        );

        let serializer = FrameSerializer::new(config.order, &config.timing)
            .with_bit_order(config.bit_order)
            .with_brightness(config.brightness);
        let inversion = InversionPolicy::new(config.transport.invert);
        let transport = transport::build(config.transport.kind, peripheral);

        Ok(Self {
            config,
            serializer,
            inversion,
            transport,
            state: DriverState::Idle,
            displayed: None,
            frames: 0,
            released: false,
        })
    }

    /// Sends `strip` to the LEDs.
    ///
    /// Either the whole frame is committed or nothing is: on error the strip
    /// keeps showing the last frame that rendered successfully. The one
    /// exception is a frame cut off mid-way, after which what the strip
    /// shows is unknown until the next frame succeeds.
    pub fn render(&mut self, strip: &Strip) -> Result<()> {
        if strip.len() != self.config.leds {
            return Err(Error::StripLength {
                expected: self.config.leds,
                actual: strip.len(),
            });
        }

        self.state = DriverState::Encoding;
        let signal = self.inversion.apply(self.serializer.serialize(strip));

        self.state = DriverState::Transmitting;
        let result = self.transport.transmit(&signal, &self.config.transport);
        self.state = DriverState::Idle;
        if let Err(e) = result {
            if let Error::PartialFrame { sent, total } = &e {
                warn!("Frame cut off after {} of {} bytes; strip contents unknown", sent, total);
                self.displayed = None;
            }
            return Err(e);
        }

        self.frames += 1;
        debug!("Frame {} committed", self.frames);
        self.displayed = Some(strip.clone());
        Ok(())
    }

    /// Turns every LED off.
    pub fn clear(&mut self) -> Result<()> {
        self.render(&Strip::new(self.config.leds))
    }

    /// Changes the global brightness used for subsequent frames.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.serializer.set_brightness(brightness);
    }

    pub fn brightness(&self) -> u8 {
        self.serializer.brightness()
    }

    /// Last strip that was committed to the LEDs.
    ///
    /// `None` before the first frame and after a frame was cut off.
    pub fn displayed(&self) -> Option<&Strip> {
        self.displayed.as_ref()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn leds(&self) -> usize {
        self.config.leds
    }

    /// Number of frames committed since initialization.
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Releases the hardware handle.
    pub fn shutdown(mut self) -> Result<()> {
        self.released = true;
        let result = self.transport.release();
        info!("Strip driver shut down after {} frames", self.frames);
        result
    }
}

impl Drop for StripDriver {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.transport.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::RecordingPeripheral;
    use crate::strip::Pixel;
    use crate::transport::EncodedFrame;

    fn spi_config(leds: usize) -> DriverConfig {
        DriverConfig::new(leds, TransportConfig::new(TransportKind::Spi, 10))
    }

    fn driver(config: DriverConfig) -> (StripDriver, RecordingPeripheral) {
        let recorder = RecordingPeripheral::new();
        let driver = StripDriver::with_peripheral(config, Box::new(recorder.clone())).unwrap();
        (driver, recorder)
    }

    fn strip_of(leds: usize, pixel: Pixel) -> Strip {
        let mut strip = Strip::new(leds);
        strip.fill(pixel);
        strip
    }

    #[test]
    fn test_render_commits_frame() {
        let (mut driver, recorder) = driver(spi_config(3));
        assert!(recorder.is_enabled());
        assert_eq!(driver.state(), DriverState::Idle);

        let strip = strip_of(3, Pixel::new(255, 0, 0, 0));
        driver.render(&strip).unwrap();

        assert_eq!(driver.displayed(), Some(&strip));
        assert_eq!(driver.frames_rendered(), 1);
        assert_eq!(driver.state(), DriverState::Idle);
        let frame = recorder.last_frame().unwrap();
        assert_eq!(frame.byte_len(), driver.config().frame_bytes());
    }

    #[test]
    fn test_failed_render_keeps_previous_frame() {
        let (mut driver, recorder) = driver(spi_config(2));
        let first = strip_of(2, Pixel::new(0, 0, 0, 255));
        driver.render(&first).unwrap();
        let committed = recorder.frames();

        recorder.fail_next_write();
        let second = strip_of(2, Pixel::new(255, 255, 0, 0));
        let err = driver.render(&second).unwrap_err();

        assert!(err.is_transient());
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(driver.displayed(), Some(&first));
        assert_eq!(recorder.frames(), committed);
        assert_eq!(driver.frames_rendered(), 1);

        // The next frame goes through again.
        driver.render(&second).unwrap();
        assert_eq!(driver.displayed(), Some(&second));
    }

    #[test]
    fn test_cut_off_frame_clears_displayed() {
        let (mut driver, recorder) = driver(spi_config(4));
        let first = strip_of(4, Pixel::new(0, 0, 255, 0));
        driver.render(&first).unwrap();

        recorder.cut_off_next_write(20);
        let second = strip_of(4, Pixel::new(255, 0, 0, 255));
        let err = driver.render(&second).unwrap_err();

        assert!(matches!(err, Error::PartialFrame { sent: 20, .. }));
        assert!(err.is_transient());
        assert_eq!(driver.displayed(), None);
        assert_eq!(driver.frames_rendered(), 1);
        assert_eq!(driver.state(), DriverState::Idle);

        driver.render(&second).unwrap();
        assert_eq!(driver.displayed(), Some(&second));
    }

    #[test]
    fn test_overflow_rejected_before_write() {
        let (mut driver, recorder) = driver(spi_config(301));
        let result = driver.render(&strip_of(301, Pixel::new(1, 2, 3, 4)));
        assert!(matches!(result, Err(Error::BufferOverflow { .. })));
        assert!(recorder.frames().is_empty());
        assert_eq!(driver.displayed(), None);
    }

    #[test]
    fn test_raised_capacity_accepts_large_strip() {
        let mut config = spi_config(301);
        config.transport = config.transport.with_buffer_capacity(65536);
        assert!(config.fits_buffer());
        let (mut driver, recorder) = driver(config);
        driver.render(&strip_of(301, Pixel::new(1, 2, 3, 4))).unwrap();
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn test_strip_length_mismatch() {
        let (mut driver, recorder) = driver(spi_config(4));
        let result = driver.render(&Strip::new(5));
        assert!(matches!(
            result,
            Err(Error::StripLength {
                expected: 4,
                actual: 5
            })
        ));
        assert!(recorder.frames().is_empty());
    }

    #[test]
    fn test_resource_conflict_releases_peripheral() {
        let recorder = RecordingPeripheral::claimed("bcm2835 Headphones");
        let config = DriverConfig::new(10, TransportConfig::new(TransportKind::Pwm, 18));
        let result = StripDriver::with_peripheral(config, Box::new(recorder.clone()));
        assert!(matches!(result, Err(Error::ResourceConflict { .. })));
        assert!(recorder.is_released());
        assert!(!recorder.is_enabled());
    }

    #[test]
    fn test_invalid_pin_releases_peripheral() {
        let recorder = RecordingPeripheral::new();
        let config = DriverConfig::new(10, TransportConfig::new(TransportKind::Pcm, 18));
        let result = StripDriver::with_peripheral(config, Box::new(recorder.clone()));
        assert!(matches!(result, Err(Error::InvalidPin { .. })));
        assert!(recorder.is_released());
    }

    #[test]
    fn test_shutdown_and_drop_release() {
        let (driver, recorder) = driver(spi_config(1));
        driver.shutdown().unwrap();
        assert!(recorder.is_released());

        let (driver, recorder) = self::driver(spi_config(1));
        drop(driver);
        assert!(recorder.is_released());
    }

    #[test]
    fn test_inverted_driver_sends_complement() {
        let (mut plain, plain_rec) = driver(spi_config(1));
        let mut config = spi_config(1);
        config.transport = config.transport.with_invert(true);
        let (mut inverted, inverted_rec) = driver(config);

        let strip = strip_of(1, Pixel::new(10, 20, 30, 40));
        plain.render(&strip).unwrap();
        inverted.render(&strip).unwrap();

        match (plain_rec.last_frame(), inverted_rec.last_frame()) {
            (Some(EncodedFrame::Bytes(a)), Some(EncodedFrame::Bytes(b))) => {
                assert!(a.iter().zip(&b).all(|(x, y)| *x == !*y));
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn test_pwm_and_pcm_frames() {
        let config = DriverConfig::new(2, TransportConfig::new(TransportKind::Pwm, 18));
        let symbols = config.symbol_count();
        let (mut pwm, pwm_rec) = driver(config);
        pwm.clear().unwrap();
        match pwm_rec.last_frame() {
            Some(EncodedFrame::DutyCycles(words)) => {
                assert_eq!(words.len(), symbols);
                assert_eq!(words[0], 8);
                assert_eq!(*words.last().unwrap(), 0);
            }
            other => panic!("unexpected frame {:?}", other),
        }

        let config = DriverConfig::new(2, TransportConfig::new(TransportKind::Pcm, 21));
        let bytes = config.frame_bytes();
        let (mut pcm, pcm_rec) = driver(config);
        pcm.clear().unwrap();
        match pcm_rec.last_frame() {
            Some(EncodedFrame::Samples(words)) => assert_eq!(words.len() * 4, bytes),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_brightness_change() {
        let (mut driver, recorder) = driver(spi_config(1));
        driver.set_brightness(0);
        assert_eq!(driver.brightness(), 0);
        driver.render(&strip_of(1, Pixel::new(255, 255, 255, 255))).unwrap();
        let mut dark = self::driver(spi_config(1));
        dark.0.clear().unwrap();
        assert_eq!(recorder.last_frame(), dark.1.last_frame());
    }

    #[test]
    fn test_config_validation() {
        assert!(spi_config(0).validate().is_err());
        let mut config = spi_config(10);
        config.timing.reset_us = 10;
        assert!(config.validate().is_err());
        assert_eq!(spi_config(300).frame_bytes(), 4095);
        assert_eq!(spi_config(301).frame_bytes(), 4107);
    }

    #[test]
    fn test_absurd_led_count_rejected() {
        let config = spi_config(usize::MAX / 2);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        assert!(!config.fits_buffer());

        let pwm = DriverConfig::new(usize::MAX / 64, TransportConfig::new(TransportKind::Pwm, 18));
        assert!(matches!(pwm.validate(), Err(Error::Configuration(_))));

        let recorder = RecordingPeripheral::new();
        let result = StripDriver::with_peripheral(config, Box::new(recorder.clone()));
        assert!(result.is_err());
        assert!(recorder.is_released());
    }

    #[test]
    #[ignore]
    fn test_initialize_spi_hardware() {
        let driver = StripDriver::initialize(spi_config(8));
        assert!(driver.is_ok());
    }
}
