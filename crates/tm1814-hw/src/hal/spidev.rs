//! SPI output through the kernel spidev driver.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use tracing::{debug, info};

use super::Peripheral;
use crate::transport::EncodedFrame;
use crate::{Error, Result};

/// Kernel module parameter limiting the size of one transfer.
pub const SPIDEV_BUFSIZ_PATH: &str = "/sys/module/spidev/parameters/bufsiz";

const SPI_MODE_0: u8 = 0;
const BITS_PER_WORD: u8 = 8;

/// Bindings for <linux/spi/spidev.h>.
mod linux {
    use nix::{ioctl_write_buf, ioctl_write_ptr};

    pub const SPI_IOC_MAGIC: u8 = b'k';
    pub const SPI_IOC_TYPE_MESSAGE: u8 = 0;
    pub const SPI_IOC_TYPE_MODE: u8 = 1;
    pub const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    pub const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    #[allow(non_camel_case_types)]
    #[repr(C)]
    #[derive(Default)]
    pub struct spi_ioc_transfer {
        pub tx_buf: u64,
        pub rx_buf: u64,
        pub len: u32,
        pub speed_hz: u32,
        pub delay_usecs: u16,
        pub bits_per_word: u8,
        pub cs_change: u8,
        pub tx_nbits: u8,
        pub rx_nbits: u8,
        pub word_delay_usecs: u8,
        pub pad: u8,
    }

    ioctl_write_ptr!(spi_write_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_write_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_write_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_buf!(
        spi_transfer,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MESSAGE,
        spi_ioc_transfer
    );
}

/// Device node for an SPI bus (chip select 0).
pub fn device_path(bus: u8) -> String {
    format!("/dev/spidev{}.0", bus)
}

/// Largest transfer the loaded spidev module accepts, if it can be read.
pub fn kernel_bufsiz() -> Option<usize> {
    std::fs::read_to_string(SPIDEV_BUFSIZ_PATH)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Opened spidev node.
pub struct SpiDevice {
    file: Option<File>,
    path: String,
    speed_hz: u32,
}

impl SpiDevice {
    /// Opens `path` and configures mode 0, 8-bit words at `speed_hz`.
    pub fn open(path: &str, speed_hz: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound || !Path::new(path).exists() {
                    Error::DeviceNotFound(path.to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        let fd = file.as_raw_fd();
        // SAFETY: each call passes a pointer to a live value of the request's type.
        unsafe {
            linux::spi_write_mode(fd, &SPI_MODE_0).map_err(io::Error::from)?;
            linux::spi_write_bits_per_word(fd, &BITS_PER_WORD).map_err(io::Error::from)?;
            linux::spi_write_max_speed_hz(fd, &speed_hz).map_err(io::Error::from)?;
        }

        info!("SPI device opened at {} ({} Hz)", path, speed_hz);

        Ok(Self {
            file: Some(file),
            path: path.to_string(),
            speed_hz,
        })
    }

    /// Returns the device path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Peripheral for SpiDevice {
    fn name(&self) -> String {
        format!("SPI {}", self.path)
    }

    fn write(&mut self, frame: &EncodedFrame) -> io::Result<()> {
        let EncodedFrame::Bytes(bytes) = frame else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "SPI expects byte frames",
            ));
        };
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "SPI device released"))?;

        // One message so the whole frame goes out as a single transfer.
        let transfer = linux::spi_ioc_transfer {
            tx_buf: bytes.as_ptr() as u64,
            len: bytes.len() as u32,
            speed_hz: self.speed_hz,
            bits_per_word: BITS_PER_WORD,
            ..Default::default()
        };
        // SAFETY: tx_buf points at `bytes`, which outlives the call; rx_buf is null.
        unsafe { linux::spi_transfer(file.as_raw_fd(), &[transfer]) }.map_err(io::Error::from)?;

        debug!("SPI transfer of {} bytes complete", bytes.len());
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            info!("SPI device {} closed", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_layout() {
        assert_eq!(std::mem::size_of::<linux::spi_ioc_transfer>(), 32);
    }

    #[test]
    fn test_request_codes_match_spidev_header() {
        use linux::*;
        use nix::{request_code_write, sys::ioctl::ioctl_num_type};

        let codes: [ioctl_num_type; 4] = [
            request_code_write!(SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, 1),
            request_code_write!(SPI_IOC_MAGIC, SPI_IOC_TYPE_BITS_PER_WORD, 1),
            request_code_write!(SPI_IOC_MAGIC, SPI_IOC_TYPE_MAX_SPEED_HZ, 4),
            request_code_write!(
                SPI_IOC_MAGIC,
                SPI_IOC_TYPE_MESSAGE,
                std::mem::size_of::<spi_ioc_transfer>()
            ),
        ];
        assert_eq!(codes, [0x4001_6B01, 0x4001_6B03, 0x4004_6B04, 0x4020_6B00]);
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(0), "/dev/spidev0.0");
        assert_eq!(device_path(1), "/dev/spidev1.0");
    }

    #[test]
    fn test_open_missing_device() {
        let result = SpiDevice::open("/dev/spidev-does-not-exist", 2_400_000);
        assert!(matches!(result, Err(Error::DeviceNotFound(_))));
    }

    #[test]
    #[ignore]
    fn test_device_open() {
        let device = SpiDevice::open(&device_path(0), 2_400_000);
        assert!(device.is_ok());
    }
}
