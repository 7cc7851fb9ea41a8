//! Memory-mapped access to the SoC peripheral registers.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

const MEM_FILE_PATH: &str = "/dev/mem";
const GPIOMEM_FILE_PATH: &str = "/dev/gpiomem";
const SOC_RANGES_PATH: &str = "/proc/device-tree/soc/ranges";
const COMPATIBLE_PATH: &str = "/proc/device-tree/compatible";

const PAGE_SIZE: usize = 4096;

pub const GPIO_PERIPHERAL_OFFSET: u32 = 0x0020_0000;
pub const GPIO_PERIPHERAL_SIZE: usize = 0xF4;

pub const PWM_PERIPHERAL_OFFSET: u32 = 0x0020_C000;
pub const PWM_PERIPHERAL_SIZE: usize = 0x28;

pub const PCM_PERIPHERAL_OFFSET: u32 = 0x0020_3000;
pub const PCM_PERIPHERAL_SIZE: usize = 0x24;

pub const CLOCK_MANAGER_PERIPHERAL_OFFSET: u32 = 0x0010_1000;
pub const CLOCK_MANAGER_PERIPHERAL_SIZE: usize = 0x100;

pub const DMA_PERIPHERAL_OFFSET: u32 = 0x0000_7000;

/// Peripheral base as seen from the DMA engine's side of the bus.
pub const BUS_PERIPHERAL_BASE: u32 = 0x7E00_0000;

/// A mapped window of 32-bit registers. Unmapped on drop.
pub struct MemoryBlock {
    map: *mut libc::c_void,
    map_len: usize,
    addr: *mut u32,
    len: usize,
}

// The mapping is plain device memory; all access goes through volatile reads/writes.
unsafe impl Send for MemoryBlock {}
unsafe impl Sync for MemoryBlock {}

impl MemoryBlock {
    /// Maps `size` bytes of a peripheral at `relative_offset` from the SoC peripheral base.
    pub fn open_peripheral(relative_offset: u32, size: usize) -> Result<Self> {
        if relative_offset == GPIO_PERIPHERAL_OFFSET && Path::new(GPIOMEM_FILE_PATH).exists() {
            // gpiomem always maps the GPIO block, whatever the offset.
            return Self::open_impl(GPIOMEM_FILE_PATH, 0, size);
        }
        let offset = peripheral_base()? + relative_offset;
        Self::open_impl(MEM_FILE_PATH, offset, size)
    }

    /// Maps `size` bytes of physical memory at `addr`.
    pub fn open_physical(addr: u32, size: usize) -> Result<Self> {
        Self::open_impl(MEM_FILE_PATH, addr, size)
    }

    fn open_impl(path: &str, offset: u32, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::DeviceNotFound(path.to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        // mmap wants a page-aligned offset; DMA channels sit at sub-page offsets.
        let (page, within) = split_page(offset);
        let map_len = (within + size).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        // SAFETY: fresh shared mapping of a device file; the result is checked below.
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                page as libc::off_t,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        debug!("Mapped {} @ {:#010x} ({} bytes)", path, offset, size);

        Ok(Self {
            map,
            map_len,
            // SAFETY: `within` is below PAGE_SIZE, inside the mapping.
            addr: unsafe { (map as *mut u8).add(within) as *mut u32 },
            len: size,
        })
    }

    /// Reads the register at byte offset `offset`.
    pub fn read_register(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.len);
        // SAFETY: offset is inside the mapping and 4-byte aligned by construction.
        unsafe { std::ptr::read_volatile(self.addr.add(offset / 4)) }
    }

    /// Writes the register at byte offset `offset`.
    pub fn write_register(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.len);
        // SAFETY: see read_register.
        unsafe { std::ptr::write_volatile(self.addr.add(offset / 4), value) }
    }

    /// Read-modify-write of one register.
    pub fn modify_register<F: FnOnce(u32) -> u32>(&self, offset: usize, f: F) {
        let value = self.read_register(offset);
        self.write_register(offset, f(value));
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        // SAFETY: map/map_len came from a successful mmap.
        unsafe {
            libc::munmap(self.map, self.map_len);
        }
    }
}

/// Page-aligned part of `offset` and the remainder inside that page.
fn split_page(offset: u32) -> (u32, usize) {
    let within = offset as usize % PAGE_SIZE;
    (offset - within as u32, within)
}

/// Physical base address of the peripherals, e.g. 0xFE000000 on BCM2711.
///
/// Same lookup as the firmware's `bcm_host_get_peripheral_address()`.
pub fn peripheral_base() -> Result<u32> {
    let ranges = std::fs::read(SOC_RANGES_PATH)?;
    parse_soc_ranges(&ranges)
        .ok_or_else(|| Error::Configuration(format!("unexpected {} contents", SOC_RANGES_PATH)))
}

fn parse_soc_ranges(ranges: &[u8]) -> Option<u32> {
    let word = |at: usize| -> Option<u32> {
        let bytes = ranges.get(at..at + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    };
    match word(4)? {
        0 => word(8),
        addr => Some(addr),
    }
}

/// Frequency of the crystal oscillator clock source.
pub fn oscillator_hz() -> u32 {
    let compatible = std::fs::read(COMPATIBLE_PATH).unwrap_or_default();
    oscillator_for(&compatible)
}

fn oscillator_for(compatible: &[u8]) -> u32 {
    if compatible.windows(7).any(|w| w == b"bcm2711") {
        54_000_000
    } else {
        19_200_000
    }
}
