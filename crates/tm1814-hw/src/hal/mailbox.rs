//! VideoCore mailbox property calls for memory the DMA engine can read.
//!
//! Ordinary process memory is cached by the ARM and may move, so DMA
//! sources are allocated and locked by the firmware and mapped back
//! through `/dev/mem`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

use nix::{ioctl_readwrite_bad, request_code_readwrite};
use tracing::debug;

use crate::{Error, Result};

const VCIO_PATH: &str = "/dev/vcio";
const VCIO_IOC_MAGIC: u8 = 100;
const VCIO_IOC_TYPE_PROPERTY: u8 = 0;

// The kernel encodes the size of a `char *`, but takes the buffer itself.
ioctl_readwrite_bad!(
    vcio_property,
    request_code_readwrite!(
        VCIO_IOC_MAGIC,
        VCIO_IOC_TYPE_PROPERTY,
        std::mem::size_of::<*mut libc::c_char>()
    ),
    u32
);

const PROCESS_REQUEST: u32 = 0x0000_0000;
const REQUEST_SUCCESSFUL: u32 = 0x8000_0000;

const TAG_ALLOCATE_MEMORY: u32 = 0x0003_000C;
const TAG_LOCK_MEMORY: u32 = 0x0003_000D;
const TAG_UNLOCK_MEMORY: u32 = 0x0003_000E;
const TAG_RELEASE_MEMORY: u32 = 0x0003_000F;

/// Allocation flags: uncached, bypassing the L1 and L2 caches.
pub const MEM_FLAG_DIRECT: u32 = 1 << 2;
/// Allocation flags: coherent with the L2 cache but not L1 (BCM2835).
pub const MEM_FLAG_L1_NONALLOCATING: u32 = MEM_FLAG_DIRECT | (1 << 3);

const MESSAGE_WORDS: usize = 32;
const HEADER_WORDS: usize = 5;

/// Property buffer; the firmware requires 16-byte alignment.
#[repr(C, align(16))]
#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    words: [u32; MESSAGE_WORDS],
}

impl Message {
    /// A single-tag request: buffer size, request code, tag, value buffer
    /// size, request size, values, end tag.
    fn request(tag: u32, args: &[u32]) -> Self {
        let value_words = args.len().max(1);
        let mut words = [0; MESSAGE_WORDS];
        words[0] = ((HEADER_WORDS + value_words + 1) * 4) as u32;
        words[1] = PROCESS_REQUEST;
        words[2] = tag;
        words[3] = (value_words * 4) as u32;
        words[4] = (args.len() * 4) as u32;
        words[HEADER_WORDS..HEADER_WORDS + args.len()].copy_from_slice(args);
        Self { words }
    }

    fn status(&self) -> u32 {
        self.words[1]
    }

    /// First value word of the response.
    fn value(&self) -> u32 {
        self.words[HEADER_WORDS]
    }
}

/// Open handle on the firmware mailbox.
pub struct Mailbox {
    file: File,
}

impl Mailbox {
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(VCIO_PATH)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    Error::DeviceNotFound(VCIO_PATH.to_string())
                } else {
                    Error::Io(e)
                }
            })?;
        Ok(Self { file })
    }

    fn call(&self, tag: u32, args: &[u32]) -> Result<u32> {
        let mut message = Message::request(tag, args);
        // SAFETY: the buffer is aligned, sized by its own header and outlives the call.
        unsafe { vcio_property(self.file.as_raw_fd(), message.words.as_mut_ptr()) }
            .map_err(io::Error::from)?;
        if message.status() != REQUEST_SUCCESSFUL {
            return Err(Error::Io(io::Error::other(format!(
                "mailbox tag {:#x} failed with status {:#x}",
                tag,
                message.status()
            ))));
        }
        Ok(message.value())
    }

    /// Allocates `size` bytes of GPU memory and returns its handle.
    pub fn allocate(&self, size: u32, align: u32, flags: u32) -> Result<u32> {
        let handle = self.call(TAG_ALLOCATE_MEMORY, &[size, align, flags])?;
        if handle == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("firmware could not allocate {} bytes", size),
            )));
        }
        debug!("Allocated {} bytes of GPU memory (handle {})", size, handle);
        Ok(handle)
    }

    /// Locks an allocation in place and returns its bus address.
    pub fn lock(&self, handle: u32) -> Result<u32> {
        self.call(TAG_LOCK_MEMORY, &[handle])
    }

    pub fn unlock(&self, handle: u32) -> Result<()> {
        self.call(TAG_UNLOCK_MEMORY, &[handle]).map(|_| ())
    }

    pub fn release(&self, handle: u32) -> Result<()> {
        self.call(TAG_RELEASE_MEMORY, &[handle]).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_request_layout() {
        let message = Message::request(TAG_ALLOCATE_MEMORY, &[8192, 4096, MEM_FLAG_DIRECT]);
        assert_eq!(
            &message.words[..10],
            &[36, 0, 0x3000C, 12, 12, 8192, 4096, 4, 0, 0]
        );
    }

    #[test]
    fn test_lock_request_layout() {
        let message = Message::request(TAG_LOCK_MEMORY, &[7]);
        assert_eq!(&message.words[..7], &[28, 0, 0x3000D, 4, 4, 7, 0]);
        assert_eq!(std::mem::align_of::<Message>(), 16);
    }
}
