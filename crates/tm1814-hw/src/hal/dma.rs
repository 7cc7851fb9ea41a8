//! DMA feeding of the PWM and PCM FIFOs.
//!
//! A frame is copied into uncached VideoCore memory and handed to one DMA
//! channel as a chain of control blocks. The peripheral paces the transfer
//! through its DREQ line, so the FIFO stays fed for the whole frame no
//! matter how the calling thread is scheduled.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::mailbox::{Mailbox, MEM_FLAG_DIRECT, MEM_FLAG_L1_NONALLOCATING};
use super::memory::{
    self, MemoryBlock, BUS_PERIPHERAL_BASE, DMA_PERIPHERAL_OFFSET, PCM_PERIPHERAL_OFFSET,
    PWM_PERIPHERAL_OFFSET,
};
use super::PartialWrite;
use crate::{Error, Result};

/// Channel used when none is configured.
pub const DEFAULT_DMA_CHANNEL: u8 = 10;

// Used by the firmware, the SD card and the kernel's own drivers.
const RESERVED_CHANNELS: [u8; 7] = [0, 1, 2, 3, 5, 6, 7];
const MAX_CHANNEL: u8 = 14;

const CHANNEL_STRIDE: u32 = 0x100;
const CHANNEL_SIZE: usize = 0x24;

// Channel registers.
const CS: usize = 0x00;
const CONBLK_AD: usize = 0x04;
const TXFR_LEN: usize = 0x14;
const DEBUG: usize = 0x20;

const CS_ACTIVE: u32 = 1 << 0;
const CS_END: u32 = 1 << 1;
const CS_INT: u32 = 1 << 2;
const CS_ERROR: u32 = 1 << 8;
const CS_PRIORITY: u32 = 15 << 16;
const CS_PANIC_PRIORITY: u32 = 15 << 20;
const CS_WAIT_FOR_OUTSTANDING_WRITES: u32 = 1 << 28;
const CS_ABORT: u32 = 1 << 30;
const CS_RESET: u32 = 1 << 31;

const DEBUG_CLEAR: u32 = 0b111;

// Transfer information bits.
const TI_WAIT_RESP: u32 = 1 << 3;
const TI_DEST_DREQ: u32 = 1 << 6;
const TI_SRC_INC: u32 = 1 << 8;
const TI_PERMAP_SHIFT: u32 = 16;
const TI_NO_WIDE_BURSTS: u32 = 1 << 26;

// Bus addresses carry the cache alias in their top two bits.
const BUS_ALIAS_MASK: u32 = 0xC000_0000;

const PWM_FIF1: u32 = 0x18;
const PCM_FIFO_A: u32 = 0x04;

/// Largest control block length a DMA LITE channel accepts, in whole words.
pub const MAX_BLOCK_BYTES: usize = 0xFFFC;

const CONTROL_BLOCK_BYTES: usize = std::mem::size_of::<ControlBlock>();
const PAGE_SIZE: usize = 4096;

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Returns true if `channel` is free for general use.
pub fn is_usable_channel(channel: u8) -> bool {
    channel <= MAX_CHANNEL && !RESERVED_CHANNELS.contains(&channel)
}

/// Peripheral whose data request line paces a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dreq {
    Pcm,
    Pwm,
}

impl Dreq {
    fn permap(self) -> u32 {
        match self {
            Dreq::Pcm => 2,
            Dreq::Pwm => 5,
        }
    }

    /// Bus address of the FIFO the transfer writes to.
    pub fn fifo_bus_address(self) -> u32 {
        match self {
            Dreq::Pcm => BUS_PERIPHERAL_BASE + PCM_PERIPHERAL_OFFSET + PCM_FIFO_A,
            Dreq::Pwm => BUS_PERIPHERAL_BASE + PWM_PERIPHERAL_OFFSET + PWM_FIF1,
        }
    }

    fn transfer_info(self) -> u32 {
        TI_NO_WIDE_BURSTS
            | TI_WAIT_RESP
            | TI_DEST_DREQ
            | TI_SRC_INC
            | (self.permap() << TI_PERMAP_SHIFT)
    }
}

/// DMA control block, as the engine reads it from memory.
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlBlock {
    pub ti: u32,
    pub source_ad: u32,
    pub dest_ad: u32,
    pub txfr_len: u32,
    pub stride: u32,
    pub nextconbk: u32,
    reserved: [u32; 2],
}

impl ControlBlock {
    fn words(&self) -> [u32; 8] {
        [
            self.ti,
            self.source_ad,
            self.dest_ad,
            self.txfr_len,
            self.stride,
            self.nextconbk,
            0,
            0,
        ]
    }
}

/// Control blocks copying `len` bytes at bus address `source` into the FIFO of `dreq`.
///
/// The blocks are laid out back to back starting at bus address `chain`.
pub fn control_blocks(dreq: Dreq, chain: u32, source: u32, len: usize) -> Vec<ControlBlock> {
    let count = len.div_ceil(MAX_BLOCK_BYTES);
    (0..count)
        .map(|index| {
            let offset = index * MAX_BLOCK_BYTES;
            let nextconbk = if index + 1 < count {
                chain + ((index + 1) * CONTROL_BLOCK_BYTES) as u32
            } else {
                0
            };
            ControlBlock {
                ti: dreq.transfer_info(),
                source_ad: source + offset as u32,
                dest_ad: dreq.fifo_bus_address(),
                txfr_len: (len - offset).min(MAX_BLOCK_BYTES) as u32,
                stride: 0,
                nextconbk,
                reserved: [0; 2],
            }
        })
        .collect()
}

/// Locked, uncached GPU memory mapped into this process.
struct DmaMemory {
    mailbox: Mailbox,
    handle: u32,
    bus_addr: u32,
    mem: MemoryBlock,
}

impl DmaMemory {
    fn allocate(size: usize) -> Result<Self> {
        let size = size.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let size_word = u32::try_from(size)
            .map_err(|_| Error::Configuration(format!("{} bytes of DMA memory", size)))?;

        // The BCM2835 needs the L2-coherent alias; later SoCs bypass both caches.
        let flags = if memory::peripheral_base()? == 0x2000_0000 {
            MEM_FLAG_L1_NONALLOCATING
        } else {
            MEM_FLAG_DIRECT
        };

        let mailbox = Mailbox::open()?;
        let handle = mailbox.allocate(size_word, PAGE_SIZE as u32, flags)?;
        let bus_addr = match mailbox.lock(handle) {
            Ok(addr) => addr,
            Err(e) => {
                let _ = mailbox.release(handle);
                return Err(e);
            }
        };
        let mem = match MemoryBlock::open_physical(bus_addr & !BUS_ALIAS_MASK, size) {
            Ok(mem) => mem,
            Err(e) => {
                let _ = mailbox.unlock(handle);
                let _ = mailbox.release(handle);
                return Err(e);
            }
        };

        Ok(Self {
            mailbox,
            handle,
            bus_addr,
            mem,
        })
    }

    fn write_words(&self, offset: usize, words: &[u32]) {
        for (i, &word) in words.iter().enumerate() {
            self.mem.write_register(offset + i * 4, word);
        }
    }
}

impl Drop for DmaMemory {
    fn drop(&mut self) {
        let _ = self.mailbox.unlock(self.handle);
        let _ = self.mailbox.release(self.handle);
    }
}

/// One DMA channel with a buffer large enough for `capacity` frame bytes.
pub struct DmaChannel {
    channel: u8,
    dreq: Dreq,
    regs: MemoryBlock,
    memory: DmaMemory,
    /// Byte offset of the frame data; control blocks come first.
    data_offset: usize,
    capacity: usize,
}

impl DmaChannel {
    pub fn open(channel: u8, dreq: Dreq, capacity: usize) -> Result<Self> {
        if !is_usable_channel(channel) {
            return Err(Error::Configuration(format!(
                "DMA channel {} is reserved or does not exist",
                channel
            )));
        }

        let regs = MemoryBlock::open_peripheral(
            DMA_PERIPHERAL_OFFSET + channel as u32 * CHANNEL_STRIDE,
            CHANNEL_SIZE,
        )?;
        let data_offset = capacity.div_ceil(MAX_BLOCK_BYTES) * CONTROL_BLOCK_BYTES;
        let memory = DmaMemory::allocate(data_offset + capacity)?;

        info!(
            "DMA channel {} ready for {:?} with {} bytes at bus {:#010x}",
            channel, dreq, capacity, memory.bus_addr
        );

        Ok(Self {
            channel,
            dreq,
            regs,
            memory,
            data_offset,
            capacity,
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Stops the channel and clears its status.
    pub fn reset(&self) {
        self.regs.write_register(CS, CS_RESET);
        std::thread::sleep(Duration::from_micros(10));
        self.regs.write_register(CS, CS_INT | CS_END);
        self.regs.write_register(DEBUG, DEBUG_CLEAR);
    }

    /// Sends `words` to the peripheral FIFO and waits for the last one to be taken.
    ///
    /// `expected` is how long the peripheral needs to consume the frame. Once
    /// the channel has been started any failure is a [`PartialWrite`].
    pub fn transfer(&mut self, words: &[u32], expected: Duration) -> io::Result<()> {
        let total = self.start(words)?;
        self.finish(total, expected)
    }

    /// Copies `words` into DMA memory and starts the chain. Returns the frame size in bytes.
    pub fn start(&mut self, words: &[u32]) -> io::Result<usize> {
        let total = words.len() * 4;
        if total > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes exceed the {} byte DMA buffer", total, self.capacity),
            ));
        }
        if total == 0 {
            return Ok(0);
        }

        let chain = self.memory.bus_addr;
        let source = chain + self.data_offset as u32;
        let blocks = control_blocks(self.dreq, chain, source, total);

        self.reset();
        self.memory.write_words(self.data_offset, words);
        for (index, block) in blocks.iter().enumerate() {
            self.memory
                .write_words(index * CONTROL_BLOCK_BYTES, &block.words());
        }

        self.regs.write_register(CONBLK_AD, chain);
        self.regs.write_register(
            CS,
            CS_WAIT_FOR_OUTSTANDING_WRITES | CS_PANIC_PRIORITY | CS_PRIORITY | CS_ACTIVE,
        );
        debug!(
            "DMA channel {}: {} bytes in {} control blocks",
            self.channel,
            total,
            blocks.len()
        );
        Ok(total)
    }

    /// Waits for a started chain of `total` bytes to finish.
    pub fn finish(&self, total: usize, expected: Duration) -> io::Result<()> {
        if total == 0 {
            return Ok(());
        }

        std::thread::sleep(expected);
        let deadline = Instant::now() + expected + Duration::from_millis(10);
        loop {
            let cs = self.regs.read_register(CS);
            if cs & CS_ERROR != 0 {
                let sent = self.bytes_sent(total);
                self.abort();
                return Err(PartialWrite::new(sent, total).into());
            }
            if cs & CS_ACTIVE == 0 {
                return Ok(());
            }
            if Instant::now() > deadline {
                let sent = self.bytes_sent(total);
                self.abort();
                return Err(PartialWrite::new(sent, total).into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Bytes already taken from the chain, read back from the channel.
    fn bytes_sent(&self, total: usize) -> usize {
        let current = self.regs.read_register(CONBLK_AD);
        if current == 0 {
            return total;
        }
        let index = current.wrapping_sub(self.memory.bus_addr) as usize / CONTROL_BLOCK_BYTES;
        let block_len = total.saturating_sub(index * MAX_BLOCK_BYTES).min(MAX_BLOCK_BYTES);
        let remaining = self.regs.read_register(TXFR_LEN) as usize;
        (index * MAX_BLOCK_BYTES + block_len.saturating_sub(remaining)).min(total)
    }

    fn abort(&self) {
        self.regs.modify_register(CS, |cs| cs | CS_ABORT);
        self.reset();
    }
}

impl Drop for DmaChannel {
    fn drop(&mut self) {
        self.reset();
    }
}
