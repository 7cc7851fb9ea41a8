//! In-memory peripheral that records committed frames.
//!
//! Used for dry runs and by tests. Clones share state, so a test can keep a
//! handle while the driver owns another.

use std::io;
use std::sync::{Arc, Mutex};

use super::{PartialWrite, Peripheral};
use crate::transport::EncodedFrame;
use crate::Result;

#[derive(Debug, Default)]
struct State {
    frames: Vec<EncodedFrame>,
    failures: usize,
    cut_off: Option<usize>,
    holder: Option<String>,
    enabled: bool,
    released: bool,
}

/// Peripheral that keeps every frame written to it.
#[derive(Debug, Clone, Default)]
pub struct RecordingPeripheral {
    state: Arc<Mutex<State>>,
}

impl RecordingPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peripheral that reports being held by `holder`.
    pub fn claimed(holder: &str) -> Self {
        let peripheral = Self::default();
        peripheral.state.lock().unwrap().holder = Some(holder.to_string());
        peripheral
    }

    /// Makes the next write fail before anything is committed.
    pub fn fail_next_write(&self) {
        self.state.lock().unwrap().failures += 1;
    }

    /// Makes the next write stop after `sent` bytes have gone out.
    pub fn cut_off_next_write(&self, sent: usize) {
        self.state.lock().unwrap().cut_off = Some(sent);
    }

    /// Frames committed so far, oldest first.
    pub fn frames(&self) -> Vec<EncodedFrame> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Most recently committed frame.
    pub fn last_frame(&self) -> Option<EncodedFrame> {
        self.state.lock().unwrap().frames.last().cloned()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }
}

impl Peripheral for RecordingPeripheral {
    fn name(&self) -> String {
        "recording peripheral".to_string()
    }

    fn claimed_by(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().holder.clone())
    }

    fn enable(&mut self) -> Result<()> {
        self.state.lock().unwrap().enabled = true;
        Ok(())
    }

    fn write(&mut self, frame: &EncodedFrame) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.released {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "peripheral released"));
        }
        if state.failures > 0 {
            state.failures -= 1;
            return Err(io::Error::other("simulated transport failure"));
        }
        if let Some(sent) = state.cut_off.take() {
            let total = frame.byte_len();
            return Err(PartialWrite::new(sent.min(total), total).into());
        }
        state.frames.push(frame.clone());
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.released = true;
        state.enabled = false;
        Ok(())
    }
}
