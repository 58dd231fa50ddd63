//! Mock HID device for tests.
//!
//! Lets tests script inbound reports and inspect everything the device link
//! wrote, without a physical device.  Clones share state, so a test can keep
//! a handle while the device link owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hidrelay_core::{classify, encode_pong, Frame, MessageType};

use crate::application::device_link::{DeviceError, HidDevice};

#[derive(Default)]
struct MockDeviceState {
    inbound: VecDeque<Result<Frame, String>>,
    written: Vec<(Instant, Frame)>,
    failing_writes: u32,
    auto_pong: bool,
}

/// A mock implementation of [`HidDevice`].
#[derive(Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a report to be returned by a later `read`.
    pub fn push_inbound(&self, frame: Frame) {
        self.lock().inbound.push_back(Ok(frame));
    }

    /// Queues a read failure.
    pub fn push_read_error(&self, message: &str) {
        self.lock().inbound.push_back(Err(message.to_string()));
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    /// When enabled, every PING written is answered with a PONG on the next read.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.lock().auto_pong = enabled;
    }

    /// All frames written so far, oldest first.
    pub fn written(&self) -> Vec<Frame> {
        self.lock().written.iter().map(|(_, f)| *f).collect()
    }

    /// All frames written so far with the time each write happened.
    pub fn written_at(&self) -> Vec<(Instant, Frame)> {
        self.lock().written.clone()
    }

    /// Number of PINGs written so far.
    pub fn pings_written(&self) -> usize {
        self.lock()
            .written
            .iter()
            .filter(|(_, f)| classify(f) == MessageType::Ping)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockDeviceState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl HidDevice for MockDevice {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        let next = self.lock().inbound.pop_front();
        match next {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(message)) => Err(DeviceError::Read(message)),
            None => {
                // Behave like a real read that times out.
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(DeviceError::Write("injected failure".to_string()));
        }
        state.written.push((Instant::now(), *frame));
        if state.auto_pong && classify(frame) == MessageType::Ping {
            state.inbound.push_back(Ok(encode_pong()));
        }
        Ok(())
    }
}
