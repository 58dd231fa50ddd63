//! DeviceLink: the polling loop that owns the HID device.
//!
//! Each iteration of the loop does three things, in order:
//!
//! 1. **Keepalive** – if the keepalive interval has elapsed, write a PING to
//!    the device.  If the PING sent at the previous boundary was never
//!    answered with a PONG, log a liveness warning first.  This is advisory
//!    only and never ends the loop.
//! 2. **Inbound** – read one frame with a bounded timeout.  PING/PONG are
//!    link-layer traffic and stay here; every other frame is handed to the
//!    mailbox's device→peer slot.
//! 3. **Outbound** – take the peer→device frame if one is ready and write it
//!    to the device.
//!
//! # Backpressure
//!
//! The device→peer slot holds one frame, and the relay only takes the next
//! one after finishing its current exchange.  A frame read while the slot is
//! still full is held back in `pending` and offered again on every
//! iteration.  While a frame is held back the device is not read at all, so
//! further reports wait in the device's own HID buffer instead of being
//! overwritten.  PINGs and responses keep flowing in the meantime.
//!
//! The loop runs on a dedicated blocking thread because HID reads block for
//! up to the poll interval.  It ends when the shared `running` flag is
//! cleared, or with a [`DeviceLinkError`] once reads (or writes) have failed
//! too many times in a row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidrelay_core::{
    classify, encode_ping, Direction, Frame, FrameError, HexSlice, Mailbox, MailboxError,
    MessageType,
};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Error type for HID device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no HID interface matches {0}")]
    NotFound(String),
    #[error("failed to open HID device: {0}")]
    Open(String),
    #[error("HID read failed: {0}")]
    Read(String),
    #[error("HID write failed: {0}")]
    Write(String),
    #[error("malformed HID report: {0}")]
    Frame(#[from] FrameError),
    #[error("HID support not compiled in (enable the `hidapi` feature)")]
    Unsupported,
}

/// Raw HID device abstraction.
///
/// The production implementation uses `hidapi`; tests use
/// [`crate::infrastructure::device::mock::MockDevice`].  Closing the device is
/// done by dropping it.
#[cfg_attr(test, mockall::automock)]
pub trait HidDevice: Send {
    /// Reads one report, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError>;

    /// Writes one report to the device.
    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError>;
}

impl<D: HidDevice + ?Sized> HidDevice for Box<D> {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        (**self).read(timeout)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError> {
        (**self).write(frame)
    }
}

/// Fatal outcomes of the device link loop.
#[derive(Debug, Error)]
pub enum DeviceLinkError {
    #[error("device read failed {count} times in a row")]
    ReadFailed {
        count: u32,
        #[source]
        last: DeviceError,
    },
    #[error("device write failed {count} times in a row")]
    WriteFailed {
        count: u32,
        #[source]
        last: DeviceError,
    },
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Settings for the device link loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLinkConfig {
    /// Upper bound on a single device read.
    pub poll_interval: Duration,
    /// Time between keepalive PINGs.
    pub keepalive_interval: Duration,
    /// Consecutive read (or write) failures tolerated before the loop gives up.
    pub max_consecutive_errors: u32,
}

impl Default for DeviceLinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            keepalive_interval: Duration::from_secs(5),
            max_consecutive_errors: 5,
        }
    }
}

/// Counters reported when the loop stops cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceLinkStats {
    pub frames_forwarded: u64,
    pub frames_written: u64,
    pub pings_sent: u64,
    pub pongs_seen: u64,
    pub missed_pongs: u64,
}

/// Keepalive bookkeeping.
#[derive(Debug)]
struct Keepalive {
    interval: Duration,
    next_due: Instant,
    awaiting_pong: bool,
}

impl Keepalive {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now,
            awaiting_pong: false,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Moves the boundary forward without letting a stalled loop fire a burst
    /// of PINGs to catch up.
    fn advance(&mut self, now: Instant) {
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
    }
}

/// The device link task.
///
/// Owns the HID device exclusively; the device is closed when the task
/// returns, whether it stopped cleanly or failed.
pub struct DeviceLink<D: HidDevice> {
    device: D,
    mailbox: Arc<Mailbox>,
    config: DeviceLinkConfig,
    keepalive: Keepalive,
    pending: Option<Frame>,
    read_failures: u32,
    write_failures: u32,
    stats: DeviceLinkStats,
}

impl<D: HidDevice> DeviceLink<D> {
    /// Creates the task.  The first keepalive PING goes out on the first
    /// iteration.
    pub fn new(device: D, mailbox: Arc<Mailbox>, config: DeviceLinkConfig) -> Self {
        let keepalive = Keepalive::new(config.keepalive_interval, Instant::now());
        Self {
            device,
            mailbox,
            config,
            keepalive,
            pending: None,
            read_failures: 0,
            write_failures: 0,
            stats: DeviceLinkStats::default(),
        }
    }

    /// Runs the polling loop until `running` is cleared or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceLinkError`] after `max_consecutive_errors` failed reads
    /// or writes in a row, or if the mailbox lock is poisoned.
    pub fn run(mut self, running: &AtomicBool) -> Result<DeviceLinkStats, DeviceLinkError> {
        info!(
            "device link started (poll {:?}, keepalive {:?})",
            self.config.poll_interval, self.config.keepalive_interval
        );

        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.step(Instant::now()) {
                error!("device link stopping: {e}");
                return Err(e);
            }
        }

        info!("device link stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    /// One iteration of the loop.
    pub fn step(&mut self, now: Instant) -> Result<(), DeviceLinkError> {
        if self.keepalive.is_due(now) {
            self.send_keepalive(now)?;
        }
        if self.offer_pending()? {
            self.poll_inbound()?;
        } else {
            // Reads are paused; keep the loop from spinning.
            std::thread::sleep(self.config.poll_interval);
        }
        self.drain_outbound()?;
        Ok(())
    }

    /// Counters so far.
    pub fn stats(&self) -> DeviceLinkStats {
        self.stats
    }

    fn send_keepalive(&mut self, now: Instant) -> Result<(), DeviceLinkError> {
        // A PONG cannot be seen while reads are paused.
        if self.keepalive.awaiting_pong && self.pending.is_none() {
            self.stats.missed_pongs += 1;
            warn!(
                "no PONG from device within {:?}; link may be down",
                self.keepalive.interval
            );
        }
        self.keepalive.advance(now);

        match self.device.write(&encode_ping()) {
            Ok(()) => {
                self.write_failures = 0;
                self.stats.pings_sent += 1;
                self.keepalive.awaiting_pong = true;
                debug!("PING sent");
                Ok(())
            }
            Err(e) => self.record_write_failure(e),
        }
    }

    fn poll_inbound(&mut self) -> Result<(), DeviceLinkError> {
        let frame = match self.device.read(self.config.poll_interval) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.read_failures = 0;
                return Ok(());
            }
            Err(e) => {
                self.read_failures += 1;
                warn!(
                    "device read failed ({}/{}): {e}",
                    self.read_failures, self.config.max_consecutive_errors
                );
                if self.read_failures >= self.config.max_consecutive_errors {
                    return Err(DeviceLinkError::ReadFailed {
                        count: self.read_failures,
                        last: e,
                    });
                }
                return Ok(());
            }
        };
        self.read_failures = 0;
        debug!("device frame: {}", HexSlice::new(frame.as_bytes()));

        match classify(&frame) {
            MessageType::Pong => {
                self.stats.pongs_seen += 1;
                self.keepalive.awaiting_pong = false;
            }
            kind if kind.is_keepalive() => {
                debug!("device sent {kind:?}; link-layer only, not forwarded");
            }
            _ => {
                self.pending = Some(frame);
                self.offer_pending()?;
            }
        }
        Ok(())
    }

    /// Moves the held-back frame into the device→peer slot if the slot is free.
    ///
    /// Returns `true` when nothing is held back any more.
    fn offer_pending(&mut self) -> Result<bool, DeviceLinkError> {
        let Some(frame) = self.pending else {
            return Ok(true);
        };
        if !self.mailbox.try_publish(Direction::DeviceToPeer, &frame)? {
            trace!("device->peer slot still full; holding frame back");
            return Ok(false);
        }
        self.pending = None;
        self.stats.frames_forwarded += 1;
        Ok(true)
    }

    fn drain_outbound(&mut self) -> Result<(), DeviceLinkError> {
        let Some(frame) = self.mailbox.try_take(Direction::PeerToDevice)? else {
            return Ok(());
        };
        match self.device.write(&frame) {
            Ok(()) => {
                self.write_failures = 0;
                self.stats.frames_written += 1;
                debug!("response written to device");
                Ok(())
            }
            Err(e) => self.record_write_failure(e),
        }
    }

    fn record_write_failure(&mut self, e: DeviceError) -> Result<(), DeviceLinkError> {
        self.write_failures += 1;
        warn!(
            "device write failed ({}/{}): {e}",
            self.write_failures, self.config.max_consecutive_errors
        );
        if self.write_failures >= self.config.max_consecutive_errors {
            return Err(DeviceLinkError::WriteFailed {
                count: self.write_failures,
                last: e,
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidrelay_core::encode_pong;

    fn config() -> DeviceLinkConfig {
        DeviceLinkConfig {
            poll_interval: Duration::from_millis(1),
            keepalive_interval: Duration::from_secs(60),
            max_consecutive_errors: 3,
        }
    }

    #[test]
    fn test_default_config_values() {
        let cfg = DeviceLinkConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(5));
        assert_eq!(cfg.max_consecutive_errors, 5);
    }

    #[test]
    fn test_first_step_sends_ping() {
        // Arrange
        let mut device = MockHidDevice::new();
        device
            .expect_write()
            .withf(|f| classify(f) == MessageType::Ping)
            .times(1)
            .returning(|_| Ok(()));
        device.expect_read().returning(|_| Ok(None));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());

        // Act
        link.step(Instant::now()).unwrap();

        // Assert
        assert_eq!(link.stats().pings_sent, 1);
    }

    #[test]
    fn test_data_frame_is_published_to_peer_direction() {
        // Arrange
        let frame = Frame::data(b"key").unwrap();
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device.expect_read().times(1).returning(move |_| Ok(Some(frame)));
        let mailbox = Arc::new(Mailbox::new());
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());

        // Act
        link.step(Instant::now()).unwrap();

        // Assert
        assert_eq!(mailbox.try_take(Direction::DeviceToPeer).unwrap(), Some(frame));
        assert_eq!(link.stats().frames_forwarded, 1);
    }

    #[test]
    fn test_frames_arriving_faster_than_relay_drains_are_all_delivered_in_order() {
        // Arrange – two DATA frames back to back, nobody draining the slot
        let first = Frame::data(b"first").unwrap();
        let second = Frame::data(b"second").unwrap();
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        let mut seq = mockall::Sequence::new();
        device
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(first)));
        device
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(second)));
        device
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        let mailbox = Arc::new(Mailbox::new());
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());
        let now = Instant::now();

        // Act – the third step must not read while "second" is held back
        link.step(now).unwrap();
        link.step(now).unwrap();
        link.step(now).unwrap();
        let taken_first = mailbox.try_take(Direction::DeviceToPeer).unwrap();
        let forwarded_before_drain = link.stats().frames_forwarded;
        link.step(now).unwrap();
        let taken_second = mailbox.try_take(Direction::DeviceToPeer).unwrap();

        // Assert
        assert_eq!(taken_first, Some(first));
        assert_eq!(forwarded_before_drain, 1, "a held-back frame is not forwarded yet");
        assert_eq!(taken_second, Some(second));
        assert_eq!(link.stats().frames_forwarded, 2);
    }

    #[test]
    fn test_held_back_frame_still_lets_responses_through() {
        // Arrange
        let held = Frame::data(b"held").unwrap();
        let response = Frame::data(b"resp").unwrap();
        let mut device = MockHidDevice::new();
        device
            .expect_write()
            .withf(|f| classify(f) == MessageType::Ping)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(move |f| *f == response)
            .times(1)
            .returning(|_| Ok(()));
        device.expect_read().times(1).returning(move |_| Ok(Some(held)));
        let mailbox = Arc::new(Mailbox::new());
        mailbox
            .publish(Direction::DeviceToPeer, &Frame::data(b"in flight").unwrap())
            .unwrap();
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());
        let now = Instant::now();

        // Act
        link.step(now).unwrap();
        mailbox.publish(Direction::PeerToDevice, &response).unwrap();
        link.step(now).unwrap();

        // Assert
        assert_eq!(link.pending, Some(held));
        assert_eq!(link.stats().frames_written, 1);
    }

    #[test]
    fn test_missed_pong_is_not_counted_while_reads_are_paused() {
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());
        link.keepalive.awaiting_pong = true;
        link.pending = Some(Frame::data(b"x").unwrap());
        link.mailbox
            .publish(Direction::DeviceToPeer, &Frame::data(b"busy").unwrap())
            .unwrap();

        link.step(Instant::now()).unwrap();

        assert_eq!(link.stats().missed_pongs, 0);
        assert_eq!(link.stats().pings_sent, 1);
    }

    #[test]
    fn test_pong_is_consumed_and_not_forwarded() {
        // Arrange
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device
            .expect_read()
            .times(1)
            .returning(|_| Ok(Some(encode_pong())));
        let mailbox = Arc::new(Mailbox::new());
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());

        // Act
        link.step(Instant::now()).unwrap();

        // Assert
        assert_eq!(mailbox.is_ready(Direction::DeviceToPeer), Ok(false));
        assert_eq!(link.stats().pongs_seen, 1);
        assert!(!link.keepalive.awaiting_pong);
    }

    #[test]
    fn test_device_ping_is_not_forwarded() {
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device
            .expect_read()
            .times(1)
            .returning(|_| Ok(Some(encode_ping())));
        let mailbox = Arc::new(Mailbox::new());
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());

        link.step(Instant::now()).unwrap();

        assert_eq!(mailbox.is_ready(Direction::DeviceToPeer), Ok(false));
        assert_eq!(link.stats().frames_forwarded, 0);
    }

    #[test]
    fn test_unknown_frame_is_forwarded() {
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device
            .expect_read()
            .times(1)
            .returning(|_| Ok(Some(Frame::ZERO)));
        let mailbox = Arc::new(Mailbox::new());
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());

        link.step(Instant::now()).unwrap();

        assert_eq!(
            mailbox.try_take(Direction::DeviceToPeer).unwrap(),
            Some(Frame::ZERO)
        );
    }

    #[test]
    fn test_pending_response_is_written_to_device() {
        // Arrange
        let response = Frame::data(b"resp").unwrap();
        let mut device = MockHidDevice::new();
        device
            .expect_write()
            .withf(|f| classify(f) == MessageType::Ping)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(move |f| *f == response)
            .times(1)
            .returning(|_| Ok(()));
        device.expect_read().returning(|_| Ok(None));
        let mailbox = Arc::new(Mailbox::new());
        mailbox.publish(Direction::PeerToDevice, &response).unwrap();
        let mut link = DeviceLink::new(device, Arc::clone(&mailbox), config());

        // Act
        link.step(Instant::now()).unwrap();

        // Assert
        assert_eq!(mailbox.is_ready(Direction::PeerToDevice), Ok(false));
        assert_eq!(link.stats().frames_written, 1);
    }

    #[test]
    fn test_single_write_failure_is_not_fatal() {
        // Arrange
        let response = Frame::data(b"resp").unwrap();
        let mut device = MockHidDevice::new();
        device
            .expect_write()
            .withf(|f| classify(f) == MessageType::Ping)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(|f| classify(f) == MessageType::Data)
            .times(1)
            .returning(|_| Err(DeviceError::Write("pipe".into())));
        device.expect_read().returning(|_| Ok(None));
        let mailbox = Arc::new(Mailbox::new());
        mailbox.publish(Direction::PeerToDevice, &response).unwrap();
        let mut link = DeviceLink::new(device, mailbox, config());

        // Act
        let result = link.step(Instant::now());

        // Assert
        assert!(result.is_ok());
        assert_eq!(link.write_failures, 1);
    }

    #[test]
    fn test_repeated_read_failures_become_fatal() {
        // Arrange
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device
            .expect_read()
            .times(3)
            .returning(|_| Err(DeviceError::Read("unplugged".into())));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());

        // Act
        let now = Instant::now();
        assert!(link.step(now).is_ok());
        assert!(link.step(now).is_ok());
        let result = link.step(now);

        // Assert
        assert!(
            matches!(result, Err(DeviceLinkError::ReadFailed { count: 3, .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn test_successful_read_resets_failure_count() {
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        let mut seq = mockall::Sequence::new();
        device
            .expect_read()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(DeviceError::Read("glitch".into())));
        device
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        device
            .expect_read()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(DeviceError::Read("glitch".into())));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());

        let now = Instant::now();
        for _ in 0..5 {
            assert!(link.step(now).is_ok());
        }
        assert_eq!(link.read_failures, 2);
    }

    #[test]
    fn test_missed_pong_is_counted_but_not_fatal() {
        // Arrange
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device.expect_read().returning(|_| Ok(None));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());
        let start = Instant::now();

        // Act – two keepalive boundaries with no PONG in between
        link.step(start).unwrap();
        link.step(start + Duration::from_secs(61)).unwrap();

        // Assert
        assert_eq!(link.stats().pings_sent, 2);
        assert_eq!(link.stats().missed_pongs, 1);
    }

    #[test]
    fn test_pong_prior_to_boundary_does_not_suppress_next_ping() {
        // Arrange
        let mut device = MockHidDevice::new();
        device.expect_write().returning(|_| Ok(()));
        device
            .expect_read()
            .returning(|_| Ok(Some(encode_pong())));
        let mut link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());
        let start = Instant::now();

        // Act
        link.step(start).unwrap();
        link.step(start + Duration::from_secs(30)).unwrap();
        link.step(start + Duration::from_secs(60)).unwrap();

        // Assert
        assert_eq!(link.stats().pings_sent, 2);
        assert_eq!(link.stats().missed_pongs, 0);
    }

    #[test]
    fn test_keepalive_does_not_burst_after_stall() {
        let mut keepalive = Keepalive::new(Duration::from_secs(1), Instant::now());
        let later = keepalive.next_due + Duration::from_secs(10);

        keepalive.advance(later);

        assert_eq!(keepalive.next_due, later + Duration::from_secs(1));
    }

    #[test]
    fn test_run_returns_immediately_when_not_running() {
        let device = MockHidDevice::new();
        let link = DeviceLink::new(device, Arc::new(Mailbox::new()), config());
        let running = AtomicBool::new(false);

        let stats = link.run(&running).expect("clean stop");

        assert_eq!(stats, DeviceLinkStats::default());
    }
}
