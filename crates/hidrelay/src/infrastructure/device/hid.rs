//! `hidapi`-backed [`HidDevice`].

use std::time::Duration;

use hidapi::HidApi;
use hidrelay_core::{Frame, FRAME_SIZE};
use tracing::{debug, info};

use super::DeviceSelector;
use crate::application::device_link::{DeviceError, HidDevice};

/// An open HID interface.
pub struct HidapiDevice {
    inner: hidapi::HidDevice,
    selector: DeviceSelector,
}

impl HidapiDevice {
    /// Enumerates HID interfaces and opens the first one matching `selector`.
    pub fn open(selector: &DeviceSelector) -> Result<Self, DeviceError> {
        let api = HidApi::new().map_err(|e| DeviceError::Open(e.to_string()))?;

        let info = api
            .device_list()
            .find(|d| {
                selector.matches(d.vendor_id(), d.product_id(), d.usage_page(), d.usage())
            })
            .ok_or_else(|| DeviceError::NotFound(selector.to_string()))?;
        debug!("opening HID interface at {:?}", info.path());

        let inner = info
            .open_device(&api)
            .map_err(|e| DeviceError::Open(e.to_string()))?;
        info!("opened HID device {selector}");

        Ok(Self {
            inner,
            selector: *selector,
        })
    }
}

impl HidDevice for HidapiDevice {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        let mut buf = [0u8; FRAME_SIZE];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = self
            .inner
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| DeviceError::Read(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Frame::from_partial(&buf[..n])?))
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError> {
        // Report id 0: the device does not use numbered reports.
        let mut report = [0u8; FRAME_SIZE + 1];
        report[1..].copy_from_slice(frame.as_bytes());
        let n = self
            .inner
            .write(&report)
            .map_err(|e| DeviceError::Write(e.to_string()))?;
        if n < report.len() {
            return Err(DeviceError::Write(format!(
                "short write to {}: {n} of {} bytes",
                self.selector,
                report.len()
            )));
        }
        Ok(())
    }
}
