//! HID device infrastructure.
//!
//! With the `hidapi` feature enabled, [`open_device`] enumerates the HID
//! interfaces on the system and opens the one matching a [`DeviceSelector`].
//! A composite USB device usually exposes several interfaces under the same
//! vendor/product id, which is why the usage page and usage are part of the
//! selector: they pick out the vendor-defined raw interface.
//!
//! # Testability
//!
//! The device link only sees the [`HidDevice`] trait, so tests run against
//! [`mock::MockDevice`] without any hardware attached.

use std::fmt;

use crate::application::device_link::{DeviceError, HidDevice};

pub mod mock;

#[cfg(feature = "hidapi")]
pub mod hid;

/// Identifies the HID interface to open.
///
/// The values are passed to the HID layer unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
}

impl DeviceSelector {
    /// Returns `true` if an interface with these identifiers is the one wanted.
    pub fn matches(&self, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> bool {
        self.vendor_id == vendor_id
            && self.product_id == product_id
            && self.usage_page == usage_page
            && self.usage == usage
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (usage page {:#06x}, usage {:#04x})",
            self.vendor_id, self.product_id, self.usage_page, self.usage
        )
    }
}

/// Opens the HID interface described by `selector`.
///
/// # Errors
///
/// Returns [`DeviceError::NotFound`] if no interface matches,
/// [`DeviceError::Open`] if the matching interface cannot be opened, or
/// [`DeviceError::Unsupported`] when built without the `hidapi` feature.
pub fn open_device(selector: &DeviceSelector) -> Result<Box<dyn HidDevice>, DeviceError> {
    #[cfg(feature = "hidapi")]
    {
        Ok(Box::new(hid::HidapiDevice::open(selector)?))
    }

    #[cfg(not(feature = "hidapi"))]
    {
        tracing::error!("cannot open {selector}: built without HID support");
        Err(DeviceError::Unsupported)
    }
}
