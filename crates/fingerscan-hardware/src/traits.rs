//! The scanner gateway trait.
//!
//! [`ScanGateway`] is the narrow surface the capture session needs from a
//! fingerprint scanner driver. Unlike a request/response device, a scanner
//! SDK does its long-running work on its own threads: opening a device,
//! acquiring an image and reporting finger feedback all complete through
//! callbacks. The trait therefore has two halves:
//!
//! - **Synchronous calls** (this trait): quick queries and commands that
//!   return immediately, such as enumeration, property access, starting or
//!   cancelling an acquisition.
//! - **Asynchronous outcomes** ([`GatewayEvent`](crate::GatewayEvent)):
//!   delivered through a [`GatewayEventSink`](crate::GatewayEventSink) that
//!   the gateway was connected to.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`: the session calls into the gateway
//! from its dispatcher task and from blocking workers that compute quality
//! scores.
//!
//! # Examples
//!
//! ```
//! use fingerscan_hardware::{ImageResolution, ImageType, Result, ScanGateway};
//! use fingerscan_hardware::DeviceHandle;
//!
//! fn supported_types<G: ScanGateway>(gateway: &G, device: DeviceHandle) -> Vec<ImageType> {
//!     ImageType::CANDIDATES
//!         .into_iter()
//!         .filter(|ty| {
//!             gateway
//!                 .is_capture_available(device, *ty, ImageResolution::ppi(500))
//!                 .unwrap_or(false)
//!         })
//!         .collect()
//! }
//! ```

use crate::Result;
use crate::types::{
    CaptureOptions, DeviceDescriptor, DeviceHandle, ImageData, ImageResolution, ImageType,
    LedPattern, PropertyId,
};

/// Synchronous interface to a fingerprint scanner driver.
///
/// Calls that start long-running work ([`open_async`](Self::open_async),
/// [`begin_capture`](Self::begin_capture)) return once the work is accepted;
/// its outcome arrives later as a [`GatewayEvent`](crate::GatewayEvent).
pub trait ScanGateway: Send + Sync {
    /// Number of scanners currently attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot enumerate devices.
    fn device_count(&self) -> Result<usize>;

    /// Identity of the scanner at `index`, readable without opening it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`](crate::GatewayError::DeviceNotFound)
    /// if no scanner is attached at `index`.
    fn device_description(&self, index: usize) -> Result<DeviceDescriptor>;

    /// Whether the platform has granted access to the USB device `device_id`.
    fn has_permission(&self, device_id: u32) -> bool;

    /// Ask the platform for access to `device_id`.
    ///
    /// The answer arrives as
    /// [`GatewayEvent::PermissionGranted`](crate::GatewayEvent::PermissionGranted)
    /// or [`GatewayEvent::PermissionDenied`](crate::GatewayEvent::PermissionDenied).
    fn request_permission(&self, device_id: u32);

    /// USB ids of attached scanners that have not been granted access yet.
    fn unpermitted_scan_devices(&self) -> Vec<u32>;

    /// Begin opening the scanner at `index`.
    ///
    /// Success means the open was started; the resulting handle (or the
    /// failure) arrives as
    /// [`GatewayEvent::OpenCompleted`](crate::GatewayEvent::OpenCompleted).
    ///
    /// # Errors
    ///
    /// Returns an error if the open could not be started at all.
    fn open_async(&self, index: usize) -> Result<()>;

    /// Close an open scanner and release its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to close the device. The handle
    /// must not be used afterwards either way.
    fn close(&self, device: DeviceHandle) -> Result<()>;

    /// Liveness probe: whether an acquisition is still running on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached, which usually means
    /// it was unplugged.
    fn is_capture_active(&self, device: DeviceHandle) -> Result<bool>;

    /// Request cancellation of the running acquisition.
    ///
    /// Cancellation is not synchronous: callers must poll
    /// [`is_capture_active`](Self::is_capture_active) until it reports false.
    ///
    /// # Errors
    ///
    /// Returns an error if the cancel request is refused.
    fn cancel_capture(&self, device: DeviceHandle) -> Result<()>;

    /// Start an acquisition.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the capture type, resolution or
    /// options, or cannot be reached.
    fn begin_capture(
        &self,
        device: DeviceHandle,
        image_type: ImageType,
        resolution: ImageResolution,
        options: CaptureOptions,
    ) -> Result<()>;

    /// Read a device property as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the property is unknown to the device.
    fn get_property(&self, device: DeviceHandle, property: PropertyId) -> Result<String>;

    /// Write a device property.
    ///
    /// # Errors
    ///
    /// Returns an error if the property is read-only or the value is invalid.
    fn set_property(&self, device: DeviceHandle, property: PropertyId, value: &str) -> Result<()>;

    /// Whether `device` can acquire `image_type` at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability query itself fails.
    fn is_capture_available(
        &self,
        device: DeviceHandle,
        image_type: ImageType,
        resolution: ImageResolution,
    ) -> Result<bool>;

    /// Compute the NFIQ quality score (1 best, 5 worst) of a captured image.
    ///
    /// May take noticeable time; callers run it off the dispatcher task.
    ///
    /// # Errors
    ///
    /// Returns an error if the score cannot be computed.
    fn compute_quality_score(&self, device: DeviceHandle, image: &ImageData) -> Result<u8>;

    /// Light the given LEDs, turning all others off.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unsupported`](crate::GatewayError::Unsupported)
    /// on scanners without controllable LEDs.
    fn set_leds(&self, device: DeviceHandle, pattern: LedPattern) -> Result<()>;
}
