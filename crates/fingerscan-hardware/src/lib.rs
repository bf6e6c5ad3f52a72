//! Scanner gateway abstraction for the fingerscan capture session.
//!
//! This crate defines the narrow interface the capture session needs from a
//! fingerprint scanner driver, the closed set of callbacks such a driver
//! produces, and a scriptable mock driver for development and testing.
//!
//! # Design Philosophy
//!
//! - **Synchronous calls, asynchronous outcomes**: [`ScanGateway`] methods
//!   return immediately; long-running work reports back as [`GatewayEvent`]s.
//! - **Closed callback set**: every driver callback is a [`GatewayEvent`]
//!   variant, so consumers handle them with one exhaustive `match`.
//! - **Thread-safe**: the trait requires `Send + Sync` and
//!   [`GatewayEventSink`] never blocks, so driver threads can call it directly.
//! - **Error-aware**: all fallible operations return [`Result<T>`] with a
//!   [`GatewayError`].
//!
//! # Example
//!
//! ```
//! use fingerscan_hardware::mock::{MockDevice, MockGateway};
//! use fingerscan_hardware::{GatewayEventSink, ScanGateway};
//!
//! let (gateway, handle) = MockGateway::new();
//! let (sink, _events) = GatewayEventSink::channel();
//! handle.connect(sink);
//! handle.attach(MockDevice::new("KOJAK", "0001"));
//!
//! let count = gateway.device_count().unwrap();
//! let label = gateway.device_description(0).unwrap().label();
//! assert_eq!((count, label.as_str()), (1, "KOJAK - 0001"));
//! ```

pub mod error;
pub mod events;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{GatewayError, Result};
pub use events::{GatewayEvent, GatewayEventSink};
pub use traits::ScanGateway;
pub use types::{
    CaptureOptions, DeviceDescriptor, DeviceHandle, FingerCountState, FingerQualityState, Hand,
    ImageData, ImageResolution, ImageType, LedPattern, PlatenState, PropertyId,
};
