//! Fingerprint capture session.
//!
//! This crate drives a fingerprint scanner through the lifecycle of a capture
//! session: enumeration, asynchronous open, capability resolution, capture,
//! the two-phase stop protocol, result handling and teardown.
//!
//! - [`state_machine`]: the eleven session states and their transition table
//! - [`Session`]: entry actions, callback handling and observable state
//! - [`SessionDispatcher`]: the tokio task that serializes every input
//! - [`capability`], [`leds`], [`stop_capture`]: pure building blocks
//! - [`export`]: writing captured images out
//!
//! The scanner is reached only through
//! [`ScanGateway`](fingerscan_hardware::ScanGateway), so the whole crate runs
//! against [`MockGateway`](fingerscan_hardware::mock::MockGateway) in tests.

pub mod capability;
pub mod dispatcher;
pub mod effects;
pub mod event;
pub mod export;
pub mod leds;
pub mod session;
pub mod state_machine;
pub mod stop_capture;

pub use capability::{CaptureMode, DeviceClass, ResolvedCapabilities, resolve_capabilities};
pub use dispatcher::{DispatcherHandle, SessionDispatcher};
pub use effects::{QualityColor, QualityIndicator, SessionEffect};
pub use event::{Directive, SessionEvent, UserCommand};
pub use export::{ImageExporter, PngExporter};
pub use session::{CapturedImage, Session, SessionSnapshot};
pub use state_machine::{AppState, StateMachine, StateTransition};
