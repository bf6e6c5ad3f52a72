//! Session inputs and outputs.
//!
//! A [`Session`](crate::Session) consumes [`SessionEvent`]s one at a time and
//! answers each with a list of [`Directive`]s: work the session cannot do
//! itself because it involves time or a background thread.

use std::time::Duration;

use fingerscan_hardware::{DeviceHandle, GatewayEvent, ImageData};

use crate::capability::CaptureMode;

/// A request from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Re-enumerate attached scanners.
    Refresh,

    /// Open the configured scanner.
    Open,

    /// Start an acquisition, optionally switching to `mode` first.
    StartCapture(Option<CaptureMode>),

    /// Stop the running acquisition.
    StopCapture,

    /// Close the open scanner.
    Close,

    /// Select the capture mode at an index of the offered list.
    SelectCaptureMode(usize),

    /// Export the last captured image, under the configured name by default.
    ExportLastImage(Option<String>),
}

/// Anything that can arrive in the session inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A user command.
    Command(UserCommand),

    /// A scanner callback.
    Gateway(GatewayEvent),

    /// A stop-capture retry tick scheduled by an earlier
    /// [`Directive::ScheduleStopTick`].
    StopCaptureTick(u64),
}

impl From<UserCommand> for SessionEvent {
    fn from(command: UserCommand) -> Self {
        SessionEvent::Command(command)
    }
}

impl From<GatewayEvent> for SessionEvent {
    fn from(event: GatewayEvent) -> Self {
        SessionEvent::Gateway(event)
    }
}

/// Work requested by the session from whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Deliver `SessionEvent::StopCaptureTick(tick)` after `delay`.
    ScheduleStopTick { delay: Duration, tick: u64 },

    /// Hold all further events for `delay`, then call
    /// [`Session::resume`](crate::Session::resume).
    Settle(Duration),

    /// Compute the quality score of a captured image off the event loop.
    ComputeQuality {
        device: DeviceHandle,
        image: ImageData,
    },

    /// Export an image off the event loop.
    Export { image: ImageData, file_name: String },
}
