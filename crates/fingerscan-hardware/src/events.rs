//! Asynchronous gateway callbacks.
//!
//! Scanner drivers report attach/detach, open completion, acquisition
//! progress and final results from their own threads. Instead of a listener
//! interface with one method per callback, every callback becomes a variant of
//! the closed [`GatewayEvent`] enum and is pushed through a
//! [`GatewayEventSink`]. The sink never blocks, so it is safe to call from a
//! driver thread.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::types::{
    DeviceHandle, FingerCountState, FingerQualityState, ImageData, ImageType, PlatenState,
};
use crate::{GatewayError, Result};

/// Callback events emitted by a scanner gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A USB scan device was plugged in.
    DeviceAttached { device_id: u32 },

    /// A USB scan device was unplugged.
    DeviceDetached { device_id: u32 },

    /// The platform granted access to a device.
    PermissionGranted { device_id: u32 },

    /// The platform refused access to a device.
    PermissionDenied { device_id: u32 },

    /// The number of attached scanners changed.
    DeviceCountChanged { count: usize },

    /// Progress of an open started with `open_async`.
    InitProgress { index: usize, percent: u8 },

    /// An open started with `open_async` finished.
    OpenCompleted {
        index: usize,
        result: Result<DeviceHandle>,
    },

    /// The link to an open device broke.
    CommunicationBroken { device: DeviceHandle },

    /// The scanner counted a different number of fingers on the platen.
    FingerCountChanged {
        device: DeviceHandle,
        state: FingerCountState,
    },

    /// Per-finger quality feedback changed.
    FingerQualityChanged {
        device: DeviceHandle,
        qualities: Vec<FingerQualityState>,
    },

    /// A preview frame is ready.
    PreviewAvailable {
        device: DeviceHandle,
        image: ImageData,
    },

    /// The scanner started acquiring.
    AcquisitionBegun {
        device: DeviceHandle,
        image_type: ImageType,
    },

    /// The scanner finished acquiring and is processing the image.
    AcquisitionCompleted {
        device: DeviceHandle,
        image_type: ImageType,
    },

    /// The final image of an acquisition.
    ///
    /// `status` carries a non-fatal acquisition problem; the image is still
    /// delivered.
    ResultAvailable {
        device: DeviceHandle,
        image: ImageData,
        image_type: ImageType,
        status: Option<GatewayError>,
    },

    /// Something was placed on or lifted from the platen.
    PlatenStateChanged {
        device: DeviceHandle,
        state: PlatenState,
    },

    /// A driver warning that does not affect the session.
    Warning { message: String },
}

impl GatewayEvent {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::DeviceAttached { .. } => "device_attached",
            GatewayEvent::DeviceDetached { .. } => "device_detached",
            GatewayEvent::PermissionGranted { .. } => "permission_granted",
            GatewayEvent::PermissionDenied { .. } => "permission_denied",
            GatewayEvent::DeviceCountChanged { .. } => "device_count_changed",
            GatewayEvent::InitProgress { .. } => "init_progress",
            GatewayEvent::OpenCompleted { .. } => "open_completed",
            GatewayEvent::CommunicationBroken { .. } => "communication_broken",
            GatewayEvent::FingerCountChanged { .. } => "finger_count_changed",
            GatewayEvent::FingerQualityChanged { .. } => "finger_quality_changed",
            GatewayEvent::PreviewAvailable { .. } => "preview_available",
            GatewayEvent::AcquisitionBegun { .. } => "acquisition_begun",
            GatewayEvent::AcquisitionCompleted { .. } => "acquisition_completed",
            GatewayEvent::ResultAvailable { .. } => "result_available",
            GatewayEvent::PlatenStateChanged { .. } => "platen_state_changed",
            GatewayEvent::Warning { .. } => "warning",
        }
    }

    /// The open device a callback belongs to, if it is tied to one.
    pub fn device(&self) -> Option<DeviceHandle> {
        match self {
            GatewayEvent::CommunicationBroken { device }
            | GatewayEvent::FingerCountChanged { device, .. }
            | GatewayEvent::FingerQualityChanged { device, .. }
            | GatewayEvent::PreviewAvailable { device, .. }
            | GatewayEvent::AcquisitionBegun { device, .. }
            | GatewayEvent::AcquisitionCompleted { device, .. }
            | GatewayEvent::ResultAvailable { device, .. }
            | GatewayEvent::PlatenStateChanged { device, .. } => Some(*device),
            _ => None,
        }
    }
}

type Deliver = dyn Fn(GatewayEvent) -> bool + Send + Sync;

/// Non-blocking, cloneable destination for [`GatewayEvent`]s.
///
/// A sink wraps an unbounded tokio channel sender. The receiving side can use
/// any message type that converts from `GatewayEvent`, which lets a
/// dispatcher share one inbox between hardware callbacks and user commands.
///
/// # Examples
///
/// ```
/// use fingerscan_hardware::{GatewayEvent, GatewayEventSink};
///
/// let (sink, mut rx) = GatewayEventSink::channel();
/// sink.emit(GatewayEvent::DeviceCountChanged { count: 1 }).unwrap();
///
/// assert_eq!(rx.try_recv().unwrap(), GatewayEvent::DeviceCountChanged { count: 1 });
/// ```
#[derive(Clone)]
pub struct GatewayEventSink {
    deliver: Arc<Deliver>,
}

impl GatewayEventSink {
    /// Sink feeding an existing unbounded sender.
    pub fn from_sender<T>(tx: mpsc::UnboundedSender<T>) -> Self
    where
        T: From<GatewayEvent> + Send + 'static,
    {
        Self {
            deliver: Arc::new(move |event| tx.send(T::from(event)).is_ok()),
        }
    }

    /// Sink paired with a fresh receiver of raw gateway events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    /// Deliver an event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Disconnected`] if the receiving side has been
    /// dropped.
    pub fn emit(&self, event: GatewayEvent) -> Result<()> {
        let kind = event.kind();
        if (self.deliver)(event) {
            Ok(())
        } else {
            tracing::debug!("Dropped {} event: receiver closed", kind);
            Err(GatewayError::disconnected("gateway event receiver"))
        }
    }
}

impl fmt::Debug for GatewayEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayEventSink").finish_non_exhaustive()
    }
}
