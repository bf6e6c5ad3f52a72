//! Two-phase stop-capture protocol.
//!
//! A scanner cannot cancel an acquisition synchronously: cancellation is
//! requested, and the session must poll until the device reports the capture
//! has ended. [`StopCaptureLoop`] performs one poll per call and tells the
//! caller whether to finish or to schedule another tick; the dispatcher owns
//! the timer.
//!
//! Each poll:
//! - probe liveness; not active → stopped
//! - active → request cancel; cancel refused → stopped
//! - cancel accepted → retry after the interval
//! - probe error → assume stopped

use std::time::Duration;

use tracing::{debug, warn};

use fingerscan_hardware::{DeviceHandle, GatewayError, ScanGateway};

/// Why the stop loop finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The device reported no active capture.
    NotActive,

    /// The cancel request was refused.
    CancelFailed(GatewayError),

    /// The liveness probe failed; the capture is assumed stopped.
    ProbeFailed(GatewayError),
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopPoll {
    /// Capture is over (or assumed over).
    Stopped(StopReason),

    /// Cancellation requested; poll again after the delay.
    Retry(Duration),
}

/// Poll object driving the stop-capture protocol for one stop request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fingerscan_hardware::mock::{MockDevice, MockGateway};
/// use fingerscan_hardware::{GatewayEventSink, ScanGateway};
/// use fingerscan_session::stop_capture::{StopCaptureLoop, StopPoll, StopReason};
///
/// let (gateway, handle) = MockGateway::new();
/// let (sink, _events) = GatewayEventSink::channel();
/// handle.connect(sink);
/// handle.attach_silently(MockDevice::new("KOJAK", "1"));
/// gateway.open_async(0).unwrap();
/// let device = handle.open_handle().unwrap();
///
/// handle.script_capture_active([Ok(true), Ok(false)]);
/// let mut stop = StopCaptureLoop::new(Duration::from_millis(250));
///
/// assert_eq!(stop.poll(&gateway, device), StopPoll::Retry(Duration::from_millis(250)));
/// assert_eq!(stop.poll(&gateway, device), StopPoll::Stopped(StopReason::NotActive));
/// assert_eq!(stop.polls(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct StopCaptureLoop {
    interval: Duration,
    polls: u32,
}

impl StopCaptureLoop {
    /// Create a loop that retries at `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval, polls: 0 }
    }

    /// Delay between polls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of polls performed so far, including the first.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Perform one liveness poll.
    pub fn poll<G>(&mut self, gateway: &G, device: DeviceHandle) -> StopPoll
    where
        G: ScanGateway + ?Sized,
    {
        self.polls += 1;

        match gateway.is_capture_active(device) {
            Ok(false) => {
                debug!("Capture on {} stopped after {} polls", device, self.polls);
                StopPoll::Stopped(StopReason::NotActive)
            }
            Ok(true) => match gateway.cancel_capture(device) {
                Ok(()) => {
                    debug!(
                        "Cancel requested on {}, polling again in {:?}",
                        device, self.interval
                    );
                    StopPoll::Retry(self.interval)
                }
                Err(e) => {
                    warn!("Could not cancel capture on {}: {}", device, e);
                    StopPoll::Stopped(StopReason::CancelFailed(e))
                }
            },
            Err(e) => {
                warn!("Could not query capture state on {}: {}", device, e);
                StopPoll::Stopped(StopReason::ProbeFailed(e))
            }
        }
    }
}
