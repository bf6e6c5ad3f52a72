//! Error types for scanner gateway operations.
//!
//! Every call into the scanner driver can fail: the device may have been
//! unplugged, the driver may not support a capture type, or the USB link may
//! drop mid-acquisition. These failures are values, never panics, and the
//! capture session decides how each one routes through its state machine.

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors reported by a [`ScanGateway`](crate::ScanGateway).
///
/// The type is `Clone` because acquisition errors travel inside
/// [`GatewayEvent::ResultAvailable`](crate::GatewayEvent::ResultAvailable)
/// alongside the image they describe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Device handle no longer refers to an open scanner.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// No scanner is attached at the requested index.
    #[error("No device at index {index}")]
    DeviceNotFound { index: usize },

    /// The platform refused access to the USB device.
    #[error("Permission denied for device {device_id}")]
    PermissionDenied { device_id: u32 },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Operation is not supported by this device.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Image acquisition failed or produced a degraded image.
    #[error("Capture error: {message}")]
    CaptureFailed { message: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new device-not-found error.
    pub fn device_not_found(index: usize) -> Self {
        Self::DeviceNotFound { index }
    }

    /// Create a new permission denied error.
    pub fn permission_denied(device_id: u32) -> Self {
        Self::PermissionDenied { device_id }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new capture error.
    pub fn capture_failed(message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error means the link to the scanner is gone.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::CommunicationError { .. } | Self::Timeout { .. }
        )
    }
}
