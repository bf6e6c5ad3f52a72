use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("No device is open")]
    NoActiveDevice,

    #[error("Capture mode index {index} out of range ({available} available)")]
    CaptureModeOutOfRange { index: usize, available: usize },

    #[error("No captured image is available")]
    NoCapturedImage,

    // Export errors
    #[error("Invalid export file name: {0}")]
    InvalidFileName(String),

    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    // Dispatcher errors
    #[error("Session dispatcher has stopped")]
    DispatcherStopped,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
