//! Core constants for the fingerprint capture session.
//!
//! This module centralizes the fixed values the capture session relies on:
//! retry timing for the stop-capture protocol, the device index that is
//! opened, capability-resolution thresholds for split four-finger scanners,
//! and the default strings published to the presentation layer.
//!
//! # Usage
//!
//! ```
//! use fingerscan_core::constants::*;
//! use std::time::Duration;
//!
//! let retry = Duration::from_millis(STOPPING_CAPTURE_DELAY_MS);
//! assert_eq!(retry.as_millis(), 250);
//! assert_eq!(TARGET_RESOLUTION_PPI, 500);
//! ```
//!
//! Most of these values are defaults; [`SessionConfig`](crate::SessionConfig)
//! can override the ones that differ between deployments.

// ============================================================================
// Stop-Capture Protocol
// ============================================================================

/// Delay between liveness polls while stopping a capture, in milliseconds.
///
/// The scanner cannot cancel an acquisition synchronously, so the session
/// re-polls `is_capture_active` at this interval until the device reports
/// the capture has ended.
pub const STOPPING_CAPTURE_DELAY_MS: u64 = 250;

// ============================================================================
// Device Selection
// ============================================================================

/// Index of the device that is described on refresh and opened on request.
///
/// The session drives a single scanner; when several are attached, the first
/// enumerated one is used.
pub const INITIALIZING_DEVICE_INDEX: usize = 0;

/// Scan resolution, in pixels per inch, used for every capability query and
/// every capture.
pub const TARGET_RESOLUTION_PPI: u16 = 500;

// ============================================================================
// Capability Resolution
// ============================================================================

/// Product identifiers that expose left/right split four-finger capture.
///
/// These scanners report a generic flat four-finger mode that is replaced by
/// two hand-specific modes during capability resolution.
pub const SPLIT_FOUR_FINGER_PRODUCTS: &[&str] = &["KOJAK"];

/// The supported-mode list must be longer than this before split four-finger
/// aliasing is applied.
pub const SPLIT_FOUR_FINGER_MODE_THRESHOLD: usize = 4;

/// Pause after signalling a split four-finger result on the device LEDs, in
/// milliseconds.
pub const SPLIT_FOUR_FINGER_SETTLE_MS: u64 = 100;

// ============================================================================
// Presentation Defaults
// ============================================================================

/// Number of per-finger quality indicators published to the presentation layer.
pub const FINGER_QUALITIES_COUNT: usize = 4;

/// Frame time shown when no preview frame has been received.
pub const FRAME_TIME_DEFAULT: &str = "n/a";

/// Device description shown when no scanner is attached.
pub const NO_DEVICE_DESCRIPTION: &str = "(no scanner)";

/// Base file name used when exporting a captured image.
pub const DEFAULT_EXPORT_FILE_NAME: &str = "output";
