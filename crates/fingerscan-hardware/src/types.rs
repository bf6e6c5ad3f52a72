//! Common types shared between the gateway trait, its events and its callers.
//!
//! This module defines device identity, capture parameters, image buffers and
//! the per-finger feedback values the scanner reports while acquiring.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GatewayError, Result};

/// Opaque handle to an open scanner.
///
/// Handles are minted by the gateway when an open completes and are only
/// meaningful to the gateway that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    /// Wrap a raw gateway handle id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw gateway handle id.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Identity of an attached scanner, available before it is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Product name (e.g., "KOJAK", "WATSON MINI").
    pub product_name: String,

    /// Device serial number.
    pub serial_number: String,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceDescriptor {
    /// Create a new descriptor with required fields.
    pub fn new(product_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            serial_number: serial_number.into(),
            firmware_version: None,
        }
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }

    /// Human readable description in the form `"product - serial"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.product_name, self.serial_number)
    }
}

/// Abstract capture types a scanner may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    /// A single finger rolled nail to nail.
    RollSingleFinger,

    /// A single finger pressed flat.
    FlatSingleFinger,

    /// Two fingers pressed flat.
    FlatTwoFingers,

    /// Four fingers of one hand pressed flat.
    FlatFourFingers,

    /// Three fingers pressed flat.
    FlatThreeFingers,
}

impl ImageType {
    /// Candidate types in the order they are probed after open.
    pub const CANDIDATES: [ImageType; 5] = [
        ImageType::RollSingleFinger,
        ImageType::FlatSingleFinger,
        ImageType::FlatTwoFingers,
        ImageType::FlatFourFingers,
        ImageType::FlatThreeFingers,
    ];

    /// Whether this is the rolled capture type.
    pub fn is_roll(self) -> bool {
        matches!(self, ImageType::RollSingleFinger)
    }

    /// User facing label.
    pub fn label(self) -> &'static str {
        match self {
            ImageType::RollSingleFinger => "Single finger rolled",
            ImageType::FlatSingleFinger => "Single finger flat",
            ImageType::FlatTwoFingers => "Two fingers flat",
            ImageType::FlatFourFingers => "Four fingers flat",
            ImageType::FlatThreeFingers => "Three fingers flat",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scan resolution in pixels per inch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageResolution(u16);

impl ImageResolution {
    /// Wrap a resolution in pixels per inch.
    pub const fn ppi(ppi: u16) -> Self {
        Self(ppi)
    }

    /// Resolution in pixels per inch.
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ppi", self.0)
    }
}

/// Options passed to [`begin_capture`](crate::ScanGateway::begin_capture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Finish the acquisition automatically once a good image is seen.
    pub auto_capture: bool,

    /// Let the scanner adjust contrast while acquiring.
    pub auto_contrast: bool,
}

impl CaptureOptions {
    /// Automatic capture with automatic contrast.
    pub const fn automatic() -> Self {
        Self {
            auto_capture: true,
            auto_contrast: true,
        }
    }
}

/// Which hand a split four-finger capture targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hand::Left => write!(f, "Left"),
            Hand::Right => write!(f, "Right"),
        }
    }
}

/// Device properties readable and writable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyId {
    ProductId,
    SerialNumber,
    FirmwareVersion,
    ImageWidth,
    ImageHeight,
    RolledImageWidth,
    RolledImageHeight,
    EnablePowerSaveMode,
}

/// Finger-count feedback while capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerCountState {
    Ok,
    TooManyFingers,
    TooFewFingers,
    NonFinger,
}

/// Per-finger quality feedback while capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerQualityState {
    Good,
    Fair,
    Poor,
    NotPresent,
    InvalidAreaTop,
    InvalidAreaLeft,
    InvalidAreaRight,
}

/// Whether anything is resting on the scanner platen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatenState {
    Clear,
    HasFingers,
}

/// Grayscale image produced by the scanner.
///
/// The pixel buffer is reference counted, so cloning an image to hand it to a
/// background worker does not copy pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    buffer: Bytes,
    width: u32,
    height: u32,
    frame_time: f64,
    captured_at: DateTime<Utc>,
}

impl ImageData {
    /// Create an image, checking that the buffer covers `width * height` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidData`] if either dimension is zero or the
    /// buffer is shorter than the dimensions require.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerscan_hardware::ImageData;
    ///
    /// let image = ImageData::new(vec![0u8; 6].into(), 3, 2, 0.05).unwrap();
    /// assert_eq!(image.pixel_count(), 6);
    /// assert!(ImageData::new(vec![0u8; 5].into(), 3, 2, 0.05).is_err());
    /// ```
    pub fn new(buffer: Bytes, width: u32, height: u32, frame_time: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GatewayError::invalid_data(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let required = width as usize * height as usize;
        if buffer.len() < required {
            return Err(GatewayError::invalid_data(format!(
                "image buffer holds {} bytes, {width}x{height} needs {required}",
                buffer.len()
            )));
        }
        Ok(Self {
            buffer,
            width,
            height,
            frame_time,
            captured_at: Utc::now(),
        })
    }

    /// Uniform mid-gray image, used by mocks and demos.
    ///
    /// Zero dimensions are raised to one pixel.
    pub fn blank(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let len = width as usize * height as usize;
        Self {
            buffer: Bytes::from(vec![128u8; len]),
            width,
            height,
            frame_time: 0.0,
            captured_at: Utc::now(),
        }
    }

    /// Set the frame time.
    pub fn with_frame_time(mut self, frame_time: f64) -> Self {
        self.frame_time = frame_time;
        self
    }

    /// Number of pixels in the image.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 8-bit grayscale pixels, row major, trimmed to `width * height`.
    ///
    /// Drivers may hand over buffers with trailing padding; it is kept in
    /// [`ImageData::buffer`] but never shows up here.
    pub fn pixels(&self) -> &[u8] {
        &self.buffer[..self.pixel_count()]
    }

    /// The buffer as delivered by the driver.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Seconds the scanner spent producing this frame.
    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    /// When the gateway delivered the image.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Bitmask of scanner LEDs.
///
/// Split four-finger scanners carry a progress LED per hand plus a green and a
/// red LED for each finger; the blink bits make whatever is lit flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LedPattern(u32);

impl LedPattern {
    pub const NONE: LedPattern = LedPattern(0);

    pub const PROGRESS_ROLL: LedPattern = LedPattern(1 << 0);
    pub const PROGRESS_LEFT_HAND: LedPattern = LedPattern(1 << 1);
    pub const PROGRESS_RIGHT_HAND: LedPattern = LedPattern(1 << 2);
    pub const BLINK_GREEN: LedPattern = LedPattern(1 << 3);
    pub const BLINK_RED: LedPattern = LedPattern(1 << 4);

    pub const LEFT_INDEX_GREEN: LedPattern = LedPattern(1 << 8);
    pub const LEFT_MIDDLE_GREEN: LedPattern = LedPattern(1 << 9);
    pub const LEFT_RING_GREEN: LedPattern = LedPattern(1 << 10);
    pub const LEFT_LITTLE_GREEN: LedPattern = LedPattern(1 << 11);
    pub const LEFT_INDEX_RED: LedPattern = LedPattern(1 << 12);
    pub const LEFT_MIDDLE_RED: LedPattern = LedPattern(1 << 13);
    pub const LEFT_RING_RED: LedPattern = LedPattern(1 << 14);
    pub const LEFT_LITTLE_RED: LedPattern = LedPattern(1 << 15);

    pub const RIGHT_INDEX_GREEN: LedPattern = LedPattern(1 << 16);
    pub const RIGHT_MIDDLE_GREEN: LedPattern = LedPattern(1 << 17);
    pub const RIGHT_RING_GREEN: LedPattern = LedPattern(1 << 18);
    pub const RIGHT_LITTLE_GREEN: LedPattern = LedPattern(1 << 19);
    pub const RIGHT_INDEX_RED: LedPattern = LedPattern(1 << 20);
    pub const RIGHT_MIDDLE_RED: LedPattern = LedPattern(1 << 21);
    pub const RIGHT_RING_RED: LedPattern = LedPattern(1 << 22);
    pub const RIGHT_LITTLE_RED: LedPattern = LedPattern(1 << 23);

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: LedPattern) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no LED is lit.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LedPattern {
    type Output = LedPattern;

    fn bitor(self, rhs: LedPattern) -> LedPattern {
        LedPattern(self.0 | rhs.0)
    }
}

impl BitOrAssign for LedPattern {
    fn bitor_assign(&mut self, rhs: LedPattern) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for LedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}
