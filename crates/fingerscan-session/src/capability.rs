//! Capture-mode resolution after a scanner is opened.
//!
//! Each scanner supports a subset of the abstract [`ImageType`]s. Some
//! products additionally expose hand-specific four-finger capture: for those,
//! the generic flat four-finger mode is replaced by a left-hand and a
//! right-hand mode, and the session switches to the split four-finger device
//! class, which drives the scanner's per-finger LEDs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fingerscan_core::SessionConfig;
use fingerscan_core::constants::TARGET_RESOLUTION_PPI;
use fingerscan_hardware::{DeviceHandle, Hand, ImageResolution, ImageType, ScanGateway};

/// A capture mode offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// One of the scanner's own capture types.
    Standard(ImageType),

    /// Four fingers of one hand on a split four-finger scanner.
    SplitFour(Hand),
}

impl CaptureMode {
    /// Image type requested from the scanner for this mode.
    pub fn image_type(&self) -> ImageType {
        match self {
            CaptureMode::Standard(image_type) => *image_type,
            CaptureMode::SplitFour(_) => ImageType::FlatFourFingers,
        }
    }

    /// Hand targeted by a split four-finger mode.
    pub fn hand(&self) -> Option<Hand> {
        match self {
            CaptureMode::Standard(_) => None,
            CaptureMode::SplitFour(hand) => Some(*hand),
        }
    }

    /// Whether this mode rolls a single finger.
    pub fn is_roll(&self) -> bool {
        self.image_type().is_roll() && self.hand().is_none()
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Standard(image_type) => write!(f, "{}", image_type),
            CaptureMode::SplitFour(hand) => write!(f, "{} Four-finger flat fingerprint", hand),
        }
    }
}

/// How the session treats the open scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[default]
    Standard,
    SplitFourFinger,
}

/// Outcome of capability resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapabilities {
    /// Modes offered to the user, in display order.
    pub modes: Vec<CaptureMode>,

    /// Device class implied by the modes.
    pub device_class: DeviceClass,

    /// Index into `modes` selected by default.
    pub default_selection: Option<usize>,
}

impl ResolvedCapabilities {
    /// Resolve modes from the capture types a scanner reported as supported.
    ///
    /// Split aliasing applies when the product is a configured split
    /// four-finger product and more than `split_mode_threshold` types are
    /// supported.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerscan_core::SessionConfig;
    /// use fingerscan_hardware::{Hand, ImageType};
    /// use fingerscan_session::{CaptureMode, DeviceClass, ResolvedCapabilities};
    ///
    /// let resolved = ResolvedCapabilities::from_supported(
    ///     ImageType::CANDIDATES.to_vec(),
    ///     Some("KOJAK"),
    ///     &SessionConfig::default(),
    /// );
    ///
    /// assert_eq!(resolved.device_class, DeviceClass::SplitFourFinger);
    /// assert_eq!(resolved.modes.len(), 6);
    /// assert_eq!(resolved.modes[5], CaptureMode::SplitFour(Hand::Right));
    /// assert_eq!(resolved.default_selection, Some(1));
    /// ```
    pub fn from_supported(
        supported: Vec<ImageType>,
        product_id: Option<&str>,
        config: &SessionConfig,
    ) -> Self {
        let split_product = product_id.is_some_and(|id| config.is_split_four_finger_product(id));
        let split = split_product && supported.len() > config.split_mode_threshold;

        let mut modes: Vec<CaptureMode> = supported.into_iter().map(CaptureMode::Standard).collect();
        let device_class = if split {
            modes.retain(|mode| *mode != CaptureMode::Standard(ImageType::FlatFourFingers));
            modes.push(CaptureMode::SplitFour(Hand::Left));
            modes.push(CaptureMode::SplitFour(Hand::Right));
            DeviceClass::SplitFourFinger
        } else {
            DeviceClass::Standard
        };

        let default_selection = match modes.len() {
            0 => None,
            1 => Some(0),
            _ => Some(1),
        };

        Self {
            modes,
            device_class,
            default_selection,
        }
    }
}

/// Query the scanner for each candidate capture type and resolve modes.
///
/// Query failures are logged and the type is treated as unsupported.
pub fn resolve_capabilities<G>(
    gateway: &G,
    device: DeviceHandle,
    product_id: Option<&str>,
    config: &SessionConfig,
) -> ResolvedCapabilities
where
    G: ScanGateway + ?Sized,
{
    let resolution = ImageResolution::ppi(TARGET_RESOLUTION_PPI);
    let supported: Vec<ImageType> = ImageType::CANDIDATES
        .into_iter()
        .filter(
            |image_type| match gateway.is_capture_available(device, *image_type, resolution) {
                Ok(available) => available,
                Err(e) => {
                    warn!("Capability query for {} failed: {}", image_type, e);
                    false
                }
            },
        )
        .collect();

    let resolved = ResolvedCapabilities::from_supported(supported, product_id, config);
    debug!(
        "Resolved {} capture modes for {:?} ({:?})",
        resolved.modes.len(),
        product_id,
        resolved.device_class
    );
    resolved
}
