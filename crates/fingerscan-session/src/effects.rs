//! Observable effects published by the session.
//!
//! The session never talks to a presentation layer directly. Every change a
//! user could observe is published as a [`SessionEffect`] on an unbounded
//! channel; a UI, a CLI or a test consumes them in order.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fingerscan_hardware::{FingerQualityState, ImageData, ImageType};

use crate::capability::CaptureMode;
use crate::state_machine::AppState;

/// Colour of a per-finger quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityColor {
    Green,
    Yellow,
    Red,
    LightGray,
}

/// Edge of the platen a finger strays over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMarker {
    Top,
    Left,
    Right,
}

/// Display state of one per-finger quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIndicator {
    pub color: QualityColor,
    pub marker: Option<EdgeMarker>,
}

impl QualityIndicator {
    /// Indicator shown when no finger is present.
    pub const EMPTY: QualityIndicator = QualityIndicator {
        color: QualityColor::LightGray,
        marker: None,
    };
}

impl From<FingerQualityState> for QualityIndicator {
    fn from(state: FingerQualityState) -> Self {
        let (color, marker) = match state {
            FingerQualityState::Good => (QualityColor::Green, None),
            FingerQualityState::Fair => (QualityColor::Yellow, None),
            FingerQualityState::Poor => (QualityColor::Red, None),
            FingerQualityState::NotPresent => (QualityColor::LightGray, None),
            FingerQualityState::InvalidAreaTop => (QualityColor::Red, Some(EdgeMarker::Top)),
            FingerQualityState::InvalidAreaLeft => (QualityColor::Red, Some(EdgeMarker::Left)),
            FingerQualityState::InvalidAreaRight => (QualityColor::Red, Some(EdgeMarker::Right)),
        };
        Self { color, marker }
    }
}

/// Map reported finger qualities onto a fixed number of indicators.
///
/// Missing entries show as empty; extra entries are ignored.
pub fn quality_indicators(qualities: &[FingerQualityState], count: usize) -> Vec<QualityIndicator> {
    (0..count)
        .map(|i| {
            qualities
                .get(i)
                .map_or(QualityIndicator::EMPTY, |state| QualityIndicator::from(*state))
        })
        .collect()
}

/// Everything the session publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// A transition was applied.
    StateChanged { from: AppState, to: AppState },

    /// New status line.
    Status(String),

    /// Transient user notification.
    Notice(String),

    /// Description of the attached scanner.
    Description(String),

    /// Number of attached scanners.
    DeviceCount(usize),

    /// Per-finger quality indicators.
    FingerQualities(Vec<QualityIndicator>),

    /// Preview frame time, or the default placeholder.
    FrameTime(String),

    /// Capture modes offered to the user and the selected index.
    CaptureModes {
        modes: Vec<CaptureMode>,
        selected: Option<usize>,
    },

    /// A captured image can be inspected.
    ImageAvailable {
        image: ImageData,
        image_type: ImageType,
    },

    /// A preview frame arrived.
    Preview(ImageData),

    /// Audible acknowledgement that an acquisition finished.
    Beep,

    /// NFIQ score of the last captured image.
    QualityScore(u8),

    /// Outcome of an export request.
    ExportFinished {
        file_name: String,
        result: Result<PathBuf, String>,
    },

    /// A requested transition was not applied.
    Rejected { from: AppState, to: AppState },
}
