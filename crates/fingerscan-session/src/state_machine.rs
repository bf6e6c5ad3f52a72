//! Capture session state machine.
//!
//! This module defines the eleven states a capture session moves through and
//! the table of allowed transitions between them. [`StateMachine`] enforces
//! that table and keeps a bounded history of applied transitions; the
//! side effects of entering each state live in [`Session`](crate::Session).
//!
//! # States
//!
//! - `NoScannerAttached`: no scanner is enumerated (initial state)
//! - `ScannerAttached`: a scanner is enumerated but not open
//! - `Refresh`: re-enumerating attached scanners
//! - `Initializing`: waiting for an asynchronous open to complete
//! - `Initialized`: a scanner is open and idle
//! - `Closing`: releasing the open scanner
//! - `StartingCapture`: asking the scanner to begin an acquisition
//! - `Capturing`: an acquisition is running
//! - `StoppingCapture`: waiting for a cancelled acquisition to wind down
//! - `ImageCaptured`: a final image has arrived
//! - `CommunicationBreak`: the link to the open scanner broke
//!
//! # Valid Transitions
//!
//! | Target | Allowed sources |
//! |---|---|
//! | NoScannerAttached | Refresh |
//! | ScannerAttached | Refresh |
//! | Refresh | NoScannerAttached, ScannerAttached, Closing |
//! | Initializing | ScannerAttached |
//! | Initialized | Initializing, StartingCapture, StoppingCapture, ImageCaptured |
//! | Closing | Initializing, Initialized, CommunicationBreak |
//! | StartingCapture | Initialized |
//! | Capturing | StartingCapture |
//! | StoppingCapture | Capturing, StoppingCapture |
//! | ImageCaptured | Capturing |
//! | CommunicationBreak | Capturing, StoppingCapture, Initialized |
//!
//! There is no terminal state.
//!
//! # Examples
//!
//! ```
//! use fingerscan_session::{AppState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), &AppState::NoScannerAttached);
//!
//! machine.transition_to(AppState::Refresh).unwrap();
//! machine.transition_to(AppState::ScannerAttached).unwrap();
//! assert!(machine.transition_to(AppState::Capturing).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use fingerscan_core::{Error, Result};

/// Maximum number of state transitions to keep in history.
///
/// A full open/capture/close cycle is roughly ten transitions, so this keeps
/// the last several cycles for diagnostics.
const MAX_HISTORY_SIZE: usize = 100;

/// All states of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// No scanner is enumerated.
    NoScannerAttached,

    /// A scanner is enumerated but not open.
    ScannerAttached,

    /// Re-enumerating attached scanners.
    Refresh,

    /// Waiting for an asynchronous open to complete.
    Initializing,

    /// A scanner is open and idle.
    Initialized,

    /// Releasing the open scanner.
    Closing,

    /// Asking the scanner to begin an acquisition.
    StartingCapture,

    /// An acquisition is running.
    Capturing,

    /// Waiting for a cancelled acquisition to wind down.
    StoppingCapture,

    /// A final image has arrived.
    ImageCaptured,

    /// The link to the open scanner broke.
    CommunicationBreak,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            AppState::NoScannerAttached => "NoScannerAttached",
            AppState::ScannerAttached => "ScannerAttached",
            AppState::Refresh => "Refresh",
            AppState::Initializing => "Initializing",
            AppState::Initialized => "Initialized",
            AppState::Closing => "Closing",
            AppState::StartingCapture => "StartingCapture",
            AppState::Capturing => "Capturing",
            AppState::StoppingCapture => "StoppingCapture",
            AppState::ImageCaptured => "ImageCaptured",
            AppState::CommunicationBreak => "CommunicationBreak",
        };
        write!(f, "{}", state_str)
    }
}

impl AppState {
    /// Every state, in declaration order.
    pub const ALL: [AppState; 11] = [
        AppState::NoScannerAttached,
        AppState::ScannerAttached,
        AppState::Refresh,
        AppState::Initializing,
        AppState::Initialized,
        AppState::Closing,
        AppState::StartingCapture,
        AppState::Capturing,
        AppState::StoppingCapture,
        AppState::ImageCaptured,
        AppState::CommunicationBreak,
    ];

    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerscan_session::AppState;
    ///
    /// assert!(AppState::Closing.can_transition_to(&AppState::Refresh));
    /// assert!(AppState::StoppingCapture.can_transition_to(&AppState::StoppingCapture));
    /// assert!(!AppState::Initialized.can_transition_to(&AppState::Refresh));
    /// ```
    pub fn can_transition_to(&self, target: &AppState) -> bool {
        use AppState::*;

        matches!(
            (self, target),
            // Into NoScannerAttached / ScannerAttached
            (Refresh, NoScannerAttached | ScannerAttached)
            // Into Refresh
            | (NoScannerAttached | ScannerAttached | Closing, Refresh)
            // Into Initializing
            | (ScannerAttached, Initializing)
            // Into Initialized
            | (Initializing | StartingCapture | StoppingCapture | ImageCaptured, Initialized)
            // Into Closing
            | (Initializing | Initialized | CommunicationBreak, Closing)
            // Into StartingCapture
            | (Initialized, StartingCapture)
            // Into Capturing
            | (StartingCapture, Capturing)
            // Into StoppingCapture
            | (Capturing | StoppingCapture, StoppingCapture)
            // Into ImageCaptured
            | (Capturing, ImageCaptured)
            // Into CommunicationBreak
            | (Capturing | StoppingCapture | Initialized, CommunicationBreak)
        )
    }

    /// States from which `self` may be entered.
    pub fn allowed_sources(&self) -> Vec<AppState> {
        AppState::ALL
            .into_iter()
            .filter(|source| source.can_transition_to(self))
            .collect()
    }

    /// Status line shown while in this state.
    pub fn status_text(&self) -> &'static str {
        match self {
            AppState::NoScannerAttached => "no scanners",
            AppState::ScannerAttached => "uninitialized",
            AppState::Refresh => "refreshing",
            AppState::Initializing => "initializing",
            AppState::Initialized => "initialized",
            AppState::Closing => "closing",
            AppState::StartingCapture => "starting",
            AppState::Capturing => "capturing",
            AppState::StoppingCapture => "stopping",
            AppState::ImageCaptured => "captured",
            AppState::CommunicationBreak => "comm break",
        }
    }

    /// Whether a scanner handle may be held in this state.
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            AppState::Initializing
                | AppState::Initialized
                | AppState::StartingCapture
                | AppState::Capturing
                | AppState::StoppingCapture
                | AppState::ImageCaptured
                | AppState::CommunicationBreak
        )
    }
}

/// Represents a single state transition with timestamp.
///
/// The `timestamp` field is not serialized as `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: AppState,

    /// The state transitioned to.
    pub to: AppState,

    /// When the transition occurred.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    /// Create a new state transition record stamped with the current time.
    pub fn new(from: AppState, to: AppState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Whether this transition re-entered the state it left.
    pub fn is_reentry(&self) -> bool {
        self.from == self.to
    }
}

/// State machine enforcing the capture session transition table.
///
/// # Thread Safety
///
/// This struct is not thread-safe. The session dispatcher owns it and is the
/// only task that mutates it.
///
/// # Examples
///
/// ```
/// use fingerscan_session::{AppState, StateMachine};
///
/// let mut machine = StateMachine::new();
///
/// machine.transition_to(AppState::Refresh).unwrap();
/// machine.transition_to(AppState::ScannerAttached).unwrap();
///
/// assert_eq!(machine.history().len(), 2);
/// ```
#[derive(Debug)]
pub struct StateMachine {
    /// Current state of the session.
    current_state: AppState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the `NoScannerAttached` state.
    pub fn new() -> Self {
        Self {
            current_state: AppState::NoScannerAttached,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Get the current state of the machine.
    pub fn current_state(&self) -> &AppState {
        &self.current_state
    }

    /// Get the time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the current state is not
    /// an allowed source of `new_state`. The machine is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerscan_session::{AppState, StateMachine};
    ///
    /// let mut machine = StateMachine::new();
    ///
    /// let transition = machine.transition_to(AppState::Refresh).unwrap();
    /// assert_eq!(transition.from, AppState::NoScannerAttached);
    ///
    /// assert!(machine.transition_to(AppState::Initialized).is_err());
    /// assert_eq!(machine.current_state(), &AppState::Refresh);
    /// ```
    pub fn transition_to(&mut self, new_state: AppState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);

        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.add_to_history(transition.clone());

        Ok(transition)
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
