//! The capture session.
//!
//! [`Session`] owns the session state machine, the open scanner handle and
//! everything derived from the scanner's identity. It consumes one
//! [`SessionEvent`] at a time and runs it to completion: the requested
//! transition is validated against the transition table, the entry actions of
//! the new state run, and any follow-up transitions those actions request are
//! applied before `handle` returns.
//!
//! Gateway failures never escape a handler. Each one either routes the
//! session to `Closing`/`Initialized`, or is logged and reported as a notice.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fingerscan_core::SessionConfig;
//! use fingerscan_hardware::mock::{MockDevice, MockGateway};
//! use fingerscan_session::{AppState, Session, UserCommand};
//!
//! let (gateway, handle) = MockGateway::new();
//! handle.attach_silently(MockDevice::new("WATSON MINI", "0001"));
//!
//! let (mut session, _effects) = Session::new(Arc::new(gateway), SessionConfig::default());
//! session.handle(UserCommand::Refresh.into());
//!
//! let snapshot = session.snapshot();
//! assert_eq!(snapshot.state, AppState::ScannerAttached);
//! assert_eq!(snapshot.description, "WATSON MINI - 0001");
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fingerscan_core::constants::{
    FINGER_QUALITIES_COUNT, FRAME_TIME_DEFAULT, NO_DEVICE_DESCRIPTION, TARGET_RESOLUTION_PPI,
};
use fingerscan_core::{Error, SessionConfig};
use fingerscan_hardware::{
    CaptureOptions, DeviceHandle, FingerCountState, GatewayEvent, ImageData, ImageResolution,
    ImageType, LedPattern, PlatenState, PropertyId, ScanGateway,
};

use crate::capability::{CaptureMode, DeviceClass, resolve_capabilities};
use crate::effects::{QualityIndicator, SessionEffect, quality_indicators};
use crate::event::{Directive, SessionEvent, UserCommand};
use crate::leds::{SignalColor, hand_pattern};
use crate::state_machine::{AppState, StateMachine, StateTransition};
use crate::stop_capture::{StopCaptureLoop, StopPoll, StopReason};

/// Notification shown once an acquisition has begun.
const CAPTURING_NOTICE: &str = "Now capturing...put a finger on the sensor";

/// A transition request together with the data its entry actions need.
#[derive(Debug)]
enum Request {
    NoScannerAttached,
    ScannerAttached { description: String, count: usize },
    Refresh,
    Initializing,
    Initialized(Option<DeviceHandle>),
    Closing,
    StartingCapture,
    Capturing,
    StoppingCapture,
    ImageCaptured { image: ImageData, image_type: ImageType },
    CommunicationBreak,
}

impl Request {
    fn target(&self) -> AppState {
        match self {
            Request::NoScannerAttached => AppState::NoScannerAttached,
            Request::ScannerAttached { .. } => AppState::ScannerAttached,
            Request::Refresh => AppState::Refresh,
            Request::Initializing => AppState::Initializing,
            Request::Initialized(_) => AppState::Initialized,
            Request::Closing => AppState::Closing,
            Request::StartingCapture => AppState::StartingCapture,
            Request::Capturing => AppState::Capturing,
            Request::StoppingCapture => AppState::StoppingCapture,
            Request::ImageCaptured { .. } => AppState::ImageCaptured,
            Request::CommunicationBreak => AppState::CommunicationBreak,
        }
    }
}

/// The last image delivered by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub image: ImageData,
    pub image_type: ImageType,
}

/// Read-only view of the session, published after every event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: AppState,
    pub status: String,
    pub description: String,
    pub device_count: usize,
    pub active_device: Option<DeviceHandle>,
    pub product_id: Option<String>,
    pub device_class: DeviceClass,
    pub capture_modes: Vec<CaptureMode>,
    pub selected_mode: Option<usize>,
    pub active_capture: Option<CaptureMode>,
    pub frame_time: String,
    pub finger_qualities: Vec<QualityIndicator>,
    pub last_image_type: Option<ImageType>,
}

/// A single capture session against one scanner.
pub struct Session<G> {
    gateway: Arc<G>,
    config: SessionConfig,
    machine: StateMachine,
    effects: mpsc::UnboundedSender<SessionEffect>,

    active_device: Option<DeviceHandle>,
    product_id: Option<String>,
    device_class: DeviceClass,
    capture_modes: Vec<CaptureMode>,
    selected_mode: Option<usize>,
    active_capture: Option<CaptureMode>,
    last_image: Option<CapturedImage>,

    device_count: usize,
    description: String,
    status: String,
    frame_time: String,
    finger_qualities: Vec<QualityIndicator>,

    stop_loop: Option<StopCaptureLoop>,
    awaited_tick: Option<u64>,
    next_tick: u64,

    pending: VecDeque<Request>,
    settling: bool,
}

impl<G: ScanGateway> Session<G> {
    /// Create a session in `NoScannerAttached`, returning the receiver of its
    /// effects.
    ///
    /// The effects channel is unbounded so that handling an event never waits
    /// on a consumer. Nothing is dropped while the receiver is alive: a holder
    /// that stops draining it keeps every effect in memory. Dropping the
    /// receiver is fine; effects are then discarded.
    pub fn new(
        gateway: Arc<G>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEffect>) {
        let (effects, effects_rx) = mpsc::unbounded_channel();
        let machine = StateMachine::new();
        let status = machine.current_state().status_text().to_string();

        let session = Self {
            gateway,
            config,
            machine,
            effects,
            active_device: None,
            product_id: None,
            device_class: DeviceClass::Standard,
            capture_modes: Vec::new(),
            selected_mode: None,
            active_capture: None,
            last_image: None,
            device_count: 0,
            description: NO_DEVICE_DESCRIPTION.to_string(),
            status,
            frame_time: FRAME_TIME_DEFAULT.to_string(),
            finger_qualities: vec![QualityIndicator::EMPTY; FINGER_QUALITIES_COUNT],
            stop_loop: None,
            awaited_tick: None,
            next_tick: 0,
            pending: VecDeque::new(),
            settling: false,
        };
        (session, effects_rx)
    }

    /// Current state.
    pub fn state(&self) -> AppState {
        *self.machine.current_state()
    }

    /// The gateway this session drives.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Recent applied transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.machine.history().iter().cloned().collect()
    }

    /// The last captured image, if any.
    pub fn last_image(&self) -> Option<&CapturedImage> {
        self.last_image.as_ref()
    }

    /// Whether the session is waiting for a [`Directive::Settle`] to elapse.
    pub fn is_settling(&self) -> bool {
        self.settling
    }

    /// A sender for publishing effects from background workers.
    pub fn effect_sender(&self) -> mpsc::UnboundedSender<SessionEffect> {
        self.effects.clone()
    }

    /// Read-only view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            status: self.status.clone(),
            description: self.description.clone(),
            device_count: self.device_count,
            active_device: self.active_device,
            product_id: self.product_id.clone(),
            device_class: self.device_class,
            capture_modes: self.capture_modes.clone(),
            selected_mode: self.selected_mode,
            active_capture: self.active_capture,
            frame_time: self.frame_time.clone(),
            finger_qualities: self.finger_qualities.clone(),
            last_image_type: self.last_image.as_ref().map(|last| last.image_type),
        }
    }

    /// Process one event to completion.
    ///
    /// If a previous [`Directive::Settle`] was not honoured with
    /// [`resume`](Self::resume), the deferred work runs first.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Directive> {
        let mut directives = Vec::new();
        if self.settling {
            self.settling = false;
            self.drain(&mut directives);
        }

        match event {
            SessionEvent::Command(command) => self.on_command(command, &mut directives),
            SessionEvent::Gateway(event) => self.on_gateway_event(event),
            SessionEvent::StopCaptureTick(tick) => self.on_stop_tick(tick),
        }

        self.drain(&mut directives);
        directives
    }

    /// Continue after a [`Directive::Settle`] delay.
    pub fn resume(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        self.settling = false;
        self.drain(&mut directives);
        directives
    }

    /// Best-effort teardown: cancel any running capture and close the device.
    ///
    /// Failures are logged and swallowed.
    pub fn shutdown(&mut self) {
        self.pending.clear();
        self.settling = false;
        self.awaited_tick = None;

        if let Some(device) = self.active_device.take() {
            info!("Tearing down session, releasing {}", device);
            self.release_device(device);
        }
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    fn on_command(&mut self, command: UserCommand, directives: &mut Vec<Directive>) {
        debug!("Command {:?} in {}", command, self.state());

        match command {
            UserCommand::Refresh => self.request(Request::Refresh),
            UserCommand::Open => self.request(Request::Initializing),
            UserCommand::StartCapture(mode) => {
                if let Some(mode) = mode
                    && self.state().can_transition_to(&AppState::StartingCapture)
                {
                    match self.capture_modes.iter().position(|offered| *offered == mode) {
                        Some(index) => self.select_mode(index),
                        None => {
                            warn!("Capture mode {} is not offered by this scanner", mode);
                            self.notice(format!("Capture mode {} is not available", mode));
                            return;
                        }
                    }
                }
                self.request(Request::StartingCapture);
            }
            UserCommand::StopCapture => self.request(Request::StoppingCapture),
            UserCommand::Close => self.request(Request::Closing),
            UserCommand::SelectCaptureMode(index) => {
                if index < self.capture_modes.len() {
                    self.select_mode(index);
                } else {
                    let error = Error::CaptureModeOutOfRange {
                        index,
                        available: self.capture_modes.len(),
                    };
                    warn!("{}", error);
                    self.notice(error.to_string());
                }
            }
            UserCommand::ExportLastImage(file_name) => match &self.last_image {
                Some(last) => {
                    let file_name =
                        file_name.unwrap_or_else(|| self.config.export_file_name.clone());
                    directives.push(Directive::Export {
                        image: last.image.clone(),
                        file_name,
                    });
                }
                None => {
                    debug!("{}", Error::NoCapturedImage);
                    self.notice("No last image information");
                }
            },
        }
    }

    fn on_gateway_event(&mut self, event: GatewayEvent) {
        debug!("Gateway {} in {}", event.kind(), self.state());

        if let Some(device) = event.device()
            && self.active_device != Some(device)
        {
            debug!("Dropping {} from {}, which is not open", event.kind(), device);
            return;
        }

        match event {
            GatewayEvent::DeviceAttached { device_id } => {
                self.notice(format!("Device {} attached", device_id));
                if !self.gateway.has_permission(device_id) {
                    self.gateway.request_permission(device_id);
                }
            }
            GatewayEvent::DeviceDetached { device_id } => {
                self.notice(format!("Device {} detached", device_id));
            }
            GatewayEvent::PermissionGranted { device_id } => {
                self.notice(format!("Permission granted to device {}", device_id));
            }
            GatewayEvent::PermissionDenied { device_id } => {
                self.notice(format!("Permission denied to device {}", device_id));
            }
            GatewayEvent::DeviceCountChanged { count } => {
                let (verb, plural) = if count == 1 { ("is", "") } else { ("are", "s") };
                self.notice(format!(
                    "There {} now {} accessible device{}",
                    verb, count, plural
                ));
                self.request(Request::Refresh);
            }
            GatewayEvent::InitProgress { percent, .. } => {
                self.set_status(format!("init {}%", percent));
            }
            GatewayEvent::OpenCompleted { index, result }
                if self.state() != AppState::Initializing =>
            {
                match result {
                    Ok(device) => {
                        warn!("Closing {} opened after its session moved on", device);
                        self.release_device(device);
                    }
                    Err(e) => debug!("Ignoring failed open of device {}: {}", index, e),
                }
            }
            GatewayEvent::OpenCompleted { index, result } => match result {
                Ok(device) => {
                    self.notice(format!("Device {} is now initialized", index));
                    self.request(Request::Initialized(Some(device)));
                }
                Err(e) => {
                    self.notice(format!(
                        "Device {} could not be initialized with error {}",
                        index, e
                    ));
                    self.request(Request::Closing);
                }
            },
            GatewayEvent::CommunicationBroken { device } => {
                warn!("Communication break with {}", device);
                self.notice("Communication break with device");
                self.request(Request::CommunicationBreak);
            }
            GatewayEvent::FingerCountChanged { state, .. } => self.on_finger_count(state),
            GatewayEvent::FingerQualityChanged { qualities, .. } => {
                self.finger_qualities = quality_indicators(&qualities, FINGER_QUALITIES_COUNT);
                self.emit(SessionEffect::FingerQualities(self.finger_qualities.clone()));
            }
            GatewayEvent::PreviewAvailable { image, .. } => {
                self.set_frame_time(format!("{:.3}", image.frame_time()));
                self.emit(SessionEffect::Preview(image));
            }
            GatewayEvent::AcquisitionBegun { image_type, .. } => {
                if image_type.is_roll() {
                    self.notice("Beginning acquisition...roll finger left");
                }
            }
            GatewayEvent::AcquisitionCompleted { image_type, .. } => {
                if image_type.is_roll() {
                    self.notice("Completed acquisition...roll finger right");
                } else {
                    self.emit(SessionEffect::Beep);
                }
            }
            GatewayEvent::ResultAvailable {
                image,
                image_type,
                status,
                ..
            } => {
                match status {
                    Some(e) => {
                        warn!("Image capture ended with error: {}", e);
                        self.notice(format!("Image capture ended with error: {}", e));
                    }
                    None => self.notice("Image result available"),
                }
                self.request(Request::ImageCaptured { image, image_type });
            }
            GatewayEvent::PlatenStateChanged { state, .. } => {
                let text = match state {
                    PlatenState::Clear => "Platen is clear",
                    PlatenState::HasFingers => "Fingers detected on platen",
                };
                self.notice(text);
            }
            GatewayEvent::Warning { message } => {
                warn!("Scanner warning: {}", message);
                self.notice(format!("Warning received {}", message));
            }
        }
    }

    fn on_finger_count(&mut self, state: FingerCountState) {
        if let Some(hand) = self.active_capture.and_then(|mode| mode.hand()) {
            if state != FingerCountState::NonFinger {
                self.set_leds(hand_pattern(SignalColor::Both, true, hand));
            }
            return;
        }

        let text = match state {
            FingerCountState::Ok => "capturing",
            FingerCountState::TooManyFingers => "too many fingers",
            FingerCountState::TooFewFingers => "too few fingers",
            FingerCountState::NonFinger => "non-finger",
        };
        self.set_status(text);
    }

    fn on_stop_tick(&mut self, tick: u64) {
        if self.awaited_tick == Some(tick) {
            self.awaited_tick = None;
            self.request(Request::StoppingCapture);
        } else {
            debug!("Ignoring stale stop-capture tick {}", tick);
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn request(&mut self, request: Request) {
        self.pending.push_back(request);
    }

    fn drain(&mut self, directives: &mut Vec<Directive>) {
        while !self.settling
            && let Some(request) = self.pending.pop_front()
        {
            self.apply(request, directives);
        }
    }

    fn apply(&mut self, request: Request, directives: &mut Vec<Directive>) {
        let from = self.state();
        let to = request.target();

        if to == AppState::Refresh && !from.can_transition_to(&to) {
            self.refuse_refresh(from);
            return;
        }

        let time_in_state = self.machine.time_in_current_state();
        match self.machine.transition_to(to) {
            Ok(transition) => {
                if transition.is_reentry() {
                    debug!("Session re-entered {} after {:?}", to, time_in_state);
                } else {
                    info!("Session {} -> {}", from, to);
                }
                self.emit(SessionEffect::StateChanged { from, to });
                self.set_status(to.status_text());
                self.set_frame_time(FRAME_TIME_DEFAULT);
            }
            Err(e) => {
                warn!("Rejected: {} after {:?} in {}", e, time_in_state, from);
                debug!("{} is only entered from {:?}", to, to.allowed_sources());
                self.emit(SessionEffect::Rejected { from, to });
                return;
            }
        }

        match request {
            Request::NoScannerAttached => self.enter_no_scanner_attached(),
            Request::ScannerAttached { description, count } => {
                self.set_device_count(count);
                self.set_description(description);
            }
            Request::Refresh => self.enter_refresh(),
            Request::Initializing => self.enter_initializing(),
            Request::Initialized(device) => self.enter_initialized(device),
            Request::Closing => self.enter_closing(),
            Request::StartingCapture => self.enter_starting_capture(),
            Request::Capturing => self.notice(CAPTURING_NOTICE),
            Request::StoppingCapture => self.enter_stopping_capture(from, directives),
            Request::ImageCaptured { image, image_type } => {
                self.enter_image_captured(image, image_type, directives)
            }
            Request::CommunicationBreak => self.request(Request::Closing),
        }
    }

    /// Handle a refresh requested from a state that cannot enter `Refresh`.
    ///
    /// From `Initialized` the open device is probed, and a dead device
    /// routes through `Closing`, which refreshes on its own.
    fn refuse_refresh(&mut self, from: AppState) {
        if from == AppState::Initialized
            && let Some(device) = self.active_device
            && let Err(e) = self.gateway.is_capture_active(device)
        {
            info!("Open device {} no longer answers ({}), closing", device, e);
            self.request(Request::Closing);
            return;
        }

        if from == AppState::Initialized {
            warn!("Rejected refresh while {} is open and responsive", from);
        } else {
            debug!("Ignoring refresh in {}", from);
        }
        self.emit(SessionEffect::Rejected {
            from,
            to: AppState::Refresh,
        });
    }

    fn enter_no_scanner_attached(&mut self) {
        self.set_device_count(0);
        self.set_description(NO_DEVICE_DESCRIPTION);
    }

    fn enter_refresh(&mut self) {
        self.set_capture_modes(Vec::new(), None);

        for device_id in self.gateway.unpermitted_scan_devices() {
            if !self.gateway.has_permission(device_id) {
                debug!("Requesting permission for device {}", device_id);
                self.gateway.request_permission(device_id);
            }
        }

        let next = match self.gateway.device_count() {
            Ok(0) => Request::NoScannerAttached,
            Ok(count) => match self.gateway.device_description(self.config.device_index) {
                Ok(descriptor) => Request::ScannerAttached {
                    description: descriptor.label(),
                    count,
                },
                Err(e) => {
                    error!("Received error getting device description: {}", e);
                    Request::NoScannerAttached
                }
            },
            Err(e) => {
                error!("Received error getting device count: {}", e);
                Request::NoScannerAttached
            }
        };
        self.request(next);
    }

    fn enter_initializing(&mut self) {
        self.last_image = None;
        self.reset_device_identity();

        if let Err(e) = self.gateway.open_async(self.config.device_index) {
            error!("Could not start opening device: {}", e);
            self.notice(format!("Could not initialize device with error {}", e));
            self.request(Request::Closing);
        }
    }

    fn enter_initialized(&mut self, device: Option<DeviceHandle>) {
        self.reset_mode_selection();

        let Some(device) = device else {
            return;
        };
        self.active_device = Some(device);

        if let Err(e) = self
            .gateway
            .set_property(device, PropertyId::EnablePowerSaveMode, "TRUE")
        {
            warn!("Could not enable power save mode on {}: {}", device, e);
        }

        self.product_id = match self.gateway.get_property(device, PropertyId::ProductId) {
            Ok(product_id) => Some(product_id),
            Err(e) => {
                warn!("Could not read product id of {}: {}", device, e);
                None
            }
        };

        let resolved = resolve_capabilities(
            self.gateway.as_ref(),
            device,
            self.product_id.as_deref(),
            &self.config,
        );
        self.device_class = resolved.device_class;
        self.set_capture_modes(resolved.modes, resolved.default_selection);
    }

    fn enter_closing(&mut self) {
        if let Some(device) = self.active_device.take() {
            self.release_device(device);
        }
        self.reset_mode_selection();
        self.reset_device_identity();
        self.request(Request::Refresh);
    }

    fn enter_starting_capture(&mut self) {
        let Some(device) = self.active_device else {
            warn!("{}", Error::NoActiveDevice);
            self.notice("No device is open");
            self.request(Request::Initialized(None));
            return;
        };
        let Some(mode) = self
            .selected_mode
            .and_then(|index| self.capture_modes.get(index).copied())
        else {
            warn!("No capture mode selected on {}", device);
            self.notice("No capture mode selected");
            self.request(Request::Initialized(None));
            return;
        };

        if let Some(hand) = mode.hand() {
            self.set_leds(hand_pattern(SignalColor::Red, false, hand));
        } else if self.device_class == DeviceClass::SplitFourFinger && mode.is_roll() {
            self.set_leds(LedPattern::PROGRESS_ROLL);
        }

        let result = self.gateway.begin_capture(
            device,
            mode.image_type(),
            ImageResolution::ppi(TARGET_RESOLUTION_PPI),
            CaptureOptions::automatic(),
        );
        match result {
            Ok(()) => {
                debug!("Began capture of {} on {}", mode, device);
                self.active_capture = Some(mode);
                self.request(Request::Capturing);
            }
            Err(e) => {
                error!("Could not begin capturing on {}: {}", device, e);
                self.notice(format!("Could not begin capturing with error {}", e));
                self.request(Request::Initialized(None));
            }
        }
    }

    fn enter_stopping_capture(&mut self, from: AppState, directives: &mut Vec<Directive>) {
        self.awaited_tick = None;
        let Some(device) = self.active_device else {
            self.request(Request::Initialized(None));
            return;
        };

        let interval = self.config.stop_retry_interval();
        if from != AppState::StoppingCapture || self.stop_loop.is_none() {
            self.stop_loop = Some(StopCaptureLoop::new(interval));
        }
        let poll = match self.stop_loop.as_mut() {
            Some(stop_loop) => stop_loop.poll(self.gateway.as_ref(), device),
            None => StopPoll::Stopped(StopReason::NotActive),
        };

        match poll {
            StopPoll::Retry(delay) => {
                let tick = self.next_tick;
                self.next_tick += 1;
                self.awaited_tick = Some(tick);
                directives.push(Directive::ScheduleStopTick { delay, tick });
            }
            StopPoll::Stopped(reason) => {
                match reason {
                    StopReason::NotActive => self.notice("Capture stopped"),
                    StopReason::CancelFailed(e) => {
                        self.notice(format!("Could not cancel capturing with error {}", e))
                    }
                    StopReason::ProbeFailed(e) => {
                        self.notice(format!("Could not query capture active state {}", e))
                    }
                }
                self.request(Request::Initialized(None));
            }
        }
    }

    fn enter_image_captured(
        &mut self,
        image: ImageData,
        image_type: ImageType,
        directives: &mut Vec<Directive>,
    ) {
        self.last_image = Some(CapturedImage {
            image: image.clone(),
            image_type,
        });
        self.emit(SessionEffect::ImageAvailable {
            image: image.clone(),
            image_type,
        });

        if let Some(hand) = self.active_capture.and_then(|mode| mode.hand()) {
            self.set_leds(hand_pattern(SignalColor::Green, false, hand));
            directives.push(Directive::Settle(self.config.split_settle_delay()));
            self.settling = true;
        }

        if let Some(device) = self.active_device {
            directives.push(Directive::ComputeQuality { device, image });
        }

        self.request(Request::Initialized(None));
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Clear everything tied to the current capture mode.
    fn reset_mode_selection(&mut self) {
        if self.device_class == DeviceClass::SplitFourFinger && self.active_device.is_some() {
            self.set_leds(LedPattern::NONE);
        }
        self.active_capture = None;
        self.stop_loop = None;
        self.awaited_tick = None;
        if self.finger_qualities.iter().any(|q| *q != QualityIndicator::EMPTY) {
            self.finger_qualities = vec![QualityIndicator::EMPTY; FINGER_QUALITIES_COUNT];
            self.emit(SessionEffect::FingerQualities(self.finger_qualities.clone()));
        }
    }

    fn reset_device_identity(&mut self) {
        self.device_class = DeviceClass::Standard;
        self.product_id = None;
    }

    /// Cancel if active, then close, logging and swallowing failures.
    fn release_device(&self, device: DeviceHandle) {
        match self.gateway.is_capture_active(device) {
            Ok(true) => {
                if let Err(e) = self.gateway.cancel_capture(device) {
                    warn!("Could not cancel capture on {}: {}", device, e);
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Could not query capture state on {}: {}", device, e),
        }
        if let Err(e) = self.gateway.close(device) {
            warn!("Could not close {}: {}", device, e);
        }
    }

    fn set_leds(&self, pattern: LedPattern) {
        if let Some(device) = self.active_device
            && let Err(e) = self.gateway.set_leds(device, pattern)
        {
            warn!("Could not set LEDs {} on {}: {}", pattern, device, e);
        }
    }

    fn select_mode(&mut self, index: usize) {
        if self.selected_mode != Some(index) {
            self.selected_mode = Some(index);
            self.emit(SessionEffect::CaptureModes {
                modes: self.capture_modes.clone(),
                selected: self.selected_mode,
            });
        }
    }

    fn set_capture_modes(&mut self, modes: Vec<CaptureMode>, selected: Option<usize>) {
        self.capture_modes = modes;
        self.selected_mode = selected;
        self.emit(SessionEffect::CaptureModes {
            modes: self.capture_modes.clone(),
            selected,
        });
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.emit(SessionEffect::Status(self.status.clone()));
    }

    fn set_frame_time(&mut self, frame_time: impl Into<String>) {
        let frame_time = frame_time.into();
        if self.frame_time != frame_time {
            self.frame_time = frame_time;
            self.emit(SessionEffect::FrameTime(self.frame_time.clone()));
        }
    }

    fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.emit(SessionEffect::Description(self.description.clone()));
    }

    fn set_device_count(&mut self, count: usize) {
        self.device_count = count;
        self.emit(SessionEffect::DeviceCount(count));
    }

    fn notice(&self, text: impl Into<String>) {
        self.emit(SessionEffect::Notice(text.into()));
    }

    fn emit(&self, effect: SessionEffect) {
        if self.effects.send(effect).is_err() {
            debug!("Effect receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fingerscan_hardware::mock::{
        GatewayCall, MockDevice, MockGateway, MockGatewayHandle, MockOperation,
    };
    use fingerscan_hardware::{GatewayError, GatewayEventSink, Hand};

    type Effects = mpsc::UnboundedReceiver<SessionEffect>;

    struct Fixture {
        session: Session<MockGateway>,
        handle: MockGatewayHandle,
        effects: Effects,
        callbacks: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Fixture {
        fn new(device: Option<MockDevice>) -> Self {
            let (gateway, handle) = MockGateway::new();
            let (tx, callbacks) = mpsc::unbounded_channel::<SessionEvent>();
            handle.connect(GatewayEventSink::from_sender(tx));
            if let Some(device) = device {
                handle.attach_silently(device);
            }
            let (session, effects) = Session::new(Arc::new(gateway), SessionConfig::default());
            Self {
                session,
                handle,
                effects,
                callbacks,
            }
        }

        fn send(&mut self, event: impl Into<SessionEvent>) -> Vec<Directive> {
            self.session.handle(event.into())
        }

        /// Feed queued gateway callbacks back into the session.
        fn pump(&mut self) -> Vec<Directive> {
            let mut directives = Vec::new();
            while let Ok(event) = self.callbacks.try_recv() {
                directives.extend(self.session.handle(event));
            }
            directives
        }

        fn drain_effects(&mut self) -> Vec<SessionEffect> {
            let mut effects = Vec::new();
            while let Ok(effect) = self.effects.try_recv() {
                effects.push(effect);
            }
            effects
        }

        fn open(&mut self) {
            self.send(UserCommand::Refresh);
            self.send(UserCommand::Open);
            self.pump();
            assert_eq!(self.session.state(), AppState::Initialized);
        }

        fn start(&mut self) {
            self.send(UserCommand::StartCapture(None));
            assert_eq!(self.session.state(), AppState::Capturing);
        }
    }

    fn notices(effects: &[SessionEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                SessionEffect::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_refresh_without_scanner() {
        let mut fx = Fixture::new(None);
        fx.send(UserCommand::Refresh);

        assert_eq!(fx.session.state(), AppState::NoScannerAttached);
        let snapshot = fx.session.snapshot();
        assert_eq!(snapshot.status, "no scanners");
        assert_eq!(snapshot.description, "(no scanner)");
    }

    #[test]
    fn test_refresh_with_scanner() {
        let mut fx = Fixture::new(Some(MockDevice::new("KOJAK", "0001")));
        fx.send(UserCommand::Refresh);

        let snapshot = fx.session.snapshot();
        assert_eq!(snapshot.state, AppState::ScannerAttached);
        assert_eq!(snapshot.status, "uninitialized");
        assert_eq!(snapshot.description, "KOJAK - 0001");
        assert_eq!(snapshot.device_count, 1);
    }

    #[test]
    fn test_refresh_description_failure() {
        let mut fx = Fixture::new(Some(MockDevice::new("KOJAK", "0001")));
        fx.handle.fail(
            MockOperation::DeviceDescription,
            GatewayError::communication("stall"),
        );
        fx.send(UserCommand::Refresh);
        assert_eq!(fx.session.state(), AppState::NoScannerAttached);
    }

    #[test]
    fn test_refresh_requests_missing_permissions() {
        let mut fx = Fixture::new(Some(
            MockDevice::new("KOJAK", "0001")
                .with_device_id(9)
                .without_permission(),
        ));
        fx.send(UserCommand::Refresh);
        assert!(fx.handle.calls().contains(&GatewayCall::RequestPermission(9)));
    }

    #[test]
    fn test_open_resolves_capabilities() {
        let mut fx = Fixture::new(Some(MockDevice::new("KOJAK", "0001").with_leds()));
        fx.open();

        let snapshot = fx.session.snapshot();
        assert!(snapshot.active_device.is_some());
        assert_eq!(snapshot.product_id.as_deref(), Some("KOJAK"));
        assert_eq!(snapshot.device_class, DeviceClass::SplitFourFinger);
        assert_eq!(snapshot.capture_modes.len(), 6);
        assert_eq!(snapshot.selected_mode, Some(1));
        assert_eq!(
            fx.handle.property(PropertyId::EnablePowerSaveMode).as_deref(),
            Some("TRUE")
        );
    }

    #[test]
    fn test_power_save_failure_is_not_fatal() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.handle.fail(
            MockOperation::SetProperty,
            GatewayError::unsupported("power save"),
        );
        fx.open();
        assert!(fx.session.snapshot().active_device.is_some());
    }

    #[test]
    fn test_open_start_failure_routes_to_closing() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.send(UserCommand::Refresh);
        fx.handle
            .fail(MockOperation::OpenAsync, GatewayError::initialization_failed("busy"));
        fx.drain_effects();

        fx.send(UserCommand::Open);

        assert_eq!(fx.session.state(), AppState::ScannerAttached);
        let effects = fx.drain_effects();
        assert!(notices(&effects).iter().any(|n| n.starts_with("Could not initialize device")));
        assert!(effects.contains(&SessionEffect::StateChanged {
            from: AppState::Closing,
            to: AppState::Refresh
        }));
    }

    #[test]
    fn test_open_completion_failure_routes_to_closing() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.handle.fail(
            MockOperation::OpenCompletion,
            GatewayError::initialization_failed("firmware"),
        );
        fx.send(UserCommand::Refresh);
        fx.send(UserCommand::Open);
        fx.pump();

        assert_eq!(fx.session.state(), AppState::ScannerAttached);
        assert!(fx.session.snapshot().active_device.is_none());
    }

    #[test]
    fn test_late_open_completion_is_closed() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.handle.set_auto_complete_open(false);
        fx.send(UserCommand::Refresh);
        fx.send(UserCommand::Open);
        fx.send(UserCommand::Close);
        assert_eq!(fx.session.state(), AppState::ScannerAttached);

        fx.handle.complete_open(0);
        fx.pump();

        assert_eq!(fx.session.state(), AppState::ScannerAttached);
        assert!(fx.handle.open_handle().is_none());
    }

    #[test]
    fn test_capture_standard_mode() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.drain_effects();
        fx.start();

        let begin = fx.handle.calls().into_iter().find_map(|call| match call {
            GatewayCall::BeginCapture {
                image_type,
                resolution,
                options,
                ..
            } => Some((image_type, resolution, options)),
            _ => None,
        });
        assert_eq!(
            begin,
            Some((
                ImageType::FlatSingleFinger,
                ImageResolution::ppi(500),
                CaptureOptions::automatic()
            ))
        );
        assert!(notices(&fx.drain_effects()).contains(&CAPTURING_NOTICE.to_string()));
    }

    #[test]
    fn test_begin_capture_failure_returns_to_initialized() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.handle
            .fail(MockOperation::BeginCapture, GatewayError::capture_failed("busy"));

        fx.send(UserCommand::StartCapture(None));

        assert_eq!(fx.session.state(), AppState::Initialized);
        assert!(fx.session.snapshot().active_device.is_some());
        assert!(fx.session.snapshot().active_capture.is_none());
    }

    #[test]
    fn test_start_with_unoffered_mode_is_refused() {
        let mut fx = Fixture::new(Some(
            MockDevice::new("WATSON MINI", "1").with_supported(&[ImageType::FlatSingleFinger]),
        ));
        fx.open();
        fx.send(UserCommand::StartCapture(Some(CaptureMode::SplitFour(Hand::Left))));
        assert_eq!(fx.session.state(), AppState::Initialized);
    }

    #[test]
    fn test_split_capture_drives_leds() {
        let mut fx = Fixture::new(Some(MockDevice::new("KOJAK", "1").with_leds()));
        fx.open();
        fx.send(UserCommand::StartCapture(Some(CaptureMode::SplitFour(Hand::Right))));
        assert_eq!(fx.session.state(), AppState::Capturing);

        fx.handle.report_finger_count(FingerCountState::TooFewFingers);
        fx.handle.complete_capture(
            ImageData::blank(8, 8),
            ImageType::FlatFourFingers,
            None,
        );
        let directives = fx.pump();

        assert_eq!(fx.session.state(), AppState::ImageCaptured);
        assert!(fx.session.is_settling());
        assert_eq!(directives[0], Directive::Settle(Duration::from_millis(100)));
        assert!(matches!(directives[1], Directive::ComputeQuality { .. }));

        fx.session.resume();
        assert_eq!(fx.session.state(), AppState::Initialized);

        let leds = fx.handle.led_history();
        assert_eq!(
            leds,
            vec![
                hand_pattern(SignalColor::Red, false, Hand::Right),
                hand_pattern(SignalColor::Both, true, Hand::Right),
                hand_pattern(SignalColor::Green, false, Hand::Right),
                LedPattern::NONE,
            ]
        );
        assert!(fx.session.snapshot().active_capture.is_none());
    }

    #[test]
    fn test_split_roll_lights_progress() {
        let mut fx = Fixture::new(Some(MockDevice::new("KOJAK", "1").with_leds()));
        fx.open();
        fx.send(UserCommand::StartCapture(Some(CaptureMode::Standard(
            ImageType::RollSingleFinger,
        ))));
        assert!(fx.handle.led_history().contains(&LedPattern::PROGRESS_ROLL));
    }

    #[test]
    fn test_finger_count_status_in_standard_mode() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.start();

        fx.handle.report_finger_count(FingerCountState::TooManyFingers);
        fx.pump();
        assert_eq!(fx.session.snapshot().status, "too many fingers");
    }

    #[test]
    fn test_result_with_status_still_captures() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.start();
        fx.drain_effects();

        fx.handle.complete_capture(
            ImageData::blank(4, 4),
            ImageType::FlatSingleFinger,
            Some(GatewayError::capture_failed("wet finger")),
        );
        let directives = fx.pump();

        assert_eq!(fx.session.state(), AppState::Initialized);
        assert_eq!(
            fx.session.last_image().map(|last| last.image_type),
            Some(ImageType::FlatSingleFinger)
        );
        assert!(matches!(directives[..], [Directive::ComputeQuality { .. }]));
        let effects = fx.drain_effects();
        assert!(effects.contains(&SessionEffect::Beep));
        assert!(
            notices(&effects)
                .iter()
                .any(|n| n == "Image capture ended with error: Capture error: wet finger")
        );
    }

    #[test]
    fn test_stop_schedules_ticks_until_inactive() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.start();
        fx.handle.script_capture_active([Ok(true), Ok(true), Ok(false)]);

        let directives = fx.send(UserCommand::StopCapture);
        let Some(Directive::ScheduleStopTick { delay, tick }) = directives.first().cloned() else {
            panic!("expected a stop tick, got {directives:?}");
        };
        assert_eq!(delay, Duration::from_millis(250));
        assert_eq!(fx.session.state(), AppState::StoppingCapture);

        let directives = fx.send(SessionEvent::StopCaptureTick(tick));
        let Some(Directive::ScheduleStopTick { tick, .. }) = directives.first().cloned() else {
            panic!("expected a second stop tick");
        };

        // A stale tick is ignored.
        fx.send(SessionEvent::StopCaptureTick(tick + 100));
        assert_eq!(fx.session.state(), AppState::StoppingCapture);

        let directives = fx.send(SessionEvent::StopCaptureTick(tick));
        assert!(directives.is_empty());
        assert_eq!(fx.session.state(), AppState::Initialized);
    }

    #[test]
    fn test_refresh_while_initialized_probes_device() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.drain_effects();

        fx.send(UserCommand::Refresh);
        assert_eq!(fx.session.state(), AppState::Initialized);
        assert!(fx.drain_effects().contains(&SessionEffect::Rejected {
            from: AppState::Initialized,
            to: AppState::Refresh
        }));

        fx.handle.script_capture_active([Err(GatewayError::disconnected("usb"))]);
        fx.send(UserCommand::Refresh);
        assert_eq!(fx.session.state(), AppState::ScannerAttached);
        assert!(fx.session.snapshot().active_device.is_none());
    }

    #[test]
    fn test_export_requires_image() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        let directives = fx.send(UserCommand::ExportLastImage(None));
        assert!(directives.is_empty());
        assert!(notices(&fx.drain_effects()).contains(&"No last image information".to_string()));

        fx.open();
        fx.start();
        fx.handle
            .complete_capture(ImageData::blank(4, 4), ImageType::FlatSingleFinger, None);
        fx.pump();

        let directives = fx.send(UserCommand::ExportLastImage(None));
        assert!(matches!(
            &directives[..],
            [Directive::Export { file_name, .. }] if file_name == "output"
        ));
    }

    #[test]
    fn test_history_records_applied_transitions_only() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.send(UserCommand::StartCapture(None));
        fx.open();

        let path: Vec<(AppState, AppState)> = fx
            .session
            .history()
            .iter()
            .map(|transition| (transition.from, transition.to))
            .collect();
        assert_eq!(
            path,
            vec![
                (AppState::NoScannerAttached, AppState::Refresh),
                (AppState::Refresh, AppState::ScannerAttached),
                (AppState::ScannerAttached, AppState::Initializing),
                (AppState::Initializing, AppState::Initialized),
            ]
        );
    }

    #[test]
    fn test_select_capture_mode() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();

        fx.send(UserCommand::SelectCaptureMode(0));
        assert_eq!(fx.session.snapshot().selected_mode, Some(0));

        fx.send(UserCommand::SelectCaptureMode(42));
        assert_eq!(fx.session.snapshot().selected_mode, Some(0));
    }

    #[test]
    fn test_shutdown_releases_device() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.start();
        fx.handle.fail(MockOperation::CancelCapture, GatewayError::timeout(10));

        fx.session.shutdown();

        assert!(fx.handle.open_handle().is_none());
        assert!(fx.session.snapshot().active_device.is_none());
    }

    #[test]
    fn test_preview_updates_frame_time() {
        let mut fx = Fixture::new(Some(MockDevice::new("WATSON MINI", "1")));
        fx.open();
        fx.start();
        let device = fx.handle.open_handle().unwrap();

        fx.send(GatewayEvent::PreviewAvailable {
            device,
            image: ImageData::blank(2, 2).with_frame_time(0.0426),
        });
        assert_eq!(fx.session.snapshot().frame_time, "0.043");

        fx.send(UserCommand::StopCapture);
        assert_eq!(fx.session.snapshot().frame_time, "n/a");
    }
}
