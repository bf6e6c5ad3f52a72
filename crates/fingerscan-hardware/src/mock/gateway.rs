//! Mock scanner gateway for testing and development.
//!
//! This module provides a simulated scanner driver whose attached devices,
//! capabilities, liveness answers and failures can be scripted through a
//! [`MockGatewayHandle`], while every call made through the
//! [`ScanGateway`] trait is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{GatewayEvent, GatewayEventSink};
use crate::traits::ScanGateway;
use crate::types::{
    CaptureOptions, DeviceDescriptor, DeviceHandle, FingerCountState, FingerQualityState,
    ImageData, ImageResolution, ImageType, LedPattern, PropertyId,
};
use crate::{GatewayError, Result};

/// Quality score returned when none has been scripted.
const DEFAULT_QUALITY_SCORE: u8 = 2;

/// A simulated attached scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct MockDevice {
    /// USB device id.
    pub device_id: u32,

    /// Identity reported by `device_description`.
    pub descriptor: DeviceDescriptor,

    /// Value of [`PropertyId::ProductId`].
    pub product_id: String,

    /// Capture types this scanner can acquire.
    pub supported: Vec<ImageType>,

    /// Whether the platform has granted access.
    pub permitted: bool,

    /// Whether the device drives split four-finger LEDs.
    pub has_leds: bool,
}

impl MockDevice {
    /// Device supporting every capture type, with access already granted.
    pub fn new(product_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        let product_name = product_name.into();
        Self {
            device_id: 1,
            descriptor: DeviceDescriptor::new(product_name.clone(), serial_number),
            product_id: product_name,
            supported: ImageType::CANDIDATES.to_vec(),
            permitted: true,
            has_leds: false,
        }
    }

    /// Set the USB device id.
    pub fn with_device_id(mut self, device_id: u32) -> Self {
        self.device_id = device_id;
        self
    }

    /// Restrict the supported capture types.
    pub fn with_supported(mut self, supported: &[ImageType]) -> Self {
        self.supported = supported.to_vec();
        self
    }

    /// Mark the device as not yet granted access.
    pub fn without_permission(mut self) -> Self {
        self.permitted = false;
        self
    }

    /// Give the device controllable LEDs.
    pub fn with_leds(mut self) -> Self {
        self.has_leds = true;
        self
    }
}

/// Gateway operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    DeviceCount,
    DeviceDescription,
    OpenAsync,
    OpenCompletion,
    Close,
    IsCaptureActive,
    CancelCapture,
    BeginCapture,
    GetProperty,
    SetProperty,
    IsCaptureAvailable,
    ComputeQualityScore,
    SetLeds,
}

/// A call recorded by the mock gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    DeviceCount,
    DeviceDescription(usize),
    RequestPermission(u32),
    OpenAsync(usize),
    Close(DeviceHandle),
    IsCaptureActive(DeviceHandle),
    CancelCapture(DeviceHandle),
    BeginCapture {
        device: DeviceHandle,
        image_type: ImageType,
        resolution: ImageResolution,
        options: CaptureOptions,
    },
    GetProperty(PropertyId),
    SetProperty(PropertyId, String),
    IsCaptureAvailable(ImageType),
    ComputeQualityScore(DeviceHandle),
    SetLeds(LedPattern),
}

#[derive(Debug)]
struct OpenDevice {
    handle: DeviceHandle,
    index: usize,
    properties: HashMap<PropertyId, String>,
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    open: Option<OpenDevice>,
    next_handle: u32,
    sink: Option<GatewayEventSink>,
    auto_complete_open: bool,
    capture_active: bool,
    active_script: VecDeque<Result<bool>>,
    failures: HashMap<MockOperation, GatewayError>,
    calls: Vec<GatewayCall>,
    quality_score: Option<u8>,
}

impl MockState {
    fn check(&self, operation: MockOperation) -> Result<()> {
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn open_device(&self, device: DeviceHandle) -> Result<&OpenDevice> {
        self.open
            .as_ref()
            .filter(|open| open.handle == device)
            .ok_or_else(|| GatewayError::disconnected(device.to_string()))
    }

    fn open_descriptor(&self, device: DeviceHandle) -> Result<&MockDevice> {
        let index = self.open_device(device)?.index;
        self.devices
            .get(index)
            .ok_or_else(|| GatewayError::disconnected(device.to_string()))
    }
}

/// Mock scanner gateway for testing and development.
///
/// Returns a (gateway, handle) pair: the gateway is handed to the code under
/// test, the handle scripts devices and drives callbacks.
///
/// # Examples
///
/// ```
/// use fingerscan_hardware::mock::{MockDevice, MockGateway};
/// use fingerscan_hardware::{GatewayEvent, GatewayEventSink, ScanGateway};
///
/// let (gateway, handle) = MockGateway::new();
/// let (sink, mut events) = GatewayEventSink::channel();
/// handle.connect(sink);
/// handle.attach(MockDevice::new("KOJAK", "0001"));
///
/// assert_eq!(gateway.device_count().unwrap(), 1);
/// gateway.open_async(0).unwrap();
///
/// let mut opened = None;
/// while let Ok(event) = events.try_recv() {
///     if let GatewayEvent::OpenCompleted { result, .. } = event {
///         opened = result.ok();
///     }
/// }
/// assert!(opened.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    /// Create a mock gateway with no devices attached.
    ///
    /// Opens complete automatically through the connected sink.
    pub fn new() -> (Self, MockGatewayHandle) {
        let state = Arc::new(Mutex::new(MockState {
            next_handle: 1,
            auto_complete_open: true,
            ..MockState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockGatewayHandle { state },
        )
    }

    fn emit_all(&self, events: Vec<GatewayEvent>) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            for event in events {
                let _ = sink.emit(event);
            }
        }
    }
}

impl ScanGateway for MockGateway {
    fn device_count(&self) -> Result<usize> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::DeviceCount);
        state.check(MockOperation::DeviceCount)?;
        Ok(state.devices.len())
    }

    fn device_description(&self, index: usize) -> Result<DeviceDescriptor> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::DeviceDescription(index));
        state.check(MockOperation::DeviceDescription)?;
        state
            .devices
            .get(index)
            .map(|device| device.descriptor.clone())
            .ok_or_else(|| GatewayError::device_not_found(index))
    }

    fn has_permission(&self, device_id: u32) -> bool {
        self.state
            .lock()
            .devices
            .iter()
            .any(|device| device.device_id == device_id && device.permitted)
    }

    fn request_permission(&self, device_id: u32) {
        let granted = {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::RequestPermission(device_id));
            let mut granted = false;
            for device in state
                .devices
                .iter_mut()
                .filter(|device| device.device_id == device_id)
            {
                device.permitted = true;
                granted = true;
            }
            granted
        };
        let event = if granted {
            GatewayEvent::PermissionGranted { device_id }
        } else {
            GatewayEvent::PermissionDenied { device_id }
        };
        self.emit_all(vec![event]);
    }

    fn unpermitted_scan_devices(&self) -> Vec<u32> {
        self.state
            .lock()
            .devices
            .iter()
            .filter(|device| !device.permitted)
            .map(|device| device.device_id)
            .collect()
    }

    fn open_async(&self, index: usize) -> Result<()> {
        let events = {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::OpenAsync(index));
            state.check(MockOperation::OpenAsync)?;
            if index >= state.devices.len() {
                return Err(GatewayError::device_not_found(index));
            }
            if !state.auto_complete_open {
                return Ok(());
            }
            let result = complete_open(&mut state, index);
            vec![
                GatewayEvent::InitProgress {
                    index,
                    percent: 100,
                },
                GatewayEvent::OpenCompleted { index, result },
            ]
        };
        self.emit_all(events);
        Ok(())
    }

    fn close(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::Close(device));
        state.check(MockOperation::Close)?;
        state.open_device(device)?;
        state.open = None;
        state.capture_active = false;
        Ok(())
    }

    fn is_capture_active(&self, device: DeviceHandle) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::IsCaptureActive(device));
        state.check(MockOperation::IsCaptureActive)?;
        if let Some(answer) = state.active_script.pop_front() {
            return answer;
        }
        state.open_device(device)?;
        Ok(state.capture_active)
    }

    fn cancel_capture(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::CancelCapture(device));
        state.check(MockOperation::CancelCapture)?;
        state.open_device(device)?;
        Ok(())
    }

    fn begin_capture(
        &self,
        device: DeviceHandle,
        image_type: ImageType,
        resolution: ImageResolution,
        options: CaptureOptions,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::BeginCapture {
            device,
            image_type,
            resolution,
            options,
        });
        state.check(MockOperation::BeginCapture)?;
        if !state.open_descriptor(device)?.supported.contains(&image_type) {
            return Err(GatewayError::unsupported(format!("capture {image_type}")));
        }
        state.capture_active = true;
        Ok(())
    }

    fn get_property(&self, device: DeviceHandle, property: PropertyId) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetProperty(property));
        state.check(MockOperation::GetProperty)?;
        state
            .open_device(device)?
            .properties
            .get(&property)
            .cloned()
            .ok_or_else(|| GatewayError::unsupported(format!("property {property:?}")))
    }

    fn set_property(&self, device: DeviceHandle, property: PropertyId, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::SetProperty(property, value.to_string()));
        state.check(MockOperation::SetProperty)?;
        state.open_device(device)?;
        if let Some(open) = state.open.as_mut() {
            open.properties.insert(property, value.to_string());
        }
        Ok(())
    }

    fn is_capture_available(
        &self,
        device: DeviceHandle,
        image_type: ImageType,
        _resolution: ImageResolution,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::IsCaptureAvailable(image_type));
        state.check(MockOperation::IsCaptureAvailable)?;
        Ok(state.open_descriptor(device)?.supported.contains(&image_type))
    }

    fn compute_quality_score(&self, device: DeviceHandle, _image: &ImageData) -> Result<u8> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::ComputeQualityScore(device));
        state.check(MockOperation::ComputeQualityScore)?;
        Ok(state.quality_score.unwrap_or(DEFAULT_QUALITY_SCORE))
    }

    fn set_leds(&self, device: DeviceHandle, pattern: LedPattern) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::SetLeds(pattern));
        state.check(MockOperation::SetLeds)?;
        if !state.open_descriptor(device)?.has_leds {
            return Err(GatewayError::unsupported("set_leds"));
        }
        Ok(())
    }
}

fn complete_open(state: &mut MockState, index: usize) -> Result<DeviceHandle> {
    if let Some(error) = state.failures.get(&MockOperation::OpenCompletion) {
        return Err(error.clone());
    }
    let device = state
        .devices
        .get(index)
        .ok_or_else(|| GatewayError::device_not_found(index))?;

    let mut properties = HashMap::new();
    properties.insert(PropertyId::ProductId, device.product_id.clone());
    properties.insert(
        PropertyId::SerialNumber,
        device.descriptor.serial_number.clone(),
    );
    properties.insert(PropertyId::ImageWidth, "800".to_string());
    properties.insert(PropertyId::ImageHeight, "750".to_string());

    let handle = DeviceHandle::new(state.next_handle);
    state.next_handle += 1;
    state.capture_active = false;
    state.open = Some(OpenDevice {
        handle,
        index,
        properties,
    });
    Ok(handle)
}

/// Handle for scripting a [`MockGateway`].
///
/// # Examples
///
/// ```
/// use fingerscan_hardware::mock::{MockGateway, MockOperation};
/// use fingerscan_hardware::{GatewayError, ScanGateway};
///
/// let (gateway, handle) = MockGateway::new();
/// handle.fail(MockOperation::DeviceCount, GatewayError::communication("usb reset"));
/// assert!(gateway.device_count().is_err());
///
/// handle.clear_failure(MockOperation::DeviceCount);
/// assert_eq!(gateway.device_count().unwrap(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockGatewayHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockGatewayHandle {
    /// Route gateway callbacks into `sink`.
    pub fn connect(&self, sink: GatewayEventSink) {
        self.state.lock().sink = Some(sink);
    }

    /// Whether `open_async` completes immediately (the default) or waits for
    /// [`complete_open`](Self::complete_open).
    pub fn set_auto_complete_open(&self, enabled: bool) {
        self.state.lock().auto_complete_open = enabled;
    }

    /// Attach a device and announce the new device count.
    pub fn attach(&self, device: MockDevice) {
        let device_id = device.device_id;
        let count = {
            let mut state = self.state.lock();
            state.devices.push(device);
            state.devices.len()
        };
        self.emit(GatewayEvent::DeviceAttached { device_id });
        self.emit(GatewayEvent::DeviceCountChanged { count });
    }

    /// Attach a device without emitting any callback.
    pub fn attach_silently(&self, device: MockDevice) {
        self.state.lock().devices.push(device);
    }

    /// Detach the device at `index` and announce the new device count.
    ///
    /// If that device was open, its handle stops answering.
    pub fn detach(&self, index: usize) {
        let detached = {
            let mut state = self.state.lock();
            if index >= state.devices.len() {
                None
            } else {
                let device = state.devices.remove(index);
                if state.open.as_ref().is_some_and(|open| open.index == index) {
                    state.open = None;
                }
                Some((device.device_id, state.devices.len()))
            }
        };
        if let Some((device_id, count)) = detached {
            self.emit(GatewayEvent::DeviceDetached { device_id });
            self.emit(GatewayEvent::DeviceCountChanged { count });
        }
    }

    /// Finish a pending open for the device at `index`.
    pub fn complete_open(&self, index: usize) {
        let result = complete_open(&mut self.state.lock(), index);
        self.emit(GatewayEvent::OpenCompleted { index, result });
    }

    /// Make `operation` fail with `error` until cleared.
    pub fn fail(&self, operation: MockOperation, error: GatewayError) {
        self.state.lock().failures.insert(operation, error);
    }

    /// Stop failing `operation`.
    pub fn clear_failure(&self, operation: MockOperation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Queue answers for the next `is_capture_active` calls.
    ///
    /// Once the script runs out, the probe reports whether a capture was
    /// begun and not yet completed.
    pub fn script_capture_active<I>(&self, answers: I)
    where
        I: IntoIterator<Item = Result<bool>>,
    {
        self.state.lock().active_script.extend(answers);
    }

    /// Set the score returned by `compute_quality_score`.
    pub fn set_quality_score(&self, score: u8) {
        self.state.lock().quality_score = Some(score);
    }

    /// Handle of the currently open device, if any.
    pub fn open_handle(&self) -> Option<DeviceHandle> {
        self.state.lock().open.as_ref().map(|open| open.handle)
    }

    /// Whether an acquisition is running.
    pub fn capture_active(&self) -> bool {
        self.state.lock().capture_active
    }

    /// Value last written to (or preset for) a property of the open device.
    pub fn property(&self, property: PropertyId) -> Option<String> {
        self.state
            .lock()
            .open
            .as_ref()
            .and_then(|open| open.properties.get(&property).cloned())
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| predicate(*call))
            .count()
    }

    /// LED patterns set so far, oldest first.
    pub fn led_history(&self) -> Vec<LedPattern> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::SetLeds(pattern) => Some(*pattern),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Deliver the final image of the running acquisition.
    pub fn complete_capture(
        &self,
        image: ImageData,
        image_type: ImageType,
        status: Option<GatewayError>,
    ) {
        let device = {
            let mut state = self.state.lock();
            state.capture_active = false;
            state.open.as_ref().map(|open| open.handle)
        };
        if let Some(device) = device {
            self.emit(GatewayEvent::AcquisitionCompleted { device, image_type });
            self.emit(GatewayEvent::ResultAvailable {
                device,
                image,
                image_type,
                status,
            });
        }
    }

    /// Report a finger-count change on the open device.
    pub fn report_finger_count(&self, state: FingerCountState) {
        if let Some(device) = self.open_handle() {
            self.emit(GatewayEvent::FingerCountChanged { device, state });
        }
    }

    /// Report per-finger qualities on the open device.
    pub fn report_finger_quality(&self, qualities: Vec<FingerQualityState>) {
        if let Some(device) = self.open_handle() {
            self.emit(GatewayEvent::FingerQualityChanged { device, qualities });
        }
    }

    /// Break the link to the open device: its handle stops answering and a
    /// communication-broken callback fires.
    pub fn break_communication(&self) {
        let device = {
            let mut state = self.state.lock();
            state.capture_active = false;
            state.open.take().map(|open| open.handle)
        };
        if let Some(device) = device {
            self.emit(GatewayEvent::CommunicationBroken { device });
        }
    }

    /// Deliver an arbitrary callback through the connected sink.
    pub fn emit(&self, event: GatewayEvent) {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                let _ = sink.emit(event);
            }
            None => tracing::debug!("Mock gateway has no sink, dropping {}", event.kind()),
        }
    }
}
