//! Integration tests for session flows driven synchronously.
//!
//! Callbacks emitted by the mock gateway are fed back into the session by the
//! harness, so each test observes the complete sequence of transitions a
//! single user action or scanner callback causes.

mod common;

use common::{Harness, entered_states, notices};

use fingerscan_core::SessionConfig;
use fingerscan_hardware::mock::{GatewayCall, MockDevice};
use fingerscan_hardware::{
    FingerQualityState, GatewayError, GatewayEvent, Hand, ImageData, ImageType, PropertyId,
};
use fingerscan_session::{
    AppState, CaptureMode, DeviceClass, Directive, QualityColor, QualityIndicator, SessionEffect,
    UserCommand,
};

#[test]
fn test_new_session_defaults() {
    let harness = Harness::new(SessionConfig::default());
    let snapshot = harness.session.snapshot();

    assert_eq!(snapshot.state, AppState::NoScannerAttached);
    assert_eq!(snapshot.status, "no scanners");
    assert_eq!(snapshot.description, "(no scanner)");
    assert_eq!(snapshot.frame_time, "n/a");
    assert_eq!(snapshot.finger_qualities, vec![QualityIndicator::EMPTY; 4]);
    assert!(snapshot.capture_modes.is_empty());
    assert!(snapshot.active_device.is_none());
}

#[test]
fn test_refresh_enumerates_once() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "0007"));

    harness.send(UserCommand::Refresh);

    let effects = harness.drain_effects();
    assert_eq!(
        entered_states(&effects),
        vec![AppState::Refresh, AppState::ScannerAttached]
    );
    assert_eq!(
        harness
            .mock
            .count_calls(|call| matches!(call, GatewayCall::DeviceCount)),
        1
    );
    assert!(effects.contains(&SessionEffect::DeviceCount(1)));
    assert!(effects.contains(&SessionEffect::Description("WATSON MINI - 0007".to_string())));
}

#[test]
fn test_refresh_without_devices() {
    let mut harness = Harness::new(SessionConfig::default());

    harness.send(UserCommand::Refresh);

    assert_eq!(
        entered_states(&harness.drain_effects()),
        vec![AppState::Refresh, AppState::NoScannerAttached]
    );
}

#[test]
fn test_hot_plug_refreshes() {
    let mut harness = Harness::new(SessionConfig::default());

    harness.mock.attach(MockDevice::new("KOJAK", "0001"));
    harness.pump();

    assert_eq!(harness.state(), AppState::ScannerAttached);
    let effects = harness.drain_effects();
    let notices = notices(&effects);
    assert!(notices.contains(&"Device 1 attached".to_string()));
    assert!(notices.contains(&"There is now 1 accessible device".to_string()));

    harness.mock.attach(MockDevice::new("KOJAK", "0002").with_device_id(2));
    harness.pump();
    assert!(
        notices_of(&mut harness).contains(&"There are now 2 accessible devices".to_string())
    );
}

fn notices_of(harness: &mut Harness) -> Vec<String> {
    notices(&harness.drain_effects())
}

#[test]
fn test_open_reports_progress_and_modes() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "0007"));
    harness.send(UserCommand::Refresh);
    harness.drain_effects();

    harness.send(UserCommand::Open);

    let effects = harness.drain_effects();
    assert_eq!(
        entered_states(&effects),
        vec![AppState::Initializing, AppState::Initialized]
    );
    assert!(effects.contains(&SessionEffect::Status("init 100%".to_string())));
    assert!(notices(&effects).contains(&"Device 0 is now initialized".to_string()));

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.device_class, DeviceClass::Standard);
    assert_eq!(snapshot.capture_modes.len(), ImageType::CANDIDATES.len());
    assert_eq!(
        snapshot.capture_modes[1],
        CaptureMode::Standard(ImageType::FlatSingleFinger)
    );
    assert_eq!(
        harness.mock.property(PropertyId::EnablePowerSaveMode).as_deref(),
        Some("TRUE")
    );
}

#[test]
fn test_split_product_offers_hand_modes() {
    let mut harness = Harness::with_device(MockDevice::new("KOJAK", "0001").with_leds());
    harness.open();

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.device_class, DeviceClass::SplitFourFinger);
    assert_eq!(
        &snapshot.capture_modes[4..],
        &[
            CaptureMode::SplitFour(Hand::Left),
            CaptureMode::SplitFour(Hand::Right)
        ]
    );
    assert!(
        !snapshot
            .capture_modes
            .contains(&CaptureMode::Standard(ImageType::FlatFourFingers))
    );
}

#[test]
fn test_split_product_with_few_types_stays_standard() {
    let mut harness = Harness::with_device(
        MockDevice::new("KOJAK", "0001")
            .with_supported(&[ImageType::FlatSingleFinger, ImageType::FlatFourFingers]),
    );
    harness.open();

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.device_class, DeviceClass::Standard);
    assert_eq!(snapshot.capture_modes.len(), 2);
}

#[test]
fn test_stop_when_probe_reports_inactive() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(None));
    harness.mock.clear_calls();
    harness.mock.script_capture_active([Ok(false)]);

    let directives = harness.send(UserCommand::StopCapture);

    assert!(directives.is_empty());
    assert_eq!(harness.state(), AppState::Initialized);
    assert_eq!(
        harness
            .mock
            .count_calls(|call| matches!(call, GatewayCall::IsCaptureActive(_))),
        1
    );
    assert_eq!(
        harness
            .mock
            .count_calls(|call| matches!(call, GatewayCall::CancelCapture(_))),
        0
    );
    assert!(notices_of(&mut harness).contains(&"Capture stopped".to_string()));
}

#[test]
fn test_communication_break_while_capturing() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(None));
    assert_eq!(harness.state(), AppState::Capturing);
    harness.drain_effects();

    let device = harness.mock.open_handle().unwrap();
    harness.mock.clear_calls();

    harness.mock.break_communication();
    harness.pump();

    let effects = harness.drain_effects();
    assert_eq!(
        entered_states(&effects),
        vec![
            AppState::CommunicationBreak,
            AppState::Closing,
            AppState::Refresh,
            AppState::ScannerAttached,
        ]
    );
    assert!(notices(&effects).contains(&"Communication break with device".to_string()));
    let snapshot = harness.session.snapshot();
    assert!(snapshot.active_device.is_none());
    assert!(snapshot.capture_modes.is_empty());
    assert!(snapshot.product_id.is_none());

    assert!(harness.mock.open_handle().is_none());
    let calls = harness.mock.calls();
    let closed = calls
        .iter()
        .position(|call| *call == GatewayCall::Close(device))
        .unwrap();
    let enumerated = calls
        .iter()
        .position(|call| *call == GatewayCall::DeviceCount)
        .unwrap();
    assert!(closed < enumerated);
}

#[test]
fn test_communication_break_cancels_and_closes_before_refresh() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(None));
    let device = harness.mock.open_handle().unwrap();
    harness.mock.clear_calls();

    // The driver reports the fault while the handle still answers.
    harness.mock.emit(GatewayEvent::CommunicationBroken { device });
    harness.pump();

    assert_eq!(harness.state(), AppState::ScannerAttached);
    assert!(harness.mock.open_handle().is_none());
    assert_eq!(
        &harness.mock.calls()[..4],
        &[
            GatewayCall::IsCaptureActive(device),
            GatewayCall::CancelCapture(device),
            GatewayCall::Close(device),
            GatewayCall::DeviceCount,
        ]
    );
}

#[test]
fn test_break_from_closed_handle_leaves_reopened_device_alone() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    let first = harness.mock.open_handle().unwrap();
    harness.send(UserCommand::Close);
    harness.send(UserCommand::Open);
    assert_eq!(harness.state(), AppState::Initialized);
    let second = harness.mock.open_handle().unwrap();
    assert_ne!(first, second);
    harness.drain_effects();

    harness.send(GatewayEvent::CommunicationBroken { device: first });
    harness.send(GatewayEvent::ResultAvailable {
        device: first,
        image: ImageData::blank(2, 2),
        image_type: ImageType::FlatSingleFinger,
        status: None,
    });

    assert_eq!(harness.state(), AppState::Initialized);
    assert_eq!(harness.mock.open_handle(), Some(second));
    assert_eq!(harness.session.snapshot().active_device, Some(second));
    assert!(harness.session.last_image().is_none());
    assert!(entered_states(&harness.drain_effects()).is_empty());
}

#[test]
fn test_open_failure_after_open_completed_is_ignored() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    let device = harness.mock.open_handle().unwrap();
    harness.drain_effects();

    harness.send(GatewayEvent::OpenCompleted {
        index: 0,
        result: Err(GatewayError::initialization_failed("late")),
    });

    assert_eq!(harness.state(), AppState::Initialized);
    assert_eq!(harness.mock.open_handle(), Some(device));
    assert!(harness.drain_effects().is_empty());
}

#[test]
fn test_unplugging_open_scanner_closes_it() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.drain_effects();

    harness.mock.detach(0);
    harness.pump();

    assert_eq!(
        entered_states(&harness.drain_effects()),
        vec![
            AppState::Closing,
            AppState::Refresh,
            AppState::NoScannerAttached
        ]
    );
    assert!(harness.session.snapshot().active_device.is_none());
}

#[test]
fn test_capture_reports_qualities_and_image() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(Some(CaptureMode::Standard(
        ImageType::FlatTwoFingers,
    ))));
    harness.drain_effects();

    harness.mock.report_finger_quality(vec![
        FingerQualityState::Good,
        FingerQualityState::InvalidAreaLeft,
    ]);
    harness
        .mock
        .complete_capture(ImageData::blank(32, 16), ImageType::FlatTwoFingers, None);
    let directives = harness.pump();

    let effects = harness.drain_effects();
    let qualities = effects.iter().find_map(|effect| match effect {
        SessionEffect::FingerQualities(indicators) => Some(indicators.clone()),
        _ => None,
    });
    let qualities = qualities.unwrap();
    assert_eq!(qualities[0].color, QualityColor::Green);
    assert_eq!(qualities[1].color, QualityColor::Red);
    assert_eq!(qualities[2], QualityIndicator::EMPTY);

    assert!(effects.iter().any(|effect| matches!(
        effect,
        SessionEffect::ImageAvailable { image_type: ImageType::FlatTwoFingers, .. }
    )));
    assert!(matches!(directives[..], [Directive::ComputeQuality { .. }]));

    // Qualities reset when the session returns to idle.
    assert_eq!(harness.state(), AppState::Initialized);
    assert_eq!(
        harness.session.snapshot().finger_qualities,
        vec![QualityIndicator::EMPTY; 4]
    );
}

#[test]
fn test_roll_capture_notices() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(Some(CaptureMode::Standard(
        ImageType::RollSingleFinger,
    ))));
    let device = harness.mock.open_handle().unwrap();
    harness.drain_effects();

    harness
        .mock
        .emit(fingerscan_hardware::GatewayEvent::AcquisitionBegun {
            device,
            image_type: ImageType::RollSingleFinger,
        });
    harness
        .mock
        .complete_capture(ImageData::blank(8, 8), ImageType::RollSingleFinger, None);
    harness.pump();

    let effects = harness.drain_effects();
    let notices = notices(&effects);
    assert!(notices.contains(&"Beginning acquisition...roll finger left".to_string()));
    assert!(notices.contains(&"Completed acquisition...roll finger right".to_string()));
    assert!(!effects.contains(&SessionEffect::Beep));
}

#[test]
fn test_commands_out_of_state_are_rejected() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.send(UserCommand::Refresh);
    harness.drain_effects();

    harness.send(UserCommand::StartCapture(None));
    harness.send(UserCommand::StopCapture);

    assert_eq!(harness.state(), AppState::ScannerAttached);
    assert_eq!(
        harness.drain_effects(),
        vec![
            SessionEffect::Rejected {
                from: AppState::ScannerAttached,
                to: AppState::StartingCapture
            },
            SessionEffect::Rejected {
                from: AppState::ScannerAttached,
                to: AppState::StoppingCapture
            },
        ]
    );
}

#[test]
fn test_reopen_after_close_clears_last_image() {
    let mut harness = Harness::with_device(MockDevice::new("WATSON MINI", "1"));
    harness.open();
    harness.send(UserCommand::StartCapture(None));
    harness
        .mock
        .complete_capture(ImageData::blank(4, 4), ImageType::FlatSingleFinger, None);
    harness.pump();
    assert!(harness.session.last_image().is_some());

    harness.send(UserCommand::Close);
    assert_eq!(harness.state(), AppState::ScannerAttached);
    assert!(harness.session.last_image().is_some());

    harness.send(UserCommand::Open);
    assert_eq!(harness.state(), AppState::Initialized);
    assert!(harness.session.last_image().is_none());
}
