use glam::{EulerRot, Quat, Vec3};
use simplecontroller::config::{SettingsStore, KEY_SERIAL_NUMBER, LEFT_SETTINGS_SECTION};
use simplecontroller::device::{HapticResponder, InputComponent};
use simplecontroller::host::{
    ControllerRole, DeviceClass, DeviceIndex, HapticVibration, HmdMatrix34,
    PropertyContainerHandle, TrackedProperty, VrEvent,
};
use simplecontroller::provider::{DeviceProvider, RoutedEvents};
use simplecontroller::sim::SimulatedHost;
use simplecontroller::{
    hmd_driver_factory, InitError, ServerTrackedDeviceProvider,
    SERVER_TRACKED_DEVICE_PROVIDER_VERSION,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const LEFT: DeviceIndex = DeviceIndex(1);
const RIGHT: DeviceIndex = DeviceIndex(2);

#[derive(Default)]
struct RecordingHaptics {
    pulses: Mutex<Vec<(ControllerRole, f32)>>,
}

impl HapticResponder for RecordingHaptics {
    fn vibrate(&self, role: ControllerRole, vibration: &HapticVibration) {
        self.pulses
            .lock()
            .unwrap()
            .push((role, vibration.frequency));
    }
}

#[test]
fn full_session_from_init_to_cleanup() {
    let host = SimulatedHost::with_defaults();
    let haptics = Arc::new(RecordingHaptics::default());
    let mut provider = DeviceProvider::with_haptics(haptics.clone());

    provider.init(host.context()).unwrap();

    let registered = host.registered();
    assert_eq!(registered.len(), 2);
    assert_eq!(registered[0].serial_number, "MYCONTROLLER_L");
    assert_eq!(registered[0].index, LEFT);
    assert_eq!(registered[1].serial_number, "MYCONTROLLER_R");
    assert_eq!(registered[1].index, RIGHT);
    assert!(registered.iter().all(|d| d.class == DeviceClass::Controller));

    for (index, result) in host.activate_registered() {
        assert!(result.is_ok(), "device {} failed to activate", index);
    }
    assert_eq!(host.int_property(LEFT, TrackedProperty::ControllerRoleHint), Some(1));
    assert_eq!(host.int_property(RIGHT, TrackedProperty::ControllerRoleHint), Some(2));

    // Frame with an empty queue only pushes inputs
    assert_eq!(provider.run_frame_routed(), RoutedEvents::default());
    assert_eq!(host.input_update_count(), 8);
    assert!(haptics.pulses.lock().unwrap().is_empty());

    // Haptic addressed to the right controller
    let haptic = host
        .component_handle(RIGHT, InputComponent::Haptic.path())
        .unwrap();
    host.push_event(VrEvent::HapticVibration(HapticVibration {
        container: PropertyContainerHandle::INVALID,
        component: haptic,
        duration_seconds: 0.1,
        frequency: 150.0,
        amplitude: 1.0,
    }));
    let routed = provider.run_frame_routed();
    assert_eq!(
        routed,
        RoutedEvents {
            polled: 1,
            consumed: 1
        }
    );
    assert_eq!(host.pending_events(), 0);
    assert_eq!(host.input_update_count(), 16);
    assert_eq!(
        *haptics.pulses.lock().unwrap(),
        vec![(ControllerRole::RightHand, 150.0)]
    );

    assert!(host.wait_for_poses(LEFT, 3, Duration::from_secs(1)));
    assert!(host.wait_for_poses(RIGHT, 3, Duration::from_secs(1)));
    assert_eq!(host.pose_submitters(LEFT), 1);
    assert_eq!(host.pose_submitters(RIGHT), 1);

    host.enter_standby_registered();
    let lines = host.log_lines();
    assert!(lines.contains(&"Left hand has been put on standby".to_string()));
    assert!(lines.contains(&"Right hand has been put on standby".to_string()));

    host.deactivate_registered();
    let left_settled = host.pose_count(LEFT);
    let right_settled = host.pose_count(RIGHT);
    thread::sleep(Duration::from_millis(25));
    assert_eq!(host.pose_count(LEFT), left_settled);
    assert_eq!(host.pose_count(RIGHT), right_settled);

    provider.cleanup();
    host.release_drivers();
    assert!(host.registered().is_empty());
}

#[test]
fn controllers_track_a_turning_headset() {
    let host = SimulatedHost::with_defaults();
    let mut provider = hmd_driver_factory(SERVER_TRACKED_DEVICE_PROVIDER_VERSION).unwrap();
    provider.init(host.context()).unwrap();

    let head = Vec3::new(0.0, 1.6, 0.0);
    let yaw = Quat::from_euler(EulerRot::YXZ, std::f32::consts::FRAC_PI_2, 0.0, 0.0);
    host.set_headset_pose(HmdMatrix34::from_rotation_translation(yaw, head));

    let right = host.driver(RIGHT).unwrap();
    let pose = right.pose();

    assert!(pose.pose_is_valid);
    assert!(pose
        .position
        .abs_diff_eq(head + Vec3::new(-0.5, 0.1, -0.15), 1e-4));

    provider.cleanup();
    host.release_drivers();
}

#[test]
fn configured_serial_numbers_are_registered() {
    let mut settings = SettingsStore::with_defaults();
    settings.set(LEFT_SETTINGS_SECTION, KEY_SERIAL_NUMBER, "LEFT-0042");
    let host = SimulatedHost::new(settings);
    let mut provider = hmd_driver_factory(SERVER_TRACKED_DEVICE_PROVIDER_VERSION).unwrap();

    provider.init(host.context()).unwrap();

    let serials: Vec<_> = host
        .registered()
        .into_iter()
        .map(|d| d.serial_number)
        .collect();
    assert_eq!(serials, vec!["LEFT-0042".to_string(), "MYCONTROLLER_R".to_string()]);

    provider.cleanup();
    host.release_drivers();
}

#[test]
fn refused_device_reports_driver_unknown() {
    let host = SimulatedHost::with_defaults();
    host.refuse_registration("MYCONTROLLER_L");
    let mut provider = hmd_driver_factory(SERVER_TRACKED_DEVICE_PROVIDER_VERSION).unwrap();

    let err = provider.init(host.context()).unwrap_err();

    assert_eq!(err.init_error(), InitError::DriverUnknown);
    assert_eq!(err.init_error().code(), 201);
    assert!(host.registered().is_empty());
    assert!(host
        .log_lines()
        .contains(&"Failed to create left controller device!".to_string()));
}
