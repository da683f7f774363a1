//! Controller lifecycle with statum state machine
//!
//! ```text
//! Constructed ──activate──► Activated ──deactivate──► Deactivated
//!      ▲            │
//!      └── failure ─┘
//! ```
//!
//! [`ControllerDevice`] carries the typestate; each state only exposes the
//! operations that make sense in it. The host, however, talks to devices
//! through `&self` calls on a shared trait object, possibly from several
//! threads, so [`ControllerDriver`] keeps the current state behind a mutex
//! and gates activation with an atomic flag.

use crate::config::{pose_update_interval, ControllerIdentity};
use crate::device::components::{InputComponent, InputHandles};
use crate::device::haptics::{HapticResponder, LogHaptics};
use crate::device::pose_task::PoseUpdateTask;
use crate::error::DriverError;
use crate::host::{
    ComponentHandle, ControllerRole, DeviceIndex, DriverContext, DriverPose,
    PropertyContainerHandle, TrackedDeviceDriver, TrackedProperty, VrEvent,
};
use crate::pose::synthesize_pose;
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Input profile the host uses for bindings and the binding UI.
pub const INPUT_PROFILE_PATH: &str = "{simplecontroller}/input/mycontroller_profile.json";

// Whether an event was meant for this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Consumed,
    Ignored,
}

#[state]
#[derive(Debug, Clone)]
pub enum DeviceState {
    Constructed, // Identity loaded, unknown to the host's input system
    Activated,   // Index assigned, inputs created, pose task running
    Deactivated, // Pose task joined, index released; terminal
}

#[machine]
pub struct ControllerDevice<S: DeviceState> {
    role: ControllerRole,
    identity: ControllerIdentity,
    context: DriverContext,
    device_index: DeviceIndex,
    input_handles: InputHandles,
    pose_task: Option<PoseUpdateTask>,
}

impl<S: DeviceState> ControllerDevice<S> {
    pub fn role(&self) -> ControllerRole {
        self.role
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    pub fn input_handles(&self) -> &InputHandles {
        &self.input_handles
    }
}

impl ControllerDevice<Constructed> {
    /// Reads the device identity from settings. Does not talk to the host
    /// registry; that happens when the provider registers the device.
    pub fn create(role: ControllerRole, context: DriverContext) -> Self {
        let identity = ControllerIdentity::load(context.settings.as_ref(), role);

        context.driver_log(format!(
            "My Controller Model Number: {}",
            identity.model_number
        ));
        context.driver_log(format!(
            "My Controller Serial Number: {}",
            identity.serial_number
        ));

        Self::new(
            role,
            identity,
            context,
            DeviceIndex::INVALID,
            InputHandles::default(),
            None,
        )
    }

    /// Writes model number, role hint and input profile into the device's
    /// property container.
    pub fn configure_properties(
        &self,
        index: DeviceIndex,
    ) -> Result<PropertyContainerHandle, DriverError> {
        let properties = self.context.properties.as_ref();
        let container = properties.tracked_device_to_property_container(index);
        debug!("{} controller {} uses {}", self.role, index, container);

        let role = self.role;
        let property_error = move |property| {
            move |source| DriverError::PropertyError {
                role,
                property,
                source,
            }
        };

        properties
            .set_string_property(
                container,
                TrackedProperty::ModelNumber,
                &self.identity.model_number,
            )
            .map_err(property_error(TrackedProperty::ModelNumber))?;
        properties
            .set_int32_property(
                container,
                TrackedProperty::ControllerRoleHint,
                self.role.hint(),
            )
            .map_err(property_error(TrackedProperty::ControllerRoleHint))?;
        properties
            .set_string_property(
                container,
                TrackedProperty::InputProfilePath,
                INPUT_PROFILE_PATH,
            )
            .map_err(property_error(TrackedProperty::InputProfilePath))?;

        Ok(container)
    }

    /// Creates the components still missing from an earlier attempt.
    pub fn create_inputs(
        &mut self,
        container: PropertyContainerHandle,
    ) -> Result<InputHandles, DriverError> {
        self.input_handles
            .create_missing(self.context.input.as_ref(), container, self.role)?;
        Ok(self.input_handles)
    }

    pub fn spawn_pose_task(
        &self,
        index: DeviceIndex,
        token: CancellationToken,
    ) -> Result<PoseUpdateTask, DriverError> {
        let interval = pose_update_interval(self.context.settings.as_ref());
        PoseUpdateTask::spawn(self.role, index, self.context.host.clone(), interval, token)
    }

    /// Takes ownership of the resources acquired during activation.
    pub fn activate(
        mut self,
        index: DeviceIndex,
        input_handles: InputHandles,
        pose_task: PoseUpdateTask,
    ) -> ControllerDevice<Activated> {
        info!("{} controller activated as {}", self.role, index);
        self.device_index = index;
        self.input_handles = input_handles;
        self.pose_task = Some(pose_task);
        self.transition()
    }
}

impl ControllerDevice<Activated> {
    pub fn run_frame(&self) {
        self.input_handles
            .push_idle_state(self.context.input.as_ref());
    }

    pub fn process_event(
        &self,
        event: &VrEvent,
        haptics: &dyn HapticResponder,
    ) -> EventDisposition {
        match event {
            VrEvent::HapticVibration(vibration)
                if vibration.component == self.input_handles.get(InputComponent::Haptic) =>
            {
                haptics.vibrate(self.role, vibration);
                EventDisposition::Consumed
            }
            _ => EventDisposition::Ignored,
        }
    }

    /// Stops the pose task and waits for it before releasing the index.
    pub fn deactivate(mut self) -> ControllerDevice<Deactivated> {
        info!("Deactivating {} controller {}", self.role, self.device_index);

        if let Some(task) = self.pose_task.take() {
            task.stop();
        }
        self.device_index = DeviceIndex::INVALID;

        self.transition()
    }
}

impl ControllerDevice<Deactivated> {}

enum Lifecycle {
    Constructed(ControllerDevice<Constructed>),
    Activated(ControllerDevice<Activated>),
    Deactivated(ControllerDevice<Deactivated>),
    // Only observable if a transition panicked
    Transitioning,
}

/// A controller as the host sees it.
///
/// All entry points take `&self` and may run concurrently with the pose
/// task. `is_active` is test-and-set on activation and test-and-clear on
/// deactivation, so a second `activate` can never start a second pose task.
/// Clearing the flag and cancelling `pose_shutdown` happen together, before
/// the lifecycle lock is taken.
pub struct ControllerDriver {
    role: ControllerRole,
    serial_number: String,
    context: DriverContext,
    haptics: Arc<dyn HapticResponder>,
    is_active: AtomicBool,
    pose_shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl ControllerDriver {
    pub fn new(role: ControllerRole, context: DriverContext) -> Self {
        Self::with_haptics(role, context, Arc::new(LogHaptics))
    }

    pub fn with_haptics(
        role: ControllerRole,
        context: DriverContext,
        haptics: Arc<dyn HapticResponder>,
    ) -> Self {
        let device = ControllerDevice::create(role, context.clone());
        Self {
            role,
            serial_number: device.identity().serial_number.clone(),
            context,
            haptics,
            is_active: AtomicBool::new(false),
            pose_shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Constructed(device)),
        }
    }

    pub fn role(&self) -> ControllerRole {
        self.role
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn model_number(&self) -> String {
        match &*self.lifecycle() {
            Lifecycle::Constructed(device) => device.identity().model_number.clone(),
            Lifecycle::Activated(device) => device.identity().model_number.clone(),
            Lifecycle::Deactivated(device) => device.identity().model_number.clone(),
            Lifecycle::Transitioning => String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn is_deactivated(&self) -> bool {
        matches!(&*self.lifecycle(), Lifecycle::Deactivated(_))
    }

    pub fn device_index(&self) -> DeviceIndex {
        match &*self.lifecycle() {
            Lifecycle::Activated(device) => device.device_index(),
            _ => DeviceIndex::INVALID,
        }
    }

    pub fn input_handle(&self, component: InputComponent) -> Option<ComponentHandle> {
        match &*self.lifecycle() {
            Lifecycle::Activated(device) => Some(device.input_handles().get(component)),
            _ => None,
        }
    }

    /// Per-frame input update, driven by the provider.
    pub fn run_frame(&self) {
        if let Lifecycle::Activated(device) = &*self.lifecycle() {
            device.run_frame();
        }
    }

    pub fn process_event(&self, event: &VrEvent) -> EventDisposition {
        match &*self.lifecycle() {
            Lifecycle::Activated(device) => device.process_event(event, self.haptics.as_ref()),
            _ => EventDisposition::Ignored,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn bring_up(
        &self,
        device: &mut ControllerDevice<Constructed>,
        index: DeviceIndex,
    ) -> Result<(InputHandles, PoseUpdateTask), DriverError> {
        let container = device.configure_properties(index)?;
        let handles = device.create_inputs(container)?;
        let task = device.spawn_pose_task(index, self.pose_shutdown.clone())?;
        Ok((handles, task))
    }
}

impl TrackedDeviceDriver for ControllerDriver {
    fn activate(&self, index: DeviceIndex) -> Result<(), DriverError> {
        if self
            .is_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("{} controller is already active, ignoring activate", self.role);
            return Err(DriverError::AlreadyActive(self.role));
        }

        let mut lifecycle = self.lifecycle();
        let mut device = match std::mem::replace(&mut *lifecycle, Lifecycle::Transitioning) {
            Lifecycle::Constructed(device) => device,
            Lifecycle::Deactivated(device) => {
                *lifecycle = Lifecycle::Deactivated(device);
                self.is_active.store(false, Ordering::SeqCst);
                warn!("{} controller cannot be reactivated", self.role);
                return Err(DriverError::Deactivated(self.role));
            }
            other => {
                *lifecycle = other;
                self.is_active.store(false, Ordering::SeqCst);
                return Err(DriverError::AlreadyActive(self.role));
            }
        };

        match self.bring_up(&mut device, index) {
            Ok((handles, task)) => {
                *lifecycle = Lifecycle::Activated(device.activate(index, handles, task));
                Ok(())
            }
            Err(e) => {
                error!("Failed to activate {} controller: {}", self.role, e);
                *lifecycle = Lifecycle::Constructed(device);
                self.is_active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn deactivate(&self) {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            debug!("{} controller is not active, nothing to deactivate", self.role);
            return;
        }
        self.pose_shutdown.cancel();

        let mut lifecycle = self.lifecycle();
        *lifecycle = match std::mem::replace(&mut *lifecycle, Lifecycle::Transitioning) {
            Lifecycle::Activated(device) => Lifecycle::Deactivated(device.deactivate()),
            other => other,
        };
    }

    fn enter_standby(&self) {
        self.context
            .driver_log(format!("{} hand has been put on standby", self.role.label()));
    }

    fn debug_request(&self, request: &str) -> String {
        debug!("{} controller ignoring debug request: {}", self.role, request);
        String::new()
    }

    fn pose(&self) -> DriverPose {
        let headset = self.context.host.headset_pose();
        synthesize_pose(&headset.device_to_absolute_tracking, self.role)
    }
}

impl Drop for ControllerDriver {
    fn drop(&mut self) {
        if self.is_active() {
            warn!(
                "{} controller dropped while active, stopping pose updates",
                self.role
            );
            self.deactivate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HapticVibration, HmdMatrix34, PropertyContainerHandle};
    use crate::sim::SimulatedHost;
    use glam::{Quat, Vec3};
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingHaptics {
        pulses: Mutex<Vec<(ControllerRole, HapticVibration)>>,
    }

    impl HapticResponder for RecordingHaptics {
        fn vibrate(&self, role: ControllerRole, vibration: &HapticVibration) {
            self.pulses.lock().unwrap().push((role, *vibration));
        }
    }

    fn haptic_event(component: ComponentHandle) -> VrEvent {
        VrEvent::HapticVibration(HapticVibration {
            container: PropertyContainerHandle::INVALID,
            component,
            duration_seconds: 0.05,
            frequency: 160.0,
            amplitude: 0.8,
        })
    }

    #[test]
    fn construction_reads_identity_without_touching_the_host() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());

        assert_eq!(driver.serial_number(), "MYCONTROLLER_L");
        assert_eq!(driver.model_number(), "MyController");
        assert!(!driver.is_active());
        assert_eq!(driver.device_index(), DeviceIndex::INVALID);
        assert!(host.registered().is_empty());
        assert!(host
            .log_lines()
            .iter()
            .any(|line| line == "My Controller Serial Number: MYCONTROLLER_L"));
    }

    #[test]
    fn activation_sets_properties_creates_inputs_and_submits_poses() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());
        let index = DeviceIndex(3);

        driver.activate(index).unwrap();

        assert!(driver.is_active());
        assert_eq!(driver.device_index(), index);
        assert_eq!(
            host.string_property(index, TrackedProperty::ModelNumber)
                .as_deref(),
            Some("MyController")
        );
        assert_eq!(
            host.int_property(index, TrackedProperty::ControllerRoleHint),
            Some(2)
        );
        assert_eq!(
            host.string_property(index, TrackedProperty::InputProfilePath)
                .as_deref(),
            Some(INPUT_PROFILE_PATH)
        );

        for component in InputComponent::ALL {
            let handle = driver.input_handle(component).unwrap();
            assert_ne!(handle, ComponentHandle::INVALID);
            assert_eq!(host.component_path(handle).as_deref(), Some(component.path()));
        }

        assert!(host.wait_for_poses(index, 3, Duration::from_secs(1)));
        let pose = host.last_pose(index).unwrap();
        assert!(pose.pose_is_valid);
        assert!(pose.device_is_connected);

        driver.deactivate();
    }

    #[test]
    fn pose_follows_the_headset() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
        let head = Vec3::new(1.0, 1.7, -2.0);
        host.set_headset_pose(HmdMatrix34::from_rotation_translation(Quat::IDENTITY, head));

        let pose = driver.pose();

        assert!(pose
            .position
            .abs_diff_eq(head + Vec3::new(-0.15, 0.1, -0.5), 1e-5));
    }

    #[test]
    fn second_activate_is_rejected_and_spawns_no_second_task() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
        let index = DeviceIndex(1);

        driver.activate(index).unwrap();
        let result = driver.activate(index);

        assert!(matches!(
            result,
            Err(DriverError::AlreadyActive(ControllerRole::LeftHand))
        ));
        assert!(host.wait_for_poses(index, 5, Duration::from_secs(1)));
        assert_eq!(host.pose_submitters(index), 1);

        driver.deactivate();
    }

    #[test]
    fn deactivate_joins_promptly_and_releases_the_index() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());
        let index = DeviceIndex(2);
        driver.activate(index).unwrap();
        assert!(host.wait_for_poses(index, 1, Duration::from_secs(1)));

        let started = Instant::now();
        driver.deactivate();
        let elapsed = started.elapsed();

        assert!(elapsed <= Duration::from_millis(50), "join took {:?}", elapsed);
        assert!(!driver.is_active());
        assert!(driver.is_deactivated());
        assert_eq!(driver.device_index(), DeviceIndex::INVALID);

        let settled = host.pose_count(index);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(host.pose_count(index), settled);
    }

    #[test]
    fn deactivate_then_drop_leaves_no_pose_thread() {
        let host = SimulatedHost::with_defaults();
        let index = DeviceIndex(4);
        {
            let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
            driver.activate(index).unwrap();
            driver.deactivate();
        }
        let settled = host.pose_count(index);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(host.pose_count(index), settled);
    }

    #[test]
    fn dropping_an_active_driver_stops_its_pose_thread() {
        let host = SimulatedHost::with_defaults();
        let index = DeviceIndex(5);
        {
            let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());
            driver.activate(index).unwrap();
            assert!(host.wait_for_poses(index, 1, Duration::from_secs(1)));
        }
        let settled = host.pose_count(index);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(host.pose_count(index), settled);
    }

    #[test]
    fn deactivation_is_terminal() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
        driver.activate(DeviceIndex(1)).unwrap();
        driver.deactivate();
        driver.deactivate();

        let result = driver.activate(DeviceIndex(1));

        assert!(matches!(result, Err(DriverError::Deactivated(_))));
        assert!(!driver.is_active());
    }

    #[test]
    fn failed_component_creation_fails_activation() {
        let host = SimulatedHost::with_defaults();
        host.fail_component(InputComponent::Haptic.path());
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
        let index = DeviceIndex(1);

        let result = driver.activate(index);

        assert!(matches!(
            result,
            Err(DriverError::ComponentError {
                component: InputComponent::Haptic,
                ..
            })
        ));
        assert!(!driver.is_active());
        assert!(!driver.is_deactivated());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(host.pose_count(index), 0);
    }

    #[test]
    fn activation_succeeds_after_a_failed_attempt() {
        let host = SimulatedHost::with_defaults();
        host.fail_component(InputComponent::Haptic.path());
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());
        let index = DeviceIndex(1);

        assert!(driver.activate(index).is_err());
        let touch = host
            .component_handle(index, InputComponent::ATouch.path())
            .unwrap();

        host.clear_faults();
        driver.activate(index).unwrap();

        assert!(driver.is_active());
        assert_eq!(driver.input_handle(InputComponent::ATouch), Some(touch));
        assert_ne!(
            driver.input_handle(InputComponent::Haptic),
            Some(ComponentHandle::INVALID)
        );
        assert!(host.wait_for_poses(index, 1, Duration::from_secs(1)));
        assert_eq!(host.pose_submitters(index), 1);

        driver.deactivate();
    }

    #[test]
    fn failed_property_write_fails_activation() {
        let host = SimulatedHost::with_defaults();
        host.fail_property(TrackedProperty::InputProfilePath);
        let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());

        let result = driver.activate(DeviceIndex(2));

        assert!(matches!(
            result,
            Err(DriverError::PropertyError {
                property: TrackedProperty::InputProfilePath,
                ..
            })
        ));
        assert!(!driver.is_active());
    }

    #[test]
    fn haptic_event_is_consumed_only_by_the_matching_device() {
        let host = SimulatedHost::with_defaults();
        let haptics = Arc::new(RecordingHaptics::default());
        let left = ControllerDriver::with_haptics(
            ControllerRole::LeftHand,
            host.context(),
            haptics.clone(),
        );
        let right = ControllerDriver::with_haptics(
            ControllerRole::RightHand,
            host.context(),
            haptics.clone(),
        );
        left.activate(DeviceIndex(1)).unwrap();
        right.activate(DeviceIndex(2)).unwrap();

        let left_haptic = left.input_handle(InputComponent::Haptic).unwrap();
        let right_haptic = right.input_handle(InputComponent::Haptic).unwrap();
        assert_ne!(left_haptic, right_haptic);

        let event = haptic_event(left_haptic);
        assert_eq!(left.process_event(&event), EventDisposition::Consumed);
        assert_eq!(right.process_event(&event), EventDisposition::Ignored);

        let pulses = haptics.pulses.lock().unwrap().clone();
        assert_eq!(pulses.len(), 1);
        assert_eq!(pulses[0].0, ControllerRole::LeftHand);

        left.deactivate();
        right.deactivate();
    }

    #[test]
    fn inactive_device_ignores_events_and_frames() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::LeftHand, host.context());

        driver.run_frame();
        let disposition = driver.process_event(&VrEvent::Other {
            event_type: 1,
            tracked_device_index: DeviceIndex(1),
        });

        assert_eq!(disposition, EventDisposition::Ignored);
        assert_eq!(host.input_update_count(), 0);
    }

    #[test]
    fn run_frame_pushes_idle_inputs() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());
        driver.activate(DeviceIndex(2)).unwrap();

        driver.run_frame();

        assert_eq!(host.input_update_count(), 4);
        let trigger = driver.input_handle(InputComponent::TriggerValue).unwrap();
        assert_eq!(host.scalar_value(trigger), Some(0.0));
        let click = driver.input_handle(InputComponent::AClick).unwrap();
        assert_eq!(host.boolean_value(click), Some(false));

        driver.deactivate();
    }

    #[test]
    fn standby_and_debug_requests() {
        let host = SimulatedHost::with_defaults();
        let driver = ControllerDriver::new(ControllerRole::RightHand, host.context());

        driver.enter_standby();

        assert_eq!(driver.debug_request("status"), "");
        assert!(host
            .log_lines()
            .iter()
            .any(|line| line == "Right hand has been put on standby"));
    }
}
