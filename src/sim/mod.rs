//! In-process simulated host
//!
//! Implements every host service over plain in-memory state so the driver
//! can be loaded, activated and driven without a VR runtime. It mimics the
//! runtime where the driver can observe it: registered devices receive
//! indices starting at 1 (the headset owns 0), each index gets its own
//! property container, component handles are unique and non-zero, and the
//! event queue is drained in FIFO order.
//!
//! Faults can be injected to exercise the driver's error paths: refused
//! registrations, failing component creation and failing property writes.

use crate::config::SettingsStore;
use crate::error::{DriverError, HostError};
use crate::host::{
    ComponentHandle, DeviceClass, DeviceIndex, DriverContext, DriverHost, DriverInput, DriverLog,
    DriverPose, DriverProperties, DriverSettings, HmdMatrix34, PropertyContainerHandle,
    ScalarType, ScalarUnits, TrackedDevicePose, TrackedDeviceDriver, TrackedProperty,
    TrackingResult, VrEvent,
};
use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CONTAINER_BASE: u64 = 0x1000;

// A device the driver announced to the host
#[derive(Clone)]
pub struct RegisteredDevice {
    pub serial_number: String,
    pub class: DeviceClass,
    pub index: DeviceIndex,
    pub driver: Arc<dyn TrackedDeviceDriver>,
}

impl std::fmt::Debug for RegisteredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDevice")
            .field("serial_number", &self.serial_number)
            .field("class", &self.class)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

// Kind and configuration of a created component
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentKind {
    Boolean,
    Scalar(ScalarType, ScalarUnits),
    Haptic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub container: PropertyContainerHandle,
    pub path: String,
    pub kind: ComponentKind,
    pub boolean_value: Option<bool>,
    pub scalar_value: Option<f32>,
    pub updates: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int32(i32),
}

#[derive(Debug, Clone)]
struct HostLogLine {
    timestamp: DateTime<Local>,
    message: String,
}

#[derive(Debug, Default)]
struct PoseRecord {
    count: u64,
    last: Option<DriverPose>,
    submitters: HashSet<ThreadId>,
}

#[derive(Default)]
struct SimState {
    headset: TrackedDevicePose,
    registered: Vec<RegisteredDevice>,
    properties: HashMap<(PropertyContainerHandle, TrackedProperty), PropertyValue>,
    components: HashMap<ComponentHandle, ComponentRecord>,
    next_component: u64,
    input_updates: u64,
    poses: HashMap<DeviceIndex, PoseRecord>,
    events: VecDeque<VrEvent>,
    log: Vec<HostLogLine>,
    refused_serials: HashSet<String>,
    failing_components: HashSet<String>,
    failing_properties: HashSet<TrackedProperty>,
}

pub struct SimulatedHost {
    settings: SettingsStore,
    state: Mutex<SimState>,
}

impl SimulatedHost {
    pub fn new(settings: SettingsStore) -> Arc<Self> {
        let state = SimState {
            headset: TrackedDevicePose {
                device_to_absolute_tracking: HmdMatrix34::IDENTITY,
                pose_is_valid: true,
                device_is_connected: true,
                tracking_result: TrackingResult::RunningOk,
            },
            next_component: 1,
            ..SimState::default()
        };

        Arc::new(Self {
            settings,
            state: Mutex::new(state),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(SettingsStore::with_defaults())
    }

    /// Context handing this host out as every service.
    pub fn context(self: &Arc<Self>) -> DriverContext {
        DriverContext::from_host(self.clone())
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Headset and events

    pub fn set_headset_pose(&self, transform: HmdMatrix34) {
        self.state().headset.device_to_absolute_tracking = transform;
    }

    pub fn push_event(&self, event: VrEvent) {
        self.state().events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.state().events.len()
    }

    // Fault injection

    pub fn refuse_registration(&self, serial_number: &str) {
        self.state()
            .refused_serials
            .insert(serial_number.to_string());
    }

    pub fn fail_component(&self, path: &str) {
        self.state().failing_components.insert(path.to_string());
    }

    pub fn fail_property(&self, property: TrackedProperty) {
        self.state().failing_properties.insert(property);
    }

    /// Lifts every injected fault.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.refused_serials.clear();
        state.failing_components.clear();
        state.failing_properties.clear();
    }

    // Device registry

    pub fn registered(&self) -> Vec<RegisteredDevice> {
        self.state().registered.clone()
    }

    pub fn driver(&self, index: DeviceIndex) -> Option<Arc<dyn TrackedDeviceDriver>> {
        self.state()
            .registered
            .iter()
            .find(|device| device.index == index)
            .map(|device| device.driver.clone())
    }

    /// Activates every registered device the way the runtime does after
    /// `tracked_device_added`.
    pub fn activate_registered(&self) -> Vec<(DeviceIndex, Result<(), DriverError>)> {
        // Drivers call back into the host while activating; never hold the lock
        let devices = self.registered();
        devices
            .into_iter()
            .map(|device| {
                let result = device.driver.activate(device.index);
                match &result {
                    Ok(()) => info!("Activated {} as {}", device.serial_number, device.index),
                    Err(e) => warn!("Activation of {} failed: {}", device.serial_number, e),
                }
                (device.index, result)
            })
            .collect()
    }

    pub fn deactivate_registered(&self) {
        for device in self.registered() {
            device.driver.deactivate();
        }
    }

    pub fn enter_standby_registered(&self) {
        for device in self.registered() {
            device.driver.enter_standby();
        }
    }

    /// Drops the host's references to every driver.
    pub fn release_drivers(&self) {
        let released = std::mem::take(&mut self.state().registered);
        debug!("Released {} drivers", released.len());
    }

    // Observations

    pub fn pose_count(&self, index: DeviceIndex) -> u64 {
        self.state().poses.get(&index).map_or(0, |record| record.count)
    }

    pub fn last_pose(&self, index: DeviceIndex) -> Option<DriverPose> {
        self.state().poses.get(&index).and_then(|record| record.last)
    }

    /// Number of distinct threads that submitted poses for `index`.
    pub fn pose_submitters(&self, index: DeviceIndex) -> usize {
        self.state()
            .poses
            .get(&index)
            .map_or(0, |record| record.submitters.len())
    }

    /// Waits until at least `count` poses arrived for `index`.
    pub fn wait_for_poses(&self, index: DeviceIndex, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.pose_count(index) >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.pose_count(index) >= count
    }

    pub fn string_property(&self, index: DeviceIndex, property: TrackedProperty) -> Option<String> {
        match self.state().properties.get(&(container_for(index), property)) {
            Some(PropertyValue::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn int_property(&self, index: DeviceIndex, property: TrackedProperty) -> Option<i32> {
        match self.state().properties.get(&(container_for(index), property)) {
            Some(PropertyValue::Int32(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn component(&self, handle: ComponentHandle) -> Option<ComponentRecord> {
        self.state().components.get(&handle).cloned()
    }

    /// Handle of the component created under `path` for the device at `index`.
    pub fn component_handle(&self, index: DeviceIndex, path: &str) -> Option<ComponentHandle> {
        let container = container_for(index);
        self.state()
            .components
            .iter()
            .find(|(_, record)| record.container == container && record.path == path)
            .map(|(handle, _)| *handle)
    }

    pub fn component_path(&self, handle: ComponentHandle) -> Option<String> {
        self.component(handle).map(|record| record.path)
    }

    pub fn boolean_value(&self, handle: ComponentHandle) -> Option<bool> {
        self.component(handle).and_then(|record| record.boolean_value)
    }

    pub fn scalar_value(&self, handle: ComponentHandle) -> Option<f32> {
        self.component(handle).and_then(|record| record.scalar_value)
    }

    /// Total input updates received across all components.
    pub fn input_update_count(&self) -> u64 {
        self.state().input_updates
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.state()
            .log
            .iter()
            .map(|line| line.message.clone())
            .collect()
    }

    fn create_component(
        &self,
        container: PropertyContainerHandle,
        path: &str,
        kind: ComponentKind,
    ) -> Result<ComponentHandle, HostError> {
        let mut state = self.state();
        if container == PropertyContainerHandle::INVALID {
            return Err(HostError::InvalidContainer(container));
        }
        if state.failing_components.contains(path) {
            return Err(HostError::Refused(format!("creation of {} refused", path)));
        }
        if state
            .components
            .values()
            .any(|record| record.container == container && record.path == path)
        {
            return Err(HostError::DuplicateComponent(path.to_string()));
        }

        let handle = ComponentHandle(state.next_component);
        state.next_component += 1;
        state.components.insert(
            handle,
            ComponentRecord {
                container,
                path: path.to_string(),
                kind,
                boolean_value: None,
                scalar_value: None,
                updates: 0,
            },
        );
        Ok(handle)
    }

    fn set_property(
        &self,
        container: PropertyContainerHandle,
        property: TrackedProperty,
        value: PropertyValue,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if container == PropertyContainerHandle::INVALID {
            return Err(HostError::InvalidContainer(container));
        }
        if state.failing_properties.contains(&property) {
            return Err(HostError::Refused(format!("write of {} refused", property)));
        }
        state.properties.insert((container, property), value);
        Ok(())
    }
}

fn container_for(index: DeviceIndex) -> PropertyContainerHandle {
    if index.is_valid() {
        PropertyContainerHandle(CONTAINER_BASE + index.0 as u64)
    } else {
        PropertyContainerHandle::INVALID
    }
}

impl DriverSettings for SimulatedHost {
    fn get_string(&self, section: &str, key: &str) -> Result<String, HostError> {
        self.settings.get_string(section, key)
    }

    fn get_int32(&self, section: &str, key: &str) -> Result<i32, HostError> {
        self.settings.get_int32(section, key)
    }
}

impl DriverLog for SimulatedHost {
    fn log(&self, message: &str) {
        let line = HostLogLine {
            timestamp: Local::now(),
            message: message.to_string(),
        };
        debug!(
            "host log [{}] {}",
            line.timestamp.format("%H:%M:%S.%3f"),
            line.message
        );
        self.state().log.push(line);
    }
}

impl DriverHost for SimulatedHost {
    fn tracked_device_added(
        &self,
        serial_number: &str,
        class: DeviceClass,
        driver: Arc<dyn TrackedDeviceDriver>,
    ) -> bool {
        let mut state = self.state();
        if state.refused_serials.contains(serial_number) {
            warn!("Refusing device {}", serial_number);
            return false;
        }
        if state
            .registered
            .iter()
            .any(|device| device.serial_number == serial_number)
        {
            warn!("Duplicate serial number {}", serial_number);
            return false;
        }

        let index = DeviceIndex(state.registered.len() as u32 + 1);
        info!("Device {} added as {} ({:?})", serial_number, index, class);
        state.registered.push(RegisteredDevice {
            serial_number: serial_number.to_string(),
            class,
            index,
            driver,
        });
        true
    }

    fn tracked_device_pose_updated(&self, index: DeviceIndex, pose: &DriverPose) {
        let mut state = self.state();
        let record = state.poses.entry(index).or_default();
        record.count += 1;
        record.last = Some(*pose);
        record.submitters.insert(thread::current().id());
    }

    fn headset_pose(&self) -> TrackedDevicePose {
        self.state().headset
    }

    fn poll_next_event(&self) -> Option<VrEvent> {
        self.state().events.pop_front()
    }
}

impl DriverProperties for SimulatedHost {
    fn tracked_device_to_property_container(&self, index: DeviceIndex) -> PropertyContainerHandle {
        container_for(index)
    }

    fn set_string_property(
        &self,
        container: PropertyContainerHandle,
        property: TrackedProperty,
        value: &str,
    ) -> Result<(), HostError> {
        self.set_property(container, property, PropertyValue::String(value.to_string()))
    }

    fn set_int32_property(
        &self,
        container: PropertyContainerHandle,
        property: TrackedProperty,
        value: i32,
    ) -> Result<(), HostError> {
        self.set_property(container, property, PropertyValue::Int32(value))
    }
}

impl DriverInput for SimulatedHost {
    fn create_boolean_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
    ) -> Result<ComponentHandle, HostError> {
        self.create_component(container, name, ComponentKind::Boolean)
    }

    fn create_scalar_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
        scalar_type: ScalarType,
        units: ScalarUnits,
    ) -> Result<ComponentHandle, HostError> {
        self.create_component(container, name, ComponentKind::Scalar(scalar_type, units))
    }

    fn create_haptic_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
    ) -> Result<ComponentHandle, HostError> {
        self.create_component(container, name, ComponentKind::Haptic)
    }

    fn update_boolean_component(
        &self,
        handle: ComponentHandle,
        value: bool,
        _time_offset: f64,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let record = match state.components.get_mut(&handle) {
            Some(record) if record.kind == ComponentKind::Boolean => record,
            _ => return Err(HostError::InvalidHandle(handle)),
        };
        record.boolean_value = Some(value);
        record.updates += 1;
        state.input_updates += 1;
        Ok(())
    }

    fn update_scalar_component(
        &self,
        handle: ComponentHandle,
        value: f32,
        _time_offset: f64,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let record = match state.components.get_mut(&handle) {
            Some(record) if matches!(record.kind, ComponentKind::Scalar(..)) => record,
            _ => return Err(HostError::InvalidHandle(handle)),
        };
        record.scalar_value = Some(value);
        record.updates += 1;
        state.input_updates += 1;
        Ok(())
    }
}
