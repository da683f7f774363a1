//! Host runtime contract
//!
//! Everything the driver needs from the VR runtime that loads it is expressed
//! here as a set of service traits. The runtime owns the device registry, the
//! property store, the input system, the settings store and the log sink; the
//! driver only ever reaches them through a [`DriverContext`].
//!
//! ```text
//!                ┌──────────── DriverContext ────────────┐
//! Provider ──►   DriverHost  DriverInput  DriverProperties  DriverSettings  DriverLog
//!    │                ▲
//!    └─ registers ─► Arc<dyn TrackedDeviceDriver> (held by the host)
//! ```
//!
//! Two capability traits go the other way: the host holds the provider as a
//! [`ServerTrackedDeviceProvider`] and every registered device as a
//! [`TrackedDeviceDriver`], never as concrete types.

pub mod types;

pub use types::{
    ComponentHandle, ControllerRole, DeviceClass, DeviceIndex, DriverPose, HapticVibration,
    HmdMatrix34, PropertyContainerHandle, ScalarType, ScalarUnits, TrackedDevicePose,
    TrackedProperty, TrackingResult, VrEvent,
};

use crate::error::{DriverError, HostError};
use std::sync::Arc;
use tracing::info;

/// Read access to the host's settings store.
pub trait DriverSettings: Send + Sync {
    fn get_string(&self, section: &str, key: &str) -> Result<String, HostError>;

    fn get_int32(&self, section: &str, key: &str) -> Result<i32, HostError>;
}

/// The host's log sink. Lines end up in the runtime's own log, prefixed with
/// the driver name.
pub trait DriverLog: Send + Sync {
    fn log(&self, message: &str);
}

/// Device registry, pose intake and event queue of the host.
pub trait DriverHost: Send + Sync {
    /// Announces a new device. Returns `false` when the host refuses it.
    fn tracked_device_added(
        &self,
        serial_number: &str,
        class: DeviceClass,
        driver: Arc<dyn TrackedDeviceDriver>,
    ) -> bool;

    fn tracked_device_pose_updated(&self, index: DeviceIndex, pose: &DriverPose);

    /// Latest raw pose of the headset.
    fn headset_pose(&self) -> TrackedDevicePose;

    fn poll_next_event(&self) -> Option<VrEvent>;
}

pub trait DriverProperties: Send + Sync {
    fn tracked_device_to_property_container(&self, index: DeviceIndex) -> PropertyContainerHandle;

    fn set_string_property(
        &self,
        container: PropertyContainerHandle,
        property: TrackedProperty,
        value: &str,
    ) -> Result<(), HostError>;

    fn set_int32_property(
        &self,
        container: PropertyContainerHandle,
        property: TrackedProperty,
        value: i32,
    ) -> Result<(), HostError>;
}

/// Input component creation and state updates.
///
/// `time_offset` is the age of the sample in seconds relative to now; zero
/// means the value was read this instant.
pub trait DriverInput: Send + Sync {
    fn create_boolean_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
    ) -> Result<ComponentHandle, HostError>;

    fn create_scalar_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
        scalar_type: ScalarType,
        units: ScalarUnits,
    ) -> Result<ComponentHandle, HostError>;

    fn create_haptic_component(
        &self,
        container: PropertyContainerHandle,
        name: &str,
    ) -> Result<ComponentHandle, HostError>;

    fn update_boolean_component(
        &self,
        handle: ComponentHandle,
        value: bool,
        time_offset: f64,
    ) -> Result<(), HostError>;

    fn update_scalar_component(
        &self,
        handle: ComponentHandle,
        value: f32,
        time_offset: f64,
    ) -> Result<(), HostError>;
}

/// Capability interface the host holds for every registered device.
pub trait TrackedDeviceDriver: Send + Sync {
    /// Called once the host has accepted the device and assigned its index.
    fn activate(&self, index: DeviceIndex) -> Result<(), DriverError>;

    /// Called at the end of the session. Resources acquired in `activate`
    /// must be released before this returns.
    fn deactivate(&self);

    fn enter_standby(&self);

    /// Free-form request from an application; the response format is a
    /// contract between the application and the driver.
    fn debug_request(&self, request: &str) -> String;

    fn pose(&self) -> DriverPose;
}

/// Capability interface the host holds for the driver as a whole.
pub trait ServerTrackedDeviceProvider: Send {
    fn init(&mut self, context: DriverContext) -> Result<(), DriverError>;

    fn interface_versions(&self) -> &'static [&'static str];

    /// Runs on the host's main loop every frame; must stay cheap.
    fn run_frame(&mut self);

    fn should_block_standby_mode(&self) -> bool;

    fn enter_standby(&mut self);

    fn leave_standby(&mut self);

    /// Last call before the driver is unloaded. Host services are invalid
    /// afterwards.
    fn cleanup(&mut self);
}

// Handles to all host services, handed to the provider on init
#[derive(Clone)]
pub struct DriverContext {
    pub host: Arc<dyn DriverHost>,
    pub input: Arc<dyn DriverInput>,
    pub properties: Arc<dyn DriverProperties>,
    pub settings: Arc<dyn DriverSettings>,
    pub log_sink: Arc<dyn DriverLog>,
}

impl DriverContext {
    pub fn new(
        host: Arc<dyn DriverHost>,
        input: Arc<dyn DriverInput>,
        properties: Arc<dyn DriverProperties>,
        settings: Arc<dyn DriverSettings>,
        log_sink: Arc<dyn DriverLog>,
    ) -> Self {
        Self {
            host,
            input,
            properties,
            settings,
            log_sink,
        }
    }

    /// Builds a context from a single object that provides every service.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: DriverHost + DriverInput + DriverProperties + DriverSettings + DriverLog + 'static,
    {
        Self {
            host: host.clone(),
            input: host.clone(),
            properties: host.clone(),
            settings: host.clone(),
            log_sink: host,
        }
    }

    /// Writes a line to the host log and mirrors it into tracing.
    pub fn driver_log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: "driver_log", "{}", message);
        self.log_sink.log(message);
    }
}

impl std::fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverContext").finish_non_exhaustive()
    }
}
