//! Device provider
//!
//! Owns both controllers for the lifetime of the driver. On init it builds
//! one controller per hand and announces each to the host under its serial
//! number; afterwards the host activates them on its own schedule. Every
//! frame the provider pushes input state and routes the host's events.
//!
//! ```text
//! init ──► ControllerDriver(Left), ControllerDriver(Right) ──► tracked_device_added
//! run_frame ──► device.run_frame() ×2 ──► drain_events
//! cleanup ──► release devices
//! ```

pub mod router;

pub use router::{drain_events, route_event, RoutedEvents};

use crate::device::{ControllerDriver, HapticResponder, LogHaptics};
use crate::entry::INTERFACE_VERSIONS;
use crate::error::DriverError;
use crate::host::{
    ControllerRole, DeviceClass, DriverContext, ServerTrackedDeviceProvider, TrackedDeviceDriver,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Hands served by this driver, in registration order.
pub const CONTROLLER_ROLES: [ControllerRole; 2] =
    [ControllerRole::LeftHand, ControllerRole::RightHand];

pub struct DeviceProvider {
    context: Option<DriverContext>,
    devices: Vec<Arc<ControllerDriver>>,
    haptics: Arc<dyn HapticResponder>,
}

impl Default for DeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProvider {
    pub fn new() -> Self {
        Self::with_haptics(Arc::new(LogHaptics))
    }

    pub fn with_haptics(haptics: Arc<dyn HapticResponder>) -> Self {
        Self {
            context: None,
            devices: Vec::new(),
            haptics,
        }
    }

    pub fn devices(&self) -> &[Arc<ControllerDriver>] {
        &self.devices
    }

    pub fn device(&self, role: ControllerRole) -> Option<&Arc<ControllerDriver>> {
        self.devices.iter().find(|device| device.role() == role)
    }

    /// One frame of work; returns what happened to the host's events.
    pub fn run_frame_routed(&mut self) -> RoutedEvents {
        let Some(context) = &self.context else {
            return RoutedEvents::default();
        };

        for device in &self.devices {
            device.run_frame();
        }

        let routed = drain_events(context.host.as_ref(), &self.devices);
        if routed.polled > 0 {
            debug!(
                "Routed {} events, {} consumed",
                routed.polled, routed.consumed
            );
        }
        routed
    }
}

impl ServerTrackedDeviceProvider for DeviceProvider {
    fn init(&mut self, context: DriverContext) -> Result<(), DriverError> {
        info!("Initializing device provider");
        if !self.devices.is_empty() {
            warn!("Device provider initialized twice, replacing previous devices");
        }

        self.devices = CONTROLLER_ROLES
            .iter()
            .map(|&role| {
                Arc::new(ControllerDriver::with_haptics(
                    role,
                    context.clone(),
                    self.haptics.clone(),
                ))
            })
            .collect();
        self.context = Some(context.clone());

        // Devices registered before a failure stay registered; the host
        // unloads the whole driver on an init error.
        for device in &self.devices {
            let driver: Arc<dyn TrackedDeviceDriver> = device.clone();
            if !context.host.tracked_device_added(
                device.serial_number(),
                DeviceClass::Controller,
                driver,
            ) {
                let message = format!(
                    "Failed to create {} controller device!",
                    device.role().label().to_lowercase()
                );
                error!("{}", message);
                context.driver_log(&message);
                return Err(DriverError::RegistrationError {
                    role: device.role(),
                    serial: device.serial_number().to_string(),
                });
            }
            info!(
                "Registered {} controller as {}",
                device.role(),
                device.serial_number()
            );
        }

        Ok(())
    }

    fn interface_versions(&self) -> &'static [&'static str] {
        INTERFACE_VERSIONS
    }

    fn run_frame(&mut self) {
        self.run_frame_routed();
    }

    fn should_block_standby_mode(&self) -> bool {
        false
    }

    fn enter_standby(&mut self) {
        debug!("Device provider entering standby");
    }

    fn leave_standby(&mut self) {
        debug!("Device provider leaving standby");
    }

    fn cleanup(&mut self) {
        // The host deactivates devices before calling this
        for device in &self.devices {
            if device.is_active() {
                warn!(
                    "{} controller still active during cleanup",
                    device.role()
                );
            }
        }
        info!("Releasing {} controller devices", self.devices.len());
        self.devices.clear();
        self.context = None;
    }
}
