//! Error definitions for the driver and its host boundary

use crate::device::InputComponent;
use crate::host::{ComponentHandle, ControllerRole, PropertyContainerHandle, TrackedProperty};
use thiserror::Error;

/// Failures reported by host services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Invalid property container: {0}")]
    InvalidContainer(PropertyContainerHandle),

    #[error("Invalid component handle: {0}")]
    InvalidHandle(ComponentHandle),

    #[error("Component already exists: {0}")]
    DuplicateComponent(String),

    #[error("Setting not found: {section}/{key}")]
    SettingNotFound { section: String, key: String },

    #[error("Setting has the wrong type: {section}/{key}")]
    SettingWrongType { section: String, key: String },

    #[error("Host refused the request: {0}")]
    Refused(String),
}

/// Init status codes the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum InitError {
    InterfaceNotFound = 105,
    DriverFailed = 200,
    DriverUnknown = 201,
}

impl InitError {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors raised by the driver while loading or activating devices
#[derive(Debug, Error)]
pub enum DriverError {
    /// The host asked the factory for an interface this driver does not provide
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// The host refused to add a device
    #[error("Registration failed for {role} controller ({serial})")]
    RegistrationError { role: ControllerRole, serial: String },

    #[error("Failed to set {property} on {role} controller: {source}")]
    PropertyError {
        role: ControllerRole,
        property: TrackedProperty,
        #[source]
        source: HostError,
    },

    #[error("Failed to create {component} for {role} controller: {source}")]
    ComponentError {
        role: ControllerRole,
        component: InputComponent,
        #[source]
        source: HostError,
    },

    #[error("{0} controller is already active")]
    AlreadyActive(ControllerRole),

    /// Deactivation is terminal
    #[error("{0} controller has been deactivated")]
    Deactivated(ControllerRole),

    #[error("Failed to spawn pose task: {0}")]
    PoseTaskError(#[from] std::io::Error),
}

impl DriverError {
    /// Status code reported to the host for this error.
    pub fn init_error(&self) -> InitError {
        match self {
            DriverError::InterfaceNotFound(_) => InitError::InterfaceNotFound,
            DriverError::RegistrationError { .. } => InitError::DriverUnknown,
            _ => InitError::DriverFailed,
        }
    }
}
