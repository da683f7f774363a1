//! Driver entry point
//!
//! The host loads the driver and asks the factory for interfaces by
//! versioned name. The only interface served is the device provider; the
//! factory hands out a fresh, owned instance instead of a process-wide one.

use crate::error::DriverError;
use crate::host::ServerTrackedDeviceProvider;
use crate::provider::DeviceProvider;
use tracing::{info, warn};

pub const SERVER_TRACKED_DEVICE_PROVIDER_VERSION: &str = "IServerTrackedDeviceProvider_004";

/// Interface versions this driver was built against.
pub const INTERFACE_VERSIONS: &[&str] = &[
    "IVRSettings_003",
    "ITrackedDeviceServerDriver_005",
    SERVER_TRACKED_DEVICE_PROVIDER_VERSION,
    "IVRServerDriverHost_006",
    "IVRProperties_001",
    "IVRDriverInput_003",
    "IVRDriverLog_001",
];

pub fn hmd_driver_factory(
    interface_name: &str,
) -> Result<Box<dyn ServerTrackedDeviceProvider>, DriverError> {
    if interface_name == SERVER_TRACKED_DEVICE_PROVIDER_VERSION {
        info!("Providing {}", interface_name);
        return Ok(Box::new(DeviceProvider::new()));
    }

    warn!("Requested interface {} is not provided", interface_name);
    Err(DriverError::InterfaceNotFound(interface_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InitError;

    #[test]
    fn factory_serves_the_device_provider() {
        let provider = hmd_driver_factory(SERVER_TRACKED_DEVICE_PROVIDER_VERSION).unwrap();
        assert_eq!(provider.interface_versions(), INTERFACE_VERSIONS);
    }

    #[test]
    fn unknown_interface_is_rejected() {
        let err = match hmd_driver_factory("IVRWatchdogProvider_001") {
            Ok(_) => panic!("factory served an unknown interface"),
            Err(e) => e,
        };

        assert!(matches!(err, DriverError::InterfaceNotFound(ref name) if name == "IVRWatchdogProvider_001"));
        assert_eq!(err.init_error(), InitError::InterfaceNotFound);
        assert_eq!(err.init_error().code(), 105);
    }
}
