//! Sample tracked-controller driver
//!
//! Exposes two virtual hand controllers to a VR runtime. The controllers
//! follow the headset at a fixed offset, publish an idle input state every
//! frame and accept haptic requests addressed to them.
//!
//! 1. [`entry`] - Factory the runtime calls to obtain the provider
//! 2. [`provider`] - Owns the controllers, runs frames and routes events
//! 3. [`device`] - Controller lifecycle, inputs and the pose thread
//! 4. [`pose`] - Controller pose derived from the headset pose
//! 5. [`config`] - Settings keys and a TOML-backed settings store
//! 6. [`host`] - Contract with the runtime
//! 7. [`sim`] - In-process runtime for tests and the demo binary

pub mod config;
pub mod device;
pub mod entry;
pub mod error;
pub mod host;
pub mod pose;
pub mod provider;
pub mod sim;

pub use device::ControllerDriver;
pub use entry::{hmd_driver_factory, INTERFACE_VERSIONS, SERVER_TRACKED_DEVICE_PROVIDER_VERSION};
pub use error::{DriverError, HostError, InitError};
pub use host::{DriverContext, ServerTrackedDeviceProvider, TrackedDeviceDriver};
pub use provider::DeviceProvider;
