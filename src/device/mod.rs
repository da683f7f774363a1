//! Virtual controller devices
//!
//! 1. [`controller`] - Lifecycle state machine and the host-facing driver
//! 2. [`components`] - Input component paths and their host handles
//! 3. [`pose_task`] - Background thread submitting poses while active
//! 4. [`haptics`] - Hook for haptic requests addressed to a controller
//!
//! ```text
//! Host ──activate──► ControllerDriver ──spawn──► PoseUpdateTask ──► Host (poses)
//!      ──run_frame─►        │
//!      ──events────►        └──► HapticResponder
//! ```

pub mod components;
pub mod controller;
pub mod haptics;
pub mod pose_task;

pub use components::{InputComponent, InputHandles};
pub use controller::{ControllerDevice, ControllerDriver, EventDisposition, INPUT_PROFILE_PATH};
pub use haptics::{HapticResponder, LogHaptics};
pub use pose_task::PoseUpdateTask;
