use glam::{Mat3, Quat, Vec3};
use std::fmt;

// Index the host assigns to a tracked device when it activates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(pub u32);

impl DeviceIndex {
    /// The headset always occupies slot zero.
    pub const HMD: Self = Self(0);
    pub const INVALID: Self = Self(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            write!(f, "#invalid")
        }
    }
}

// Opaque handle to a per-device property container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyContainerHandle(pub u64);

impl PropertyContainerHandle {
    pub const INVALID: Self = Self(0);
}

impl fmt::Display for PropertyContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container:{}", self.0)
    }
}

// Opaque handle to an input or output component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle(pub u64);

impl ComponentHandle {
    pub const INVALID: Self = Self(0);
}

impl fmt::Display for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component:{}", self.0)
    }
}

// Device class used when registering with the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
}

// Handedness of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerRole {
    LeftHand,
    RightHand,
}

impl ControllerRole {
    /// Value the host expects for the controller role hint property.
    pub fn hint(self) -> i32 {
        match self {
            ControllerRole::LeftHand => 1,
            ControllerRole::RightHand => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControllerRole::LeftHand => "Left",
            ControllerRole::RightHand => "Right",
        }
    }
}

impl fmt::Display for ControllerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Properties this driver writes into a device's container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedProperty {
    ModelNumber,
    ControllerRoleHint,
    InputProfilePath,
}

impl fmt::Display for TrackedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedProperty::ModelNumber => write!(f, "Prop_ModelNumber_String"),
            TrackedProperty::ControllerRoleHint => write!(f, "Prop_ControllerRoleHint_Int32"),
            TrackedProperty::InputProfilePath => write!(f, "Prop_InputProfilePath_String"),
        }
    }
}

// Whether a scalar input reports absolute or relative values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Absolute,
    Relative,
}

// Range of a scalar input: 0..1 or -1..1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarUnits {
    NormalizedOneSided,
    NormalizedTwoSided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingResult {
    #[default]
    Uninitialized,
    CalibratingInProgress,
    CalibratingOutOfRange,
    RunningOk,
    RunningOutOfRange,
    FallbackRotationOnly,
}

/// Row-major 3x4 rigid transform as the host reports it.
///
/// The left 3x3 block is the rotation, the last column is the translation
/// in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdMatrix34 {
    pub m: [[f32; 4]; 3],
}

impl HmdMatrix34 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        let r = Mat3::from_quat(rotation);
        Self {
            m: [
                [r.x_axis.x, r.y_axis.x, r.z_axis.x, translation.x],
                [r.x_axis.y, r.y_axis.y, r.z_axis.y, translation.y],
                [r.x_axis.z, r.y_axis.z, r.z_axis.z, translation.z],
            ],
        }
    }
}

impl Default for HmdMatrix34 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// Raw pose of a tracked device as the host sees it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackedDevicePose {
    pub device_to_absolute_tracking: HmdMatrix34,
    pub pose_is_valid: bool,
    pub device_is_connected: bool,
    pub tracking_result: TrackingResult,
}

/// Pose a driver submits for one of its devices.
///
/// The two frame rotations must be valid quaternions or the host will not
/// show the device, so the default uses identity for both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverPose {
    pub world_from_driver_rotation: Quat,
    pub driver_from_head_rotation: Quat,
    pub orientation: Quat,
    pub position: Vec3,
    pub pose_is_valid: bool,
    pub device_is_connected: bool,
    pub result: TrackingResult,
}

impl Default for DriverPose {
    fn default() -> Self {
        Self {
            world_from_driver_rotation: Quat::IDENTITY,
            driver_from_head_rotation: Quat::IDENTITY,
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            pose_is_valid: false,
            device_is_connected: false,
            result: TrackingResult::Uninitialized,
        }
    }
}

// Haptic request addressed to a haptic output component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticVibration {
    pub container: PropertyContainerHandle,
    pub component: ComponentHandle,
    pub duration_seconds: f32,
    pub frequency: f32,
    pub amplitude: f32,
}

// Event dequeued from the host's event queue
#[derive(Debug, Clone, PartialEq)]
pub enum VrEvent {
    HapticVibration(HapticVibration),
    Other {
        event_type: u32,
        tracked_device_index: DeviceIndex,
    },
}
