//! Pose synthesis for the virtual controllers
//!
//! The controllers have no tracking of their own. Their pose is derived from
//! the headset pose: a fixed local offset in front of the user, rotated into
//! world space by the headset orientation, plus a fixed 90 degree pitch so the
//! controller face points at the user.
//!
//! ```text
//! headset (P, Q) ──► position    = P + Q · offset(role)
//!                └─► orientation = Q · pitch(90°)
//! ```

use crate::host::{ControllerRole, DriverPose, HmdMatrix34, TrackingResult};
use glam::{EulerRot, Mat3, Quat, Vec3};

/// Offset of the controller from the headset, in headset-local metres.
pub const LATERAL_OFFSET: f32 = 0.15;
pub const VERTICAL_OFFSET: f32 = 0.1;
pub const FORWARD_OFFSET: f32 = -0.5;

/// Pitch applied on top of the headset orientation.
pub const PITCH_OFFSET_DEGREES: f32 = 90.0;

pub fn local_offset(role: ControllerRole) -> Vec3 {
    let x = match role {
        ControllerRole::LeftHand => -LATERAL_OFFSET,
        ControllerRole::RightHand => LATERAL_OFFSET,
    };
    Vec3::new(x, VERTICAL_OFFSET, FORWARD_OFFSET)
}

/// Fixed orientation offset of the controller relative to the headset.
pub fn offset_orientation() -> Quat {
    quat_from_euler_angles(0.0, PITCH_OFFSET_DEGREES.to_radians(), 0.0)
}

/// Quaternion from roll (X), pitch (Y) and yaw (Z), composed yaw · pitch · roll.
pub fn quat_from_euler_angles(roll: f32, pitch: f32, yaw: f32) -> Quat {
    Quat::from_euler(EulerRot::ZYX, yaw, pitch, roll)
}

pub fn position_from_matrix(matrix: &HmdMatrix34) -> Vec3 {
    Vec3::new(matrix.m[0][3], matrix.m[1][3], matrix.m[2][3])
}

pub fn orientation_from_matrix(matrix: &HmdMatrix34) -> Quat {
    let m = &matrix.m;
    let rotation = Mat3::from_cols(
        Vec3::new(m[0][0], m[1][0], m[2][0]),
        Vec3::new(m[0][1], m[1][1], m[2][1]),
        Vec3::new(m[0][2], m[1][2], m[2][2]),
    );
    Quat::from_mat3(&rotation).normalize()
}

/// Derives a controller pose from the headset transform.
pub fn synthesize_pose(headset: &HmdMatrix34, role: ControllerRole) -> DriverPose {
    let headset_position = position_from_matrix(headset);
    let headset_orientation = orientation_from_matrix(headset);

    // Rotate the offset by the headset so the controller stays put in view
    let position = headset_position + headset_orientation * local_offset(role);

    DriverPose {
        orientation: headset_orientation * offset_orientation(),
        position,
        pose_is_valid: true,
        device_is_connected: true,
        result: TrackingResult::RunningOk,
        ..DriverPose::default()
    }
}
