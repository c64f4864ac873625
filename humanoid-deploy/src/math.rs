//! Frame conversions at the physics boundary.
//!
//! Quaternions cross the boundary as `[w, x, y, z]`.

use humanoid_physics::{BasePose, BaseTwist};
use nalgebra as na;

pub fn quat_from_wxyz(q: [f32; 4]) -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(q[0], q[1], q[2], q[3]))
}

/// Rotates a world-frame vector into the body frame (`Rᵀ·v`).
pub fn world_to_body(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let r = quat_from_wxyz(q);
    r.inverse_transform_vector(&na::Vector3::from(v)).into()
}

/// Rotates a body-frame vector into the world frame (`R·v`).
pub fn body_to_world(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let r = quat_from_wxyz(q);
    r.transform_vector(&na::Vector3::from(v)).into()
}

/// Unit gravity direction expressed in the body frame.
pub fn projected_gravity(q: [f32; 4]) -> [f32; 3] {
    let [w, x, y, z] = q;
    [
        2.0 * (-z * x + w * y),
        -2.0 * (z * y + w * x),
        1.0 - 2.0 * (w * w + z * z),
    ]
}

/// Base velocity expressed in the body frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyVelocity {
    pub linear: [f32; 3],
    pub angular: [f32; 3],
}

impl BodyVelocity {
    pub fn from_world(pose: &BasePose, twist: &BaseTwist) -> Self {
        Self {
            linear: world_to_body(pose.orientation, twist.linear),
            angular: world_to_body(pose.orientation, twist.angular),
        }
    }

    /// `[vx, vy, wz]`, the components tracked by the velocity command.
    pub fn planar(&self) -> [f32; 3] {
        [self.linear[0], self.linear[1], self.angular[2]]
    }
}
