//! Physics collaborator for the humanoid deployment harness.
//!
//! The control loop only talks to the [`Simulator`] trait. [`RapierSim`] is the
//! Rapier3D implementation, built from a URDF robot description with a free
//! floating base in a Z-up world.

mod rapier_sim;
mod urdf;
mod world;

use std::path::PathBuf;

use thiserror::Error;

pub use rapier_sim::{RapierSim, RapierSnapshot, SimOptions};

/// Index of a rigid body inside a simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyId(pub usize);

/// Floating-base pose in the world frame.
///
/// `orientation` is a unit quaternion stored as `[w, x, y, z]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BasePose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for BasePose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Floating-base twist. Both vectors are expressed in the world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BaseTwist {
    pub linear: [f32; 3],
    pub angular: [f32; 3],
}

#[derive(Error, Debug)]
pub enum PhysicsError {
    #[error("failed to read robot description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse URDF: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("robot description has no root link")]
    NoRoot,
    #[error("robot description has no actuated joints")]
    NoJoints,
    #[error("joint `{0}` is not an actuated joint of the robot description")]
    UnknownJoint(String),
}

/// Rigid-body simulator as seen by the control loop.
///
/// One call to [`Simulator::step`] advances the world by [`Simulator::timestep`]
/// using the joint torques and external forces set since the previous step.
pub trait Simulator {
    type Snapshot: Clone + PartialEq + std::fmt::Debug;

    fn timestep(&self) -> f32;

    /// Number of actuated joints, which is also the torque array length.
    fn num_joints(&self) -> usize;

    fn joint_positions(&self) -> Vec<f32>;

    fn joint_velocities(&self) -> Vec<f32>;

    fn base_pose(&self) -> BasePose;

    fn base_twist(&self) -> BaseTwist;

    fn base_body(&self) -> BodyId;

    fn body_id(&self, name: &str) -> Option<BodyId>;

    fn body_position(&self, body: BodyId) -> Option<[f32; 3]>;

    /// Sets the torques held for the following steps, in actuation order.
    fn set_joint_torques(&mut self, torques: &[f32]);

    /// Sets a world-frame force applied to `body` at its center of mass on
    /// every following step, replacing any previous force on that body.
    fn set_external_force(&mut self, body: BodyId, force: [f32; 3]);

    fn clear_external_forces(&mut self);

    fn step(&mut self);

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: &Self::Snapshot);
}
