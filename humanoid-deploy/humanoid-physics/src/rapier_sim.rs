use std::collections::HashMap;
use std::path::Path;

use nalgebra as na;
use rapier3d::prelude::*;

use crate::urdf::{ActuatedJoint, UrdfLoader};
use crate::world::PhysicsWorld;
use crate::{BasePose, BaseTwist, BodyId, PhysicsError, Simulator};

/// Options for building a [`RapierSim`].
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Physics timestep in seconds.
    pub dt: f32,
    /// Initial height of the root link above the ground.
    pub base_height: f32,
    /// Actuated joints in actuation order. `None` uses URDF document order.
    pub joint_names: Option<Vec<String>>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            dt: 0.002,
            base_height: 1.0,
            joint_names: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct BodyState {
    position: Isometry<f32>,
    linvel: Vector<f32>,
    angvel: Vector<f32>,
}

/// Full kinematic state of every body, as captured by [`Simulator::snapshot`].
#[derive(Clone, Debug, PartialEq)]
pub struct RapierSnapshot {
    bodies: Vec<BodyState>,
}

/// Floating-base robot on a flat ground, torque-driven at its revolute joints.
pub struct RapierSim {
    world: PhysicsWorld,
    root: RigidBodyHandle,
    bodies: Vec<(String, RigidBodyHandle)>,
    joints: Vec<ActuatedJoint>,
    torques: Vec<f32>,
    external_forces: HashMap<BodyId, [f32; 3]>,
}

impl RapierSim {
    pub fn from_urdf(urdf: &str, options: &SimOptions) -> Result<Self, PhysicsError> {
        let mut world = PhysicsWorld::new(options.dt);
        world.add_ground();

        let model = UrdfLoader::load_robot(
            &mut world,
            urdf,
            options.base_height,
            options.joint_names.as_deref(),
        )?;

        log::info!(
            "Loaded robot: {} bodies, {} actuated joints",
            model.bodies.len(),
            model.joints.len()
        );

        Ok(Self {
            torques: vec![0.0; model.joints.len()],
            world,
            root: model.root,
            bodies: model.bodies,
            joints: model.joints,
            external_forces: HashMap::new(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, options: &SimOptions) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let urdf = std::fs::read_to_string(path).map_err(|source| PhysicsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_urdf(&urdf, options)
    }

    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.name.as_str())
    }

    fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.world.rigid_body_set.get(handle)
    }

    /// Joint frame orientation in the world, from the parent side.
    fn joint_frame(&self, joint: &ActuatedJoint) -> Option<na::UnitQuaternion<f32>> {
        self.body(joint.parent)
            .map(|parent| parent.position().rotation * joint.origin_rotation)
    }

    fn joint_axis_world(&self, joint: &ActuatedJoint) -> Option<Vector<f32>> {
        self.joint_frame(joint).map(|frame| frame * joint.axis.into_inner())
    }
}

impl Simulator for RapierSim {
    type Snapshot = RapierSnapshot;

    fn timestep(&self) -> f32 {
        self.world.integration_parameters.dt
    }

    fn num_joints(&self) -> usize {
        self.joints.len()
    }

    fn joint_positions(&self) -> Vec<f32> {
        self.joints
            .iter()
            .map(|joint| {
                let (Some(frame), Some(child)) = (self.joint_frame(joint), self.body(joint.child))
                else {
                    return 0.0;
                };
                let relative = frame.inverse() * child.position().rotation;
                relative.scaled_axis().dot(&joint.axis.into_inner())
            })
            .collect()
    }

    fn joint_velocities(&self) -> Vec<f32> {
        self.joints
            .iter()
            .map(|joint| {
                let (Some(axis), Some(parent), Some(child)) = (
                    self.joint_axis_world(joint),
                    self.body(joint.parent),
                    self.body(joint.child),
                ) else {
                    return 0.0;
                };
                (child.angvel() - parent.angvel()).dot(&axis)
            })
            .collect()
    }

    fn base_pose(&self) -> BasePose {
        let Some(root) = self.body(self.root) else {
            return BasePose::default();
        };
        let t = root.translation();
        let q = root.rotation();
        BasePose {
            position: [t.x, t.y, t.z],
            orientation: [q.w, q.i, q.j, q.k],
        }
    }

    fn base_twist(&self) -> BaseTwist {
        let Some(root) = self.body(self.root) else {
            return BaseTwist::default();
        };
        let v = root.linvel();
        let w = root.angvel();
        BaseTwist {
            linear: [v.x, v.y, v.z],
            angular: [w.x, w.y, w.z],
        }
    }

    fn base_body(&self) -> BodyId {
        let index = self
            .bodies
            .iter()
            .position(|(_, handle)| *handle == self.root)
            .unwrap_or(0);
        BodyId(index)
    }

    fn body_id(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().position(|(n, _)| n == name).map(BodyId)
    }

    fn body_position(&self, body: BodyId) -> Option<[f32; 3]> {
        let (_, handle) = self.bodies.get(body.0)?;
        let t = self.body(*handle)?.translation();
        Some([t.x, t.y, t.z])
    }

    fn set_joint_torques(&mut self, torques: &[f32]) {
        if torques.len() != self.torques.len() {
            log::warn!(
                "Expected {} joint torques, got {}",
                self.torques.len(),
                torques.len()
            );
        }
        for (slot, tau) in self.torques.iter_mut().zip(torques) {
            *slot = *tau;
        }
    }

    fn set_external_force(&mut self, body: BodyId, force: [f32; 3]) {
        if body.0 < self.bodies.len() {
            self.external_forces.insert(body, force);
        }
    }

    fn clear_external_forces(&mut self) {
        self.external_forces.clear();
    }

    fn step(&mut self) {
        for (_, body) in self.world.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }

        for (joint, &tau) in self.joints.iter().zip(&self.torques) {
            let Some(axis) = self.joint_axis_world(joint) else {
                continue;
            };
            let tau = match joint.effort_limit {
                Some(limit) => tau.clamp(-limit, limit),
                None => tau,
            };
            if let Some(child) = self.world.rigid_body_set.get_mut(joint.child) {
                child.add_torque(axis * tau, true);
            }
            if let Some(parent) = self.world.rigid_body_set.get_mut(joint.parent) {
                parent.add_torque(-axis * tau, true);
            }
        }

        for (body, force) in &self.external_forces {
            let Some((_, handle)) = self.bodies.get(body.0) else {
                continue;
            };
            if let Some(rb) = self.world.rigid_body_set.get_mut(*handle) {
                rb.add_force(vector![force[0], force[1], force[2]], true);
            }
        }

        self.world.step();
    }

    fn snapshot(&self) -> RapierSnapshot {
        let bodies = self
            .bodies
            .iter()
            .filter_map(|(_, handle)| self.body(*handle))
            .map(|rb| BodyState {
                position: *rb.position(),
                linvel: *rb.linvel(),
                angvel: *rb.angvel(),
            })
            .collect();
        RapierSnapshot { bodies }
    }

    fn restore(&mut self, snapshot: &RapierSnapshot) {
        for ((_, handle), state) in self.bodies.iter().zip(&snapshot.bodies) {
            if let Some(rb) = self.world.rigid_body_set.get_mut(*handle) {
                rb.set_position(state.position, true);
                rb.set_linvel(state.linvel, true);
                rb.set_angvel(state.angvel, true);
            }
        }
    }
}
