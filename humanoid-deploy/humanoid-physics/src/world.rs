use std::collections::HashMap;
use std::num::NonZeroUsize;

use rapier3d::prelude::*;

/// Rapier pipeline state for one robot on a flat ground plane.
pub(crate) struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub gravity: Vector<f32>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    // Map link names to RigidBodyHandles
    pub link_map: HashMap<String, RigidBodyHandle>,
}

impl PhysicsWorld {
    pub const SOLVER_ITERATIONS: usize = 8;

    pub fn new(dt: f32) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = dt;
        if let Some(iterations) = NonZeroUsize::new(Self::SOLVER_ITERATIONS) {
            integration_parameters.num_solver_iterations = iterations;
        }

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            // Z-up, like the robot descriptions the policies are trained on.
            gravity: vector![0.0, 0.0, -9.81],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            link_map: HashMap::new(),
        }
    }

    /// Ground is group 1; robot links only collide with group 1.
    pub fn add_ground(&mut self) {
        let ground_collider = ColliderBuilder::cuboid(50.0, 50.0, 0.1)
            .translation(vector![0.0, 0.0, -0.1])
            .friction(1.0)
            .collision_groups(InteractionGroups::new(Group::GROUP_1, Group::ALL))
            .build();
        self.collider_set.insert(ground_collider);
    }

    pub fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}
