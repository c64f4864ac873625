//! Policy-side half of the control loop: observation, inference and joint
//! targets, plus the PD law that turns targets into torques every physics step.

mod pd;

pub use pd::PdController;

use crate::config::DeployConfig;
use crate::gait::PhaseTracker;
use crate::math::BodyVelocity;
use crate::observation::{ObservationBuilder, ObservationInput, ObservationScales};
use crate::policy::{PolicyBackend, PolicyError, RecurrentPolicy};

/// Robot state sampled on a control tick.
#[derive(Clone, Copy, Debug)]
pub struct RobotSample<'a> {
    pub joint_positions: &'a [f32],
    pub joint_velocities: &'a [f32],
    /// Base orientation `[w, x, y, z]`.
    pub orientation: [f32; 4],
    pub velocity: BodyVelocity,
}

pub struct LocomotionController<B> {
    observations: ObservationBuilder,
    policy: RecurrentPolicy<B>,
    joints: PdController,
    phase: PhaseTracker,
    control_period: f32,
}

impl<B: PolicyBackend> LocomotionController<B> {
    pub fn new(config: &DeployConfig, backend: B) -> Self {
        let observations = ObservationBuilder::new(
            config.num_obs,
            config.include_phase_in_obs,
            ObservationScales {
                ang_vel: config.ang_vel_scale,
                dof_pos: config.dof_pos_scale,
                dof_vel: config.dof_vel_scale,
                cmd: config.cmd_scale,
            },
            config.default_angles.clone(),
        );
        Self {
            observations,
            policy: RecurrentPolicy::new(
                backend,
                config.encoder_hidden_size,
                config.actor_hidden_size,
                config.num_actions,
            ),
            joints: PdController::new(
                config.kps.clone(),
                config.kds.clone(),
                config.default_angles.clone(),
                config.action_scale,
            ),
            phase: PhaseTracker::new(),
            control_period: config.control_period(),
        }
    }

    /// Zero-observation dry run of both stages.
    pub fn preflight(&mut self) -> Result<(), PolicyError> {
        self.policy.preflight(self.observations.len())
    }

    pub fn torques(&self, q: &[f32], dq: &[f32]) -> Vec<f32> {
        self.joints.torques(q, dq)
    }

    /// One control tick: phase, observation, inference, new targets.
    pub fn update(&mut self, sample: &RobotSample, command: [f32; 3]) -> Result<(), PolicyError> {
        let phase = self
            .phase
            .update(self.control_period, sample.velocity.planar(), command);

        let obs = self.observations.build(&ObservationInput {
            angular_velocity: sample.velocity.angular,
            orientation: sample.orientation,
            command,
            joint_positions: sample.joint_positions,
            joint_velocities: sample.joint_velocities,
            previous_action: self.joints.action(),
            phase,
        });

        let action = self.policy.step(&obs)?;
        self.joints.apply_action(action);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.policy.reset();
        self.joints.reset();
        self.phase.reset();
    }

    pub fn action(&self) -> &[f32] {
        self.joints.action()
    }

    pub fn targets(&self) -> &[f32] {
        self.joints.targets()
    }

    pub fn phase(&self) -> f32 {
        self.phase.phase()
    }

    pub fn policy(&self) -> &RecurrentPolicy<B> {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_yaml;
    use crate::testing::MockBackend;

    fn controller(num_actions: usize, phase: bool) -> LocomotionController<MockBackend> {
        let mut yaml = sample_yaml(num_actions);
        if phase {
            yaml.push_str("include_phase_in_obs: true\n");
        }
        yaml.push_str("encoder_hidden_size: 4\nactor_hidden_size: 3\n");
        let config = DeployConfig::from_yaml(&yaml).unwrap();
        LocomotionController::new(&config, MockBackend::new(num_actions))
    }

    fn last_obs(ctrl: &LocomotionController<MockBackend>) -> &[f32] {
        &ctrl.policy().backend().calls.last().unwrap().obs
    }

    fn standing<'a>(q: &'a [f32], dq: &'a [f32]) -> RobotSample<'a> {
        RobotSample {
            joint_positions: q,
            joint_velocities: dq,
            orientation: [1.0, 0.0, 0.0, 0.0],
            velocity: BodyVelocity::default(),
        }
    }

    #[test]
    fn test_update_feeds_previous_action_back() {
        let mut ctrl = controller(3, false);
        let zeros = [0.0; 3];
        ctrl.update(&standing(&zeros, &zeros), [0.0; 3]).unwrap();
        for (a, expected) in ctrl.action().iter().zip([0.1, 0.2, 0.3]) {
            assert!((a - expected).abs() < 1e-6);
        }
        // previous action block sits at 9 + 2n
        assert_eq!(&last_obs(&ctrl)[15..18], &[0.0; 3]);

        ctrl.update(&standing(&zeros, &zeros), [0.0; 3]).unwrap();
        assert_eq!(&last_obs(&ctrl)[15..18], ctrl.action());
    }

    #[test]
    fn test_targets_follow_action() {
        let mut ctrl = controller(2, false);
        let zeros = [0.0; 2];
        ctrl.update(&standing(&zeros, &zeros), [0.0; 3]).unwrap();
        // action_scale 0.25, default 0
        assert!((ctrl.targets()[1] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_phase_advances_with_command() {
        let mut ctrl = controller(2, true);
        let zeros = [0.0; 2];
        ctrl.update(&standing(&zeros, &zeros), [0.5, 0.0, 0.0]).unwrap();
        assert!((ctrl.phase() - 0.02 / 0.8).abs() < 1e-6);
        assert_eq!(last_obs(&ctrl).len(), 17);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ctrl = controller(2, true);
        let zeros = [0.0; 2];
        ctrl.update(&standing(&zeros, &zeros), [0.5, 0.0, 0.0]).unwrap();
        ctrl.reset();
        assert_eq!(ctrl.action(), &[0.0, 0.0]);
        assert_eq!(ctrl.targets(), &[0.0, 0.0]);
        assert_eq!(ctrl.phase(), 0.0);
        assert!(ctrl.policy().encoder_state().is_zero());
        assert!(ctrl.policy().actor_state().is_zero());
    }

    #[test]
    fn test_failed_inference_keeps_targets() {
        let zeros = [0.0; 2];
        let mut yaml = sample_yaml(2);
        yaml.push_str("encoder_hidden_size: 4\nactor_hidden_size: 3\n");
        let config = DeployConfig::from_yaml(&yaml).unwrap();
        let mut backend = MockBackend::new(2);
        backend.fail_actor = true;
        let mut failing = LocomotionController::new(&config, backend);
        assert!(failing.update(&standing(&zeros, &zeros), [0.0; 3]).is_err());
        assert_eq!(failing.targets(), &[0.0, 0.0]);
        assert_eq!(failing.action(), &[0.0, 0.0]);
    }
}
