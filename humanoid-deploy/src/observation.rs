//! Observation vector construction.
//!
//! Layout for `n` actuated joints:
//!
//! | slice              | content                                   |
//! |--------------------|-------------------------------------------|
//! | `0..3`             | body angular velocity × `ang_vel_scale`   |
//! | `3..6`             | gravity direction in the body frame       |
//! | `6..9`             | command × `cmd_scale`                     |
//! | `9..9+n`           | `(q - default_angles) × dof_pos_scale`    |
//! | `9+n..9+2n`        | `dq × dof_vel_scale`                      |
//! | `9+2n..9+3n`       | previous action                           |
//! | `9+3n..9+3n+2`     | `sin 2πφ, cos 2πφ` (phase-conditioned only)|
//!
//! Slots past the layout stay zero.

use crate::gait::phase_encoding;
use crate::math::projected_gravity;

/// Number of leading slots before the per-joint blocks.
pub const HEADER_LEN: usize = 9;

/// Minimum base observation length for `num_actions` joints.
pub const fn layout_len(num_actions: usize) -> usize {
    HEADER_LEN + 3 * num_actions
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationScales {
    pub ang_vel: f32,
    pub dof_pos: f32,
    pub dof_vel: f32,
    pub cmd: [f32; 3],
}

/// Robot and operator state sampled on a control tick.
#[derive(Clone, Copy, Debug)]
pub struct ObservationInput<'a> {
    /// Base angular velocity in the body frame.
    pub angular_velocity: [f32; 3],
    /// Base orientation `[w, x, y, z]`.
    pub orientation: [f32; 4],
    pub command: [f32; 3],
    pub joint_positions: &'a [f32],
    pub joint_velocities: &'a [f32],
    pub previous_action: &'a [f32],
    pub phase: f32,
}

#[derive(Clone, Debug)]
pub struct ObservationBuilder {
    num_actions: usize,
    len: usize,
    include_phase: bool,
    scales: ObservationScales,
    default_angles: Vec<f32>,
}

impl ObservationBuilder {
    /// `num_obs` is the base length; phase-conditioned policies get two more slots.
    pub fn new(
        num_obs: usize,
        include_phase: bool,
        scales: ObservationScales,
        default_angles: Vec<f32>,
    ) -> Self {
        Self {
            num_actions: default_angles.len(),
            len: if include_phase { num_obs + 2 } else { num_obs },
            include_phase,
            scales,
            default_angles,
        }
    }

    /// Total observation length fed to the policy.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn build(&self, input: &ObservationInput) -> Vec<f32> {
        let n = self.num_actions;
        let s = &self.scales;
        let mut obs = vec![0.0; self.len.max(layout_len(n) + if self.include_phase { 2 } else { 0 })];

        write(&mut obs[0..3], input.angular_velocity.iter().map(|w| w * s.ang_vel));
        write(&mut obs[3..6], projected_gravity(input.orientation));
        write(
            &mut obs[6..9],
            input.command.iter().zip(&s.cmd).map(|(c, scale)| c * scale),
        );

        let joints = HEADER_LEN;
        write(
            &mut obs[joints..joints + n],
            input
                .joint_positions
                .iter()
                .zip(&self.default_angles)
                .map(|(q, q0)| (q - q0) * s.dof_pos),
        );
        write(
            &mut obs[joints + n..joints + 2 * n],
            input.joint_velocities.iter().map(|dq| dq * s.dof_vel),
        );
        write(
            &mut obs[joints + 2 * n..joints + 3 * n],
            input.previous_action.iter().copied(),
        );

        if self.include_phase {
            let at = layout_len(n);
            obs[at..at + 2].copy_from_slice(&phase_encoding(input.phase));
        }

        obs.truncate(self.len);
        obs
    }
}

fn write(dst: &mut [f32], src: impl IntoIterator<Item = f32>) {
    for (slot, value) in dst.iter_mut().zip(src) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const N: usize = 21;

    fn scales() -> ObservationScales {
        ObservationScales {
            ang_vel: 0.25,
            dof_pos: 1.0,
            dof_vel: 0.05,
            cmd: [2.0, 2.0, 0.25],
        }
    }

    fn sample() -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) {
        let default_angles: Vec<f32> = (0..N).map(|i| i as f32 * 0.01).collect();
        let q: Vec<f32> = (0..N).map(|i| i as f32 * 0.01 + 0.1).collect();
        let dq: Vec<f32> = (0..N).map(|i| i as f32).collect();
        let action: Vec<f32> = (0..N).map(|i| -(i as f32)).collect();
        (default_angles, q, dq, action)
    }

    #[test]
    fn test_layout_for_21_joints() {
        let (default_angles, q, dq, action) = sample();
        let builder = ObservationBuilder::new(72, false, scales(), default_angles);
        let obs = builder.build(&ObservationInput {
            angular_velocity: [4.0, -4.0, 8.0],
            orientation: [1.0, 0.0, 0.0, 0.0],
            command: [0.5, -0.25, 1.0],
            joint_positions: &q,
            joint_velocities: &dq,
            previous_action: &action,
            phase: 0.3,
        });

        assert_eq!(obs.len(), 72);
        assert_eq!(&obs[0..3], &[1.0, -1.0, 2.0]);
        assert_eq!(&obs[3..6], &[0.0, 0.0, -1.0]);
        assert_eq!(&obs[6..9], &[1.0, -0.5, 0.25]);
        for i in 0..N {
            assert_relative_eq!(obs[9 + i], 0.1, epsilon = 1e-6);
            assert_relative_eq!(obs[9 + N + i], i as f32 * 0.05);
            assert_eq!(obs[9 + 2 * N + i], -(i as f32));
        }
    }

    #[test]
    fn test_phase_slots_follow_action_block() {
        let (default_angles, q, dq, action) = sample();
        let builder = ObservationBuilder::new(72, true, scales(), default_angles);
        assert_eq!(builder.len(), 74);

        let obs = builder.build(&ObservationInput {
            angular_velocity: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
            command: [0.0; 3],
            joint_positions: &q,
            joint_velocities: &dq,
            previous_action: &action,
            phase: 0.25,
        });
        assert_eq!(obs.len(), 74);
        assert_relative_eq!(obs[72], 1.0, epsilon = 1e-6);
        assert_relative_eq!(obs[73], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_extra_slots_stay_zero() {
        let builder = ObservationBuilder::new(20, false, scales(), vec![0.0; 2]);
        let obs = builder.build(&ObservationInput {
            angular_velocity: [1.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
            command: [1.0; 3],
            joint_positions: &[1.0, 1.0],
            joint_velocities: &[1.0, 1.0],
            previous_action: &[1.0, 1.0],
            phase: 0.0,
        });
        assert_eq!(obs.len(), 20);
        assert!(obs[layout_len(2)..].iter().all(|v| *v == 0.0));
    }
}
