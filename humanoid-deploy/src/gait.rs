//! Gait phase clock fed to phase-conditioned policies.

use nalgebra as na;

/// Gait period while walking (s).
pub const WALK_PERIOD: f32 = 0.8;
/// Gait period for fast forward commands (s).
pub const RUN_PERIOD: f32 = 0.7;
/// Forward command above which the faster cadence is used (m/s).
pub const RUN_COMMAND_THRESHOLD: f32 = 1.1;

const TWIST_THRESHOLD: f32 = 0.2;
const COMMAND_THRESHOLD: f32 = 0.1;
const SNAP_THRESHOLD: f32 = 1e-3;

/// Moving or asked to move.
pub fn is_locomoting(planar_twist: [f32; 3], command: [f32; 3]) -> bool {
    na::Vector3::from(planar_twist).norm() > TWIST_THRESHOLD
        || na::Vector3::from(command).norm() > COMMAND_THRESHOLD
}

pub fn gait_period(command: [f32; 3]) -> f32 {
    if command[0].abs() > RUN_COMMAND_THRESHOLD {
        RUN_PERIOD
    } else {
        WALK_PERIOD
    }
}

/// Scalar phase in [0, 1).
#[derive(Clone, Debug, Default)]
pub struct PhaseTracker {
    phase: f32,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advances the phase by one control tick of length `tick_period`.
    ///
    /// `planar_twist` is the measured body-frame `[vx, vy, wz]`. While
    /// stationary the phase decays toward zero instead of advancing.
    pub fn update(&mut self, tick_period: f32, planar_twist: [f32; 3], command: [f32; 3]) -> f32 {
        if is_locomoting(planar_twist, command) {
            self.phase = (self.phase + tick_period / gait_period(command)).rem_euclid(1.0);
        } else {
            self.phase *= 0.5;
            if self.phase < SNAP_THRESHOLD {
                self.phase = 0.0;
            }
        }
        self.phase
    }
}

/// `(sin 2πφ, cos 2πφ)`, the observation slots of a phase-conditioned policy.
pub fn phase_encoding(phase: f32) -> [f32; 2] {
    let angle = std::f32::consts::TAU * phase;
    [angle.sin(), angle.cos()]
}
