//! Operator-driven push force on one body, active only in DISTURBANCE mode.

use humanoid_physics::{BodyId, Simulator};

use crate::command::Mode;
use crate::math::body_to_world;

/// Planar base-frame force from the disturbance stick `[forward, lateral]`.
///
/// The stick magnitude is capped at 1, so the force never exceeds `scale`.
pub fn disturbance_force(stick: [f32; 2], scale: f32) -> [f32; 3] {
    let magnitude = (stick[0] * stick[0] + stick[1] * stick[1]).sqrt();
    if magnitude <= f32::EPSILON {
        return [0.0; 3];
    }
    let gain = magnitude.min(1.0) / magnitude * scale;
    [stick[0] * gain, stick[1] * gain, 0.0]
}

pub struct Disturbance {
    body: BodyId,
    body_name: String,
    scale: f32,
    /// Base-frame force currently requested.
    force: [f32; 3],
}

impl Disturbance {
    /// Resolves `body_name`, falling back to the floating base.
    pub fn new<S: Simulator>(sim: &S, body_name: &str, scale: f32) -> Self {
        let (body, body_name) = match sim.body_id(body_name) {
            Some(id) => (id, body_name.to_string()),
            None => {
                log::warn!("Disturbance body `{}` not found, using the base body", body_name);
                (sim.base_body(), "base".to_string())
            }
        };
        Self {
            body,
            body_name,
            scale,
            force: [0.0; 3],
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn body_name(&self) -> &str {
        &self.body_name
    }

    pub fn force(&self) -> [f32; 3] {
        self.force
    }

    pub fn magnitude(&self) -> f32 {
        self.force.iter().map(|f| f * f).sum::<f32>().sqrt()
    }

    /// Updates the requested force; anything but DISTURBANCE mode zeroes it.
    pub fn update(&mut self, mode: Mode, stick: [f32; 2]) {
        self.force = match mode {
            Mode::Disturbance => disturbance_force(stick, self.scale),
            _ => [0.0; 3],
        };
    }

    pub fn clear(&mut self) {
        self.force = [0.0; 3];
    }

    /// Writes the force, rotated into the world frame, for the next step.
    pub fn apply<S: Simulator>(&self, sim: &mut S) {
        let orientation = sim.base_pose().orientation;
        sim.set_external_force(self.body, body_to_world(orientation, self.force));
    }
}
