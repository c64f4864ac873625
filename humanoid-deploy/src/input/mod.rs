//! Operator input. Exactly one source is active for a run, chosen at startup.
//!
//! Both sources write the velocity command and mode straight into the
//! [`SharedCommand`]; everything else reaches the loop as [`OperatorEvent`]s.

pub mod calibration;
pub mod gamepad;
pub mod keyboard;

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;

pub use calibration::{Calibration, GamepadSetup};
pub use gamepad::{GamepadInput, GamepadSettings};
pub use keyboard::{KeyboardInput, KeyboardSettings};

use crate::command::{Mode, SharedCommand};
use crate::viewer::CameraAdjust;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("gamepad: {0}")]
    Gamepad(String),
    #[error("terminal: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("failed to load calibration {path}: {message}")]
    Calibration { path: PathBuf, message: String },
}

/// Discrete operator request, handled by the control loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperatorEvent {
    Reset,
    ModeChanged(Mode),
    ToggleTracking,
    ToggleForces,
    ToggleContacts,
    /// Keyboard camera mode switched on or off.
    CameraControl(bool),
    Camera(CameraAdjust),
    CommandCleared,
    Interrupt,
}

/// Result of one input poll.
#[derive(Clone, Debug, Default)]
pub struct InputFrame {
    pub events: Vec<OperatorEvent>,
    /// Disturbance stick `[forward, lateral]`, deadzoned.
    pub disturbance: [f32; 2],
}

pub enum InputSource {
    Disabled,
    Gamepad(Box<GamepadInput>),
    Keyboard(KeyboardInput),
    #[cfg(test)]
    Scripted(crate::testing::ScriptedInput),
}

impl InputSource {
    pub fn name(&self) -> &'static str {
        match self {
            InputSource::Disabled => "none",
            InputSource::Gamepad(_) => "gamepad",
            InputSource::Keyboard(_) => "keyboard",
            #[cfg(test)]
            InputSource::Scripted(_) => "scripted",
        }
    }

    /// `tracking` gates the gamepad D-pad camera controls.
    pub fn poll(&mut self, shared: &SharedCommand, now: Instant, tracking: bool) -> InputFrame {
        match self {
            InputSource::Disabled => InputFrame::default(),
            InputSource::Gamepad(pad) => pad.poll(shared, now, tracking),
            InputSource::Keyboard(keys) => InputFrame {
                events: keys.drain(),
                disturbance: [0.0; 2],
            },
            #[cfg(test)]
            InputSource::Scripted(script) => script.poll(),
        }
    }

    pub fn shutdown(&mut self) {
        if let InputSource::Keyboard(keys) = self {
            keys.stop();
        }
    }
}
