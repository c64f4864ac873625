//! Humanoid locomotion policy deployment - recurrent ONNX policy driving a
//! Rapier humanoid at a fixed rate, steered from a gamepad or the keyboard.

pub mod command;
pub mod config;
pub mod controller;
pub mod deploy;
pub mod disturbance;
pub mod display;
pub mod error;
pub mod gait;
pub mod input;
pub mod math;
pub mod observation;
pub mod policy;
pub mod viewer;

#[cfg(test)]
mod testing;

pub use config::DeployConfig;
pub use deploy::{Deployment, LoopState, RunSummary};
pub use error::DeployError;
