use humanoid_physics::PhysicsError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::input::InputError;
use crate::policy::PolicyError;
use crate::viewer::ViewerError;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Viewer(#[from] ViewerError),
    #[error("simulator has {got} actuated joints, config expects {expected}")]
    JointCount { got: usize, expected: usize },
}
