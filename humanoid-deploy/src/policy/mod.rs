//! Two-stage recurrent policy: an encoder producing a latent, followed by an
//! actor producing the action. Each stage carries its own LSTM state.

pub mod onnx;
pub mod recurrent;

use std::path::PathBuf;

use thiserror::Error;

pub use onnx::OnnxBackend;
pub use recurrent::RecurrentPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Encoder,
    Actor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Encoder => f.write_str("encoder"),
            Stage::Actor => f.write_str("actor"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to load {stage} model {path}: {message}")]
    Load {
        stage: Stage,
        path: PathBuf,
        message: String,
    },
    #[error("{stage} model has no input named `{name}`")]
    MissingInput { stage: Stage, name: &'static str },
    #[error("{stage} model: {message}")]
    Signature { stage: Stage, message: String },
    #[error("{stage} inference failed: {message}")]
    Inference { stage: Stage, message: String },
    #[error("{stage} returned {what} of length {got}, expected {expected}")]
    Shape {
        stage: Stage,
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

/// LSTM hidden and cell state for one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub hidden: Vec<f32>,
    pub cell: Vec<f32>,
}

impl RecurrentState {
    pub fn zeros(size: usize) -> Self {
        Self {
            hidden: vec![0.0; size],
            cell: vec![0.0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.hidden.len()
    }

    pub fn reset(&mut self) {
        self.hidden.fill(0.0);
        self.cell.fill(0.0);
    }

    pub fn is_zero(&self) -> bool {
        self.hidden.iter().chain(&self.cell).all(|v| *v == 0.0)
    }
}

/// Output of one inference stage: the stage output and the next state.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub output: Vec<f32>,
    pub state: RecurrentState,
}

/// Inference runtime behind the two policy stages.
///
/// Implementations are stateless with respect to the recurrent state; the
/// caller passes the current state in and decides whether to keep the new one.
pub trait PolicyBackend {
    /// `{obs, h0, c0} -> {latent, h, c}`
    fn encode(&mut self, obs: &[f32], state: &RecurrentState) -> Result<StageOutput, PolicyError>;

    /// `{obs, latent, h0, c0} -> {action, h, c}`
    fn act(
        &mut self,
        obs: &[f32],
        latent: &[f32],
        state: &RecurrentState,
    ) -> Result<StageOutput, PolicyError>;
}
