use std::path::{Path, PathBuf};

use tract_onnx::prelude::*;

use super::{PolicyBackend, PolicyError, RecurrentState, Stage, StageOutput};

pub const ENCODER_FILE: &str = "HumanEncodernet.onnx";
pub const ACTOR_FILE: &str = "HumanActornet.onnx";

const ENCODER_INPUTS: [&str; 3] = ["obs", "h0", "c0"];
const ACTOR_INPUTS: [&str; 4] = ["obs", "latent", "h0", "c0"];

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// One ONNX graph with its named inputs resolved to positions.
struct OnnxStage {
    stage: Stage,
    plan: Plan,
    /// `slots[i]` is the model input position of the i-th binding.
    slots: Vec<usize>,
    hidden_size: usize,
}

impl OnnxStage {
    fn load(
        stage: Stage,
        path: &Path,
        bindings: &[&'static str],
        shapes: &[(&'static str, TVec<usize>)],
        hidden_size: usize,
    ) -> Result<Self, PolicyError> {
        let load_err = |e: TractError| PolicyError::Load {
            stage,
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        log::info!("Loading {} model from {}", stage, path.display());
        let mut model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;

        let input_names: Vec<String> = model
            .input_outlets()
            .map_err(load_err)?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();

        let slots = bindings
            .iter()
            .map(|&name| {
                input_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or(PolicyError::MissingInput { stage, name })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if input_names.len() != bindings.len() {
            return Err(PolicyError::Signature {
                stage,
                message: format!("expected inputs {:?}, model has {:?}", bindings, input_names),
            });
        }

        for (name, shape) in shapes {
            if let Some(slot) = input_names.iter().position(|n| n == name) {
                model
                    .set_input_fact(slot, InferenceFact::dt_shape(f32::datum_type(), shape.clone()))
                    .map_err(load_err)?;
            }
        }

        let plan = model
            .into_optimized()
            .and_then(|m| m.into_runnable())
            .map_err(load_err)?;

        if plan.model().outputs.len() < 3 {
            return Err(PolicyError::Signature {
                stage,
                message: format!(
                    "expected 3 outputs (output, h, c), model has {}",
                    plan.model().outputs.len()
                ),
            });
        }

        Ok(Self {
            stage,
            plan,
            slots,
            hidden_size,
        })
    }

    /// Flattened length of the first output, when the graph fixes it.
    fn output_len(&self) -> Option<usize> {
        let fact = self.plan.model().output_fact(0).ok()?;
        fact.shape.as_concrete().map(|dims| dims.iter().product())
    }

    fn run(&self, values: &[&[f32]], state: &RecurrentState) -> Result<StageOutput, PolicyError> {
        let infer_err = |e: TractError| PolicyError::Inference {
            stage: self.stage,
            message: e.to_string(),
        };

        // Bindings end with h0, c0; everything before them is a flat row vector.
        let mut tensors: Vec<Option<Tensor>> = vec![None; self.slots.len()];
        let rows = values
            .iter()
            .copied()
            .map(|v| Tensor::from_shape(&[1, v.len()], v));
        let lstm = [state.hidden.as_slice(), state.cell.as_slice()]
            .into_iter()
            .map(|v| Tensor::from_shape(&[1, 1, v.len()], v));
        for (slot, tensor) in self.slots.iter().zip(rows.chain(lstm)) {
            tensors[*slot] = Some(tensor.map_err(infer_err)?);
        }

        let inputs: TVec<TValue> = tensors
            .into_iter()
            .map(|t| t.map(TValue::from))
            .collect::<Option<_>>()
            .ok_or_else(|| PolicyError::Signature {
                stage: self.stage,
                message: "unbound model input".to_string(),
            })?;

        let result = self.plan.run(inputs).map_err(infer_err)?;
        let flat = |i: usize| -> Result<Vec<f32>, PolicyError> {
            Ok(result[i].as_slice::<f32>().map_err(infer_err)?.to_vec())
        };

        let output = StageOutput {
            output: flat(0)?,
            state: RecurrentState {
                hidden: flat(1)?,
                cell: flat(2)?,
            },
        };
        if output.state.hidden.len() != self.hidden_size {
            return Err(PolicyError::Shape {
                stage: self.stage,
                what: "hidden state",
                got: output.state.hidden.len(),
                expected: self.hidden_size,
            });
        }
        Ok(output)
    }
}

/// Encoder and actor graphs run through tract.
pub struct OnnxBackend {
    encoder: OnnxStage,
    actor: OnnxStage,
}

impl OnnxBackend {
    /// Loads `HumanEncodernet.onnx` and `HumanActornet.onnx` from `policy_dir`.
    pub fn load(
        policy_dir: &Path,
        obs_len: usize,
        encoder_hidden: usize,
        actor_hidden: usize,
    ) -> Result<Self, PolicyError> {
        let encoder_path = policy_dir.join(ENCODER_FILE);
        let actor_path = policy_dir.join(ACTOR_FILE);
        for (stage, path) in [(Stage::Encoder, &encoder_path), (Stage::Actor, &actor_path)] {
            if !path.is_file() {
                return Err(missing(stage, path));
            }
        }

        let encoder = OnnxStage::load(
            Stage::Encoder,
            &encoder_path,
            &ENCODER_INPUTS,
            &[
                ("obs", tvec![1, obs_len]),
                ("h0", tvec![1, 1, encoder_hidden]),
                ("c0", tvec![1, 1, encoder_hidden]),
            ],
            encoder_hidden,
        )?;

        let mut actor_shapes = vec![
            ("obs", tvec![1, obs_len]),
            ("h0", tvec![1, 1, actor_hidden]),
            ("c0", tvec![1, 1, actor_hidden]),
        ];
        if let Some(latent_len) = encoder.output_len() {
            log::info!("Encoder latent size: {}", latent_len);
            actor_shapes.push(("latent", tvec![1, latent_len]));
        }
        let actor = OnnxStage::load(
            Stage::Actor,
            &actor_path,
            &ACTOR_INPUTS,
            &actor_shapes,
            actor_hidden,
        )?;

        Ok(Self { encoder, actor })
    }
}

fn missing(stage: Stage, path: &Path) -> PolicyError {
    PolicyError::Load {
        stage,
        path: PathBuf::from(path),
        message: "file not found".to_string(),
    }
}

impl PolicyBackend for OnnxBackend {
    fn encode(&mut self, obs: &[f32], state: &RecurrentState) -> Result<StageOutput, PolicyError> {
        self.encoder.run(&[obs], state)
    }

    fn act(
        &mut self,
        obs: &[f32],
        latent: &[f32],
        state: &RecurrentState,
    ) -> Result<StageOutput, PolicyError> {
        self.actor.run(&[obs, latent], state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifacts_fail_before_parsing() {
        let dir = std::env::temp_dir().join("humanoid-deploy-no-policy");
        let err = OnnxBackend::load(&dir, 72, 256, 64).err().unwrap();
        match err {
            PolicyError::Load { stage, path, .. } => {
                assert_eq!(stage, Stage::Encoder);
                assert!(path.ends_with(ENCODER_FILE));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bindings_end_with_lstm_state() {
        assert_eq!(&ENCODER_INPUTS[1..], &["h0", "c0"]);
        assert_eq!(&ACTOR_INPUTS[2..], &["h0", "c0"]);
    }
}
