use super::{PolicyBackend, PolicyError, RecurrentState, Stage, StageOutput};

/// Runs encoder then actor once per control tick, threading each stage's
/// recurrent state from one tick to the next.
///
/// New states are committed only when both stages succeed, so a failed tick
/// leaves the policy exactly as it was.
pub struct RecurrentPolicy<B> {
    backend: B,
    encoder_state: RecurrentState,
    actor_state: RecurrentState,
    num_actions: usize,
}

impl<B: PolicyBackend> RecurrentPolicy<B> {
    pub fn new(backend: B, encoder_hidden: usize, actor_hidden: usize, num_actions: usize) -> Self {
        Self {
            backend,
            encoder_state: RecurrentState::zeros(encoder_hidden),
            actor_state: RecurrentState::zeros(actor_hidden),
            num_actions,
        }
    }

    pub fn encoder_state(&self) -> &RecurrentState {
        &self.encoder_state
    }

    pub fn actor_state(&self) -> &RecurrentState {
        &self.actor_state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn reset(&mut self) {
        self.encoder_state.reset();
        self.actor_state.reset();
    }

    /// Runs one inference pass and returns the raw action.
    pub fn step(&mut self, obs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        let (action, encoder_state, actor_state) = self.infer(obs)?;
        self.encoder_state = encoder_state;
        self.actor_state = actor_state;
        Ok(action)
    }

    /// Runs one pass on a zero observation without touching the carried
    /// state, to surface signature problems before the loop starts.
    pub fn preflight(&mut self, obs_len: usize) -> Result<(), PolicyError> {
        let action = self.infer(&vec![0.0; obs_len])?.0;
        log::info!(
            "Policy preflight ok: obs={}, action={}, encoder state={}, actor state={}",
            obs_len,
            action.len(),
            self.encoder_state.size(),
            self.actor_state.size()
        );
        Ok(())
    }

    fn infer(&mut self, obs: &[f32]) -> Result<(Vec<f32>, RecurrentState, RecurrentState), PolicyError> {
        let encoded = self.backend.encode(obs, &self.encoder_state)?;
        check_state(Stage::Encoder, &encoded, self.encoder_state.size())?;

        let acted = self.backend.act(obs, &encoded.output, &self.actor_state)?;
        check_state(Stage::Actor, &acted, self.actor_state.size())?;
        if acted.output.len() != self.num_actions {
            return Err(PolicyError::Shape {
                stage: Stage::Actor,
                what: "action",
                got: acted.output.len(),
                expected: self.num_actions,
            });
        }

        Ok((acted.output, encoded.state, acted.state))
    }
}

fn check_state(stage: Stage, out: &StageOutput, expected: usize) -> Result<(), PolicyError> {
    for (what, len) in [("hidden state", out.state.hidden.len()), ("cell state", out.state.cell.len())] {
        if len != expected {
            return Err(PolicyError::Shape {
                stage,
                what,
                got: len,
                expected,
            });
        }
    }
    Ok(())
}
