//! In-crate doubles for the simulator and the inference runtime.

use std::collections::{HashMap, VecDeque};

use humanoid_physics::{BasePose, BaseTwist, BodyId, Simulator};

use crate::input::{InputFrame, OperatorEvent};
use crate::policy::{PolicyBackend, PolicyError, RecurrentState, Stage, StageOutput};

const BODIES: [&str; 2] = ["pelvis_link", "torso_link"];
const BASE_MASS: f32 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct MockState {
    pub q: Vec<f32>,
    pub dq: Vec<f32>,
    pub pose: BasePose,
    pub twist: BaseTwist,
}

/// Unit-inertia joints and a point-mass base, integrated with explicit Euler.
pub struct MockSim {
    pub state: MockState,
    pub torques: Vec<f32>,
    pub forces: HashMap<BodyId, [f32; 3]>,
    pub steps: usize,
    dt: f32,
}

impl MockSim {
    pub fn new(num_joints: usize, dt: f32) -> Self {
        Self {
            state: MockState {
                q: vec![0.0; num_joints],
                dq: vec![0.0; num_joints],
                pose: BasePose {
                    position: [0.0, 0.0, 1.0],
                    ..BasePose::default()
                },
                twist: BaseTwist::default(),
            },
            torques: vec![0.0; num_joints],
            forces: HashMap::new(),
            steps: 0,
            dt,
        }
    }
}

impl Simulator for MockSim {
    type Snapshot = MockState;

    fn timestep(&self) -> f32 {
        self.dt
    }

    fn num_joints(&self) -> usize {
        self.state.q.len()
    }

    fn joint_positions(&self) -> Vec<f32> {
        self.state.q.clone()
    }

    fn joint_velocities(&self) -> Vec<f32> {
        self.state.dq.clone()
    }

    fn base_pose(&self) -> BasePose {
        self.state.pose
    }

    fn base_twist(&self) -> BaseTwist {
        self.state.twist
    }

    fn base_body(&self) -> BodyId {
        BodyId(0)
    }

    fn body_id(&self, name: &str) -> Option<BodyId> {
        BODIES.iter().position(|b| *b == name).map(BodyId)
    }

    fn body_position(&self, body: BodyId) -> Option<[f32; 3]> {
        (body.0 < BODIES.len()).then_some(self.state.pose.position)
    }

    fn set_joint_torques(&mut self, torques: &[f32]) {
        self.torques = torques.to_vec();
    }

    fn set_external_force(&mut self, body: BodyId, force: [f32; 3]) {
        self.forces.insert(body, force);
    }

    fn clear_external_forces(&mut self) {
        self.forces.clear();
    }

    fn step(&mut self) {
        let dt = self.dt;
        let s = &mut self.state;
        for ((q, dq), tau) in s.q.iter_mut().zip(s.dq.iter_mut()).zip(&self.torques) {
            *dq += tau * dt;
            *q += *dq * dt;
        }
        for force in self.forces.values() {
            for i in 0..3 {
                s.twist.linear[i] += force[i] / BASE_MASS * dt;
            }
        }
        for i in 0..3 {
            s.pose.position[i] += s.twist.linear[i] * dt;
        }
        self.steps += 1;
    }

    fn snapshot(&self) -> MockState {
        self.state.clone()
    }

    fn restore(&mut self, snapshot: &MockState) {
        self.state = snapshot.clone();
    }
}

#[derive(Clone, Debug)]
pub struct BackendCall {
    pub stage: Stage,
    pub obs: Vec<f32>,
    pub latent: Option<Vec<f32>>,
    pub state_in: RecurrentState,
    pub output: Vec<f32>,
}

/// Records every call and returns fixed non-zero outputs. Each call adds one
/// to every element of the incoming state.
pub struct MockBackend {
    action_len: usize,
    pub calls: Vec<BackendCall>,
    pub fail_actor: bool,
}

impl MockBackend {
    pub const LATENT: [f32; 2] = [0.5, -0.5];

    pub fn new(action_len: usize) -> Self {
        Self {
            action_len,
            calls: Vec::new(),
            fail_actor: false,
        }
    }

    fn bump(state: &RecurrentState) -> RecurrentState {
        RecurrentState {
            hidden: state.hidden.iter().map(|v| v + 1.0).collect(),
            cell: state.cell.iter().map(|v| v + 1.0).collect(),
        }
    }
}

impl PolicyBackend for MockBackend {
    fn encode(&mut self, obs: &[f32], state: &RecurrentState) -> Result<StageOutput, PolicyError> {
        let output = Self::LATENT.to_vec();
        self.calls.push(BackendCall {
            stage: Stage::Encoder,
            obs: obs.to_vec(),
            latent: None,
            state_in: state.clone(),
            output: output.clone(),
        });
        Ok(StageOutput {
            output,
            state: Self::bump(state),
        })
    }

    fn act(
        &mut self,
        obs: &[f32],
        latent: &[f32],
        state: &RecurrentState,
    ) -> Result<StageOutput, PolicyError> {
        if self.fail_actor {
            return Err(PolicyError::Inference {
                stage: Stage::Actor,
                message: "mock failure".to_string(),
            });
        }
        let output: Vec<f32> = (1..=self.action_len).map(|i| 0.1 * i as f32).collect();
        self.calls.push(BackendCall {
            stage: Stage::Actor,
            obs: obs.to_vec(),
            latent: Some(latent.to_vec()),
            state_in: state.clone(),
            output: output.clone(),
        });
        Ok(StageOutput {
            output,
            state: Self::bump(state),
        })
    }
}

/// Replays queued events, one batch per poll, while holding a fixed
/// disturbance stick.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    pub events: VecDeque<Vec<OperatorEvent>>,
    pub stick: [f32; 2],
}

impl ScriptedInput {
    pub fn holding(stick: [f32; 2]) -> Self {
        Self {
            stick,
            ..Self::default()
        }
    }

    pub fn poll(&mut self) -> InputFrame {
        InputFrame {
            events: self.events.pop_front().unwrap_or_default(),
            disturbance: self.stick,
        }
    }
}
