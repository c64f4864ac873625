//! The fixed-rate deployment loop.
//!
//! One tick is one physics step. Every `control_decimation` ticks the
//! controller samples the robot, runs the policy and moves the PD targets.
//! A reset request takes the whole next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use humanoid_physics::{BodyId, Simulator};

use crate::command::{CommandState, Mode, SharedCommand};
use crate::config::DeployConfig;
use crate::controller::{LocomotionController, RobotSample};
use crate::disturbance::Disturbance;
use crate::display::{StatusDisplay, StatusSnapshot};
use crate::error::DeployError;
use crate::input::{InputSource, OperatorEvent};
use crate::math::{body_to_world, BodyVelocity};
use crate::policy::PolicyBackend;
use crate::viewer::{ForceMarker, Viewer, ViewerCapabilities, ViewerFrame, ViewerSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Resetting,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Stepped,
    Reset,
    Stopped,
}

#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub ticks: u64,
    pub resets: u64,
    pub sim_time: f32,
    pub wall_time: Duration,
}

fn on_off(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

pub struct Deployment<S: Simulator, B: PolicyBackend, V: Viewer> {
    sim: S,
    initial: S::Snapshot,
    controller: LocomotionController<B>,
    command: SharedCommand,
    cmd_init: [f32; 3],
    input: InputSource,
    viewer: V,
    capabilities: ViewerCapabilities,
    settings: ViewerSettings,
    display: StatusDisplay,
    disturbance: Disturbance,
    tracking_body: BodyId,
    decimation: u64,
    dt: Duration,
    duration: Duration,
    counter: u64,
    ticks: u64,
    resets: u64,
    sim_time: f32,
    state: LoopState,
    viewer_failed: bool,
}

impl<S: Simulator, B: PolicyBackend, V: Viewer> Deployment<S, B, V> {
    /// Wires everything together and runs the policy preflight. The
    /// simulator's current state becomes the reset snapshot.
    pub fn new(
        config: &DeployConfig,
        sim: S,
        backend: B,
        viewer: V,
        input: InputSource,
        command: SharedCommand,
        display: StatusDisplay,
    ) -> Result<Self, DeployError> {
        if sim.num_joints() != config.num_actions {
            return Err(DeployError::JointCount {
                got: sim.num_joints(),
                expected: config.num_actions,
            });
        }

        let dt = config.physics_step()?;
        let duration = config.run_duration()?;

        let mut controller = LocomotionController::new(config, backend);
        controller.preflight()?;

        let tracking_body = sim.body_id(&config.tracking_body).unwrap_or_else(|| {
            log::warn!("Tracking body `{}` not found, tracking the base", config.tracking_body);
            sim.base_body()
        });
        let disturbance = Disturbance::new(&sim, &config.disturbance_body, config.disturbance_force_scale);

        let capabilities = viewer.capabilities();
        log::info!(
            "Viewer capabilities: camera tracking {}, contacts {}, forces {}",
            on_off(capabilities.camera_tracking),
            on_off(capabilities.contact_overlay),
            on_off(capabilities.force_overlay)
        );

        Ok(Self {
            initial: sim.snapshot(),
            sim,
            controller,
            command,
            cmd_init: config.cmd_init,
            input,
            viewer,
            capabilities,
            settings: ViewerSettings::default(),
            display,
            disturbance,
            tracking_body,
            decimation: u64::from(config.control_decimation),
            dt,
            duration,
            counter: 0,
            ticks: 0,
            resets: 0,
            sim_time: 0.0,
            state: LoopState::Running,
            viewer_failed: false,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn controller(&self) -> &LocomotionController<B> {
        &self.controller
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Runs until the duration elapses, the viewer closes, or `interrupt`
    /// is raised. Input devices are shut down on every exit path.
    pub fn run(&mut self, interrupt: &AtomicBool) -> Result<RunSummary, DeployError> {
        let start = Instant::now();
        log::info!(
            "Control loop started: dt {:?}, decimation {}, duration {:?}, input {}",
            self.dt,
            self.decimation,
            self.duration,
            self.input.name()
        );

        let result = loop {
            if start.elapsed() >= self.duration {
                log::info!("Run duration reached");
                break Ok(());
            }
            if interrupt.load(Ordering::SeqCst) {
                log::info!("Interrupted");
                break Ok(());
            }
            if !self.viewer.is_running() {
                log::info!("Viewer closed");
                break Ok(());
            }
            if self.state == LoopState::Terminated {
                break Ok(());
            }

            let tick_start = Instant::now();
            match self.tick(tick_start) {
                Ok(TickOutcome::Stepped) => {
                    if let Some(rest) = self.dt.checked_sub(tick_start.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                Ok(TickOutcome::Reset | TickOutcome::Stopped) => {}
                Err(e) => break Err(e),
            }
        };

        self.state = LoopState::Terminated;
        self.input.shutdown();
        result?;

        let summary = RunSummary {
            ticks: self.ticks,
            resets: self.resets,
            sim_time: self.sim_time,
            wall_time: start.elapsed(),
        };
        log::info!(
            "Control loop finished: {} ticks, {} resets, {:.2}s simulated in {:.2?}",
            summary.ticks,
            summary.resets,
            summary.sim_time,
            summary.wall_time
        );
        Ok(summary)
    }

    /// One loop iteration without pacing.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, DeployError> {
        if self.state == LoopState::Resetting {
            self.reset();
            let (q, dq) = (self.sim.joint_positions(), self.sim.joint_velocities());
            self.sim.set_joint_torques(&self.controller.torques(&q, &dq));
            self.step_physics();
            self.resets += 1;
            self.sync_viewer();
            return Ok(TickOutcome::Reset);
        }

        let frame = self.input.poll(&self.command, now, self.settings.track_base);
        for event in frame.events {
            self.handle(event);
        }
        if self.state == LoopState::Terminated {
            return Ok(TickOutcome::Stopped);
        }

        let CommandState { command, mode } = self.command.get();
        self.disturbance.update(mode, frame.disturbance);
        self.disturbance.apply(&mut self.sim);

        let (q, dq) = (self.sim.joint_positions(), self.sim.joint_velocities());
        self.sim.set_joint_torques(&self.controller.torques(&q, &dq));
        self.step_physics();

        self.counter += 1;
        if self.counter % self.decimation == 0 {
            let pose = self.sim.base_pose();
            let velocity = BodyVelocity::from_world(&pose, &self.sim.base_twist());
            self.refresh_display(command, mode, velocity);

            let (q, dq) = (self.sim.joint_positions(), self.sim.joint_velocities());
            self.controller.update(
                &RobotSample {
                    joint_positions: &q,
                    joint_velocities: &dq,
                    orientation: pose.orientation,
                    velocity,
                },
                command,
            )?;
        }

        self.sync_viewer();
        Ok(TickOutcome::Stepped)
    }

    /// Puts robot, policy and operator command back to their startup state.
    pub fn reset(&mut self) {
        self.sim.restore(&self.initial);
        self.sim.clear_external_forces();
        self.disturbance.clear();
        self.command.set_command(self.cmd_init);
        self.controller.reset();
        self.counter = 0;
        self.state = LoopState::Running;
        self.display.reset_filter();
        self.display.post("Robot state reset");
        log::info!("Robot state reset");
    }

    fn step_physics(&mut self) {
        self.sim.step();
        self.ticks += 1;
        self.sim_time += self.sim.timestep();
    }

    fn handle(&mut self, event: OperatorEvent) {
        match event {
            OperatorEvent::Reset => {
                self.state = LoopState::Resetting;
                self.display.post("Robot reset requested");
            }
            OperatorEvent::ModeChanged(Mode::Disturbance) => {
                let message = format!(
                    "Disturbance mode: force applied to {}",
                    self.disturbance.body_name()
                );
                log::info!("{}", message);
                self.display.post(message);
            }
            OperatorEvent::ModeChanged(mode) => {
                log::info!("Mode switched: {}", mode);
                self.display.post(format!("Mode switched: {}", mode));
            }
            OperatorEvent::ToggleTracking => {
                let on = self.settings.toggle_tracking();
                if !self.capabilities.camera_tracking {
                    log::debug!("Viewer has no camera tracking, setting kept for display only");
                }
                self.display.post(format!("Base tracking {}", on_off(on)));
            }
            OperatorEvent::ToggleForces => {
                let on = self.settings.toggle_forces();
                self.display.post(format!("Force overlay {}", on_off(on)));
            }
            OperatorEvent::ToggleContacts => {
                let on = self.settings.toggle_contacts();
                if !self.capabilities.contact_overlay {
                    log::debug!("Viewer has no contact overlay");
                }
                self.display.post(format!("Contact overlay {}", on_off(on)));
            }
            OperatorEvent::CameraControl(on) => {
                self.display.post(format!("Camera control {}", on_off(on)));
            }
            OperatorEvent::Camera(adjust) => self.settings.adjust(adjust),
            OperatorEvent::CommandCleared => self.display.post("All velocity commands cleared"),
            OperatorEvent::Interrupt => self.state = LoopState::Terminated,
        }
    }

    fn refresh_display(&mut self, command: [f32; 3], mode: Mode, velocity: BodyVelocity) {
        let status = StatusSnapshot {
            command,
            measured: velocity.planar(),
            mode,
            tracking: self.settings.track_base,
            show_forces: self.settings.show_forces,
            show_contacts: self.settings.show_contacts,
            reset_pending: self.state == LoopState::Resetting,
            camera: self.settings.camera,
            disturbance: self.disturbance.magnitude(),
        };
        if let Err(e) = self.display.render(&status) {
            log::debug!("Status display write failed: {}", e);
        }
    }

    fn sync_viewer(&mut self) {
        let base = self.sim.base_pose();
        let tracked_position = self
            .sim
            .body_position(self.tracking_body)
            .unwrap_or(base.position);
        let disturbance = (self.capabilities.force_overlay && self.disturbance.magnitude() > 0.0)
            .then(|| ForceMarker {
                origin: self
                    .sim
                    .body_position(self.disturbance.body())
                    .unwrap_or(base.position),
                force: body_to_world(base.orientation, self.disturbance.force()),
            });

        let frame = ViewerFrame {
            time: self.sim_time,
            base,
            tracked_position,
            disturbance,
            settings: &self.settings,
        };
        if let Err(e) = self.viewer.sync(&frame) {
            if !self.viewer_failed {
                log::warn!("Viewer sync failed, continuing without it: {}", e);
                self.viewer_failed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_yaml;
    use crate::policy::Stage;
    use crate::testing::{MockBackend, MockSim, ScriptedInput};
    use approx::assert_relative_eq;
    use crate::viewer::{CameraAdjust, CameraPose, HeadlessViewer};

    const N: usize = 3;

    fn config(extra: &str) -> DeployConfig {
        let yaml = sample_yaml(N) + "encoder_hidden_size: 4\nactor_hidden_size: 3\n" + extra;
        DeployConfig::from_yaml(&yaml).unwrap()
    }

    fn deployment_with(
        config: &DeployConfig,
        viewer: HeadlessViewer,
    ) -> Deployment<MockSim, MockBackend, HeadlessViewer> {
        Deployment::new(
            config,
            MockSim::new(N, config.simulation_dt),
            MockBackend::new(N),
            viewer,
            InputSource::Disabled,
            SharedCommand::new(config.cmd_init, Mode::Walk),
            StatusDisplay::hidden(),
        )
        .unwrap()
    }

    /// Yawed 90° so a body-frame push along +x lands on world +y.
    fn pushing(stick: [f32; 2]) -> Deployment<MockSim, MockBackend, HeadlessViewer> {
        let config = config("");
        let mut sim = MockSim::new(N, config.simulation_dt);
        let half = std::f32::consts::FRAC_PI_4;
        sim.state.pose.orientation = [half.cos(), 0.0, 0.0, half.sin()];
        Deployment::new(
            &config,
            sim,
            MockBackend::new(N),
            HeadlessViewer::new(),
            InputSource::Scripted(ScriptedInput::holding(stick)),
            SharedCommand::new(config.cmd_init, Mode::Disturbance),
            StatusDisplay::hidden(),
        )
        .unwrap()
    }

    fn torso_force(d: &Deployment<MockSim, MockBackend, HeadlessViewer>) -> Option<[f32; 3]> {
        let torso = d.sim().body_id("torso_link").unwrap();
        d.sim().forces.get(&torso).copied()
    }

    fn deployment() -> Deployment<MockSim, MockBackend, HeadlessViewer> {
        deployment_with(&config(""), HeadlessViewer::new())
    }

    fn tick_n(d: &mut Deployment<MockSim, MockBackend, HeadlessViewer>, n: usize) {
        for _ in 0..n {
            d.tick(Instant::now()).unwrap();
        }
    }

    #[test]
    fn test_one_decimation_period_without_input() {
        let mut d = deployment();
        // preflight already ran encoder and actor once
        assert_eq!(d.controller().policy().backend().calls.len(), 2);

        tick_n(&mut d, 9);
        assert!(d.controller().action().iter().all(|a| *a == 0.0));

        tick_n(&mut d, 1);
        assert!(d.controller().action().iter().any(|a| *a != 0.0));
        assert_eq!(d.command.command(), [0.0, 0.0, 0.0]);

        let calls = &d.controller().policy().backend().calls;
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].stage, Stage::Actor);
        assert_eq!(&calls[3].obs[6..9], &[0.0, 0.0, 0.0]);
        assert_eq!(d.sim().steps, 10);
        assert_eq!(d.viewer().frames(), 10);
    }

    #[test]
    fn test_targets_drive_torques() {
        let mut d = deployment();
        tick_n(&mut d, 10);
        let targets = d.controller().targets().to_vec();
        tick_n(&mut d, 1);
        // q is still tiny, so torque sign follows the target
        for (tau, target) in d.sim().torques.iter().zip(&targets) {
            assert!(*target > 0.0);
            assert!(*tau > 0.0);
        }
    }

    #[test]
    fn test_reset_restores_startup_state() {
        let mut d = deployment();
        let initial = d.sim().snapshot();
        d.command.set_command([0.5, 0.0, 0.0]);
        tick_n(&mut d, 25);
        assert_ne!(d.sim().snapshot(), initial);
        assert!(!d.controller().policy().encoder_state().is_zero());

        d.reset();
        assert!(d.controller().action().iter().all(|a| *a == 0.0));
        assert_eq!(d.controller().phase(), 0.0);
        assert!(d.controller().policy().encoder_state().is_zero());
        assert!(d.controller().policy().actor_state().is_zero());
        assert_eq!(d.sim().snapshot(), initial);
        assert_eq!(d.command.command(), [0.0; 3]);
        assert_eq!(d.counter, 0);
    }

    #[test]
    fn test_reset_request_takes_one_tick() {
        let mut d = deployment();
        tick_n(&mut d, 12);
        d.handle(OperatorEvent::Reset);
        assert_eq!(d.state(), LoopState::Resetting);

        let steps = d.sim().steps;
        let frames = d.viewer().frames();
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Reset);
        assert_eq!(d.state(), LoopState::Running);
        assert_eq!(d.sim().steps, steps + 1);
        assert_eq!(d.viewer().frames(), frames + 1);
        assert_eq!(d.display.pending_message(), Some("Robot state reset"));
        assert!(d.sim().forces.is_empty());

        // decimation restarts from zero after the reset
        tick_n(&mut d, 9);
        assert!(d.controller().action().iter().all(|a| *a == 0.0));
        tick_n(&mut d, 1);
        assert!(d.controller().action().iter().any(|a| *a != 0.0));
    }

    #[test]
    fn test_no_push_outside_disturbance_mode() {
        let mut d = deployment();
        tick_n(&mut d, 3);
        let torso = d.sim().body_id("torso_link").unwrap();
        assert_eq!(d.sim().forces.get(&torso), Some(&[0.0; 3]));
    }

    #[test]
    fn test_disturbance_push_reaches_every_physics_tick() {
        let mut d = pushing([1.0, 1.0]);
        // stick capped to unit length, then rotated by the base yaw
        let component = 100.0 / 2f32.sqrt();
        for _ in 0..12 {
            d.tick(Instant::now()).unwrap();
            let force = torso_force(&d).unwrap();
            assert_relative_eq!(force[0], -component, epsilon = 1e-3);
            assert_relative_eq!(force[1], component, epsilon = 1e-3);
            assert_relative_eq!(force[2], 0.0, epsilon = 1e-3);
        }
        assert_relative_eq!(d.disturbance.magnitude(), 100.0, epsilon = 1e-3);

        d.command.update(|state| state.mode = Mode::Walk);
        d.tick(Instant::now()).unwrap();
        assert_eq!(torso_force(&d), Some([0.0; 3]));
    }

    #[test]
    fn test_reset_tick_clears_the_push() {
        let mut d = pushing([0.5, 0.0]);
        d.tick(Instant::now()).unwrap();
        assert_relative_eq!(torso_force(&d).unwrap()[1], 50.0, epsilon = 1e-3);

        d.handle(OperatorEvent::Reset);
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Reset);
        assert_eq!(torso_force(&d), None);
        assert_eq!(d.disturbance.magnitude(), 0.0);

        // the held stick pushes again on the next regular tick
        d.tick(Instant::now()).unwrap();
        assert_relative_eq!(torso_force(&d).unwrap()[1], 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_scripted_reset_event_is_handled_in_order() {
        let mut d = pushing([0.0, 0.0]);
        if let InputSource::Scripted(script) = &mut d.input {
            script.events.push_back(vec![]);
            script.events.push_back(vec![OperatorEvent::Reset]);
        }
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Stepped);
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Stepped);
        assert_eq!(d.state(), LoopState::Resetting);
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Reset);
        assert_eq!(d.state(), LoopState::Running);
    }

    #[test]
    fn test_unrepresentable_duration_is_rejected() {
        let mut config = config("");
        config.simulation_duration = 1.0e30;
        let result = Deployment::new(
            &config,
            MockSim::new(N, config.simulation_dt),
            MockBackend::new(N),
            HeadlessViewer::new(),
            InputSource::Disabled,
            SharedCommand::default(),
            StatusDisplay::hidden(),
        );
        assert!(matches!(result, Err(DeployError::Config(_))));
    }

    #[test]
    fn test_operator_events_update_settings_and_messages() {
        let mut d = deployment();
        d.handle(OperatorEvent::ModeChanged(Mode::Disturbance));
        assert_eq!(
            d.display.pending_message(),
            Some("Disturbance mode: force applied to torso_link")
        );

        d.handle(OperatorEvent::ToggleTracking);
        assert!(!d.settings().track_base);
        d.handle(OperatorEvent::Camera(CameraAdjust::Zoom(1.0)));
        d.handle(OperatorEvent::ToggleTracking);
        assert_eq!(d.settings().camera, CameraPose::TRACKING_DEFAULT);
        assert_eq!(d.display.pending_message(), Some("Base tracking enabled"));

        d.handle(OperatorEvent::Interrupt);
        assert_eq!(d.tick(Instant::now()).unwrap(), TickOutcome::Stopped);
        assert_eq!(d.state(), LoopState::Terminated);
    }

    #[test]
    fn test_run_stops_when_viewer_closes() {
        let config = config("");
        let mut d = deployment_with(&config, HeadlessViewer::closing_after(5));
        let summary = d.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.ticks, 5);
        assert_eq!(d.state(), LoopState::Terminated);
    }

    #[test]
    fn test_run_honours_interrupt_and_duration() {
        let mut d = deployment();
        let summary = d.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(summary.ticks, 0);

        let mut config = config("");
        config.simulation_duration = 0.0;
        let mut d = deployment_with(&config, HeadlessViewer::new());
        assert_eq!(d.run(&AtomicBool::new(false)).unwrap().ticks, 0);
    }

    #[test]
    fn test_joint_count_mismatch_is_rejected() {
        let config = config("");
        let result = Deployment::new(
            &config,
            MockSim::new(N + 1, config.simulation_dt),
            MockBackend::new(N),
            HeadlessViewer::new(),
            InputSource::Disabled,
            SharedCommand::default(),
            StatusDisplay::hidden(),
        );
        assert!(matches!(
            result,
            Err(DeployError::JointCount { got: 4, expected: 3 })
        ));
    }
}
