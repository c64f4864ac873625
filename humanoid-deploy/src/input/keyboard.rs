//! Terminal keyboard input on a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use super::{InputError, OperatorEvent};
use crate::command::{ModeLimitTable, SharedCommand};
use crate::config::DeployConfig;
use crate::viewer::CameraAdjust;

const POLL_TIMEOUT: Duration = Duration::from_millis(50);
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

pub const CONTROLS: &[(&str, &str)] = &[
    ("W / S", "forward velocity + / -"),
    ("J / L", "lateral velocity + / -"),
    ("A / D", "yaw rate + / -"),
    ("C", "clear velocity command"),
    ("M", "cycle mode (Walk, Run, Disturbance)"),
    ("B", "reset robot"),
    ("R", "toggle camera control"),
    ("Arrows", "camera angle / elevation (camera control)"),
    ("U / O", "camera closer / farther (camera control)"),
    ("Ctrl+C", "quit"),
];

#[derive(Clone, Debug)]
pub struct KeyboardSettings {
    pub cmd_step: f32,
    pub camera_angle_step: f32,
    pub camera_distance_step: f32,
    pub camera_elevation_step: f32,
    pub limits: ModeLimitTable,
}

impl KeyboardSettings {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            cmd_step: config.cmd_step,
            camera_angle_step: config.camera_angle_step,
            camera_distance_step: config.camera_distance_step,
            camera_elevation_step: config.camera_elevation_step,
            limits: config.mode_limits,
        }
    }
}

/// Key-to-command translation, independent of the terminal.
pub struct KeyHandler {
    settings: KeyboardSettings,
    camera_mode: bool,
}

impl KeyHandler {
    pub fn new(settings: KeyboardSettings) -> Self {
        Self {
            settings,
            camera_mode: false,
        }
    }

    pub fn camera_mode(&self) -> bool {
        self.camera_mode
    }

    fn nudge(&self, shared: &SharedCommand, axis: usize, delta: f32) {
        let limits = &self.settings.limits;
        shared.update(|state| {
            state.command[axis] += delta;
            state.command = limits.get(state.mode).clamp(state.command);
        });
    }

    pub fn on_key(&mut self, key: KeyEvent, shared: &SharedCommand) -> Option<OperatorEvent> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
                .then_some(OperatorEvent::Interrupt);
        }

        let step = self.settings.cmd_step;
        let s = &self.settings;
        let camera = |adjust| self.camera_mode.then_some(OperatorEvent::Camera(adjust));

        match key.code {
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'w' => self.nudge(shared, 0, step),
                's' => self.nudge(shared, 0, -step),
                'j' => self.nudge(shared, 1, step),
                'l' => self.nudge(shared, 1, -step),
                'a' => self.nudge(shared, 2, step),
                'd' => self.nudge(shared, 2, -step),
                'c' => {
                    shared.set_command([0.0; 3]);
                    return Some(OperatorEvent::CommandCleared);
                }
                'b' => return Some(OperatorEvent::Reset),
                'm' => {
                    let limits = &s.limits;
                    let mode = shared.update(|state| {
                        state.mode = state.mode.next();
                        state.command = limits.get(state.mode).clamp(state.command);
                        state.mode
                    });
                    return Some(OperatorEvent::ModeChanged(mode));
                }
                'r' => {
                    self.camera_mode = !self.camera_mode;
                    return Some(OperatorEvent::CameraControl(self.camera_mode));
                }
                'u' => return camera(CameraAdjust::Zoom(-s.camera_distance_step)),
                'o' => return camera(CameraAdjust::Zoom(s.camera_distance_step)),
                _ => {}
            },
            KeyCode::Up => return camera(CameraAdjust::Tilt(s.camera_elevation_step)),
            KeyCode::Down => return camera(CameraAdjust::Tilt(-s.camera_elevation_step)),
            KeyCode::Right => return camera(CameraAdjust::Rotate(s.camera_angle_step)),
            KeyCode::Left => return camera(CameraAdjust::Rotate(-s.camera_angle_step)),
            _ => {}
        }
        None
    }
}

/// Raw terminal mode for as long as the guard lives.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

pub struct KeyboardInput {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    events: Receiver<OperatorEvent>,
}

impl KeyboardInput {
    /// Starts the reader thread. Returns once the terminal is in raw mode.
    ///
    /// Ctrl+C no longer raises SIGINT in raw mode, so the thread sets
    /// `interrupt` itself.
    pub fn spawn(
        shared: SharedCommand,
        settings: KeyboardSettings,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self, InputError> {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("keyboard".to_string())
            .spawn(move || {
                let _guard = match RawModeGuard::enable() {
                    Ok(guard) => {
                        let _ = ready_tx.send(Ok(()));
                        guard
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                read_keys(KeyHandler::new(settings), &shared, &thread_running, &interrupt, &tx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(InputError::Terminal(e));
            }
            Err(_) => {
                return Err(InputError::Terminal(std::io::Error::other(
                    "keyboard thread exited during startup",
                )))
            }
        }

        log::info!("Keyboard control enabled");
        Ok(Self {
            running,
            handle: Some(handle),
            events: rx,
        })
    }

    /// Events received since the last call.
    pub fn drain(&self) -> Vec<OperatorEvent> {
        self.events.try_iter().collect()
    }

    /// Signals the thread and waits up to half a second for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                log::warn!("Keyboard thread panicked");
            }
        } else {
            log::warn!("Keyboard thread did not stop within {:?}", JOIN_TIMEOUT);
        }
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_keys(
    mut handler: KeyHandler,
    shared: &SharedCommand,
    running: &AtomicBool,
    interrupt: &AtomicBool,
    tx: &Sender<OperatorEvent>,
) {
    while running.load(Ordering::SeqCst) {
        match event::poll(POLL_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                log::warn!("Keyboard poll failed: {}", e);
                break;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => key,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("Keyboard read failed: {}", e);
                break;
            }
        };
        if let Some(event) = handler.on_key(key, shared) {
            if event == OperatorEvent::Interrupt {
                interrupt.store(true, Ordering::SeqCst);
            }
            if tx.send(event).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Mode;

    fn handler() -> KeyHandler {
        KeyHandler::new(KeyboardSettings {
            cmd_step: 0.1,
            camera_angle_step: 0.05,
            camera_distance_step: 0.1,
            camera_elevation_step: 0.05,
            limits: ModeLimitTable::default(),
        })
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_velocity_keys_step_and_clamp() {
        let mut keys = handler();
        let shared = SharedCommand::new([0.0; 3], Mode::Walk);
        keys.on_key(press(KeyCode::Char('w')), &shared);
        keys.on_key(press(KeyCode::Char('j')), &shared);
        keys.on_key(press(KeyCode::Char('D')), &shared);
        let cmd = shared.command();
        assert!((cmd[0] - 0.1).abs() < 1e-6);
        assert!((cmd[1] - 0.1).abs() < 1e-6);
        assert!((cmd[2] + 0.1).abs() < 1e-6);

        // walk tops out at 1.0 forward
        for _ in 0..30 {
            keys.on_key(press(KeyCode::Char('w')), &shared);
        }
        assert_eq!(shared.command()[0], 1.0);
    }

    #[test]
    fn test_clear_and_reset() {
        let mut keys = handler();
        let shared = SharedCommand::new([0.5, 0.2, 0.1], Mode::Walk);
        assert_eq!(
            keys.on_key(press(KeyCode::Char('c')), &shared),
            Some(OperatorEvent::CommandCleared)
        );
        assert_eq!(shared.command(), [0.0; 3]);
        assert_eq!(keys.on_key(press(KeyCode::Char('b')), &shared), Some(OperatorEvent::Reset));
    }

    #[test]
    fn test_mode_cycle_reclamps_command() {
        let mut keys = handler();
        let shared = SharedCommand::new([0.9, 0.0, 0.5], Mode::Run);
        let event = keys.on_key(press(KeyCode::Char('m')), &shared);
        assert_eq!(event, Some(OperatorEvent::ModeChanged(Mode::Disturbance)));
        // disturbance: forward 0.6, no yaw
        assert_eq!(shared.command(), [0.6, 0.0, 0.0]);
    }

    #[test]
    fn test_camera_keys_need_camera_mode() {
        let mut keys = handler();
        let shared = SharedCommand::default();
        assert_eq!(keys.on_key(press(KeyCode::Up), &shared), None);
        assert_eq!(
            keys.on_key(press(KeyCode::Char('r')), &shared),
            Some(OperatorEvent::CameraControl(true))
        );
        assert_eq!(
            keys.on_key(press(KeyCode::Char('u')), &shared),
            Some(OperatorEvent::Camera(CameraAdjust::Zoom(-0.1)))
        );
        assert_eq!(
            keys.on_key(press(KeyCode::Left), &shared),
            Some(OperatorEvent::Camera(CameraAdjust::Rotate(-0.05)))
        );
        // velocity keys keep working in camera mode
        keys.on_key(press(KeyCode::Char('w')), &shared);
        assert!(shared.command()[0] > 0.0);
    }

    #[test]
    fn test_ctrl_c_interrupts() {
        let mut keys = handler();
        let shared = SharedCommand::default();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(keys.on_key(ctrl_c, &shared), Some(OperatorEvent::Interrupt));
        assert_eq!(shared.command(), [0.0; 3]);
    }
}
