//! Gamepad input through gilrs, polled from the control loop.
//!
//! Sticks follow the gilrs convention (right and up positive) and are
//! converted to command signs here: pushing the right stick up drives
//! forward, right stick right strafes right (negative lateral), left stick
//! right turns right (negative yaw).

use std::collections::HashSet;
use std::time::{Duration, Instant};

use gilrs::{Axis, Button, EventType, GamepadId, Gilrs};

use super::calibration::GamepadSetup;
use super::{InputError, InputFrame, OperatorEvent};
use crate::command::{CommandShaper, RawAxes, SharedCommand};
use crate::config::{ConfigError, DeployConfig, GamepadType};
use crate::viewer::CameraAdjust;

/// Raw axis ids, as written by the calibration tool, in driver order.
const RAW_AXES: [Axis; 8] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
    Axis::DPadX,
    Axis::DPadY,
];

/// Raw button ids in DirectInput order (X, A, B, Y, LB, RB, LT, RT, ...).
const RAW_BUTTONS: [Button; 12] = [
    Button::West,
    Button::South,
    Button::East,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
];

/// `[left x, left y, right x, right y]` for the preset layouts.
const STICK_AXES: [Axis; 4] = [Axis::LeftStickX, Axis::LeftStickY, Axis::RightStickX, Axis::RightStickY];

pub const CONTROLS: &[(&str, &str)] = &[
    ("Right stick", "forward / lateral velocity"),
    ("Left stick X", "yaw rate (off in Disturbance)"),
    ("Left stick", "push force (Disturbance)"),
    ("LB", "cycle mode (Walk, Run, Disturbance)"),
    ("X", "toggle force overlay"),
    ("Y", "toggle base tracking"),
    ("A", "toggle contact overlay"),
    ("B", "reset robot"),
    ("D-pad", "camera angle / distance (tracking)"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PadAction {
    CycleMode,
    Forces,
    Tracking,
    Reset,
    Contacts,
}

impl PadAction {
    const ALL: [PadAction; 5] = [
        PadAction::CycleMode,
        PadAction::Forces,
        PadAction::Tracking,
        PadAction::Reset,
        PadAction::Contacts,
    ];

    fn calibration_name(self) -> &'static str {
        match self {
            PadAction::CycleMode => "LB",
            PadAction::Forces => "X",
            PadAction::Tracking => "Y",
            PadAction::Reset => "B",
            PadAction::Contacts => "A",
        }
    }

    fn default_ids(self) -> &'static [usize] {
        match self {
            PadAction::CycleMode => &[4, 6],
            PadAction::Forces => &[0],
            PadAction::Tracking => &[3],
            PadAction::Reset => &[2],
            PadAction::Contacts => &[1],
        }
    }
}

fn raw_button(id: usize) -> Option<Button> {
    RAW_BUTTONS.get(id).copied()
}

#[derive(Clone, Debug)]
pub struct GamepadSettings {
    pub deadzone: f32,
    pub poll_interval: Duration,
    pub camera_angle_step: f32,
    pub camera_distance_step: f32,
}

impl GamepadSettings {
    pub fn from_config(config: &DeployConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            deadzone: config.deadzone,
            poll_interval: config.poll_interval()?,
            camera_angle_step: config.camera_angle_step,
            camera_distance_step: config.camera_distance_step,
        })
    }
}

/// The first poll always reads; later ones wait out `interval`.
fn poll_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= interval)
}

pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}

/// Centered stick deflections, gilrs convention.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sticks {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
}

impl Sticks {
    pub fn deadzoned(self, deadzone: f32) -> Self {
        Self {
            left_x: apply_deadzone(self.left_x, deadzone),
            left_y: apply_deadzone(self.left_y, deadzone),
            right_x: apply_deadzone(self.right_x, deadzone),
            right_y: apply_deadzone(self.right_y, deadzone),
        }
    }

    pub fn velocity_axes(&self) -> RawAxes {
        RawAxes {
            forward: self.right_y,
            lateral: -self.right_x,
            yaw: -self.left_x,
        }
    }

    /// `[forward, lateral]` push direction from the left stick.
    pub fn disturbance(&self) -> [f32; 2] {
        [self.left_y, -self.left_x]
    }
}

/// Rising-edge detection per action.
#[derive(Debug, Default)]
struct ButtonEdges {
    held: HashSet<PadAction>,
}

impl ButtonEdges {
    fn rising(&mut self, action: PadAction, pressed: bool) -> bool {
        if pressed {
            self.held.insert(action)
        } else {
            self.held.remove(&action);
            false
        }
    }
}

/// D-pad camera events, `dx`/`dy` in {-1, 0, 1}. Only while tracking.
fn dpad_events(dx: f32, dy: f32, tracking: bool, settings: &GamepadSettings) -> Vec<OperatorEvent> {
    let mut events = Vec::new();
    if !tracking {
        return events;
    }
    if dx != 0.0 {
        events.push(OperatorEvent::Camera(CameraAdjust::Rotate(dx * settings.camera_angle_step)));
    }
    if dy != 0.0 {
        events.push(OperatorEvent::Camera(CameraAdjust::Zoom(dy * settings.camera_distance_step)));
    }
    events
}

#[derive(Clone, Copy, Debug)]
struct AxisBinding {
    axis: Axis,
    center: f32,
}

pub struct GamepadInput {
    gilrs: Gilrs,
    id: GamepadId,
    sticks: [AxisBinding; 4],
    buttons: Vec<(PadAction, Vec<Button>)>,
    edges: ButtonEdges,
    shaper: CommandShaper,
    settings: GamepadSettings,
    last_poll: Option<Instant>,
    disturbance: [f32; 2],
}

impl GamepadInput {
    /// Opens the first connected pad. `Ok(None)` when none is plugged in.
    pub fn connect(
        setup: GamepadSetup,
        settings: GamepadSettings,
        shaper: CommandShaper,
    ) -> Result<Option<Self>, InputError> {
        let mut gilrs = Gilrs::new().map_err(|e| InputError::Gamepad(e.to_string()))?;
        while gilrs.next_event().is_some() {}

        let Some((id, name)) = gilrs
            .gamepads()
            .find(|(_, pad)| pad.is_connected())
            .map(|(id, pad)| (id, pad.name().to_string()))
        else {
            log::warn!("No gamepad detected, keeping the initial command");
            return Ok(None);
        };
        log::info!(
            "Gamepad connected: {} ({} layout, axes {:?})",
            name,
            setup.gamepad_type.as_str(),
            setup.axis_ids
        );

        let calibration = setup.calibration.as_ref();
        let sticks = std::array::from_fn(|slot| {
            let id = setup.axis_ids[slot];
            let axis = match setup.gamepad_type {
                GamepadType::Custom => RAW_AXES.get(id).copied().unwrap_or_else(|| {
                    log::warn!("Axis id {} has no gilrs equivalent, using {:?}", id, STICK_AXES[slot]);
                    STICK_AXES[slot]
                }),
                GamepadType::Logitech | GamepadType::Betop => STICK_AXES[slot],
            };
            AxisBinding {
                axis,
                center: calibration.map_or(0.0, |c| c.center(id)),
            }
        });

        let buttons = PadAction::ALL
            .into_iter()
            .map(|action| {
                let ids = match calibration.and_then(|c| c.button(action.calibration_name())) {
                    Some(id) => vec![id],
                    None => action.default_ids().to_vec(),
                };
                (action, ids.into_iter().filter_map(raw_button).collect())
            })
            .collect();

        Ok(Some(Self {
            gilrs,
            id,
            sticks,
            buttons,
            edges: ButtonEdges::default(),
            shaper,
            settings,
            last_poll: None,
            disturbance: [0.0; 2],
        }))
    }

    /// Reads the pad if the poll interval has elapsed, otherwise repeats the
    /// last disturbance stick with no events.
    pub fn poll(&mut self, shared: &SharedCommand, now: Instant, tracking: bool) -> InputFrame {
        while let Some(event) = self.gilrs.next_event() {
            if event.id == self.id && matches!(event.event, EventType::Disconnected) {
                log::warn!("Gamepad disconnected");
            }
        }

        if !poll_due(self.last_poll, now, self.settings.poll_interval) {
            return InputFrame {
                events: Vec::new(),
                disturbance: self.disturbance,
            };
        }
        self.last_poll = Some(now);

        let Some(pad) = self.gilrs.connected_gamepad(self.id) else {
            self.disturbance = [0.0; 2];
            return InputFrame::default();
        };
        let read = |b: &AxisBinding| pad.value(b.axis) - b.center;
        let sticks = Sticks {
            left_x: read(&self.sticks[0]),
            left_y: read(&self.sticks[1]),
            right_x: read(&self.sticks[2]),
            right_y: read(&self.sticks[3]),
        }
        .deadzoned(self.settings.deadzone);
        let axis = |neg: Button, pos: Button| pad.is_pressed(pos) as i8 as f32 - pad.is_pressed(neg) as i8 as f32;
        let dx = axis(Button::DPadLeft, Button::DPadRight);
        let dy = axis(Button::DPadDown, Button::DPadUp);
        let pressed: Vec<(PadAction, bool)> = self
            .buttons
            .iter()
            .map(|(action, buttons)| (*action, buttons.iter().any(|b| pad.is_pressed(*b))))
            .collect();

        let mut events = dpad_events(dx, dy, tracking, &self.settings);
        for (action, down) in pressed {
            if !self.edges.rising(action, down) {
                continue;
            }
            events.push(match action {
                PadAction::CycleMode => OperatorEvent::ModeChanged(shared.update(|state| {
                    state.mode = state.mode.next();
                    state.mode
                })),
                PadAction::Forces => OperatorEvent::ToggleForces,
                PadAction::Tracking => OperatorEvent::ToggleTracking,
                PadAction::Reset => OperatorEvent::Reset,
                PadAction::Contacts => OperatorEvent::ToggleContacts,
            });
        }

        let shaper = &mut self.shaper;
        shared.update(|state| state.command = shaper.shape(sticks.velocity_axes(), state.mode));
        self.disturbance = sticks.disturbance();

        InputFrame {
            events,
            disturbance: self.disturbance,
        }
    }
}
