//! Gamepad calibration files and axis-layout resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::InputError;
use crate::config::{DeployConfig, GamepadType};

/// Types probed, in order, when the config names neither a type nor a file.
const PROBE_ORDER: [GamepadType; 3] = [GamepadType::Betop, GamepadType::Logitech, GamepadType::Custom];

/// What a calibrated axis drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisRole {
    Yaw,
    Disturbance,
    Lateral,
    Forward,
}

impl AxisRole {
    /// Slot in the `[left x, left y, right x, right y]` axis mapping.
    fn slot(self) -> usize {
        match self {
            AxisRole::Yaw => 0,
            AxisRole::Disturbance => 1,
            AxisRole::Lateral => 2,
            AxisRole::Forward => 3,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AxisCalibration {
    #[serde(default)]
    pub center: f32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<AxisRole>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ButtonCalibration {
    pub button_id: usize,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Calibration {
    #[serde(default)]
    pub joystick_name: String,
    #[serde(default)]
    pub calibration_date: String,
    #[serde(default)]
    pub gamepad_type: Option<GamepadType>,
    /// Keyed by axis id as written by the calibration tool ("0", "1", ...).
    #[serde(default)]
    pub axes: BTreeMap<String, AxisCalibration>,
    #[serde(default)]
    pub buttons: BTreeMap<String, ButtonCalibration>,
}

impl Calibration {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let err = |message: String| InputError::Calibration {
            path: path.to_path_buf(),
            message,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| err(e.to_string()))
    }

    /// Rest value of `axis_id`, zero when uncalibrated.
    pub fn center(&self, axis_id: usize) -> f32 {
        self.axes
            .get(&axis_id.to_string())
            .map_or(0.0, |axis| axis.center)
    }

    pub fn button(&self, name: &str) -> Option<usize> {
        self.buttons.get(name).map(|b| b.button_id)
    }

    fn axis_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.axes.keys().filter_map(|k| k.parse().ok()).collect();
        ids.sort_unstable();
        ids
    }

    /// `[left x, left y, right x, right y]` from the axis roles. Falls back to
    /// the four lowest axis ids when a role is missing.
    pub fn role_mapping(&self) -> Option<[usize; 4]> {
        let mut mapping = [None; 4];
        for (key, axis) in &self.axes {
            if let (Some(role), Ok(id)) = (axis.role, key.parse::<usize>()) {
                mapping[role.slot()] = Some(id);
            }
        }
        if let [Some(a), Some(b), Some(c), Some(d)] = mapping {
            return Some([a, b, c, d]);
        }
        match self.axis_ids().as_slice() {
            [a, b, c, d, ..] => Some([*a, *b, *c, *d]),
            _ => None,
        }
    }
}

/// Default location of the calibration file for `gamepad_type`.
pub fn calibration_path(root: &Path, gamepad_type: GamepadType) -> PathBuf {
    root.join("gamepad_configs")
        .join(format!("gamepad_calibration_{}.json", gamepad_type.as_str()))
}

/// Axis layout and calibration the gamepad reader runs with.
#[derive(Clone, Debug)]
pub struct GamepadSetup {
    pub gamepad_type: GamepadType,
    /// `[left x, left y, right x, right y]` axis ids.
    pub axis_ids: [usize; 4],
    pub calibration: Option<Calibration>,
}

impl GamepadSetup {
    fn new(gamepad_type: GamepadType, custom: Option<[usize; 4]>, calibration: Option<Calibration>) -> Self {
        let axis_ids = match gamepad_type {
            GamepadType::Logitech => [0, 1, 2, 3],
            GamepadType::Betop => [0, 1, 3, 4],
            GamepadType::Custom => custom.unwrap_or_else(|| {
                log::warn!("Custom gamepad without an axis mapping, using [0, 1, 2, 3]");
                [0, 1, 2, 3]
            }),
        };
        Self {
            gamepad_type,
            axis_ids,
            calibration,
        }
    }

    /// Resolution order: explicit calibration file, then configured type,
    /// then the first calibration file found under `gamepad_configs/`.
    pub fn resolve(config: &DeployConfig, root: &Path) -> Self {
        if let Some(path) = &config.gamepad_calibration_file {
            if let Some(calibration) = load_logged(path) {
                let gamepad_type = config
                    .gamepad_type
                    .or(calibration.gamepad_type)
                    .unwrap_or_default();
                let custom = config.axis_mapping.or_else(|| calibration.role_mapping());
                return Self::new(gamepad_type, custom, Some(calibration));
            }
        }

        if let Some(gamepad_type) = config.gamepad_type {
            let path = calibration_path(root, gamepad_type);
            let calibration = if path.is_file() {
                load_logged(&path)
            } else {
                log::warn!("Calibration file not found: {}", path.display());
                None
            };
            let custom = config
                .axis_mapping
                .or_else(|| calibration.as_ref().and_then(Calibration::role_mapping));
            return Self::new(gamepad_type, custom, calibration);
        }

        for probe in PROBE_ORDER {
            let path = calibration_path(root, probe);
            if !path.is_file() {
                continue;
            }
            if let Some(calibration) = load_logged(&path) {
                let gamepad_type = calibration.gamepad_type.unwrap_or_default();
                let custom = config.axis_mapping.or_else(|| calibration.role_mapping());
                return Self::new(gamepad_type, custom, Some(calibration));
            }
        }

        log::warn!("No gamepad calibration found, using the logitech layout uncalibrated");
        Self::new(GamepadType::Logitech, None, None)
    }
}

fn load_logged(path: &Path) -> Option<Calibration> {
    match Calibration::load(path) {
        Ok(calibration) => {
            log::info!(
                "Loaded gamepad calibration {} ({}, {})",
                path.display(),
                if calibration.joystick_name.is_empty() { "unknown pad" } else { calibration.joystick_name.as_str() },
                if calibration.calibration_date.is_empty() { "undated" } else { calibration.calibration_date.as_str() },
            );
            Some(calibration)
        }
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}
