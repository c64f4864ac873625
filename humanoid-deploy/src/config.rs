//! Deployment configuration, loaded from YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::ModeLimitTable;
use crate::observation::layout_len;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Supported stick layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GamepadType {
    #[default]
    Logitech,
    Betop,
    Custom,
}

impl GamepadType {
    pub fn as_str(self) -> &'static str {
        match self {
            GamepadType::Logitech => "logitech",
            GamepadType::Betop => "betop",
            GamepadType::Custom => "custom",
        }
    }
}

/// Root deployment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployConfig {
    /// Directory holding the encoder and actor ONNX files.
    pub policy_path: PathBuf,
    /// Robot description (URDF).
    pub xml_path: PathBuf,
    /// Wall-clock run time (s).
    pub simulation_duration: f32,
    /// Physics timestep (s).
    pub simulation_dt: f32,
    /// Physics steps per policy step.
    pub control_decimation: u32,

    pub kps: Vec<f32>,
    pub kds: Vec<f32>,
    pub default_angles: Vec<f32>,

    pub ang_vel_scale: f32,
    pub dof_pos_scale: f32,
    pub dof_vel_scale: f32,
    pub action_scale: f32,
    pub cmd_scale: [f32; 3],

    pub num_actions: usize,
    /// Base observation length, without the phase slots.
    pub num_obs: usize,
    #[serde(default)]
    pub include_phase_in_obs: bool,

    pub cmd_init: [f32; 3],

    #[serde(default)]
    pub keyboard_enabled: bool,
    #[serde(default = "default_true")]
    pub gamepad_enabled: bool,
    #[serde(default)]
    pub gamepad_type: Option<GamepadType>,
    /// Gamepad axis indices `[left x, left y, right x, right y]` for `custom` pads.
    #[serde(default)]
    pub axis_mapping: Option<[usize; 4]>,
    #[serde(default)]
    pub gamepad_calibration_file: Option<PathBuf>,

    /// Keyboard command increment.
    #[serde(default = "default_cmd_step")]
    pub cmd_step: f32,
    #[serde(default = "default_camera_angle_step")]
    pub camera_angle_step: f32,
    #[serde(default = "default_camera_distance_step")]
    pub camera_distance_step: f32,
    #[serde(default = "default_camera_elevation_step")]
    pub camera_elevation_step: f32,
    /// Minimum time between gamepad polls (s).
    #[serde(default = "default_gamepad_poll_interval")]
    pub gamepad_poll_interval: f32,
    #[serde(default = "default_run_filter_alpha")]
    pub run_filter_alpha: f32,
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    /// Peak disturbance force (N).
    #[serde(default = "default_disturbance_force_scale")]
    pub disturbance_force_scale: f32,
    #[serde(default = "default_disturbance_body")]
    pub disturbance_body: String,
    #[serde(default = "default_tracking_body")]
    pub tracking_body: String,
    #[serde(default)]
    pub mode_limits: ModeLimitTable,

    #[serde(default = "default_encoder_hidden_size")]
    pub encoder_hidden_size: usize,
    #[serde(default = "default_actor_hidden_size")]
    pub actor_hidden_size: usize,

    /// Actuated joints in policy order. Defaults to the URDF order.
    #[serde(default)]
    pub joint_names: Option<Vec<String>>,
    /// Initial base height above the ground (m).
    #[serde(default = "default_base_height")]
    pub base_height: f32,
}

fn default_true() -> bool {
    true
}

fn default_cmd_step() -> f32 {
    0.1
}

fn default_camera_angle_step() -> f32 {
    0.05
}

fn default_camera_distance_step() -> f32 {
    0.1
}

fn default_camera_elevation_step() -> f32 {
    0.05
}

fn default_gamepad_poll_interval() -> f32 {
    0.02
}

fn default_run_filter_alpha() -> f32 {
    0.02
}

fn default_deadzone() -> f32 {
    0.1
}

fn default_disturbance_force_scale() -> f32 {
    100.0
}

fn default_disturbance_body() -> String {
    "torso_link".to_string()
}

fn default_tracking_body() -> String {
    "pelvis_link".to_string()
}

fn default_encoder_hidden_size() -> usize {
    256
}

fn default_actor_hidden_size() -> usize {
    64
}

fn default_base_height() -> f32 {
    1.0
}

/// Input channel selected by the config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputChoice {
    Keyboard,
    Gamepad,
    None,
}

impl DeployConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let n = self.num_actions;

        if n == 0 {
            return invalid("num_actions must be at least 1".into());
        }
        for (name, len) in [
            ("kps", self.kps.len()),
            ("kds", self.kds.len()),
            ("default_angles", self.default_angles.len()),
        ] {
            if len != n {
                return invalid(format!("{} has {} entries, expected num_actions = {}", name, len, n));
            }
        }
        if let Some(names) = &self.joint_names {
            if names.len() != n {
                return invalid(format!(
                    "joint_names has {} entries, expected num_actions = {}",
                    names.len(),
                    n
                ));
            }
        }
        if self.num_obs < layout_len(n) {
            return invalid(format!(
                "num_obs = {} is shorter than the observation layout ({} for {} actions)",
                self.num_obs,
                layout_len(n),
                n
            ));
        }
        if self.control_decimation < 1 {
            return invalid("control_decimation must be at least 1".into());
        }
        if !(self.simulation_dt.is_finite() && self.simulation_dt > 0.0) {
            return invalid(format!("simulation_dt must be positive, got {}", self.simulation_dt));
        }
        if !(self.simulation_duration.is_finite() && self.simulation_duration >= 0.0) {
            return invalid(format!(
                "simulation_duration must be non-negative, got {}",
                self.simulation_duration
            ));
        }
        self.physics_step()?;
        self.run_duration()?;
        self.poll_interval()?;
        if !(self.run_filter_alpha > 0.0 && self.run_filter_alpha <= 1.0) {
            return invalid(format!("run_filter_alpha must be in (0, 1], got {}", self.run_filter_alpha));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return invalid(format!("deadzone must be in [0, 1), got {}", self.deadzone));
        }
        if self.encoder_hidden_size == 0 || self.actor_hidden_size == 0 {
            return invalid("hidden sizes must be positive".into());
        }
        if let Some(mode) = self.mode_limits.invalid_mode() {
            return invalid(format!("mode_limits.{} must be non-negative", mode.name().to_lowercase()));
        }
        Ok(())
    }

    /// Keyboard wins when both channels are enabled.
    pub fn input_choice(&self) -> InputChoice {
        if self.keyboard_enabled {
            InputChoice::Keyboard
        } else if self.gamepad_enabled {
            InputChoice::Gamepad
        } else {
            InputChoice::None
        }
    }

    /// Wall-clock length of one physics tick.
    pub fn physics_step(&self) -> Result<Duration, ConfigError> {
        seconds("simulation_dt", self.simulation_dt)
    }

    /// Wall-clock length of the whole run.
    pub fn run_duration(&self) -> Result<Duration, ConfigError> {
        seconds("simulation_duration", self.simulation_duration)
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        seconds("gamepad_poll_interval", self.gamepad_poll_interval)
    }

    /// Seconds between policy evaluations.
    pub fn control_period(&self) -> f32 {
        self.simulation_dt * self.control_decimation as f32
    }

    /// Observation length including the phase slots.
    pub fn observation_len(&self) -> usize {
        if self.include_phase_in_obs {
            self.num_obs + 2
        } else {
            self.num_obs
        }
    }

    /// Makes every relative path absolute against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        for path in [&mut self.policy_path, &mut self.xml_path] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        if let Some(path) = &mut self.gamepad_calibration_file {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }
}

/// Seconds as a [`Duration`]; negative, non-finite and overflowing values
/// are rejected.
fn seconds(key: &str, secs: f32) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f32(secs)
        .map_err(|e| ConfigError::Invalid(format!("{} = {} is not a valid duration: {}", key, secs, e)))
}

/// Root of the project: the directory holding `configs/`, `policies/` and
/// `gamepad_configs/`.
///
/// The working directory is used when it has a `configs/` directory or when
/// the source checkout the binary was built from is gone.
pub fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let checkout = manifest.parent().unwrap_or(manifest).to_path_buf();
    match std::env::current_dir() {
        Ok(cwd) if cwd.join("configs").is_dir() || !checkout.join("configs").is_dir() => cwd,
        _ => checkout,
    }
}

/// Directory that relative paths inside the config at `config_path` resolve
/// against: the parent of its `configs/` directory, else the file's own
/// directory.
pub fn config_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new(""));
    match dir.file_name() {
        Some(name) if name == "configs" => dir.parent().unwrap_or(dir).to_path_buf(),
        _ => dir.to_path_buf(),
    }
}

/// Resolves a config name from the command line.
///
/// `"e3.yaml"` is looked up in `root/configs/`; a name already starting with
/// `configs/` is taken relative to `root`.
pub fn resolve_config_path(root: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() || path.starts_with("configs") {
        root.join(path)
    } else {
        root.join("configs").join(path)
    }
}
