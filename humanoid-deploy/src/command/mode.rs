use serde::{Deserialize, Serialize};

/// Locomotion mode, cycled by a single operator event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    Walk,
    Run,
    Disturbance,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Walk, Mode::Run, Mode::Disturbance];

    /// Walk -> Run -> Disturbance -> Walk.
    pub fn next(self) -> Self {
        match self {
            Mode::Walk => Mode::Run,
            Mode::Run => Mode::Disturbance,
            Mode::Disturbance => Mode::Walk,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Mode::Walk => 0,
            Mode::Run => 1,
            Mode::Disturbance => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Walk => "Walk",
            Mode::Run => "Run",
            Mode::Disturbance => "Disturbance",
        }
    }

    /// Yaw control is disabled while the operator is pushing the robot around.
    pub fn yaw_enabled(self) -> bool {
        self != Mode::Disturbance
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Velocity limits for one mode. All values are non-negative magnitudes.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModeLimits {
    /// Forward speed limit (m/s).
    pub forward: f32,
    /// Backward speed limit (m/s).
    pub backward: f32,
    /// Lateral speed limit (m/s).
    pub lateral: f32,
    /// Yaw rate limit (rad/s).
    pub yaw: f32,
}

impl ModeLimits {
    pub const fn new(forward: f32, backward: f32, lateral: f32, yaw: f32) -> Self {
        Self {
            forward,
            backward,
            lateral,
            yaw,
        }
    }

    /// Clamps a command into these limits.
    pub fn clamp(&self, command: [f32; 3]) -> [f32; 3] {
        [
            command[0].clamp(-self.backward, self.forward),
            command[1].clamp(-self.lateral, self.lateral),
            command[2].clamp(-self.yaw, self.yaw),
        ]
    }

    fn is_valid(&self) -> bool {
        [self.forward, self.backward, self.lateral, self.yaw]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Per-mode limit table.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModeLimitTable {
    #[serde(default = "default_walk_limits")]
    pub walk: ModeLimits,
    #[serde(default = "default_run_limits")]
    pub run: ModeLimits,
    #[serde(default = "default_disturbance_limits")]
    pub disturbance: ModeLimits,
}

fn default_walk_limits() -> ModeLimits {
    ModeLimits::new(1.0, 0.6, 0.5, 1.0)
}

fn default_run_limits() -> ModeLimits {
    ModeLimits::new(2.5, 0.6, 0.5, 1.0)
}

fn default_disturbance_limits() -> ModeLimits {
    ModeLimits::new(0.6, 0.4, 0.3, 0.0)
}

impl Default for ModeLimitTable {
    fn default() -> Self {
        Self {
            walk: default_walk_limits(),
            run: default_run_limits(),
            disturbance: default_disturbance_limits(),
        }
    }
}

impl ModeLimitTable {
    pub fn get(&self, mode: Mode) -> &ModeLimits {
        match mode {
            Mode::Walk => &self.walk,
            Mode::Run => &self.run,
            Mode::Disturbance => &self.disturbance,
        }
    }

    /// Returns the first mode with a negative or non-finite limit.
    pub fn invalid_mode(&self) -> Option<Mode> {
        Mode::ALL.into_iter().find(|m| !self.get(*m).is_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_cycles_through_all_three() {
        let mut mode = Mode::default();
        let mut seen = vec![mode];
        for _ in 0..3 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(seen, [Mode::Walk, Mode::Run, Mode::Disturbance, Mode::Walk]);
        assert_eq!(Mode::Disturbance.index(), 2);
        assert_eq!(Mode::Run.to_string(), "Run");
    }

    #[test]
    fn test_disturbance_default_limits_disable_yaw() {
        let table = ModeLimitTable::default();
        assert_eq!(table.get(Mode::Disturbance).yaw, 0.0);
        assert!(!Mode::Disturbance.yaw_enabled());
        assert!(table.get(Mode::Run).forward > table.get(Mode::Walk).forward);
    }

    #[test]
    fn test_clamp_is_asymmetric_on_forward_axis() {
        let limits = ModeLimits::new(1.0, 0.6, 0.5, 1.0);
        assert_eq!(limits.clamp([3.0, -2.0, 0.2]), [1.0, -0.5, 0.2]);
        assert_eq!(limits.clamp([-3.0, 0.0, -4.0]), [-0.6, 0.0, -1.0]);
        assert_eq!(limits.clamp([0.9, 0.1, -0.9]), [0.9, 0.1, -0.9]);
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let table: ModeLimitTable =
            serde_yaml::from_str("run: {forward: 3.0, backward: 0.5, lateral: 0.4, yaw: 0.8}").unwrap();
        assert_eq!(table.run.forward, 3.0);
        assert_eq!(table.walk, ModeLimitTable::default().walk);
        assert!(table.invalid_mode().is_none());
    }

    #[test]
    fn test_negative_limit_is_invalid() {
        let mut table = ModeLimitTable::default();
        table.walk.lateral = -0.1;
        assert_eq!(table.invalid_mode(), Some(Mode::Walk));
    }
}
