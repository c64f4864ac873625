use super::mode::{Mode, ModeLimitTable};

/// Operator stick deflections, each in [-1, 1], already deadzoned and centered.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawAxes {
    pub forward: f32,
    pub lateral: f32,
    pub yaw: f32,
}

/// Turns raw operator axes into a velocity command.
///
/// The only state is the previous filtered forward value, which survives mode
/// switches so leaving Run does not cause a jump on the next entry.
#[derive(Clone, Debug)]
pub struct CommandShaper {
    limits: ModeLimitTable,
    run_filter_alpha: f32,
    prev_forward: f32,
}

impl CommandShaper {
    pub fn new(limits: ModeLimitTable, run_filter_alpha: f32) -> Self {
        Self {
            limits,
            run_filter_alpha,
            prev_forward: 0.0,
        }
    }

    /// Previous filtered forward command.
    #[cfg(test)]
    fn prev_forward(&self) -> f32 {
        self.prev_forward
    }

    pub fn shape(&mut self, raw: RawAxes, mode: Mode) -> [f32; 3] {
        let limits = self.limits.get(mode);

        let stick_forward = raw.forward.clamp(-1.0, 1.0);
        let raw_forward = if stick_forward >= 0.0 {
            stick_forward * limits.forward
        } else {
            stick_forward * limits.backward
        };

        // Run only smooths acceleration; deceleration passes straight through.
        let forward = if mode == Mode::Run && raw_forward > self.prev_forward {
            self.run_filter_alpha * raw_forward + (1.0 - self.run_filter_alpha) * self.prev_forward
        } else {
            raw_forward
        };
        self.prev_forward = forward;

        let lateral = raw.lateral.clamp(-1.0, 1.0) * limits.lateral;
        let yaw = if mode.yaw_enabled() {
            raw.yaw.clamp(-1.0, 1.0) * limits.yaw
        } else {
            0.0
        };

        [forward, lateral, yaw]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn shaper() -> CommandShaper {
        CommandShaper::new(ModeLimitTable::default(), 0.02)
    }

    #[test]
    fn test_output_within_mode_bounds() {
        let mut rng = rand::rng();
        let mut shaper = shaper();
        let table = ModeLimitTable::default();

        for _ in 0..2000 {
            let mode = Mode::ALL[rng.random_range(0..3)];
            let raw = RawAxes {
                forward: rng.random_range(-1.5..1.5),
                lateral: rng.random_range(-1.5..1.5),
                yaw: rng.random_range(-1.5..1.5),
            };
            let cmd = shaper.shape(raw, mode);
            let limits = table.get(mode);
            assert!(cmd[0] <= limits.forward + 1e-6 && cmd[0] >= -limits.backward - 1e-6);
            assert!(cmd[1].abs() <= limits.lateral + 1e-6);
            assert!(cmd[2].abs() <= limits.yaw + 1e-6);
            if mode == Mode::Disturbance {
                assert_eq!(cmd[2], 0.0);
            }
        }
    }

    #[test]
    fn test_forward_uses_asymmetric_limits() {
        let mut shaper = shaper();
        let full = RawAxes { forward: 1.0, ..Default::default() };
        let back = RawAxes { forward: -1.0, ..Default::default() };
        assert_relative_eq!(shaper.shape(full, Mode::Walk)[0], 1.0);
        assert_relative_eq!(shaper.shape(back, Mode::Walk)[0], -0.6);
    }

    #[test]
    fn test_disturbance_zeroes_yaw() {
        let mut shaper = shaper();
        let raw = RawAxes { forward: 0.5, lateral: 0.5, yaw: 1.0 };
        let cmd = shaper.shape(raw, Mode::Disturbance);
        assert_eq!(cmd[2], 0.0);
        assert_relative_eq!(cmd[1], 0.15);
    }

    #[test]
    fn test_run_filter_smooths_acceleration() {
        let mut shaper = shaper();
        let mut last = 0.0;
        for i in 1..=100 {
            let raw = RawAxes { forward: i as f32 / 100.0, ..Default::default() };
            let target = raw.forward * 2.5;
            let cmd = shaper.shape(raw, Mode::Run);
            assert!(cmd[0] >= last, "filtered value decreased at step {}", i);
            assert!(cmd[0] <= target);
            last = cmd[0];
        }
        assert!(last < 2.5 * 0.5);
    }

    #[test]
    fn test_run_filter_first_step_blends_with_previous() {
        let mut shaper = shaper();
        let cmd = shaper.shape(RawAxes { forward: 1.0, ..Default::default() }, Mode::Run);
        assert_relative_eq!(cmd[0], 0.02 * 2.5);
    }

    #[test]
    fn test_run_filter_passes_deceleration_through() {
        let mut shaper = shaper();
        // Walk tracks the raw value, so entering Run at speed starts from it.
        shaper.shape(RawAxes { forward: 1.0, ..Default::default() }, Mode::Walk);
        assert_relative_eq!(shaper.prev_forward(), 1.0);

        for (stick, expected) in [(0.3_f32, 0.75_f32), (0.1, 0.25), (-0.4, -0.24)] {
            let raw = RawAxes { forward: stick, ..Default::default() };
            let cmd = shaper.shape(raw, Mode::Run);
            assert_relative_eq!(cmd[0], expected);
        }
    }

    #[test]
    fn test_filter_state_survives_mode_switch() {
        let mut shaper = shaper();
        for _ in 0..10 {
            shaper.shape(RawAxes { forward: 1.0, ..Default::default() }, Mode::Run);
        }
        let in_run = shaper.prev_forward();
        assert!(in_run > 0.0 && in_run < 2.5);

        let walk = shaper.shape(RawAxes { forward: 0.3, ..Default::default() }, Mode::Walk);
        assert_relative_eq!(walk[0], 0.3);
        assert_relative_eq!(shaper.prev_forward(), 0.3);
    }
}
