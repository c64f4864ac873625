/// Joint-space PD loop tracking policy targets with zero desired velocity.
#[derive(Clone, Debug)]
pub struct PdController {
    kps: Vec<f32>,
    kds: Vec<f32>,
    default_angles: Vec<f32>,
    action_scale: f32,
    targets: Vec<f32>,
    action: Vec<f32>,
}

impl PdController {
    pub fn new(kps: Vec<f32>, kds: Vec<f32>, default_angles: Vec<f32>, action_scale: f32) -> Self {
        let n = default_angles.len();
        Self {
            kps,
            kds,
            targets: default_angles.clone(),
            default_angles,
            action_scale,
            action: vec![0.0; n],
        }
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Last raw policy action.
    pub fn action(&self) -> &[f32] {
        &self.action
    }

    /// `kp·(target − q) + kd·(0 − dq)`
    pub fn torques(&self, q: &[f32], dq: &[f32]) -> Vec<f32> {
        self.targets
            .iter()
            .zip(q.iter().zip(dq))
            .zip(self.kps.iter().zip(&self.kds))
            .map(|((target, (q, dq)), (kp, kd))| kp * (target - q) - kd * dq)
            .collect()
    }

    /// Stores a new action and moves the targets to `action·scale + default`.
    pub fn apply_action(&mut self, action: Vec<f32>) {
        for ((target, a), default) in self.targets.iter_mut().zip(&action).zip(&self.default_angles) {
            *target = a * self.action_scale + default;
        }
        self.action = action;
    }

    pub fn reset(&mut self) {
        self.action.fill(0.0);
        self.targets.copy_from_slice(&self.default_angles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pd() -> PdController {
        PdController::new(vec![100.0, 50.0], vec![2.0, 1.0], vec![0.1, -0.2], 0.25)
    }

    #[test]
    fn test_torques_hold_default_pose() {
        let pd = pd();
        let tau = pd.torques(&[0.1, -0.2], &[0.0, 0.0]);
        assert_eq!(tau, vec![0.0, 0.0]);

        let tau = pd.torques(&[0.0, 0.0], &[1.0, -1.0]);
        assert_relative_eq!(tau[0], 100.0 * 0.1 - 2.0);
        assert_relative_eq!(tau[1], 50.0 * -0.2 + 1.0);
    }

    #[test]
    fn test_action_moves_targets() {
        let mut pd = pd();
        pd.apply_action(vec![1.0, -2.0]);
        assert_relative_eq!(pd.targets()[0], 0.35);
        assert_relative_eq!(pd.targets()[1], -0.7);
        assert_eq!(pd.action(), &[1.0, -2.0]);

        pd.reset();
        assert_eq!(pd.targets(), &[0.1, -0.2]);
        assert_eq!(pd.action(), &[0.0, 0.0]);
    }
}
