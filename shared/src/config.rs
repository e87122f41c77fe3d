/// Physics tuning for the ball stepper
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PhysicsParams {
    /// Coefficient of restitution for ball-ball impacts (0..1)
    pub restitution_ball: f64,
    /// Coefficient of restitution for rail impacts (0..1)
    pub restitution_rail: f64,
    /// Linear rolling friction (1/second). Higher = stops sooner.
    pub rolling_friction_per_sec: f64,
    /// Speeds below this are clamped to 0 at the end of a step.
    pub stop_speed: f64,
    /// Cap on collision iterations per step.
    pub max_substeps: u32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            restitution_ball: 0.93,
            restitution_rail: 0.85,
            rolling_friction_per_sec: 1.2,
            stop_speed: 0.02,
            max_substeps: 24,
        }
    }
}

impl PhysicsParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.restitution_ball) {
            return Err("restitution_ball must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.restitution_rail) {
            return Err("restitution_rail must be in [0, 1]".to_string());
        }
        if !self.rolling_friction_per_sec.is_finite() || self.rolling_friction_per_sec < 0.0 {
            return Err("rolling_friction_per_sec must be finite and >= 0".to_string());
        }
        if !self.stop_speed.is_finite() || self.stop_speed < 0.0 {
            return Err("stop_speed must be finite and >= 0".to_string());
        }
        if self.max_substeps == 0 {
            return Err("max_substeps must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_physics_params_are_valid() {
        assert!(PhysicsParams::default().validate().is_ok());
    }

    #[test]
    fn restitution_above_one_invalid() {
        let params = PhysicsParams {
            restitution_rail: 1.2,
            ..PhysicsParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn zero_substeps_invalid() {
        let params = PhysicsParams {
            max_substeps: 0,
            ..PhysicsParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn negative_friction_invalid() {
        let mut params = PhysicsParams::default();
        params.rolling_friction_per_sec = -0.5;
        assert!(params.validate().is_err());
    }
}
