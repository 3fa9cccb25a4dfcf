use serde::{Deserialize, Serialize};

/// Represents invalid learning parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange { name: &'static str, value: f64 },
    #[error("{name} must be a finite number, got {value}")]
    NotFinite { name: &'static str, value: f64 },
}

/// Tunable inputs of the Q-learning engine.
///
/// Missing fields fall back to their defaults; unknown fields are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearningParameters {
    /// Discount applied to the best value of the next state.
    pub decay_rate: f64,
    /// Probability of taking a uniformly random action.
    pub exploration_rate: f64,
    /// Step size of the value update.
    pub learning_rate: f64,
    pub punishment_for_movement: f64,
    pub punishment_for_invalid_movement: f64,
    pub reward_for_package_capture: f64,
    pub reward_for_package_extraction: f64,
}

impl Default for LearningParameters {
    fn default() -> Self {
        Self {
            decay_rate: 0.9,
            exploration_rate: 0.1,
            learning_rate: 0.01,
            punishment_for_movement: -0.1,
            punishment_for_invalid_movement: -1.0,
            reward_for_package_capture: 1.0,
            reward_for_package_extraction: 1.0,
        }
    }
}

impl LearningParameters {
    /// Checks that every value is finite and that the three rates are
    /// probabilities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            ("decay_rate", self.decay_rate),
            ("exploration_rate", self.exploration_rate),
            ("learning_rate", self.learning_rate),
            ("punishment_for_movement", self.punishment_for_movement),
            (
                "punishment_for_invalid_movement",
                self.punishment_for_invalid_movement,
            ),
            ("reward_for_package_capture", self.reward_for_package_capture),
            (
                "reward_for_package_extraction",
                self.reward_for_package_extraction,
            ),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }

        let rates = [
            ("decay_rate", self.decay_rate),
            ("exploration_rate", self.exploration_rate),
            ("learning_rate", self.learning_rate),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }
        Ok(())
    }
}
