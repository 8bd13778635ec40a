//! Engine configuration with documented constants
//!
//! All tuning knobs for the interpreter are collected here with an
//! explanation of how they affect a run. A `Settings` file bundles the
//! engine knobs with the population driver's options.

use serde::Deserialize;
use std::path::Path;

use super::calendar::MS_PER_DAY;
use super::error::{EngineError, Result};
use crate::population::PopulationConfig;

/// Configuration for the module interpreter
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one simulation tick in days
    ///
    /// Guard states are re-checked once per tick, so this is also the
    /// resolution at which a guard can notice its condition became true.
    /// Delays are not quantized: a delay that expires mid-tick continues
    /// at its exact wake time.
    pub time_step_days: u32,

    /// Maximum number of states one module run may visit within a single tick
    ///
    /// Well-formed modules pass through a handful of states per tick. A
    /// module that keeps cycling through zero-time states (a distributed
    /// loop without a delay) hits this cap and the individual's run fails
    /// with a runaway-loop error instead of spinning forever.
    pub max_state_visits_per_tick: usize,

    /// Allowed deviation from 1.0 for probability rows and distributions
    ///
    /// Authored modules write weights like 0.33/0.33/0.34; at 0.001 the
    /// usual rounding is accepted while a forgotten branch is not.
    pub probability_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_step_days: 7,
            max_state_visits_per_tick: 10_000,
            probability_tolerance: 0.001,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of one tick in milliseconds
    pub fn time_step_ms(&self) -> i64 {
        self.time_step_days as i64 * MS_PER_DAY
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.time_step_days == 0 {
            return Err(EngineError::Config(
                "time_step_days must be at least 1".into(),
            ));
        }
        if self.max_state_visits_per_tick == 0 {
            return Err(EngineError::Config(
                "max_state_visits_per_tick must be positive".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.probability_tolerance) {
            return Err(EngineError::Config(format!(
                "probability_tolerance ({}) must be in [0, 0.5)",
                self.probability_tolerance
            )));
        }
        Ok(())
    }
}

/// Everything a population run needs, as read from a TOML settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub population: PopulationConfig,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.population.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_time_step_rejected() {
        let config = EngineConfig {
            time_step_days: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_time_step_ms() {
        let config = EngineConfig::default();
        assert_eq!(config.time_step_ms(), 7 * MS_PER_DAY);
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_toml_str(
            r#"
[engine]
time_step_days = 1

[population]
size = 20
seed = 99
workers = 2
modules = ["lookuptable_test"]
"#,
        )
        .unwrap();
        assert_eq!(settings.engine.time_step_days, 1);
        assert_eq!(settings.engine.max_state_visits_per_tick, 10_000);
        assert_eq!(settings.population.size, 20);
        assert_eq!(settings.population.modules, vec!["lookuptable_test".to_string()]);
    }
}
