//! Population run options

use serde::Deserialize;

use crate::core::calendar::timestamp;
use crate::core::error::{EngineError, Result};
use crate::core::types::Timestamp;

/// One ethnicity an individual can be generated with, and its race
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EthnicityWeight {
    pub ethnicity: String,
    pub race: String,
    /// Relative weight; weights need not sum to 1
    pub weight: f64,
}

impl EthnicityWeight {
    fn new(ethnicity: &str, race: &str, weight: f64) -> Self {
        Self {
            ethnicity: ethnicity.to_string(),
            race: race.to_string(),
            weight,
        }
    }
}

/// Demographic mix of generated individuals
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemographicsConfig {
    /// Share of individuals generated as male (`gender = "M"`)
    pub male_ratio: f64,
    pub ethnicities: Vec<EthnicityWeight>,
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            male_ratio: 0.5,
            ethnicities: vec![
                EthnicityWeight::new("english", "white", 0.3),
                EthnicityWeight::new("irish", "white", 0.2),
                EthnicityWeight::new("italian", "white", 0.2),
                EthnicityWeight::new("mexican", "hispanic", 0.1),
                EthnicityWeight::new("chinese", "asian", 0.1),
                EthnicityWeight::new("african", "black", 0.1),
            ],
        }
    }
}

/// Configuration for a population run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of individuals to generate
    pub size: usize,

    /// Run seed; individual `i` draws from stream `i` of this seed, so the
    /// output does not depend on `workers`
    pub seed: u64,

    /// Worker threads; 0 uses one per available core
    pub workers: usize,

    /// Module keys to enroll every individual in; empty means every
    /// registered top-level module
    pub modules: Vec<String>,

    /// Simulation horizon: individuals are run up to Jan 1 of this year
    pub end_year: i32,

    /// Individuals are born uniformly within this many years before the horizon
    pub max_age_years: u32,

    pub demographics: DemographicsConfig,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 100,
            seed: 0,
            workers: 0,
            modules: Vec::new(),
            end_year: 2020,
            max_age_years: 100,
            demographics: DemographicsConfig::default(),
        }
    }
}

impl PopulationConfig {
    pub fn end_time(&self) -> Timestamp {
        timestamp(self.end_year, 1, 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(EngineError::Config("population size must be positive".into()));
        }
        if self.max_age_years == 0 {
            return Err(EngineError::Config("max_age_years must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.demographics.male_ratio) {
            return Err(EngineError::Config(format!(
                "male_ratio ({}) must be in [0, 1]",
                self.demographics.male_ratio
            )));
        }
        let ethnicities = &self.demographics.ethnicities;
        if ethnicities.is_empty() || ethnicities.iter().any(|e| e.weight < 0.0) {
            return Err(EngineError::Config(
                "ethnicities must be non-empty with non-negative weights".into(),
            ));
        }
        if ethnicities.iter().map(|e| e.weight).sum::<f64>() <= 0.0 {
            return Err(EngineError::Config("ethnicity weights sum to zero".into()));
        }
        Ok(())
    }
}
