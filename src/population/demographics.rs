//! Seeding new individuals with demographics

use rand::Rng;

use super::config::PopulationConfig;
use crate::core::calendar::MS_PER_YEAR;
use crate::core::types::PersonIndex;
use crate::module::pick_weighted;
use crate::person::attributes::{ETHNICITY, GENDER, RACE};
use crate::person::{person_rng, AttrValue, Person};

/// Demographic draws use their own stream so they never shift the draws
/// an individual's modules see
const DEMOGRAPHICS_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Generate individual `index` of the population described by `config`
pub fn generate(index: PersonIndex, config: &PopulationConfig) -> Person {
    let mut rng = person_rng(config.seed ^ DEMOGRAPHICS_SALT, index);
    let demographics = &config.demographics;

    let gender = if rng.gen::<f64>() < demographics.male_ratio {
        "M"
    } else {
        "F"
    };

    let weights = demographics
        .ethnicities
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e.weight));
    let total: f64 = demographics.ethnicities.iter().map(|e| e.weight).sum();
    let chosen = pick_weighted(weights, rng.gen::<f64>() * total)
        .and_then(|i| demographics.ethnicities.get(i));

    let span = config.max_age_years as i64 * MS_PER_YEAR;
    let birth = config.end_time() - rng.gen_range(0..span);

    let mut person = Person::new(index, config.seed, birth);
    person.set_attribute(GENDER, AttrValue::from(gender));
    if let Some(ethnicity) = chosen {
        person.set_attribute(ETHNICITY, AttrValue::from(ethnicity.ethnicity.as_str()));
        person.set_attribute(RACE, AttrValue::from(ethnicity.race.as_str()));
    }
    person
}
