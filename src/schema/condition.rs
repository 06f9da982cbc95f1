use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::variable::{value_of, VariableMap, VariableRange};

/// A gating predicate over variable ranges and unlocked achievements.
///
/// Choices and scenes spell the fields `requiredVariables` /
/// `requiredAchievements`; endings spell them `variables` / `achievements`.
/// Both shapes deserialize into this type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    #[serde(default, alias = "variables")]
    pub required_variables: BTreeMap<String, VariableRange>,
    #[serde(default, alias = "achievements")]
    pub required_achievements: Vec<String>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.required_variables.is_empty() && self.required_achievements.is_empty()
    }

    /// Returns true if every variable range holds and every required
    /// achievement has been unlocked. Undeclared variables read as 0.
    pub fn is_met(&self, variables: &VariableMap, achievements: &[String]) -> bool {
        ranges_hold(&self.required_variables, variables)
            && self
                .required_achievements
                .iter()
                .all(|required| achievements.iter().any(|a| a == required))
    }
}

/// Returns true if each named variable's value lies within its range.
pub fn ranges_hold(ranges: &BTreeMap<String, VariableRange>, variables: &VariableMap) -> bool {
    ranges
        .iter()
        .all(|(name, range)| range.contains(value_of(variables, name)))
}
