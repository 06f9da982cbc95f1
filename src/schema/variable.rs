use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display bound used when a variable declares no `min`.
pub const DEFAULT_DISPLAY_MIN: i64 = 0;
/// Display bound used when a variable declares no `max`.
pub const DEFAULT_DISPLAY_MAX: i64 = 10;

/// Variables keyed by name. Ordered so that display and serialization are stable.
pub type VariableMap = BTreeMap<String, StoryVariable>;

/// Reads a variable's value, treating an undeclared variable as 0.
pub fn value_of(variables: &VariableMap, name: &str) -> i64 {
    variables.get(name).map_or(0, |var| var.value)
}

/// A named numeric attribute tracked during a playthrough (e.g. "trust").
///
/// `min` and `max` are soft display bounds. They are never enforced when
/// consequences are applied, so `value` may leave the range.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryVariable {
    pub value: i64,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Coarse descriptor shown next to a variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    Novice,
    Apprentice,
    Adept,
    Expert,
    Master,
}

impl Rank {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Novice => "Novice",
            Self::Apprentice => "Apprentice",
            Self::Adept => "Adept",
            Self::Expert => "Expert",
            Self::Master => "Master",
        }
    }
}

impl StoryVariable {
    /// A fresh variable holding `value` with no bounds or display name.
    pub fn with_value(value: i64) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// The name to show for this variable: its display name, or `key`.
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(key)
    }

    /// Position of `value` within the display bounds, clamped to `0.0..=1.0`.
    pub fn fill_fraction(&self) -> f64 {
        let min = self.min.unwrap_or(DEFAULT_DISPLAY_MIN);
        let max = self.max.unwrap_or(DEFAULT_DISPLAY_MAX);
        if max <= min {
            return if self.value >= max { 1.0 } else { 0.0 };
        }
        let fraction = (i128::from(self.value) - i128::from(min)) as f64
            / (i128::from(max) - i128::from(min)) as f64;
        fraction.clamp(0.0, 1.0)
    }

    pub fn rank(&self) -> Rank {
        match self.value {
            v if v <= 2 => Rank::Novice,
            v if v <= 4 => Rank::Apprentice,
            v if v <= 6 => Rank::Adept,
            v if v <= 8 => Rank::Expert,
            _ => Rank::Master,
        }
    }
}

/// An inclusive range predicate over a variable value. Missing ends are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableRange {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl VariableRange {
    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}
