use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review period a calculation config is scoped to. Quarterly and yearly
/// carry independent flag sets per department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Quarterly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
        }
    }
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarterly" => Ok(Period::Quarterly),
            "yearly" => Ok(Period::Yearly),
            other => Err(EngineError::validation(
                "period",
                format!("unknown period: {}", other),
            )),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationMethod {
    Normal,
    GoalWeight,
    ActualVsTarget,
}

impl CalculationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CalculationMethod::Normal => "Normal Calculation",
            CalculationMethod::GoalWeight => "Goal Weight Calculation",
            CalculationMethod::ActualVsTarget => "Actual vs Target Values",
        }
    }
}

/// Engine-facing view of a department/period calculation config.
///
/// `is_default` marks a config synthesized because no row was stored for the
/// department. Callers surface it as a notice; calculation treats default and
/// stored configs identically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculationSettings {
    pub use_goal_weight: bool,
    pub use_actual_values: bool,
    pub use_normal_calculation: bool,
    pub enable_employee_self_rating: bool,
    pub is_default: bool,
}

impl CalculationSettings {
    /// Fallback when a department has no stored config.
    pub fn default_config() -> Self {
        CalculationSettings {
            use_goal_weight: false,
            use_actual_values: false,
            use_normal_calculation: true,
            enable_employee_self_rating: true,
            is_default: true,
        }
    }

    /// Resolve the single applicable method. Actual-values wins over goal
    /// weight, which wins over normal; the same priority order the
    /// exclusivity rule is written in.
    pub fn method(&self) -> CalculationMethod {
        if self.use_actual_values {
            CalculationMethod::ActualVsTarget
        } else if self.use_goal_weight {
            CalculationMethod::GoalWeight
        } else {
            CalculationMethod::Normal
        }
    }

    pub fn method_name(&self) -> &'static str {
        self.method().name()
    }

    pub fn self_rating_enabled(&self) -> bool {
        self.enable_employee_self_rating
    }

    /// Mutual exclusivity: exactly one of the three method flags must be set.
    /// Enforced on write; read paths rely on it via `method()`.
    pub fn validate(&self) -> Result<(), EngineError> {
        let enabled = [
            self.use_normal_calculation,
            self.use_goal_weight,
            self.use_actual_values,
        ]
        .iter()
        .filter(|flag| **flag)
        .count();

        match enabled {
            1 => Ok(()),
            0 => Err(EngineError::InvalidConfig {
                reason: "no calculation method selected".to_string(),
            }),
            _ => Err(EngineError::InvalidConfig {
                reason: "calculation methods are mutually exclusive".to_string(),
            }),
        }
    }
}
