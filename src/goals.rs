//! Goal catalog
//!
//! Static targets attached to signals. The builder reads these to add
//! progress, status, trend and priority to a card; nothing here is
//! user-editable at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::CatalogError;

/// Name of the virtual signal derived from manual tracking coverage
pub const TRACKING_CONSISTENCY: &str = "tracking_consistency";

/// Which side of the target counts as success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// At least the target
    Minimum,
    /// At most the target
    Maximum,
    /// As close to the target as possible
    Exact,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Minimum => "minimum",
            TargetType::Maximum => "maximum",
            TargetType::Exact => "exact",
        }
    }

    /// Parse a target type name; unknown names have no target semantics
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "minimum" | "min" => Some(TargetType::Minimum),
            "maximum" | "max" => Some(TargetType::Maximum),
            "exact" => Some(TargetType::Exact),
            _ => None,
        }
    }
}

/// Static definition of one goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSpec {
    pub signal_name: String,
    pub target_value: f64,
    pub target_type: TargetType,
    /// 1 is the most important tier
    pub priority: u32,
    pub window_days: u32,
    pub label: String,
}

/// Immutable, validated set of goals (at most one per signal)
#[derive(Debug, Clone)]
pub struct GoalCatalog {
    goals: Vec<GoalSpec>,
}

impl GoalCatalog {
    pub fn new(goals: Vec<GoalSpec>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for goal in &goals {
            if goal.priority == 0 {
                return Err(CatalogError::InvalidPriority(goal.signal_name.clone()));
            }
            if !seen.insert(goal.signal_name.as_str()) {
                return Err(CatalogError::DuplicateGoal(goal.signal_name.clone()));
            }
        }
        Ok(Self { goals })
    }

    /// A catalog with no goals; cards built with it carry no priority summary
    pub fn empty() -> Self {
        Self { goals: Vec::new() }
    }

    pub fn builtin() -> &'static GoalCatalog {
        static CATALOG: OnceLock<GoalCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            GoalCatalog::new(builtin_goals()).expect("built-in goal catalog must be valid")
        })
    }

    pub fn lookup(&self, signal_name: &str) -> Option<&GoalSpec> {
        self.goals.iter().find(|goal| goal.signal_name == signal_name)
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.goals.iter().map(|goal| goal.signal_name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GoalSpec> {
        self.goals.iter()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Goals ordered by priority tier, for catalog listings
    pub fn describe(&self) -> Vec<GoalSpec> {
        let mut goals = self.goals.clone();
        goals.sort_by_key(|goal| goal.priority);
        goals
    }
}

fn builtin_goals() -> Vec<GoalSpec> {
    vec![
        GoalSpec {
            signal_name: TRACKING_CONSISTENCY.to_string(),
            target_value: 1.0,
            target_type: TargetType::Minimum,
            priority: 1,
            window_days: 7,
            label: "Tracking consistency".to_string(),
        },
        GoalSpec {
            signal_name: "calories_total".to_string(),
            target_value: 2000.0,
            target_type: TargetType::Maximum,
            priority: 2,
            window_days: 1,
            label: "Calorie target".to_string(),
        },
        GoalSpec {
            signal_name: "steps_total".to_string(),
            target_value: 8000.0,
            target_type: TargetType::Minimum,
            priority: 3,
            window_days: 1,
            label: "Daily steps".to_string(),
        },
    ]
}
