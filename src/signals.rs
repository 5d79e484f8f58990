//! Signal catalog
//!
//! Maps each signal name to where it lives in a day's payload and how it is
//! rolled up over a period. Moving a metric inside the payload means editing
//! one entry here; the builder never hard-codes payload shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::CatalogError;

/// How a signal's daily values are combined over the target range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Sum,
    Avg,
    Max,
    Min,
    /// Chronologically last value
    Last,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::Avg => "avg",
            AggregationMethod::Max => "max",
            AggregationMethod::Min => "min",
            AggregationMethod::Last => "last",
        }
    }

    /// Parse a method name. Unrecognized names fall back to `Avg`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sum" => AggregationMethod::Sum,
            "avg" | "mean" => AggregationMethod::Avg,
            "max" => AggregationMethod::Max,
            "min" => AggregationMethod::Min,
            "last" => AggregationMethod::Last,
            other => {
                tracing::debug!(method = other, "unknown aggregation method, using avg");
                AggregationMethod::Avg
            }
        }
    }
}

/// Static definition of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub name: String,
    /// Dot path into the payload; `None` reads the top-level field named after the signal
    pub path: Option<String>,
    pub aggregation: AggregationMethod,
    pub unit: Option<String>,
}

impl SignalSpec {
    pub fn new(name: &str, path: &str, aggregation: AggregationMethod, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.to_string()),
            aggregation,
            unit: Some(unit.to_string()),
        }
    }
}

/// Immutable, validated set of signal definitions in configured order
#[derive(Debug, Clone)]
pub struct SignalCatalog {
    specs: Vec<SignalSpec>,
}

impl SignalCatalog {
    /// Build a catalog, rejecting duplicate names
    pub fn new(specs: Vec<SignalSpec>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(CatalogError::DuplicateSignal(spec.name.clone()));
            }
        }
        Ok(Self { specs })
    }

    /// The compiled-in catalog, validated once per process
    pub fn builtin() -> &'static SignalCatalog {
        static CATALOG: OnceLock<SignalCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            SignalCatalog::new(builtin_specs()).expect("built-in signal catalog must be valid")
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&SignalSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.specs.iter().map(|spec| spec.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Serializable description of every signal, for catalog listings
    pub fn describe(&self) -> Vec<SignalDescription> {
        self.specs
            .iter()
            .map(|spec| SignalDescription {
                name: spec.name.clone(),
                display_name: display_name(&spec.name),
                path: spec
                    .path
                    .clone()
                    .unwrap_or_else(|| spec.name.clone()),
                aggregation: spec.aggregation,
                unit: spec.unit.clone(),
            })
            .collect()
    }
}

/// Catalog entry as exposed to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescription {
    pub name: String,
    pub display_name: String,
    pub path: String,
    pub aggregation: AggregationMethod,
    pub unit: Option<String>,
}

/// "steps_total" -> "Steps Total"
pub fn display_name(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn builtin_specs() -> Vec<SignalSpec> {
    use AggregationMethod::*;

    vec![
        SignalSpec::new("steps_total", "steps_total", Sum, "steps"),
        SignalSpec::new("weight_kg", "body_metrics.weight_kg", Last, "kg"),
        SignalSpec::new(
            "body_fat_percentage",
            "body_metrics.body_fat_percentage",
            Last,
            "%",
        ),
        SignalSpec::new("avg_hr", "heart_rate_summary.avg_hr", Avg, "bpm"),
        SignalSpec::new("max_hr", "heart_rate_summary.max_hr", Max, "bpm"),
        SignalSpec::new("min_hr", "heart_rate_summary.min_hr", Min, "bpm"),
        SignalSpec::new("resting_hr", "heart_rate_summary.resting_hr", Avg, "bpm"),
        SignalSpec::new(
            "sleep_duration_minutes",
            "sleep_sessions.0.duration_minutes",
            Avg,
            "min",
        ),
        SignalSpec::new("calories_total", "nutrition_summary.calories_total", Sum, "kcal"),
        SignalSpec::new("protein_grams", "nutrition_summary.protein_grams", Sum, "g"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = SignalCatalog::builtin();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.list_names()[0], "steps_total");
    }

    #[test]
    fn test_lookup() {
        let catalog = SignalCatalog::builtin();
        let spec = catalog.lookup("sleep_duration_minutes").unwrap();
        assert_eq!(spec.path.as_deref(), Some("sleep_sessions.0.duration_minutes"));
        assert_eq!(spec.aggregation, AggregationMethod::Avg);
        assert!(catalog.lookup("vo2_max").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let specs = vec![
            SignalSpec::new("steps_total", "steps_total", AggregationMethod::Sum, "steps"),
            SignalSpec::new("steps_total", "steps", AggregationMethod::Max, "steps"),
        ];
        assert_eq!(
            SignalCatalog::new(specs).unwrap_err(),
            CatalogError::DuplicateSignal("steps_total".to_string())
        );
    }

    #[test]
    fn test_unknown_method_falls_back_to_avg() {
        assert_eq!(AggregationMethod::from_name("SUM"), AggregationMethod::Sum);
        assert_eq!(AggregationMethod::from_name("last"), AggregationMethod::Last);
        assert_eq!(AggregationMethod::from_name("median"), AggregationMethod::Avg);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("steps_total"), "Steps Total");
        assert_eq!(display_name("avg_hr"), "Avg Hr");
    }
}
