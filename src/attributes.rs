// 🏛️ Feature Catalog - Customer feature definitions
// Each feature is defined once here; the contract, the builder and the form
// parser all reference these definitions instead of repeating string names.

use crate::error::{ClvError, Result};
use serde::{Deserialize, Serialize};

/// Number of model input features
pub const FEATURE_COUNT: usize = 8;

/// Feature values in canonical contract order
pub type FeatureVector = [f64; FEATURE_COUNT];

// ============================================================================
// FEATURE TYPES
// ============================================================================

/// Numeric kind of a feature slot.
///
/// Integer slots are whole numbers on the wire (form input is parsed as i64);
/// every slot is handed to the model as f64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Integer,
    Float,
}

impl FeatureKind {
    /// Coerce a raw scalar string into the slot's numeric type
    pub fn coerce(&self, field: &str, raw: &str) -> Result<f64> {
        let raw = raw.trim();
        match self {
            FeatureKind::Integer => raw
                .parse::<i64>()
                .map(|v| v as f64)
                .map_err(|e| ClvError::parse(field, format!("expected a whole number, got '{}' ({})", raw, e))),
            FeatureKind::Float => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|e| ClvError::parse(field, format!("expected a decimal number, got '{}' ({})", raw, e)))?;
                if !value.is_finite() {
                    return Err(ClvError::parse(field, format!("expected a finite number, got '{}'", raw)));
                }
                Ok(value)
            }
        }
    }
}

// ============================================================================
// FEATURE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDefinition {
    /// Column / JSON key name (e.g., "unique_invoices")
    pub name: String,

    pub kind: FeatureKind,

    /// What does this feature measure?
    pub description: String,

    /// Example values, for docs and the HTML form
    pub examples: Vec<String>,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        FeatureDefinition {
            name: name.into(),
            kind,
            description: String::new(),
            examples: Vec::new(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add example
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }
}

// ============================================================================
// FEATURE CATALOG
// ============================================================================

/// FeatureCatalog - ordered list of the customer features
///
/// Order matters: it is the column order the model was trained on.
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    features: Vec<FeatureDefinition>,
}

impl FeatureCatalog {
    /// Catalog with the eight CLV features in canonical order
    pub fn new() -> Self {
        let features = vec![
            FeatureDefinition::new("unique_invoices", FeatureKind::Integer)
                .with_description("Distinct invoices in the feature window")
                .with_example("5"),
            FeatureDefinition::new("total_quantity", FeatureKind::Integer)
                .with_description("Sum of purchased quantity in the feature window")
                .with_example("100"),
            FeatureDefinition::new("avg_quantity_per_order", FeatureKind::Float)
                .with_description("Mean quantity per transaction line")
                .with_example("20.0"),
            FeatureDefinition::new("unit_price_std", FeatureKind::Float)
                .with_description("Sample standard deviation of unit price, 0 for a single line")
                .with_example("10.5"),
            FeatureDefinition::new("customer_age_days", FeatureKind::Integer)
                .with_description("Whole days from first purchase to the cutoff")
                .with_example("365"),
            FeatureDefinition::new("days_since_last_purchase", FeatureKind::Integer)
                .with_description("Whole days from last purchase to the cutoff")
                .with_example("30"),
            FeatureDefinition::new("average_days_between_purchase", FeatureKind::Float)
                .with_description("customer_age_days / unique_invoices")
                .with_example("45.0"),
            FeatureDefinition::new("is_onetime_buyer", FeatureKind::Integer)
                .with_description("1 when the customer has exactly one invoice, else 0")
                .with_example("0"),
        ];

        FeatureCatalog { features }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&FeatureDefinition> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn list_all(&self) -> &[FeatureDefinition] {
        &self.features
    }

    pub fn count(&self) -> usize {
        self.features.len()
    }
}

impl Default for FeatureCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CUSTOMER FEATURE ROW
// ============================================================================

/// One customer's features plus the log-scale label.
///
/// The customer id is only a join key inside the builder and is not kept.
/// Field order matches the contract so CSV columns come out in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatureRow {
    pub unique_invoices: i64,
    pub total_quantity: i64,
    pub avg_quantity_per_order: f64,
    pub unit_price_std: f64,
    pub customer_age_days: i64,
    pub days_since_last_purchase: i64,
    pub average_days_between_purchase: f64,
    pub is_onetime_buyer: i64,

    /// log1p of label-window spend
    pub target_clv: f64,
}

impl CustomerFeatureRow {
    /// Row as a JSON object, the shape the contract validates
    pub fn to_candidate(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(ClvError::Computation(format!(
                "feature row serialized to {} instead of an object",
                other
            ))),
            Err(e) => Err(ClvError::Computation(format!("feature row not serializable: {}", e))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
