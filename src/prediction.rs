// 🔮 Prediction Service
// Raw client input → contract validation → model → expm1 → response values.
// A request either yields a prediction for every row or fails as a whole.

use crate::attributes::{FeatureCatalog, FeatureVector};
use crate::error::{ClvError, FaultKind, Result};
use crate::schema::{CandidateRow, FeatureContract};
use crate::temporal::round2;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// MODEL CAPABILITY
// ============================================================================

/// Regressor - a fitted model that maps feature rows to log-scale values
///
/// Implementations must be usable from many requests at once without
/// locking, so `predict` takes `&self`.
pub trait Regressor: Send + Sync {
    /// One output per input row, in the same order
    fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>>;

    /// Model name for logs
    fn name(&self) -> &str {
        "regressor"
    }
}

/// A single prediction in both scales
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Model output (log1p scale)
    pub log_value: f64,

    /// expm1(log_value), in currency
    pub value: f64,
}

impl Prediction {
    pub fn from_log(log_value: f64) -> Self {
        Prediction {
            log_value,
            value: log_value.exp_m1(),
        }
    }
}

// ============================================================================
// PREDICTION SERVICE
// ============================================================================

/// PredictionService - owns nothing but a handle to the shared model
#[derive(Clone)]
pub struct PredictionService {
    model: Arc<dyn Regressor>,
    contract: FeatureContract,
    catalog: FeatureCatalog,
}

impl PredictionService {
    pub fn new(model: Arc<dyn Regressor>, contract: FeatureContract) -> Self {
        PredictionService {
            model,
            contract,
            catalog: FeatureCatalog::new(),
        }
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run the model on already selected rows and undo the log transform
    pub fn predict_rows(&self, rows: &[FeatureVector]) -> Result<Vec<Prediction>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let outputs = self.model.predict(rows)?;

        if outputs.len() != rows.len() {
            return Err(ClvError::Inference(format!(
                "model '{}' returned {} outputs for {} rows",
                self.model.name(),
                outputs.len(),
                rows.len()
            )));
        }
        if let Some(pos) = outputs.iter().position(|v| !v.is_finite()) {
            return Err(ClvError::Inference(format!(
                "model '{}' returned a non-finite value for row {}",
                self.model.name(),
                pos
            )));
        }

        Ok(outputs.into_iter().map(Prediction::from_log).collect())
    }

    /// Batch path: a JSON array of feature objects → currency-scale values
    pub fn predict_batch(&self, payload: &Value) -> Result<Vec<f64>> {
        let result = self.batch_inner(payload);
        if let Err(e) = &result {
            log_failure("predict_batch", e);
        }
        result
    }

    fn batch_inner(&self, payload: &Value) -> Result<Vec<f64>> {
        let rows = candidate_rows(payload)?;
        let validated = self.contract.validate(&rows)?;
        let selected = self.contract.select(&validated)?;
        let predictions = self.predict_rows(&selected)?;

        debug!(rows = predictions.len(), model = self.model.name(), "Batch prediction served");
        Ok(predictions.into_iter().map(|p| p.value).collect())
    }

    /// Form path: eight string fields, each coerced to its slot type.
    ///
    /// Returns the currency value rounded to two decimals.
    pub fn predict_form(&self, fields: &HashMap<String, String>) -> Result<f64> {
        let result = self.form_inner(fields);
        if let Err(e) = &result {
            log_failure("predict_form", e);
        }
        result
    }

    fn form_inner(&self, fields: &HashMap<String, String>) -> Result<f64> {
        let row = self.coerce_form(fields)?;
        let rows = [row];
        let validated = self.contract.validate(&rows)?;
        let selected = self.contract.select(&validated)?;

        let prediction = self
            .predict_rows(&selected)?
            .into_iter()
            .next()
            .ok_or_else(|| ClvError::Inference("model returned no output".to_string()))?;

        Ok(round2(prediction.value))
    }

    /// Every field is parsed before anything is returned; absent fields are
    /// reported together, a malformed one aborts the request.
    fn coerce_form(&self, fields: &HashMap<String, String>) -> Result<CandidateRow> {
        let mut row = CandidateRow::new();
        let mut missing = Vec::new();

        for name in self.contract.names() {
            let Some(raw) = fields.get(name.as_str()) else {
                missing.push(name.clone());
                continue;
            };
            let kind = self
                .catalog
                .get_by_name(name)
                .map(|def| def.kind)
                .ok_or_else(|| ClvError::Computation(format!("feature '{}' is not in the catalog", name)))?;
            let value = kind.coerce(name, raw)?;
            row.insert(name.clone(), Value::from(value));
        }

        if !missing.is_empty() {
            return Err(ClvError::Schema { missing });
        }
        Ok(row)
    }
}

fn candidate_rows(payload: &Value) -> Result<Vec<CandidateRow>> {
    let items = payload
        .as_array()
        .ok_or_else(|| ClvError::payload("payload", "expected a JSON array of feature objects"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object()
                .cloned()
                .ok_or_else(|| ClvError::payload(format!("payload[{}]", i), "expected a JSON object"))
        })
        .collect()
}

fn log_failure(operation: &str, err: &ClvError) {
    match (err.fault(), err) {
        (FaultKind::Client, ClvError::Schema { missing }) => {
            warn!(operation, missing = ?missing, "Rejected request with missing features")
        }
        (FaultKind::Client, _) => warn!(operation, error = %err, "Rejected malformed request"),
        (FaultKind::Internal, _) => error!(operation, error = %err, "Prediction failed"),
    }
}

// ============================================================================
// TESTS
// ============================================================================
