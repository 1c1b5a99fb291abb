// 📐 Feature Contract - Shape validation for model input rows
// The same contract value is used when writing training rows and when
// reading prediction requests, so both sides agree on names and order.

use crate::attributes::{CustomerFeatureRow, FeatureCatalog, FeatureVector, FEATURE_COUNT};
use crate::error::{ClvError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Bumped whenever the feature set or its order changes
pub const CONTRACT_VERSION: &str = "v1";

/// A candidate row: feature name -> JSON value. Extra keys are allowed.
pub type CandidateRow = Map<String, Value>;

// ============================================================================
// VALIDATED BATCH
// ============================================================================

/// Proof that every row of a batch carries all required features.
///
/// Only `FeatureContract::validate` constructs this, so `select` cannot be
/// reached with unvalidated input.
#[derive(Debug)]
pub struct ValidatedBatch<'a> {
    rows: &'a [CandidateRow],
}

impl<'a> ValidatedBatch<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// FEATURE CONTRACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    version: &'static str,
    names: Vec<String>,
}

impl FeatureContract {
    /// Contract over the catalog's eight features
    pub fn new() -> Self {
        let catalog = FeatureCatalog::new();
        FeatureContract {
            version: CONTRACT_VERSION,
            names: catalog.names().into_iter().map(String::from).collect(),
        }
    }

    pub fn version(&self) -> &str {
        self.version
    }

    /// Required names in canonical order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Required names absent from one row, canonical order
    pub fn missing(&self, row: &CandidateRow) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| !row.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Check every row for the required names.
    ///
    /// Missing names are collected across the whole batch; a single absent
    /// name in any row rejects the batch. Nothing is ever filled in.
    pub fn validate<'a>(&self, rows: &'a [CandidateRow]) -> Result<ValidatedBatch<'a>> {
        let mut absent: BTreeSet<usize> = BTreeSet::new();

        for row in rows {
            for (idx, name) in self.names.iter().enumerate() {
                if !row.contains_key(name.as_str()) {
                    absent.insert(idx);
                }
            }
        }

        if absent.is_empty() {
            Ok(ValidatedBatch { rows })
        } else {
            Err(ClvError::Schema {
                missing: absent.into_iter().map(|idx| self.names[idx].clone()).collect(),
            })
        }
    }

    /// Project the required columns in canonical order.
    ///
    /// Extra keys are ignored. Values must be JSON numbers; anything else is
    /// a `Payload` error naming the row and field.
    pub fn select(&self, batch: &ValidatedBatch<'_>) -> Result<Vec<FeatureVector>> {
        batch
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut vector = [0.0; FEATURE_COUNT];
                for (slot, name) in vector.iter_mut().zip(self.names.iter()) {
                    let value = row
                        .get(name.as_str())
                        .ok_or_else(|| ClvError::Schema { missing: vec![name.clone()] })?;
                    *slot = value
                        .as_f64()
                        .ok_or_else(|| {
                            ClvError::payload(format!("row {}, '{}'", i, name), format!("expected a number, got {}", value))
                        })?;
                }
                Ok(vector)
            })
            .collect()
    }

    /// Training-side projection of builder output through the same contract
    pub fn vectorize(&self, rows: &[CustomerFeatureRow]) -> Result<Vec<FeatureVector>> {
        let candidates = rows
            .iter()
            .map(CustomerFeatureRow::to_candidate)
            .collect::<Result<Vec<_>>>()?;
        let validated = self.validate(&candidates)?;
        self.select(&validated)
    }
}

impl Default for FeatureContract {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
