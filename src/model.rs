// 🌲 Forest Regressor - fitted tree ensemble loaded from JSON
// Training happens elsewhere; this only walks the exported trees.
// Split rule: go left when value <= threshold.

use crate::attributes::{FeatureVector, FEATURE_COUNT};
use crate::error::{ClvError, Result};
use crate::prediction::Regressor;
use crate::schema::FeatureContract;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict_one(&self, row: &FeatureVector) -> Result<f64> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let x = row
                        .get(*feature)
                        .ok_or_else(|| ClvError::Inference(format!("split on unknown feature {}", feature)))?;
                    idx = if *x <= *threshold { *left } else { *right };
                }
                None => return Err(ClvError::Inference(format!("node {} does not exist", idx))),
            }
        }
        Err(ClvError::Inference("tree contains a cycle".to_string()))
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, threshold, left, right } = node {
                if *feature >= FEATURE_COUNT {
                    return Err(format!("node {} splits on feature {}", i, feature));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", i));
                }
                if *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {} points outside the tree", i));
                }
                if *left <= i || *right <= i {
                    return Err(format!("node {} points backwards", i));
                }
            }
        }
        Ok(())
    }
}

/// ForestRegressor - mean of the tree outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestRegressor {
    #[serde(default = "default_name")]
    pub name: String,

    /// Feature names in the column order the model was fitted on
    pub feature_names: Vec<String>,

    pub trees: Vec<RegressionTree>,
}

fn default_name() -> String {
    "forest".to_string()
}

impl ForestRegressor {
    pub fn from_json_str(json: &str, contract: &FeatureContract) -> anyhow::Result<Self> {
        let model: ForestRegressor = serde_json::from_str(json).context("Failed to parse model JSON")?;
        model.check_against(contract)?;
        Ok(model)
    }

    pub fn load(path: &Path, contract: &FeatureContract) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        let model = Self::from_json_str(&json, contract)
            .with_context(|| format!("Invalid model file {}", path.display()))?;

        info!(
            path = %path.display(),
            model = %model.name,
            trees = model.trees.len(),
            contract = contract.version(),
            "Model loaded"
        );
        Ok(model)
    }

    /// The model must have been fitted on exactly the contract's columns
    pub fn check_against(&self, contract: &FeatureContract) -> anyhow::Result<()> {
        if self.feature_names.as_slice() != contract.names() {
            bail!(
                "model features {:?} do not match contract {} {:?}",
                self.feature_names,
                contract.version(),
                contract.names()
            );
        }
        if self.trees.is_empty() {
            bail!("model has no trees");
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if let Err(problem) = tree.check() {
                bail!("tree {}: {}", i, problem);
            }
        }
        Ok(())
    }
}

impl Regressor for ForestRegressor {
    fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(ClvError::Inference("model has no trees".to_string()));
        }

        rows.iter()
            .map(|row| {
                let mut total = 0.0;
                for tree in &self.trees {
                    total += tree.predict_one(row)?;
                }
                Ok(total / self.trees.len() as f64)
            })
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// TESTS
// ============================================================================
