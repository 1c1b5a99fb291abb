// 📊 Evaluation Metrics
// Accuracy and ranking metrics over (true, predicted) pairs in log scale.
// All functions fail fast: no metric is computed from mismatched input.

use crate::error::{ClvError, Result};
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Persisted evaluation artifact.
///
/// `spearman_rank` is NaN when either sequence is constant; serde_json
/// writes that as `null`, so the report is write-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub rmse_log: f64,
    pub mae_log: f64,
    pub r2: f64,
    pub rmse_currency: f64,
    pub spearman_rank: f64,
}

impl EvaluationReport {
    pub fn summary(&self) -> String {
        format!(
            "RMSE(log): {:.4}, MAE(log): {:.4}, R²: {:.4}, RMSE(currency): {:.2}, Spearman: {:.4}",
            self.rmse_log, self.mae_log, self.r2, self.rmse_currency, self.spearman_rank
        )
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize metrics")?;
        fs::write(path, json).with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Metrics saved");
        Ok(())
    }
}

/// Compute every metric for one evaluation run
pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Result<EvaluationReport> {
    check_dimensions(y_true, y_pred)?;

    Ok(EvaluationReport {
        rmse_log: rmse_log(y_true, y_pred)?,
        mae_log: mae_log(y_true, y_pred)?,
        r2: r2(y_true, y_pred)?,
        rmse_currency: rmse_currency(y_true, y_pred)?,
        spearman_rank: spearman_rank(y_true, y_pred)?,
    })
}

fn check_dimensions(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ClvError::Dimension {
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(ClvError::EmptyInput);
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mse = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64;
    mse.sqrt()
}

pub fn rmse_log(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_dimensions(y_true, y_pred)?;
    Ok(rmse(y_true, y_pred))
}

pub fn mae_log(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_dimensions(y_true, y_pred)?;
    let total: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    Ok(total / y_true.len() as f64)
}

/// Coefficient of determination.
///
/// Constant true values: 1.0 for a perfect fit, 0.0 otherwise.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_dimensions(y_true, y_pred)?;

    let mu = mean(y_true);
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mu).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// RMSE after undoing log1p on both sides
pub fn rmse_currency(y_true_log: &[f64], y_pred_log: &[f64]) -> Result<f64> {
    check_dimensions(y_true_log, y_pred_log)?;

    let y_true: Vec<f64> = y_true_log.iter().map(|v| v.exp_m1()).collect();
    let y_pred: Vec<f64> = y_pred_log.iter().map(|v| v.exp_m1()).collect();
    Ok(rmse(&y_true, &y_pred))
}

/// Spearman rank correlation with average ranks for ties
pub fn spearman_rank(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_dimensions(y_true, y_pred)?;
    Ok(pearson(&average_ranks(y_true), &average_ranks(y_pred)))
}

/// 1-based ranks; tied values share the mean of their positions
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1 ..= end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        var_x += (a - mx).powi(2);
        var_y += (b - my).powi(2);
    }

    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

// ============================================================================
// TESTS
// ============================================================================
