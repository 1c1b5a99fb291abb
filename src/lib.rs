// Forward Customer Value - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod attributes;    // Feature catalog + customer feature rows
pub mod schema;        // Feature contract (validate / select)
pub mod dataset;       // Transaction CSV I/O and preprocessing
pub mod temporal;      // Cutoff-based feature/label builder
pub mod prediction;    // Regressor trait + prediction service
pub mod model;         // JSON tree-ensemble regressor
pub mod evaluation;    // Error and rank metrics
pub mod observability; // Prometheus metrics + log subscriber
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ClvError, FaultKind, Result};
pub use attributes::{
    CustomerFeatureRow, FeatureCatalog, FeatureDefinition, FeatureKind,
    FeatureVector, FEATURE_COUNT,
};
pub use schema::{CandidateRow, FeatureContract, ValidatedBatch, CONTRACT_VERSION};
pub use dataset::{
    RawTransaction, TransactionRecord,
    load_transactions, preprocess, to_records, write_feature_rows, load_feature_rows,
};
pub use temporal::{FeatureSet, TemporalFeatureBuilder, DEFAULT_HORIZON_DAYS};
pub use prediction::{Prediction, PredictionService, Regressor};
pub use model::{ForestRegressor, RegressionTree, TreeNode};
pub use evaluation::{
    EvaluationReport, evaluate, mae_log, r2, rmse_currency, rmse_log, spearman_rank,
};
pub use observability::{ServiceMetrics, init_logging};
pub use config::{AppConfig, LogFormat, PipelineConfig, ServiceConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
