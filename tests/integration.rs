//! Integration tests for the CSV → features → evaluation pipeline

use forward_clv::{
    evaluate, load_feature_rows, load_transactions, preprocess, write_feature_rows, FeatureContract,
    ForestRegressor, PredictionService, TemporalFeatureBuilder,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Create a test CSV file in the retail export layout
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country").unwrap();

    // Customer 17850 - three invoices before the cutoff, one after
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,2,2011-06-01 08:26:00,10.0,17850.0,United Kingdom").unwrap();
    writeln!(file, "536366,71053,WHITE METAL LANTERN,3,2011-07-01 08:28:00,10.0,17850.0,United Kingdom").unwrap();
    writeln!(file, "536367,22633,HAND WARMER UNION JACK,5,2011-08-01 09:00:00,12.0,17850.0,United Kingdom").unwrap();
    writeln!(file, "569001,22633,HAND WARMER UNION JACK,5,2011-11-01 10:00:00,10.0,17850.0,United Kingdom").unwrap();

    // Cancellation of an 17850 order after the cutoff - must not reduce spend
    writeln!(file, "C569002,22633,HAND WARMER UNION JACK,-5,2011-11-02 10:00:00,10.0,17850.0,United Kingdom").unwrap();

    // Customer 13047 - one invoice before, spend after
    writeln!(file, "536368,84406B,CREAM CUPID HEARTS COAT HANGER,8,2011-03-01 08:34:00,2.75,13047.0,United Kingdom").unwrap();
    writeln!(file, "569010,84406B,CREAM CUPID HEARTS COAT HANGER,4,2011-12-01 12:00:00,2.5,13047.0,United Kingdom").unwrap();

    // Customer 12345 - only after the cutoff
    writeln!(file, "569020,22752,SET 7 BABUSHKA NESTING BOXES,2,2011-10-05 10:15:00,7.65,12345.0,United Kingdom").unwrap();

    // Anonymous line - dropped by preprocessing
    writeln!(file, "569030,21730,GLASS STAR FROSTED T-LIGHT HOLDER,12,2011-10-05 10:15:00,1.25,,United Kingdom").unwrap();

    file
}

fn model_json() -> String {
    let names = FeatureContract::new().names().to_vec();
    serde_json::json!({
        "name": "integration_forest",
        "feature_names": names,
        "trees": [
            { "nodes": [
                { "split": { "feature": 7, "threshold": 0.5, "left": 1, "right": 2 } },
                { "leaf": { "value": 3.9 } },
                { "leaf": { "value": 2.3 } }
            ]}
        ]
    })
    .to_string()
}

#[test]
fn test_end_to_end_pipeline() {
    let csv = create_test_csv();

    // Load and preprocess
    let raw = load_transactions(csv.path()).unwrap();
    assert_eq!(raw.len(), 9);
    let cleaned = preprocess(raw);
    assert_eq!(cleaned.len(), 7);

    // Build features
    let set = TemporalFeatureBuilder::default().build_from_raw(&cleaned).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.dropped_without_history, 1);

    // Rows are ordered by customer id: 13047 then 17850
    let onetime = &set.rows[0];
    assert_eq!(onetime.unique_invoices, 1);
    assert_eq!(onetime.is_onetime_buyer, 1);
    assert_eq!(onetime.unit_price_std, 0.0);
    assert!((onetime.target_clv - 10f64.ln_1p()).abs() < 1e-9);

    let repeat = &set.rows[1];
    assert_eq!(repeat.unique_invoices, 3);
    assert_eq!(repeat.total_quantity, 10);
    assert_eq!(repeat.is_onetime_buyer, 0);
    assert!((repeat.target_clv - 50f64.ln_1p()).abs() < 1e-9);

    // Round-trip through the processed CSV
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("processed").join("test_data.csv");
    write_feature_rows(&features_path, &set.rows).unwrap();
    let rows = load_feature_rows(&features_path).unwrap();
    assert_eq!(rows, set.rows);

    // Score with a model through the contract
    let contract = FeatureContract::new();
    let model = ForestRegressor::from_json_str(&model_json(), &contract).unwrap();
    let service = PredictionService::new(Arc::new(model), contract.clone());

    let features = contract.vectorize(&rows).unwrap();
    let y_pred: Vec<f64> = service
        .predict_rows(&features)
        .unwrap()
        .into_iter()
        .map(|p| p.log_value)
        .collect();
    let y_true: Vec<f64> = rows.iter().map(|r| r.target_clv).collect();

    assert_eq!(y_pred, vec![2.3, 3.9]);

    let report = evaluate(&y_true, &y_pred).unwrap();
    assert!(report.rmse_log >= 0.0);
    assert!(report.mae_log <= report.rmse_log + 1e-12);
    assert!((report.spearman_rank - 1.0).abs() < 1e-9);

    let report_path = dir.path().join("reports").join("metrics.json");
    report.save(&report_path).unwrap();
    assert!(report_path.exists());
}

#[test]
fn test_missing_price_column_value_aborts_build() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Invoice,Quantity,InvoiceDate,Price,Customer ID").unwrap();
    writeln!(file, "1,2,2011-01-01 10:00:00,,A").unwrap();
    writeln!(file, "2,2,2011-06-01 10:00:00,1.0,A").unwrap();

    let raw = load_transactions(file.path()).unwrap();
    let err = TemporalFeatureBuilder::default()
        .build_from_raw(&preprocess(raw))
        .unwrap_err();

    assert!(err.to_string().contains("Price"));
}
