use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use forward_clv::{
    evaluate, init_logging, load_feature_rows, load_transactions, preprocess, write_feature_rows,
    AppConfig, FeatureContract, ForestRegressor, LogFormat, PredictionService, TemporalFeatureBuilder,
};

#[derive(Parser)]
#[command(name = "clv", version, about = "Customer lifetime value feature pipeline")]
struct Cli {
    /// JSON config file (service + pipeline sections)
    #[arg(long, global = true, env = "CLV_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "CLV_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preprocess a raw transaction CSV and write one feature row per customer
    Features {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Overrides pipeline.horizon_days from the config file
        #[arg(long)]
        horizon_days: Option<i64>,
    },

    /// Score a feature CSV with a fitted model and write the metrics report
    Evaluate {
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long, default_value = "reports/metrics.json")]
        report: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Features { input, output, horizon_days } => {
            let horizon = horizon_days.unwrap_or(config.pipeline.horizon_days);
            run_features(&input, &output, horizon)
        }
        Command::Evaluate { model, data, report } => run_evaluate(&model, &data, &report),
    }
}

fn run_features(input: &std::path::Path, output: &std::path::Path, horizon_days: i64) -> Result<()> {
    println!("🧮 Feature Engineering - {} day horizon", horizon_days);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    let raw = load_transactions(input)?;
    println!("✓ Loaded {} transaction lines", raw.len());

    // 2. Drop anonymous rows and cancellations
    let cleaned = preprocess(raw);
    println!("✓ {} lines after preprocessing", cleaned.len());

    // 3. Build features
    let builder = TemporalFeatureBuilder::with_horizon_days(horizon_days);
    let set = builder
        .build_from_raw(&cleaned)
        .context("Feature engineering failed")?;
    println!("✓ Cutoff date: {}", set.cutoff.date());
    println!(
        "✓ {} customers ({} without label-window spend, {} without history dropped)",
        set.len(),
        set.dropped_without_label,
        set.dropped_without_history
    );

    // 4. Save
    write_feature_rows(output, &set.rows)?;
    println!("✓ Saved to {}", output.display());

    Ok(())
}

fn run_evaluate(model_path: &std::path::Path, data: &std::path::Path, report_path: &std::path::Path) -> Result<()> {
    println!("📊 Model Evaluation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let contract = FeatureContract::new();
    let model = ForestRegressor::load(model_path, &contract)?;
    let service = PredictionService::new(Arc::new(model), contract.clone());

    let rows = load_feature_rows(data)?;
    let features = contract.vectorize(&rows).context("Feature table does not match the contract")?;
    let y_true: Vec<f64> = rows.iter().map(|r| r.target_clv).collect();
    let y_pred: Vec<f64> = service
        .predict_rows(&features)
        .context("Model inference failed")?
        .into_iter()
        .map(|p| p.log_value)
        .collect();

    let report = evaluate(&y_true, &y_pred).context("Metric computation failed")?;
    info!(rows = rows.len(), model = service.model_name(), "Evaluation completed");

    println!("✓ {}", report.summary());
    report.save(report_path)?;
    println!("✓ Metrics saved to {}", report_path.display());

    Ok(())
}
