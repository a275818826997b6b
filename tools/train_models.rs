//! Offline Trainer
//!
//! Aggregates the raw monthly datasets, fits the outlier normalizer, scaler
//! and classifier per industry, and writes the artifacts the server loads.

use anyhow::{Context, Result};
use churn_prediction_service::{
    aggregator::FeatureAggregator,
    config::AppConfig,
    generator,
    logging,
    models::ArtifactStore,
    service::today,
    training::Trainer,
    types::{FeatureRow, Industry, InsuranceRecord, TelecomRecord},
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

/// Train churn models from generated or exported monthly records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = churn_prediction_service::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only train this industry
    #[arg(short, long)]
    industry: Option<Industry>,

    /// Directory holding <industry>_churn_data.csv (defaults to storage.data_dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Artifact output directory (defaults to artifacts.dir)
    #[arg(short, long)]
    artifacts: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_from_path(&args.config)?;
    logging::init(&config.logging)?;

    let data_dir = args.data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    let store = ArtifactStore::new(args.artifacts.unwrap_or_else(|| config.artifacts.dir.clone()));
    let trainer = Trainer::new(config.training.clone());
    let aggregator = FeatureAggregator::new(today());

    let industries = match args.industry {
        Some(industry) => vec![industry],
        None => Industry::ALL.to_vec(),
    };

    for industry in industries {
        let path = generator::raw_data_path(&data_dir, industry);
        let (rows, summary) = match industry {
            Industry::Telecom => {
                let records: Vec<TelecomRecord> = generator::read_records(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let aggregation = aggregator.aggregate_telecom(&records);
                let rows: Vec<FeatureRow> = aggregation.rows.into_iter().map(FeatureRow::from).collect();
                (rows, aggregation.summary)
            }
            Industry::Insurance => {
                let records: Vec<InsuranceRecord> = generator::read_records(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let aggregation = aggregator.aggregate_insurance(&records);
                let rows: Vec<FeatureRow> = aggregation.rows.into_iter().map(FeatureRow::from).collect();
                (rows, aggregation.summary)
            }
        };

        if summary.rejected_count() > 0 {
            warn!(
                industry = %industry,
                rejected = summary.rejected_count(),
                "Customers without six monthly records excluded from training"
            );
        }

        let trained = trainer
            .train_and_save(industry, &rows, &store)
            .with_context(|| format!("Training failed for {}", industry))?;

        info!(
            industry = %industry,
            customers = rows.len(),
            test_samples = trained.evaluation.samples,
            auc_roc = format!("{:.3}", trained.evaluation.auc_roc),
            f1 = format!("{:.3}", trained.evaluation.f1),
            artifacts = %store.dir().display(),
            "Artifacts saved"
        );
    }

    Ok(())
}
