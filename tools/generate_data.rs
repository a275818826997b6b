//! Synthetic Data Generator
//!
//! Writes six months of raw records per customer, the identity mapping and
//! the aggregated feature table for each industry.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use churn_prediction_service::{
    aggregator::FeatureAggregator,
    config::AppConfig,
    generator::{self, InsuranceGenerator, TelecomGenerator},
    logging,
    service::today,
    store::FeatureTableStore,
    types::Industry,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Generate synthetic telecom and insurance churn datasets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = churn_prediction_service::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only generate this industry
    #[arg(short, long)]
    industry: Option<Industry>,

    /// Customers per industry (overrides generator.customers)
    #[arg(short = 'n', long)]
    customers: Option<usize>,

    /// RNG seed (overrides generator.seed)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Output directory (defaults to storage.data_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Date policy ages are measured against (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_from_path(&args.config)?;
    logging::init(&config.logging)?;

    let customers = args.customers.unwrap_or(config.generator.customers);
    let seed = args.seed.unwrap_or(config.generator.seed);
    let output = args.output.unwrap_or_else(|| config.storage.data_dir.clone());
    let as_of = args.as_of.unwrap_or_else(today);

    std::fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let store = FeatureTableStore::new(&output);
    let aggregator = FeatureAggregator::new(as_of);

    let industries = match args.industry {
        Some(industry) => vec![industry],
        None => Industry::ALL.to_vec(),
    };

    for industry in industries {
        info!(industry = %industry, customers, seed, "Generating dataset");
        let raw_path = generator::raw_data_path(&output, industry);

        let (records, accepted) = match industry {
            Industry::Telecom => {
                let dataset = TelecomGenerator::new(seed).generate(customers)?;
                generator::write_records(&raw_path, &dataset.records)?;
                store.save_identities(industry, &dataset.identities)?;

                let aggregation = aggregator.aggregate_telecom(&dataset.records);
                store.replace_table(industry, &aggregation.rows, &[])?;
                (dataset.records.len(), aggregation.summary.accepted)
            }
            Industry::Insurance => {
                let dataset = InsuranceGenerator::new(seed, as_of).generate(customers)?;
                generator::write_records(&raw_path, &dataset.records)?;
                store.save_identities(industry, &dataset.identities)?;

                let aggregation = aggregator.aggregate_insurance(&dataset.records);
                store.replace_table(industry, &aggregation.rows, &[])?;
                (dataset.records.len(), aggregation.summary.accepted)
            }
        };

        info!(
            industry = %industry,
            records,
            customers = accepted,
            raw = %raw_path.display(),
            table = %store.table_path(industry).display(),
            mapping = %store.mapping_path(industry).display(),
            "Dataset written"
        );
    }

    Ok(())
}
