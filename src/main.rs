//! HDP: heart disease risk prediction
//!
//! Command-line entry point.
//!
//! # Usage
//!
//! ```bash
//! hdp synth --rows 303            # fill `features` with a synthetic cohort
//! hdp train                       # select a model and write models/best_model.bin
//! hdp predict --age 57 --sex 1 ... # or: hdp predict --json '{"age": 57, ...}'
//! hdp history --limit 20
//! hdp explain --json '{...}'
//! ```
//!
//! # Environment Variables
//!
//! - `HDP_DATABASE_PATH`, `HDP_MODEL_DIR`, `HDP_SEED`, `HDP_TEST_SIZE`
//! - `HDP_LOG_MODE` (`stderr` | `file`) and `HDP_LOG_FILE`
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hdp::adapters::shapley::SamplingShapley;
use hdp::adapters::sqlite::SqliteStorage;
use hdp::application::{InferenceService, TrainingService};
use hdp::config::{Config, LogMode};
use hdp::domain::{ClinicalField, PatientRecord};
use hdp::ml::synthetic::generate_cohort;
use hdp::ml::{ScoringArtifact, TrainerConfig};
use hdp::ports::PredictionLog;
use hdp::HdpError;

#[derive(Parser, Debug)]
#[command(name = "hdp")]
#[command(about = "Heart disease risk prediction")]
#[command(version)]
struct Cli {
    /// SQLite database path (overrides HDP_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Model directory (overrides HDP_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Write a synthetic labeled cohort into the `features` table
    Synth {
        #[arg(long, default_value_t = 303)]
        rows: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Train every candidate, keep the best by held-out ROC AUC
    Train {
        #[arg(long)]
        seed: Option<u64>,
        /// Held-out fraction, in (0, 1)
        #[arg(long)]
        test_size: Option<f64>,
    },
    /// Score one patient record
    Predict {
        #[command(flatten)]
        record: RecordArgs,
    },
    /// List logged predictions, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Per-feature attributions for one patient record
    Explain {
        #[command(flatten)]
        record: RecordArgs,
        /// Orderings sampled per background row
        #[arg(long, default_value_t = 16)]
        permutations: usize,
        /// Only print the N largest attributions
        #[arg(long)]
        top: Option<usize>,
    },
}

/// Patient record given either as 13 flags or one JSON object.
#[derive(clap::Args, Debug)]
struct RecordArgs {
    /// JSON object with all 13 fields
    #[arg(long)]
    json: Option<String>,
    #[arg(long)]
    age: Option<f64>,
    #[arg(long)]
    sex: Option<f64>,
    #[arg(long)]
    cp: Option<f64>,
    #[arg(long)]
    trestbps: Option<f64>,
    #[arg(long)]
    chol: Option<f64>,
    #[arg(long)]
    fbs: Option<f64>,
    #[arg(long)]
    restecg: Option<f64>,
    #[arg(long)]
    thalach: Option<f64>,
    #[arg(long)]
    exang: Option<f64>,
    #[arg(long)]
    oldpeak: Option<f64>,
    #[arg(long)]
    slope: Option<f64>,
    #[arg(long)]
    ca: Option<f64>,
    #[arg(long)]
    thal: Option<f64>,
}

impl RecordArgs {
    /// Parse and validate against the documented input domains.
    fn into_record(self) -> std::result::Result<PatientRecord, HdpError> {
        let value = match self.json {
            Some(raw) => serde_json::from_str(&raw)?,
            None => {
                let flags = [
                    self.age,
                    self.sex,
                    self.cp,
                    self.trestbps,
                    self.chol,
                    self.fbs,
                    self.restecg,
                    self.thalach,
                    self.exang,
                    self.oldpeak,
                    self.slope,
                    self.ca,
                    self.thal,
                ];
                let map: serde_json::Map<String, serde_json::Value> = ClinicalField::ALL
                    .iter()
                    .zip(flags)
                    .filter_map(|(field, v)| v.map(|v| (field.name().to_string(), json!(v))))
                    .collect();
                serde_json::Value::Object(map)
            }
        };
        let record = PatientRecord::from_json(&value)?;
        record.validate().map_err(HdpError::Validation)?;
        Ok(record)
    }
}

fn init_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match config.log_mode {
        LogMode::File => {
            if let Some(parent) = config.log_file.parent() {
                // Best-effort: opening the file reports the real error.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
                .with_context(|| format!("opening log file {:?}", config.log_file))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();
    Ok(guard)
}

fn load_artifact(config: &Config) -> Result<Arc<ScoringArtifact>> {
    let path = config.artifact_path();
    let artifact = ScoringArtifact::load(&path)
        .with_context(|| format!("run `hdp train` first to create {path:?}"))?;
    Ok(Arc::new(artifact))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let (mut config, config_warnings) = Config::from_env_or_default();
    if let Some(path) = cli.database {
        config.database_path = path;
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    let _guard = init_logging(&config)?;
    for warning in &config_warnings {
        tracing::warn!("{warning}");
    }
    tracing::debug!("Configuration: {:?}", config);

    let storage = Arc::new(
        SqliteStorage::new(&config.database_path)
            .with_context(|| format!("opening database {:?}", config.database_path))?,
    );

    match cli.command {
        Command::Synth { rows, seed } => {
            let cohort = generate_cohort(rows, seed.unwrap_or(config.seed));
            let inserted = storage.insert_labeled_records(&cohort)?;
            print_json(&json!({ "inserted": inserted, "database": config.database_path }))?;
        }
        Command::Train { seed, test_size } => {
            let trainer_config = TrainerConfig {
                seed: seed.unwrap_or(config.seed),
                test_size: test_size.unwrap_or(config.test_size),
                ..TrainerConfig::default()
            };
            let path = config.artifact_path();
            let outcome = TrainingService::new(storage, trainer_config).train_and_save(&path)?;
            let metadata = outcome.artifact.metadata();
            print_json(&json!({
                "best_model": metadata.model_name,
                "best_auc": metadata.best_auc,
                "leaderboard": outcome.leaderboard,
                "evaluation": metadata.evaluation,
                "n_train": metadata.n_train,
                "n_test": metadata.n_test,
                "artifact": path,
            }))?;
        }
        Command::Predict { record } => {
            let record = record.into_record()?;
            let service = InferenceService::new(load_artifact(&config)?, storage);
            let assessment = service.run_inference(record)?;
            let prediction = &assessment.prediction;
            print_json(&json!({
                "id": prediction.id,
                "probability": prediction.probability,
                "risk_level": prediction.risk_level.to_string(),
                "risk_description": prediction.risk_level.description(),
                "recommendations": assessment.recommendations,
                "logged": assessment.log_error.is_none(),
            }))?;
        }
        Command::History { limit, offset } => {
            let page = storage.load_paginated(offset, limit)?;
            print_json(&json!({
                "total": page.total_count,
                "offset": page.offset,
                "next_offset": page.next_offset(),
                "items": page.items,
            }))?;
        }
        Command::Explain {
            record,
            permutations,
            top,
        } => {
            let record = record.into_record()?;
            let service = InferenceService::new(load_artifact(&config)?, storage);
            let explainer = SamplingShapley::new(permutations, config.seed);
            let mut explanation = service.explain(&explainer, &record)?;
            explanation
                .attributions
                .sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
            if let Some(n) = top {
                explanation.attributions.truncate(n);
            }
            print_json(&serde_json::to_value(&explanation)?)?;
        }
    }

    Ok(())
}
